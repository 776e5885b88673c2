// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The adapter contract every terminus implements.
//
// A terminus is a storage adapter serving one indirection. Only `find` is
// mandatory; the remaining verbs default to an `Unsupported` error. The
// optional hooks (authorization, filtering, validation) are advertised
// through `Capabilities`, which the dispatcher reads once when the terminus
// is constructed and consults on every call without probing the adapter.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::IndirectorConfig;
use crate::error::{IndirectorError, Result};
use crate::model::Model;
use crate::request::Request;

/// Optional hooks a terminus implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `Terminus::authorized` is meaningful and must be consulted.
    pub authorize: bool,
    /// `Terminus::filter` transforms values returned by `find`.
    pub filter: bool,
    /// `Terminus::validate` performs adapter-specific checks.
    pub validate: bool,
    /// Requests carrying a caller identity may reach this terminus.
    pub allow_remote_requests: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            authorize: false,
            filter: false,
            validate: false,
            allow_remote_requests: true,
        }
    }
}

/// What a terminus factory is told about where it is being constructed.
#[derive(Debug, Clone)]
pub struct TerminusContext {
    /// Name of the indirection the terminus will serve.
    pub indirection: String,
    /// Layer configuration.
    pub config: Arc<IndirectorConfig>,
}

/// A storage adapter for one indirection.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait Terminus<M: Model>: Send + Sync {
    /// The adapter name, used in logs and errors.
    fn name(&self) -> &str;

    /// Optional hooks this adapter implements. Read once at construction.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Look up a single value. `Ok(None)` means not found.
    async fn find(&self, request: &Request<M>) -> Result<Option<M>>;

    /// Look up every value matching the request.
    async fn search(&self, _request: &Request<M>) -> Result<Vec<M>> {
        Err(self.unsupported("search"))
    }

    /// Store the request's instance under the request's key.
    async fn save(&self, _request: &Request<M>) -> Result<()> {
        Err(self.unsupported("save"))
    }

    /// Remove the value stored under the request's key.
    async fn destroy(&self, _request: &Request<M>) -> Result<()> {
        Err(self.unsupported("destroy"))
    }

    /// Whether a value exists under the request's key.
    async fn head(&self, request: &Request<M>) -> Result<bool> {
        Ok(self.find(request).await?.is_some())
    }

    /// Authorization hook; only called when `Capabilities::authorize` is set
    /// and the request carries a caller identity.
    fn authorized(&self, _request: &Request<M>) -> bool {
        true
    }

    /// Transform a found value before it is returned to the caller.
    fn filter(&self, value: M) -> Result<M> {
        Ok(value)
    }

    /// Reject malformed requests before they execute.
    fn validate(&self, _request: &Request<M>) -> Result<()> {
        Ok(())
    }

    #[doc(hidden)]
    fn unsupported(&self, method: &str) -> IndirectorError {
        IndirectorError::Unsupported {
            terminus: self.name().to_string(),
            method: method.to_string(),
        }
    }
}

/// Builds a terminus for an indirection.
///
/// Runs with no indirection lock held, so it may look up other termini.
pub type TerminusFactory<M> =
    Arc<dyn Fn(&TerminusContext) -> Result<Arc<dyn Terminus<M>>> + Send + Sync>;

/// A terminus registered under a name derived from its type name.
pub trait NamedTerminus<M: Model>: Terminus<M> + Sized + 'static {
    /// The declared type name, e.g. `"FileBucketFile"`.
    const TYPE_NAME: &'static str;

    /// Construct the adapter.
    fn build(context: &TerminusContext) -> Result<Self>;

    /// The registration name derived from `TYPE_NAME`.
    fn adapter_name() -> String {
        adapter_name(Self::TYPE_NAME)
    }

    /// A factory building this adapter.
    fn factory() -> TerminusFactory<M> {
        Arc::new(|context: &TerminusContext| {
            Ok(Arc::new(Self::build(context)?) as Arc<dyn Terminus<M>>)
        })
    }
}

/// Derive a registration name from a type name.
///
/// Path prefixes are dropped and an underscore is inserted at each
/// lower-to-upper case boundary: `FileBucketFile` becomes `file_bucket_file`,
/// `Yaml` becomes `yaml`.
pub fn adapter_name(type_name: &str) -> String {
    let base = type_name.rsplit("::").next().unwrap_or(type_name);
    let mut out = String::with_capacity(base.len() + 4);
    let mut previous_lower = false;
    for c in base.chars() {
        if c.is_ascii_uppercase() && previous_lower {
            out.push('_');
        }
        previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// A constructed terminus together with the capabilities captured when it
/// was built.
pub struct TerminusHandle<M: Model> {
    name: String,
    terminus: Arc<dyn Terminus<M>>,
    capabilities: Capabilities,
}

impl<M: Model> Clone for TerminusHandle<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            terminus: Arc::clone(&self.terminus),
            capabilities: self.capabilities,
        }
    }
}

impl<M: Model> fmt::Debug for TerminusHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminusHandle")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl<M: Model> TerminusHandle<M> {
    /// Wrap a terminus registered as `name`.
    pub fn new(name: impl Into<String>, terminus: Arc<dyn Terminus<M>>) -> Self {
        let capabilities = terminus.capabilities();
        Self {
            name: name.into(),
            terminus,
            capabilities,
        }
    }

    /// The name the terminus was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The underlying adapter.
    pub fn terminus(&self) -> &Arc<dyn Terminus<M>> {
        &self.terminus
    }

    /// Whether two handles share the same adapter instance.
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.terminus, &other.terminus)
    }

    pub async fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        self.terminus.find(request).await
    }

    pub async fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        self.terminus.search(request).await
    }

    pub async fn save(&self, request: &Request<M>) -> Result<()> {
        self.terminus.save(request).await
    }

    pub async fn destroy(&self, request: &Request<M>) -> Result<()> {
        self.terminus.destroy(request).await
    }

    pub async fn head(&self, request: &Request<M>) -> Result<bool> {
        self.terminus.head(request).await
    }

    /// Authorize a request; a no-op unless the adapter has the hook and the
    /// request names a node.
    pub fn authorize(&self, request: &Request<M>) -> Result<()> {
        if request.node().is_none() || !self.capabilities.authorize {
            return Ok(());
        }
        if self.terminus.authorized(request) {
            return Ok(());
        }

        let mut message = format!(
            "Not authorized to call {} on {}",
            request.method(),
            request.description()
        );
        if !request.options().is_empty() {
            let options = serde_json::to_string(request.options()).unwrap_or_default();
            message.push_str(&format!(" with {options}"));
        }
        Err(IndirectorError::Authorization(message))
    }

    /// Refuse remote requests when the adapter does not accept them.
    pub fn check_remote(&self, request: &Request<M>) -> Result<()> {
        if request.is_remote() && !self.capabilities.allow_remote_requests {
            return Err(IndirectorError::Authorization(format!(
                "terminus {} does not accept remote requests ({} {})",
                self.name,
                request.method(),
                request.description()
            )));
        }
        Ok(())
    }

    /// Base validation followed by the adapter's own checks.
    ///
    /// A request carrying an instance must be keyed by that instance's name.
    pub fn validate(&self, request: &Request<M>) -> Result<()> {
        if let Some(instance) = request.instance() {
            if instance.name() != request.key() {
                return Err(IndirectorError::Validation(format!(
                    "Instance name {:?} does not match requested key {:?}",
                    instance.name(),
                    request.key()
                )));
            }
        }
        if self.capabilities.validate {
            self.terminus.validate(request)?;
        }
        Ok(())
    }

    /// Apply the adapter's filter when it has one.
    pub fn filter(&self, value: M) -> Result<M> {
        if self.capabilities.filter {
            self.terminus.filter(value)
        } else {
            Ok(value)
        }
    }
}
