// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The dispatcher for one logical resource kind.
//
// An `Indirection` owns the adapters registered for its model type, picks the
// terminus serving each request (statically, through a configuration setting,
// or through a per-request selector), runs authorization and validation, and
// places the cache policy in front of the terminus.
//
// All interior state is behind std locks that are never held across an
// `.await`: handles are cloned out before any adapter is called.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error, info, warn};

use crate::cache::CachePolicy;
use crate::config::IndirectorConfig;
use crate::error::{IndirectorError, Result};
use crate::model::Model;
use crate::request::{Method, Options, Request, RequestSettings};
use crate::selector::TerminusSelector;
use crate::terminus::{TerminusContext, TerminusFactory, TerminusHandle};

/// Creation-time settings for an indirection.
pub struct IndirectionOptions<M: Model> {
    /// Default adapter name.
    pub terminus_class: Option<String>,
    /// Adapter used as a cache; `None` disables caching.
    pub cache_class: Option<String>,
    /// Configuration setting naming the adapter when `terminus_class` is unset.
    pub terminus_setting: Option<String>,
    /// Seconds of freshness; defaults to the configured run interval.
    pub ttl: Option<u64>,
    /// Human-readable description.
    pub doc: Option<String>,
    /// Per-request terminus selection, overriding the static choice.
    pub selector: Option<Arc<dyn TerminusSelector<M>>>,
}

impl<M: Model> Default for IndirectionOptions<M> {
    fn default() -> Self {
        Self {
            terminus_class: None,
            cache_class: None,
            terminus_setting: None,
            ttl: None,
            doc: None,
            selector: None,
        }
    }
}

impl<M: Model> IndirectionOptions<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminus_class(mut self, name: impl Into<String>) -> Self {
        self.terminus_class = Some(name.into());
        self
    }

    pub fn cache_class(mut self, name: impl Into<String>) -> Self {
        self.cache_class = Some(name.into());
        self
    }

    pub fn terminus_setting(mut self, setting: impl Into<String>) -> Self {
        self.terminus_setting = Some(setting.into());
        self
    }

    pub fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn selector(mut self, selector: impl TerminusSelector<M> + 'static) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }
}

#[derive(Debug, Default)]
struct State {
    terminus_class: Option<String>,
    cache_class: Option<String>,
    terminus_setting: Option<String>,
    ttl: Option<u64>,
}

/// A named resource kind and the machinery serving it.
pub struct Indirection<M: Model> {
    name: String,
    doc: Option<String>,
    config: Arc<IndirectorConfig>,
    settings: RequestSettings,
    selector: Option<Arc<dyn TerminusSelector<M>>>,
    state: RwLock<State>,
    factories: RwLock<HashMap<String, TerminusFactory<M>>>,
    instances: Mutex<HashMap<String, TerminusHandle<M>>>,
}

impl<M: Model> fmt::Debug for Indirection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Indirection")
            .field("name", &self.name)
            .field("model", &std::any::type_name::<M>())
            .field("terminus_class", &state.terminus_class)
            .field("cache_class", &state.cache_class)
            .finish()
    }
}

impl<M: Model> Indirection<M> {
    /// Build an indirection. Use `Indirector::create` to register one.
    pub(crate) fn new(
        name: impl Into<String>,
        options: IndirectionOptions<M>,
        config: Arc<IndirectorConfig>,
    ) -> Result<Self> {
        if options.ttl.unwrap_or(config.run_interval) == 0 {
            return Err(IndirectorError::Configuration(
                "ttl must be a positive number of seconds".to_string(),
            ));
        }
        let settings = RequestSettings::from_config(&config);
        Ok(Self {
            name: name.into(),
            doc: options.doc,
            config,
            settings,
            selector: options.selector,
            state: RwLock::new(State {
                terminus_class: options.terminus_class,
                cache_class: options.cache_class,
                terminus_setting: options.terminus_setting,
                ttl: options.ttl,
            }),
            factories: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Name of the model type served.
    pub fn model_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    pub fn config(&self) -> &Arc<IndirectorConfig> {
        &self.config
    }

    // -- Terminus management --------------------------------------------------

    /// Register (or replace) the adapter factory for `name`.
    ///
    /// Replacing an adapter drops its memoized instance.
    pub fn register_terminus(&self, name: impl Into<String>, factory: TerminusFactory<M>) {
        let name = name.into();
        debug!(indirection = %self.name, terminus = %name, "registering terminus");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), factory);
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
    }

    /// Names of every registered adapter, sorted.
    pub fn terminus_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn is_registered(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn check_class(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(IndirectorError::Configuration(format!(
                "invalid terminus name for indirection {}",
                self.name
            )));
        }
        if !self.is_registered(name) {
            return Err(IndirectorError::UnknownTerminus {
                indirection: self.name.clone(),
                terminus: name.to_string(),
            });
        }
        Ok(())
    }

    /// The adapter instance registered as `name`, constructed on first use
    /// and memoized afterwards.
    ///
    /// The factory runs without any indirection lock held, so it may itself
    /// look up other termini. When two callers race on first use, the first
    /// instance stored wins and both get it.
    pub fn terminus(&self, name: &str) -> Result<TerminusHandle<M>> {
        if let Some(handle) = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(handle.clone());
        }

        let factory = self.factory(name)?;
        let context = TerminusContext {
            indirection: self.name.clone(),
            config: Arc::clone(&self.config),
        };
        let built = TerminusHandle::new(name, factory(&context)?);

        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = instances.get(name) {
            return Ok(existing.clone());
        }
        // A factory replaced mid-construction must not leave its old
        // instance memoized.
        let current = self.factory(name)?;
        if Arc::ptr_eq(&current, &factory) {
            debug!(
                indirection = %self.name,
                terminus = %name,
                capabilities = ?built.capabilities(),
                "constructed terminus"
            );
            instances.insert(name.to_string(), built.clone());
        }
        Ok(built)
    }

    fn factory(&self, name: &str) -> Result<TerminusFactory<M>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| IndirectorError::UnknownTerminus {
                indirection: self.name.clone(),
                terminus: name.to_string(),
            })
    }

    /// The default adapter name, from the explicit class or the configured
    /// terminus setting.
    pub fn terminus_class(&self) -> Result<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(class) = &state.terminus_class {
            return Ok(class.clone());
        }
        match &state.terminus_setting {
            Some(setting) => self
                .config
                .setting(setting)
                .map(str::to_string)
                .ok_or_else(|| {
                    IndirectorError::Configuration(format!(
                        "setting {setting} does not name a terminus for indirection {}",
                        self.name
                    ))
                }),
            None => Err(IndirectorError::Configuration(format!(
                "no terminus class nor terminus setting was provided for indirection {}",
                self.name
            ))),
        }
    }

    /// Change the default adapter. The name must be registered.
    pub fn set_terminus_class(&self, name: &str) -> Result<()> {
        self.check_class(name)?;
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .terminus_class = Some(name.to_string());
        Ok(())
    }

    pub fn cache_class(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_class
            .clone()
    }

    /// Change the cache adapter; `None` disables caching.
    pub fn set_cache_class(&self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            self.check_class(name)?;
        }
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_class = name.map(str::to_string);
        Ok(())
    }

    /// Whether a cache adapter is configured.
    pub fn is_caching(&self) -> bool {
        self.cache_class().is_some()
    }

    /// The cache adapter; a configuration error when caching is off.
    pub fn cache(&self) -> Result<TerminusHandle<M>> {
        match self.cache_class() {
            Some(class) => self.terminus(&class),
            None => Err(IndirectorError::Configuration(format!(
                "cache is not configured for indirection {}",
                self.name
            ))),
        }
    }

    fn cache_handle(&self) -> Result<Option<TerminusHandle<M>>> {
        match self.cache_class() {
            Some(class) => self.terminus(&class).map(Some),
            None => Ok(None),
        }
    }

    // -- Cache policy ---------------------------------------------------------

    /// Seconds of freshness given to values without an expiration.
    pub fn ttl(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ttl
            .unwrap_or(self.config.run_interval)
    }

    pub fn set_ttl(&self, ttl: u64) -> Result<()> {
        if ttl == 0 {
            return Err(IndirectorError::Configuration(
                "ttl must be a positive number of seconds".to_string(),
            ));
        }
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .ttl = Some(ttl);
        Ok(())
    }

    pub fn policy(&self) -> CachePolicy {
        CachePolicy::new(self.ttl())
    }

    // -- Requests -------------------------------------------------------------

    /// Build a keyed request for this indirection.
    pub fn request(&self, method: Method, key: &str, options: Options) -> Result<Request<M>> {
        Request::with_settings(self.name.as_str(), method, key, options, &self.settings)
    }

    fn instance_request(
        &self,
        method: Method,
        instance: M,
        key: Option<&str>,
        options: Options,
    ) -> Result<Request<M>> {
        Request::for_instance(self.name.as_str(), method, instance, key, options, &self.settings)
    }

    /// Resolve, authorize and validate the terminus for `request`.
    fn prepare(&self, request: &Request<M>) -> Result<TerminusHandle<M>> {
        let terminus_name = match &self.selector {
            Some(selector) => selector.select(request).ok_or_else(|| {
                IndirectorError::Configuration(format!(
                    "could not determine appropriate terminus for {request}"
                ))
            })?,
            None => self.terminus_class()?,
        };

        let terminus = self.terminus(&terminus_name)?;
        terminus.authorize(request)?;
        terminus.check_remote(request)?;
        terminus.validate(request)?;
        Ok(terminus)
    }

    /// A fresh cached value, if caching applies to this request.
    ///
    /// Cache failures are logged and reported as a miss.
    async fn find_in_cache(&self, request: &Request<M>) -> Option<M> {
        if request.ignore_cache() || !request.use_cache() {
            return None;
        }
        let cache = match self.cache_handle() {
            Ok(Some(cache)) => cache,
            Ok(None) => return None,
            Err(e) => {
                warn!(indirection = %self.name, key = %request.key(), error = %e, "cache unavailable");
                return None;
            }
        };

        let cached = self.read_cache(&cache, request).await?;
        if cached.is_expired() {
            info!(
                indirection = %self.name,
                key = %request.key(),
                expiration = ?cached.expiration(),
                "not using expired cached value"
            );
            return None;
        }
        debug!(indirection = %self.name, key = %request.key(), "using cached value");
        Some(cached)
    }

    /// Whatever the cache holds under the request's key, fresh or not.
    ///
    /// A failed read is logged and treated as a miss.
    async fn read_cache(&self, cache: &TerminusHandle<M>, request: &Request<M>) -> Option<M> {
        match cache.find(&request.for_method(Method::Find)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(indirection = %self.name, key = %request.key(), error = %e, "cache lookup failed");
                None
            }
        }
    }

    // -- Verbs ----------------------------------------------------------------

    /// Find the value stored under `key`.
    ///
    /// A fresh cached value wins. Otherwise the terminus is asked; its result
    /// is stamped with an expiration, written to the cache, then filtered.
    pub async fn find(&self, key: &str, options: Options) -> Result<Option<M>> {
        let request = self.request(Method::Find, key, options)?;
        let terminus = self.prepare(&request)?;

        if let Some(cached) = self.find_in_cache(&request).await {
            return Ok(Some(cached));
        }
        if request.ignore_terminus() {
            return Ok(None);
        }

        let found = terminus.find(&request).await.inspect_err(|e| {
            error!(indirection = %self.name, key = %request.key(), error = %e, "find failed");
        })?;
        let Some(mut result) = found else {
            return Ok(None);
        };
        self.policy().stamp(&mut result);

        if let Some(cache) = self.cache_handle()? {
            info!(indirection = %self.name, key = %request.key(), "caching value");
            let save = request.with_instance(Method::Save, result.clone());
            cache.save(&save).await.inspect_err(|e| {
                error!(indirection = %self.name, key = %request.key(), error = %e, "cache write failed");
            })?;
        }

        let filtered = terminus.filter(result).inspect_err(|e| {
            error!(indirection = %self.name, key = %request.key(), error = %e, "filter failed");
        })?;
        Ok(Some(filtered))
    }

    /// Every value matching `key` and `options`, each stamped with an
    /// expiration when it has none.
    pub async fn search(&self, key: &str, options: Options) -> Result<Vec<M>> {
        let request = self.request(Method::Search, key, options)?;
        let terminus = self.prepare(&request)?;

        let mut results = terminus.search(&request).await.inspect_err(|e| {
            error!(indirection = %self.name, key = %request.key(), error = %e, "search failed");
        })?;
        let policy = self.policy();
        for result in &mut results {
            policy.stamp(result);
        }
        Ok(results)
    }

    /// Store `instance` under `key` (or its own name), writing through to
    /// the cache when caching is enabled.
    pub async fn save(&self, instance: M, key: Option<&str>, options: Options) -> Result<()> {
        let request = self.instance_request(Method::Save, instance, key, options)?;
        let terminus = self.prepare(&request)?;

        terminus.save(&request).await.inspect_err(|e| {
            error!(indirection = %self.name, key = %request.key(), error = %e, "save failed");
        })?;

        if let Some(cache) = self.cache_handle()? {
            cache.save(&request).await.inspect_err(|e| {
                error!(indirection = %self.name, key = %request.key(), error = %e, "cache write failed");
            })?;
        }
        Ok(())
    }

    /// Remove the value stored under `key`, and its cached copy if any.
    pub async fn destroy(&self, key: &str, options: Options) -> Result<()> {
        let request = self.request(Method::Destroy, key, options)?;
        let terminus = self.prepare(&request)?;

        terminus.destroy(&request).await.inspect_err(|e| {
            error!(indirection = %self.name, key = %request.key(), error = %e, "destroy failed");
        })?;

        if let Some(cache) = self.cache_handle()? {
            if self.read_cache(&cache, &request).await.is_some() {
                debug!(indirection = %self.name, key = %request.key(), "destroying cached value");
                cache.destroy(&request).await?;
            }
        }
        Ok(())
    }

    /// Whether a value exists under `key`, in the cache or the terminus.
    pub async fn head(&self, key: &str, options: Options) -> Result<bool> {
        let request = self.request(Method::Head, key, options)?;
        let terminus = self.prepare(&request)?;

        if self.find_in_cache(&request).await.is_some() {
            return Ok(true);
        }
        terminus.head(&request).await
    }

    /// Force the cached value under `key` stale without deleting it.
    ///
    /// Returns the expired value, or `None` when nothing is cached or
    /// caching does not apply.
    pub async fn expire(&self, key: &str, options: Options) -> Result<Option<M>> {
        let request = self.request(Method::Expire, key, options)?;
        if request.ignore_cache() {
            return Ok(None);
        }
        let Some(cache) = self.cache_handle()? else {
            return Ok(None);
        };

        let Some(mut instance) = self.read_cache(&cache, &request).await else {
            return Ok(None);
        };

        info!(indirection = %self.name, key = %instance.name(), "expiring cached value");
        instance.set_expiration(self.policy().expired_at());
        cache
            .save(&request.with_instance(Method::Save, instance.clone()))
            .await?;
        Ok(Some(instance))
    }
}
