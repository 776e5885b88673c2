// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The normalized description of one call into the layer.
//
// A `Request` captures the verb, the key (plain, URI-shaped, or derived from
// an instance), the caller's identity and the remaining free-form options.
// Options that name a request attribute are consumed into that attribute and
// removed from the option map.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::IndirectorConfig;
use crate::error::{IndirectorError, Result};
use crate::model::Model;

/// Keys of this shape are parsed as URIs; relative paths and opaque URIs
/// such as `mailto:joe` are left alone.
static URI_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap_or_else(|e| panic!("URI key pattern: {e}"))
});

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// The verb a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Find,
    Search,
    Save,
    Destroy,
    Head,
    Expire,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Find => "find",
            Method::Search => "search",
            Method::Save => "save",
            Method::Destroy => "destroy",
            Method::Head => "head",
            Method::Expire => "expire",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// A symbolic name; rendered like a string.
    Symbol(String),
    Array(Vec<OptionValue>),
    Map(BTreeMap<String, OptionValue>),
}

impl OptionValue {
    /// Convert an untyped JSON value.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => OptionValue::Null,
            serde_json::Value::Bool(b) => OptionValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => OptionValue::Integer(i),
                None => OptionValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => OptionValue::String(s),
            serde_json::Value::Array(items) => {
                OptionValue::Array(items.into_iter().map(OptionValue::from_json).collect())
            }
            serde_json::Value::Object(map) => OptionValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, OptionValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Anything but null and `false` counts as set.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, OptionValue::Null | OptionValue::Bool(false))
    }

    /// The textual content of string and symbol values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) | OptionValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's type, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            OptionValue::Null => "null",
            OptionValue::Bool(_) => "boolean",
            OptionValue::Integer(_) => "integer",
            OptionValue::Float(_) => "float",
            OptionValue::String(_) => "string",
            OptionValue::Symbol(_) => "symbol",
            OptionValue::Array(_) => "array",
            OptionValue::Map(_) => "map",
        }
    }

    /// Render a scalar as query text; `None` for null.
    fn scalar_text(&self) -> Option<std::result::Result<String, &'static str>> {
        match self {
            OptionValue::Null => None,
            OptionValue::Bool(b) => Some(Ok(b.to_string())),
            OptionValue::Integer(i) => Some(Ok(i.to_string())),
            OptionValue::Float(x) => Some(Ok(x.to_string())),
            OptionValue::String(s) | OptionValue::Symbol(s) => Some(Ok(s.clone())),
            other => Some(Err(other.kind())),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Integer(i64::from(value))
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl<T: Into<OptionValue>> From<Vec<T>> for OptionValue {
    fn from(values: Vec<T>) -> Self {
        OptionValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Free-form request options, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<OptionValue> {
        self.0.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// Build options from an untyped JSON value.
    ///
    /// `null` gives empty options; anything other than an object is a
    /// request error.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::new()),
            serde_json::Value::Object(map) => Ok(Self(
                map.into_iter()
                    .map(|(k, v)| (k, OptionValue::from_json(v)))
                    .collect(),
            )),
            other => Err(IndirectorError::Request(format!(
                "request options must be a map, got {other}"
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// What a request is about: a name, or the instance being saved.
#[derive(Debug, Clone)]
pub enum RequestKey<M> {
    Name(String),
    Instance(M),
}

impl<M> From<&str> for RequestKey<M> {
    fn from(key: &str) -> Self {
        RequestKey::Name(key.to_string())
    }
}

impl<M> From<String> for RequestKey<M> {
    fn from(key: String) -> Self {
        RequestKey::Name(key)
    }
}

impl<M> From<&String> for RequestKey<M> {
    fn from(key: &String) -> Self {
        RequestKey::Name(key.clone())
    }
}

/// Settings used while parsing URI-shaped keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSettings {
    /// Scheme of the platform's own remote protocol.
    pub native_scheme: String,
    /// Port assumed for the native scheme when the URI has none.
    pub default_port: u16,
}

impl RequestSettings {
    pub const NATIVE_SCHEME: &'static str = "puppet";

    pub fn from_config(config: &IndirectorConfig) -> Self {
        Self {
            native_scheme: Self::NATIVE_SCHEME.to_string(),
            default_port: config.master_port,
        }
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self::from_config(&IndirectorConfig::default())
    }
}

/// One call into the indirection layer.
#[derive(Debug, Clone)]
pub struct Request<M> {
    indirection_name: String,
    method: Method,
    key: String,
    instance: Option<M>,
    options: Options,
    node: Option<String>,
    ip: Option<String>,
    authenticated: bool,
    ignore_cache: bool,
    ignore_terminus: bool,
    use_cache: Option<bool>,
    environment: Option<String>,
    server: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
    uri: Option<String>,
}

impl<M: Model> Request<M> {
    /// Build a request with default URI settings.
    pub fn new(
        indirection_name: impl Into<String>,
        method: Method,
        key: impl Into<RequestKey<M>>,
        options: Options,
    ) -> Result<Self> {
        Self::with_settings(
            indirection_name,
            method,
            key,
            options,
            &RequestSettings::default(),
        )
    }

    /// Build a request, parsing URI keys with the given settings.
    pub fn with_settings(
        indirection_name: impl Into<String>,
        method: Method,
        key: impl Into<RequestKey<M>>,
        options: Options,
        settings: &RequestSettings,
    ) -> Result<Self> {
        let mut request = Self {
            indirection_name: indirection_name.into(),
            method,
            key: String::new(),
            instance: None,
            options,
            node: None,
            ip: None,
            authenticated: false,
            ignore_cache: false,
            ignore_terminus: false,
            use_cache: None,
            environment: None,
            server: None,
            port: None,
            protocol: None,
            uri: None,
        };
        request.consume_attribute_options()?;

        match key.into() {
            RequestKey::Instance(instance) => {
                request.key = instance.name().to_string();
                request.instance = Some(instance);
            }
            RequestKey::Name(key) if URI_KEY.is_match(&key) => request.set_uri_key(key, settings)?,
            RequestKey::Name(key) => request.key = key,
        }

        Ok(request)
    }

    /// Build a request carrying `instance`, keyed by `key` or by the
    /// instance's own name.
    pub fn for_instance(
        indirection_name: impl Into<String>,
        method: Method,
        instance: M,
        key: Option<&str>,
        options: Options,
        settings: &RequestSettings,
    ) -> Result<Self> {
        let mut request = Self::with_settings(
            indirection_name,
            method,
            RequestKey::Instance(instance),
            options,
            settings,
        )?;
        if let Some(key) = key {
            request.key = key.to_string();
        }
        Ok(request)
    }

    fn consume_attribute_options(&mut self) -> Result<()> {
        self.node = self.take_string_option("node")?;
        self.ip = self.take_string_option("ip")?;
        self.environment = self.take_string_option("environment")?;
        self.authenticated = self.take_flag_option("authenticated");
        self.ignore_cache = self.take_flag_option("ignore_cache");
        self.ignore_terminus = self.take_flag_option("ignore_terminus");
        self.use_cache = self.options.remove("use_cache").map(|v| v.is_truthy());
        Ok(())
    }

    fn take_string_option(&mut self, name: &str) -> Result<Option<String>> {
        match self.options.remove(name) {
            None | Some(OptionValue::Null) => Ok(None),
            Some(OptionValue::String(s)) | Some(OptionValue::Symbol(s)) => Ok(Some(s)),
            Some(other) => Err(IndirectorError::Request(format!(
                "option {name} must be a string, got {}",
                other.kind()
            ))),
        }
    }

    fn take_flag_option(&mut self, name: &str) -> bool {
        self.options.remove(name).is_some_and(|v| v.is_truthy())
    }

    fn set_uri_key(&mut self, key: String, settings: &RequestSettings) -> Result<()> {
        let uri = Url::parse(&key)
            .map_err(|e| IndirectorError::Request(format!("could not understand URL {key}: {e}")))?;
        let path = decode(uri.path())?;

        // file URIs short-circuit to the full local path.
        if uri.scheme() == "file" {
            self.key = path;
            return Ok(());
        }

        self.server = uri.host_str().filter(|h| !h.is_empty()).map(str::to_string);
        self.port = Some(match uri.port() {
            Some(port) => port,
            None if uri.scheme() == settings.native_scheme => settings.default_port,
            None => uri.port_or_known_default().unwrap_or(0),
        });
        self.protocol = Some(uri.scheme().to_string());
        self.key = path.strip_prefix('/').unwrap_or(&path).to_string();
        self.uri = Some(key);
        Ok(())
    }

    // -- Accessors ----------------------------------------------------------

    pub fn indirection_name(&self) -> &str {
        &self.indirection_name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn instance(&self) -> Option<&M> {
        self.instance.as_ref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// The original URI text, when the key was URI-shaped.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn ignore_cache(&self) -> bool {
        self.ignore_cache
    }

    pub fn ignore_terminus(&self) -> bool {
        self.ignore_terminus
    }

    /// Whether the cache may be used; true unless overridden.
    pub fn use_cache(&self) -> bool {
        self.use_cache.unwrap_or(true)
    }

    /// Search requests return many values.
    pub fn is_plural(&self) -> bool {
        self.method == Method::Search
    }

    /// Requests carrying a caller identity come from another host.
    pub fn is_remote(&self) -> bool {
        self.node.is_some() || self.ip.is_some()
    }

    /// The URI when known, otherwise `/<indirection>/<key>`.
    pub fn description(&self) -> String {
        match &self.uri {
            Some(uri) => uri.clone(),
            None => format!("/{}/{}", self.indirection_name, self.key),
        }
    }

    /// The key, percent-encoded for use in a URL path.
    pub fn escaped_key(&self) -> String {
        urlencoding::encode(&self.key).into_owned()
    }

    /// The options plus every identity attribute that is set.
    pub fn to_options(&self) -> Options {
        let mut all = self.options.clone();
        if let Some(node) = &self.node {
            all.insert("node", node.as_str());
        }
        if let Some(ip) = &self.ip {
            all.insert("ip", ip.as_str());
        }
        if let Some(environment) = &self.environment {
            all.insert("environment", environment.as_str());
        }
        if self.authenticated {
            all.insert("authenticated", true);
        }
        if self.ignore_cache {
            all.insert("ignore_cache", true);
        }
        if self.ignore_terminus {
            all.insert("ignore_terminus", true);
        }
        if let Some(use_cache) = self.use_cache {
            all.insert("use_cache", use_cache);
        }
        all
    }

    /// This request under another verb, without an instance.
    ///
    /// The key is carried over as already parsed, so follow-up calls (such
    /// as the cache lookup behind a `find`) address the same entry even when
    /// the parsed key is itself URI-shaped.
    pub fn for_method(&self, method: Method) -> Self {
        Self {
            method,
            instance: None,
            ..self.clone()
        }
    }

    /// This request under another verb, carrying `instance` under the
    /// same parsed key.
    pub fn with_instance(&self, method: Method, instance: M) -> Self {
        Self {
            method,
            instance: Some(instance),
            ..self.clone()
        }
    }

    /// Render the options as a URL query, `?a=1&b=2`, or `""` when empty.
    ///
    /// Null values are skipped, arrays expand to one pair per element, and
    /// nested arrays or maps are rejected.
    pub fn query_string(&self) -> Result<String> {
        let mut pairs = Vec::new();
        for (name, value) in self.options.iter() {
            let unsupported = |kind: &str| IndirectorError::UnsupportedOption {
                option: name.clone(),
                kind: kind.to_string(),
            };
            match value {
                OptionValue::Array(items) => {
                    for item in items {
                        match item.scalar_text() {
                            None => {}
                            Some(Ok(text)) => pairs.push(encode_pair(name, &text)),
                            Some(Err(kind)) => return Err(unsupported(kind)),
                        }
                    }
                }
                scalar => match scalar.scalar_text() {
                    None => {}
                    Some(Ok(text)) => pairs.push(encode_pair(name, &text)),
                    Some(Err(kind)) => return Err(unsupported(kind)),
                },
            }
        }

        if pairs.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("?{}", pairs.join("&")))
        }
    }
}

impl<M> fmt::Display for Request<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "{uri}"),
            None => write!(f, "/{}/{}", self.indirection_name, self.key),
        }
    }
}

fn encode_pair(name: &str, value: &str) -> String {
    format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
}

fn decode(text: &str) -> Result<String> {
    urlencoding::decode(text)
        .map(|s| s.into_owned())
        .map_err(|e| IndirectorError::Request(format!("invalid escape in {text}: {e}")))
}
