// SPDX-License-Identifier: PMPL-1.0-or-later
//! Layer configuration.
//!
//! Defaults:
//! - run_interval: 1800 seconds (default TTL of every indirection)
//! - master_port: 8140, server: "puppet"
//! - run_mode: server, data under /var/lib/indirector/{server_data,client_data}
//! - environment: "production"
//! - bucketdir: /var/lib/indirector/bucket, ssldir: /etc/indirector/ssl

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndirectorError, Result};

/// Which side of the platform this process is running as.
///
/// Selects the base directory used by the file termini.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Central server: stores data on behalf of many nodes.
    Server,
    /// Agent: stores its own cached data.
    Client,
}

/// Settings for the LDAP node terminus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapSettings {
    /// Search base.
    pub base: String,
    /// Attributes whose values are class names.
    pub class_attrs: Vec<String>,
    /// Attribute naming the parent node; empty disables parents.
    pub parent_attr: String,
    /// Attribute holding `name=value` parameter pairs.
    pub stacked_attrs: Vec<String>,
    /// Attribute holding the node environment.
    pub environment_attr: String,
    /// Search filter; `%s` is replaced with the node name.
    pub search_string: String,
    /// Attributes to fetch; `["all"]` fetches everything.
    pub attrs: Vec<String>,
    /// Use the fully qualified name rather than the common name.
    pub fqdn: bool,
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            base: String::new(),
            class_attrs: vec!["puppetclass".to_string()],
            parent_attr: "parentnode".to_string(),
            stacked_attrs: vec!["puppetvar".to_string()],
            environment_attr: "environment".to_string(),
            search_string: "(&(objectclass=puppetClient)(cn=%s))".to_string(),
            attrs: vec!["all".to_string()],
            fqdn: false,
        }
    }
}

/// Settings for the PEM-file terminus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslSettings {
    /// Root of the SSL directory tree.
    pub ssldir: PathBuf,
    /// Name under which the certificate authority's own entry is stored.
    pub ca_name: String,
}

impl Default for SslSettings {
    fn default() -> Self {
        Self {
            ssldir: PathBuf::from("/etc/indirector/ssl"),
            ca_name: "ca".to_string(),
        }
    }
}

/// Configuration consumed by indirections and termini.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndirectorConfig {
    /// Default TTL, in seconds, for values returned through an indirection.
    pub run_interval: u64,
    /// Port assumed for URIs using the native remote scheme without a port.
    pub master_port: u16,
    /// Default remote server for termini talking to a central server.
    pub server: String,
    /// Whether this process runs as the server or as a client.
    pub run_mode: RunMode,
    /// Base directory for file termini in server mode.
    pub server_datadir: PathBuf,
    /// Base directory for file termini in client mode.
    pub client_datadir: PathBuf,
    /// Environment sent with remote requests when none is given.
    pub environment: String,
    /// Named settings selecting terminus classes, e.g. `node_terminus`.
    pub terminus_settings: HashMap<String, String>,
    /// Root of the checksum-keyed file bucket.
    pub bucketdir: PathBuf,
    /// LDAP node terminus settings.
    pub ldap: LdapSettings,
    /// PEM-file terminus settings.
    pub ssl: SslSettings,
}

impl IndirectorConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| IndirectorError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no indirection can run with.
    pub fn validate(&self) -> Result<()> {
        if self.run_interval == 0 {
            return Err(IndirectorError::Configuration(
                "run_interval must be a positive number of seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            IndirectorError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Look up a terminus setting by name.
    pub fn setting(&self, name: &str) -> Option<&str> {
        self.terminus_settings.get(name).map(String::as_str)
    }

    /// Set (or replace) a terminus setting.
    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.terminus_settings.insert(name.into(), value.into());
        self
    }

    /// Base directory for file termini under the current run mode.
    pub fn datadir(&self) -> &Path {
        match self.run_mode {
            RunMode::Server => &self.server_datadir,
            RunMode::Client => &self.client_datadir,
        }
    }
}

impl Default for IndirectorConfig {
    fn default() -> Self {
        Self {
            run_interval: 1800,
            master_port: 8140,
            server: "puppet".to_string(),
            run_mode: RunMode::Server,
            server_datadir: PathBuf::from("/var/lib/indirector/server_data"),
            client_datadir: PathBuf::from("/var/lib/indirector/client_data"),
            environment: "production".to_string(),
            terminus_settings: HashMap::new(),
            bucketdir: PathBuf::from("/var/lib/indirector/bucket"),
            ldap: LdapSettings::default(),
            ssl: SslSettings::default(),
        }
    }
}
