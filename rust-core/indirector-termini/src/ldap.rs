// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// LDAP node terminus.
//
// Nodes are looked up by full name, then by short hostname, then as
// `default`. Entries become `Node`s: class attributes give the classes,
// every other attribute becomes a parameter (`"true"`/`"false"` become
// booleans), stacked `name=value` attributes fill in parameters that are not
// otherwise set, and parent entries are merged recursively with the child's
// values winning.
//
// The directory client sits behind `DirectoryConnection`. A failed search is
// retried once after reconnecting.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use indirector_core::{
    IndirectorError, LdapSettings, OptionValue, Request, Result, Terminus, TerminusContext,
    TerminusError, TerminusFactory,
};

use crate::models::Node;

static CN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cn\s*=\s*([^,\s]+)").unwrap_or_else(|e| panic!("cn pattern: {e}"))
});
static DC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)dc\s*=\s*([^,\s]+)").unwrap_or_else(|e| panic!("dc pattern: {e}"))
});

/// One directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl LdapEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style: append values to an attribute.
    pub fn with<I, S>(mut self, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(attribute.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute).first().map(String::as_str)
    }
}

/// A connection to a directory server.
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    /// Subtree search under `base`. `attributes` of `None` fetches all.
    async fn search(
        &self,
        base: &str,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> std::result::Result<Vec<LdapEntry>, TerminusError>;

    /// Drop and re-establish the connection.
    async fn reconnect(&self) -> std::result::Result<(), TerminusError>;
}

/// A node as read from the directory, before parents are merged.
#[derive(Debug, Clone, Default)]
struct NodeInfo {
    name: String,
    classes: Vec<String>,
    parameters: BTreeMap<String, serde_json::Value>,
    environment: Option<String>,
    parent: Option<String>,
}

pub struct Ldap {
    indirection: String,
    settings: LdapSettings,
    connection: Arc<dyn DirectoryConnection>,
}

impl Ldap {
    pub const ADAPTER_NAME: &'static str = "ldap";

    pub fn new(
        indirection: impl Into<String>,
        settings: LdapSettings,
        connection: Arc<dyn DirectoryConnection>,
    ) -> Self {
        Self {
            indirection: indirection.into(),
            settings,
            connection,
        }
    }

    /// A factory building LDAP termini on `connection`, configured from the
    /// layer's `ldap` settings.
    pub fn factory(connection: Arc<dyn DirectoryConnection>) -> TerminusFactory<Node> {
        Arc::new(move |context: &TerminusContext| {
            Ok(Arc::new(Ldap::new(
                context.indirection.as_str(),
                context.config.ldap.clone(),
                Arc::clone(&connection),
            )) as Arc<dyn Terminus<Node>>)
        })
    }

    /// The configured filter with `%s` replaced by `name`.
    pub fn search_filter(&self, name: &str) -> String {
        self.settings.search_string.replace("%s", name)
    }

    /// Attributes to request, or `None` for all of them.
    pub fn search_attributes(&self) -> Option<Vec<String>> {
        if self.settings.attrs.iter().any(|a| a == "all") {
            return None;
        }
        let mut attrs = self.settings.attrs.clone();
        let extra = self
            .settings
            .class_attrs
            .iter()
            .chain(std::iter::once(&self.settings.parent_attr))
            .chain(self.settings.stacked_attrs.iter())
            .filter(|a| !a.is_empty());
        for attr in extra {
            if !attrs.contains(attr) {
                attrs.push(attr.clone());
            }
        }
        Some(attrs)
    }

    fn fail(&self, key: &str, source: TerminusError) -> IndirectorError {
        IndirectorError::terminus(self.indirection.as_str(), key, source)
    }

    /// Search, reconnecting and retrying once on failure.
    async fn ldap_search(&self, key: &str, filter: &str) -> Result<Vec<LdapEntry>> {
        let attrs = self.search_attributes();
        let base = self.settings.base.as_str();

        match self.connection.search(base, filter, attrs.as_deref()).await {
            Ok(entries) => Ok(entries),
            Err(first) => {
                warn!(indirection = %self.indirection, error = %first, "retrying LDAP connection");
                self.connection
                    .reconnect()
                    .await
                    .map_err(|e| self.fail(key, e))?;
                self.connection
                    .search(base, filter, attrs.as_deref())
                    .await
                    .map_err(|e| self.fail(key, TerminusError::Unavailable(format!("LDAP search failed: {e}"))))
            }
        }
    }

    /// The entry for exactly `name`, if any.
    async fn name_to_info(&self, key: &str, name: &str) -> Result<Option<NodeInfo>> {
        let entries = self.ldap_search(key, &self.search_filter(name)).await?;
        Ok(entries.last().map(|entry| self.entry_to_info(entry, false)))
    }

    fn entry_to_info(&self, entry: &LdapEntry, fqdn: bool) -> NodeInfo {
        let cn = CN
            .captures(&entry.dn)
            .and_then(|c| c.get(1))
            .map_or(entry.dn.as_str(), |m| m.as_str());
        let name = if fqdn {
            std::iter::once(cn)
                .chain(DC.captures_iter(&entry.dn).filter_map(|c| c.get(1)).map(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join(".")
        } else {
            cn.to_string()
        };

        let parent = if self.settings.parent_attr.is_empty() {
            None
        } else {
            entry.first(&self.settings.parent_attr).map(str::to_string)
        };

        let mut classes = Vec::new();
        for attr in &self.settings.class_attrs {
            for class in entry.values(attr) {
                if !classes.contains(class) {
                    classes.push(class.clone());
                }
            }
        }

        let mut parameters = BTreeMap::new();
        for (attr, values) in &entry.attributes {
            if self.settings.stacked_attrs.contains(attr) {
                continue;
            }
            let value = match values.as_slice() {
                [single] => convert_value(single),
                many => serde_json::Value::Array(many.iter().map(|v| convert_value(v)).collect()),
            };
            parameters.insert(attr.clone(), value);
        }
        for attr in &self.settings.stacked_attrs {
            for pair in entry.values(attr) {
                let (param, value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
                parameters
                    .entry(param.to_string())
                    .or_insert_with(|| convert_value(value));
            }
        }

        let environment = entry
            .first(&self.settings.environment_attr)
            .map(str::to_string);

        NodeInfo {
            name,
            classes,
            parameters,
            environment,
            parent,
        }
    }

    /// Fold every ancestor of `info` into it.
    async fn merge_parents(&self, key: &str, info: &mut NodeInfo) -> Result<()> {
        let mut seen = vec![info.name.clone()];
        let mut next = info.parent.clone();

        while let Some(parent) = next {
            if seen.contains(&parent) {
                return Err(self.fail(
                    key,
                    TerminusError::InvalidData(format!(
                        "found loop in LDAP node parents; {parent} appears twice"
                    )),
                ));
            }
            let parent_info = self.name_to_info(key, &parent).await?.ok_or_else(|| {
                self.fail(
                    key,
                    TerminusError::InvalidData(format!("could not find parent node {parent}")),
                )
            })?;
            debug!(indirection = %self.indirection, node = %info.name, parent = %parent, "merging parent");

            for class in parent_info.classes {
                if !info.classes.contains(&class) {
                    info.classes.push(class);
                }
            }
            for (param, value) in parent_info.parameters {
                info.parameters.entry(param).or_insert(value);
            }
            if info.environment.is_none() {
                info.environment = parent_info.environment;
            }

            seen.push(parent);
            next = parent_info.parent;
        }
        Ok(())
    }

    async fn complete(&self, key: &str, mut info: NodeInfo, request: &Request<Node>) -> Result<NodeInfo> {
        if info.parent.is_some() {
            self.merge_parents(key, &mut info).await?;
        }
        if info.environment.is_none() {
            info.environment = request.environment().map(str::to_string);
        }
        Ok(info)
    }
}

fn convert_value(value: &str) -> serde_json::Value {
    match value {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        other => serde_json::Value::String(other.to_string()),
    }
}

fn info_to_node(name: &str, info: NodeInfo) -> Node {
    let mut node = Node::new(name);
    node.add_classes(info.classes);
    node.parameters = info.parameters;
    node.environment = info.environment;
    node
}

#[async_trait]
impl Terminus<Node> for Ldap {
    fn name(&self) -> &str {
        Self::ADAPTER_NAME
    }

    async fn find(&self, request: &Request<Node>) -> Result<Option<Node>> {
        let key = request.key();
        let mut names = vec![key.to_string()];
        if let Some((short, _)) = key.split_once('.') {
            names.push(short.to_string());
        }
        names.push("default".to_string());

        for name in &names {
            let Some(info) = self.name_to_info(key, name).await? else {
                continue;
            };
            debug!(indirection = %self.indirection, key = %key, entry = %name, "found node entry");
            let info = self.complete(key, info, request).await?;
            return Ok(Some(info_to_node(key, info)));
        }
        Ok(None)
    }

    /// Nodes carrying every class named by the `class` option, or every
    /// node without one. The `fqdn` option names nodes by their full DN.
    async fn search(&self, request: &Request<Node>) -> Result<Vec<Node>> {
        let classes: Vec<String> = match request.options().get("class") {
            None | Some(OptionValue::Null) => Vec::new(),
            Some(OptionValue::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(other) => other.as_str().map(str::to_string).into_iter().collect(),
        };
        let class_attr = self
            .settings
            .class_attrs
            .first()
            .map_or("puppetclass", String::as_str);
        let filter = if classes.is_empty() {
            "(objectclass=puppetClient)".to_string()
        } else {
            let terms: String = classes
                .iter()
                .map(|class| format!("({class_attr}={class})"))
                .collect();
            format!("(&(objectclass=puppetClient){terms})")
        };
        let fqdn = request
            .options()
            .get("fqdn")
            .map_or(self.settings.fqdn, OptionValue::is_truthy);

        let entries = self.ldap_search(request.key(), &filter).await?;
        let mut nodes = Vec::with_capacity(entries.len());
        for entry in &entries {
            let info = self.entry_to_info(entry, fqdn);
            let name = info.name.clone();
            let info = self.complete(&name, info, request).await?;
            nodes.push(info_to_node(&name, info));
        }
        Ok(nodes)
    }
}
