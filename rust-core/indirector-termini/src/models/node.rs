// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A managed node: its classes, parameters and environment.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use indirector_core::Model;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
            parameters: BTreeMap::new(),
            environment: None,
            expiration: None,
        }
    }

    /// Append classes, skipping ones already present.
    pub fn add_classes<I, S>(&mut self, classes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for class in classes {
            let class = class.into();
            if !self.classes.contains(&class) {
                self.classes.push(class);
            }
        }
    }

    /// Add parameters that are not already set.
    pub fn merge_parameters(&mut self, parameters: &BTreeMap<String, serde_json::Value>) {
        for (name, value) in parameters {
            self.parameters
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl Model for Node {
    fn name(&self) -> &str {
        &self.name
    }

    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    fn set_expiration(&mut self, expiration: DateTime<Utc>) {
        self.expiration = Some(expiration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_are_deduplicated() {
        let mut node = Node::new("web1");
        node.add_classes(["base", "web"]);
        node.add_classes(vec!["web".to_string(), "ssl".to_string()]);
        assert_eq!(node.classes, vec!["base", "web", "ssl"]);
    }

    #[test]
    fn test_existing_parameters_win() {
        let mut node = Node::new("web1");
        node.parameters
            .insert("role".to_string(), serde_json::json!("frontend"));

        let mut inherited = BTreeMap::new();
        inherited.insert("role".to_string(), serde_json::json!("generic"));
        inherited.insert("ntp".to_string(), serde_json::json!(false));
        node.merge_parameters(&inherited);

        assert_eq!(node.parameters["role"], "frontend");
        assert_eq!(node.parameters["ntp"], false);
    }
}
