// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Facts reported by a node, and the search queries run against them.
//
// Search options name what they compare:
//
// - `facts.<name>[.<op>]` compares a fact value.
// - `meta.timestamp[.<op>]` compares the time the facts were collected.
//
// `<op>` is one of `eq` (the default), `ne`, `lt`, `le`, `gt`, `ge`. Fact
// values compare numerically when both sides parse as numbers and as strings
// otherwise. Options naming any other subject never match.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use indirector_core::{IndirectorError, Model, OptionValue, Options, Result};

/// The facts of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facts {
    /// Node name.
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
    /// When the facts were collected.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl Facts {
    /// Empty facts collected now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            timestamp: Utc::now(),
            expiration: None,
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// A fact value rendered as text.
    pub fn value_text(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl Model for Facts {
    fn name(&self) -> &str {
        &self.name
    }

    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    fn set_expiration(&mut self, expiration: DateTime<Utc>) {
        self.expiration = Some(expiration);
    }

    fn matches_query(&self, options: &Options) -> Result<bool> {
        for (name, value) in options.iter() {
            let query = FactQuery::parse(name, value)?;
            if !query.matches(self) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Comparison operator of a fact query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn parse(op: &str) -> Result<Self> {
        match op {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "lt" => Ok(Self::Lt),
            "le" => Ok(Self::Le),
            "gt" => Ok(Self::Gt),
            "ge" => Ok(Self::Ge),
            other => Err(IndirectorError::Request(format!(
                "unknown comparison operator {other}"
            ))),
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// One parsed search option.
#[derive(Debug, Clone, PartialEq)]
pub enum FactQuery {
    Fact {
        name: String,
        comparison: Comparison,
        value: String,
    },
    Timestamp {
        comparison: Comparison,
        value: DateTime<Utc>,
    },
    /// An option about something facts do not describe.
    Unmatched,
}

impl FactQuery {
    pub fn parse(option: &str, value: &OptionValue) -> Result<Self> {
        let mut parts = option.splitn(3, '.');
        let subject = parts.next().unwrap_or_default();
        let name = parts.next();
        let comparison = Comparison::parse(parts.next().unwrap_or("eq"))?;

        match (subject, name) {
            ("facts", Some(name)) if !name.is_empty() => Ok(Self::Fact {
                name: name.to_string(),
                comparison,
                value: option_text(option, value)?,
            }),
            ("meta", Some("timestamp")) => Ok(Self::Timestamp {
                comparison,
                value: parse_time(&option_text(option, value)?)?,
            }),
            _ => Ok(Self::Unmatched),
        }
    }

    pub fn matches(&self, facts: &Facts) -> bool {
        match self {
            Self::Fact {
                name,
                comparison,
                value,
            } => match facts.value_text(name) {
                Some(actual) => comparison.holds(compare_values(&actual, value)),
                None => false,
            },
            Self::Timestamp { comparison, value } => {
                comparison.holds(facts.timestamp.cmp(value))
            }
            Self::Unmatched => false,
        }
    }
}

fn option_text(option: &str, value: &OptionValue) -> Result<String> {
    match value {
        OptionValue::String(s) | OptionValue::Symbol(s) => Ok(s.clone()),
        OptionValue::Integer(i) => Ok(i.to_string()),
        OptionValue::Float(x) => Ok(x.to_string()),
        OptionValue::Bool(b) => Ok(b.to_string()),
        other => Err(IndirectorError::UnsupportedOption {
            option: option.to_string(),
            kind: other.kind().to_string(),
        }),
    }
}

fn compare_values(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| IndirectorError::Request(format!("invalid timestamp {text}: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn facts() -> Facts {
        Facts::new("node1")
            .with_value("kernel", "Linux")
            .with_value("processorcount", "4")
            .with_value("memorysize_mb", 2048)
            .with_timestamp(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    fn matches(options: Options) -> bool {
        facts().matches_query(&options).unwrap()
    }

    #[test]
    fn test_default_operator_is_equality() {
        assert!(matches(Options::new().with("facts.kernel", "Linux")));
        assert!(!matches(Options::new().with("facts.kernel", "Darwin")));
        assert!(matches(Options::new()));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(matches(Options::new().with("facts.processorcount.gt", "3")));
        assert!(matches(Options::new().with("facts.processorcount.ge", 4)));
        assert!(!matches(Options::new().with("facts.processorcount.lt", "4")));
        assert!(matches(Options::new().with("facts.processorcount.le", "4.0")));
        // Numeric, not lexical: "10" > "4".
        assert!(matches(Options::new().with("facts.processorcount.lt", "10")));
        assert!(matches(Options::new().with("facts.memorysize_mb.eq", 2048)));
    }

    #[test]
    fn test_string_comparisons() {
        assert!(matches(Options::new().with("facts.kernel.ne", "Darwin")));
        assert!(matches(Options::new().with("facts.kernel.gt", "Darwin")));
        assert!(!matches(Options::new().with("facts.kernel.lt", "Darwin")));
    }

    #[test]
    fn test_missing_fact_never_matches() {
        assert!(!matches(Options::new().with("facts.nope", "x")));
        assert!(!matches(Options::new().with("facts.nope.ne", "x")));
    }

    #[test]
    fn test_all_options_must_match() {
        assert!(!matches(
            Options::new()
                .with("facts.kernel", "Linux")
                .with("facts.processorcount", "8")
        ));
    }

    #[test]
    fn test_timestamp_queries() {
        assert!(matches(
            Options::new().with("meta.timestamp.gt", "2026-02-28T00:00:00Z")
        ));
        assert!(matches(
            Options::new().with("meta.timestamp", "2026-03-01 12:00:00")
        ));
        assert!(!matches(
            Options::new().with("meta.timestamp.lt", "2026-03-01T12:00:00+00:00")
        ));
        assert!(facts()
            .matches_query(&Options::new().with("meta.timestamp", "yesterday"))
            .is_err());
    }

    #[test]
    fn test_unknown_subjects_never_match() {
        assert!(!matches(Options::new().with("other.kernel", "Linux")));
    }

    #[test]
    fn test_bad_operator_is_request_error() {
        let err = facts()
            .matches_query(&Options::new().with("facts.kernel.like", "Lin"))
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Request(_)));
    }
}
