// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for request normalization

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use indirector_core::{IndirectorError, Method, Model, OptionValue, Options, Request};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Item {
    name: String,
}

impl Model for Item {
    fn name(&self) -> &str {
        &self.name
    }

    fn expiration(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_expiration(&mut self, _expiration: DateTime<Utc>) {}
}

/// Relative keys: never URI-shaped.
fn arb_plain_key() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9_./ -]{0,30}"
}

fn arb_host() -> impl Strategy<Value = String> {
    "[a-z]{1,10}(\\.[a-z]{2,5}){0,2}"
}

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,10}"
}

fn arb_scalar() -> impl Strategy<Value = OptionValue> {
    prop_oneof![
        any::<bool>().prop_map(OptionValue::Bool),
        any::<i64>().prop_map(OptionValue::Integer),
        "[ -~]{0,12}".prop_map(OptionValue::String),
        Just(OptionValue::Null),
    ]
}

proptest! {
    #[test]
    fn test_plain_keys_pass_through(key in arb_plain_key()) {
        let request: Request<Item> = Request::new("ind", Method::Find, key.as_str(), Options::new()).unwrap();
        prop_assert_eq!(request.key(), key.as_str());
        prop_assert!(request.uri().is_none());
        prop_assert!(request.server().is_none());
    }

    #[test]
    fn test_native_uri_round_trip(
        host in arb_host(),
        port in 1u16..u16::MAX,
        segments in prop::collection::vec(arb_segment(), 1..5),
    ) {
        let path = segments.join("/");
        let uri = format!("puppet://{host}:{port}/{path}");
        let request: Request<Item> = Request::new("ind", Method::Find, uri.as_str(), Options::new()).unwrap();

        prop_assert_eq!(request.server(), Some(host.as_str()));
        prop_assert_eq!(request.port(), Some(port));
        prop_assert_eq!(request.protocol(), Some("puppet"));
        prop_assert_eq!(request.key(), path.as_str());
        prop_assert_eq!(request.uri(), Some(uri.as_str()));
    }

    #[test]
    fn test_escaped_key_decodes_back(key in arb_plain_key()) {
        let request: Request<Item> = Request::new("ind", Method::Find, key.as_str(), Options::new()).unwrap();
        let escaped = request.escaped_key();
        prop_assert!(!escaped.contains(' '));
        prop_assert_eq!(urlencoding::decode(&escaped).unwrap().into_owned(), key);
    }

    #[test]
    fn test_scalar_options_always_render(
        values in prop::collection::btree_map("o_[a-z]{1,6}", arb_scalar(), 0..6),
    ) {
        let expected = values.values().filter(|v| !matches!(v, OptionValue::Null)).count();
        let options: Options = values.into_iter().collect();
        let request: Request<Item> = Request::new("ind", Method::Find, "k", options).unwrap();

        let query = request.query_string().unwrap();
        if expected == 0 {
            prop_assert_eq!(query, "");
        } else {
            prop_assert!(query.starts_with('?'));
            prop_assert_eq!(query[1..].split('&').count(), expected);
        }
    }

    #[test]
    fn test_nested_arrays_are_rejected(inner in prop::collection::vec(arb_scalar(), 0..4)) {
        let options = Options::new().with(
            "list",
            OptionValue::Array(vec![OptionValue::from("x"), OptionValue::Array(inner)]),
        );
        let request: Request<Item> = Request::new("ind", Method::Find, "k", options).unwrap();
        let is_unsupported = matches!(request.query_string(), Err(IndirectorError::UnsupportedOption { .. }));
        prop_assert!(is_unsupported);
    }
}
