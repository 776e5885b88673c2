// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-request terminus selection.

use crate::model::Model;
use crate::request::Request;

/// Chooses the terminus serving a request.
///
/// Indirections with a selector ignore their static terminus class. `None`
/// means no terminus fits the request, which the dispatcher reports as a
/// configuration error.
pub trait TerminusSelector<M: Model>: Send + Sync {
    fn select(&self, request: &Request<M>) -> Option<String>;
}

impl<M: Model, F> TerminusSelector<M> for F
where
    F: Fn(&Request<M>) -> Option<String> + Send + Sync,
{
    fn select(&self, request: &Request<M>) -> Option<String> {
        self(request)
    }
}

/// Routes by the protocol of URI-shaped keys.
///
/// Keys without a protocol, or with the `file` scheme, go to the local
/// terminus. Any other protocol with a server goes to the remote terminus.
/// A remote protocol without a server has no terminus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSelector {
    local: String,
    remote: String,
}

impl ProtocolSelector {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

impl Default for ProtocolSelector {
    fn default() -> Self {
        Self::new("file", "rest")
    }
}

impl<M: Model> TerminusSelector<M> for ProtocolSelector {
    fn select(&self, request: &Request<M>) -> Option<String> {
        match (request.protocol(), request.server()) {
            (None, _) | (Some("file"), _) => Some(self.local.clone()),
            (Some(_), Some(_)) => Some(self.remote.clone()),
            (Some(_), None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::Widget;
    use crate::request::{Method, Options};

    fn select(key: &str) -> Option<String> {
        let request: Request<Widget> =
            Request::new("file_content", Method::Find, key, Options::new()).unwrap();
        ProtocolSelector::default().select(&request)
    }

    #[test]
    fn test_protocol_routing() {
        assert_eq!(select("/etc/hosts").as_deref(), Some("file"));
        assert_eq!(select("file:///etc/hosts").as_deref(), Some("file"));
        assert_eq!(select("puppet://server/modules/foo").as_deref(), Some("rest"));
        assert_eq!(select("puppet:///modules/foo"), None);
    }

    #[test]
    fn test_closure_selector() {
        let selector = |request: &Request<Widget>| Some(format!("by_{}", request.key()));
        let request: Request<Widget> =
            Request::new("widget", Method::Find, "k", Options::new()).unwrap();
        assert_eq!(selector.select(&request).as_deref(), Some("by_k"));
    }
}
