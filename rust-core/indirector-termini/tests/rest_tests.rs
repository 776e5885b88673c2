// SPDX-License-Identifier: PMPL-1.0-or-later
//! REST terminus tests over a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use indirector_core::{
    IndirectionOptions, Indirector, IndirectorConfig, IndirectorError, Options, ProtocolSelector,
    TerminusError,
};
use indirector_termini::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, Memory, Node, Rest};

/// Replies with queued responses and records every request.
#[derive(Default)]
struct Scripted {
    replies: Mutex<VecDeque<Result<HttpResponse, TerminusError>>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl Scripted {
    fn reply(self, status: u16, body: serde_json::Value) -> Self {
        self.replies.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: serde_json::to_vec(&body).unwrap(),
        }));
        self
    }

    fn fail(self, error: TerminusError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for Scripted {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TerminusError> {
        self.sent.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TerminusError::Unavailable("no scripted reply".to_string())))
    }
}

fn indirector(transport: Arc<Scripted>) -> Indirector {
    let indirector = Indirector::new(IndirectorConfig::default());
    indirector
        .create::<Node>("node", IndirectionOptions::new().terminus_class("rest"))
        .unwrap();
    indirector
        .register_terminus::<Node>("node", "rest", Rest::factory(transport))
        .unwrap();
    indirector
}

fn node_json(name: &str) -> serde_json::Value {
    json!({"name": name, "classes": ["base"], "environment": "production"})
}

#[tokio::test]
async fn test_find_decodes_body() {
    let transport = Arc::new(Scripted::default().reply(200, node_json("web1")));
    let nodes = indirector(transport.clone()).indirection::<Node>("node").unwrap();

    let node = nodes.find("web1", Options::new()).await.unwrap().unwrap();
    assert_eq!(node.name, "web1");
    assert_eq!(node.classes, vec!["base"]);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, HttpMethod::Get);
    assert_eq!(sent[0].url.as_str(), "https://puppet:8140/production/node/web1");
    assert!(sent[0].body.is_none());
}

#[tokio::test]
async fn test_not_found_is_none() {
    let transport = Arc::new(
        Scripted::default()
            .reply(404, json!("not found"))
            .reply(404, json!("not found")),
    );
    let nodes = indirector(transport.clone()).indirection::<Node>("node").unwrap();

    assert!(nodes.find("ghost", Options::new()).await.unwrap().is_none());
    assert!(!nodes.head("ghost", Options::new()).await.unwrap());
    assert_eq!(transport.sent()[1].method, HttpMethod::Head);
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let transport = Arc::new(Scripted::default().reply(500, json!("boom")));
    let nodes = indirector(transport).indirection::<Node>("node").unwrap();

    let err = nodes.find("web1", Options::new()).await.unwrap_err();
    assert!(
        matches!(
            err,
            IndirectorError::Terminus {
                source: TerminusError::Transport(ref message),
                ..
            } if message.contains("500")
        ),
        "{err}"
    );
}

#[tokio::test]
async fn test_unreachable_server_is_retryable() {
    let transport = Arc::new(
        Scripted::default().fail(TerminusError::Unavailable("connection refused".to_string())),
    );
    let nodes = indirector(transport).indirection::<Node>("node").unwrap();
    assert!(nodes.find("web1", Options::new()).await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_search_uses_plural_path_and_query() {
    let transport = Arc::new(
        Scripted::default().reply(200, json!([node_json("web1"), node_json("web2")])),
    );
    let nodes = indirector(transport.clone()).indirection::<Node>("node").unwrap();

    let found = nodes
        .search(
            "web",
            Options::new()
                .with("environment", "dev")
                .with("class", vec!["base", "web"]),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|n| n.expiration.is_some()));
    assert_eq!(
        transport.sent()[0].url.as_str(),
        "https://puppet:8140/dev/nodes/web?class=base&class=web"
    );
}

#[tokio::test]
async fn test_search_rejects_non_array_body() {
    let transport = Arc::new(Scripted::default().reply(200, node_json("web1")));
    let nodes = indirector(transport).indirection::<Node>("node").unwrap();

    let err = nodes.search("web", Options::new()).await.unwrap_err();
    assert!(matches!(err, IndirectorError::Contract(_)), "{err}");
}

#[tokio::test]
async fn test_nested_option_cannot_be_sent() {
    let transport = Arc::new(Scripted::default());
    let nodes = indirector(transport.clone()).indirection::<Node>("node").unwrap();

    let nested = indirector_core::OptionValue::Array(vec![vec!["a"].into()]);
    let err = nodes
        .find("web1", Options::new().with("deep", nested))
        .await
        .unwrap_err();
    assert!(matches!(err, IndirectorError::UnsupportedOption { .. }));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_save_puts_json_body() {
    let transport = Arc::new(Scripted::default().reply(200, json!(null)));
    let nodes = indirector(transport.clone()).indirection::<Node>("node").unwrap();

    let mut node = Node::new("web1");
    node.add_classes(["base"]);
    nodes.save(node, None, Options::new()).await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].method, HttpMethod::Put);
    let body: Node = serde_json::from_slice(sent[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body.name, "web1");
    assert_eq!(body.classes, vec!["base"]);
}

#[tokio::test]
async fn test_destroy_sends_delete_and_reports_failures() {
    let transport = Arc::new(
        Scripted::default()
            .reply(204, json!(null))
            .reply(404, json!("gone")),
    );
    let nodes = indirector(transport.clone()).indirection::<Node>("node").unwrap();

    nodes.destroy("web1", Options::new()).await.unwrap();
    assert_eq!(transport.sent()[0].method, HttpMethod::Delete);
    assert!(nodes.destroy("web1", Options::new()).await.is_err());
}

#[tokio::test]
async fn test_protocol_selector_routes_remote_keys_to_rest() {
    let transport = Arc::new(Scripted::default().reply(200, node_json("web1")));
    let indirector = Indirector::new(IndirectorConfig::default());
    let nodes = indirector
        .create::<Node>(
            "node",
            IndirectionOptions::new().selector(ProtocolSelector::new("memory", "rest")),
        )
        .unwrap();
    indirector.register::<Node, Memory<Node>>("node").unwrap();
    indirector
        .register_terminus::<Node>("node", "rest", Rest::factory(transport.clone()))
        .unwrap();

    // Local keys never touch the network.
    assert!(nodes.find("web1", Options::new()).await.unwrap().is_none());
    assert!(transport.sent().is_empty());

    let remote = nodes
        .find("puppet://master.example.com/web1", Options::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote.name, "web1");
    assert_eq!(
        transport.sent()[0].url.as_str(),
        "https://master.example.com:8140/production/node/web1"
    );
}
