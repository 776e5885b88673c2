// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Message-queue terminus.
//
// `save` publishes the instance, JSON encoded, to a topic named after the
// indirection. Nothing can be read back through the terminus: `find` always
// returns `None`. Consumers use `Queue::subscribe`, which runs until the
// broker closes the subscription.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

use indirector_core::{
    IndirectorError, Model, Request, Result, Terminus, TerminusContext, TerminusError,
    TerminusFactory,
};

/// A publish/subscribe broker connection.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Publish one message to `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> std::result::Result<(), TerminusError>;

    /// Receive every message published to `topic` from now on. The receiver
    /// yields `None` once the broker closes the subscription.
    async fn subscribe(
        &self,
        topic: &str,
    ) -> std::result::Result<mpsc::UnboundedReceiver<Vec<u8>>, TerminusError>;
}

/// In-process broker over tokio channels.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    topics: Arc<RwLock<HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// End every subscription to `topic`.
    pub async fn close(&self, topic: &str) {
        self.topics.write().await.remove(topic);
    }

    /// Number of live subscriptions to `topic`.
    pub async fn subscribers(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> std::result::Result<(), TerminusError> {
        let mut topics = self.topics.write().await;
        let Some(senders) = topics.get_mut(topic) else {
            debug!(topic = %topic, "no subscribers; message dropped");
            return Ok(());
        };
        senders.retain(|sender| sender.send(payload.clone()).is_ok());
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> std::result::Result<mpsc::UnboundedReceiver<Vec<u8>>, TerminusError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(receiver)
    }
}

/// Publishes saved instances to a queue.
pub struct Queue<M: Model> {
    indirection: String,
    client: Arc<dyn QueueClient>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Queue<M> {
    pub const ADAPTER_NAME: &'static str = "queue";

    pub fn new(indirection: impl Into<String>, client: Arc<dyn QueueClient>) -> Self {
        Self {
            indirection: indirection.into(),
            client,
            _model: PhantomData,
        }
    }

    /// A factory building queue termini that publish through `client`.
    pub fn factory(client: Arc<dyn QueueClient>) -> TerminusFactory<M> {
        Arc::new(move |context: &TerminusContext| {
            Ok(Arc::new(Queue::<M>::new(
                context.indirection.as_str(),
                Arc::clone(&client),
            )) as Arc<dyn Terminus<M>>)
        })
    }

    /// Feed every message on `topic` to `handler` until the subscription
    /// closes. Returns the number of messages handled successfully.
    ///
    /// Messages that fail to decode, and handler errors, are logged and
    /// skipped.
    pub async fn subscribe<H>(client: &dyn QueueClient, topic: &str, mut handler: H) -> Result<usize>
    where
        H: FnMut(M) -> Result<()> + Send,
    {
        let mut messages = client
            .subscribe(topic)
            .await
            .map_err(|e| IndirectorError::terminus(topic, "", e))?;
        info!(topic = %topic, "subscribed");

        let mut handled = 0usize;
        while let Some(payload) = messages.recv().await {
            let instance: M = match serde_json::from_slice(&payload) {
                Ok(instance) => instance,
                Err(e) => {
                    error!(topic = %topic, error = %e, "could not decode queued message");
                    continue;
                }
            };
            let name = instance.name().to_string();
            match handler(instance) {
                Ok(()) => handled += 1,
                Err(e) => {
                    error!(topic = %topic, key = %name, error = %e, "error handling queued message");
                }
            }
        }

        info!(topic = %topic, handled, "subscription closed");
        Ok(handled)
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for Queue<M> {
    fn name(&self) -> &str {
        Self::ADAPTER_NAME
    }

    async fn find(&self, _request: &Request<M>) -> Result<Option<M>> {
        Ok(None)
    }

    async fn save(&self, request: &Request<M>) -> Result<()> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::Request(format!("save of {} carries no instance", request.key()))
        })?;
        let payload = serde_json::to_vec(instance).map_err(|e| {
            IndirectorError::terminus(
                self.indirection.as_str(),
                request.key(),
                TerminusError::Serialization(e.to_string()),
            )
        })?;

        info!(topic = %self.indirection, key = %request.key(), "publishing to queue");
        self.client
            .publish(&self.indirection, payload)
            .await
            .map_err(|e| IndirectorError::terminus(self.indirection.as_str(), request.key(), e))
    }
}

#[cfg(test)]
mod tests {
    use indirector_core::{Method, Options, RequestSettings};

    use super::*;
    use crate::models::Facts;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let broker = MemoryQueue::new();
        broker.publish("facts", b"{}".to_vec()).await.unwrap();
        assert_eq!(broker.subscribers("facts").await, 0);
    }

    #[tokio::test]
    async fn test_save_publishes_and_find_returns_nothing() {
        let broker = MemoryQueue::new();
        let mut receiver = broker.subscribe("facts").await.unwrap();
        let queue = Queue::<Facts>::new("facts", Arc::new(broker.clone()));

        let save = Request::for_instance(
            "facts",
            Method::Save,
            Facts::new("node1").with_value("kernel", "Linux"),
            None,
            Options::new(),
            &RequestSettings::default(),
        )
        .unwrap();
        queue.save(&save).await.unwrap();

        let payload = receiver.recv().await.unwrap();
        let published: Facts = serde_json::from_slice(&payload).unwrap();
        assert_eq!(published.name, "node1");

        let find: Request<Facts> =
            Request::new("facts", Method::Find, "node1", Options::new()).unwrap();
        assert!(queue.find(&find).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let broker = MemoryQueue::new();
        let mut receiver = broker.subscribe("t").await.unwrap();
        assert_eq!(broker.subscribers("t").await, 1);
        broker.close("t").await;
        assert!(receiver.recv().await.is_none());
    }
}
