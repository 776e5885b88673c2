// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory terminus.
//
// Values live in a `HashMap` behind a tokio `RwLock`. Data does not survive
// the process; this is intended for caches, tests and ephemeral state.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use indirector_core::{
    IndirectorError, Model, NamedTerminus, Request, Result, Terminus, TerminusContext,
};

/// A process-local keyed store.
pub struct Memory<M: Model> {
    indirection: String,
    values: RwLock<HashMap<String, M>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Memory<M> {
    pub fn new(indirection: impl Into<String>) -> Self {
        Self {
            indirection: indirection.into(),
            values: RwLock::new(HashMap::new()),
            _model: PhantomData,
        }
    }

    /// Number of stored values.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    /// Drop every stored value.
    pub async fn clear(&self) {
        self.values.write().await.clear();
    }
}

impl<M: Model> std::fmt::Debug for Memory<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("indirection", &self.indirection)
            .finish()
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for Memory<M> {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        Ok(self.values.read().await.get(request.key()).cloned())
    }

    /// Values whose key contains the request key.
    async fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        let values = self.values.read().await;
        let mut matches: Vec<(&String, &M)> = values
            .iter()
            .filter(|(key, _)| key.contains(request.key()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(b.0));
        Ok(matches.into_iter().map(|(_, v)| v.clone()).collect())
    }

    async fn save(&self, request: &Request<M>) -> Result<()> {
        let instance = request.instance().cloned().ok_or_else(|| {
            IndirectorError::Request(format!("save of {} carries no instance", request.key()))
        })?;
        debug!(indirection = %self.indirection, key = %request.key(), "storing value in memory");
        self.values
            .write()
            .await
            .insert(request.key().to_string(), instance);
        Ok(())
    }

    async fn destroy(&self, request: &Request<M>) -> Result<()> {
        match self.values.write().await.remove(request.key()) {
            Some(_) => Ok(()),
            None => Err(IndirectorError::Request(format!(
                "could not find {} to destroy",
                request.key()
            ))),
        }
    }

    async fn head(&self, request: &Request<M>) -> Result<bool> {
        Ok(self.values.read().await.contains_key(request.key()))
    }
}

impl<M: Model> NamedTerminus<M> for Memory<M> {
    const TYPE_NAME: &'static str = "Memory";

    fn build(context: &TerminusContext) -> Result<Self> {
        Ok(Self::new(context.indirection.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use indirector_core::{Method, Options, RequestSettings};

    use super::*;
    use crate::models::Facts;

    fn request(method: Method, key: &str) -> Request<Facts> {
        Request::new("facts", method, key, Options::new()).unwrap()
    }

    fn save_request(facts: Facts) -> Request<Facts> {
        Request::for_instance(
            "facts",
            Method::Save,
            facts,
            None,
            Options::new(),
            &RequestSettings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_find_destroy() {
        let store = Memory::<Facts>::new("facts");
        assert!(store.find(&request(Method::Find, "a")).await.unwrap().is_none());

        store.save(&save_request(Facts::new("a"))).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.head(&request(Method::Head, "a")).await.unwrap());
        let found = store.find(&request(Method::Find, "a")).await.unwrap().unwrap();
        assert_eq!(found.name, "a");

        store.destroy(&request(Method::Destroy, "a")).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_destroy_missing_is_an_error() {
        let store = Memory::<Facts>::new("facts");
        let err = store
            .destroy(&request(Method::Destroy, "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Request(_)));
    }

    #[tokio::test]
    async fn test_search_matches_key_substrings() {
        let store = Memory::<Facts>::new("facts");
        for name in ["web1.example.com", "web2.example.com", "db1.example.com"] {
            store.save(&save_request(Facts::new(name))).await.unwrap();
        }

        let web: Vec<String> = store
            .search(&request(Method::Search, "web"))
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(web, vec!["web1.example.com", "web2.example.com"]);

        let all = store.search(&request(Method::Search, "")).await.unwrap();
        assert_eq!(all.len(), 3);

        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_adapter_name() {
        assert_eq!(<Memory<Facts> as NamedTerminus<Facts>>::adapter_name(), "memory");
    }
}
