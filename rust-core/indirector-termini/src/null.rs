// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminus that accepts everything and stores nothing.

use std::marker::PhantomData;

use async_trait::async_trait;

use indirector_core::{Model, NamedTerminus, Request, Result, Terminus, TerminusContext};

#[derive(Debug)]
pub struct Null<M: Model> {
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Null<M> {
    pub fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<M: Model> Default for Null<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for Null<M> {
    fn name(&self) -> &str {
        "null"
    }

    async fn find(&self, _request: &Request<M>) -> Result<Option<M>> {
        Ok(None)
    }

    async fn search(&self, _request: &Request<M>) -> Result<Vec<M>> {
        Ok(Vec::new())
    }

    async fn save(&self, _request: &Request<M>) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self, _request: &Request<M>) -> Result<()> {
        Ok(())
    }

    async fn head(&self, _request: &Request<M>) -> Result<bool> {
        Ok(false)
    }
}

impl<M: Model> NamedTerminus<M> for Null<M> {
    const TYPE_NAME: &'static str = "Null";

    fn build(_context: &TerminusContext) -> Result<Self> {
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use indirector_core::{Method, Options, RequestSettings};

    use super::*;
    use crate::models::Node;

    #[tokio::test]
    async fn test_null_swallows_everything() {
        let null = Null::<Node>::new();
        let save = Request::for_instance(
            "node",
            Method::Save,
            Node::new("n"),
            None,
            Options::new(),
            &RequestSettings::default(),
        )
        .unwrap();
        null.save(&save).await.unwrap();

        let find: Request<Node> = Request::new("node", Method::Find, "n", Options::new()).unwrap();
        assert!(null.find(&find).await.unwrap().is_none());
        assert!(!null.head(&find).await.unwrap());
        assert!(null.search(&find).await.unwrap().is_empty());
        null.destroy(&find).await.unwrap();
    }
}
