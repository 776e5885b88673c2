// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The process-wide table of indirections.
//
// `Indirector` is an explicit registry object rather than global state:
// hosts create one, share it (it is `Send + Sync`), and register every
// indirection and adapter through it. Indirections of different model types
// live in one table; typed access checks the model type on lookup.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::config::IndirectorConfig;
use crate::error::{IndirectorError, Result};
use crate::indirection::{Indirection, IndirectionOptions};
use crate::model::Model;
use crate::terminus::{NamedTerminus, TerminusFactory};

struct Entry {
    model_name: &'static str,
    indirection: Arc<dyn Any + Send + Sync>,
}

/// Registry of indirections and their adapters.
pub struct Indirector {
    config: Arc<IndirectorConfig>,
    indirections: RwLock<HashMap<String, Entry>>,
}

impl Default for Indirector {
    fn default() -> Self {
        Self::new(IndirectorConfig::default())
    }
}

impl std::fmt::Debug for Indirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indirector")
            .field("indirections", &self.names())
            .finish()
    }
}

impl Indirector {
    pub fn new(config: IndirectorConfig) -> Self {
        Self {
            config: Arc::new(config),
            indirections: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Arc<IndirectorConfig> {
        &self.config
    }

    /// Create and register an indirection. Names are unique.
    pub fn create<M: Model>(
        &self,
        name: &str,
        options: IndirectionOptions<M>,
    ) -> Result<Arc<Indirection<M>>> {
        let mut table = self
            .indirections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if table.contains_key(name) {
            return Err(IndirectorError::DuplicateIndirection(name.to_string()));
        }

        let indirection = Arc::new(Indirection::new(name, options, Arc::clone(&self.config))?);
        table.insert(
            name.to_string(),
            Entry {
                model_name: indirection.model_name(),
                indirection: Arc::clone(&indirection) as Arc<dyn Any + Send + Sync>,
            },
        );
        info!(indirection = %name, model = %indirection.model_name(), "created indirection");
        Ok(indirection)
    }

    /// The indirection named `name`, if it exists and serves model `M`.
    pub fn instance<M: Model>(&self, name: &str) -> Option<Arc<Indirection<M>>> {
        self.indirection(name).ok()
    }

    /// The indirection named `name`.
    ///
    /// Fails when no such indirection exists, or when it serves a different
    /// model type.
    pub fn indirection<M: Model>(&self, name: &str) -> Result<Arc<Indirection<M>>> {
        let table = self
            .indirections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = table
            .get(name)
            .ok_or_else(|| IndirectorError::UnknownIndirection(name.to_string()))?;
        Arc::clone(&entry.indirection)
            .downcast::<Indirection<M>>()
            .map_err(|_| {
                IndirectorError::Configuration(format!(
                    "indirection {name} serves {}, not {}",
                    entry.model_name,
                    std::any::type_name::<M>()
                ))
            })
    }

    /// Name of the model type served by `name`.
    pub fn model_name(&self, name: &str) -> Option<&'static str> {
        self.indirections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| entry.model_name)
    }

    /// Every indirection name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .indirections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Drop an indirection. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self
            .indirections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            debug!(indirection = %name, "removed indirection");
        }
        removed
    }

    /// Register an adapter factory for an existing indirection.
    pub fn register_terminus<M: Model>(
        &self,
        indirection: &str,
        terminus: &str,
        factory: TerminusFactory<M>,
    ) -> Result<()> {
        self.indirection::<M>(indirection)?
            .register_terminus(terminus, factory);
        Ok(())
    }

    /// Register adapter `T` under the name derived from its type name.
    /// Returns that name.
    pub fn register<M: Model, T: NamedTerminus<M>>(&self, indirection: &str) -> Result<String> {
        let name = T::adapter_name();
        self.register_terminus::<M>(indirection, &name, T::factory())?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::Widget;

    #[test]
    fn test_duplicate_names_are_rejected() {
        let indirector = Indirector::default();
        indirector
            .create::<Widget>("widget", IndirectionOptions::new())
            .unwrap();
        let err = indirector
            .create::<Widget>("widget", IndirectionOptions::new())
            .unwrap_err();
        assert!(matches!(err, IndirectorError::DuplicateIndirection(name) if name == "widget"));
    }

    #[test]
    fn test_lookup_and_remove() {
        let indirector = Indirector::default();
        let created = indirector
            .create::<Widget>("widget", IndirectionOptions::new().ttl(30))
            .unwrap();

        let found = indirector.instance::<Widget>("widget").unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(found.ttl(), 30);
        assert!(indirector.model_name("widget").unwrap().ends_with("Widget"));
        assert_eq!(indirector.names(), vec!["widget".to_string()]);

        assert!(indirector.remove("widget"));
        assert!(!indirector.remove("widget"));
        assert!(indirector.instance::<Widget>("widget").is_none());
        // The name is free again.
        assert!(indirector
            .create::<Widget>("widget", IndirectionOptions::new())
            .is_ok());
    }

    #[test]
    fn test_unknown_indirection() {
        let indirector = Indirector::default();
        assert!(matches!(
            indirector.indirection::<Widget>("nope"),
            Err(IndirectorError::UnknownIndirection(_))
        ));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let indirector = Indirector::default();
        let err = indirector
            .create::<Widget>("widget", IndirectionOptions::new().ttl(0))
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Configuration(_)));
        assert!(indirector.names().is_empty());
    }
}
