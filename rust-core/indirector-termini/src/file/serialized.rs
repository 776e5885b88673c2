// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serialized-file terminus family.
//
// One file per key under `<datadir>/<indirection>/`, encoded with a `Format`.
// All file I/O runs on tokio's blocking pool through `super::io`.

use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use indirector_core::{
    Capabilities, IndirectorError, Method, Model, NamedTerminus, Request, Result, Terminus,
    TerminusContext, TerminusError,
};

use super::format::{Cbor, Format, Json, Yaml, KNOWN_EXTENSIONS};
use super::io::{blocking, read_locked, remove_if_present, write_atomic};
use super::path::{key_path, search_glob, validate_key};

/// Files encoded as JSON.
pub type JsonFile<M> = SerializedFile<M, Json>;
/// Files encoded as YAML.
pub type YamlFile<M> = SerializedFile<M, Yaml>;
/// Files encoded as CBOR.
pub type CborFile<M> = SerializedFile<M, Cbor>;

/// Stores each value in its own file, encoded with `F`.
pub struct SerializedFile<M: Model, F: Format> {
    indirection: String,
    base: PathBuf,
    name: String,
    _types: PhantomData<fn() -> (M, F)>,
}

impl<M: Model, F: Format> std::fmt::Debug for SerializedFile<M, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedFile")
            .field("indirection", &self.indirection)
            .field("base", &self.base)
            .field("format", &F::EXTENSION)
            .finish()
    }
}

impl<M: Model, F: Format> SerializedFile<M, F> {
    /// Store files for `indirection` under `base`.
    pub fn new(indirection: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        Self {
            indirection: indirection.into(),
            base: base.into(),
            name: indirector_core::adapter_name(F::TYPE_NAME),
            _types: PhantomData,
        }
    }

    /// The file holding `key`.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        key_path(&self.base, &self.indirection, key, F::EXTENSION)
    }

    fn fail(&self, key: &str, source: TerminusError) -> IndirectorError {
        IndirectorError::terminus(self.indirection.as_str(), key, source)
    }
}

#[async_trait]
impl<M: Model, F: Format> Terminus<M> for SerializedFile<M, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            validate: true,
            ..Capabilities::default()
        }
    }

    /// Keys (and search patterns) must stay inside the storage directory.
    fn validate(&self, request: &Request<M>) -> Result<()> {
        match request.method() {
            Method::Search if request.key().is_empty() => Ok(()),
            _ => validate_key(request.key()),
        }
    }

    async fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        let path = self.path(request.key())?;
        debug!(indirection = %self.indirection, path = %path.display(), "reading");

        blocking(move || match read_locked(&path)? {
            Some(bytes) => F::deserialize(&bytes).map(Some),
            None => Ok(None),
        })
        .await
        .map_err(|e| self.fail(request.key(), e))
    }

    /// Every stored value whose name matches the request key as a glob,
    /// narrowed by the model's query hook.
    async fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        let pattern = search_glob(&self.base, &self.indirection, request.key(), F::EXTENSION)?;
        let paths = glob::glob(&pattern)
            .map_err(|e| IndirectorError::InvalidKey(format!("{}: {e}", request.key())))?;

        let values: Vec<M> = blocking(move || {
            let mut values = Vec::new();
            for entry in paths {
                let path = entry.map_err(|e| TerminusError::Io(e.into_error()))?;
                if let Some(bytes) = read_locked(&path)? {
                    values.push(F::deserialize(&bytes)?);
                }
            }
            Ok(values)
        })
        .await
        .map_err(|e| self.fail(request.key(), e))?;

        let mut matches = Vec::with_capacity(values.len());
        for value in values {
            if value.matches_query(request.options())? {
                matches.push(value);
            }
        }
        Ok(matches)
    }

    async fn save(&self, request: &Request<M>) -> Result<()> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::Request(format!("save of {} carries no instance", request.key()))
        })?;
        let path = self.path(request.key())?;
        let bytes = F::serialize(instance).map_err(|e| self.fail(request.key(), e))?;
        debug!(indirection = %self.indirection, path = %path.display(), "writing");

        blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| self.fail(request.key(), e))
    }

    /// Remove the key's file in every known encoding. Missing files are
    /// not an error.
    async fn destroy(&self, request: &Request<M>) -> Result<()> {
        let paths = KNOWN_EXTENSIONS
            .iter()
            .map(|ext| key_path(&self.base, &self.indirection, request.key(), ext))
            .collect::<Result<Vec<_>>>()?;

        let removed = blocking(move || {
            let mut removed = 0usize;
            for path in &paths {
                if remove_if_present(path)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| self.fail(request.key(), e))?;
        debug!(indirection = %self.indirection, key = %request.key(), removed, "destroyed");
        Ok(())
    }

    async fn head(&self, request: &Request<M>) -> Result<bool> {
        let path = self.path(request.key())?;
        blocking(move || path.try_exists().map_err(TerminusError::from))
            .await
            .map_err(|e| self.fail(request.key(), e))
    }
}

impl<M: Model, F: Format> NamedTerminus<M> for SerializedFile<M, F> {
    const TYPE_NAME: &'static str = F::TYPE_NAME;

    fn build(context: &TerminusContext) -> Result<Self> {
        Ok(Self::new(
            context.indirection.as_str(),
            context.config.datadir(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use indirector_core::{Options, RequestSettings};

    use super::*;
    use crate::models::Facts;

    fn find(key: &str) -> Request<Facts> {
        Request::new("facts", Method::Find, key, Options::new()).unwrap()
    }

    fn save(facts: Facts) -> Request<Facts> {
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
    async fn test_save_then_find() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlFile::<Facts>::new("facts", dir.path());
        let facts = Facts::new("node1").with_value("kernel", "Linux");

        store.save(&save(facts.clone())).await.unwrap();
        assert!(dir.path().join("facts/node1.yaml").exists());

        let found = store.find(&find("node1")).await.unwrap().unwrap();
        assert_eq!(found, facts);
        assert!(store.head(&find("node1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFile::<Facts>::new("facts", dir.path());
        assert!(store.find(&find("ghost")).await.unwrap().is_none());
        assert!(!store.head(&find("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_terminus_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("facts")).unwrap();
        fs::write(dir.path().join("facts/bad.json"), b"{oops").unwrap();

        let store = JsonFile::<Facts>::new("facts", dir.path());
        let err = store.find(&find("bad")).await.unwrap_err();
        assert!(matches!(
            err,
            IndirectorError::Terminus {
                source: TerminusError::Serialization(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_traversal_key_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = CborFile::<Facts>::new("facts", dir.path());
        let err = store.find(&find("../escape")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::InvalidKey(_)));
        assert!(store.validate(&find("../escape")).is_err());
    }

    #[test]
    fn test_adapter_names() {
        assert_eq!(<JsonFile<Facts> as NamedTerminus<Facts>>::adapter_name(), "json");
        assert_eq!(<YamlFile<Facts> as NamedTerminus<Facts>>::adapter_name(), "yaml");
        assert_eq!(<CborFile<Facts> as NamedTerminus<Facts>>::adapter_name(), "cbor");
    }
}
