// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-file terminus.
//
// Stores a model's raw bytes, unencoded, at `<datadir>/<indirection>/<key>.<ext>`.
// The extension defaults to the indirection name.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use indirector_core::{
    Capabilities, IndirectorError, Method, Model, NamedTerminus, Request, Result, Terminus,
    TerminusContext, TerminusError,
};

use super::format::KNOWN_EXTENSIONS;
use super::io::{blocking, read_locked, remove_if_present, write_atomic};
use super::path::{key_path, search_glob, validate_key};

/// A model whose stored form is its raw content.
pub trait RawContent: Model {
    /// Rebuild a value named `name` from stored bytes.
    fn from_raw(name: &str, bytes: Vec<u8>) -> std::result::Result<Self, TerminusError>;

    /// The bytes to store.
    fn raw(&self) -> &[u8];
}

/// Stores each value's raw content in its own file.
pub struct PlainFile<M: RawContent> {
    indirection: String,
    base: PathBuf,
    extension: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: RawContent> std::fmt::Debug for PlainFile<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainFile")
            .field("indirection", &self.indirection)
            .field("base", &self.base)
            .field("extension", &self.extension)
            .finish()
    }
}

impl<M: RawContent> PlainFile<M> {
    /// Store files for `indirection` under `base`, named `<key>.<indirection>`.
    pub fn new(indirection: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        let indirection = indirection.into();
        Self {
            extension: indirection.clone(),
            indirection,
            base: base.into(),
            _model: PhantomData,
        }
    }

    /// Use `extension` instead of the indirection name.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The file holding `key`.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        key_path(&self.base, &self.indirection, key, &self.extension)
    }

    fn fail(&self, key: &str, source: TerminusError) -> IndirectorError {
        IndirectorError::terminus(self.indirection.as_str(), key, source)
    }
}

/// File name without the trailing `.<extension>`.
fn stored_name(path: &Path, extension: &str) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name
        .strip_suffix(extension)?
        .strip_suffix('.')
        .map(str::to_string)
}

#[async_trait]
impl<M: RawContent> Terminus<M> for PlainFile<M> {
    fn name(&self) -> &str {
        "plain_file"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            validate: true,
            ..Capabilities::default()
        }
    }

    fn validate(&self, request: &Request<M>) -> Result<()> {
        match request.method() {
            Method::Search if request.key().is_empty() => Ok(()),
            _ => validate_key(request.key()),
        }
    }

    async fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        let path = self.path(request.key())?;
        let name = request.key().to_string();
        debug!(indirection = %self.indirection, path = %path.display(), "reading");

        blocking(move || match read_locked(&path)? {
            Some(bytes) => M::from_raw(&name, bytes).map(Some),
            None => Ok(None),
        })
        .await
        .map_err(|e| self.fail(request.key(), e))
    }

    /// Every stored file whose name matches the request key as a glob.
    async fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        let pattern = search_glob(&self.base, &self.indirection, request.key(), &self.extension)?;
        let paths = glob::glob(&pattern)
            .map_err(|e| IndirectorError::InvalidKey(format!("{}: {e}", request.key())))?;
        let extension = self.extension.clone();

        let values: Vec<M> = blocking(move || {
            let mut values = Vec::new();
            for entry in paths {
                let path = entry.map_err(|e| TerminusError::Io(e.into_error()))?;
                let Some(name) = stored_name(&path, &extension) else {
                    continue;
                };
                if let Some(bytes) = read_locked(&path)? {
                    values.push(M::from_raw(&name, bytes)?);
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
        let bytes = instance.raw().to_vec();
        debug!(indirection = %self.indirection, path = %path.display(), "writing");

        blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| self.fail(request.key(), e))
    }

    /// Remove the key's raw file and any serialized copies next to it.
    async fn destroy(&self, request: &Request<M>) -> Result<()> {
        let mut paths = vec![self.path(request.key())?];
        for ext in KNOWN_EXTENSIONS {
            if *ext != self.extension {
                paths.push(key_path(&self.base, &self.indirection, request.key(), ext)?);
            }
        }

        blocking(move || {
            for path in &paths {
                remove_if_present(path)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| self.fail(request.key(), e))
    }

    async fn head(&self, request: &Request<M>) -> Result<bool> {
        let path = self.path(request.key())?;
        blocking(move || path.try_exists().map_err(TerminusError::from))
            .await
            .map_err(|e| self.fail(request.key(), e))
    }
}

impl<M: RawContent> NamedTerminus<M> for PlainFile<M> {
    const TYPE_NAME: &'static str = "PlainFile";

    fn build(context: &TerminusContext) -> Result<Self> {
        Ok(Self::new(
            context.indirection.as_str(),
            context.config.datadir(),
        ))
    }
}
