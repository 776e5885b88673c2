// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PEM-file terminus for SSL material.
//
// Either one `<name>.pem` per key in a directory, or a single fixed file.
// The certificate authority's own entry can be routed to a separate file.
// Unlike the other file termini, `save` never creates the target directory:
// it must already exist and be writable.

use std::fs;
use std::io::{self, ErrorKind};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use indirector_core::{
    Capabilities, IndirectorError, Method, NamedTerminus, Request, Result, Terminus,
    TerminusContext, TerminusError,
};

use super::io::{blocking, read_locked, remove_if_present, write_atomic};
use super::path::validate_key;
use super::plain::RawContent;

const EXTENSION: &str = "pem";

/// Where PEM files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PemLocation {
    /// One `<name>.pem` per key.
    Directory(PathBuf),
    /// Every key maps to this one file.
    File(PathBuf),
}

/// Stores SSL material as PEM text.
pub struct SslFile<M: RawContent> {
    indirection: String,
    location: PemLocation,
    ca: Option<(String, PathBuf)>,
    _model: PhantomData<fn() -> M>,
}

impl<M: RawContent> std::fmt::Debug for SslFile<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslFile")
            .field("indirection", &self.indirection)
            .field("location", &self.location)
            .field("ca", &self.ca)
            .finish()
    }
}

impl<M: RawContent> SslFile<M> {
    pub fn new(indirection: impl Into<String>, location: PemLocation) -> Self {
        Self {
            indirection: indirection.into(),
            location,
            ca: None,
            _model: PhantomData,
        }
    }

    /// Store the entry named `ca_name` at `path` instead of the usual location.
    pub fn with_ca(mut self, ca_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.ca = Some((ca_name.into(), path.into()));
        self
    }

    /// The file holding `name`.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        validate_key(name)?;
        if let Some((ca_name, ca_path)) = &self.ca {
            if ca_name == name {
                return Ok(ca_path.clone());
            }
        }
        Ok(match &self.location {
            PemLocation::Directory(dir) => dir.join(format!("{name}.{EXTENSION}")),
            PemLocation::File(file) => file.clone(),
        })
    }

    fn fail(&self, key: &str, source: TerminusError) -> IndirectorError {
        IndirectorError::terminus(self.indirection.as_str(), key, source)
    }
}

/// Rename a differently-cased sibling of `path` to `path`. `false` if there
/// is none.
fn fix_case(path: &Path) -> io::Result<bool> {
    let (Some(dir), Some(wanted)) = (path.parent(), path.file_name()) else {
        return Ok(false);
    };
    let wanted = wanted.to_string_lossy().to_lowercase();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().to_lowercase() == wanted {
            info!(from = %entry.path().display(), to = %path.display(), "fixing case of PEM file");
            fs::rename(entry.path(), path)?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// The target directory must already exist and be writable.
fn check_writable(path: &Path) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let metadata = match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => metadata,
        _ => {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("directory {} does not exist", dir.display()),
            ))
        }
    };
    if metadata.permissions().readonly() {
        return Err(io::Error::new(
            ErrorKind::PermissionDenied,
            format!("directory {} is not writable", dir.display()),
        ));
    }
    Ok(())
}

fn read_pem<M: RawContent>(
    name: &str,
    path: &Path,
) -> std::result::Result<Option<M>, TerminusError> {
    match read_locked(path)? {
        Some(bytes) => M::from_raw(name, bytes).map(Some),
        None => Ok(None),
    }
}

#[async_trait]
impl<M: RawContent> Terminus<M> for SslFile<M> {
    fn name(&self) -> &str {
        "ssl_file"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            validate: true,
            ..Capabilities::default()
        }
    }

    fn validate(&self, request: &Request<M>) -> Result<()> {
        match request.method() {
            Method::Search => Ok(()),
            _ => validate_key(request.key()),
        }
    }

    async fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        let path = self.path(request.key())?;
        let name = request.key().to_string();
        let by_directory = matches!(self.location, PemLocation::Directory(_));
        debug!(indirection = %self.indirection, path = %path.display(), "reading");

        blocking(move || {
            if let Some(value) = read_pem(&name, &path)? {
                return Ok(Some(value));
            }
            if by_directory && fix_case(&path)? {
                return read_pem(&name, &path);
            }
            Ok(None)
        })
        .await
        .map_err(|e| self.fail(request.key(), e))
    }

    /// Every `.pem` file in the directory; other files are skipped.
    async fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        let location = self.location.clone();
        let values: Vec<M> = blocking(move || {
            let mut values = Vec::new();
            match location {
                PemLocation::File(file) => {
                    let name = file
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    values.extend(read_pem(&name, &file)?);
                }
                PemLocation::Directory(dir) => {
                    let entries = match fs::read_dir(&dir) {
                        Ok(entries) => entries,
                        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(values),
                        Err(e) => return Err(e.into()),
                    };
                    let mut paths = Vec::new();
                    for entry in entries {
                        let path = entry?.path();
                        if path.extension().is_some_and(|ext| ext == EXTENSION) {
                            paths.push(path);
                        }
                    }
                    paths.sort();
                    for path in paths {
                        let name = path
                            .file_stem()
                            .map(|stem| stem.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        values.extend(read_pem(&name, &path)?);
                    }
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

        blocking(move || {
            check_writable(&path)?;
            write_atomic(&path, &bytes)
        })
        .await
        .map_err(|e| self.fail(request.key(), e))
    }

    /// Missing files are not an error.
    async fn destroy(&self, request: &Request<M>) -> Result<()> {
        let path = self.path(request.key())?;
        let removed = blocking({
            let path = path.clone();
            move || remove_if_present(&path)
        })
        .await
        .map_err(|e| self.fail(request.key(), e))?;
        if removed {
            info!(indirection = %self.indirection, path = %path.display(), "removed PEM file");
        }
        Ok(())
    }

    async fn head(&self, request: &Request<M>) -> Result<bool> {
        let path = self.path(request.key())?;
        blocking(move || path.try_exists().map_err(TerminusError::from))
            .await
            .map_err(|e| self.fail(request.key(), e))
    }
}

impl<M: RawContent> NamedTerminus<M> for SslFile<M> {
    const TYPE_NAME: &'static str = "SslFile";

    /// `<ssldir>/<indirection>/<name>.pem`, with the CA entry at
    /// `<ssldir>/ca/ca_crt.pem`.
    fn build(context: &TerminusContext) -> Result<Self> {
        let ssl = &context.config.ssl;
        Ok(Self::new(
            context.indirection.as_str(),
            PemLocation::Directory(ssl.ssldir.join(&context.indirection)),
        )
        .with_ca(ssl.ca_name.as_str(), ssl.ssldir.join("ca").join("ca_crt.pem")))
    }
}
