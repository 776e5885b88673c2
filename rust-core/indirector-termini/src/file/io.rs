// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blocking file primitives shared by the file termini.
//
// Reads hold a shared OS lock on the file. Writes go to a temporary file in
// the same directory which is renamed over the target while the target's
// exclusive lock is held, so readers never observe a partial value.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use indirector_core::TerminusError;

/// Run `op` on tokio's blocking pool.
pub async fn blocking<T, Op>(op: Op) -> std::result::Result<T, TerminusError>
where
    T: Send + 'static,
    Op: FnOnce() -> std::result::Result<T, TerminusError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| TerminusError::Unavailable(format!("task join: {e}")))?
}

/// Read a file under a shared lock; `None` if it does not exist.
pub fn read_locked(path: &Path) -> std::result::Result<Option<Vec<u8>>, TerminusError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    file.lock_shared()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    file.unlock()?;
    Ok(Some(bytes))
}

/// Replace `path` with `bytes` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::result::Result<(), TerminusError> {
    let dir = path.parent().ok_or_else(|| {
        TerminusError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })?;
    fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;

    let current = match File::open(path) {
        Ok(file) => Some(file),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    if let Some(file) = &current {
        file.lock()?;
    }
    staged.persist(path).map_err(|e| TerminusError::Io(e.error))?;
    Ok(())
}

/// Delete `path`; `false` if it was already gone.
pub fn remove_if_present(path: &Path) -> std::result::Result<bool, TerminusError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
