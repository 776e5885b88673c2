// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw file content and PEM certificates, stored unencoded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use indirector_core::{Model, TerminusError};

use crate::file::RawContent;

/// An opaque blob of file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub name: String,
    pub content: Vec<u8>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl FileContent {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            expiration: None,
        }
    }
}

impl Model for FileContent {
    fn name(&self) -> &str {
        &self.name
    }

    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    fn set_expiration(&mut self, expiration: DateTime<Utc>) {
        self.expiration = Some(expiration);
    }
}

impl RawContent for FileContent {
    fn from_raw(name: &str, bytes: Vec<u8>) -> Result<Self, TerminusError> {
        Ok(Self::new(name, bytes))
    }

    fn raw(&self) -> &[u8] {
        &self.content
    }
}

/// A PEM-encoded certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub name: String,
    pub pem: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl Certificate {
    pub fn new(name: impl Into<String>, pem: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pem: pem.into(),
            expiration: None,
        }
    }
}

impl Model for Certificate {
    fn name(&self) -> &str {
        &self.name
    }

    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    fn set_expiration(&mut self, expiration: DateTime<Utc>) {
        self.expiration = Some(expiration);
    }
}

impl RawContent for Certificate {
    /// PEM is text; anything that is not UTF-8 is corrupt.
    fn from_raw(name: &str, bytes: Vec<u8>) -> Result<Self, TerminusError> {
        let pem = String::from_utf8(bytes)
            .map_err(|e| TerminusError::InvalidData(format!("{name}: PEM is not UTF-8: {e}")))?;
        Ok(Self::new(name, pem))
    }

    fn raw(&self) -> &[u8] {
        self.pem.as_bytes()
    }
}
