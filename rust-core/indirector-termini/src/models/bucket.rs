// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content stored in the file bucket, addressed by its SHA-256 checksum.
//
// Keys look like `sha256/<hex digest>` or `sha256/<hex digest>/<path>`,
// where `<path>` records where the content came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use indirector_core::{IndirectorError, Model, Result};

/// The only checksum algorithm the bucket accepts.
pub const ALGORITHM: &str = "sha256";

/// Lower-case hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketFile {
    name: String,
    pub digest: String,
    pub contents: Vec<u8>,
    /// Where this copy came from, if known.
    #[serde(default)]
    pub path: Option<String>,
    /// Every origin path recorded for this content.
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl BucketFile {
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        let contents = contents.into();
        let digest = sha256_hex(&contents);
        Self {
            name: key_for(&digest, None),
            digest,
            contents,
            path: None,
            paths: Vec::new(),
            expiration: None,
        }
    }

    /// Record the origin path; it becomes part of the key.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.name = key_for(&self.digest, Some(&path));
        self.path = Some(path);
        self
    }

    /// `sha256:<digest>`.
    pub fn checksum(&self) -> String {
        format!("{ALGORITHM}:{}", self.digest)
    }

    pub(crate) fn stored(
        key: &str,
        digest: String,
        contents: Vec<u8>,
        path: Option<String>,
        paths: Vec<String>,
    ) -> Self {
        Self {
            name: key.to_string(),
            digest,
            contents,
            path,
            paths,
            expiration: None,
        }
    }
}

/// The bucket key for `digest`, optionally qualified by an origin path.
pub fn key_for(digest: &str, path: Option<&str>) -> String {
    match path {
        Some(path) => format!("{ALGORITHM}/{digest}/{path}"),
        None => format!("{ALGORITHM}/{digest}"),
    }
}

/// Split a bucket key into its digest and optional origin path.
pub fn parse_key(key: &str) -> Result<(String, Option<String>)> {
    let invalid = || IndirectorError::InvalidKey(format!("{key:?} is not a bucket key"));
    let (algorithm, rest) = key.split_once('/').ok_or_else(invalid)?;
    if algorithm != ALGORITHM {
        return Err(IndirectorError::InvalidKey(format!(
            "unsupported checksum algorithm {algorithm:?}"
        )));
    }
    let (digest, path) = match rest.split_once('/') {
        Some((digest, path)) if !path.is_empty() => (digest, Some(path.to_string())),
        Some((digest, _)) => (digest, None),
        None => (rest, None),
    };
    let well_formed = digest.len() == 64
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !well_formed {
        return Err(invalid());
    }
    Ok((digest.to_string(), path))
}

impl Model for BucketFile {
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

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_digest_and_key() {
        let file = BucketFile::new("hello");
        assert_eq!(file.digest, HELLO);
        assert_eq!(file.checksum(), format!("sha256:{HELLO}"));
        assert_eq!(file.name(), format!("sha256/{HELLO}"));

        let file = file.with_path("/etc/motd");
        assert_eq!(file.name(), format!("sha256/{HELLO}//etc/motd"));
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(
            parse_key(&format!("sha256/{HELLO}")).unwrap(),
            (HELLO.to_string(), None)
        );
        assert_eq!(
            parse_key(&format!("sha256/{HELLO}/remote/path")).unwrap(),
            (HELLO.to_string(), Some("remote/path".to_string()))
        );
        assert!(parse_key(&format!("md5/{HELLO}")).is_err());
        assert!(parse_key("sha256/../../etc").is_err());
        assert!(parse_key(&format!("sha256/{}", HELLO.to_uppercase())).is_err());
    }
}
