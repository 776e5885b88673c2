// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key to path mapping for the file termini.
//
// Layout: `<base>/<indirection>/<key>.<ext>`. Keys are single path
// components; anything that could leave the indirection's directory is
// rejected before a path is built.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::error;

use indirector_core::{IndirectorError, Result};

/// Leading `..`, path separators, NUL bytes and drive prefixes.
static BAD_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.\.|[\\/]|\x00|^(?i:[a-z]):")
        .unwrap_or_else(|e| panic!("bad key pattern: {e}"))
});

/// Reject keys that could escape the storage directory.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(IndirectorError::InvalidKey("empty key".to_string()));
    }
    if BAD_KEY.is_match(key) {
        error!(key = ?key, "directory traversal detected");
        return Err(IndirectorError::InvalidKey(format!("{key:?}")));
    }
    Ok(())
}

/// Directory holding an indirection's files.
pub fn indirection_dir(base: &Path, indirection: &str) -> PathBuf {
    base.join(indirection)
}

/// The file storing `key` in `extension` format.
pub fn key_path(base: &Path, indirection: &str, key: &str, extension: &str) -> Result<PathBuf> {
    validate_key(key)?;
    Ok(indirection_dir(base, indirection).join(format!("{key}.{extension}")))
}

/// Glob matching every file for names matching `pattern`.
///
/// An empty pattern matches every name. Patterns may use glob wildcards but
/// are otherwise held to the same rules as keys.
pub fn search_glob(base: &Path, indirection: &str, pattern: &str, extension: &str) -> Result<String> {
    let pattern = if pattern.is_empty() { "*" } else { pattern };
    validate_key(pattern)?;
    let dir = indirection_dir(base, indirection);
    let dir = glob::Pattern::escape(&dir.to_string_lossy());
    Ok(format!("{dir}/{pattern}.{extension}"))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_layout() {
        let path = key_path(Path::new("/var/data"), "facts", "node1.example.com", "yaml").unwrap();
        assert_eq!(path, PathBuf::from("/var/data/facts/node1.example.com.yaml"));
    }

    #[test]
    fn test_traversal_keys_are_rejected() {
        for key in [
            "../foo",
            "..",
            "foo/../../etc/passwd",
            "/etc/passwd",
            "foo\\bar",
            "c:foo",
            "C:\\windows",
            "nul\0byte",
            "",
        ] {
            assert!(
                matches!(validate_key(key), Err(IndirectorError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_ordinary_keys_are_accepted() {
        for key in ["node1", "node1.example.com", "foo..bar", "with space", "a-b_c"] {
            assert!(validate_key(key).is_ok(), "{key:?} should be accepted");
        }
    }

    #[test]
    fn test_search_glob() {
        let glob = search_glob(Path::new("/data[1]"), "facts", "", "json").unwrap();
        assert_eq!(glob, "/data[[]1[]]/facts/*.json");
        assert!(search_glob(Path::new("/data"), "facts", "../*", "json").is_err());
    }

    proptest! {
        #[test]
        fn test_paths_stay_inside_the_indirection_dir(key in "[ -~]{1,20}") {
            if let Ok(path) = key_path(Path::new("/base"), "ind", &key, "json") {
                prop_assert_eq!(path.parent(), Some(Path::new("/base/ind")));
            }
        }
    }
}
