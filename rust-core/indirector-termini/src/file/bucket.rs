// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File bucket: content-addressed backup storage.
//
// Layout: `<bucketdir>/<d0>/<d1>/.../<d7>/<digest>/contents`, where `d0..d7`
// are the first eight characters of the hex digest. A `paths` file next to
// `contents` lists every origin path the content was saved from, one per
// line.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use indirector_core::{
    IndirectorError, NamedTerminus, Request, Result, Terminus, TerminusContext, TerminusError,
};

use super::io::{blocking, read_locked, write_atomic};
use crate::models::bucket::{parse_key, sha256_hex};
use crate::models::BucketFile;

const CONTENTS: &str = "contents";
const PATHS: &str = "paths";

#[derive(Debug)]
pub struct FileBucket {
    indirection: String,
    bucketdir: PathBuf,
}

impl FileBucket {
    pub fn new(indirection: impl Into<String>, bucketdir: impl Into<PathBuf>) -> Self {
        Self {
            indirection: indirection.into(),
            bucketdir: bucketdir.into(),
        }
    }

    /// Directory holding the content with `digest`.
    pub fn dir_for(&self, digest: &str) -> PathBuf {
        let mut dir = self.bucketdir.clone();
        for c in digest.chars().take(8) {
            dir.push(c.to_string());
        }
        dir.join(digest)
    }

    fn fail(&self, key: &str, source: TerminusError) -> IndirectorError {
        IndirectorError::terminus(self.indirection.as_str(), key, source)
    }
}

fn read_paths(dir: &Path) -> std::result::Result<Vec<String>, TerminusError> {
    let Some(bytes) = read_locked(&dir.join(PATHS))? else {
        return Ok(Vec::new());
    };
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Write `contents` unless an identical copy is already stored.
fn store_contents(
    dir: &Path,
    digest: &str,
    contents: &[u8],
) -> std::result::Result<(), TerminusError> {
    let path = dir.join(CONTENTS);
    match read_locked(&path)? {
        Some(existing) if existing == contents => return Ok(()),
        Some(existing) if sha256_hex(&existing) == digest => {
            return Err(TerminusError::InvalidData(format!(
                "checksum collision on {digest}"
            )));
        }
        Some(_) => warn!(path = %path.display(), "replacing corrupt bucket contents"),
        None => {}
    }
    write_atomic(&path, contents)
}

/// Append `path` to the paths file unless it is already listed. With no
/// path the file is only created.
fn record_path(dir: &Path, path: Option<&str>) -> std::result::Result<(), TerminusError> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(dir.join(PATHS))?;
    let Some(path) = path else {
        return Ok(());
    };
    file.lock()?;
    let mut listed = String::new();
    file.read_to_string(&mut listed)?;
    if !listed.lines().any(|line| line == path) {
        writeln!(file, "{path}")?;
    }
    file.unlock()?;
    Ok(())
}

#[async_trait]
impl Terminus<BucketFile> for FileBucket {
    fn name(&self) -> &str {
        "file_bucket"
    }

    async fn find(&self, request: &Request<BucketFile>) -> Result<Option<BucketFile>> {
        let (digest, path) = parse_key(request.key())?;
        let dir = self.dir_for(&digest);
        let key = request.key().to_string();
        debug!(indirection = %self.indirection, dir = %dir.display(), "reading bucket");

        blocking(move || {
            let Some(contents) = read_locked(&dir.join(CONTENTS))? else {
                return Ok(None);
            };
            let paths = read_paths(&dir)?;
            Ok(Some(BucketFile::stored(&key, digest, contents, path, paths)))
        })
        .await
        .map_err(|e| self.fail(request.key(), e))
    }

    async fn head(&self, request: &Request<BucketFile>) -> Result<bool> {
        let (digest, _) = parse_key(request.key())?;
        let contents = self.dir_for(&digest).join(CONTENTS);
        blocking(move || contents.try_exists().map_err(TerminusError::from))
            .await
            .map_err(|e| self.fail(request.key(), e))
    }

    /// Store the content under its checksum and record its origin path.
    async fn save(&self, request: &Request<BucketFile>) -> Result<()> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::Request(format!("save of {} carries no instance", request.key()))
        })?;
        let (digest, path) = parse_key(request.key())?;
        let actual = sha256_hex(&instance.contents);
        if actual != digest {
            return Err(IndirectorError::Validation(format!(
                "contents hash to {actual}, not {digest}"
            )));
        }

        let dir = self.dir_for(&digest);
        let contents = instance.contents.clone();
        debug!(indirection = %self.indirection, dir = %dir.display(), "writing bucket");

        blocking(move || {
            fs::create_dir_all(&dir)?;
            store_contents(&dir, &digest, &contents)?;
            record_path(&dir, path.as_deref())
        })
        .await
        .map_err(|e| self.fail(request.key(), e))
    }
}

impl NamedTerminus<BucketFile> for FileBucket {
    const TYPE_NAME: &'static str = "FileBucket";

    fn build(context: &TerminusContext) -> Result<Self> {
        Ok(Self::new(
            context.indirection.as_str(),
            context.config.bucketdir.as_path(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use indirector_core::{Method, Model, Options, RequestSettings};

    use super::*;

    fn save(file: BucketFile) -> Request<BucketFile> {
        Request::for_instance(
            "file_bucket_file",
            Method::Save,
            file,
            None,
            Options::new(),
            &RequestSettings::default(),
        )
        .unwrap()
    }

    fn find(key: &str) -> Request<BucketFile> {
        Request::new("file_bucket_file", Method::Find, key, Options::new()).unwrap()
    }

    #[test]
    fn test_dir_is_eight_levels_deep() {
        let bucket = FileBucket::new("file_bucket_file", "/bucket");
        let digest = "70924d6fa4b2d745185fa4660703a5c0";
        assert_eq!(
            bucket.dir_for(digest),
            Path::new("/bucket/7/0/9/2/4/d/6/f/70924d6fa4b2d745185fa4660703a5c0")
        );
    }

    #[tokio::test]
    async fn test_save_then_find_with_paths() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new("file_bucket_file", dir.path());
        let file = BucketFile::new("file contents");

        bucket.save(&save(file.clone().with_path("/etc/a"))).await.unwrap();
        bucket.save(&save(file.clone().with_path("/etc/b"))).await.unwrap();
        bucket.save(&save(file.clone().with_path("/etc/a"))).await.unwrap();

        let stored = bucket.dir_for(&file.digest);
        assert_eq!(fs::read(stored.join("contents")).unwrap(), b"file contents");
        assert_eq!(fs::read_to_string(stored.join("paths")).unwrap(), "/etc/a\n/etc/b\n");

        let found = bucket.find(&find(file.name())).await.unwrap().unwrap();
        assert_eq!(found.contents, b"file contents");
        assert_eq!(found.paths, ["/etc/a", "/etc/b"]);
        assert!(bucket.head(&find(file.name())).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_without_path_creates_empty_paths_file() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new("file_bucket_file", dir.path());
        let file = BucketFile::new("x");

        bucket.save(&save(file.clone())).await.unwrap();
        let paths = bucket.dir_for(&file.digest).join("paths");
        assert_eq!(fs::read_to_string(paths).unwrap(), "");
    }

    #[tokio::test]
    async fn test_missing_content_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new("file_bucket_file", dir.path());
        let key = BucketFile::new("never saved").name().to_string();
        assert!(bucket.find(&find(&key)).await.unwrap().is_none());
        assert!(!bucket.head(&find(&key)).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_contents_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new("file_bucket_file", dir.path());
        let file = BucketFile::new("good");
        let stored = bucket.dir_for(&file.digest);
        fs::create_dir_all(&stored).unwrap();
        fs::write(stored.join("contents"), b"corrupt").unwrap();

        bucket.save(&save(file)).await.unwrap();
        assert_eq!(fs::read(stored.join("contents")).unwrap(), b"good");
    }

    #[tokio::test]
    async fn test_contents_must_match_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new("file_bucket_file", dir.path());
        let mut file = BucketFile::new("original");
        file.contents = b"tampered".to_vec();

        let err = bucket.save(&save(file)).await.unwrap_err();
        assert!(matches!(err, IndirectorError::Validation(_)));
    }
}
