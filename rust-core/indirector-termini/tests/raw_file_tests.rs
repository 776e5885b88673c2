// SPDX-License-Identifier: PMPL-1.0-or-later
//! Integration tests for the unencoded file termini: plain files, PEM files
//! and the checksum-addressed file bucket, each built from configuration by
//! a full `Indirector`.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use indirector_core::{
    IndirectionOptions, Indirector, IndirectorConfig, IndirectorError, Model, Options,
    SslSettings,
};
use indirector_termini::{BucketFile, Certificate, FileBucket, FileContent, PlainFile, SslFile};

const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

fn indirector(dir: &Path) -> Indirector {
    Indirector::new(IndirectorConfig {
        server_datadir: dir.join("server"),
        bucketdir: dir.join("bucket"),
        ssl: SslSettings {
            ssldir: dir.join("ssl"),
            ..SslSettings::default()
        },
        ..IndirectorConfig::default()
    })
}

#[tokio::test]
async fn test_plain_file_uses_indirection_name_as_extension() {
    let dir = TempDir::new().unwrap();
    let indirector = indirector(dir.path());
    let content = indirector
        .create::<FileContent>(
            "file_content",
            IndirectionOptions::new().terminus_class("plain_file"),
        )
        .unwrap();
    indirector
        .register::<FileContent, PlainFile<FileContent>>("file_content")
        .unwrap();

    content
        .save(FileContent::new("motd", b"welcome\n".to_vec()), None, Options::new())
        .await
        .unwrap();
    let path = dir.path().join("server/file_content/motd.file_content");
    assert_eq!(fs::read(path).unwrap(), b"welcome\n");

    let found = content.find("motd", Options::new()).await.unwrap().unwrap();
    assert_eq!(found.content, b"welcome\n");

    content.destroy("motd", Options::new()).await.unwrap();
    assert!(!content.head("motd", Options::new()).await.unwrap());
}

#[tokio::test]
async fn test_certificates_and_ca_routing() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("ssl/certificate")).unwrap();
    fs::create_dir_all(dir.path().join("ssl/ca")).unwrap();

    let indirector = indirector(dir.path());
    let certs = indirector
        .create::<Certificate>(
            "certificate",
            IndirectionOptions::new().terminus_class("ssl_file"),
        )
        .unwrap();
    indirector
        .register::<Certificate, SslFile<Certificate>>("certificate")
        .unwrap();

    certs
        .save(Certificate::new("web1", PEM), None, Options::new())
        .await
        .unwrap();
    certs
        .save(Certificate::new("ca", PEM), None, Options::new())
        .await
        .unwrap();

    assert!(dir.path().join("ssl/certificate/web1.pem").is_file());
    assert!(dir.path().join("ssl/ca/ca_crt.pem").is_file());
    assert!(!dir.path().join("ssl/certificate/ca.pem").exists());

    let found = certs.find("ca", Options::new()).await.unwrap().unwrap();
    assert_eq!(found.pem, PEM);

    let listed = certs.search("*", Options::new()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "web1");
}

#[tokio::test]
async fn test_certificate_save_without_directory_fails() {
    let dir = TempDir::new().unwrap();
    let indirector = indirector(dir.path());
    let certs = indirector
        .create::<Certificate>(
            "certificate",
            IndirectionOptions::new().terminus_class("ssl_file"),
        )
        .unwrap();
    indirector
        .register::<Certificate, SslFile<Certificate>>("certificate")
        .unwrap();

    let err = certs
        .save(Certificate::new("web1", PEM), None, Options::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IndirectorError::Terminus { .. }));
    assert!(!dir.path().join("ssl/certificate").exists());
}

#[tokio::test]
async fn test_file_bucket_round_trip_through_indirection() {
    let dir = TempDir::new().unwrap();
    let indirector = indirector(dir.path());
    let bucket = indirector
        .create::<BucketFile>(
            "file_bucket_file",
            IndirectionOptions::new().terminus_class("file_bucket"),
        )
        .unwrap();
    indirector
        .register::<BucketFile, FileBucket>("file_bucket_file")
        .unwrap();

    let file = BucketFile::new("backup contents").with_path("/etc/hosts");
    bucket.save(file.clone(), None, Options::new()).await.unwrap();

    let key = format!("sha256/{}", file.digest);
    let found = bucket.find(&key, Options::new()).await.unwrap().unwrap();
    assert_eq!(found.contents, b"backup contents");
    assert_eq!(found.paths, ["/etc/hosts"]);
    assert!(bucket.head(file.name(), Options::new()).await.unwrap());

    let err = bucket.find("md5/abc", Options::new()).await.unwrap_err();
    assert!(matches!(err, IndirectorError::InvalidKey(_)));
}
