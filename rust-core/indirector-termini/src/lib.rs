// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Indirector Termini
//
// Interchangeable storage adapters for `indirector-core` indirections.
//
// # Modules
//
// - [`memory`] -- Process-local keyed map.
// - [`null`] -- Accepts everything, stores nothing.
// - [`file`] -- One file per key (JSON / YAML / CBOR, raw, PEM) and the
//   checksum-addressed file bucket.
// - [`queue`] -- Publishes saved values to a message queue.
// - [`rest`] -- Talks to a remote indirector over HTTP.
// - [`ldap`] -- Reads nodes from a directory server.
// - [`models`] -- `Facts`, `Node`, `FileContent`, `Certificate`, `BucketFile`.
//
// Adapters that build themselves from configuration alone implement
// `NamedTerminus` and register with `Indirector::register`. Adapters that
// need a client (queue, REST, LDAP) expose a `factory` taking that client.

pub mod file;
pub mod ldap;
pub mod memory;
pub mod models;
pub mod null;
pub mod queue;
pub mod rest;

pub use file::{
    CborFile, FileBucket, JsonFile, PemLocation, PlainFile, RawContent, SerializedFile, SslFile,
    YamlFile,
};
pub use ldap::{DirectoryConnection, Ldap, LdapEntry};
pub use memory::Memory;
pub use models::{BucketFile, Certificate, Facts, FileContent, Node};
pub use null::Null;
pub use queue::{MemoryQueue, Queue, QueueClient};
pub use rest::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, Rest};

#[cfg(feature = "reqwest-transport")]
pub use rest::ReqwestTransport;
