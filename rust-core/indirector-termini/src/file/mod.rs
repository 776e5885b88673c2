// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File-backed termini.
//
// - [`format`] -- JSON, YAML and CBOR encodings.
// - [`path`] -- Key to path mapping and traversal checks.
// - [`io`] -- Locked reads, atomic writes, the blocking pool.
// - [`serialized`] -- The `SerializedFile` terminus, generic over the format.
// - [`plain`] -- Raw content at `<key>.<indirection>`.
// - [`ssl`] -- PEM files per directory or at a fixed location.
// - [`bucket`] -- Checksum-addressed file bucket.

pub mod bucket;
pub mod format;
pub mod io;
pub mod path;
pub mod plain;
pub mod serialized;
pub mod ssl;

pub use bucket::FileBucket;
pub use format::{Cbor, Format, Json, Yaml, KNOWN_EXTENSIONS};
pub use plain::{PlainFile, RawContent};
pub use serialized::{CborFile, JsonFile, SerializedFile, YamlFile};
pub use ssl::{PemLocation, SslFile};
