// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// On-disk encodings for the serialized-file termini.

use serde::de::DeserializeOwned;
use serde::Serialize;

use indirector_core::TerminusError;

/// Every extension written by a bundled format.
pub const KNOWN_EXTENSIONS: &[&str] = &[Json::EXTENSION, Yaml::EXTENSION, Cbor::EXTENSION];

/// An encoding for stored values.
pub trait Format: Send + Sync + 'static {
    /// Type name, from which the adapter name is derived.
    const TYPE_NAME: &'static str;
    /// File extension, without the dot.
    const EXTENSION: &'static str;

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, TerminusError>;

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TerminusError>;
}

/// Pretty-printed JSON.
#[derive(Debug, Clone, Copy)]
pub struct Json;

impl Format for Json {
    const TYPE_NAME: &'static str = "Json";
    const EXTENSION: &'static str = "json";

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, TerminusError> {
        serde_json::to_vec_pretty(value)
            .map_err(|e| TerminusError::Serialization(format!("json encode: {e}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TerminusError> {
        serde_json::from_slice(bytes)
            .map_err(|e| TerminusError::Serialization(format!("json decode: {e}")))
    }
}

/// YAML documents.
#[derive(Debug, Clone, Copy)]
pub struct Yaml;

impl Format for Yaml {
    const TYPE_NAME: &'static str = "Yaml";
    const EXTENSION: &'static str = "yaml";

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, TerminusError> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| TerminusError::Serialization(format!("yaml encode: {e}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TerminusError> {
        serde_yaml::from_slice(bytes)
            .map_err(|e| TerminusError::Serialization(format!("yaml decode: {e}")))
    }
}

/// Binary CBOR.
#[derive(Debug, Clone, Copy)]
pub struct Cbor;

impl Format for Cbor {
    const TYPE_NAME: &'static str = "Cbor";
    const EXTENSION: &'static str = "cbor";

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, TerminusError> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out)
            .map_err(|e| TerminusError::Serialization(format!("cbor encode: {e}")))?;
        Ok(out)
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TerminusError> {
        ciborium::from_reader(bytes)
            .map_err(|e| TerminusError::Serialization(format!("cbor decode: {e}")))
    }
}
