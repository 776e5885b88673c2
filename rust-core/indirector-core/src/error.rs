// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for the indirection layer.
//
// Configuration, request, authorization and validation failures are caller
// mistakes and are never retried. Terminus failures wrap the adapter's own
// error (kept as the `source`) together with the indirection name and key
// that were being served.

use thiserror::Error;

/// Failures raised inside a terminus while talking to its backing store.
#[derive(Debug, Error)]
pub enum TerminusError {
    /// An I/O error from the filesystem or a socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a stored value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing service could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The transport answered, but not with something we can use.
    #[error("transport error: {0}")]
    Transport(String),

    /// Stored data is inconsistent, e.g. a dangling or looping reference.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// Errors produced by the indirection layer.
#[derive(Debug, Error)]
pub enum IndirectorError {
    /// Something about the layer's setup is wrong.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An indirection with this name already exists.
    #[error("indirection {0} is already defined")]
    DuplicateIndirection(String),

    /// No indirection with this name exists.
    #[error("no indirection named {0}")]
    UnknownIndirection(String),

    /// The indirection has no adapter registered under this name.
    #[error("could not find terminus {terminus} for indirection {indirection}")]
    UnknownTerminus {
        /// Indirection being served.
        indirection: String,
        /// Adapter name that was requested.
        terminus: String,
    },

    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    Request(String),

    /// A key that would escape the terminus' storage area.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// An option value that cannot be rendered into a query string.
    #[error("option {option} has an unsupported value type: {kind}")]
    UnsupportedOption {
        /// Option name.
        option: String,
        /// Type of the offending value.
        kind: String,
    },

    /// The terminus' authorization hook refused the request.
    #[error("{0}")]
    Authorization(String),

    /// The terminus rejected the request before executing it.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The terminus does not implement this verb.
    #[error("terminus {terminus} does not support {method}")]
    Unsupported {
        /// Adapter name.
        terminus: String,
        /// Verb that was attempted.
        method: String,
    },

    /// A terminus broke its contract with the dispatcher.
    #[error("contract violation: {0}")]
    Contract(String),

    /// A terminus failed while serving a key.
    #[error("{indirection} terminus failed for {key}: {source}")]
    Terminus {
        /// Indirection being served.
        indirection: String,
        /// Key of the request.
        key: String,
        /// The adapter's error.
        #[source]
        source: TerminusError,
    },
}

impl IndirectorError {
    /// Wrap an adapter failure with the indirection and key it happened on.
    pub fn terminus(
        indirection: impl Into<String>,
        key: impl Into<String>,
        source: impl Into<TerminusError>,
    ) -> Self {
        Self::Terminus {
            indirection: indirection.into(),
            key: key.into(),
            source: source.into(),
        }
    }

    /// True for failures that may succeed if the call is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Terminus {
                source: TerminusError::Io(_)
                    | TerminusError::Unavailable(_)
                    | TerminusError::Transport(_),
                ..
            }
        )
    }

    /// True for failures caused by how the layer was set up or called.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::DuplicateIndirection(_)
                | Self::UnknownIndirection(_)
                | Self::UnknownTerminus { .. }
                | Self::Request(_)
                | Self::InvalidKey(_)
                | Self::UnsupportedOption { .. }
                | Self::Authorization(_)
                | Self::Validation(_)
        )
    }
}

/// Convenience type alias for indirection results.
pub type Result<T> = std::result::Result<T, IndirectorError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_terminus_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = IndirectorError::terminus("facts", "node1", io);

        assert_eq!(
            err.to_string(),
            "facts terminus failed for node1: I/O error: denied"
        );
        let source = err.source().unwrap();
        assert!(source.to_string().contains("denied"));
        assert!(source.source().is_some());
    }

    #[test]
    fn test_retryable_classification() {
        let io = IndirectorError::terminus(
            "node",
            "n",
            TerminusError::Unavailable("ldap down".to_string()),
        );
        assert!(io.is_retryable());
        assert!(!io.is_caller_error());

        let corrupt = IndirectorError::terminus(
            "node",
            "n",
            TerminusError::Serialization("bad yaml".to_string()),
        );
        assert!(!corrupt.is_retryable());

        let auth = IndirectorError::Authorization("no".to_string());
        assert!(auth.is_caller_error());
        assert!(!auth.is_retryable());

        let dup = IndirectorError::DuplicateIndirection("facts".to_string());
        assert!(dup.is_caller_error());
    }

    #[test]
    fn test_unknown_terminus_display() {
        let err = IndirectorError::UnknownTerminus {
            indirection: "widget".to_string(),
            terminus: "foo".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "could not find terminus foo for indirection widget"
        );
    }
}
