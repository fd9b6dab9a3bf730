//! Error types for sopsdec-core

use crate::format::Format;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using sopsdec-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the decrypt-and-verify pipeline.
///
/// None of these are retried. Messages never carry key material or
/// plaintext values, only paths, backend names and digests.
#[derive(Error, Debug)]
pub enum Error {
    /// Source file unreadable or destination unwritable
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed document for the resolved format
    #[error("Invalid {format} document: {message}")]
    Format { format: Format, message: String },

    /// No configured backend could unwrap the data key
    #[error("Failed to get the data key: {reason}")]
    KeyResolution { reason: String },

    /// A leaf value failed authenticated decryption
    #[error("Failed to decrypt value at '{path}': {message}")]
    Decryption { path: String, message: String },

    /// Recomputed MAC does not match the stored MAC
    #[error("Failed to verify data integrity. expected mac {expected:?}, got {actual:?}")]
    Integrity { expected: String, actual: String },

    /// Caller misuse or missing configuration
    #[error("{message}")]
    Usage { message: String },
}

impl Error {
    /// Create a read error for `path`
    pub fn read(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            action: "read",
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a write error for `path`
    pub fn write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            action: "write",
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a format error
    pub fn format(format: Format, message: impl Into<String>) -> Self {
        Self::Format {
            format,
            message: message.into(),
        }
    }

    /// Create a key resolution error
    pub fn key_resolution(reason: impl Into<String>) -> Self {
        Self::KeyResolution {
            reason: reason.into(),
        }
    }

    /// Create a decryption error for the value at `path`
    pub fn decryption(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decryption {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an integrity error carrying both digests
    pub fn integrity(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Integrity {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Whether this error means the document failed authentication
    pub fn is_tampering(&self) -> bool {
        matches!(self, Self::Decryption { .. } | Self::Integrity { .. })
    }
}
