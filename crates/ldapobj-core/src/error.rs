//! Error types for the LDAP object reconciler
//!
//! This module defines all error types used throughout the crate. Every
//! directory-originated error keeps the server's own message so callers can
//! surface it unchanged.

use std::fmt;
use thiserror::Error;

/// Result type alias for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Directory write request kinds, used to label [`Error::DirectoryWrite`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    /// Add request
    Add,
    /// Modify request
    Modify,
    /// Delete request
    Delete,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOperation::Add => f.write_str("add"),
            WriteOperation::Modify => f.write_str("modify"),
            WriteOperation::Delete => f.write_str("delete"),
        }
    }
}

/// Core error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    /// A base-scope lookup did not return exactly one entry.
    ///
    /// Zero results (missing object) and several results (malformed
    /// directory) are deliberately not distinguished.
    #[error("Can not read entry {dn}: search returned {count} results")]
    NotFoundOrAmbiguous {
        /// DN that was looked up
        dn: String,
        /// Number of entries the search returned
        count: usize,
    },

    /// An add, modify or delete request was rejected by the directory server
    #[error("Can not {operation} entry {dn}: LDAP server reported: {message}")]
    DirectoryWrite {
        /// The rejected request kind
        operation: WriteOperation,
        /// Target DN of the request
        dn: String,
        /// Server-provided rejection reason
        message: String,
    },

    /// Dial, TLS or bind failure
    #[error("Can't connect to LDAP server: {0}")]
    DirectoryConnect(String),

    /// Desired-state fields could not be decoded into the expected shapes
    #[error("Error converting data: {0}")]
    ConfigConversion(String),

    /// Search or transport failure reported by a directory
    #[error("Directory error: {0}")]
    Directory(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown resource name or record
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O errors (state files, manifests)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "search returned N results" error
    pub fn not_found_or_ambiguous(dn: impl Into<String>, count: usize) -> Self {
        Self::NotFoundOrAmbiguous {
            dn: dn.into(),
            count,
        }
    }

    /// Create a directory write error
    pub fn directory_write(
        operation: WriteOperation,
        dn: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DirectoryWrite {
            operation,
            dn: dn.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn directory_connect(msg: impl Into<String>) -> Self {
        Self::DirectoryConnect(msg.into())
    }

    /// Create a desired-state conversion error
    pub fn config_conversion(msg: impl Into<String>) -> Self {
        Self::ConfigConversion(msg.into())
    }

    /// Create a directory search/transport error
    pub fn directory(msg: impl Into<String>) -> Self {
        Self::Directory(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this error means the object is missing (or the DN is ambiguous)
    pub fn is_not_found_or_ambiguous(&self) -> bool {
        matches!(self, Self::NotFoundOrAmbiguous { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_carries_count() {
        let err = Error::not_found_or_ambiguous("cn=test,dc=example,dc=com", 0);
        assert_eq!(
            err.to_string(),
            "Can not read entry cn=test,dc=example,dc=com: search returned 0 results"
        );
        assert!(err.is_not_found_or_ambiguous());
    }

    #[test]
    fn test_write_error_carries_server_message() {
        let err = Error::directory_write(
            WriteOperation::Delete,
            "cn=old,dc=example,dc=com",
            "No Such Object",
        );
        assert_eq!(
            err.to_string(),
            "Can not delete entry cn=old,dc=example,dc=com: LDAP server reported: No Such Object"
        );
        assert!(!err.is_not_found_or_ambiguous());
    }
}
