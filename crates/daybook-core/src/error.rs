//! Error types for the sync layer
//!
//! Two layers of errors:
//! - `StoreError`: failures reported by the remote object-store primitive
//! - `SyncError`: failures surfaced by this crate's own operations
//!
//! Single-record reads translate the store's "not found" family into an
//! absent result; everything else propagates unchanged.

use thiserror::Error;

use crate::models::Scope;

/// Backend error codes that mean "the key does not exist".
///
/// The remote store reports absence inconsistently depending on which
/// API surface produced the error, so all of these map to absent.
const NOT_FOUND_CODES: &[&str] = &["subject_does_not_exist", "key_not_found", "not_found", "404"];

/// Errors reported by the remote object-store primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No object exists at the key
    #[error("object not found: '{key}'")]
    NotFound { key: String },

    /// Any other backend failure, with the backend's error code when known
    #[error("backend error [{code}]: {message}")]
    Backend { code: String, message: String },

    /// The store could not be reached at all
    #[error("remote store unreachable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Build a backend error from a code/message pair
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the "not found" family
    ///
    /// Reads treat these as an absent result rather than a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Backend { code, .. } => NOT_FOUND_CODES.contains(&code.as_str()),
            StoreError::Unavailable(_) => false,
        }
    }
}

/// Errors surfaced by sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// The target record does not exist (update requires it to pre-exist)
    #[error("record not found: '{id}'")]
    NotFound { id: String },

    /// The remote store failed; never swallowed on single-record operations
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// A stored object could not be decoded into a record
    #[error("invalid record at '{key}': {details}")]
    Validation { key: String, details: String },

    /// The scope is not among those the store advertised at connect time
    #[error("scope '{scope}' is not available on this store")]
    UnknownScope { scope: Scope },
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variant() {
        let err = StoreError::NotFound {
            key: "todos/abc".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("todos/abc"));
    }

    #[test]
    fn test_not_found_code_family() {
        assert!(StoreError::backend("subject_does_not_exist", "no such key").is_not_found());
        assert!(StoreError::backend("key_not_found", "missing").is_not_found());
        assert!(StoreError::backend("404", "missing").is_not_found());
    }

    #[test]
    fn test_other_backend_errors_are_not_absent() {
        assert!(!StoreError::backend("storage_quota", "over quota").is_not_found());
        assert!(!StoreError::Unavailable("connection refused".to_string()).is_not_found());
    }

    #[test]
    fn test_store_error_converts_to_sync_error() {
        let err: SyncError = StoreError::backend("storage_quota", "over quota").into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(err.to_string().contains("storage_quota"));
    }

    #[test]
    fn test_validation_display() {
        let err = SyncError::Validation {
            key: "todos/1".to_string(),
            details: "missing field `text`".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("todos/1"));
        assert!(msg.contains("missing field"));
    }
}
