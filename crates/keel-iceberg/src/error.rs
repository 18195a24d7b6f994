//! Table-format error types.
//!
//! Errors raised by the format are passed through the catalog layer to the
//! statement that issued the DDL or DML, so their messages are written to be
//! read by end users.

use thiserror::Error;

use crate::types::TableIdent;

/// Result type alias for table-format operations.
pub type IcebergResult<T> = Result<T, IcebergError>;

/// Table-format error types.
#[derive(Debug, Error)]
pub enum IcebergError {
    /// The table does not exist in the catalog.
    #[error("{message}")]
    NoSuchTable {
        /// Human-readable error message.
        message: String,
    },

    /// A table with the same identifier already exists.
    #[error("{message}")]
    AlreadyExists {
        /// Human-readable error message.
        message: String,
    },

    /// Another writer committed first; the pending update was not applied.
    #[error("Commit failed: {message}")]
    CommitFailed {
        /// Human-readable error message.
        message: String,
    },

    /// The requested change is invalid against the current metadata.
    #[error("Validation failed: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// The request uses a feature the format does not support.
    #[error("Unsupported: {message}")]
    Unsupported {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected failure inside the catalog implementation.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl IcebergError {
    /// Creates a not found error for a missing table.
    #[must_use]
    pub fn table_not_found(ident: &TableIdent) -> Self {
        Self::NoSuchTable {
            message: format!("Table does not exist: {ident}"),
        }
    }

    /// Creates an already-exists error for a table.
    #[must_use]
    pub fn table_already_exists(ident: &TableIdent) -> Self {
        Self::AlreadyExists {
            message: format!("Table already exists: {ident}"),
        }
    }

    /// Creates a commit conflict error.
    #[must_use]
    pub fn commit_conflict(details: impl Into<String>) -> Self {
        Self::CommitFailed {
            message: details.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(details: impl Into<String>) -> Self {
        Self::Validation {
            message: details.into(),
        }
    }

    /// Creates an unsupported-feature error.
    #[must_use]
    pub fn unsupported(details: impl Into<String>) -> Self {
        Self::Unsupported {
            message: details.into(),
        }
    }

    /// Returns true if this error is an optimistic-concurrency conflict.
    #[must_use]
    pub const fn is_commit_conflict(&self) -> bool {
        matches!(self, Self::CommitFailed { .. })
    }

    /// Returns true if this error means the table does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchTable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let ident = TableIdent::new("sales", "orders");
        assert_eq!(
            IcebergError::table_not_found(&ident).to_string(),
            "Table does not exist: sales.orders"
        );
        assert_eq!(
            IcebergError::commit_conflict("base metadata is stale").to_string(),
            "Commit failed: base metadata is stale"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(IcebergError::commit_conflict("x").is_commit_conflict());
        assert!(!IcebergError::validation("x").is_commit_conflict());
        assert!(IcebergError::table_not_found(&TableIdent::new("a", "b")).is_not_found());
    }
}
