//! Error types for keel-catalog operations.
//!
//! Load failures end up in a [`TableLoadingError`] carried by a placeholder
//! table. DDL and DML failures are returned to the issuing statement as a
//! [`CatalogError`].

use std::error::Error as StdError;
use std::sync::Arc;

use keel_iceberg::IcebergError;
use thiserror::Error;

use crate::metastore::MetastoreError;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Shared, cloneable error cause.
pub type Cause = Arc<dyn StdError + Send + Sync>;

/// A table could not be loaded.
///
/// The message always names the fully-qualified table.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TableLoadingError {
    message: String,
    #[source]
    cause: Option<Cause>,
}

impl TableLoadingError {
    /// Creates a loading error without a cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a loading error with a cause.
    #[must_use]
    pub fn with_cause(message: impl Into<String>, cause: Cause) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }
}

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Loading a table's metadata failed.
    #[error(transparent)]
    TableLoading(#[from] TableLoadingError),

    /// The table does not exist in the table-format catalog.
    #[error("{message}")]
    TableNotFound {
        /// Description of what was not found.
        message: String,
    },

    /// The table format rejected an operation. Display is the format's own text.
    #[error(transparent)]
    Runtime(#[from] IcebergError),

    /// The request is invalid; nothing was sent to external systems.
    #[error("{message}")]
    Precondition {
        /// Description of the violated precondition.
        message: String,
    },

    /// The metastore call failed.
    #[error(transparent)]
    Metastore(#[from] MetastoreError),

    /// A filesystem call failed.
    #[error(transparent)]
    Storage(#[from] keel_core::Error),

    /// Reading the notification event log failed.
    #[error("event log error: {message}")]
    EventLog {
        /// Description of the failure.
        message: String,
    },
}

impl CatalogError {
    /// Creates a precondition error.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Creates an event log error.
    #[must_use]
    pub fn event_log(message: impl Into<String>) -> Self {
        Self::EventLog {
            message: message.into(),
        }
    }

    /// Returns true if the table format reported a concurrent commit.
    #[must_use]
    pub const fn is_commit_conflict(&self) -> bool {
        matches!(self, Self::Runtime(e) if e.is_commit_conflict())
    }

    /// Converts the error into a shareable cause.
    #[must_use]
    pub fn into_cause(self) -> Cause {
        Arc::new(self)
    }
}
