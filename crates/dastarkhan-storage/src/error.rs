//! Storage error types for the source store abstraction layer.
//!
//! The source store is the only tier whose failures are visible to callers.
//! [`StorageError::is_transient`] marks the closed set of failures that the
//! retry decorator is allowed to retry once.

use std::fmt;

use crate::types::Collection;

/// Errors that can occur during source store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("Record not found: {collection}/{id}")]
    NotFound {
        /// The collection that was queried.
        collection: Collection,
        /// The ID of the record that was not found.
        id: String,
    },

    /// Attempted to create a record that already exists.
    #[error("Record already exists: {collection}/{id}")]
    AlreadyExists {
        /// The collection of the conflicting record.
        collection: Collection,
        /// The ID of the conflicting record.
        id: String,
    },

    /// The record payload is invalid.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of why the record is invalid.
        message: String,
    },

    /// An error occurred during a transaction.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of the transaction error.
        message: String,
    },

    /// The connection to the store was reset or refused.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The store did not answer in time.
    #[error("Timeout: {message}")]
    Timeout {
        /// Description of the timed-out operation.
        message: String,
    },

    /// No pooled connection could be acquired.
    #[error("Connection pool exhausted: {message}")]
    PoolExhausted {
        /// Description of the pool failure.
        message: String,
    },

    /// An internal store error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(collection: Collection, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            collection,
            id: id.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `Transaction` error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a new `PoolExhausted` error.
    #[must_use]
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` for stale-connection failures that a reconnect can fix.
    ///
    /// This set is closed: connection resets, timeouts and pool exhaustion.
    /// Everything else is fatal and must reach the caller unchanged.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::PoolExhausted { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::InvalidRecord { .. } => ErrorCategory::Validation,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Connection { .. } | Self::Timeout { .. } | Self::PoolExhausted { .. } => {
                ErrorCategory::Infrastructure
            }
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Conflict on existence.
    Conflict,
    /// Validation error.
    Validation,
    /// Transaction-related error.
    Transaction,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found(Collection::MenuItem, "123");
        assert_eq!(err.to_string(), "Record not found: MenuItem/123");

        let err = StorageError::already_exists(Collection::Ingredient, "salt");
        assert_eq!(err.to_string(), "Record already exists: Ingredient/salt");
    }

    #[test]
    fn test_transient_set_is_closed() {
        assert!(StorageError::connection("reset by peer").is_transient());
        assert!(StorageError::timeout("read timed out").is_transient());
        assert!(StorageError::pool_exhausted("no idle connections").is_transient());

        assert!(!StorageError::not_found(Collection::MenuItem, "1").is_transient());
        assert!(!StorageError::invalid_record("bad").is_transient());
        assert!(!StorageError::transaction("aborted").is_transient());
        assert!(!StorageError::internal("boom").is_transient());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found(Collection::Restaurant, "1").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::timeout("slow").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Conflict.to_string(), "conflict");
    }
}
