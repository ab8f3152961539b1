//! Error types for the PostgreSQL source store.
//!
//! sqlx errors are classified here into the storage error variants; the
//! classification decides what the retry wrapper treats as transient.

use dastarkhan_storage::{Collection, StorageError};
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for too many connections (53300).
pub const PG_TOO_MANY_CONNECTIONS: &str = "53300";

/// PostgreSQL error code for statement cancelled by timeout (57014).
pub const PG_QUERY_CANCELED: &str = "57014";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    pg_error_code(err).as_deref() == Some(code)
}

fn pg_error_code(err: &SqlxError) -> Option<String> {
    if let SqlxError::Database(db_err) = err {
        db_err.code().map(|c| c.into_owned())
    } else {
        None
    }
}

/// Returns true for SQLSTATEs that mean the server dropped the connection:
/// class 08 (connection exception) and 57P01..57P03 (admin/crash shutdown).
fn is_connection_state(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

/// Errors specific to the PostgreSQL source store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Error returned by the driver.
    #[error("Database error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Classifies a driver error raised while touching `collection/id`.
///
/// Unique violations become `AlreadyExists` for that record; everything
/// else goes through the generic classification.
pub fn classify_for(err: SqlxError, collection: Collection, id: &str) -> StorageError {
    if has_pg_error_code(&err, PG_UNIQUE_VIOLATION) {
        return StorageError::already_exists(collection, id);
    }
    classify(err)
}

/// Classifies a driver error into a storage error.
pub fn classify(err: SqlxError) -> StorageError {
    if let Some(code) = pg_error_code(&err) {
        let message = err.to_string();
        return match code.as_str() {
            c if is_connection_state(c) => StorageError::connection(message),
            PG_TOO_MANY_CONNECTIONS => StorageError::pool_exhausted(message),
            PG_QUERY_CANCELED => StorageError::timeout(message),
            _ => StorageError::internal(message),
        };
    }

    match err {
        SqlxError::Io(e) => StorageError::connection(e.to_string()),
        SqlxError::Tls(e) => StorageError::connection(e.to_string()),
        SqlxError::PoolClosed => StorageError::connection("connection pool was closed"),
        SqlxError::WorkerCrashed => StorageError::connection("connection worker crashed"),
        SqlxError::PoolTimedOut => {
            StorageError::pool_exhausted("timed out waiting for a pooled connection")
        }
        other => StorageError::internal(other.to_string()),
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Sqlx(e) => classify(e),
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
