//! PostgreSQL source store for Dastarkhan.
//!
//! Each collection lives in its own table with a JSONB payload:
//!
//! ```sql
//! CREATE TABLE "menu_item" (
//!     id TEXT PRIMARY KEY,
//!     data JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Driver errors are classified into [`StorageError`] variants so that
//! [`RetryingStore`](dastarkhan_storage::RetryingStore) can tell stale
//! connections apart from real failures.
//!
//! [`StorageError`]: dastarkhan_storage::StorageError

mod config;
mod error;
pub mod migrations;
mod pool;
pub mod queries;
mod storage;
mod transaction;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result, classify, has_pg_error_code};
pub use pool::{PgPoolOptions, create_pool, pool_options};
pub use storage::PostgresStore;
pub use transaction::PostgresTransaction;
