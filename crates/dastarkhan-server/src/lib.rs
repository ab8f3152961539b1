//! HTTP server for the Dastarkhan menu.
//!
//! The binary loads [`config::AppConfig`], wires an explicit
//! [`context::AppContext`] (source store, Redis adapter, cache layer) and
//! serves read-only JSON routes from the cache repositories.

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use context::AppContext;
pub use error::ApiError;
pub use server::{DastarkhanServer, ServerBuilder, build_app};
