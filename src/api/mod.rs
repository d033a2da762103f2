//! Cuelog API Server module
//!
//! Provides the HTTP REST API consumed by the logging front end.
//! Run with `cuelog serve` or `cuelog-server`.

mod error;
pub mod handlers;
pub mod server;

pub use error::{status_for, ApiError};
pub use server::{build_router, init_tracing, run_api_server, AppState};
