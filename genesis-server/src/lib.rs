//! HTTP surface of Genesis Mirror.
//!
//! - unit registration and peer digest reports
//! - range-aware artifact downloads
//! - catalog and consensus round listings

pub mod error;
pub mod server;

pub use error::{ApiError, ApiResponse, ApiResult};
pub use server::{ServerState, build_state, create_router, run_server};
