//! Shared types for the Greenlight API
//!
//! Common types used across crates: the unified error system, the API
//! response envelope and small utilities.

pub mod error;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
