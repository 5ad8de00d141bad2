//! Userflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the userflow pipeline.
//!
//! # Overview
//!
//! This crate provides functionality used by every pipeline stage:
//!
//! - **Error Handling**: the common error type and result alias
//! - **Logging**: `tracing` subscriber setup for stage processes
//! - **Records**: the normalized user record that flows between stages
//!
//! # Example
//!
//! ```no_run
//! use userflow_common::{Result, UserRecord};
//!
//! fn encode(records: &[UserRecord]) -> Result<String> {
//!     Ok(serde_json::to_string(records)?)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod record;

// Re-export commonly used types
pub use error::{FlowError, Result};
pub use record::UserRecord;
