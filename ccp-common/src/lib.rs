//! # CCP Common Library
//!
//! Shared code for the child case pull services:
//! - Error types
//! - Configuration file resolution and TOML loading
//! - Logging initialization
//! - Bounded retry with exponential backoff

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use error::{Error, Result};
