//! Typed error definitions for the feed simulator.
//!
//! [`SfoxError`] covers the failure domains that cross crate boundaries. All
//! variants implement `std::error::Error` via `thiserror`, so they integrate
//! with `anyhow::Result` in the runner.

use thiserror::Error;

/// Domain-specific errors for the feed simulator.
#[derive(Debug, Error)]
pub enum SfoxError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// A client frame that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}
