//! # sfox-core
//!
//! Core crate for the sFOX feed simulator, providing:
//!
//! - **Types** (`types`) — feed keys, connection ids, market data messages and payloads
//! - **Configuration** (`config`) — JSON config deserialization with defaults
//! - **Error types** (`error`) — domain-specific `SfoxError` via thiserror
//! - **Time utilities** (`time_util`) — millisecond and ISO-8601 timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
