//! Core data types: feed keys, connection ids, and the market data messages
//! pushed to clients.

pub mod client_error;
pub mod connection;
pub mod feed_key;
pub mod market_data;

pub use client_error::*;
pub use connection::*;
pub use feed_key::*;
pub use market_data::*;
