//! Boundary contract with the real-time transport.
//!
//! The core never talks to sockets. It needs exactly three things from
//! whatever carries messages to clients: push a message to everyone in a
//! delivery group, and add or remove a connection from a group. Disconnect
//! notification flows the other way, with the transport calling
//! [`FeedHub::on_disconnect`](crate::hub::FeedHub::on_disconnect).

use std::sync::Arc;

use async_trait::async_trait;
use sfox_core::{ConnectionId, MarketDataMessage};
use thiserror::Error;

/// Failures reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is not (or no longer) known to the transport.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound queue is gone.
    #[error("connection {0} closed")]
    Closed(ConnectionId),

    /// The message could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Group-addressed delivery. Group ids are feed keys.
///
/// Implementations must be cheap and non-blocking in `join_group` /
/// `leave_group`: the hub calls them while holding a connection's lock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Best-effort push to every connection currently in `group`.
    ///
    /// Returns the number of connections the message was handed to.
    async fn deliver_to_group(&self, group: &str, message: Arc<MarketDataMessage>) -> Result<usize, TransportError>;

    /// Add `connection` to `group`.
    fn join_group(&self, connection: &ConnectionId, group: &str) -> Result<(), TransportError>;

    /// Remove `connection` from `group`. Removing a non-member is a no-op.
    fn leave_group(&self, connection: &ConnectionId, group: &str);
}
