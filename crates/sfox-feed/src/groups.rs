//! In-process group table backing the WebSocket server.
//!
//! Each live connection registers an outbound text queue; groups map a feed
//! key to the connections that joined it. Delivery encodes a message once and
//! hands the same text to every member with `try_send`, so one stalled socket
//! never holds up the feed.

use std::sync::Arc;

use ahash::{AHashSet, RandomState};
use async_trait::async_trait;
use dashmap::DashMap;
use sfox_core::{ConnectionId, MarketDataMessage};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::protocol::ServerFrame;
use crate::transport::{Transport, TransportError};

/// Connection registry plus delivery groups.
#[derive(Default)]
pub struct GroupTransport {
    connections: DashMap<ConnectionId, mpsc::Sender<String>, RandomState>,
    groups: DashMap<String, AHashSet<ConnectionId>, RandomState>,
}

impl GroupTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connection` addressable through `outbound`.
    pub fn register(&self, connection: ConnectionId, outbound: mpsc::Sender<String>) {
        self.connections.insert(connection, outbound);
    }

    /// Forget `connection` and drop it from every group.
    pub fn unregister(&self, connection: &ConnectionId) {
        self.connections.remove(connection);
        self.groups.retain(|_, members| {
            members.remove(connection);
            !members.is_empty()
        });
    }

    /// Queue one frame for a single connection.
    pub fn send_to(&self, connection: &ConnectionId, frame: &ServerFrame<'_>) -> Result<(), TransportError> {
        let text = frame.to_text()?;
        let tx = self
            .connections
            .get(connection)
            .map(|e| e.value().clone())
            .ok_or_else(|| TransportError::UnknownConnection(connection.clone()))?;
        match tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("[conn-{connection}] outbound queue full, frame dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed(connection.clone())),
        }
    }

    /// Members of `group`, sorted.
    pub fn group_members(&self, group: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> =
            self.groups.get(group).map(|m| m.iter().cloned().collect()).unwrap_or_default();
        members.sort();
        members
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[async_trait]
impl Transport for GroupTransport {
    async fn deliver_to_group(&self, group: &str, message: Arc<MarketDataMessage>) -> Result<usize, TransportError> {
        let members = self.group_members(group);
        if members.is_empty() {
            return Ok(0);
        }

        let text = ServerFrame::MarketData(&message).to_text()?;
        let mut delivered = 0;
        for member in &members {
            let Some(tx) = self.connections.get(member).map(|e| e.value().clone()) else {
                continue;
            };
            match tx.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("[conn-{member}] outbound queue full, dropped {} seq={}", message.feed_key, message.sequence)
                }
                Err(TrySendError::Closed(_)) => debug!("[conn-{member}] closed before delivery"),
            }
        }
        Ok(delivered)
    }

    fn join_group(&self, connection: &ConnectionId, group: &str) -> Result<(), TransportError> {
        if !self.connections.contains_key(connection) {
            return Err(TransportError::UnknownConnection(connection.clone()));
        }
        self.groups.entry(group.to_string()).or_default().insert(connection.clone());
        Ok(())
    }

    fn leave_group(&self, connection: &ConnectionId, group: &str) {
        self.groups.remove_if_mut(group, |_, members| {
            members.remove(connection);
            members.is_empty()
        });
    }
}
