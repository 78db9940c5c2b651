//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sfox_core::config::FeedConfig;
use sfox_core::{ConnectionId, MarketDataMessage};
use sfox_feed::{DeliveryRouter, FeedHub, FeedRegistry, Transport, TransportError};

/// In-memory transport that records group membership and every delivery.
#[derive(Default)]
pub struct RecordingTransport {
    groups: Mutex<HashMap<String, HashSet<ConnectionId>>>,
    delivered: Mutex<Vec<Arc<MarketDataMessage>>>,
}

impl RecordingTransport {
    pub fn members(&self, group: &str) -> usize {
        self.groups.lock().get(group).map_or(0, HashSet::len)
    }

    /// Messages delivered to `group` so far, in delivery order.
    pub fn delivered(&self, group: &str) -> Vec<Arc<MarketDataMessage>> {
        self.delivered.lock().iter().filter(|m| m.feed_key == group).cloned().collect()
    }

    /// Poll until `group` has seen at least `n` deliveries.
    pub async fn wait_for(&self, group: &str, n: usize) -> Vec<Arc<MarketDataMessage>> {
        for _ in 0..500 {
            let got = self.delivered(group);
            if got.len() >= n {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {n} deliveries on {group}");
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver_to_group(&self, group: &str, message: Arc<MarketDataMessage>) -> Result<usize, TransportError> {
        let members = self.members(group);
        self.delivered.lock().push(message);
        Ok(members)
    }

    fn join_group(&self, connection: &ConnectionId, group: &str) -> Result<(), TransportError> {
        self.groups.lock().entry(group.to_string()).or_default().insert(connection.clone());
        Ok(())
    }

    fn leave_group(&self, connection: &ConnectionId, group: &str) {
        let mut groups = self.groups.lock();
        if let Some(members) = groups.get_mut(group) {
            members.remove(connection);
            if members.is_empty() {
                groups.remove(group);
            }
        }
    }
}

pub fn feed_config(tick_interval_ms: u64) -> FeedConfig {
    FeedConfig { tick_interval_ms, channel_capacity: 64, seed: Some(42) }
}

/// A hub wired to a fresh registry and recording transport.
pub fn hub(tick_interval_ms: u64) -> (Arc<FeedHub>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let registry = Arc::new(FeedRegistry::new(feed_config(tick_interval_ms), DeliveryRouter::new(transport.clone())));
    (Arc::new(FeedHub::new(registry, transport.clone())), transport)
}
