//! Per-connection subscription set.
//!
//! A key is in a connection's set exactly when that connection holds one
//! registry reference for it. The hub keeps each set behind its own mutex and
//! only mutates it together with the matching registry call.

use ahash::AHashSet;

/// Feed keys one connection is subscribed to.
#[derive(Debug, Default)]
pub struct ConnectionSubscriptions {
    feeds: AHashSet<String>,
    closed: bool,
}

impl ConnectionSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, feed_key: &str) -> bool {
        self.feeds.contains(feed_key)
    }

    /// Returns `false` if the key was already present.
    pub fn insert(&mut self, feed_key: &str) -> bool {
        if self.feeds.contains(feed_key) {
            return false;
        }
        self.feeds.insert(feed_key.to_string())
    }

    /// Returns `false` if the key was not present.
    pub fn remove(&mut self, feed_key: &str) -> bool {
        self.feeds.remove(feed_key)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Subscribed keys, sorted.
    pub fn feed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.feeds.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Mark the connection gone and hand back every key it held. Later
    /// subscribes against this set are refused.
    pub fn close(&mut self) -> Vec<String> {
        self.closed = true;
        self.feeds.drain().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
