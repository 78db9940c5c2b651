//! Feed hub: the client-invokable subscribe/unsubscribe surface.
//!
//! Ties together the per-connection [`ConnectionSubscriptions`], the shared
//! [`FeedRegistry`] and the transport's delivery groups. A transport calls
//! [`subscribe`](FeedHub::subscribe) / [`unsubscribe`](FeedHub::unsubscribe)
//! for client requests and [`on_disconnect`](FeedHub::on_disconnect) when a
//! connection closes.
//!
//! # Locking
//!
//! Each connection's set sits behind its own mutex. Registry and group calls
//! for a connection happen while that mutex is held, which keeps "key in set"
//! and "reference held" in step even when an unsubscribe races a disconnect.
//! Lock order is connection → registry entry → generator; transport locks are
//! leaves.
//!
//! # Disconnected connections
//!
//! [`on_disconnect`](FeedHub::on_disconnect) closes the connection's set but
//! leaves it in the table, so a subscribe arriving afterwards finds it closed
//! and is refused instead of opening a new set. The transport drops the
//! closed set with [`forget`](FeedHub::forget) once it will issue no more
//! calls for that id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use sfox_core::{ClientError, ConnectionId, FeedKey};
use tracing::{debug, error, info};

use crate::registry::FeedRegistry;
use crate::subscriptions::ConnectionSubscriptions;
use crate::transport::Transport;

/// Successful [`FeedHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    /// The connection already held the key; nothing changed.
    AlreadySubscribed,
}

type ConnectionSlot = Arc<Mutex<ConnectionSubscriptions>>;

/// Subscription front end shared by all connections.
pub struct FeedHub {
    registry: Arc<FeedRegistry>,
    transport: Arc<dyn Transport>,
    connections: DashMap<ConnectionId, ConnectionSlot, RandomState>,
    open: AtomicUsize,
    shut_down: AtomicBool,
}

impl FeedHub {
    pub fn new(registry: Arc<FeedRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            connections: DashMap::with_hasher(RandomState::new()),
            open: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<FeedRegistry> {
        &self.registry
    }

    /// Register a freshly opened connection. Optional: a connection that
    /// subscribes without being announced gets its set on first subscribe.
    pub fn on_connect(&self, connection: &ConnectionId) {
        self.slot(connection);
        info!("[conn-{connection}] connected, active connections: {}", self.connection_count());
    }

    /// Subscribe `connection` to `feed_key`.
    ///
    /// Idempotent per key. On failure nothing is left behind: no registry
    /// reference, no group membership, no set entry.
    pub fn subscribe(&self, connection: &ConnectionId, feed_key: &str) -> Result<SubscribeOutcome, ClientError> {
        if let Err(e) = FeedKey::parse(feed_key) {
            error!("[conn-{connection}] subscribe to '{feed_key}' failed: {e}");
            return Err(ClientError::subscribe_failed(e.to_string()));
        }

        if self.shut_down.load(Ordering::Acquire) {
            return Err(ClientError::subscribe_failed("server is shutting down"));
        }

        let slot = self.slot(connection);
        let mut subs = slot.lock();

        if subs.is_closed() {
            error!("[conn-{connection}] subscribe to '{feed_key}' after disconnect");
            return Err(ClientError::subscribe_failed(format!("connection {connection} is closed")));
        }
        // Checked again under the connection lock: either shutdown's
        // disconnect pass sees this set and waits for us, or we see the flag.
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ClientError::subscribe_failed("server is shutting down"));
        }
        if subs.contains(feed_key) {
            debug!("[conn-{connection}] already subscribed to {feed_key}");
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        // Join before acquiring so a freshly started generator's first tick
        // already finds this connection in the group.
        if let Err(e) = self.transport.join_group(connection, feed_key) {
            error!("[conn-{connection}] joining group {feed_key} failed: {e}");
            return Err(ClientError::subscribe_failed(e.to_string()));
        }

        if let Err(e) = self.registry.acquire(feed_key) {
            error!("[conn-{connection}] subscribe to '{feed_key}' failed: {e}");
            self.transport.leave_group(connection, feed_key);
            return Err(ClientError::subscribe_failed(e.to_string()));
        }

        subs.insert(feed_key);
        info!("[conn-{connection}] subscribed to feed {feed_key}");
        Ok(SubscribeOutcome::Subscribed)
    }

    /// Unsubscribe `connection` from `feed_key`. Returns `false` (and changes
    /// nothing) if it was not subscribed.
    pub fn unsubscribe(&self, connection: &ConnectionId, feed_key: &str) -> bool {
        let Some(slot) = self.connections.get(connection).map(|s| s.value().clone()) else {
            debug!("[conn-{connection}] unsubscribe from {feed_key} ignored, no subscriptions");
            return false;
        };

        let mut subs = slot.lock();
        if !subs.remove(feed_key) {
            debug!("[conn-{connection}] unsubscribe from {feed_key} ignored, not subscribed");
            return false;
        }

        self.registry.release(feed_key);
        self.transport.leave_group(connection, feed_key);
        info!("[conn-{connection}] unsubscribed from feed {feed_key}");
        true
    }

    /// Release everything `connection` held and close its set. Idempotent.
    /// Returns the number of feeds released.
    pub fn on_disconnect(&self, connection: &ConnectionId) -> usize {
        let Some(slot) = self.connections.get(connection).map(|s| s.value().clone()) else {
            debug!("[conn-{connection}] disconnect for unknown connection ignored");
            return 0;
        };

        let mut subs = slot.lock();
        if subs.is_closed() {
            debug!("[conn-{connection}] already disconnected");
            return 0;
        }
        let held = subs.close();
        self.open.fetch_sub(1, Ordering::AcqRel);
        for feed_key in &held {
            self.registry.release(feed_key);
            self.transport.leave_group(connection, feed_key);
        }
        drop(subs);

        info!(
            "[conn-{connection}] disconnected, released {} feed(s), active connections: {}",
            held.len(),
            self.connection_count()
        );
        held.len()
    }

    /// Keys `connection` is subscribed to, sorted.
    pub fn subscriptions(&self, connection: &ConnectionId) -> Vec<String> {
        self.connections.get(connection).map(|s| s.value().clone()).map_or_else(Vec::new, |slot| slot.lock().feed_keys())
    }

    /// Drop the closed set of a disconnected connection. Returns `false`, and
    /// keeps the set, while the connection is still open. The id must not be
    /// used again afterwards.
    pub fn forget(&self, connection: &ConnectionId) -> bool {
        self.connections.remove_if(connection, |_, slot| slot.lock().is_closed()).is_some()
    }

    /// Number of connections that have an open subscription set.
    pub fn connection_count(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Disconnect every connection, then stop whatever the registry still
    /// holds. Later subscribes are refused.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| e.key().clone()).collect();
        let released: usize = ids.iter().map(|id| self.on_disconnect(id)).sum();
        self.registry.shutdown();
        info!("feed hub shut down, {released} feed reference(s) released");
    }

    fn slot(&self, connection: &ConnectionId) -> ConnectionSlot {
        match self.connections.entry(connection.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                self.open.fetch_add(1, Ordering::AcqRel);
                vacant.insert(ConnectionSlot::default()).value().clone()
            }
        }
    }
}
