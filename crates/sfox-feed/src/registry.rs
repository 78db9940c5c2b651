//! Feed registry, the single authority on which feeds exist.
//!
//! Maps feed key → running [`FeedGenerator`] plus a reference count. The first
//! [`acquire`](FeedRegistry::acquire) of a key creates and starts the
//! generator; the [`release`](FeedRegistry::release) that takes the count to
//! zero stops it and removes the entry.
//!
//! # Concurrency
//!
//! Entries live in a sharded `DashMap`. Every create / increment / decrement /
//! remove decision on a key runs inside that key's entry guard, so decisions on
//! one key are serialized and concurrent acquires of an unseen key create
//! exactly one generator. Critical sections never await or block, so keys on
//! other shards proceed in parallel and same-shard contention is brief.
//!
//! An entry never exists with a count of zero, and a generator is always
//! stopped before its entry is removed. Its forwarding task is aborted at the
//! same point, so nothing a stopped generator published can reach the group
//! after a fresh generator for the same key has started.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sfox_core::config::FeedConfig;
use sfox_core::{FeedKey, FeedKeyError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::generator::FeedGenerator;
use crate::router::DeliveryRouter;

/// Result of [`FeedRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Other subscribers remain; the generator keeps running.
    Retained { remaining: usize },
    /// That was the last reference; the generator is stopped and gone.
    Stopped,
    /// No entry for the key. Benign (duplicate unsubscribe/disconnect race).
    NotFound,
}

struct FeedEntry {
    generator: Arc<FeedGenerator>,
    forwarder: Option<JoinHandle<()>>,
    ref_count: usize,
}

impl FeedEntry {
    fn stop(&self) {
        self.generator.stop();
        if let Some(forwarder) = &self.forwarder {
            forwarder.abort();
        }
    }
}

/// Reference-counted registry of live feed generators.
pub struct FeedRegistry {
    feeds: DashMap<String, FeedEntry, RandomState>,
    config: FeedConfig,
    router: DeliveryRouter,
    created: AtomicU64,
}

impl FeedRegistry {
    /// Every generator the registry creates uses `config` and forwards its
    /// output through `router`.
    pub fn new(config: FeedConfig, router: DeliveryRouter) -> Self {
        Self { feeds: DashMap::with_hasher(RandomState::new()), config, router, created: AtomicU64::new(0) }
    }

    /// Take one reference on `feed_key`, creating and starting its generator
    /// if this is the first.
    ///
    /// The delivery router is attached before the generator starts so the
    /// immediate first tick reaches the transport. Must be called from within
    /// a tokio runtime.
    pub fn acquire(&self, feed_key: &str) -> Result<Arc<FeedGenerator>, FeedKeyError> {
        FeedKey::parse(feed_key)?;

        match self.feeds.entry(feed_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.ref_count += 1;
                debug!("[feed:{feed_key}] acquired (refs={})", entry.ref_count);
                Ok(entry.generator.clone())
            }
            Entry::Vacant(vacant) => {
                let generator = Arc::new(FeedGenerator::new(feed_key, &self.config));
                let forwarder = generator.subscribe().map(|rx| self.router.attach(feed_key, rx));
                generator.start();
                let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                info!("[feed:{feed_key}] created (refs=1, generators created={total})");

                vacant.insert(FeedEntry { generator: generator.clone(), forwarder, ref_count: 1 });
                Ok(generator)
            }
        }
    }

    /// Drop one reference on `feed_key`. The last release stops the generator
    /// before the entry is removed and before this returns.
    pub fn release(&self, feed_key: &str) -> ReleaseOutcome {
        match self.feeds.entry(feed_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.ref_count > 1 {
                    entry.ref_count -= 1;
                    debug!("[feed:{feed_key}] released (refs={})", entry.ref_count);
                    return ReleaseOutcome::Retained { remaining: entry.ref_count };
                }

                entry.stop();
                occupied.remove();
                info!("[feed:{feed_key}] last subscriber left, feed removed");
                ReleaseOutcome::Stopped
            }
            Entry::Vacant(_) => {
                warn!("[feed:{feed_key}] release ignored, no such feed");
                ReleaseOutcome::NotFound
            }
        }
    }

    /// Current reference count; `0` means no such feed.
    pub fn ref_count(&self, feed_key: &str) -> usize {
        self.feeds.get(feed_key).map_or(0, |e| e.ref_count)
    }

    pub fn contains(&self, feed_key: &str) -> bool {
        self.feeds.contains_key(feed_key)
    }

    /// The live generator for `feed_key`, if any.
    pub fn generator(&self, feed_key: &str) -> Option<Arc<FeedGenerator>> {
        self.feeds.get(feed_key).map(|e| e.generator.clone())
    }

    /// Keys of all live feeds, sorted.
    pub fn feed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.feeds.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of live feeds.
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Total generators created since startup.
    pub fn generators_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Stop every live generator and clear the registry. Returns the number
    /// of feeds stopped.
    pub fn shutdown(&self) -> usize {
        let mut stopped = 0;
        self.feeds.retain(|key, entry| {
            entry.stop();
            debug!("[feed:{key}] stopped by shutdown (refs={})", entry.ref_count);
            stopped += 1;
            false
        });
        info!("feed registry shut down, {stopped} feed(s) stopped");
        stopped
    }
}
