//! Periodic producer of synthetic market data for one feed key.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──► Created ──start()──► Running ──stop()──► Stopped (terminal)
//! ```
//!
//! A running generator owns one tokio task that ticks on a fixed period, the
//! first tick firing immediately. Each tick advances the feed's
//! [`MarketState`], builds a [`MarketDataMessage`] and publishes it on an
//! internal broadcast channel.
//!
//! Ticks and [`FeedGenerator::stop`] take the same lock. `stop()` drops the
//! broadcast sender while holding it, so once `stop()` returns no tick can
//! publish, even one that was already in flight. Receivers observe the
//! dropped sender as channel completion.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use sfox_core::config::FeedConfig;
use sfox_core::{
    FeedHeader, FeedKey, FeedKeyError, FeedPayload, FeedType, MarketDataMessage, TickerSnapshot, TradePrint, time_util,
};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::market_state::MarketState;

/// Receiving end handed to internal subscribers such as the delivery router.
pub type FeedReceiver = broadcast::Receiver<Arc<MarketDataMessage>>;

/// Payload text for feed types without a dedicated shape.
pub const UNSUPPORTED_FEED_MESSAGE: &str = "Unsupported feed type";

/// Where a generator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorPhase {
    Created,
    Running,
    Stopped,
}

/// Everything a tick reads or writes, guarded by one lock.
struct TickState {
    phase: GeneratorPhase,
    market: MarketState,
    rng: StdRng,
    ticks: u64,
    publisher: Option<broadcast::Sender<Arc<MarketDataMessage>>>,
}

/// Generator for a single feed key.
pub struct FeedGenerator {
    feed_key: Arc<str>,
    period: Duration,
    inner: Arc<Mutex<TickState>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FeedGenerator {
    /// Create a generator in the `Created` phase. Nothing ticks until
    /// [`start`](Self::start).
    pub fn new(feed_key: &str, config: &FeedConfig) -> Self {
        let (publisher, _) = broadcast::channel(config.channel_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            feed_key: Arc::from(feed_key),
            period: config.tick_interval(),
            inner: Arc::new(Mutex::new(TickState {
                phase: GeneratorPhase::Created,
                market: MarketState::new(),
                rng,
                ticks: 0,
                publisher: Some(publisher),
            })),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn feed_key(&self) -> &str {
        &self.feed_key
    }

    pub fn phase(&self) -> GeneratorPhase {
        self.inner.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == GeneratorPhase::Running
    }

    /// Number of ticks fired so far. Also the sequence number of the most
    /// recent message.
    pub fn ticks(&self) -> u64 {
        self.inner.lock().ticks
    }

    /// Attach a new internal subscriber. `None` once the generator stopped.
    pub fn subscribe(&self) -> Option<FeedReceiver> {
        self.inner.lock().publisher.as_ref().map(|p| p.subscribe())
    }

    /// Spawn the tick task. Only valid in the `Created` phase; any other call
    /// is logged and ignored. Must be called from within a tokio runtime.
    pub fn start(&self) {
        {
            let mut state = self.inner.lock();
            if state.phase != GeneratorPhase::Created {
                warn!("[feed:{}] start ignored in phase {:?}", self.feed_key, state.phase);
                return;
            }
            state.phase = GeneratorPhase::Running;
        }

        let task = tokio::spawn(tick_loop(
            self.feed_key.clone(),
            self.inner.clone(),
            self.period,
            self.shutdown_tx.subscribe(),
        ));
        *self.task.lock() = Some(task);
        info!("[feed:{}] generator running (period={:?})", self.feed_key, self.period);
    }

    /// Stop ticking for good. Idempotent.
    ///
    /// On return the phase is `Stopped`, the publisher is dropped (receivers
    /// see the channel close) and the tick task is signalled and aborted.
    pub fn stop(&self) {
        {
            let mut state = self.inner.lock();
            if state.phase == GeneratorPhase::Stopped {
                return;
            }
            state.phase = GeneratorPhase::Stopped;
            state.publisher = None;
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        info!("[feed:{}] generator stopped", self.feed_key);
    }
}

impl Drop for FeedGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FeedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedGenerator")
            .field("feed_key", &self.feed_key)
            .field("period", &self.period)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Tick until shutdown is signalled. Ticks never overlap.
async fn tick_loop(
    feed_key: Arc<str>,
    inner: Arc<Mutex<TickState>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {
                if !tick(&feed_key, &inner) {
                    break;
                }
            }
        }
    }

    debug!("[feed:{feed_key}] tick loop exited");
}

/// Run one tick. Returns `false` once the generator is no longer running.
fn tick(feed_key: &str, inner: &Mutex<TickState>) -> bool {
    let mut guard = inner.lock();
    let TickState { phase, market, rng, ticks, publisher } = &mut *guard;

    if *phase != GeneratorPhase::Running {
        return false;
    }
    let Some(publisher) = publisher.as_ref() else {
        return false;
    };

    *ticks += 1;
    let sequence = *ticks;

    if publisher.receiver_count() == 0 {
        trace!("[feed:{feed_key}] tick {sequence} skipped, no listeners");
        return true;
    }

    match build_message(feed_key, sequence, market, rng) {
        Ok(message) => {
            trace!("[feed:{feed_key}] publishing {message}");
            if publisher.send(Arc::new(message)).is_err() {
                trace!("[feed:{feed_key}] listeners left during tick {sequence}");
            }
        }
        Err(e) => {
            error!("[feed:{feed_key}] tick {sequence} failed: {e}");
        }
    }
    true
}

/// Advance `market` and wrap the result in a message.
pub(crate) fn build_message(
    feed_key: &str,
    sequence: u64,
    market: &mut MarketState,
    rng: &mut StdRng,
) -> Result<MarketDataMessage, FeedKeyError> {
    let key = FeedKey::parse(feed_key)?;
    let kind = key.kind();
    market.update(kind, rng);

    let now = time_util::now_utc();
    let header = FeedHeader {
        feed_key: key.raw.to_string(),
        feed_type: key.feed_type.to_string(),
        currency_pair: key.currency_pair.to_string(),
    };

    let payload = match kind {
        FeedType::Orderbook => FeedPayload::Orderbook { header, asks: market.asks.clone(), bids: market.bids.clone() },
        FeedType::Ticker => FeedPayload::Ticker {
            header,
            ticker: TickerSnapshot {
                last: market.last_price,
                high: market.last_price * Decimal::new(105, 2),
                low: market.last_price * Decimal::new(95, 2),
                volume: market.volume_24h,
                timestamp: now,
            },
        },
        FeedType::Trades => FeedPayload::Trades {
            header,
            trade: TradePrint {
                price: market.last_price,
                quantity: MarketState::random_trade_quantity(rng),
                timestamp: now,
            },
        },
        FeedType::Other => FeedPayload::Unsupported { header, message: UNSUPPORTED_FEED_MESSAGE.into() },
    };

    Ok(MarketDataMessage { sequence, feed_key: feed_key.to_string(), timestamp: now.timestamp_millis(), payload })
}
