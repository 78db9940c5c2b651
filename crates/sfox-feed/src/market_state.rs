//! Per-feed synthetic market state.
//!
//! Prices are drawn as scaled integers so every value is an exact decimal;
//! no float-to-decimal conversion happens on the tick path.

use rand::Rng;
use rust_decimal::Decimal;
use sfox_core::{FeedType, PriceLevel};

/// Levels per side in a synthetic order book.
pub const BOOK_DEPTH: usize = 5;

/// Centre price of every synthetic market.
const BASE_PRICE: i64 = 100;

/// Half-width of the last-price band, in units of `10^-PRICE_SCALE`.
const PRICE_JITTER: i64 = 5_000_000_000;
const PRICE_SCALE: u32 = 9;

/// Upper bound (exclusive) of the 24h volume, in cents.
const VOLUME_CENTS_MAX: i64 = 100_000;

/// Mutable state behind one feed. Fields outside a feed's category keep
/// whatever value they last had.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketState {
    pub last_price: Decimal,
    pub volume_24h: Decimal,
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the state one tick for a feed of category `feed_type`.
    ///
    /// - `Orderbook`: both sides replaced with [`BOOK_DEPTH`] levels, ask
    ///   `100 + i`, bid `100 - i` for `i = 1..=5`, size uniform in `[1, 10)`.
    /// - `Ticker` / `Trades`: last price uniform in `100 ± 5`, volume uniform
    ///   in `[0, 1000)` rounded to cents.
    /// - `Other`: untouched.
    pub fn update<R: Rng + ?Sized>(&mut self, feed_type: FeedType, rng: &mut R) {
        match feed_type {
            FeedType::Orderbook => {
                let base = Decimal::from(BASE_PRICE);
                self.asks = (1..=BOOK_DEPTH as i64)
                    .map(|i| PriceLevel::new(base + Decimal::from(i), Decimal::from(rng.gen_range(1i64..10))))
                    .collect();
                self.bids = (1..=BOOK_DEPTH as i64)
                    .map(|i| PriceLevel::new(base - Decimal::from(i), Decimal::from(rng.gen_range(1i64..10))))
                    .collect();
            }
            FeedType::Ticker | FeedType::Trades => {
                let jitter = Decimal::new(rng.gen_range(-PRICE_JITTER..PRICE_JITTER), PRICE_SCALE);
                self.last_price = Decimal::from(BASE_PRICE) + jitter;
                self.volume_24h = Decimal::new(rng.gen_range(0..VOLUME_CENTS_MAX), 2);
            }
            FeedType::Other => {}
        }
    }

    /// Quantity for one synthetic trade print, uniform in `[1, 5)`.
    pub fn random_trade_quantity<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
        Decimal::from(rng.gen_range(1i64..5))
    }
}
