//! Market data structures: the messages fanned out to feed subscribers.
//!
//! A [`MarketDataMessage`] is built once per tick per feed and shared by
//! `Arc` between every receiver. Field names on the wire are camelCase, and
//! the feed key travels as `recipient`, the delivery-group address clients
//! already key on.
//!
//! # Timestamp convention
//!
//! The envelope `timestamp` is **milliseconds since Unix epoch**. Timestamps
//! nested inside ticker and trade payloads are ISO-8601 UTC strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Order book level
// ---------------------------------------------------------------------------

/// One order book level. Serialized as a `[price, size]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

impl Serialize for PriceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.price, self.size).serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Payload pieces
// ---------------------------------------------------------------------------

/// Fields every payload starts with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedHeader {
    pub feed_key: String,
    pub feed_type: String,
    pub currency_pair: String,
}

/// Ticker statistics derived from the last price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSnapshot {
    pub last: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A single synthetic trade print.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradePrint {
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// FeedPayload — tagged union, one variant per feed type
// ---------------------------------------------------------------------------

/// Payload of one tick. The variant is chosen by the feed key's first segment.
///
/// Serialized untagged: clients tell the shapes apart by `feedType` and by
/// which of `asks`/`ticker`/`trade`/`message` is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeedPayload {
    Orderbook {
        #[serde(flatten)]
        header: FeedHeader,
        asks: Vec<PriceLevel>,
        bids: Vec<PriceLevel>,
    },
    Ticker {
        #[serde(flatten)]
        header: FeedHeader,
        ticker: TickerSnapshot,
    },
    Trades {
        #[serde(flatten)]
        header: FeedHeader,
        trade: TradePrint,
    },
    Unsupported {
        #[serde(flatten)]
        header: FeedHeader,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// MarketDataMessage — envelope
// ---------------------------------------------------------------------------

/// One tick of one feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketDataMessage {
    /// Strictly increasing per generator; a jump means ticks were missed.
    pub sequence: u64,
    /// Feed key, doubling as the delivery-group address.
    #[serde(rename = "recipient")]
    pub feed_key: String,
    /// Unix milliseconds at construction.
    pub timestamp: i64,
    pub payload: FeedPayload,
}

impl std::fmt::Display for MarketDataMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MarketData({} seq={} ts={})", self.feed_key, self.sequence, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header() -> FeedHeader {
        FeedHeader { feed_key: "orderbook.sfox.ethusd".into(), feed_type: "orderbook".into(), currency_pair: "ethusd".into() }
    }

    #[test]
    fn orderbook_serializes_levels_as_pairs() {
        let payload = FeedPayload::Orderbook {
            header: header(),
            asks: vec![PriceLevel::new(Decimal::from(101), Decimal::from(3))],
            bids: vec![PriceLevel::new(Decimal::from(99), Decimal::from(7))],
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["feedKey"], "orderbook.sfox.ethusd");
        assert_eq!(v["feedType"], "orderbook");
        assert_eq!(v["currencyPair"], "ethusd");
        assert_eq!(v["asks"], json!([[101.0, 3.0]]));
        assert_eq!(v["bids"], json!([[99.0, 7.0]]));
    }

    #[test]
    fn envelope_uses_recipient_field() {
        let msg = MarketDataMessage {
            sequence: 4,
            feed_key: "foo.sfox.btcusd".into(),
            timestamp: 1_700_000_000_000,
            payload: FeedPayload::Unsupported {
                header: FeedHeader { feed_key: "foo.sfox.btcusd".into(), feed_type: "foo".into(), currency_pair: "btcusd".into() },
                message: "Unsupported feed type".into(),
            },
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["sequence"], 4);
        assert_eq!(v["recipient"], "foo.sfox.btcusd");
        assert_eq!(v["timestamp"], 1_700_000_000_000i64);
        assert_eq!(v["payload"]["message"], "Unsupported feed type");
        assert!(v.get("feed_key").is_none());
        assert_eq!(v["payload"]["feedType"], "foo");
    }
}
