//! Feed key parsing.
//!
//! A feed key has the form `<feedType>.<venue>.<currencyPair>`, e.g.
//! `ticker.sfox.btcusd`. The registry treats the key as an opaque map key;
//! only the generator looks inside it, and only at the first and third
//! segments. Segments past the third are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of dot-separated segments in a valid key.
pub const FEED_KEY_SEGMENTS: usize = 3;

/// A key with fewer than [`FEED_KEY_SEGMENTS`] segments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed feed key '{key}': expected <feedType>.<venue>.<currencyPair>, got {segments} segment(s)")]
pub struct FeedKeyError {
    pub key: String,
    pub segments: usize,
}

/// Borrowed view over a validated feed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedKey<'a> {
    pub raw: &'a str,
    pub feed_type: &'a str,
    pub venue: &'a str,
    pub currency_pair: &'a str,
}

impl<'a> FeedKey<'a> {
    /// Split `raw` on `.` and pick out the type, venue and pair.
    pub fn parse(raw: &'a str) -> Result<Self, FeedKeyError> {
        let mut parts = raw.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(feed_type), Some(venue), Some(currency_pair)) => Ok(Self { raw, feed_type, venue, currency_pair }),
            _ => Err(FeedKeyError { key: raw.to_string(), segments: raw.split('.').count() }),
        }
    }

    pub fn kind(&self) -> FeedType {
        FeedType::from_segment(self.feed_type)
    }
}

impl fmt::Display for FeedKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw)
    }
}

/// Feed categories with a dedicated payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Orderbook,
    Ticker,
    Trades,
    /// Any other first segment. Still ticks, with an "unsupported" payload.
    Other,
}

impl FeedType {
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            "orderbook" => Self::Orderbook,
            "ticker" => Self::Ticker,
            "trades" => Self::Trades,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orderbook => write!(f, "orderbook"),
            Self::Ticker => write!(f, "ticker"),
            Self::Trades => write!(f, "trades"),
            Self::Other => write!(f, "other"),
        }
    }
}
