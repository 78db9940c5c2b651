//! WebSocket wire protocol.
//!
//! Client → server text frames:
//!
//! ```json
//! {"action":"subscribe","feedKey":"ticker.sfox.btcusd"}
//! {"action":"unsubscribe","feedKey":"ticker.sfox.btcusd"}
//! ```
//!
//! Server → client text frames carry an `event` name and a `data` body:
//! `ReceiveMarketData`, `ReceiveError`, `Subscribed`, `Unsubscribed`.

use serde::{Deserialize, Serialize};
use sfox_core::error::SfoxError;
use sfox_core::{ClientError, MarketDataMessage};

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientRequest {
    Subscribe {
        #[serde(rename = "feedKey")]
        feed_key: String,
    },
    Unsubscribe {
        #[serde(rename = "feedKey")]
        feed_key: String,
    },
}

/// Parse one client text frame.
pub fn parse_client_request(text: &str) -> Result<ClientRequest, SfoxError> {
    serde_json::from_str(text).map_err(|e| SfoxError::Protocol(format!("invalid request: {e}")))
}

/// A frame pushed to a client.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame<'a> {
    #[serde(rename = "ReceiveMarketData")]
    MarketData(&'a MarketDataMessage),
    #[serde(rename = "ReceiveError")]
    Error(&'a ClientError),
    Subscribed {
        #[serde(rename = "feedKey")]
        feed_key: &'a str,
    },
    Unsubscribed {
        #[serde(rename = "feedKey")]
        feed_key: &'a str,
    },
}

impl ServerFrame<'_> {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
