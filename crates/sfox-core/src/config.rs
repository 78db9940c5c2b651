//! Configuration parsing for the feed simulator.
//!
//! The runner reads an optional JSON file. Every field has a default matching
//! the reference deployment (hub at `/ws`, 5 s ticks, 15 s keep-alive, 30 s
//! client timeout), so an empty object or a missing file is a valid config.
//!
//! # Example config
//!
//! ```json
//! {
//!   "listen_addr": "0.0.0.0:5000",
//!   "path": "/ws",
//!   "feed": { "tick_interval_ms": 5000, "channel_capacity": 64 },
//!   "ws": { "keep_alive_sec": 15, "client_timeout_sec": 30, "outbound_buffer": 256 },
//!   "log": { "module_name": "sfox-sim", "log_dir": "/tmp/log" }
//! }
//! ```

use std::{path::Path, time::Duration};

use serde::Deserialize;
use tracing::info;

use crate::error::SfoxError;

/// Top-level application config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Socket address the WebSocket server binds to.
    pub listen_addr: String,
    /// Request path clients must connect to.
    pub path: String,
    pub feed: FeedConfig,
    pub ws: WsConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".into(),
            path: "/ws".into(),
            feed: FeedConfig::default(),
            ws: WsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<(), SfoxError> {
        if self.feed.tick_interval_ms == 0 {
            return Err(SfoxError::Config("feed.tick_interval_ms must be > 0".into()));
        }
        if self.feed.channel_capacity == 0 {
            return Err(SfoxError::Config("feed.channel_capacity must be > 0".into()));
        }
        if self.ws.outbound_buffer == 0 {
            return Err(SfoxError::Config("ws.outbound_buffer must be > 0".into()));
        }
        if self.ws.keep_alive_sec == 0 || self.ws.client_timeout_sec <= self.ws.keep_alive_sec {
            return Err(SfoxError::Config(format!(
                "ws.client_timeout_sec ({}) must exceed ws.keep_alive_sec ({}) and both must be > 0",
                self.ws.client_timeout_sec, self.ws.keep_alive_sec
            )));
        }
        if !self.path.starts_with('/') {
            return Err(SfoxError::Config(format!("path '{}' must start with '/'", self.path)));
        }
        Ok(())
    }
}

/// Feed generator settings shared by every generator the registry creates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Period between ticks; the first tick fires immediately.
    pub tick_interval_ms: u64,
    /// Capacity of each generator's internal broadcast channel. A forwarder
    /// that falls this far behind skips the oldest messages.
    pub channel_capacity: usize,
    /// Fixed RNG seed. `None` seeds every generator from OS entropy.
    pub seed: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { tick_interval_ms: 5_000, channel_capacity: 64, seed: None }
    }
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// WebSocket server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Interval between server-initiated pings.
    pub keep_alive_sec: u64,
    /// A connection with no inbound frame for this long is closed.
    pub client_timeout_sec: u64,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { keep_alive_sec: 15, client_timeout_sec: 30, outbound_buffer: 256 }
    }
}

impl WsConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_sec)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_sec)
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file prefix.
    pub module_name: String,
    /// Directory for daily-rotating log files. Console only when unset.
    pub log_dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { module_name: "sfox-sim".into(), log_dir: None }
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if given, otherwise fall back to defaults.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(p) => load_config(p),
        None => {
            info!("no config file given, using defaults");
            Ok(AppConfig::default())
        }
    }
}
