//! # sfox-feed
//!
//! Simulated sFOX market data: reference-counted feed generators fanned out
//! to WebSocket clients.
//!
//! ## Architecture
//!
//! ```text
//!  client ──ws──► WsServer ──► FeedHub ──acquire/release──► FeedRegistry
//!                    ▲            │                              │
//!                    │       join/leave                   start/stop
//!                    │            ▼                              ▼
//!                    └──── GroupTransport ◄── DeliveryRouter ◄── FeedGenerator
//!                          (feed key = group)   (one task/feed)   (tick loop)
//! ```
//!
//! One generator exists per feed key while at least one connection is
//! subscribed to it. The hub keeps each connection's subscription set in step
//! with the registry's reference counts; the last release stops the generator.
//!
//! ## Modules
//!
//! - [`registry`] — feed key → generator + reference count
//! - [`generator`] — periodic synthetic tick producer
//! - [`market_state`] — synthetic book and price state
//! - [`hub`] — subscribe / unsubscribe / disconnect handling
//! - [`subscriptions`] — per-connection subscription set
//! - [`router`] — generator output → transport groups
//! - [`transport`] — the [`Transport`](transport::Transport) boundary trait
//! - [`groups`] — in-process group table used by the WebSocket server
//! - [`protocol`] — JSON client/server frames
//! - [`ws_server`] — WebSocket listener and per-connection loop
//! - [`service`] — wiring and lifecycle

pub mod generator;
pub mod groups;
pub mod hub;
pub mod market_state;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod service;
pub mod subscriptions;
pub mod transport;
pub mod ws_server;

pub use generator::{FeedGenerator, GeneratorPhase};
pub use groups::GroupTransport;
pub use hub::{FeedHub, SubscribeOutcome};
pub use registry::{FeedRegistry, ReleaseOutcome};
pub use router::DeliveryRouter;
pub use service::FeedService;
pub use transport::{Transport, TransportError};
