//! Delivery router. Forwards each generator's output to the transport.
//!
//! One forwarding task per live feed. The task owns a broadcast receiver, so
//! a slow transport only makes that receiver lag; the generator never waits
//! on delivery. The registry aborts the task when the feed's last reference
//! is released; otherwise it exits once the channel closes.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::generator::FeedReceiver;
use crate::transport::Transport;

/// Bridges generator broadcast channels to [`Transport::deliver_to_group`].
#[derive(Clone)]
pub struct DeliveryRouter {
    transport: Arc<dyn Transport>,
}

impl DeliveryRouter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Spawn the forwarding task for `feed_key`. The group address is the
    /// feed key itself.
    pub fn attach(&self, feed_key: &str, rx: FeedReceiver) -> tokio::task::JoinHandle<()> {
        let transport = self.transport.clone();
        let group = feed_key.to_string();
        tokio::spawn(forward_loop(group, rx, transport))
    }
}

async fn forward_loop(group: String, mut rx: FeedReceiver, transport: Arc<dyn Transport>) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                let sequence = message.sequence;
                match transport.deliver_to_group(&group, message).await {
                    Ok(n) => debug!("[feed:{group}] seq={sequence} delivered to {n} connection(s)"),
                    Err(e) => warn!("[feed:{group}] seq={sequence} delivery failed: {e}"),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("[feed:{group}] delivery lagging, skipped {skipped} message(s)");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("[feed:{group}] delivery completed");
}
