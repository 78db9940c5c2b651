//! Service wiring: transport → router → registry → hub → WebSocket server.
//!
//! ```text
//!  FeedService::bind(config)
//!      ──► GroupTransport (connections + groups)
//!      ──► DeliveryRouter ─► FeedRegistry ─► FeedHub
//!      ──► TcpListener
//!  FeedService::start()  ──► spawn WsServer::serve
//!  FeedService::stop()   ──► signal shutdown, release every feed, join task
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use sfox_core::config::AppConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::groups::GroupTransport;
use crate::hub::FeedHub;
use crate::registry::FeedRegistry;
use crate::router::DeliveryRouter;
use crate::ws_server::WsServer;

/// The running simulator.
pub struct FeedService {
    hub: Arc<FeedHub>,
    groups: Arc<GroupTransport>,
    server: Arc<WsServer>,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FeedService {
    /// Build every component and bind `config.listen_addr`. Nothing is
    /// accepted until [`start`](Self::start).
    pub async fn bind(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let groups = Arc::new(GroupTransport::new());
        let router = DeliveryRouter::new(groups.clone());
        let registry = Arc::new(FeedRegistry::new(config.feed.clone(), router));
        let hub = Arc::new(FeedHub::new(registry, groups.clone()));
        let server = Arc::new(WsServer::new(config.path.clone(), config.ws.clone(), hub.clone(), groups.clone()));

        let listener =
            TcpListener::bind(&config.listen_addr).await.with_context(|| format!("binding {}", config.listen_addr))?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self { hub, groups, server, local_addr, listener: Some(listener), shutdown_tx, task: None })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hub(&self) -> &Arc<FeedHub> {
        &self.hub
    }

    pub fn groups(&self) -> &Arc<GroupTransport> {
        &self.groups
    }

    /// Start accepting connections. A second call is a no-op.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            warn!("[service] start ignored, already started");
            return;
        };
        let server = self.server.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.task = Some(tokio::spawn(async move {
            if let Err(e) = server.serve(listener, shutdown_rx).await {
                warn!("[service] server exited with error: {e:#}");
            }
        }));
        info!("[service] started on {}", self.local_addr);
    }

    /// Stop accepting, close every connection and stop every generator.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.hub.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("[service] stopped");
    }
}
