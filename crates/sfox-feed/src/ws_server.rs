//! WebSocket front end.
//!
//! Accepts connections on a single path, assigns each a fresh
//! [`ConnectionId`], and runs one task per connection that:
//! 1. Parses client frames and calls [`FeedHub::subscribe`] / [`FeedHub::unsubscribe`].
//! 2. Writes queued outbound frames (acks, errors, market data).
//! 3. Pings every keep-alive interval and drops clients silent for longer
//!    than the client timeout.
//! 4. Calls [`FeedHub::on_disconnect`] exactly once when the socket ends,
//!    then [`FeedHub::forget`] once the connection can issue no more calls.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sfox_core::config::WsConfig;
use sfox_core::{ClientError, ConnectionId, INVALID_REQUEST};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::groups::GroupTransport;
use crate::hub::FeedHub;
use crate::protocol::{ClientRequest, ServerFrame, parse_client_request};

/// Why a connection task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    ReadError,
    WriteError,
    TimedOut,
    Shutdown,
}

/// Serves the feed hub over WebSocket.
pub struct WsServer {
    path: String,
    config: WsConfig,
    hub: Arc<FeedHub>,
    groups: Arc<GroupTransport>,
}

impl WsServer {
    /// `groups` must be the same transport the hub's registry delivers through.
    pub fn new(path: impl Into<String>, config: WsConfig, hub: Arc<FeedHub>, groups: Arc<GroupTransport>) -> Self {
        Self { path: path.into(), config, hub, groups }
    }

    /// Accept connections until `shutdown_rx` flips.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("[ws-server] listening on ws://{}{}", listener.local_addr()?, self.path);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("[ws-server] shutdown signal received, no longer accepting");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        let shutdown_rx = shutdown_rx.clone();
                        tokio::spawn(async move { server.handle_connection(stream, peer, shutdown_rx).await });
                    }
                    Err(e) => warn!("[ws-server] accept failed: {e}"),
                },
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, shutdown_rx: watch::Receiver<bool>) {
        let path = self.path.clone();
        let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            if req.uri().path() == path {
                return Ok(resp);
            }
            let mut err = ErrorResponse::new(Some(format!("no endpoint at {}", req.uri().path())));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        };

        let ws = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("[ws-server] handshake with {peer} failed: {e}");
                return;
            }
        };

        let connection = ConnectionId::new(Uuid::new_v4().to_string());
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_buffer);
        self.groups.register(connection.clone(), outbound_tx);
        self.hub.on_connect(&connection);
        info!("[ws-{connection}] accepted from {peer}");

        let reason = self.connection_loop(&connection, ws, outbound_rx, shutdown_rx).await;

        self.hub.on_disconnect(&connection);
        self.groups.unregister(&connection);
        self.hub.forget(&connection);
        info!("[ws-{connection}] closed ({reason:?})");
    }

    async fn connection_loop(
        &self,
        connection: &ConnectionId,
        ws: WebSocketStream<TcpStream>,
        mut outbound_rx: mpsc::Receiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> CloseReason {
        let (mut ws_write, mut ws_read) = ws.split();
        let keep_alive = self.config.keep_alive();
        let client_timeout = self.config.client_timeout();
        let mut ping_tick = interval_at(Instant::now() + keep_alive, keep_alive);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = ws_write.close().await;
                    return CloseReason::Shutdown;
                }

                msg = ws_read.next() => {
                    last_seen = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(connection, &text),
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_write.send(Message::Pong(data)).await {
                                error!("[ws-{connection}] pong send error: {e}");
                                return CloseReason::WriteError;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return CloseReason::ClientClosed,
                        Some(Err(e)) => {
                            warn!("[ws-{connection}] read error: {e}");
                            return CloseReason::ReadError;
                        }
                        Some(Ok(_)) => {} // Binary, Pong, Frame
                    }
                }

                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::text(text)).await {
                        error!("[ws-{connection}] send error: {e}");
                        return CloseReason::WriteError;
                    }
                }

                _ = ping_tick.tick() => {
                    if last_seen.elapsed() >= client_timeout {
                        warn!("[ws-{connection}] silent for {:?}, closing", last_seen.elapsed());
                        let _ = ws_write.close().await;
                        return CloseReason::TimedOut;
                    }
                    if let Err(e) = ws_write.send(Message::Ping(vec![].into())).await {
                        error!("[ws-{connection}] ping send error: {e}");
                        return CloseReason::WriteError;
                    }
                }
            }
        }
    }

    fn handle_text(&self, connection: &ConnectionId, text: &str) {
        let sent = match parse_client_request(text) {
            Ok(ClientRequest::Subscribe { feed_key }) => match self.hub.subscribe(connection, &feed_key) {
                Ok(_) => self.groups.send_to(connection, &ServerFrame::Subscribed { feed_key: &feed_key }),
                Err(err) => self.groups.send_to(connection, &ServerFrame::Error(&err)),
            },
            Ok(ClientRequest::Unsubscribe { feed_key }) => {
                self.hub.unsubscribe(connection, &feed_key);
                self.groups.send_to(connection, &ServerFrame::Unsubscribed { feed_key: &feed_key })
            }
            Err(e) => {
                debug!("[ws-{connection}] {e}");
                let err = ClientError::error(INVALID_REQUEST, e.to_string());
                self.groups.send_to(connection, &ServerFrame::Error(&err))
            }
        };
        if let Err(e) = sent {
            warn!("[ws-{connection}] reply not queued: {e}");
        }
    }
}
