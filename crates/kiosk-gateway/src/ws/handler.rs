//! WebSocket handler for the balance push channel.
//!
//! Client frames:
//! - `{"event":"register","rfid":"RFID123"}` announces the RFID to follow
//! - `{"event":"unregister"}` stops following without closing
//! - `{"event":"ping"}` answered with `{"event":"pong"}`
//!
//! Security features:
//! - Message size limits
//! - Rate limiting per connection
//! - Idle timeout

use crate::domain::config::WebSocketConfig;
use crate::domain::Rfid;
use crate::middleware::metrics::GatewayMetrics;
use crate::ws::registry::{ConnectionHandle, ConnectionRegistry, PushEvent};
use crate::ws::session::{Announcement, PushSession};
use axum::extract::ws::{Message, WebSocket};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, warn};

/// Frames a kiosk display may send
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientFrame {
    Register { rfid: String },
    Unregister,
    Ping,
}

/// WebSocket connection handler
pub struct WebSocketHandler {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<GatewayMetrics>,
    config: WebSocketConfig,
    /// Message counter for rate limiting
    message_count: u32,
    /// Rate limit window start
    rate_limit_window: Instant,
}

impl WebSocketHandler {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<GatewayMetrics>,
        config: WebSocketConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            config,
            message_count: 0,
            rate_limit_window: Instant::now(),
        }
    }

    /// Check rate limit, returns true if request is allowed
    fn check_rate_limit(&mut self) -> bool {
        let now = Instant::now();

        // Reset window every second
        if now.duration_since(self.rate_limit_window) >= Duration::from_secs(1) {
            self.rate_limit_window = now;
            self.message_count = 0;
        }

        self.message_count += 1;
        self.message_count <= self.config.rate_limit
    }

    /// Size and rate checks, then dispatch. Returns the reply frame.
    fn on_text(&mut self, session: &mut PushSession, text: &str) -> String {
        if text.len() > self.config.max_message_size {
            warn!(
                connection_id = %session.connection_id(),
                size = text.len(),
                max = self.config.max_message_size,
                "Message exceeds size limit"
            );
            return error_frame(&format!(
                "Message too large: {} bytes (max: {})",
                text.len(),
                self.config.max_message_size
            ));
        }

        if !self.check_rate_limit() {
            return error_frame("Rate limit exceeded");
        }

        handle_frame(session, text).to_frame()
    }

    /// Drive one connection until the client leaves, it idles out, or the
    /// gateway shuts down. Registry membership is removed on every exit path.
    pub async fn handle(mut self, mut socket: WebSocket, mut shutdown: watch::Receiver<bool>) {
        let (handle, mut outbound) = ConnectionHandle::channel(self.config.outbound_buffer);
        let mut session = PushSession::new(self.registry.clone(), self.metrics.clone(), handle);
        let connection_id = session.connection_id();

        info!(connection_id = %connection_id, "New WebSocket connection");

        let mut ping = interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        let idle = sleep(self.config.idle_timeout);
        tokio::pin!(idle);

        if *shutdown.borrow() {
            session.close();
            return;
        }

        loop {
            tokio::select! {
                inbound = socket.recv() => {
                    let Some(inbound) = inbound else { break };
                    idle.as_mut().reset(Instant::now() + self.config.idle_timeout);

                    let reply = match inbound {
                        Ok(Message::Text(text)) => Some(self.on_text(&mut session, &text)),
                        Ok(Message::Binary(data)) => match String::from_utf8(data) {
                            Ok(text) => Some(self.on_text(&mut session, &text)),
                            Err(_) => Some(error_frame("Binary frames must be UTF-8 JSON")),
                        },
                        Ok(Message::Ping(data)) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                            None
                        }
                        Ok(Message::Pong(_)) => None,
                        Ok(Message::Close(_)) => {
                            debug!(connection_id = %connection_id, "WebSocket close received");
                            break;
                        }
                        Err(e) => {
                            warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                            break;
                        }
                    };

                    if let Some(reply) = reply {
                        if let Err(e) = socket.send(Message::Text(reply)).await {
                            error!(error = %e, "Failed to send WebSocket response");
                            break;
                        }
                    }
                }
                Some(event) = outbound.recv() => {
                    if let Err(e) = socket.send(Message::Text(event.to_frame())).await {
                        warn!(connection_id = %connection_id, error = %e, "Failed to push event");
                        break;
                    }
                }
                _ = ping.tick() => {
                    if let Err(e) = socket.send(Message::Ping(Vec::new())).await {
                        debug!(connection_id = %connection_id, error = %e, "Ping failed");
                        break;
                    }
                }
                _ = &mut idle => {
                    info!(connection_id = %connection_id, "Closing idle WebSocket connection");
                    break;
                }
                _ = shutdown.changed() => {
                    debug!(
                        connection_id = %connection_id,
                        "Gateway shutting down, closing connection"
                    );
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        session.close();

        info!(connection_id = %connection_id, "WebSocket connection closed");
    }
}

/// Apply one client frame to the session and build the reply
pub fn handle_frame(session: &mut PushSession, text: &str) -> PushEvent {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection_id = %session.connection_id(), error = %e, "Unparseable frame");
            return error_event(&format!("Invalid frame: {}", e));
        }
    };

    match frame {
        ClientFrame::Register { rfid } => {
            let Some(rfid) = Rfid::parse(&rfid) else {
                return error_event("Invalid rfid");
            };
            match session.announce(rfid.clone()) {
                Announcement::Rejected => error_event("Connection is closed"),
                _ => PushEvent::new("registered", serde_json::json!({ "rfid": rfid.as_str() })),
            }
        }
        ClientFrame::Unregister => {
            session.leave();
            PushEvent::new("unregistered", serde_json::Value::Null)
        }
        ClientFrame::Ping => PushEvent::new("pong", serde_json::Value::Null),
    }
}

fn error_event(message: &str) -> PushEvent {
    PushEvent::new("error", serde_json::json!({ "message": message }))
}

fn error_frame(message: &str) -> String {
    error_event(message).to_frame()
}
