//! Gateway main structure
//!
//! The WebSocket listener that accepts game connections and runs one
//! [`WorldSession`] per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, SessionFault};
use crate::hub::{EventHub, ServerEvent};
use crate::session::{SessionConfig, WorldSession};
use crate::world::Handshake;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (e.g., "0.0.0.0:19132")
    pub bind: String,
    /// Header carrying the tunnel session token
    pub session_header: String,
    /// Header carrying the public domain; `host` is used when absent
    pub domain_header: String,
    /// Delay between the listener coming up and the `open` event
    pub open_delay: Duration,
    pub session: SessionConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:19132".to_string(),
            session_header: "x-proxvc-session".to_string(),
            domain_header: "x-proxvc-domain".to_string(),
            open_delay: Duration::from_millis(10),
            session: SessionConfig::default(),
        }
    }
}

/// The main Gateway server
#[derive(Debug, Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    hub: EventHub,
}

impl Gateway {
    /// Create a new Gateway with its own hub
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_hub(config, EventHub::new())
    }

    /// Create a Gateway that publishes into an existing hub
    pub fn with_hub(config: GatewayConfig, hub: EventHub) -> Self {
        Self {
            config: Arc::new(config),
            hub,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Hub that receives every event from this gateway
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Bind the configured address and serve until the listener fails
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = self.config.bind.parse()?;
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let addr = listener.local_addr()?;
        info!("Gateway listening on ws://{}", addr);
        self.schedule_open();

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!("New connection from {}", peer_addr);

            let gateway = self.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.handle_connection(stream, peer_addr).await {
                    error!("Connection error for {}: {}", peer_addr, e);
                }
            });
        }
    }

    fn schedule_open(&self) {
        let hub = self.hub.clone();
        let delay = self.config.open_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            hub.emit(&ServerEvent::Open);
        });
    }

    /// Handle a WebSocket connection
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), GatewayError> {
        let captured = Arc::new(Mutex::new(Handshake::default()));
        let callback = {
            let captured = Arc::clone(&captured);
            let config = Arc::clone(&self.config);
            move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                *captured.lock() = Handshake::from_headers(
                    request.headers(),
                    &config.session_header,
                    &config.domain_header,
                    Some(addr),
                );
                Ok(response)
            }
        };

        let ws_stream = accept_hdr_async(stream, callback).await?;
        let (mut sender, mut receiver) = ws_stream.split();
        let handshake = captured.lock().clone();

        // Frames produced by the session for this connection
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let session = WorldSession::new(handshake, tx, self.hub.clone(), self.config.session.clone());
        let world = session.world().clone();
        info!(
            session = %session.id(),
            domain = world.domain().unwrap_or("-"),
            "World connected from {}", addr
        );

        self.hub.attach(Arc::clone(&session));
        session.start();
        self.hub.emit(&ServerEvent::WorldAdd {
            world: world.clone(),
        });

        loop {
            tokio::select! {
                Some(frame) = rx.recv() => {
                    if let Err(e) = sender.send(Message::Text(frame)).await {
                        let fault = SessionFault::Transport(e.to_string());
                        warn!(session = %session.id(), %fault, "Failed to send to {}", addr);
                        break;
                    }
                }

                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => session.handle_frame(&text),
                        Some(Ok(Message::Binary(data))) => session.handle_binary(&data),
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sender.send(Message::Pong(data)).await {
                                error!("Failed to send pong: {}", e);
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(session = %session.id(), "Connection {} closed", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            let fault = SessionFault::Transport(e.to_string());
                            warn!(session = %session.id(), %fault, "WebSocket error on {}", addr);
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }

        // Cleanup
        session.close();
        self.hub.detach(&session.id());
        self.hub.emit(&ServerEvent::WorldRemove { world });
        let _ = sender.close().await;
        info!(session = %session.id(), "World disconnected from {}", addr);

        Ok(())
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gateway({})", self.config.bind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind, "0.0.0.0:19132");
        assert_eq!(config.session_header, "x-proxvc-session");
        assert_eq!(config.domain_header, "x-proxvc-domain");
        assert_eq!(config.open_delay, Duration::from_millis(10));
        assert_eq!(config.session.command_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_run_rejects_bad_address() {
        let gateway = Gateway::new(GatewayConfig {
            bind: "not an address".to_string(),
            ..GatewayConfig::default()
        });
        assert!(matches!(gateway.run().await, Err(GatewayError::AddrParse(_))));
    }
}
