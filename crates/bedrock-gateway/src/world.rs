//! Consumer-facing values: worlds and players
//!
//! Both are cheap to clone and only hold weak references to the owning
//! [`WorldSession`], so an event payload never keeps a closed session alive.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bedrock_protocol::{rawtext_command, CommandResponse};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use uuid::Uuid;

use crate::roster::EXTERNAL_SENDER;
use crate::session::WorldSession;

/// Local player name until host identification succeeds
pub const UNIDENTIFIED_HOST: &str = "Unidentified Host";

/// What a consumer can ask of a connected world
#[async_trait]
pub trait WorldCommands: Send + Sync {
    /// Run a command and wait for its result
    async fn run_command(&self, command: &str) -> CommandResponse;

    /// Show a message to every player
    async fn broadcast(&self, text: &str) -> CommandResponse;

    /// Names of the players currently online; empty on failure
    async fn list_players(&self) -> Vec<String>;
}

/// Metadata captured from the WebSocket upgrade request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Session correlation token injected by the tunnel
    pub session_token: Option<String>,
    /// Public domain the client dialed
    pub domain: Option<String>,
    pub peer_addr: Option<SocketAddr>,
}

impl Handshake {
    /// Read the session and domain headers; the domain falls back to `host`
    pub fn from_headers(
        headers: &HeaderMap,
        session_header: &str,
        domain_header: &str,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Self {
            session_token: read(session_header),
            domain: read(domain_header).or_else(|| read("host")),
            peer_addr,
        }
    }
}

/// One connected game world
#[derive(Clone)]
pub struct World {
    id: Uuid,
    name: String,
    local_player: Arc<RwLock<String>>,
    handshake: Handshake,
    connected_at: DateTime<Utc>,
    session: Weak<WorldSession>,
}

impl World {
    pub(crate) fn new(
        id: Uuid,
        name: impl Into<String>,
        handshake: Handshake,
        session: Weak<WorldSession>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            local_player: Arc::new(RwLock::new(UNIDENTIFIED_HOST.to_string())),
            handshake,
            connected_at: Utc::now(),
            session,
        }
    }

    /// Id of the owning session
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the player hosting the world
    pub fn local_player_name(&self) -> String {
        self.local_player.read().clone()
    }

    pub(crate) fn set_local_player_name(&self, name: impl Into<String>) {
        *self.local_player.write() = name.into();
    }

    pub fn session_token(&self) -> Option<&str> {
        self.handshake.session_token.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.handshake.domain.as_deref()
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Whether the owning session is still alive and open
    pub fn is_attached(&self) -> bool {
        self.session
            .upgrade()
            .is_some_and(|session| session.is_open())
    }

    /// The owning session, if it still exists
    pub fn session(&self) -> Option<Arc<WorldSession>> {
        self.session.upgrade()
    }

    pub async fn run_command(&self, command: &str) -> CommandResponse {
        match self.session.upgrade() {
            Some(session) => session.run_command(command).await,
            None => CommandResponse::not_connected(),
        }
    }

    pub async fn broadcast(&self, text: &str) -> CommandResponse {
        match self.session.upgrade() {
            Some(session) => session.broadcast(text).await,
            None => CommandResponse::not_connected(),
        }
    }

    pub async fn list_players(&self) -> Vec<String> {
        match self.session.upgrade() {
            Some(session) => session.list_players().await,
            None => Vec::new(),
        }
    }
}

impl PartialEq for World {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for World {}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("local_player", &*self.local_player.read())
            .field("session_token", &self.handshake.session_token)
            .field("domain", &self.handshake.domain)
            .finish()
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// A participant seen in one world
#[derive(Clone)]
pub struct Player {
    name: String,
    session: Weak<WorldSession>,
}

impl Player {
    pub(crate) fn new(name: &str, session: Weak<WorldSession>) -> Self {
        Self {
            name: name.to_string(),
            session,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the placeholder for text injected from outside
    pub fn is_external(&self) -> bool {
        self.name == EXTERNAL_SENDER
    }

    /// World the player was seen in, while its session exists
    pub fn world(&self) -> Option<World> {
        self.session
            .upgrade()
            .map(|session| session.world().clone())
    }

    /// Show a message to this player only
    pub async fn send_message(&self, text: &str) -> CommandResponse {
        let Some(session) = self.session.upgrade() else {
            return CommandResponse::not_connected();
        };
        let target = format!("\"{}\"", self.name);
        session.run_command(&rawtext_command(&target, text)).await
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Weak::ptr_eq(&self.session, &other.session)
    }
}

impl Eq for Player {}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player").field("name", &self.name).finish()
    }
}
