//! World session
//!
//! One session per WebSocket connection. The session owns the protocol state
//! for its world (pending commands, subscriptions, roster) and turns inbound
//! frames into hub events. Outbound frames go through an unbounded channel
//! drained by the connection task, which keeps the session itself free of
//! socket types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bedrock_protocol::{
    is_raw_display, rawtext_command, CommandResponse, Envelope, MessagePurpose, RawChannel,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::correlator::{CommandCorrelator, PendingCommand};
use crate::error::SessionFault;
use crate::hub::{EventHub, ServerEvent};
use crate::roster::PlayerRoster;
use crate::subscription::SubscriptionSet;
use crate::world::{Handshake, Player, World, WorldCommands};

const LIST_COMMAND: &str = "list";
const HOST_NAME_COMMAND: &str = "getlocalplayername";
const HOST_FALLBACK_COMMAND: &str = "testfor @s";

/// Per-session timing and naming
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name given to every world
    pub world_name: String,
    /// How long a command waits for its response
    pub command_timeout: Duration,
    /// How long a subscribe request waits for its acknowledgment
    pub subscribe_timeout: Duration,
    /// Interval between `list` polls
    pub roster_poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            world_name: "Bedrock World".to_string(),
            command_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(2),
            roster_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Protocol state for one connected world
pub struct WorldSession {
    id: Uuid,
    this: Weak<WorldSession>,
    world: World,
    config: SessionConfig,
    hub: EventHub,
    outbound: mpsc::UnboundedSender<String>,
    open: AtomicBool,
    correlator: CommandCorrelator,
    subscriptions: Mutex<SubscriptionSet>,
    roster: Mutex<PlayerRoster>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorldSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldSession")
            .field("id", &self.id)
            .field("world", &self.world)
            .field("open", &self.is_open())
            .field("pending_commands", &self.correlator.len())
            .finish()
    }
}

impl WorldSession {
    /// Create a session whose outbound frames are written to `outbound`
    pub fn new(
        handshake: Handshake,
        outbound: mpsc::UnboundedSender<String>,
        hub: EventHub,
        config: SessionConfig,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        Arc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            world: World::new(id, config.world_name.clone(), handshake, this.clone()),
            config,
            hub,
            outbound,
            open: AtomicBool::new(true),
            correlator: CommandCorrelator::new(),
            subscriptions: Mutex::new(SubscriptionSet::seeded()),
            roster: Mutex::new(PlayerRoster::new()),
            poller: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether frames can still be sent
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Bring the session up: replay subscriptions, identify the host and
    /// start roster polling
    pub fn start(&self) {
        let mut channels = self.subscriptions.lock().channels().to_vec();
        for channel in self.hub.required_channels() {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        for channel in &channels {
            self.spawn_subscribe(channel);
        }

        if let Some(session) = self.this.upgrade() {
            tokio::spawn(async move { session.identify_host().await });
        }
        self.start_polling();
    }

    /// Tear the session down; returns false if it was already closed
    pub fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }

        if let Some(poller) = self.poller.lock().take() {
            poller.abort();
        }
        self.roster.lock().clear();

        let failed = self.correlator.fail_all();
        if failed > 0 {
            debug!(session = %self.id, "Failed {} pending commands on close", failed);
        }
        true
    }

    /// Subscribe the peer to a raw channel and wait for the acknowledgment
    ///
    /// The frame is sent even when the channel is already recorded.
    pub async fn subscribe(&self, channel: &str) -> CommandResponse {
        match self.request_subscription(channel) {
            Some(pending) => self.await_subscription(channel, pending).await,
            None => CommandResponse::not_connected(),
        }
    }

    /// Send a subscribe frame now and wait for its acknowledgment in the
    /// background
    pub(crate) fn spawn_subscribe(&self, channel: &str) {
        let Some(session) = self.this.upgrade() else {
            return;
        };
        let Some(pending) = self.request_subscription(channel) else {
            return;
        };

        let channel = channel.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    session.await_subscription(&channel, pending).await;
                });
            }
            // Dropping `pending` releases its entry.
            Err(_) => debug!(
                session = %self.id,
                "No runtime to await acknowledgment for {}", channel
            ),
        }
    }

    fn request_subscription(&self, channel: &str) -> Option<PendingCommand> {
        if !self.is_open() {
            return None;
        }
        if !self.subscriptions.lock().insert(channel) {
            trace!(session = %self.id, "Re-sending subscription for {}", channel);
        }

        let request_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.subscribe_timeout;
        let pending = self.correlator.register(&request_id, deadline)?;

        if let Err(fault) = self.send(&Envelope::subscribe(request_id.as_str(), channel)) {
            warn!(session = %self.id, %fault, "Failed to send subscription for {}", channel);
            self.correlator
                .resolve(&request_id, CommandResponse::not_connected());
        }
        Some(pending)
    }

    async fn await_subscription(&self, channel: &str, pending: PendingCommand) -> CommandResponse {
        let response = self.correlator.wait(pending).await.into_response();
        if response.is_success() {
            debug!(session = %self.id, "Subscribed to {}", channel);
        } else {
            let fault = SessionFault::Subscription {
                channel: channel.to_string(),
                status_code: response.status_code,
                status_message: response.status_message.clone().unwrap_or_default(),
            };
            warn!(session = %self.id, %fault, "Subscription not acknowledged");
        }
        response
    }

    fn send(&self, envelope: &Envelope) -> Result<(), SessionFault> {
        let frame = envelope.encode()?;
        self.outbound.send(frame).map_err(|_| {
            self.open.store(false, Ordering::Release);
            SessionFault::Transport("outbound channel closed".to_string())
        })
    }

    /// Dispatch one inbound text frame
    pub fn handle_frame(&self, frame: &str) {
        match Envelope::decode(frame) {
            Ok(envelope) => self.dispatch(envelope),
            Err(err) => {
                let fault = SessionFault::from(err);
                warn!(session = %self.id, %fault, "Dropping inbound frame");
            }
        }
    }

    /// Dispatch one inbound binary frame carrying UTF-8 JSON
    pub fn handle_binary(&self, frame: &[u8]) {
        match Envelope::decode_bytes(frame) {
            Ok(envelope) => self.dispatch(envelope),
            Err(err) => {
                let fault = SessionFault::from(err);
                warn!(session = %self.id, %fault, "Dropping inbound frame");
            }
        }
    }

    fn dispatch(&self, envelope: Envelope) {
        match envelope.header.message_purpose {
            MessagePurpose::CommandResponse | MessagePurpose::Error => {
                self.handle_response(envelope)
            }
            MessagePurpose::Event => self.handle_event(envelope),
            purpose => trace!(session = %self.id, "Ignoring {:?} frame", purpose),
        }
    }

    fn handle_response(&self, envelope: Envelope) {
        let request_id = match envelope.request_id() {
            Ok(id) => id.to_string(),
            Err(err) => {
                let fault = SessionFault::from(err);
                warn!(session = %self.id, %fault, "Dropping response");
                return;
            }
        };

        let response = CommandResponse::from_body(envelope.body);
        if !self.correlator.resolve(&request_id, response) {
            let fault = SessionFault::UnmatchedResponse { request_id };
            trace!(session = %self.id, %fault);
        }
    }

    fn handle_event(&self, envelope: Envelope) {
        let channel = match envelope.event_name() {
            Ok(name) => match RawChannel::from_name(name) {
                Some(channel) => channel,
                None => {
                    trace!(session = %self.id, "Ignoring unrecognized event {}", name);
                    return;
                }
            },
            Err(err) => {
                let fault = SessionFault::from(err);
                warn!(session = %self.id, %fault, "Dropping event");
                return;
            }
        };

        let body = envelope.body;
        let world = self.world.clone();
        let event = match channel {
            RawChannel::PlayerMessage => match self.chat_event(&body) {
                Some(event) => event,
                None => return,
            },
            RawChannel::SlashCommandExecuted => ServerEvent::CommandExecuted { body, world },
            RawChannel::PlayerTransform => ServerEvent::PlayerTransform { body, world },
            RawChannel::PlayerTravelled => ServerEvent::PlayerTravelled { body, world },
        };
        self.hub.emit(&event);
    }

    fn chat_event(&self, body: &Value) -> Option<ServerEvent> {
        let sender = body.get("sender").and_then(Value::as_str).filter(|s| !s.is_empty())?;
        let message = body.get("message").and_then(Value::as_str).filter(|m| !m.is_empty())?;

        let player = self
            .roster
            .lock()
            .resolve_or_insert(sender, |name| Player::new(name, self.this.clone()));

        Some(ServerEvent::Chat {
            sender: player,
            message: message.to_string(),
            world: self.world.clone(),
        })
    }

    fn start_polling(&self) {
        let weak = self.this.clone();
        let period = self.config.roster_poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            // Polls run inline, so a slow `list` delays the next tick instead
            // of overlapping it.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(session) = weak.upgrade() else {
                    break;
                };
                if session.is_open() {
                    session.poll_roster().await;
                }
            }
        });

        if let Some(previous) = self.poller.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Run one roster poll; a failed `list` leaves the roster untouched
    pub async fn poll_roster(&self) {
        let response = self.run_command(LIST_COMMAND).await;
        if !response.is_success() {
            debug!(
                session = %self.id,
                "Roster poll failed ({}): {}",
                response.status_code,
                response.status_message.as_deref().unwrap_or("")
            );
            return;
        }
        self.apply_roster(&response.player_names());
    }

    pub(crate) fn apply_roster(&self, names: &[String]) {
        if !self.is_open() {
            return;
        }

        let diff = self
            .roster
            .lock()
            .apply_snapshot(names, |name| Player::new(name, self.this.clone()));

        for player in diff.left {
            info!(session = %self.id, "{} left {}", player.name(), self.world);
            self.hub.emit(&ServerEvent::Leave {
                player,
                world: self.world.clone(),
            });
        }
        for player in diff.joined {
            info!(session = %self.id, "{} joined {}", player.name(), self.world);
            self.hub.emit(&ServerEvent::Join {
                player,
                world: self.world.clone(),
            });
        }
    }

    async fn identify_host(&self) {
        let primary = self.run_command(HOST_NAME_COMMAND).await;
        let name = match primary.str_field("localplayername").filter(|n| !n.is_empty()) {
            Some(name) => Some(name.to_string()),
            None => {
                let fallback = self.run_command(HOST_FALLBACK_COMMAND).await;
                fallback
                    .field("victim")
                    .and_then(Value::as_array)
                    .and_then(|victims| victims.first())
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
            }
        };

        match name {
            Some(name) => {
                info!(session = %self.id, "Host of {} is {}", self.world, name);
                self.world.set_local_player_name(name);
            }
            None => debug!(session = %self.id, "Could not identify host"),
        }
    }

    /// Players currently known to this world
    pub fn players(&self) -> Vec<Player> {
        self.roster.lock().players()
    }

    pub fn player(&self, name: &str) -> Option<Player> {
        self.roster.lock().get(name).cloned()
    }

    /// Channels requested from the peer so far
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().channels().to_vec()
    }

    pub fn pending_commands(&self) -> usize {
        self.correlator.len()
    }
}

#[async_trait]
impl WorldCommands for WorldSession {
    async fn run_command(&self, command: &str) -> CommandResponse {
        if !self.is_open() {
            return CommandResponse::not_connected();
        }

        let request_id = Uuid::new_v4().to_string();
        let envelope = Envelope::command_request(request_id.as_str(), command);

        // The game never answers raw-text display commands.
        if is_raw_display(command) {
            return match self.send(&envelope) {
                Ok(()) => CommandResponse::ok(),
                Err(fault) => {
                    debug!(session = %self.id, %fault, "Dropped display command");
                    CommandResponse::not_connected()
                }
            };
        }

        let deadline = Instant::now() + self.config.command_timeout;
        let Some(pending) = self.correlator.register(&request_id, deadline) else {
            return CommandResponse::not_connected();
        };
        if let Err(fault) = self.send(&envelope) {
            debug!(session = %self.id, %fault, "Command not sent");
            self.correlator
                .resolve(&request_id, CommandResponse::not_connected());
        }

        let completion = self.correlator.wait(pending).await;
        if completion.is_expired() {
            let fault = SessionFault::CommandTimeout {
                command: command.to_string(),
            };
            warn!(session = %self.id, %fault);
        }
        completion.into_response()
    }

    async fn broadcast(&self, text: &str) -> CommandResponse {
        self.run_command(&rawtext_command("@a", text)).await
    }

    async fn list_players(&self) -> Vec<String> {
        let response = self.run_command(LIST_COMMAND).await;
        if response.is_success() {
            response.player_names()
        } else {
            Vec::new()
        }
    }
}
