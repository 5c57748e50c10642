//! Event hub
//!
//! Single fan-out point for everything the gateway observes. Handlers are
//! registered per event kind and invoked synchronously in registration
//! order; a broadcast channel mirrors every event for consumers that prefer
//! to pull. The hub also tracks active sessions so that registering a
//! handler for a game-sourced event subscribes every connected world.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bedrock_protocol::RawChannel;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

use crate::session::WorldSession;
use crate::subscription::SubscriptionSet;
use crate::world::{Player, World};

/// Public event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    WorldAdd,
    WorldRemove,
    Join,
    Leave,
    Chat,
    CommandExecuted,
    PlayerTransform,
    PlayerTravelled,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Open,
        EventKind::WorldAdd,
        EventKind::WorldRemove,
        EventKind::Join,
        EventKind::Leave,
        EventKind::Chat,
        EventKind::CommandExecuted,
        EventKind::PlayerTransform,
        EventKind::PlayerTravelled,
    ];

    pub fn public_name(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::WorldAdd => "connect",
            EventKind::WorldRemove => "disconnect",
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Chat => "chat",
            EventKind::CommandExecuted => "command_executed",
            EventKind::PlayerTransform => "player_transform",
            EventKind::PlayerTravelled => "player_travelled",
        }
    }

    pub fn from_public_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.public_name() == name)
    }

    /// Game channel backing this event, if it comes from the peer
    pub fn raw_channel(&self) -> Option<RawChannel> {
        match self {
            EventKind::Chat => Some(RawChannel::PlayerMessage),
            EventKind::CommandExecuted => Some(RawChannel::SlashCommandExecuted),
            EventKind::PlayerTransform => Some(RawChannel::PlayerTransform),
            EventKind::PlayerTravelled => Some(RawChannel::PlayerTravelled),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.public_name())
    }
}

/// Normalized events delivered to consumers
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Listener is up
    Open,
    WorldAdd { world: World },
    WorldRemove { world: World },
    Join { player: Player, world: World },
    Leave { player: Player, world: World },
    Chat {
        sender: Player,
        message: String,
        world: World,
    },
    /// Raw game payloads, passed through untouched
    CommandExecuted { body: Value, world: World },
    PlayerTransform { body: Value, world: World },
    PlayerTravelled { body: Value, world: World },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Open => EventKind::Open,
            ServerEvent::WorldAdd { .. } => EventKind::WorldAdd,
            ServerEvent::WorldRemove { .. } => EventKind::WorldRemove,
            ServerEvent::Join { .. } => EventKind::Join,
            ServerEvent::Leave { .. } => EventKind::Leave,
            ServerEvent::Chat { .. } => EventKind::Chat,
            ServerEvent::CommandExecuted { .. } => EventKind::CommandExecuted,
            ServerEvent::PlayerTransform { .. } => EventKind::PlayerTransform,
            ServerEvent::PlayerTravelled { .. } => EventKind::PlayerTravelled,
        }
    }

    /// World the event belongs to; `None` only for `Open`
    pub fn world(&self) -> Option<&World> {
        match self {
            ServerEvent::Open => None,
            ServerEvent::WorldAdd { world }
            | ServerEvent::WorldRemove { world }
            | ServerEvent::Join { world, .. }
            | ServerEvent::Leave { world, .. }
            | ServerEvent::Chat { world, .. }
            | ServerEvent::CommandExecuted { world, .. }
            | ServerEvent::PlayerTransform { world, .. }
            | ServerEvent::PlayerTravelled { world, .. } => Some(world),
        }
    }
}

/// Consumer callback
pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

struct HubInner {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
    required: RwLock<SubscriptionSet>,
    sessions: DashMap<Uuid, Arc<WorldSession>>,
    sender: broadcast::Sender<ServerEvent>,
}

/// Cloneable handle to the shared hub
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("sessions", &self.inner.sessions.len())
            .field("required", &*self.inner.required.read())
            .field("handlers", &"<callbacks>")
            .finish()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create a hub whose broadcast mirror buffers `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(HubInner {
                handlers: RwLock::new(HashMap::new()),
                required: RwLock::new(SubscriptionSet::seeded()),
                sessions: DashMap::new(),
                sender,
            }),
        }
    }

    /// Register a handler
    ///
    /// For game-sourced kinds the backing channel becomes required: every
    /// active session is asked to subscribe now and future sessions
    /// subscribe on start.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));

        if let Some(channel) = kind.raw_channel() {
            self.require(channel);
        }
    }

    fn require(&self, channel: RawChannel) {
        self.inner.required.write().insert(channel.as_str());

        let sessions: Vec<Arc<WorldSession>> = self
            .inner
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for session in sessions {
            session.spawn_subscribe(channel.as_str());
        }
    }

    /// Deliver an event to every handler of its kind
    ///
    /// A panicking handler is logged and skipped; the others still run.
    pub fn emit(&self, event: &ServerEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .inner
            .handlers
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Handler for {} panicked", kind);
            }
        }

        let _ = self.inner.sender.send(event.clone());
    }

    /// Receive a copy of every emitted event
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.sender.subscribe()
    }

    /// Channels every session must subscribe to
    pub fn required_channels(&self) -> Vec<String> {
        self.inner.required.read().channels().to_vec()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub(crate) fn attach(&self, session: Arc<WorldSession>) {
        debug!("Attaching session {}", session.id());
        self.inner.sessions.insert(session.id(), session);
    }

    pub(crate) fn detach(&self, id: &Uuid) -> Option<Arc<WorldSession>> {
        self.inner.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn session(&self, id: &Uuid) -> Option<Arc<WorldSession>> {
        self.inner
            .sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn sessions(&self) -> Vec<Arc<WorldSession>> {
        self.inner
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Worlds of every active session
    pub fn worlds(&self) -> Vec<World> {
        self.inner
            .sessions
            .iter()
            .map(|entry| entry.value().world().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::world::Handshake;
    use bedrock_protocol::{Envelope, MessagePurpose};
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn attached_session(hub: &EventHub) -> (Arc<WorldSession>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = SessionConfig {
            roster_poll_interval: Duration::from_secs(3600),
            ..SessionConfig::default()
        };
        let session = WorldSession::new(Handshake::default(), tx, hub.clone(), config);
        hub.attach(Arc::clone(&session));
        (session, rx)
    }

    fn subscribed_channels(frames: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut channels = Vec::new();
        while let Ok(text) = frames.try_recv() {
            let envelope = Envelope::decode(&text).unwrap();
            if envelope.header.message_purpose == MessagePurpose::Subscribe {
                channels.push(envelope.body["eventName"].as_str().unwrap().to_string());
            }
        }
        channels
    }

    #[test]
    fn test_public_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_public_name(kind.public_name()), Some(kind));
        }
        assert_eq!(EventKind::WorldAdd.public_name(), "connect");
        assert_eq!(EventKind::from_public_name("close"), None);
        assert_eq!(EventKind::Chat.raw_channel(), Some(RawChannel::PlayerMessage));
        assert_eq!(EventKind::Join.raw_channel(), None);
    }

    #[test]
    fn test_emit_with_no_handlers() {
        let hub = EventHub::new();
        hub.emit(&ServerEvent::Open);
        assert_eq!(hub.handler_count(EventKind::Open), 0);
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let hub = EventHub::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second"] {
            let calls = Arc::clone(&calls);
            hub.on(EventKind::Open, move |_| calls.lock().push(label));
        }

        hub.emit(&ServerEvent::Open);
        assert_eq!(*calls.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let hub = EventHub::new();
        let calls = Arc::new(Mutex::new(0));

        hub.on(EventKind::Open, |_| panic!("handler failure"));
        let counter = Arc::clone(&calls);
        hub.on(EventKind::Open, move |_| *counter.lock() += 1);

        hub.emit(&ServerEvent::Open);
        hub.emit(&ServerEvent::Open);
        assert_eq!(*calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_mirror() {
        let hub = EventHub::new();
        let mut events = hub.subscribe();
        hub.emit(&ServerEvent::Open);
        assert_eq!(events.recv().await.unwrap().kind(), EventKind::Open);
    }

    #[tokio::test]
    async fn test_registering_chat_subscribes_active_sessions() {
        let hub = EventHub::new();
        let (_first, mut first_frames) = attached_session(&hub);
        let (_second, mut second_frames) = attached_session(&hub);

        hub.on(EventKind::Chat, |_| {});

        assert_eq!(subscribed_channels(&mut first_frames), vec!["PlayerMessage"]);
        assert_eq!(subscribed_channels(&mut second_frames), vec!["PlayerMessage"]);
    }

    #[tokio::test]
    async fn test_future_sessions_use_required_channels() {
        let hub = EventHub::new();
        hub.on(EventKind::PlayerTravelled, |_| {});
        hub.on(EventKind::Join, |_| {});
        assert_eq!(hub.required_channels(), vec!["PlayerMessage", "PlayerTravelled"]);

        let (session, mut frames) = attached_session(&hub);
        session.start();

        assert_eq!(
            subscribed_channels(&mut frames),
            vec!["PlayerMessage", "PlayerTravelled"]
        );
        assert_eq!(session.subscriptions(), vec!["PlayerMessage", "PlayerTravelled"]);
        session.close();
    }

    #[tokio::test]
    async fn test_detach_removes_session() {
        let hub = EventHub::new();
        let (session, _frames) = attached_session(&hub);
        assert_eq!(hub.worlds(), vec![session.world().clone()]);
        assert!(hub.session(&session.id()).is_some());

        assert!(hub.detach(&session.id()).is_some());
        assert!(hub.detach(&session.id()).is_none());
        assert_eq!(hub.session_count(), 0);
    }
}
