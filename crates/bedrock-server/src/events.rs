use bedrock_gateway::{EventHub, EventKind, ServerEvent};
use tracing::info;

/// One-line summary of an event for the log
pub fn describe(event: &ServerEvent) -> String {
    match event {
        ServerEvent::Open => "bridge is accepting worlds".to_string(),
        ServerEvent::WorldAdd { world } => format!(
            "{} connected (session {}, domain {})",
            world,
            world.session_token().unwrap_or("-"),
            world.domain().unwrap_or("-")
        ),
        ServerEvent::WorldRemove { world } => format!("{} disconnected", world),
        ServerEvent::Join { player, world } => format!("{} joined {}", player.name(), world),
        ServerEvent::Leave { player, world } => format!("{} left {}", player.name(), world),
        ServerEvent::Chat {
            sender,
            message,
            world,
        } => format!("<{}> {} [{}]", sender.name(), message, world),
        ServerEvent::CommandExecuted { body, world }
        | ServerEvent::PlayerTransform { body, world }
        | ServerEvent::PlayerTravelled { body, world } => format!("{} {}", world, body),
    }
}

/// Kinds logged by default
///
/// Registering a game-sourced kind subscribes every world to it, so the
/// per-movement channels are left to callers that want them.
const LOGGED: [EventKind; 7] = [
    EventKind::Open,
    EventKind::WorldAdd,
    EventKind::WorldRemove,
    EventKind::Join,
    EventKind::Leave,
    EventKind::Chat,
    EventKind::CommandExecuted,
];

/// Log the public events at info level
pub fn register_logging(hub: &EventHub) {
    for kind in LOGGED {
        hub.on(kind, move |event| {
            info!(target: "bedrock_server::events", event = %kind, "{}", describe(event));
        });
    }
}
