//! Bedrock Gateway - WebSocket control plane for connected game worlds
//!
//! The game dials in over WebSocket; every connection becomes a
//! [`WorldSession`]. Sessions correlate commands with their responses, keep
//! the peer subscribed to the channels consumers care about, and infer player
//! presence by polling. Everything they observe is normalized into
//! [`ServerEvent`]s and fanned out through a single [`EventHub`].

mod correlator;
mod error;
mod gateway;
mod hub;
mod roster;
mod session;
mod subscription;
mod world;

pub use correlator::{CommandCorrelator, Completion, PendingCommand};
pub use error::{GatewayError, SessionFault};
pub use gateway::{Gateway, GatewayConfig};
pub use hub::{EventHandler, EventHub, EventKind, ServerEvent};
pub use roster::{PlayerRoster, RosterDiff, EXTERNAL_SENDER};
pub use session::{SessionConfig, WorldSession};
pub use subscription::SubscriptionSet;
pub use world::{Handshake, Player, World, WorldCommands, UNIDENTIFIED_HOST};

pub use bedrock_protocol::CommandResponse;
