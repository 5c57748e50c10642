//! Raw event channels emitted by the game

use std::fmt;

/// Protocol-level event category the gateway knows how to consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawChannel {
    /// Chat line from a player or an external sender
    PlayerMessage,
    /// A slash command ran in the world
    SlashCommandExecuted,
    /// Periodic player position/rotation update
    PlayerTransform,
    /// Player moved between locations
    PlayerTravelled,
}

impl RawChannel {
    /// Every channel the gateway consumes
    pub const ALL: [RawChannel; 4] = [
        RawChannel::PlayerMessage,
        RawChannel::SlashCommandExecuted,
        RawChannel::PlayerTransform,
        RawChannel::PlayerTravelled,
    ];

    /// Name used on the wire (`header.eventName` / subscribe body)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerMessage => "PlayerMessage",
            Self::SlashCommandExecuted => "SlashCommandExecuted",
            Self::PlayerTransform => "PlayerTransform",
            Self::PlayerTravelled => "PlayerTravelled",
        }
    }

    /// Look up a channel by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.as_str() == name)
    }
}

impl fmt::Display for RawChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
