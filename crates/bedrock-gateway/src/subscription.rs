//! Raw channel subscription bookkeeping

use bedrock_protocol::RawChannel;

/// Monotonic, insertion-ordered set of raw channel names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    channels: Vec<String>,
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::seeded()
    }
}

impl SubscriptionSet {
    /// Empty set
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Set holding the mandatory chat channel
    pub fn seeded() -> Self {
        let mut set = Self::new();
        set.insert(RawChannel::PlayerMessage.as_str());
        set
    }

    /// Record a channel; returns false if it was already recorded
    pub fn insert(&mut self, channel: &str) -> bool {
        if self.contains(channel) {
            return false;
        }
        self.channels.push(channel.to_string());
        true
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    /// Channels in the order they were first recorded
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_with_chat() {
        let set = SubscriptionSet::default();
        assert_eq!(set.channels(), ["PlayerMessage".to_string()]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = SubscriptionSet::seeded();
        assert!(set.insert("PlayerTransform"));
        assert!(!set.insert("PlayerTransform"));
        assert!(!set.insert("PlayerMessage"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.channels()[1], "PlayerTransform");
    }
}
