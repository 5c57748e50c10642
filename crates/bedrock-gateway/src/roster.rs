//! Player presence derived from periodic `list` snapshots
//!
//! The game never announces joins or leaves, so each snapshot is diffed
//! against the players already known to the world.

use std::collections::BTreeMap;

use crate::world::Player;

/// Sender name the game gives to text injected from outside the world.
/// It never shows up in `list` output and is never evicted.
pub const EXTERNAL_SENDER: &str = "外部";

/// Outcome of applying one snapshot
#[derive(Debug, Default)]
pub struct RosterDiff {
    pub joined: Vec<Player>,
    pub left: Vec<Player>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Players known to one world, keyed by name
#[derive(Debug, Default)]
pub struct PlayerRoster {
    players: BTreeMap<String, Player>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing player by name, or a freshly recorded one
    pub fn resolve_or_insert(&mut self, name: &str, make: impl FnOnce(&str) -> Player) -> Player {
        self.players
            .entry(name.to_string())
            .or_insert_with(|| make(name))
            .clone()
    }

    /// Replace the known set with `names`, reporting who left and who joined
    pub fn apply_snapshot(
        &mut self,
        names: &[String],
        make: impl Fn(&str) -> Player,
    ) -> RosterDiff {
        let mut diff = RosterDiff::default();

        let absent: Vec<String> = self
            .players
            .keys()
            .filter(|name| name.as_str() != EXTERNAL_SENDER && !names.contains(name))
            .cloned()
            .collect();
        for name in absent {
            if let Some(player) = self.players.remove(&name) {
                diff.left.push(player);
            }
        }

        for name in names {
            if !self.players.contains_key(name) {
                let player = make(name);
                self.players.insert(name.clone(), player.clone());
                diff.joined.push(player);
            }
        }

        diff
    }

    pub fn get(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    /// Known players ordered by name
    pub fn players(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    fn detached(name: &str) -> Player {
        Player::new(name, Weak::new())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    fn player_names(players: &[Player]) -> Vec<&str> {
        players.iter().map(Player::name).collect()
    }

    #[test]
    fn test_snapshot_diff() {
        let mut roster = PlayerRoster::new();

        let first = roster.apply_snapshot(&names(&["A", "B"]), detached);
        assert_eq!(player_names(&first.joined), vec!["A", "B"]);
        assert!(first.left.is_empty());

        let second = roster.apply_snapshot(&names(&["B", "C"]), detached);
        assert_eq!(player_names(&second.left), vec!["A"]);
        assert_eq!(player_names(&second.joined), vec!["C"]);

        let third = roster.apply_snapshot(&names(&["B", "C"]), detached);
        assert!(third.is_empty());
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_duplicate_names_join_once() {
        let mut roster = PlayerRoster::new();
        let diff = roster.apply_snapshot(&names(&["A", "A"]), detached);
        assert_eq!(player_names(&diff.joined), vec!["A"]);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_external_sender_never_evicted() {
        let mut roster = PlayerRoster::new();
        roster.resolve_or_insert(EXTERNAL_SENDER, detached);
        roster.resolve_or_insert("Steve", detached);

        let diff = roster.apply_snapshot(&[], detached);
        assert_eq!(player_names(&diff.left), vec!["Steve"]);
        assert!(roster.contains(EXTERNAL_SENDER));
    }

    #[test]
    fn test_resolve_or_insert_keeps_one_record() {
        let mut roster = PlayerRoster::new();
        roster.resolve_or_insert("Steve", detached);
        roster.resolve_or_insert("Steve", |_| panic!("already known"));
        assert_eq!(roster.len(), 1);
    }
}
