//! Advisory view of who is in the world and who has answered.
//!
//! Nothing here is authoritative: the roster only feeds the "last answer"
//! estimate, the host's early close and display names.

use log::debug;
use shared::{PlayerId, QuestionIndex};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct Roster {
    in_world: BTreeSet<PlayerId>,
    opted_out: BTreeSet<PlayerId>,
    answered: BTreeSet<PlayerId>,
    answered_for: Option<QuestionIndex>,
    names: HashMap<PlayerId, String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the player was not yet in world
    pub fn join(&mut self, player_id: PlayerId) -> bool {
        self.in_world.insert(player_id)
    }

    pub fn set_name(&mut self, player_id: PlayerId, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.names.insert(player_id, name.to_string());
        }
    }

    pub fn logout(&mut self, player_id: PlayerId) -> bool {
        self.in_world.insert(player_id);
        self.opted_out.insert(player_id)
    }

    pub fn rejoin(&mut self, player_id: PlayerId) -> bool {
        let joined = self.in_world.insert(player_id);
        self.opted_out.remove(&player_id) || joined
    }

    /// Starts a fresh answered set for a newly presented question
    pub fn begin_question(&mut self, index: QuestionIndex) {
        if self.answered_for != Some(index) {
            self.answered.clear();
            self.answered_for = Some(index);
        }
    }

    pub fn clear_answers(&mut self) {
        self.answered.clear();
        self.answered_for = None;
    }

    /// Records an answer seen on the bus; ignored for any other question
    pub fn mark_answered(&mut self, index: QuestionIndex, player_id: PlayerId) -> bool {
        if self.answered_for != Some(index) {
            debug!(
                "Ignoring answer from {} for question {} (tracking {:?})",
                player_id, index, self.answered_for
            );
            return false;
        }
        self.in_world.insert(player_id);
        self.answered.insert(player_id)
    }

    pub fn merge_answered(&mut self, index: QuestionIndex, players: &[PlayerId]) {
        if self.answered_for == Some(index) {
            self.answered.extend(players.iter().copied());
        }
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.in_world.contains(&player_id)
    }

    pub fn is_opted_out(&self, player_id: PlayerId) -> bool {
        self.opted_out.contains(&player_id)
    }

    /// Players currently expected to answer
    pub fn active(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.in_world
            .iter()
            .copied()
            .filter(|id| !self.opted_out.contains(id))
    }

    pub fn in_world(&self) -> Vec<PlayerId> {
        self.in_world.iter().copied().collect()
    }

    pub fn size(&self) -> usize {
        self.active().count()
    }

    pub fn answered(&self) -> Vec<PlayerId> {
        self.answered.iter().copied().collect()
    }

    pub fn answered_count(&self) -> usize {
        self.answered
            .iter()
            .filter(|id| !self.opted_out.contains(id))
            .count()
    }

    /// Answers already in, not counting `player_id`
    pub fn answered_excluding(&self, player_id: PlayerId) -> usize {
        self.answered
            .iter()
            .filter(|id| **id != player_id && !self.opted_out.contains(id))
            .count()
    }

    pub fn all_answered(&self) -> bool {
        let mut active = self.active().peekable();
        active.peek().is_some() && self.active().all(|id| self.answered.contains(&id))
    }

    /// Display name, falling back to a placeholder for unknown players
    pub fn display_name(&self, player_id: PlayerId) -> String {
        self.names
            .get(&player_id)
            .cloned()
            .unwrap_or_else(|| placeholder_name(player_id))
    }
}

pub fn placeholder_name(player_id: PlayerId) -> String {
    format!("Player {}", player_id)
}
