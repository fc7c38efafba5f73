//! The boundary to the presentation layer: intents in, snapshots out.
//!
//! A renderer never touches the session; it reads a [`Snapshot`] and sends
//! [`Intent`]s back.

use crate::question::ui_slot;
use shared::{LeaderboardEntry, PlayerId, QuestionIndex, Settings, UI_SLOTS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Screen slot 0-3
    SelectAnswer(usize),
    StartGame,
    OpenSettings,
    ConfirmSettings(Settings),
    CancelSettings,
    Logout,
    Rejoin,
    TransferHost(PlayerId),
    ResetGame,
    Focus,
    Blur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Lobby,
    Settings,
    Question,
    Submitted,
    Results,
    Leaderboard,
    /// Between the leaderboard and the next question
    Interstitial,
    Ended,
    OptedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub index: QuestionIndex,
    pub total: u32,
    pub prompt: String,
    /// Option labels by screen slot; two-option questions leave 0 and 1 empty
    pub slots: [Option<String>; UI_SLOTS],
    pub remaining_ms: u64,
    pub selected_slot: Option<usize>,
    /// Only known once results are in
    pub correct_slot: Option<usize>,
    pub answer_counts: Vec<u32>,
}

impl QuestionView {
    pub fn slot_labels(options: &[String]) -> [Option<String>; UI_SLOTS] {
        let mut slots: [Option<String>; UI_SLOTS] = Default::default();
        for (index, option) in options.iter().enumerate() {
            if let Some(slot) = ui_slot(index, options.len()) {
                slots[slot] = Some(option.clone());
            }
        }
        slots
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
    pub is_self: bool,
}

/// Ranks rows in broadcast order; equal scores share a rank
pub fn leaderboard_rows(
    entries: &[LeaderboardEntry],
    local_id: PlayerId,
    resolve_name: impl Fn(PlayerId) -> String,
) -> Vec<LeaderboardRow> {
    let mut rows: Vec<LeaderboardRow> = Vec::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        let rank = match rows.last() {
            Some(previous) if previous.score == entry.score => previous.rank,
            _ => position + 1,
        };
        let name = if entry.name.trim().is_empty() {
            resolve_name(entry.player_id)
        } else {
            entry.name.clone()
        };
        rows.push(LeaderboardRow {
            rank,
            player_id: entry.player_id,
            name,
            score: entry.score,
            is_self: entry.player_id == local_id,
        });
    }
    rows
}

/// Read-only view of one phone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub player_id: PlayerId,
    pub screen: Screen,
    pub is_host: bool,
    pub host_id: Option<PlayerId>,
    pub score: u32,
    pub question: Option<QuestionView>,
    pub last_answer_correct: Option<bool>,
    pub leaderboard: Vec<LeaderboardRow>,
    pub settings: Settings,
    /// Draft being edited while the settings screen is open
    pub settings_draft: Option<Settings>,
    pub players_in_world: usize,
    pub players_answered: usize,
}
