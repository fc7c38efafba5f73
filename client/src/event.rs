//! Canonical lifecycle events.
//!
//! Live broadcasts and reconciled state snapshots are both turned into these
//! events before anything is applied, so each state has exactly one handler.

use crate::settings::Stamp;
use shared::{
    GameConfig, GameId, LeaderboardEntry, Message, PlayerId, Question, QuestionIndex, Settings,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    HostChanged {
        new_host_id: PlayerId,
        old_host_id: Option<PlayerId>,
    },
    Settings {
        stamp: Stamp,
        settings: Settings,
    },
    GameStart {
        game_id: GameId,
        config: GameConfig,
    },
    QuestionPresented {
        game_id: GameId,
        question: Question,
        question_index: QuestionIndex,
        time_limit_ms: u64,
        total_questions: u32,
        /// Time already spent on the question before this phone saw it
        elapsed_ms: u64,
    },
    Results {
        game_id: GameId,
        question_index: QuestionIndex,
        question: Question,
        correct_option_index: usize,
        answer_counts: Vec<u32>,
        scores: BTreeMap<PlayerId, u32>,
        show_leaderboard: bool,
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    GameEnd {
        game_id: GameId,
        final_leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    Reset {
        game_id: Option<GameId>,
    },
}

impl LifecycleEvent {
    /// Lifecycle event carried by a live broadcast, if any
    pub fn from_message(message: &Message) -> Option<Self> {
        let event = match message {
            Message::HostChanged {
                new_host_id,
                old_host_id,
            } => LifecycleEvent::HostChanged {
                new_host_id: *new_host_id,
                old_host_id: *old_host_id,
            },
            Message::SettingsUpdate {
                host_id,
                revision,
                settings,
            } => LifecycleEvent::Settings {
                stamp: Stamp {
                    revision: *revision,
                    writer: *host_id,
                },
                settings: settings.clone(),
            },
            Message::GameStart {
                game_id, config, ..
            } => LifecycleEvent::GameStart {
                game_id: *game_id,
                config: config.clone(),
            },
            Message::QuestionPresented {
                game_id,
                question,
                question_index,
                time_limit_ms,
                total_questions,
                ..
            } => LifecycleEvent::QuestionPresented {
                game_id: *game_id,
                question: question.clone(),
                question_index: *question_index,
                time_limit_ms: *time_limit_ms,
                total_questions: *total_questions,
                elapsed_ms: 0,
            },
            Message::Results {
                game_id,
                question_index,
                question,
                correct_option_index,
                answer_counts,
                scores,
                show_leaderboard,
                leaderboard_data,
            } => LifecycleEvent::Results {
                game_id: *game_id,
                question_index: *question_index,
                question: question.clone(),
                correct_option_index: *correct_option_index,
                answer_counts: answer_counts.clone(),
                scores: scores.clone(),
                show_leaderboard: *show_leaderboard,
                leaderboard: leaderboard_data.clone(),
            },
            Message::GameEnd {
                game_id,
                final_leaderboard,
                ..
            } => LifecycleEvent::GameEnd {
                game_id: *game_id,
                final_leaderboard: final_leaderboard.clone(),
            },
            Message::GameReset { game_id, .. } => LifecycleEvent::Reset { game_id: *game_id },
            _ => return None,
        };
        Some(event)
    }
}
