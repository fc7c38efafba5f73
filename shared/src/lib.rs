//! Wire vocabulary shared by every quiz participant and the broadcast relay.
//!
//! Everything that crosses the bus lives here: identifiers, question and
//! settings payloads, the [`Message`] enum every phone understands and the
//! [`Packet`] frame the relay forwards. Message payloads are validated with
//! [`Message::validate`] before a handler ever looks at them.

pub mod error;
pub mod scoring;

pub use error::ProtocolError;
pub use scoring::points;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const PROTOCOL_VERSION: u32 = 1;

/// Receive buffer size; leaderboards and question text need more than a
/// movement packet would
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Number of answer slots on a phone screen
pub const UI_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one run of the game from GameStart to GameEnd/GameReset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub type QuestionIndex = u32;

/// Coarse lifecycle state shared by every replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    Waiting,
    Playing,
    Results,
    Leaderboard,
    Ended,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::Waiting => "waiting",
            GamePhase::Playing => "playing",
            GamePhase::Results => "results",
            GamePhase::Leaderboard => "leaderboard",
            GamePhase::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// A question as broadcast by the host. Immutable once presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
}

impl Question {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.prompt.trim().is_empty() {
            return Err(ProtocolError::malformed("Question", "empty prompt"));
        }
        if self.options.len() != 2 && self.options.len() != 4 {
            return Err(ProtocolError::malformed(
                "Question",
                format!("{} options, expected 2 or 4", self.options.len()),
            ));
        }
        if self.correct_option_index >= self.options.len() {
            return Err(ProtocolError::malformed(
                "Question",
                format!(
                    "correct option {} out of range for {} options",
                    self.correct_option_index,
                    self.options.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Optional gameplay modifiers toggled in the settings screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    /// Only draw true/false style questions
    pub two_option_only: bool,
    pub shuffle_questions: bool,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            two_option_only: false,
            shuffle_questions: true,
        }
    }
}

/// Host-configurable game settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub category: String,
    pub difficulty: Difficulty,
    pub time_limit_ms: u64,
    pub num_questions: u32,
    pub modifiers: Modifiers,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            category: "general".to_string(),
            difficulty: Difficulty::Medium,
            time_limit_ms: 30_000,
            num_questions: 5,
            modifiers: Modifiers::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.time_limit_ms == 0 {
            return Err(ProtocolError::malformed("Settings", "zero time limit"));
        }
        if self.num_questions == 0 {
            return Err(ProtocolError::malformed("Settings", "zero questions"));
        }
        Ok(())
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            time_limit_ms: self.time_limit_ms,
            category: self.category.clone(),
            difficulty: self.difficulty,
            num_questions: self.num_questions,
        }
    }
}

/// Per-game configuration frozen at GameStart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub time_limit_ms: u64,
    pub category: String,
    pub difficulty: Difficulty,
    pub num_questions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
}

/// The host's answer to a StateRequest. Every field beyond the phase is
/// optional; receivers fill gaps with defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResponse {
    pub requester_id: PlayerId,
    pub host_id: PlayerId,
    pub game_state: GamePhase,
    pub game_id: Option<GameId>,
    pub current_question: Option<Question>,
    pub question_index: Option<QuestionIndex>,
    pub total_questions: Option<u32>,
    pub time_limit_ms: Option<u64>,
    /// Time the host has already spent on the current question
    pub elapsed_ms: Option<u64>,
    pub correct_option_index: Option<usize>,
    pub answer_counts: Option<Vec<u32>>,
    pub show_leaderboard: Option<bool>,
    pub leaderboard_data: Option<Vec<LeaderboardEntry>>,
    pub settings: Option<Settings>,
}

/// Every broadcast understood by a phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    GameRegistered {
        host_id: PlayerId,
    },
    GameStart {
        host_id: PlayerId,
        game_id: GameId,
        config: GameConfig,
    },
    QuestionPresented {
        game_id: GameId,
        question: Question,
        question_index: QuestionIndex,
        time_limit_ms: u64,
        total_questions: u32,
        option_count: u8,
    },
    AnswerSubmitted {
        player_id: PlayerId,
        game_id: GameId,
        question_index: QuestionIndex,
        option_index: usize,
        response_time_ms: u64,
    },
    Results {
        game_id: GameId,
        question_index: QuestionIndex,
        question: Question,
        correct_option_index: usize,
        answer_counts: Vec<u32>,
        scores: BTreeMap<PlayerId, u32>,
        show_leaderboard: bool,
        leaderboard_data: Option<Vec<LeaderboardEntry>>,
    },
    PlayerUpdate {
        question_index: Option<QuestionIndex>,
        players_in_world: Vec<PlayerId>,
        players_answered: Vec<PlayerId>,
        answer_count: u32,
    },
    StateRequest {
        requester_id: PlayerId,
    },
    StateResponse(StateResponse),
    GameEnd {
        host_id: PlayerId,
        game_id: GameId,
        final_leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    GameReset {
        host_id: PlayerId,
        game_id: Option<GameId>,
    },
    HostChanged {
        new_host_id: PlayerId,
        old_host_id: Option<PlayerId>,
    },
    SettingsUpdate {
        host_id: PlayerId,
        revision: u64,
        settings: Settings,
    },
    AwardPoints {
        player_id: PlayerId,
        game_id: GameId,
        question_index: QuestionIndex,
        points: u32,
    },
    PlayerJoined {
        player_id: PlayerId,
        name: String,
    },
    PlayerLogout {
        player_id: PlayerId,
    },
    PlayerRejoin {
        player_id: PlayerId,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::GameRegistered { .. } => "GameRegistered",
            Message::GameStart { .. } => "GameStart",
            Message::QuestionPresented { .. } => "QuestionPresented",
            Message::AnswerSubmitted { .. } => "AnswerSubmitted",
            Message::Results { .. } => "Results",
            Message::PlayerUpdate { .. } => "PlayerUpdate",
            Message::StateRequest { .. } => "StateRequest",
            Message::StateResponse(_) => "StateResponse",
            Message::GameEnd { .. } => "GameEnd",
            Message::GameReset { .. } => "GameReset",
            Message::HostChanged { .. } => "HostChanged",
            Message::SettingsUpdate { .. } => "SettingsUpdate",
            Message::AwardPoints { .. } => "AwardPoints",
            Message::PlayerJoined { .. } => "PlayerJoined",
            Message::PlayerLogout { .. } => "PlayerLogout",
            Message::PlayerRejoin { .. } => "PlayerRejoin",
        }
    }

    /// Checks the payload invariants a handler relies on.
    ///
    /// Optional fields of a StateResponse are not checked here; the
    /// reconciler treats a missing field as "not enough information" for the
    /// phase it describes.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let kind = self.kind();
        match self {
            Message::GameStart { config, .. } => {
                if config.num_questions == 0 {
                    return Err(ProtocolError::malformed(kind, "zero questions"));
                }
                if config.time_limit_ms == 0 {
                    return Err(ProtocolError::malformed(kind, "zero time limit"));
                }
                Ok(())
            }
            Message::QuestionPresented {
                question,
                question_index,
                time_limit_ms,
                total_questions,
                option_count,
                ..
            } => {
                question.validate()?;
                if *option_count as usize != question.options.len() {
                    return Err(ProtocolError::malformed(
                        kind,
                        format!(
                            "option count {} does not match {} options",
                            option_count,
                            question.options.len()
                        ),
                    ));
                }
                if *time_limit_ms == 0 {
                    return Err(ProtocolError::malformed(kind, "zero time limit"));
                }
                if question_index >= total_questions {
                    return Err(ProtocolError::malformed(
                        kind,
                        format!("index {} of {}", question_index, total_questions),
                    ));
                }
                Ok(())
            }
            Message::Results {
                question,
                correct_option_index,
                answer_counts,
                ..
            } => {
                question.validate()?;
                if *correct_option_index >= question.options.len() {
                    return Err(ProtocolError::malformed(
                        kind,
                        format!("correct option {} out of range", correct_option_index),
                    ));
                }
                if !answer_counts.is_empty() && answer_counts.len() != question.options.len() {
                    return Err(ProtocolError::malformed(
                        kind,
                        format!(
                            "{} answer counts for {} options",
                            answer_counts.len(),
                            question.options.len()
                        ),
                    ));
                }
                Ok(())
            }
            Message::SettingsUpdate { settings, .. } => settings.validate(),
            Message::StateResponse(response) => match &response.current_question {
                Some(question) => question.validate(),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// A message tagged with the participant that published it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: PlayerId,
    pub message: Message,
}

impl Envelope {
    pub fn new(sender: PlayerId, message: Message) -> Self {
        Self { sender, message }
    }
}

/// Datagram frame between a participant and the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Join {
        peer_id: PlayerId,
        protocol_version: u32,
    },
    Publish {
        envelope: Envelope,
    },
    Heartbeat,
    Leave,

    Joined {
        peer_id: PlayerId,
    },
    Deliver {
        envelope: Envelope,
    },
    Rejected {
        reason: String,
    },
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let data = bincode::serialize(packet).map_err(ProtocolError::Encode)?;
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::Oversized(data.len()));
    }
    Ok(data)
}

pub fn decode_packet(data: &[u8]) -> Result<Packet, ProtocolError> {
    bincode::deserialize(data).map_err(ProtocolError::Decode)
}
