//! The replicated session lifecycle.
//!
//! `waiting → playing → results → leaderboard → playing | ended`, and any
//! state back to `waiting` on reset. Each phone holds its own replica and
//! moves it only on lifecycle events. Events are admitted against a progress
//! key so that duplicated and reordered broadcasts converge:
//!
//! - within a game, `(question index, stage)` only moves forward and an equal
//!   key is a harmless repeat;
//! - events tagged with a game this phone has reset are ignored;
//! - an event for an unknown game id adopts that game (a newer game started
//!   while this phone was not listening).
//!
//! Every phone also tallies the `AwardPoints` it sees, once per
//! `(player, question)`, so whoever takes host authority mid-game starts
//! from totals that include the question just closed.

use crate::settings::SettingsRecord;
use log::{debug, info};
use shared::{GameConfig, GameId, GamePhase, LeaderboardEntry, PlayerId, QuestionIndex};
use std::collections::{BTreeMap, HashSet};

/// Position within one question
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Presented,
    Results,
    Leaderboard,
}

/// Total order of lifecycle events within a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Progress {
    Question { index: QuestionIndex, stage: Stage },
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The event moved the replica forward
    Advance { new_game: bool },
    /// Same event seen again; no one-shot effects may run
    Repeat,
    /// Older than what the replica already shows
    Stale,
}

impl Admission {
    pub fn advanced(&self) -> bool {
        matches!(self, Admission::Advance { .. })
    }

    pub fn new_game(&self) -> bool {
        matches!(self, Admission::Advance { new_game: true })
    }
}

/// Outcome of the last closed question as broadcast by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsView {
    pub question_index: QuestionIndex,
    pub correct_option_index: usize,
    pub answer_counts: Vec<u32>,
    pub scores: BTreeMap<PlayerId, u32>,
}

#[derive(Debug, Clone)]
pub struct Session {
    phase: GamePhase,
    game_id: Option<GameId>,
    retired: HashSet<GameId>,
    progress: Option<Progress>,
    question_index: Option<QuestionIndex>,
    total_questions: u32,
    config: Option<GameConfig>,
    results: Option<ResultsView>,
    leaderboard: Vec<LeaderboardEntry>,
    /// Last question the leaderboard accounts for
    leaderboard_through: Option<QuestionIndex>,
    awards: BTreeMap<(PlayerId, QuestionIndex), u32>,
    pub settings: SettingsRecord,
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::Waiting,
            game_id: None,
            retired: HashSet::new(),
            progress: None,
            question_index: None,
            total_questions: 0,
            config: None,
            results: None,
            leaderboard: Vec::new(),
            leaderboard_through: None,
            awards: BTreeMap::new(),
            settings: SettingsRecord::default(),
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.game_id
    }

    pub fn question_index(&self) -> Option<QuestionIndex> {
        self.question_index
    }

    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    pub fn config(&self) -> Option<&GameConfig> {
        self.config.as_ref()
    }

    pub fn results(&self) -> Option<&ResultsView> {
        self.results.as_ref()
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    /// Awards seen for the current game, keyed by (player, question)
    pub fn awards(&self) -> &BTreeMap<(PlayerId, QuestionIndex), u32> {
        &self.awards
    }

    /// Records an AwardPoints broadcast; false for a repeat or another game
    pub fn record_award(
        &mut self,
        game_id: GameId,
        player_id: PlayerId,
        index: QuestionIndex,
        points: u32,
    ) -> bool {
        if self.game_id != Some(game_id) {
            debug!("Award for game {} while in {:?}", game_id, self.game_id);
            return false;
        }
        if self.awards.contains_key(&(player_id, index)) {
            return false;
        }
        self.awards.insert((player_id, index), points);
        true
    }

    /// Best known total per player: the last leaderboard plus every award
    /// for a question it does not cover yet.
    pub fn score_tally(&self) -> BTreeMap<PlayerId, u32> {
        let mut tally: BTreeMap<PlayerId, u32> = self
            .leaderboard
            .iter()
            .map(|entry| (entry.player_id, entry.score))
            .collect();
        for (&(player_id, index), &points) in &self.awards {
            if self.leaderboard_through.is_some_and(|through| index <= through) {
                continue;
            }
            let total = tally.entry(player_id).or_insert(0);
            *total = total.saturating_add(points);
        }
        tally
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    pub fn is_retired(&self, game_id: GameId) -> bool {
        self.retired.contains(&game_id)
    }

    /// Switches to `game_id` if it is new, retiring the previous game
    fn adopt(&mut self, game_id: GameId) -> bool {
        if self.game_id == Some(game_id) {
            return false;
        }
        if let Some(previous) = self.game_id.replace(game_id) {
            info!("Game {} superseded by {}", previous, game_id);
            self.retired.insert(previous);
        }
        self.progress = None;
        self.question_index = None;
        self.config = None;
        self.results = None;
        self.clear_scores();
        true
    }

    fn clear_scores(&mut self) {
        self.leaderboard.clear();
        self.leaderboard_through = None;
        self.awards.clear();
    }

    fn admit(&mut self, game_id: GameId, key: Progress) -> Admission {
        if self.retired.contains(&game_id) {
            debug!("Ignoring event for retired game {}", game_id);
            return Admission::Stale;
        }
        let new_game = self.adopt(game_id);
        match self.progress {
            Some(current) if key < current => {
                debug!("Ignoring stale {:?} (at {:?})", key, current);
                Admission::Stale
            }
            Some(current) if key == current => Admission::Repeat,
            _ => {
                self.progress = Some(key);
                Admission::Advance { new_game }
            }
        }
    }

    pub fn on_game_start(&mut self, game_id: GameId, config: &GameConfig) -> Admission {
        if self.retired.contains(&game_id) {
            debug!("Ignoring GameStart for retired game {}", game_id);
            return Admission::Stale;
        }
        let new_game = self.adopt(game_id);
        self.total_questions = config.num_questions;
        self.config = Some(config.clone());
        if !new_game {
            return Admission::Repeat;
        }
        info!(
            "Game {} started: {} questions, {}ms per question",
            game_id, config.num_questions, config.time_limit_ms
        );
        self.phase = GamePhase::Playing;
        Admission::Advance { new_game }
    }

    pub fn on_question(
        &mut self,
        game_id: GameId,
        index: QuestionIndex,
        total_questions: u32,
    ) -> Admission {
        let admission = self.admit(
            game_id,
            Progress::Question {
                index,
                stage: Stage::Presented,
            },
        );
        if admission.advanced() {
            self.phase = GamePhase::Playing;
            self.question_index = Some(index);
            self.total_questions = total_questions;
            self.results = None;
        }
        admission
    }

    pub fn on_results(
        &mut self,
        game_id: GameId,
        show_leaderboard: bool,
        view: ResultsView,
    ) -> Admission {
        let stage = if show_leaderboard {
            Stage::Leaderboard
        } else {
            Stage::Results
        };
        let admission = self.admit(
            game_id,
            Progress::Question {
                index: view.question_index,
                stage,
            },
        );
        if admission.advanced() {
            self.phase = if show_leaderboard {
                GamePhase::Leaderboard
            } else {
                GamePhase::Results
            };
            self.question_index = Some(view.question_index);
            self.results = Some(view);
        }
        admission
    }

    /// Stores a leaderboard covering every question up to the current one
    pub fn set_leaderboard(&mut self, entries: Vec<LeaderboardEntry>) {
        self.leaderboard = entries;
        self.leaderboard_through = self.question_index;
    }

    pub fn on_game_end(&mut self, game_id: GameId) -> Admission {
        let admission = self.admit(game_id, Progress::Ended);
        if admission.advanced() {
            info!("Game {} ended", game_id);
            self.phase = GamePhase::Ended;
        }
        admission
    }

    /// Applies a reset; returns false if it was a duplicate or concerns an
    /// older game.
    ///
    /// An untagged reset that finds the replica already in `waiting` counts
    /// as a repeat. Callers only advance the reset epoch on `true`, so such a
    /// reset leaves pending lobby work (a state request) in place.
    pub fn on_reset(&mut self, game_id: Option<GameId>) -> bool {
        match game_id {
            Some(id) if self.retired.contains(&id) => {
                debug!("Duplicate reset for game {}", id);
                return false;
            }
            Some(id) => {
                let applies = match self.game_id {
                    Some(current) => current == id,
                    None => self.phase != GamePhase::Waiting,
                };
                self.retired.insert(id);
                if !applies {
                    debug!(
                        "Reset for game {} does not concern current game {:?}",
                        id, self.game_id
                    );
                    return false;
                }
            }
            None => {
                if self.phase == GamePhase::Waiting {
                    return false;
                }
                if let Some(current) = self.game_id {
                    self.retired.insert(current);
                }
            }
        }

        self.phase = GamePhase::Waiting;
        self.game_id = None;
        self.progress = None;
        self.question_index = None;
        self.total_questions = 0;
        self.config = None;
        self.results = None;
        self.clear_scores();
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Difficulty;

    fn config() -> GameConfig {
        GameConfig {
            time_limit_ms: 30_000,
            category: "general".to_string(),
            difficulty: Difficulty::Easy,
            num_questions: 5,
        }
    }

    fn view(index: QuestionIndex) -> ResultsView {
        ResultsView {
            question_index: index,
            correct_option_index: 0,
            answer_counts: vec![1, 2],
            scores: BTreeMap::new(),
        }
    }

    #[test]
    fn test_full_lifecycle() {
        let mut session = Session::new();
        let game = GameId(1);
        assert_eq!(session.phase(), GamePhase::Waiting);

        assert!(session.on_game_start(game, &config()).new_game());
        assert_eq!(session.phase(), GamePhase::Playing);

        assert!(session.on_question(game, 0, 5).advanced());
        assert_eq!(session.question_index(), Some(0));

        assert!(session.on_results(game, false, view(0)).advanced());
        assert_eq!(session.phase(), GamePhase::Results);

        assert!(session.on_results(game, true, view(0)).advanced());
        assert_eq!(session.phase(), GamePhase::Leaderboard);

        assert!(session.on_question(game, 1, 5).advanced());
        assert_eq!(session.phase(), GamePhase::Playing);

        assert!(session.on_game_end(game).advanced());
        assert_eq!(session.phase(), GamePhase::Ended);

        assert!(session.on_reset(Some(game)));
        assert_eq!(session.phase(), GamePhase::Waiting);
        assert_eq!(session.game_id(), None);
    }

    #[test]
    fn test_repeats_and_stale_events() {
        let mut session = Session::new();
        let game = GameId(9);
        session.on_question(game, 2, 5);
        session.on_results(game, false, view(2));

        assert_eq!(session.on_results(game, false, view(2)), Admission::Repeat);
        assert_eq!(session.on_question(game, 2, 5), Admission::Stale);
        assert_eq!(session.on_question(game, 1, 5), Admission::Stale);
        assert_eq!(session.phase(), GamePhase::Results);
    }

    #[test]
    fn test_game_start_after_question_is_repeat() {
        let mut session = Session::new();
        let game = GameId(3);
        assert!(session.on_question(game, 0, 5).new_game());
        assert_eq!(session.on_game_start(game, &config()), Admission::Repeat);
        assert_eq!(session.phase(), GamePhase::Playing);
        assert_eq!(session.question_index(), Some(0));
    }

    #[test]
    fn test_duplicate_reset_ignored() {
        let mut session = Session::new();
        let game = GameId(4);
        session.on_game_start(game, &config());

        assert!(session.on_reset(Some(game)));
        assert!(!session.on_reset(Some(game)));
        assert_eq!(session.on_question(game, 0, 5), Admission::Stale);
        assert_eq!(session.phase(), GamePhase::Waiting);
    }

    #[test]
    fn test_reset_without_game_id() {
        let mut session = Session::new();
        assert!(!session.on_reset(None));

        session.on_game_start(GameId(1), &config());
        assert!(session.on_reset(None));
        assert!(session.is_retired(GameId(1)));
    }

    #[test]
    fn test_reset_of_older_game_leaves_current() {
        let mut session = Session::new();
        session.on_question(GameId(1), 0, 5);
        session.on_question(GameId(2), 0, 5);

        assert!(session.is_retired(GameId(1)));
        assert!(!session.on_reset(Some(GameId(1))));
        assert_eq!(session.game_id(), Some(GameId(2)));
    }

    #[test]
    fn test_newer_game_supersedes() {
        let mut session = Session::new();
        session.on_question(GameId(1), 3, 5);
        let admission = session.on_question(GameId(2), 0, 5);
        assert!(admission.new_game());
        assert_eq!(session.question_index(), Some(0));
        assert_eq!(session.on_results(GameId(1), false, view(3)), Admission::Stale);
    }

    #[test]
    fn test_award_tally_counts_each_question_once() {
        let mut session = Session::new();
        let game = GameId(5);
        session.on_question(game, 0, 5);

        assert!(session.record_award(game, PlayerId(1), 0, 900));
        assert!(!session.record_award(game, PlayerId(1), 0, 900));
        assert!(!session.record_award(GameId(6), PlayerId(1), 0, 900));
        assert!(session.record_award(game, PlayerId(2), 0, 0));

        let tally = session.score_tally();
        assert_eq!(tally[&PlayerId(1)], 900);
        assert_eq!(tally[&PlayerId(2)], 0);
    }

    #[test]
    fn test_award_tally_builds_on_leaderboard() {
        let mut session = Session::new();
        let game = GameId(5);
        session.on_question(game, 0, 5);
        session.record_award(game, PlayerId(1), 0, 900);
        session.on_results(game, true, view(0));
        session.set_leaderboard(vec![LeaderboardEntry {
            player_id: PlayerId(1),
            name: "P1".to_string(),
            score: 900,
        }]);

        session.on_question(game, 1, 5);
        session.on_results(game, false, view(1));
        session.record_award(game, PlayerId(1), 1, 800);

        // Question 0 is already inside the leaderboard total
        assert_eq!(session.score_tally()[&PlayerId(1)], 1700);
    }

    #[test]
    fn test_reset_clears_awards() {
        let mut session = Session::new();
        let game = GameId(5);
        session.on_question(game, 0, 5);
        session.record_award(game, PlayerId(1), 0, 900);

        assert!(session.on_reset(Some(game)));
        assert!(session.awards().is_empty());
        assert!(session.score_tally().is_empty());
    }

    #[test]
    fn test_progress_order() {
        let presented = Progress::Question {
            index: 1,
            stage: Stage::Presented,
        };
        let leaderboard = Progress::Question {
            index: 0,
            stage: Stage::Leaderboard,
        };
        assert!(leaderboard < presented);
        assert!(presented < Progress::Ended);
    }
}
