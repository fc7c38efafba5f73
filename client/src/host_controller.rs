//! Host-side game driver
//!
//! Runs only on the phone that currently holds host authority. It decides
//! when questions open and close and what the leaderboard says, and talks to
//! the rest of the session purely through broadcasts, including to its own
//! phone's replica. Every timer it arms goes through the phone's
//! [`ResetGuard`] so a reset stops the driver like any other deferred work.

use crate::config::SessionConfig;
use crate::epoch::{ResetGuard, TimerId};
use crate::phone::Deferred;
use crate::question::PresentedQuestion;
use crate::questions::QuestionBank;
use crate::roster::Roster;
use crate::session::Session;
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    GameId, GamePhase, LeaderboardEntry, Message, PlayerId, Question, QuestionIndex, Settings,
};
use std::collections::{BTreeMap, HashSet};

/// Deferred steps of the host driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTask {
    CloseQuestion { game_id: GameId, index: QuestionIndex },
    ShowLeaderboard { game_id: GameId, index: QuestionIndex },
    Advance { game_id: GameId, index: QuestionIndex },
}

/// Phone state the driver works against
pub struct HostCtx<'a> {
    pub local_id: PlayerId,
    pub now_ms: u64,
    pub config: &'a SessionConfig,
    pub guard: &'a mut ResetGuard<Deferred>,
    pub roster: &'a Roster,
    pub bank: &'a QuestionBank,
    pub outbox: &'a mut Vec<Message>,
}

impl HostCtx<'_> {
    fn schedule(&mut self, delay_ms: u64, task: HostTask) -> TimerId {
        self.guard.schedule(self.now_ms, delay_ms, Deferred::Host(task))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Open,
    Closed,
    Leaderboard,
    Ended,
}

#[derive(Debug, Clone)]
struct HostedGame {
    game_id: GameId,
    settings: Settings,
    planned: Vec<Question>,
    used: HashSet<String>,
    total: u32,
    index: QuestionIndex,
    current: Question,
    round: Round,
    /// First submission per player for the current question
    answers: BTreeMap<PlayerId, usize>,
    tally: BTreeMap<PlayerId, u32>,
    awarded: HashSet<(PlayerId, QuestionIndex)>,
    counts: Vec<u32>,
}

impl HostedGame {
    fn next_question(&mut self, index: QuestionIndex, bank: &QuestionBank) -> Option<Question> {
        let question = match self.planned.get(index as usize) {
            Some(question) => question.clone(),
            None => bank.draw(&self.settings, &self.used, &mut rand::thread_rng())?,
        };
        self.used.insert(question.prompt.clone());
        Some(question)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostController {
    game: Option<HostedGame>,
    timer: Option<TimerId>,
}

impl HostController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a driver from the local replica after this phone became host.
    ///
    /// Continues wherever the replica is: an open question closes when its
    /// remaining time runs out, results and leaderboard screens move on after
    /// their usual display time. Scores start from the awards this phone has
    /// seen. Answers submitted before the takeover are not known to the new
    /// driver.
    pub fn takeover(
        ctx: &mut HostCtx<'_>,
        session: &Session,
        current: Option<&PresentedQuestion>,
    ) -> Self {
        let mut controller = Self::new();
        let (Some(game_id), Some(presented)) = (session.game_id(), current) else {
            info!("Player {} is now host of an idle session", ctx.local_id);
            return controller;
        };
        if presented.game_id != game_id {
            return controller;
        }

        let settings = match session.config() {
            Some(config) => Settings {
                category: config.category.clone(),
                difficulty: config.difficulty,
                time_limit_ms: config.time_limit_ms,
                num_questions: config.num_questions,
                ..session.settings.current()
            },
            None => Settings {
                time_limit_ms: presented.time_limit_ms,
                ..session.settings.current()
            },
        };

        let tally = session.score_tally();
        let awarded = session.awards().keys().copied().collect();
        let counts = session
            .results()
            .filter(|results| results.question_index == presented.index)
            .map(|results| results.answer_counts.clone())
            .unwrap_or_default();

        let round = match session.phase() {
            GamePhase::Playing => Round::Open,
            GamePhase::Results => Round::Closed,
            GamePhase::Leaderboard => Round::Leaderboard,
            GamePhase::Ended => Round::Ended,
            GamePhase::Waiting => return controller,
        };

        let mut game = HostedGame {
            game_id,
            settings,
            planned: Vec::new(),
            used: HashSet::new(),
            total: session.total_questions().max(presented.index.saturating_add(1)),
            index: presented.index,
            current: presented.question.clone(),
            round,
            answers: BTreeMap::new(),
            tally,
            awarded,
            counts,
        };
        game.used.insert(presented.question.prompt.clone());

        let index = game.index;
        controller.timer = match round {
            Round::Open => {
                let delay = presented
                    .remaining_ms(ctx.now_ms)
                    .saturating_add(ctx.config.answer_grace_ms);
                Some(ctx.schedule(delay, HostTask::CloseQuestion { game_id, index }))
            }
            Round::Closed => Some(ctx.schedule(
                ctx.config.results_display_ms,
                HostTask::ShowLeaderboard { game_id, index },
            )),
            Round::Leaderboard => Some(ctx.schedule(
                ctx.config.leaderboard_display_ms,
                HostTask::Advance { game_id, index },
            )),
            Round::Ended => None,
        };
        info!(
            "Player {} took over game {} at question {} ({:?})",
            ctx.local_id, game_id, index, round
        );
        controller.game = Some(game);
        controller
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.game.as_ref().map(|game| game.game_id)
    }

    /// True while a game is running that has not ended
    pub fn is_running(&self) -> bool {
        self.game.as_ref().is_some_and(|game| game.round != Round::Ended)
    }

    pub fn tally(&self) -> BTreeMap<PlayerId, u32> {
        self.game.as_ref().map(|game| game.tally.clone()).unwrap_or_default()
    }

    pub fn start_game(&mut self, ctx: &mut HostCtx<'_>, settings: &Settings) -> Option<GameId> {
        if self.is_running() {
            warn!("Game already running; reset it before starting another");
            return None;
        }
        if let Err(e) = settings.validate() {
            warn!("Cannot start game: {}", e);
            return None;
        }

        let mut rng = rand::thread_rng();
        let planned = ctx.bank.select(settings, &mut rng);
        let Some(first) = planned.first().cloned() else {
            warn!("Question bank has nothing for these settings");
            return None;
        };

        let game_id = GameId(rng.gen());
        let total = planned.len() as u32;
        let mut config = settings.game_config();
        config.num_questions = total;

        info!(
            "Starting game {}: {} questions, {} {}",
            game_id, total, settings.difficulty, settings.category
        );
        ctx.outbox.push(Message::GameStart {
            host_id: ctx.local_id,
            game_id,
            config,
        });

        self.game = Some(HostedGame {
            game_id,
            settings: settings.clone(),
            used: planned.iter().map(|q| q.prompt.clone()).collect(),
            planned,
            total,
            index: 0,
            current: first.clone(),
            round: Round::Open,
            answers: BTreeMap::new(),
            tally: BTreeMap::new(),
            awarded: HashSet::new(),
            counts: Vec::new(),
        });
        self.present(ctx, 0, first);
        Some(game_id)
    }

    fn present(&mut self, ctx: &mut HostCtx<'_>, index: QuestionIndex, question: Question) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        game.index = index;
        game.current = question.clone();
        game.round = Round::Open;
        game.answers.clear();
        game.counts.clear();

        let game_id = game.game_id;
        let time_limit_ms = game.settings.time_limit_ms;
        info!("Presenting question {}/{} of game {}", index + 1, game.total, game_id);
        ctx.outbox.push(Message::QuestionPresented {
            game_id,
            option_count: question.options.len() as u8,
            question,
            question_index: index,
            time_limit_ms,
            total_questions: game.total,
        });

        self.timer = Some(ctx.schedule(
            time_limit_ms.saturating_add(ctx.config.answer_grace_ms),
            HostTask::CloseQuestion { game_id, index },
        ));
        self.broadcast_roster(ctx);
    }

    /// Records an AnswerSubmitted seen on the bus
    pub fn on_answer(
        &mut self,
        ctx: &mut HostCtx<'_>,
        player_id: PlayerId,
        game_id: GameId,
        index: QuestionIndex,
        option_index: usize,
    ) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        if game.game_id != game_id || game.index != index || game.round != Round::Open {
            debug!(
                "Ignoring answer from {} for {}/{} (hosting {}/{} {:?})",
                player_id, game_id, index, game.game_id, game.index, game.round
            );
            return;
        }
        if option_index >= game.current.options.len() {
            warn!(
                "Answer from {} names option {} of {}",
                player_id,
                option_index,
                game.current.options.len()
            );
            return;
        }
        if game.answers.contains_key(&player_id) {
            debug!("Duplicate answer from {} for question {}", player_id, index);
            return;
        }
        game.answers.insert(player_id, option_index);
        self.broadcast_roster(ctx);
        self.close_if_complete(ctx);
    }

    /// Closes the open question early once every active player has answered
    pub fn close_if_complete(&mut self, ctx: &mut HostCtx<'_>) {
        let complete = self.game.as_ref().is_some_and(|game| {
            game.round == Round::Open
                && ctx.roster.size() > 0
                && ctx.roster.active().all(|id| game.answers.contains_key(&id))
        });
        if complete {
            debug!("All active players answered; closing early");
            self.close(ctx);
        }
    }

    /// Applies an AwardPoints broadcast at most once per (player, question)
    pub fn on_award(
        &mut self,
        player_id: PlayerId,
        game_id: GameId,
        index: QuestionIndex,
        points: u32,
    ) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        if game.game_id != game_id {
            debug!("Award for game {} while hosting {}", game_id, game.game_id);
            return;
        }
        if !game.awarded.insert((player_id, index)) {
            debug!("Duplicate award for {} on question {}", player_id, index);
            return;
        }
        let total = game.tally.entry(player_id).or_insert(0);
        *total = total.saturating_add(points);
        debug!(
            "Player {} +{} for question {} (total {})",
            player_id, points, index, game.tally[&player_id]
        );
    }

    pub fn run(&mut self, ctx: &mut HostCtx<'_>, task: HostTask) {
        let (game_id, index) = match task {
            HostTask::CloseQuestion { game_id, index }
            | HostTask::ShowLeaderboard { game_id, index }
            | HostTask::Advance { game_id, index } => (game_id, index),
        };
        let current = self.game.as_ref().map(|game| (game.game_id, game.index));
        if current != Some((game_id, index)) {
            debug!("Dropping {:?}; hosting {:?}", task, current);
            return;
        }
        self.timer = None;

        match task {
            HostTask::CloseQuestion { .. } => self.close(ctx),
            HostTask::ShowLeaderboard { .. } => self.show_leaderboard(ctx),
            HostTask::Advance { .. } => self.advance(ctx),
        }
    }

    fn close(&mut self, ctx: &mut HostCtx<'_>) {
        if let Some(timer) = self.timer.take() {
            ctx.guard.cancel(timer);
        }
        let Some(game) = self.game.as_mut() else {
            return;
        };
        if game.round != Round::Open {
            return;
        }
        game.round = Round::Closed;

        let mut counts = vec![0u32; game.current.options.len()];
        for option in game.answers.values() {
            if let Some(count) = counts.get_mut(*option) {
                *count += 1;
            }
        }
        game.counts = counts.clone();

        let (game_id, index) = (game.game_id, game.index);
        info!(
            "Closing question {} of game {} with {} answers",
            index,
            game_id,
            game.answers.len()
        );
        ctx.outbox.push(Message::Results {
            game_id,
            question_index: index,
            question: game.current.clone(),
            correct_option_index: game.current.correct_option_index,
            answer_counts: counts,
            scores: game.tally.clone(),
            show_leaderboard: false,
            leaderboard_data: None,
        });
        self.timer = Some(ctx.schedule(
            ctx.config.results_display_ms,
            HostTask::ShowLeaderboard { game_id, index },
        ));
    }

    fn show_leaderboard(&mut self, ctx: &mut HostCtx<'_>) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        if game.round != Round::Closed {
            return;
        }
        game.round = Round::Leaderboard;

        let leaderboard = leaderboard(ctx.roster, &game.tally);
        let (game_id, index) = (game.game_id, game.index);
        ctx.outbox.push(Message::Results {
            game_id,
            question_index: index,
            question: game.current.clone(),
            correct_option_index: game.current.correct_option_index,
            answer_counts: game.counts.clone(),
            scores: game.tally.clone(),
            show_leaderboard: true,
            leaderboard_data: Some(leaderboard),
        });
        self.timer = Some(ctx.schedule(
            ctx.config.leaderboard_display_ms,
            HostTask::Advance { game_id, index },
        ));
    }

    fn advance(&mut self, ctx: &mut HostCtx<'_>) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        if game.round != Round::Leaderboard {
            return;
        }

        let next = game.index.saturating_add(1);
        if next < game.total {
            if let Some(question) = game.next_question(next, ctx.bank) {
                self.present(ctx, next, question);
                return;
            }
            warn!("Question bank exhausted after {} questions", next);
        }

        game.round = Round::Ended;
        let final_leaderboard = leaderboard(ctx.roster, &game.tally);
        info!("Game {} finished", game.game_id);
        ctx.outbox.push(Message::GameEnd {
            host_id: ctx.local_id,
            game_id: game.game_id,
            final_leaderboard: Some(final_leaderboard),
        });
    }

    /// Broadcasts a GameReset retiring `game_id` and stops driving it
    pub fn reset_game(&mut self, ctx: &mut HostCtx<'_>, game_id: Option<GameId>) {
        let game_id = game_id.or_else(|| self.game_id());
        info!("Resetting game {:?}", game_id);
        ctx.outbox.push(Message::GameReset {
            host_id: ctx.local_id,
            game_id,
        });
        if let Some(timer) = self.timer.take() {
            ctx.guard.cancel(timer);
        }
        self.game = None;
    }

    /// The phone applied a reset; its guard already dropped our timers
    pub fn on_reset(&mut self) {
        self.game = None;
        self.timer = None;
    }

    /// Broadcasts who is in the world and who has answered
    pub fn broadcast_roster(&self, ctx: &mut HostCtx<'_>) {
        let (question_index, players_answered) = match &self.game {
            Some(game) if game.round == Round::Open => {
                (Some(game.index), game.answers.keys().copied().collect::<Vec<_>>())
            }
            _ => (None, Vec::new()),
        };
        ctx.outbox.push(Message::PlayerUpdate {
            question_index,
            players_in_world: ctx.roster.active().collect(),
            answer_count: players_answered.len() as u32,
            players_answered,
        });
    }
}

/// Sorted leaderboard over every active player and everyone who scored
pub fn leaderboard(roster: &Roster, tally: &BTreeMap<PlayerId, u32>) -> Vec<LeaderboardEntry> {
    let mut players: Vec<PlayerId> = roster.active().collect();
    for player_id in tally.keys() {
        if !players.contains(player_id) {
            players.push(*player_id);
        }
    }

    let mut entries: Vec<LeaderboardEntry> = players
        .into_iter()
        .map(|player_id| LeaderboardEntry {
            player_id,
            name: roster.display_name(player_id),
            score: tally.get(&player_id).copied().unwrap_or(0),
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.player_id.cmp(&b.player_id)));
    entries
}
