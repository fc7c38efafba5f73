//! One quiz participant.
//!
//! A [`Phone`] owns its replica of the session and every local protocol:
//! question lifecycle, award guard, late-join reconciliation, host authority
//! and the reset guard around deferred work. It is sans-IO: callers feed it
//! envelopes, intents and clock readings, and collect outgoing broadcasts with
//! [`Phone::drain_outbox`]. Handlers are total; bad input is logged and
//! dropped.

use crate::config::SessionConfig;
use crate::epoch::{Epoch, Fired, ResetGuard};
use crate::event::LifecycleEvent;
use crate::focus::Focus;
use crate::host::{HostAuthority, HostTransition, PrivilegedAction};
use crate::host_controller::{HostController, HostCtx, HostTask};
use crate::late_join::{translate, LateJoinReconciler};
use crate::question::{
    advisory_display, ui_slot, AnswerDisplay, PresentedQuestion, QuestionLifecycle,
};
use crate::questions::QuestionBank;
use crate::roster::Roster;
use crate::session::{ResultsView, Session};
use crate::snapshot::{leaderboard_rows, Intent, QuestionView, Screen, Snapshot};
use log::{debug, info, warn};
use shared::{
    Envelope, GameId, GamePhase, LeaderboardEntry, Message, PlayerId, Question, QuestionIndex,
    Settings, StateResponse,
};

/// Work a phone defers; always scheduled through the reset guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    StateRequest,
    LeaderboardHide {
        game_id: GameId,
        question_index: QuestionIndex,
    },
    ScoreResync {
        game_id: GameId,
        question_index: QuestionIndex,
    },
    Host(HostTask),
}

macro_rules! host_ctx {
    ($phone:ident, $now_ms:expr) => {
        HostCtx {
            local_id: $phone.id,
            now_ms: $now_ms,
            config: &$phone.config,
            guard: &mut $phone.guard,
            roster: &$phone.roster,
            bank: &$phone.bank,
            outbox: &mut $phone.outbox,
        }
    };
}

pub struct Phone {
    id: PlayerId,
    name: String,
    config: SessionConfig,
    guard: ResetGuard<Deferred>,
    session: Session,
    question: QuestionLifecycle,
    host: HostAuthority,
    controller: Option<HostController>,
    late_join: LateJoinReconciler,
    roster: Roster,
    focus: Focus,
    bank: QuestionBank,

    local_score: u32,
    opted_out: bool,
    settings_draft: Option<Settings>,
    /// Leaderboard timed out before the next question arrived
    interstitial: bool,
    answer_display: Option<AnswerDisplay>,
    last_answer_correct: Option<bool>,

    outbox: Vec<Message>,
}

impl Phone {
    pub fn new(id: PlayerId, name: &str, config: SessionConfig, bank: QuestionBank) -> Self {
        let mut roster = Roster::new();
        roster.join(id);
        roster.set_name(id, name);

        Self {
            id,
            name: name.to_string(),
            config,
            guard: ResetGuard::new(),
            session: Session::new(),
            question: QuestionLifecycle::new(),
            host: HostAuthority::new(id),
            controller: None,
            late_join: LateJoinReconciler::new(id),
            roster,
            focus: Focus::default(),
            bank,
            local_score: 0,
            opted_out: false,
            settings_draft: None,
            interstitial: false,
            answer_display: None,
            last_answer_correct: None,
            outbox: Vec::new(),
        }
    }

    /// Announces this phone. A phone started as host claims authority and
    /// registers the game; any other phone asks for the session state after
    /// the settle delay.
    pub fn start(&mut self, now_ms: u64, claim_host: bool) {
        info!("Player {} ({}) starting", self.id, self.name);
        self.outbox.push(Message::PlayerJoined {
            player_id: self.id,
            name: self.name.clone(),
        });

        if claim_host {
            let previous = self.host.current();
            self.outbox.push(Message::HostChanged {
                new_host_id: self.id,
                old_host_id: previous,
            });
            self.apply_event(
                now_ms,
                LifecycleEvent::HostChanged {
                    new_host_id: self.id,
                    old_host_id: previous,
                },
            );
            self.outbox.push(Message::GameRegistered { host_id: self.id });
        } else {
            self.schedule_state_request(now_ms);
        }
    }

    fn schedule_state_request(&mut self, now_ms: u64) {
        self.late_join.schedule(
            &mut self.guard,
            now_ms,
            self.config.state_request_delay_ms,
            Deferred::StateRequest,
        );
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn current_question(&self) -> Option<&PresentedQuestion> {
        self.question.current()
    }

    pub fn question_lifecycle(&self) -> &QuestionLifecycle {
        &self.question
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn is_host(&self) -> bool {
        self.host.is_host()
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.host.current()
    }

    pub fn controller(&self) -> Option<&HostController> {
        self.controller.as_ref()
    }

    pub fn epoch(&self) -> Epoch {
        self.guard.epoch()
    }

    pub fn pending_timers(&self) -> usize {
        self.guard.pending_len()
    }

    pub fn score(&self) -> u32 {
        self.local_score
    }

    pub fn is_opted_out(&self) -> bool {
        self.opted_out
    }

    pub fn is_focused(&self) -> bool {
        self.focus.is_focused()
    }

    pub fn answer_display(&self) -> Option<AnswerDisplay> {
        self.answer_display
    }

    pub fn state_requests_sent(&self) -> u32 {
        self.late_join.requests_sent()
    }

    /// Outgoing broadcasts, oldest first
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        let sender = self.id;
        self.outbox
            .drain(..)
            .map(|message| Envelope::new(sender, message))
            .collect()
    }

    /// Handles one envelope from the bus
    pub fn handle_envelope(&mut self, now_ms: u64, envelope: Envelope) {
        if let Err(e) = envelope.message.validate() {
            warn!("Player {} dropping event from {}: {}", self.id, envelope.sender, e);
            return;
        }
        let sender = envelope.sender;

        match envelope.message {
            Message::GameRegistered { host_id } => {
                if host_id != self.id {
                    debug!("Host {} registered; scheduling state request", host_id);
                    self.schedule_state_request(now_ms);
                }
            }

            Message::AnswerSubmitted {
                player_id,
                game_id,
                question_index,
                option_index,
                ..
            } => {
                if self.session.game_id() == Some(game_id) {
                    self.roster.mark_answered(question_index, player_id);
                }
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_answer(
                        &mut host_ctx!(self, now_ms),
                        player_id,
                        game_id,
                        question_index,
                        option_index,
                    );
                }
            }

            Message::PlayerUpdate {
                question_index,
                players_in_world,
                players_answered,
                ..
            } => {
                for player_id in &players_in_world {
                    self.roster.join(*player_id);
                }
                if let Some(index) = question_index {
                    self.roster.merge_answered(index, &players_answered);
                }
            }

            Message::StateRequest { requester_id } => {
                self.roster.join(requester_id);
                if self.host.is_host() {
                    info!("Answering state request from {}", requester_id);
                    let response = self.describe(now_ms, requester_id);
                    self.outbox.push(Message::StateResponse(response));
                }
            }

            Message::StateResponse(response) => {
                if !self.late_join.accepts(&response) {
                    return;
                }
                info!(
                    "Player {} reconciling from host {} ({})",
                    self.id, response.host_id, response.game_state
                );
                let fallback = self.session.settings.current().time_limit_ms;
                for event in translate(&response, fallback) {
                    self.apply_event(now_ms, event);
                }
            }

            Message::SettingsUpdate { host_id, .. } if sender == self.id || host_id == self.id => {
                debug!("Ignoring echo of own settings update");
            }

            Message::AwardPoints {
                player_id,
                game_id,
                question_index,
                points,
            } => {
                self.session.record_award(game_id, player_id, question_index, points);
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_award(player_id, game_id, question_index, points);
                }
            }

            Message::PlayerJoined { player_id, name } => {
                self.roster.join(player_id);
                self.roster.set_name(player_id, &name);
                self.roster_changed(now_ms);
            }

            Message::PlayerLogout { player_id } => {
                if self.roster.logout(player_id) {
                    info!("Player {} opted out", player_id);
                }
                self.roster_changed(now_ms);
            }

            Message::PlayerRejoin { player_id } => {
                if self.roster.rejoin(player_id) {
                    info!("Player {} rejoined", player_id);
                }
                self.roster_changed(now_ms);
            }

            message => match LifecycleEvent::from_message(&message) {
                Some(event) => self.apply_event(now_ms, event),
                None => debug!("No handler for {}", message.kind()),
            },
        }
    }

    fn roster_changed(&mut self, now_ms: u64) {
        if let Some(controller) = self.controller.as_mut() {
            let mut ctx = host_ctx!(self, now_ms);
            controller.broadcast_roster(&mut ctx);
            controller.close_if_complete(&mut ctx);
        }
    }

    /// The single entry point for lifecycle changes, live or reconciled
    pub fn apply_event(&mut self, now_ms: u64, event: LifecycleEvent) {
        match event {
            LifecycleEvent::HostChanged {
                new_host_id,
                old_host_id,
            } => self.apply_host_change(now_ms, new_host_id, old_host_id),

            LifecycleEvent::Settings { stamp, settings } => {
                if self.session.settings.merge(&settings, stamp) {
                    debug!("Settings now {:?}", self.session.settings.current());
                }
            }

            LifecycleEvent::GameStart { game_id, config } => {
                if self.session.on_game_start(game_id, &config).new_game() {
                    self.begin_game();
                }
            }

            LifecycleEvent::QuestionPresented {
                game_id,
                question,
                question_index,
                time_limit_ms,
                total_questions,
                elapsed_ms,
            } => {
                let admission = self.session.on_question(game_id, question_index, total_questions);
                if !admission.advanced() {
                    return;
                }
                if admission.new_game() {
                    self.begin_game();
                }
                self.install_question(PresentedQuestion {
                    game_id,
                    index: question_index,
                    question,
                    time_limit_ms,
                    total_questions,
                    presented_at_ms: now_ms.saturating_sub(elapsed_ms),
                });
            }

            LifecycleEvent::Results {
                game_id,
                question_index,
                question,
                correct_option_index,
                answer_counts,
                scores,
                show_leaderboard,
                leaderboard,
            } => {
                let view = ResultsView {
                    question_index,
                    correct_option_index,
                    answer_counts,
                    scores,
                };
                let admission = self.session.on_results(game_id, show_leaderboard, view);
                if !admission.advanced() {
                    return;
                }
                if admission.new_game() {
                    self.begin_game();
                }
                self.apply_results(
                    now_ms,
                    game_id,
                    question_index,
                    question,
                    correct_option_index,
                    show_leaderboard,
                    leaderboard,
                );
            }

            LifecycleEvent::GameEnd {
                game_id,
                final_leaderboard,
            } => {
                let admission = self.session.on_game_end(game_id);
                if !admission.advanced() {
                    return;
                }
                if admission.new_game() {
                    self.begin_game();
                }
                if let Some(board) = final_leaderboard {
                    if let Some(own) = board.iter().find(|entry| entry.player_id == self.id) {
                        self.local_score = own.score;
                    }
                    self.session.set_leaderboard(board);
                }
                self.interstitial = false;
                self.answer_display = None;
                info!("Player {} finished with {} points", self.id, self.local_score);
            }

            LifecycleEvent::Reset { game_id } => {
                if !self.session.on_reset(game_id) {
                    return;
                }
                self.guard.reset();
                self.question.clear();
                self.roster.clear_answers();
                self.local_score = 0;
                self.interstitial = false;
                self.answer_display = None;
                self.last_answer_correct = None;
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_reset();
                }
                info!("Player {} back in the lobby (epoch {})", self.id, self.guard.epoch());
            }
        }
    }

    fn apply_host_change(
        &mut self,
        now_ms: u64,
        new_host_id: PlayerId,
        old_host_id: Option<PlayerId>,
    ) {
        match self.host.apply(new_host_id, old_host_id) {
            HostTransition::Gained => {
                let controller = HostController::takeover(
                    &mut host_ctx!(self, now_ms),
                    &self.session,
                    self.question.current(),
                );
                self.controller = Some(controller);
            }
            HostTransition::Lost => {
                let dropped = self.guard.cancel_where(|task| matches!(task, Deferred::Host(_)));
                debug!("Lost host authority; dropped {} host timers", dropped);
                self.controller = None;
                self.settings_draft = None;
            }
            HostTransition::Unchanged => {}
        }
    }

    /// Local state that belongs to one game
    fn begin_game(&mut self) {
        self.local_score = 0;
        self.interstitial = false;
        self.answer_display = None;
        self.last_answer_correct = None;
        self.settings_draft = None;
    }

    fn install_question(&mut self, presented: PresentedQuestion) {
        let index = presented.index;
        if self.question.present(presented) {
            self.roster.begin_question(index);
            self.answer_display = None;
            self.last_answer_correct = None;
            self.interstitial = false;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_results(
        &mut self,
        now_ms: u64,
        game_id: GameId,
        question_index: QuestionIndex,
        question: Question,
        correct_option_index: usize,
        show_leaderboard: bool,
        leaderboard: Option<Vec<LeaderboardEntry>>,
    ) {
        if !self.question.is_current(game_id, question_index) {
            // Results for a question this phone never saw presented
            let time_limit_ms = self
                .session
                .config()
                .map_or_else(|| self.session.settings.current().time_limit_ms, |c| c.time_limit_ms);
            self.install_question(PresentedQuestion {
                game_id,
                index: question_index,
                question,
                time_limit_ms,
                total_questions: self.session.total_questions(),
                presented_at_ms: now_ms,
            });
        }
        self.interstitial = false;
        self.answer_display = None;

        if !show_leaderboard {
            if let Some(award) = self.question.award_once(question_index, correct_option_index) {
                self.local_score = self.local_score.saturating_add(award.points);
                if award.submitted {
                    self.last_answer_correct = Some(award.correct);
                    self.outbox.push(Message::AwardPoints {
                        player_id: self.id,
                        game_id,
                        question_index,
                        points: award.points,
                    });
                }
                info!(
                    "Player {} question {}: +{} (score {})",
                    self.id, question_index, award.points, self.local_score
                );
            }
            return;
        }

        self.question.settle_without_award(question_index);
        if let Some(board) = leaderboard {
            self.session.set_leaderboard(board);
        }
        self.guard.schedule(
            now_ms,
            self.config.score_resync_ms,
            Deferred::ScoreResync {
                game_id,
                question_index,
            },
        );
        self.guard.schedule(
            now_ms,
            self.config.leaderboard_hide_ms,
            Deferred::LeaderboardHide {
                game_id,
                question_index,
            },
        );
    }

    /// Runs every deferred task due at `now_ms`
    pub fn tick(&mut self, now_ms: u64) {
        for fired in self.guard.take_due(now_ms) {
            self.run_fired(now_ms, fired);
        }
    }

    /// Takes due timers off the queue without running them
    pub fn take_due_timers(&mut self, now_ms: u64) -> Vec<Fired<Deferred>> {
        self.guard.take_due(now_ms)
    }

    /// Runs a timer taken earlier if its epoch is still live
    pub fn run_fired(&mut self, now_ms: u64, fired: Fired<Deferred>) {
        let Some(task) = self.guard.admit(fired) else {
            return;
        };

        match task {
            Deferred::StateRequest => {
                let request = self.late_join.fire();
                self.outbox.push(request);
            }
            Deferred::LeaderboardHide {
                game_id,
                question_index,
            } => {
                if self.showing_leaderboard_for(game_id, question_index) {
                    debug!("Hiding leaderboard for question {}", question_index);
                    self.interstitial = true;
                }
            }
            Deferred::ScoreResync { game_id, .. } => {
                if self.session.game_id() != Some(game_id) {
                    return;
                }
                let own = self
                    .session
                    .leaderboard()
                    .iter()
                    .find(|entry| entry.player_id == self.id)
                    .map(|entry| entry.score);
                if let Some(score) = own {
                    if score != self.local_score {
                        debug!("Score resync {} -> {}", self.local_score, score);
                    }
                    self.local_score = score;
                }
            }
            Deferred::Host(task) => match self.controller.as_mut() {
                Some(controller) => controller.run(&mut host_ctx!(self, now_ms), task),
                None => debug!("Dropping {:?}; not host", task),
            },
        }
    }

    fn showing_leaderboard_for(&self, game_id: GameId, question_index: QuestionIndex) -> bool {
        self.session.phase() == GamePhase::Leaderboard
            && self.session.game_id() == Some(game_id)
            && self.session.question_index() == Some(question_index)
    }

    pub fn handle_intent(&mut self, now_ms: u64, intent: Intent) {
        match intent {
            Intent::Focus => self.focus.gain(),
            Intent::Blur => self.focus.lose(),
            Intent::SelectAnswer(slot) => self.select_answer(now_ms, slot),

            Intent::StartGame => {
                if !self.host.authorize(PrivilegedAction::StartGame) {
                    return;
                }
                if self.session.phase() != GamePhase::Waiting {
                    warn!("Cannot start a game while {}", self.session.phase());
                    return;
                }
                let settings = self.session.settings.current();
                if let Some(controller) = self.controller.as_mut() {
                    controller.start_game(&mut host_ctx!(self, now_ms), &settings);
                }
            }

            Intent::OpenSettings => {
                if !self.host.authorize(PrivilegedAction::OpenSettings) {
                    return;
                }
                if self.session.phase() != GamePhase::Waiting {
                    warn!("Settings are locked while {}", self.session.phase());
                    return;
                }
                self.settings_draft = Some(self.session.settings.current());
            }

            Intent::ConfirmSettings(settings) => {
                if !self.host.authorize(PrivilegedAction::ConfirmSettings) {
                    return;
                }
                if let Err(e) = settings.validate() {
                    warn!("Rejecting settings: {}", e);
                    return;
                }
                let stamp = self.session.settings.write_local(self.id, &settings);
                info!("Settings revision {}: {:?}", stamp.revision, settings);
                self.outbox.push(Message::SettingsUpdate {
                    host_id: self.id,
                    revision: stamp.revision,
                    settings,
                });
                self.settings_draft = None;
            }

            Intent::CancelSettings => self.settings_draft = None,

            Intent::Logout => {
                if self.opted_out {
                    return;
                }
                self.opted_out = true;
                self.roster.logout(self.id);
                self.outbox.push(Message::PlayerLogout { player_id: self.id });
            }

            Intent::Rejoin => {
                if !self.opted_out {
                    return;
                }
                self.opted_out = false;
                self.roster.rejoin(self.id);
                self.outbox.push(Message::PlayerRejoin { player_id: self.id });
            }

            Intent::TransferHost(target) => {
                if !self.host.authorize(PrivilegedAction::TransferHost) {
                    return;
                }
                if target == self.id {
                    return;
                }
                if !self.roster.contains(target) {
                    warn!("Cannot hand host to unknown player {}", target);
                    return;
                }
                info!("Handing host authority to {}", target);
                self.outbox.push(Message::HostChanged {
                    new_host_id: target,
                    old_host_id: Some(self.id),
                });
                self.apply_host_change(now_ms, target, Some(self.id));
            }

            Intent::ResetGame => {
                if !self.host.authorize(PrivilegedAction::ResetGame) {
                    return;
                }
                let game_id = self.session.game_id();
                match self.controller.as_mut() {
                    Some(controller) => {
                        controller.reset_game(&mut host_ctx!(self, now_ms), game_id)
                    }
                    None => self.outbox.push(Message::GameReset {
                        host_id: self.id,
                        game_id,
                    }),
                }
            }
        }
    }

    fn select_answer(&mut self, now_ms: u64, slot: usize) {
        if !self.focus.is_focused() {
            debug!("Ignoring answer while unfocused");
            return;
        }
        if self.opted_out {
            debug!("Ignoring answer while opted out");
            return;
        }
        let Some(game_id) = self.session.game_id() else {
            return;
        };
        if self.session.phase() != GamePhase::Playing {
            debug!("Ignoring answer while {}", self.session.phase());
            return;
        }

        let submission = match self.question.select(slot, now_ms) {
            Ok(submission) => submission,
            Err(rejection) => {
                debug!("Answer rejected: {:?}", rejection);
                return;
            }
        };

        let display = advisory_display(self.roster.answered_excluding(self.id), self.roster.size());
        self.roster.mark_answered(submission.question_index, self.id);
        self.answer_display = Some(display);

        info!(
            "Player {} answered option {} after {}ms",
            self.id, submission.option_index, submission.response_time_ms
        );
        self.outbox.push(Message::AnswerSubmitted {
            player_id: self.id,
            game_id,
            question_index: submission.question_index,
            option_index: submission.option_index,
            response_time_ms: submission.response_time_ms,
        });
    }

    /// The host's view of the session for a late joiner
    fn describe(&self, now_ms: u64, requester_id: PlayerId) -> StateResponse {
        let phase = self.session.phase();
        let question = self.question.current().filter(|_| phase != GamePhase::Waiting);
        let results = self.session.results();
        let leaderboard = self.session.leaderboard();

        StateResponse {
            requester_id,
            host_id: self.id,
            game_state: phase,
            game_id: self.session.game_id(),
            current_question: question.map(|q| q.question.clone()),
            question_index: self.session.question_index(),
            total_questions: Some(self.session.total_questions()).filter(|total| *total > 0),
            time_limit_ms: question.map(|q| q.time_limit_ms),
            elapsed_ms: question
                .filter(|_| phase == GamePhase::Playing)
                .map(|q| q.elapsed_ms(now_ms)),
            correct_option_index: results.map(|r| r.correct_option_index),
            answer_counts: results.map(|r| r.answer_counts.clone()),
            show_leaderboard: Some(phase == GamePhase::Leaderboard),
            leaderboard_data: (!leaderboard.is_empty()).then(|| leaderboard.to_vec()),
            settings: Some(self.session.settings.current()),
        }
    }

    pub fn screen(&self) -> Screen {
        if self.opted_out {
            return Screen::OptedOut;
        }
        if self.settings_draft.is_some() && self.host.is_host() {
            return Screen::Settings;
        }
        match self.session.phase() {
            GamePhase::Waiting => Screen::Lobby,
            GamePhase::Playing => match (self.question.current(), self.answer_display) {
                (None, _) => Screen::Interstitial,
                (Some(_), Some(AnswerDisplay::AwaitingOthers)) if self.question.answered() => {
                    Screen::Submitted
                }
                (Some(_), _) => Screen::Question,
            },
            GamePhase::Results => Screen::Results,
            GamePhase::Leaderboard if self.interstitial => Screen::Interstitial,
            GamePhase::Leaderboard => Screen::Leaderboard,
            GamePhase::Ended => Screen::Ended,
        }
    }

    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        let phase = self.session.phase();
        let question = self.question.current().filter(|_| phase != GamePhase::Waiting).map(|q| {
            let count = q.option_count();
            let results = self
                .session
                .results()
                .filter(|r| r.question_index == q.index && phase != GamePhase::Playing);
            QuestionView {
                index: q.index,
                total: q.total_questions,
                prompt: q.question.prompt.clone(),
                slots: QuestionView::slot_labels(&q.question.options),
                remaining_ms: if phase == GamePhase::Playing {
                    q.remaining_ms(now_ms)
                } else {
                    0
                },
                selected_slot: self
                    .question
                    .submission()
                    .and_then(|s| ui_slot(s.option_index, count)),
                correct_slot: results.and_then(|r| ui_slot(r.correct_option_index, count)),
                answer_counts: results.map(|r| r.answer_counts.clone()).unwrap_or_default(),
            }
        });

        Snapshot {
            player_id: self.id,
            screen: self.screen(),
            is_host: self.host.is_host(),
            host_id: self.host.current(),
            score: self.local_score,
            question,
            last_answer_correct: self.last_answer_correct,
            leaderboard: leaderboard_rows(self.session.leaderboard(), self.id, |id| {
                self.roster.display_name(id)
            }),
            settings: self.session.settings.current(),
            settings_draft: self.settings_draft.clone(),
            players_in_world: self.roster.size(),
            players_answered: self.roster.answered_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Stamp;
    use shared::GameConfig;
    use std::collections::BTreeMap;

    const GAME: GameId = GameId(42);

    fn phone(id: u32) -> Phone {
        Phone::new(
            PlayerId(id),
            &format!("P{}", id),
            SessionConfig::default(),
            QuestionBank::builtin(),
        )
    }

    fn question() -> Question {
        Question {
            prompt: "Largest planet?".to_string(),
            options: vec!["Mars".into(), "Jupiter".into(), "Venus".into(), "Earth".into()],
            correct_option_index: 1,
        }
    }

    fn from(sender: u32, message: Message) -> Envelope {
        Envelope::new(PlayerId(sender), message)
    }

    fn presented(index: QuestionIndex) -> Message {
        Message::QuestionPresented {
            game_id: GAME,
            question: question(),
            question_index: index,
            time_limit_ms: 30_000,
            total_questions: 5,
            option_count: 4,
        }
    }

    fn results(
        index: QuestionIndex,
        show_leaderboard: bool,
        board: Option<Vec<LeaderboardEntry>>,
    ) -> Message {
        Message::Results {
            game_id: GAME,
            question_index: index,
            question: question(),
            correct_option_index: 1,
            answer_counts: vec![0, 1, 0, 0],
            scores: BTreeMap::new(),
            show_leaderboard,
            leaderboard_data: board,
        }
    }

    fn hand_host(from_id: u32, to_id: u32) -> Envelope {
        from(
            from_id,
            Message::HostChanged {
                new_host_id: PlayerId(to_id),
                old_host_id: Some(PlayerId(from_id)),
            },
        )
    }

    fn playing_phone(id: u32) -> Phone {
        let mut phone = phone(id);
        phone.handle_envelope(
            0,
            from(
                1,
                Message::GameStart {
                    host_id: PlayerId(1),
                    game_id: GAME,
                    config: GameConfig {
                        time_limit_ms: 30_000,
                        category: "general".into(),
                        difficulty: shared::Difficulty::Medium,
                        num_questions: 5,
                    },
                },
            ),
        );
        phone.handle_envelope(0, from(1, presented(0)));
        phone
    }

    #[test]
    fn test_answer_and_award_once() {
        let mut phone = playing_phone(3);
        phone.handle_intent(5_000, Intent::SelectAnswer(1));
        let sent = phone.drain_outbox();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.kind(), "AnswerSubmitted");

        phone.handle_envelope(6_000, from(1, results(0, false, None)));
        phone.handle_envelope(6_100, from(1, results(0, false, None)));
        assert_eq!(phone.score(), 833);
        assert_eq!(phone.screen(), Screen::Results);

        let awards: Vec<Envelope> = phone.drain_outbox();
        assert_eq!(awards.len(), 1);
        assert!(matches!(
            awards[0].message,
            Message::AwardPoints { points: 833, question_index: 0, .. }
        ));
    }

    #[test]
    fn test_leaderboard_results_never_award() {
        let mut phone = playing_phone(3);
        phone.handle_intent(1_000, Intent::SelectAnswer(1));
        phone.handle_envelope(2_000, from(1, results(0, true, None)));
        phone.handle_envelope(2_100, from(1, results(0, false, None)));
        assert_eq!(phone.score(), 0);
    }

    #[test]
    fn test_unfocused_phone_ignores_selection() {
        let mut phone = playing_phone(3);
        phone.handle_intent(100, Intent::Blur);
        phone.handle_intent(200, Intent::SelectAnswer(1));
        assert!(!phone.question_lifecycle().answered());

        phone.handle_intent(300, Intent::Focus);
        phone.handle_intent(400, Intent::SelectAnswer(1));
        assert!(phone.question_lifecycle().answered());
    }

    #[test]
    fn test_submitted_screen_until_others_answer() {
        let mut phone = playing_phone(3);
        let joined = Message::PlayerJoined {
            player_id: PlayerId(4),
            name: "D".into(),
        };
        phone.handle_envelope(0, from(4, joined));
        phone.handle_intent(1_000, Intent::SelectAnswer(0));
        assert_eq!(phone.answer_display(), Some(AnswerDisplay::AwaitingOthers));
        assert_eq!(phone.screen(), Screen::Submitted);

        let mut solo = playing_phone(5);
        solo.handle_intent(1_000, Intent::SelectAnswer(0));
        assert_eq!(solo.answer_display(), Some(AnswerDisplay::LastExpected));
        assert_eq!(solo.screen(), Screen::Question);
    }

    #[test]
    fn test_leaderboard_hide_and_resync() {
        let mut phone = playing_phone(3);
        phone.handle_intent(1_000, Intent::SelectAnswer(1));
        phone.handle_envelope(2_000, from(1, results(0, false, None)));
        let board = vec![LeaderboardEntry {
            player_id: PlayerId(3),
            name: "P3".into(),
            score: 900,
        }];
        phone.handle_envelope(6_000, from(1, results(0, true, Some(board))));
        assert_eq!(phone.screen(), Screen::Leaderboard);

        phone.tick(7_000);
        assert_eq!(phone.score(), 900);
        phone.tick(11_000);
        assert_eq!(phone.screen(), Screen::Interstitial);
    }

    #[test]
    fn test_reset_cancels_timers_and_advances_epoch() {
        let mut phone = playing_phone(3);
        phone.handle_envelope(2_000, from(1, results(0, true, None)));
        assert_eq!(phone.pending_timers(), 2);

        let reset = from(
            1,
            Message::GameReset {
                host_id: PlayerId(1),
                game_id: Some(GAME),
            },
        );
        phone.handle_envelope(3_000, reset.clone());
        assert_eq!(phone.epoch(), 1);
        assert_eq!(phone.pending_timers(), 0);
        assert_eq!(phone.screen(), Screen::Lobby);

        phone.handle_envelope(3_100, reset);
        assert_eq!(phone.epoch(), 1);
    }

    #[test]
    fn test_settings_echo_suppressed() {
        let mut phone = phone(1);
        phone.start(0, true);
        let custom = Settings {
            num_questions: 8,
            ..Settings::default()
        };
        phone.handle_intent(10, Intent::ConfirmSettings(custom.clone()));
        let older = Settings {
            num_questions: 3,
            ..Settings::default()
        };
        let update = Message::SettingsUpdate {
            host_id: PlayerId(1),
            revision: 5,
            settings: older,
        };
        phone.handle_envelope(20, from(1, update));
        assert_eq!(phone.session().settings.current(), custom);
    }

    #[test]
    fn test_non_host_intents_refused() {
        let mut phone = phone(2);
        phone.handle_intent(0, Intent::StartGame);
        phone.handle_intent(0, Intent::ResetGame);
        phone.handle_intent(0, Intent::ConfirmSettings(Settings::default()));
        assert!(phone.drain_outbox().is_empty());
    }

    #[test]
    fn test_malformed_event_keeps_screen() {
        let mut phone = playing_phone(3);
        let mut bad = question();
        bad.options.truncate(3);
        phone.handle_envelope(
            100,
            from(
                1,
                Message::QuestionPresented {
                    game_id: GAME,
                    question: bad,
                    question_index: 1,
                    time_limit_ms: 30_000,
                    total_questions: 5,
                    option_count: 3,
                },
            ),
        );
        assert_eq!(phone.session().question_index(), Some(0));
        assert_eq!(phone.screen(), Screen::Question);
    }

    #[test]
    fn test_late_join_requests_state_after_delay() {
        let mut phone = phone(7);
        phone.start(0, false);
        phone.drain_outbox();

        phone.tick(999);
        assert!(phone.drain_outbox().is_empty());
        phone.tick(1_000);
        let sent = phone.drain_outbox();
        assert!(matches!(sent[0].message, Message::StateRequest { requester_id: PlayerId(7) }));
    }

    #[test]
    fn test_settings_from_late_join_lose_to_live_update() {
        let mut phone = phone(7);
        let live = Settings {
            num_questions: 9,
            ..Settings::default()
        };
        phone.apply_event(
            0,
            LifecycleEvent::Settings {
                stamp: Stamp {
                    revision: 2,
                    writer: PlayerId(1),
                },
                settings: live.clone(),
            },
        );
        phone.apply_event(
            0,
            LifecycleEvent::Settings {
                stamp: Stamp {
                    revision: 0,
                    writer: PlayerId(1),
                },
                settings: Settings::default(),
            },
        );
        assert_eq!(phone.session().settings.current(), live);
    }

    #[test]
    fn test_host_takeover_with_extreme_time_limit() {
        let mut phone = playing_phone(2);
        phone.handle_envelope(
            100,
            from(
                1,
                Message::QuestionPresented {
                    game_id: GAME,
                    question: question(),
                    question_index: 1,
                    time_limit_ms: u64::MAX,
                    total_questions: 5,
                    option_count: 4,
                },
            ),
        );
        phone.handle_envelope(200, hand_host(1, 2));

        assert!(phone.is_host());
        assert_eq!(phone.controller().and_then(|c| c.game_id()), Some(GAME));
        assert_eq!(phone.pending_timers(), 1);
    }

    #[test]
    fn test_start_game_with_extreme_time_limit() {
        let mut phone = phone(1);
        phone.start(0, true);
        let settings = Settings {
            time_limit_ms: u64::MAX,
            ..Settings::default()
        };
        phone.handle_intent(10, Intent::ConfirmSettings(settings));
        phone.drain_outbox();

        phone.handle_intent(20, Intent::StartGame);
        let kinds: Vec<&str> = phone.drain_outbox().iter().map(|e| e.message.kind()).collect();
        assert!(kinds.contains(&"QuestionPresented"));
        assert!(phone.controller().is_some_and(|c| c.is_running()));
    }

    #[test]
    fn test_awards_seen_before_takeover_count() {
        let mut phone = playing_phone(2);
        phone.handle_envelope(2_000, from(1, results(0, false, None)));
        let award = |player: u32| {
            from(
                player,
                Message::AwardPoints {
                    player_id: PlayerId(player),
                    game_id: GAME,
                    question_index: 0,
                    points: 966,
                },
            )
        };
        phone.handle_envelope(2_100, award(1));
        phone.handle_envelope(2_200, award(1));
        phone.handle_envelope(2_300, award(3));

        phone.handle_envelope(2_400, hand_host(1, 2));
        let tally = phone.controller().map(|c| c.tally()).unwrap_or_default();
        assert_eq!(tally.get(&PlayerId(1)), Some(&966));
        assert_eq!(tally.get(&PlayerId(3)), Some(&966));

        // A late copy of an award already counted changes nothing
        phone.handle_envelope(2_500, award(3));
        let tally = phone.controller().map(|c| c.tally()).unwrap_or_default();
        assert_eq!(tally.get(&PlayerId(3)), Some(&966));
    }

    #[test]
    fn test_lobby_reset_without_game_id_keeps_epoch() {
        let mut phone = phone(7);
        phone.start(0, false);
        let reset = Message::GameReset {
            host_id: PlayerId(1),
            game_id: None,
        };
        phone.handle_envelope(500, from(1, reset));

        // Already in the lobby: the reset is a repeat and the state request survives
        assert_eq!(phone.epoch(), 0);
        assert_eq!(phone.pending_timers(), 1);
    }
}
