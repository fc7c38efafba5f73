//! Late-join state reconciliation
//!
//! A phone that starts mid-game asks the host for a snapshot after a short
//! settle delay. The answer is broadcast, so every phone sees every response
//! and keeps only the one addressed to it. A response is never applied
//! directly: [`translate`] turns it into the canonical lifecycle events a live
//! phone would have received, and those go through the normal handlers.

use crate::epoch::{ResetGuard, TimerId};
use crate::event::LifecycleEvent;
use crate::settings::Stamp;
use log::{debug, info, warn};
use shared::{GamePhase, Message, PlayerId, StateResponse};

#[derive(Debug, Clone)]
pub struct LateJoinReconciler {
    local_id: PlayerId,
    pending: Option<TimerId>,
    requests_sent: u32,
}

impl LateJoinReconciler {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            pending: None,
            requests_sent: 0,
        }
    }

    /// Schedules a StateRequest, replacing any request still waiting
    pub fn schedule<T>(&mut self, guard: &mut ResetGuard<T>, now_ms: u64, delay_ms: u64, task: T) {
        if let Some(previous) = self.pending.take() {
            guard.cancel(previous);
        }
        self.pending = Some(guard.schedule(now_ms, delay_ms, task));
    }

    pub fn is_pending<T>(&self, guard: &ResetGuard<T>) -> bool {
        self.pending.is_some_and(|id| guard.is_pending(id))
    }

    /// Builds the request once its timer fires
    pub fn fire(&mut self) -> Message {
        self.pending = None;
        self.requests_sent += 1;
        info!("Player {} requesting session state", self.local_id);
        Message::StateRequest {
            requester_id: self.local_id,
        }
    }

    pub fn requests_sent(&self) -> u32 {
        self.requests_sent
    }

    /// Only responses addressed to this phone are used
    pub fn accepts(&self, response: &StateResponse) -> bool {
        if response.requester_id != self.local_id {
            debug!(
                "Discarding state response for {} (we are {})",
                response.requester_id, self.local_id
            );
            return false;
        }
        true
    }
}

/// Translates a host snapshot into canonical lifecycle events.
///
/// Fields missing for the described phase make the snapshot unusable for that
/// phase; the host and settings events are still returned.
pub fn translate(response: &StateResponse, fallback_time_limit_ms: u64) -> Vec<LifecycleEvent> {
    let mut events = vec![LifecycleEvent::HostChanged {
        new_host_id: response.host_id,
        old_host_id: None,
    }];

    if let Some(settings) = &response.settings {
        // Revision 0 loses to any live update already merged
        events.push(LifecycleEvent::Settings {
            stamp: Stamp {
                revision: 0,
                writer: response.host_id,
            },
            settings: settings.clone(),
        });
    }

    match phase_event(response, fallback_time_limit_ms) {
        Ok(event) => events.push(event),
        Err(missing) => warn!(
            "State response for phase {} is missing {}; keeping current screen",
            response.game_state, missing
        ),
    }
    events
}

fn phase_event(
    response: &StateResponse,
    fallback_time_limit_ms: u64,
) -> Result<LifecycleEvent, &'static str> {
    let event = match response.game_state {
        GamePhase::Waiting => LifecycleEvent::Reset { game_id: None },
        GamePhase::Playing => {
            let game_id = response.game_id.ok_or("game id")?;
            let question = response.current_question.clone().ok_or("current question")?;
            let question_index = response.question_index.ok_or("question index")?;
            LifecycleEvent::QuestionPresented {
                game_id,
                question,
                question_index,
                time_limit_ms: response.time_limit_ms.unwrap_or(fallback_time_limit_ms),
                total_questions: response
                    .total_questions
                    .unwrap_or(question_index.saturating_add(1))
                    .max(question_index.saturating_add(1)),
                elapsed_ms: response.elapsed_ms.unwrap_or(0),
            }
        }
        GamePhase::Results | GamePhase::Leaderboard => {
            let game_id = response.game_id.ok_or("game id")?;
            let question = response.current_question.clone().ok_or("current question")?;
            let question_index = response.question_index.ok_or("question index")?;
            let show_leaderboard = response.game_state == GamePhase::Leaderboard
                || response.show_leaderboard.unwrap_or(false);
            let correct_option_index = response
                .correct_option_index
                .unwrap_or(question.correct_option_index);
            LifecycleEvent::Results {
                game_id,
                question_index,
                correct_option_index,
                question,
                answer_counts: response.answer_counts.clone().unwrap_or_default(),
                scores: Default::default(),
                show_leaderboard,
                leaderboard: response.leaderboard_data.clone(),
            }
        }
        GamePhase::Ended => LifecycleEvent::GameEnd {
            game_id: response.game_id.ok_or("game id")?,
            final_leaderboard: response.leaderboard_data.clone(),
        },
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameId, Question, Settings};

    fn empty_response(requester: u32, phase: GamePhase) -> StateResponse {
        StateResponse {
            requester_id: PlayerId(requester),
            host_id: PlayerId(1),
            game_state: phase,
            game_id: None,
            current_question: None,
            question_index: None,
            total_questions: None,
            time_limit_ms: None,
            elapsed_ms: None,
            correct_option_index: None,
            answer_counts: None,
            show_leaderboard: None,
            leaderboard_data: None,
            settings: None,
        }
    }

    fn question() -> Question {
        Question {
            prompt: "2 + 2?".to_string(),
            options: vec!["3".into(), "4".into(), "5".into(), "22".into()],
            correct_option_index: 1,
        }
    }

    #[test]
    fn test_only_own_responses_accepted() {
        let reconciler = LateJoinReconciler::new(PlayerId(4));
        assert!(reconciler.accepts(&empty_response(4, GamePhase::Waiting)));
        assert!(!reconciler.accepts(&empty_response(5, GamePhase::Waiting)));
    }

    #[test]
    fn test_schedule_replaces_pending_request() {
        let mut guard: ResetGuard<&str> = ResetGuard::new();
        let mut reconciler = LateJoinReconciler::new(PlayerId(4));

        reconciler.schedule(&mut guard, 0, 1_000, "request");
        reconciler.schedule(&mut guard, 500, 1_000, "request");
        assert_eq!(guard.pending_len(), 1);
        assert!(reconciler.is_pending(&guard));
        assert_eq!(guard.next_due(), Some(1_500));

        match reconciler.fire() {
            Message::StateRequest { requester_id } => assert_eq!(requester_id, PlayerId(4)),
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(reconciler.requests_sent(), 1);
    }

    #[test]
    fn test_playing_translates_to_question_presented() {
        let mut response = empty_response(4, GamePhase::Playing);
        response.game_id = Some(GameId(11));
        response.current_question = Some(question());
        response.question_index = Some(2);
        response.total_questions = Some(5);
        response.time_limit_ms = Some(30_000);
        response.elapsed_ms = Some(4_000);

        let events = translate(&response, 20_000);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            LifecycleEvent::QuestionPresented {
                game_id: GameId(11),
                question: question(),
                question_index: 2,
                time_limit_ms: 30_000,
                total_questions: 5,
                elapsed_ms: 4_000,
            }
        );
    }

    #[test]
    fn test_leaderboard_translates_to_flagged_results() {
        let mut response = empty_response(4, GamePhase::Leaderboard);
        response.game_id = Some(GameId(11));
        response.current_question = Some(question());
        response.question_index = Some(1);

        let events = translate(&response, 30_000);
        match &events[1] {
            LifecycleEvent::Results {
                show_leaderboard,
                correct_option_index,
                ..
            } => {
                assert!(*show_leaderboard);
                assert_eq!(*correct_option_index, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_waiting_translates_to_reset() {
        let events = translate(&empty_response(4, GamePhase::Waiting), 30_000);
        assert_eq!(events[1], LifecycleEvent::Reset { game_id: None });
    }

    #[test]
    fn test_missing_fields_keep_only_host_and_settings() {
        let mut response = empty_response(4, GamePhase::Playing);
        response.settings = Some(Settings::default());

        let events = translate(&response, 30_000);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LifecycleEvent::HostChanged { .. }));
        assert!(matches!(events[1], LifecycleEvent::Settings { .. }));
    }
}
