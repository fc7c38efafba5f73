//! Per-question local state: the presented question, this phone's answer and
//! the one-shot award guard.
//!
//! The award guard is an explicit state machine. A question opens it when
//! presented, the first non-leaderboard Results settles it, and only the next
//! presented question opens it again. Duplicate or late Results deliveries
//! find it settled and award nothing.

use log::debug;
use shared::{points, GameId, Question, QuestionIndex, UI_SLOTS};

/// A question as this phone received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedQuestion {
    pub game_id: GameId,
    pub index: QuestionIndex,
    pub question: Question,
    pub time_limit_ms: u64,
    pub total_questions: u32,
    /// Local clock reading when the question appeared
    pub presented_at_ms: u64,
}

impl PresentedQuestion {
    pub fn option_count(&self) -> usize {
        self.question.options.len()
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.presented_at_ms)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.time_limit_ms.saturating_sub(self.elapsed_ms(now_ms))
    }
}

/// The answer this phone broadcast for the current question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub question_index: QuestionIndex,
    pub option_index: usize,
    pub response_time_ms: u64,
}

/// Transient display chosen right after answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerDisplay {
    /// Show the "waiting for others" screen
    AwaitingOthers,
    /// Probably the last answer; stay on the question until Results
    LastExpected,
}

/// Advisory guess whether this answer completes the round. Never gates Results.
pub fn advisory_display(answered_so_far: usize, roster_size: usize) -> AnswerDisplay {
    if answered_so_far + 1 >= roster_size {
        AnswerDisplay::LastExpected
    } else {
        AnswerDisplay::AwaitingOthers
    }
}

/// Maps a screen slot to a canonical option index.
///
/// Four-option questions use slots 0-3 directly; two-option questions sit in
/// slots 2 and 3.
pub fn canonical_option(slot: usize, option_count: usize) -> Option<usize> {
    match option_count {
        4 if slot < UI_SLOTS => Some(slot),
        2 if slot == 2 || slot == 3 => Some(slot - 2),
        _ => None,
    }
}

/// Inverse of [`canonical_option`]
pub fn ui_slot(option_index: usize, option_count: usize) -> Option<usize> {
    match option_count {
        4 if option_index < 4 => Some(option_index),
        2 if option_index < 2 => Some(option_index + 2),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardState {
    Idle,
    Open(QuestionIndex),
    Settled { index: QuestionIndex, points: u32 },
}

/// Outcome of settling the award guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    pub index: QuestionIndex,
    pub points: u32,
    pub correct: bool,
    /// Whether this phone answered at all
    pub submitted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectRejection {
    NoQuestion,
    AlreadyAnswered,
    InvalidSlot(usize),
}

#[derive(Debug, Clone)]
pub struct QuestionLifecycle {
    current: Option<PresentedQuestion>,
    submission: Option<Submission>,
    award: AwardState,
}

impl QuestionLifecycle {
    pub fn new() -> Self {
        Self {
            current: None,
            submission: None,
            award: AwardState::Idle,
        }
    }

    /// Installs a new question, clearing the previous answer.
    ///
    /// Returns false, changing nothing, if this exact question is already
    /// current.
    pub fn present(&mut self, presented: PresentedQuestion) -> bool {
        if let Some(current) = &self.current {
            if current.game_id == presented.game_id && current.index == presented.index {
                return false;
            }
        }
        self.award = AwardState::Open(presented.index);
        self.submission = None;
        self.current = Some(presented);
        true
    }

    pub fn current(&self) -> Option<&PresentedQuestion> {
        self.current.as_ref()
    }

    pub fn is_current(&self, game_id: GameId, index: QuestionIndex) -> bool {
        self.current
            .as_ref()
            .is_some_and(|q| q.game_id == game_id && q.index == index)
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn answered(&self) -> bool {
        self.submission.is_some()
    }

    pub fn award_state(&self) -> AwardState {
        self.award
    }

    /// Records this phone's answer for the current question
    pub fn select(&mut self, slot: usize, now_ms: u64) -> Result<Submission, SelectRejection> {
        let current = self.current.as_ref().ok_or(SelectRejection::NoQuestion)?;
        if self.submission.is_some() {
            return Err(SelectRejection::AlreadyAnswered);
        }
        let option_index = canonical_option(slot, current.option_count())
            .ok_or(SelectRejection::InvalidSlot(slot))?;

        let submission = Submission {
            question_index: current.index,
            option_index,
            response_time_ms: current.elapsed_ms(now_ms),
        };
        self.submission = Some(submission);
        Ok(submission)
    }

    /// AwardOnce(index): settles the guard and scores this phone's answer.
    ///
    /// Returns None when the guard is not open for `index`.
    pub fn award_once(
        &mut self,
        index: QuestionIndex,
        correct_option_index: usize,
    ) -> Option<Award> {
        match self.award {
            AwardState::Open(open) if open == index => {}
            AwardState::Settled { index: settled, .. } if settled == index => {
                debug!("Question {} already awarded", index);
                return None;
            }
            other => {
                debug!("No open award for question {} ({:?})", index, other);
                return None;
            }
        }

        let time_limit_ms = self.current.as_ref().map_or(0, |q| q.time_limit_ms);
        let award = match self.submission {
            Some(submission) if submission.question_index == index => {
                let correct = submission.option_index == correct_option_index;
                Award {
                    index,
                    points: points(correct, submission.response_time_ms, time_limit_ms),
                    correct,
                    submitted: true,
                }
            }
            _ => Award {
                index,
                points: 0,
                correct: false,
                submitted: false,
            },
        };

        self.award = AwardState::Settled {
            index,
            points: award.points,
        };
        Some(award)
    }

    /// Closes an open guard without awarding (first delivery was leaderboard-flagged)
    pub fn settle_without_award(&mut self, index: QuestionIndex) {
        if self.award == AwardState::Open(index) {
            self.award = AwardState::Settled { index, points: 0 };
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.submission = None;
        self.award = AwardState::Idle;
    }
}

impl Default for QuestionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
