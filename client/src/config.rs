//! Protocol timings for a phone and its host driver

/// All delays are in milliseconds on the phone's local clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wait before asking the host for a state snapshot after startup
    pub state_request_delay_ms: u64,
    /// How long the leaderboard stays up before the interstitial
    pub leaderboard_hide_ms: u64,
    /// Delay before adopting the host's leaderboard total as the local score
    pub score_resync_ms: u64,
    /// Host: time between closing a question and showing the leaderboard
    pub results_display_ms: u64,
    /// Host: time the leaderboard is shown before the next question
    pub leaderboard_display_ms: u64,
    /// Host: extra time past the limit for in-flight answers
    pub answer_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_request_delay_ms: 1_000,
            leaderboard_hide_ms: 5_000,
            score_resync_ms: 1_000,
            results_display_ms: 4_000,
            leaderboard_display_ms: 5_000,
            answer_grace_ms: 500,
        }
    }
}
