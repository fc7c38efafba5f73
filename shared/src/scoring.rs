//! Response-time scoring shared by every participant
//!
//! A correct answer is worth `999 - 33.3 * t` points where `t` is the response
//! time in seconds, rounded half-up and never less than 1. Answers at or past
//! the time limit still earn the minimum reward; wrong answers earn nothing.
//!
//! The formula is evaluated in integer ten-thousandths so every participant
//! arrives at exactly the same value for the same input.

/// Points for an instant correct answer
pub const MAX_POINTS: u32 = 999;

/// Reward for a correct answer that scores below 1 or arrives late
pub const MIN_POINTS: u32 = 1;

/// Points lost per second, expressed in tenths (33.3 points/s)
const DECAY_TENTHS_PER_SECOND: i64 = 333;

/// Scale factor: milliseconds * tenths → ten-thousandths of a point
const SCALE: i64 = 10_000;

/// Scores a single answer.
pub fn points(correct: bool, response_time_ms: u64, time_limit_ms: u64) -> u32 {
    if !correct {
        return 0;
    }
    if response_time_ms >= time_limit_ms {
        return MIN_POINTS;
    }

    let elapsed = i64::try_from(response_time_ms).unwrap_or(i64::MAX / SCALE);
    let scaled = MAX_POINTS as i64 * SCALE - DECAY_TENTHS_PER_SECOND * elapsed;
    if scaled <= 0 {
        return MIN_POINTS;
    }

    let rounded = (scaled + SCALE / 2) / SCALE;
    (rounded as u32).max(MIN_POINTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const LIMIT_30S: u64 = 30_000;

    #[test]
    fn test_instant_answer_scores_maximum() {
        assert_eq!(points(true, 0, LIMIT_30S), 999);
    }

    #[test]
    fn test_reference_values() {
        assert_eq!(points(true, 5_000, LIMIT_30S), 833);
        assert_eq!(points(true, 10_000, LIMIT_30S), 666);
    }

    #[test]
    fn test_at_and_past_limit_earns_minimum() {
        assert_eq!(points(true, 30_000, LIMIT_30S), 1);
        assert_eq!(points(true, 35_000, LIMIT_30S), 1);
    }

    #[test]
    fn test_wrong_answer_scores_zero() {
        assert_eq!(points(false, 0, LIMIT_30S), 0);
        assert_eq!(points(false, 12_345, LIMIT_30S), 0);
        assert_eq!(points(false, 99_999, 1_000), 0);
    }

    #[test]
    fn test_long_limit_floors_at_minimum() {
        // 60s limit: past the 30s mark the raw formula goes negative
        assert_eq!(points(true, 29_999, 60_000), 1);
        assert_eq!(points(true, 45_000, 60_000), 1);
    }

    #[test]
    fn test_points_decrease_monotonically() {
        let mut previous = points(true, 0, LIMIT_30S);
        for ms in (0..LIMIT_30S).step_by(250) {
            let current = points(true, ms, LIMIT_30S);
            assert!(current <= previous, "{}ms scored above {}", ms, previous);
            assert!(current >= MIN_POINTS);
            previous = current;
        }
    }

    #[test]
    fn test_matches_float_formula_away_from_half_points() {
        for ms in [1_234u64, 7_777, 12_001, 20_500, 28_000] {
            let t = ms as f64 / 1000.0;
            let expected = (-33.3 * t + 999.0).max(1.0);
            assert_approx_eq!(points(true, ms, LIMIT_30S) as f64, expected, 0.5);
        }
    }
}
