//! Speaking-duration estimate used to pace page turns.
//!
//! words / (base_wpm * rate) minutes. This is a pacing heuristic, not a
//! measurement of the speech server's playback.

use std::time::Duration;

use crate::text::word_count;

/// Baseline words per minute at rate 1.0.
pub const DEFAULT_BASE_WPM: f64 = 180.0;

#[derive(Debug, Clone, Copy)]
pub struct DurationEstimator {
    base_wpm: f64,
}

impl DurationEstimator {
    /// Non-positive or non-finite baselines fall back to [`DEFAULT_BASE_WPM`].
    pub fn new(base_wpm: f64) -> Self {
        let base_wpm = if base_wpm.is_finite() && base_wpm > 0.0 {
            base_wpm
        } else {
            DEFAULT_BASE_WPM
        };
        Self { base_wpm }
    }

    pub fn base_wpm(&self) -> f64 {
        self.base_wpm
    }

    /// Estimated time to speak `text` at the given rate multiplier.
    pub fn estimate(&self, text: &str, rate: f64) -> Duration {
        let words = word_count(text) as f64;

        let mut wpm = self.base_wpm * rate;
        if !wpm.is_finite() || wpm <= 0.0 {
            wpm = self.base_wpm;
        }

        // Vanishingly small rates would overflow Duration
        Duration::try_from_secs_f64(words / wpm * 60.0).unwrap_or(Duration::MAX)
    }
}

impl Default for DurationEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_WPM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_words_at_baseline() {
        let est = DurationEstimator::new(180.0);
        let d = est.estimate("Hello world", 1.0);
        assert!((d.as_secs_f64() - 2.0 / 180.0 * 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_is_zero() {
        let est = DurationEstimator::default();
        for rate in [0.5, 1.0, 3.0] {
            assert_eq!(est.estimate("", rate), Duration::ZERO);
        }
    }

    #[test]
    fn test_monotonic_in_words() {
        let est = DurationEstimator::default();
        let mut text = String::new();
        let mut last = Duration::ZERO;
        for _ in 0..50 {
            text.push_str("word ");
            let d = est.estimate(&text, 1.3);
            assert!(d >= last);
            last = d;
        }
    }

    #[test]
    fn test_inverse_in_rate() {
        let est = DurationEstimator::default();
        let text = "one two three four five six seven";
        let mut last = Duration::MAX;
        for rate in [0.25, 0.5, 1.0, 1.5, 2.0, 4.0] {
            let d = est.estimate(text, rate);
            assert!(d <= last);
            last = d;
        }
    }

    #[test]
    fn test_invalid_rate_uses_baseline() {
        let est = DurationEstimator::new(120.0);
        let baseline = est.estimate("a b c d", 1.0);
        assert_eq!(est.estimate("a b c d", 0.0), baseline);
        assert_eq!(est.estimate("a b c d", -2.0), baseline);
        assert_eq!(est.estimate("a b c d", f64::NAN), baseline);
    }

    #[test]
    fn test_invalid_baseline_uses_default() {
        assert_eq!(DurationEstimator::new(0.0).base_wpm(), DEFAULT_BASE_WPM);
        assert_eq!(DurationEstimator::new(-5.0).base_wpm(), DEFAULT_BASE_WPM);
    }
}
