//! Descriptive summary of one trial subset (a block or a pairing group).

use serde::{Deserialize, Serialize};

use crate::model::{Pairing, Response};
use crate::outcome::{DataIssue, Outcome};
use crate::statistics;

/// Trials faster than this are counted as fast (ms).
pub const FAST_TRIAL_MS: f64 = 300.0;
/// Trials slower than this are counted as slow (ms).
pub const SLOW_TRIAL_MS: f64 = 3000.0;

/// Summary statistics for a group of trials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub trial_count: usize,
    pub mean_rt: f64,
    pub median_rt: f64,
    pub std_rt: f64,
    /// Fraction of correct trials, 0..=1.
    pub accuracy: f64,
    pub error_rate: f64,
    pub fast_trials: usize,
    pub slow_trials: usize,
    pub outlier_rate: f64,
    /// Relative RT change from first to last third; negative means speed-up.
    pub learning_effect: f64,
    pub consistency: f64,
}

impl BlockSummary {
    /// Summarize `trials` in the order given.
    pub fn from_trials<'a>(trials: impl IntoIterator<Item = &'a Response>) -> Option<Self> {
        let trials: Vec<&Response> = trials.into_iter().collect();
        if trials.is_empty() {
            return None;
        }
        let rts: Vec<f64> = trials.iter().map(|r| r.rt()).collect();
        let correct = trials.iter().filter(|r| r.correct).count();
        let accuracy = correct as f64 / trials.len() as f64;

        Some(Self {
            trial_count: trials.len(),
            mean_rt: statistics::mean(&rts),
            median_rt: statistics::median(&rts),
            std_rt: statistics::sample_std(&rts),
            accuracy,
            error_rate: 1.0 - accuracy,
            fast_trials: rts.iter().filter(|rt| **rt < FAST_TRIAL_MS).count(),
            slow_trials: rts.iter().filter(|rt| **rt > SLOW_TRIAL_MS).count(),
            outlier_rate: statistics::outlier_rate(&rts),
            learning_effect: statistics::learning_effect(&rts).into_value(),
            consistency: statistics::consistency(&rts),
        })
    }
}

/// Summarize the analyzable trials of one pairing group.
///
/// An empty group yields an all-zero summary tagged [`DataIssue::EmptyPairing`].
pub fn summarize_pairing(pairing: Pairing, responses: &[Response]) -> Outcome<BlockSummary> {
    let trials = responses
        .iter()
        .filter(|r| r.is_analyzable() && r.pairing() == Some(pairing));
    match BlockSummary::from_trials(trials) {
        Some(summary) => Outcome::Computed(summary),
        None => Outcome::degraded(BlockSummary::default(), DataIssue::EmptyPairing { pairing }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(block: u32, trial: u32, rt: i64, correct: bool) -> Response {
        Response {
            trial_number: trial,
            block_number: block,
            stimulus: "x".into(),
            response: Some(crate::model::Side::Left),
            response_time: rt,
            correct,
            timestamp: String::new(),
        }
    }

    #[test]
    fn summarizes_counts_and_rates() {
        let rs = vec![
            response(3, 1, 250, true),
            response(3, 2, 500, true),
            response(4, 1, 3500, false),
            response(4, 2, 600, true),
        ];
        let s = BlockSummary::from_trials(&rs).unwrap();
        assert_eq!(s.trial_count, 4);
        assert_eq!(s.fast_trials, 1);
        assert_eq!(s.slow_trials, 1);
        assert!((s.accuracy - 0.75).abs() < 1e-12);
        assert!((s.error_rate - 0.25).abs() < 1e-12);
        assert!((s.mean_rt - 1212.5).abs() < 1e-9);
        assert!((s.median_rt - 550.0).abs() < 1e-9);
    }

    #[test]
    fn pairing_filters_blocks_and_invalid_times() {
        let rs = vec![
            response(3, 1, 500, true),
            response(6, 1, 700, true),
            response(7, 2, 12_000, true),
            response(5, 1, 400, true),
        ];
        let incompatible = summarize_pairing(Pairing::Incompatible, &rs);
        assert!(!incompatible.is_degraded());
        assert_eq!(incompatible.value().trial_count, 1);
        assert_eq!(incompatible.value().mean_rt, 700.0);
    }

    #[test]
    fn empty_pairing_degrades() {
        let rs = vec![response(3, 1, 500, true)];
        let s = summarize_pairing(Pairing::Incompatible, &rs);
        assert_eq!(
            s.issue(),
            Some(&DataIssue::EmptyPairing {
                pairing: Pairing::Incompatible
            })
        );
        assert_eq!(s.value().trial_count, 0);
    }
}
