//! Session-level analysis: builds an [`AnalysisResult`] from a response log.
//!
//! The D-Score is scored first, since an external scorer is awaited. The
//! report is then assembled from six independent sections.
//! [`SessionAnalyzer::analyze`] computes them in order on the calling task;
//! [`SessionAnalyzer::analyze_concurrent`] fans them out onto blocking tasks
//! behind a semaphore and waits for all of them. Both produce the same report
//! for the same input.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::block_analysis::{summarize_pairing, BlockSummary};
use crate::error::IatError;
use crate::model::{Pairing, Response};
use crate::outcome::{DataIssue, Degradation, Metric, Outcome};
use crate::report::{
    AnalysisResult, Attention, CurvePoint, DScoreSummary, ErrorAnalysis, ErrorPattern,
    OverallPerformance, PerformanceMetrics, Reliability, TEST_RETEST_PLACEHOLDER,
};
use crate::scoring::{ScoringCapability, ScoringMethod};
use crate::statistics::{self, ConfidenceInterval, EffectSize, IntervalMethod, Interpretation};

/// Quality penalty weights.
const OUTLIER_PENALTY: f64 = 0.3;
const TOO_FAST_PENALTY: f64 = 0.2;
const TOO_SLOW_PENALTY: f64 = 0.1;
const TOO_FAST_MS: f64 = 200.0;
const TOO_SLOW_MS: f64 = 5000.0;
/// Quality score reported when no trial is analyzable.
const DEFAULT_QUALITY: f64 = 0.5;

/// Analysis precision settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Confidence-interval tier.
    pub interval: IntervalMethod,
    /// Resample count for the bootstrap tier.
    pub bootstrap_resamples: usize,
    /// Fixed bootstrap seed; drawn once per analyzer when absent.
    pub seed: Option<u64>,
    /// Upper bound on concurrently computed report sections.
    pub max_workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval: IntervalMethod::Bootstrap,
            bootstrap_resamples: 1000,
            seed: None,
            max_workers: 8,
        }
    }
}

/// Immutable view of a response set shared by all sections.
#[derive(Debug)]
struct Snapshot {
    /// Analyzable responses in arrival order.
    valid: Vec<Response>,
    compatible: Vec<f64>,
    incompatible: Vec<f64>,
    /// Response times of `valid`, in arrival order.
    rts: Vec<f64>,
}

impl Snapshot {
    fn new(responses: &[Response]) -> Self {
        let valid: Vec<Response> = responses
            .iter()
            .filter(|r| r.is_analyzable())
            .cloned()
            .collect();
        let rts_of = |pairing: Pairing| -> Vec<f64> {
            valid
                .iter()
                .filter(|r| r.pairing() == Some(pairing))
                .map(Response::rt)
                .collect()
        };
        let compatible = rts_of(Pairing::Compatible);
        let incompatible = rts_of(Pairing::Incompatible);
        let rts = valid.iter().map(Response::rt).collect();
        Self {
            valid,
            compatible,
            incompatible,
            rts,
        }
    }

    fn accuracy(&self) -> f64 {
        if self.valid.is_empty() {
            return 0.0;
        }
        self.valid.iter().filter(|r| r.correct).count() as f64 / self.valid.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    DScore,
    Blocks,
    Performance,
    Errors,
    Temporal,
    Quality,
}

impl Section {
    const ALL: [Section; 6] = [
        Section::DScore,
        Section::Blocks,
        Section::Performance,
        Section::Errors,
        Section::Temporal,
        Section::Quality,
    ];
}

/// D-Score as produced by the scoring capability.
#[derive(Debug, Clone)]
struct Scored {
    d: Outcome<f64>,
    method: ScoringMethod,
}

#[derive(Debug)]
enum SectionOutput {
    DScore(DScoreSummary),
    Blocks(BlockSummary, BlockSummary),
    Performance(OverallPerformance),
    Errors(ErrorAnalysis),
    Temporal(f64, Attention),
    Quality(f64, Reliability),
}

/// Scores a full response log.
#[derive(Debug, Clone)]
pub struct SessionAnalyzer {
    config: AnalysisConfig,
    seed: u64,
    capability: ScoringCapability,
}

impl Default for SessionAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl SessionAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            config,
            seed,
            capability: ScoringCapability::Native,
        }
    }

    /// Use an already resolved scoring capability.
    pub fn with_capability(mut self, capability: ScoringCapability) -> Self {
        self.capability = capability;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Bootstrap seed used by every analysis from this analyzer.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of sections computed at once by [`Self::analyze_concurrent`].
    pub fn worker_count(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        available.min(self.config.max_workers).max(1)
    }

    /// Analyze `responses`, computing report sections one after another.
    pub async fn analyze(&self, responses: &[Response]) -> Result<AnalysisResult, IatError> {
        if responses.is_empty() {
            return Err(IatError::NoResponses);
        }
        let start = Instant::now();
        let snapshot = Snapshot::new(responses);
        let scored = self.score(&snapshot).await;
        let outputs = Section::ALL
            .iter()
            .map(|s| self.compute(*s, &snapshot, &scored))
            .collect();
        let result = self.assemble(responses.len(), &snapshot, outputs, 1, start);
        log_finished(&result);
        Ok(result)
    }

    /// Analyze `responses`, computing report sections on a bounded pool of
    /// blocking tasks.
    pub async fn analyze_concurrent(
        &self,
        responses: &[Response],
    ) -> Result<AnalysisResult, IatError> {
        if responses.is_empty() {
            return Err(IatError::NoResponses);
        }
        let start = Instant::now();
        let snapshot = Arc::new(Snapshot::new(responses));
        let scored = Arc::new(self.score(&snapshot).await);
        let workers = self.worker_count();
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut futures = FuturesUnordered::new();
        for (index, section) in Section::ALL.into_iter().enumerate() {
            let analyzer = self.clone();
            let snapshot = Arc::clone(&snapshot);
            let scored = Arc::clone(&scored);
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| IatError::Internal("worker pool closed".into()))?;
                let output = tokio::task::spawn_blocking(move || {
                    analyzer.compute(section, &snapshot, &scored)
                })
                .await
                .map_err(|e| IatError::Internal(format!("{section:?} section: {e}")))?;
                Ok::<_, IatError>((index, output))
            });
        }

        let mut slots: Vec<Option<(SectionOutput, Vec<Degradation>)>> =
            Section::ALL.iter().map(|_| None).collect();
        while let Some(done) = futures.next().await {
            let (index, output) = done?;
            slots[index] = Some(output);
        }
        let outputs = slots
            .into_iter()
            .zip(Section::ALL)
            .map(|(slot, section)| {
                slot.ok_or_else(|| IatError::Internal(format!("{section:?} section missing")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = self.assemble(responses.len(), &snapshot, outputs, workers, start);
        log_finished(&result);
        Ok(result)
    }

    async fn score(&self, snap: &Snapshot) -> Scored {
        let (d, method) = self
            .capability
            .d_score(&snap.compatible, &snap.incompatible)
            .await;
        Scored { d, method }
    }

    fn compute(
        &self,
        section: Section,
        snap: &Snapshot,
        scored: &Scored,
    ) -> (SectionOutput, Vec<Degradation>) {
        let mut issues = Vec::new();
        let output = match section {
            Section::DScore => {
                SectionOutput::DScore(self.d_score_section(snap, scored, &mut issues))
            }
            Section::Blocks => SectionOutput::Blocks(
                summarize_pairing(Pairing::Compatible, &snap.valid)
                    .record(Metric::CompatibleBlocks, &mut issues),
                summarize_pairing(Pairing::Incompatible, &snap.valid)
                    .record(Metric::IncompatibleBlocks, &mut issues),
            ),
            Section::Performance => SectionOutput::Performance(
                performance(snap).record(Metric::OverallPerformance, &mut issues),
            ),
            Section::Errors => SectionOutput::Errors(errors(snap)),
            Section::Temporal => SectionOutput::Temporal(
                statistics::fatigue(&snap.rts).record(Metric::FatigueEffect, &mut issues),
                attention(snap).record(Metric::Attention, &mut issues),
            ),
            Section::Quality => SectionOutput::Quality(
                quality(snap).record(Metric::DataQuality, &mut issues),
                reliability(snap).record(Metric::Reliability, &mut issues),
            ),
        };
        (output, issues)
    }

    fn d_score_section(
        &self,
        snap: &Snapshot,
        scored: &Scored,
        issues: &mut Vec<Degradation>,
    ) -> DScoreSummary {
        let d = scored.d.clone().record(Metric::DScore, issues);
        let scoring_method = scored.method.clone();

        let confidence_interval = match self.config.interval {
            IntervalMethod::FixedMargin => ConfidenceInterval::fixed_margin(d),
            IntervalMethod::Bootstrap => statistics::bootstrap_interval(
                &snap.compatible,
                &snap.incompatible,
                self.config.bootstrap_resamples,
                self.seed,
            )
            .record(Metric::ConfidenceInterval, issues),
        };

        let p_value = match statistics::student_t_test(&snap.compatible, &snap.incompatible) {
            Some(t) => Some(t.p_value),
            None => {
                let found = snap.compatible.len().min(snap.incompatible.len());
                let issue = if found < 2 {
                    DataIssue::TooFewTrials { required: 2, found }
                } else {
                    DataIssue::ZeroVariance
                };
                issues.push(Degradation {
                    metric: Metric::Significance,
                    issue,
                });
                None
            }
        };

        DScoreSummary {
            value: d,
            interpretation: Interpretation::from_d_score(d),
            confidence_interval,
            significant: p_value.is_some_and(|p| statistics::is_significant(p, d)),
            p_value,
            effect_size: EffectSize::from_d_score(d),
            scoring_method,
        }
    }

    fn assemble(
        &self,
        trial_count: usize,
        snap: &Snapshot,
        outputs: Vec<(SectionOutput, Vec<Degradation>)>,
        parallel_tasks: usize,
        start: Instant,
    ) -> AnalysisResult {
        let mut degradations = Vec::new();
        let mut d_score = None;
        let mut blocks = None;
        let mut performance = OverallPerformance::default();
        let mut errors = None;
        let mut temporal = (0.0, Attention::default());
        let mut quality = (DEFAULT_QUALITY, default_reliability());

        for (output, issues) in outputs {
            degradations.extend(issues);
            match output {
                SectionOutput::DScore(d) => d_score = Some(d),
                SectionOutput::Blocks(c, i) => blocks = Some((c, i)),
                SectionOutput::Performance(p) => performance = p,
                SectionOutput::Errors(e) => errors = Some(e),
                SectionOutput::Temporal(f, a) => temporal = (f, a),
                SectionOutput::Quality(q, r) => quality = (q, r),
            }
        }

        let (compatible_blocks, incompatible_blocks) = blocks.unwrap_or_default();
        AnalysisResult {
            created_at: chrono::Utc::now(),
            d_score: d_score.unwrap_or_else(|| self.fallback_d_score()),
            compatible_blocks,
            incompatible_blocks,
            performance,
            errors: errors.unwrap_or_else(|| ErrorAnalysis {
                pattern: ErrorPattern::NoErrors,
                total_errors: 0,
                error_rate: 0.0,
                errors_by_block: BTreeMap::new(),
            }),
            fatigue_effect: temporal.0,
            attention: temporal.1,
            data_quality_score: quality.0,
            reliability: quality.1,
            trial_count,
            discarded_trials: trial_count - snap.valid.len(),
            degradations,
            performance_metrics: PerformanceMetrics {
                processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                parallel_tasks,
            },
        }
    }

    fn fallback_d_score(&self) -> DScoreSummary {
        DScoreSummary {
            value: 0.0,
            interpretation: Interpretation::NoPreference,
            confidence_interval: ConfidenceInterval::fixed_margin(0.0),
            significant: false,
            p_value: None,
            effect_size: EffectSize::Negligible,
            scoring_method: ScoringMethod::Native,
        }
    }
}

fn log_finished(result: &AnalysisResult) {
    tracing::info!(
        trials = result.trial_count,
        discarded = result.discarded_trials,
        d_score = result.d_score.value,
        degraded = result.degradations.len(),
        elapsed_ms = result.performance_metrics.processing_time_ms,
        tasks = result.performance_metrics.parallel_tasks,
        "analysis complete"
    );
}

fn performance(snap: &Snapshot) -> Outcome<OverallPerformance> {
    if snap.valid.is_empty() {
        return Outcome::degraded(OverallPerformance::default(), DataIssue::NoValidTrials);
    }
    let mut by_block: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for r in &snap.valid {
        by_block.entry(r.block_number).or_default().push(r.rt());
    }
    Outcome::Computed(OverallPerformance {
        accuracy: snap.accuracy(),
        mean_rt: statistics::mean(&snap.rts),
        consistency: statistics::consistency(&snap.rts),
        learning_curve: by_block
            .into_iter()
            .map(|(block_number, rts)| CurvePoint {
                block_number,
                mean_rt: statistics::mean(&rts),
            })
            .collect(),
    })
}

fn errors(snap: &Snapshot) -> ErrorAnalysis {
    let mut errors_by_block: BTreeMap<u32, usize> = BTreeMap::new();
    for r in &snap.valid {
        *errors_by_block.entry(r.block_number).or_default() += usize::from(!r.correct);
    }
    let total_errors: usize = errors_by_block.values().sum();
    let error_rate = if snap.valid.is_empty() {
        0.0
    } else {
        total_errors as f64 / snap.valid.len() as f64
    };
    ErrorAnalysis {
        pattern: ErrorPattern::classify(total_errors, error_rate),
        total_errors,
        error_rate,
        errors_by_block,
    }
}

fn attention(snap: &Snapshot) -> Outcome<Attention> {
    if snap.valid.is_empty() {
        return Outcome::degraded(Attention::default(), DataIssue::NoValidTrials);
    }
    Outcome::Computed(Attention {
        focus: snap.accuracy(),
        stability: statistics::consistency(&snap.rts),
    })
}

fn quality(snap: &Snapshot) -> Outcome<f64> {
    if snap.rts.is_empty() {
        return Outcome::degraded(DEFAULT_QUALITY, DataIssue::NoValidTrials);
    }
    let score = 1.0
        - OUTLIER_PENALTY * statistics::outlier_rate(&snap.rts)
        - TOO_FAST_PENALTY * statistics::fraction(&snap.rts, |rt| rt < TOO_FAST_MS)
        - TOO_SLOW_PENALTY * statistics::fraction(&snap.rts, |rt| rt > TOO_SLOW_MS);
    Outcome::Computed(score.clamp(0.0, 1.0))
}

fn default_reliability() -> Reliability {
    Reliability {
        internal_consistency: 0.0,
        split_half_reliability: 0.0,
        test_retest_reliability: TEST_RETEST_PLACEHOLDER,
    }
}

fn reliability(snap: &Snapshot) -> Outcome<Reliability> {
    statistics::split_half(&snap.rts).map(|r| Reliability {
        internal_consistency: r,
        split_half_reliability: r,
        test_retest_reliability: TEST_RETEST_PLACEHOLDER,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Side;

    const COMPATIBLE: [i64; 10] = [500, 520, 510, 530, 505, 515, 525, 495, 540, 500];
    const INCOMPATIBLE: [i64; 10] = [700, 690, 710, 720, 680, 705, 715, 695, 730, 700];

    fn response(block: u32, trial: u32, rt: i64, correct: bool) -> Response {
        Response {
            trial_number: trial,
            block_number: block,
            stimulus: format!("s{trial}"),
            response: Some(Side::Left),
            response_time: rt,
            correct,
            timestamp: String::new(),
        }
    }

    fn example_log() -> Vec<Response> {
        let mut log = Vec::new();
        for (i, rt) in COMPATIBLE.iter().enumerate() {
            log.push(response(3 + (i as u32 / 5), i as u32 + 1, *rt, true));
        }
        for (i, rt) in INCOMPATIBLE.iter().enumerate() {
            log.push(response(6 + (i as u32 / 5), i as u32 + 1, *rt, true));
        }
        log
    }

    fn analyzer() -> SessionAnalyzer {
        SessionAnalyzer::new(AnalysisConfig {
            bootstrap_resamples: 200,
            seed: Some(17),
            ..AnalysisConfig::default()
        })
    }

    #[tokio::test]
    async fn scores_the_reference_example() {
        let result = analyzer().analyze(&example_log()).await.unwrap();
        assert!(result.d_score.value > 0.0);
        assert!(matches!(
            result.d_score.interpretation,
            Interpretation::ModeratePreference | Interpretation::StrongPreference
        ));
        assert_eq!(result.performance.accuracy, 1.0);
        assert_eq!(result.errors.pattern, ErrorPattern::NoErrors);
        assert!(result.d_score.significant);
        assert_eq!(result.compatible_blocks.trial_count, 10);
        assert_eq!(result.incompatible_blocks.trial_count, 10);
        assert_eq!(result.trial_count, 20);
        assert_eq!(result.discarded_trials, 0);
        assert!(result.degradations.is_empty(), "{:?}", result.degradations);
    }

    #[tokio::test]
    async fn learning_curve_is_in_block_order() {
        let result = analyzer().analyze(&example_log()).await.unwrap();
        let blocks: Vec<u32> = result
            .performance
            .learning_curve
            .iter()
            .map(|p| p.block_number)
            .collect();
        assert_eq!(blocks, vec![3, 4, 6, 7]);
    }

    #[tokio::test]
    async fn empty_log_is_an_error() {
        assert_eq!(analyzer().analyze(&[]).await.unwrap_err(), IatError::NoResponses);
    }

    #[tokio::test]
    async fn out_of_range_times_are_discarded() {
        let mut log = example_log();
        log.push(response(7, 11, 0, true));
        log.push(response(7, 12, 15_000, false));
        let result = analyzer().analyze(&log).await.unwrap();
        assert_eq!(result.trial_count, 22);
        assert_eq!(result.discarded_trials, 2);
        assert_eq!(result.errors.total_errors, 0);
    }

    #[tokio::test]
    async fn all_invalid_still_reports_degraded() {
        let log = vec![response(3, 1, 0, true), response(6, 1, 20_000, true)];
        let result = analyzer().analyze(&log).await.unwrap();
        assert_eq!(result.d_score.value, 0.0);
        assert_eq!(result.data_quality_score, 0.5);
        assert_eq!(result.reliability.internal_consistency, 0.0);
        assert!(result
            .degradations
            .iter()
            .any(|d| d.issue == DataIssue::NoValidTrials));
    }

    #[tokio::test]
    async fn missing_pairing_degrades_d_score() {
        let log: Vec<Response> = example_log()
            .into_iter()
            .filter(|r| r.block_number < 5)
            .collect();
        let result = analyzer().analyze(&log).await.unwrap();
        assert_eq!(result.d_score.value, 0.0);
        assert!(!result.d_score.significant);
        assert!(result.degradations.contains(&Degradation {
            metric: Metric::DScore,
            issue: DataIssue::EmptyPairing {
                pairing: Pairing::Incompatible
            },
        }));
    }

    #[tokio::test]
    async fn error_rates_classify_pattern() {
        let mut log = example_log();
        log[0].correct = false;
        log[12].correct = false;
        let result = analyzer().analyze(&log).await.unwrap();
        assert_eq!(result.errors.total_errors, 2);
        assert_eq!(result.errors.pattern, ErrorPattern::ModerateErrors);
        assert_eq!(result.errors.errors_by_block.get(&3), Some(&1));
        assert_eq!(result.errors.errors_by_block.get(&6), Some(&1));
        assert_eq!(result.errors.errors_by_block.get(&4), Some(&0));
    }

    #[tokio::test]
    async fn fixed_margin_tier_is_labelled() {
        let analyzer = SessionAnalyzer::new(AnalysisConfig {
            interval: IntervalMethod::FixedMargin,
            ..AnalysisConfig::default()
        });
        let result = analyzer.analyze(&example_log()).await.unwrap();
        let ci = &result.d_score.confidence_interval;
        assert_eq!(ci.method, IntervalMethod::FixedMargin);
        assert!((ci.upper - ci.lower - 0.4).abs() < 1e-9);
        assert_eq!(ci.resamples, None);
    }

    #[tokio::test]
    async fn quality_penalizes_fast_trials() {
        let mut log = example_log();
        for r in log.iter_mut().take(5) {
            r.response_time = 150;
        }
        let result = analyzer().analyze(&log).await.unwrap();
        assert!(result.data_quality_score < 1.0);
        assert!(result.data_quality_score >= 0.0);
    }

    #[tokio::test]
    async fn rescoring_raw_responses_is_idempotent() {
        let log = example_log();
        let a = analyzer().analyze(&log).await.unwrap();
        let b = analyzer().analyze(&log).await.unwrap();
        assert_eq!(a.d_score, b.d_score);
        assert_eq!(a.performance, b.performance);
    }

    #[tokio::test]
    async fn concurrent_matches_sequential() {
        let log = example_log();
        let analyzer = analyzer();
        let mut seq = analyzer.analyze(&log).await.unwrap();
        let par = analyzer.analyze_concurrent(&log).await.unwrap();
        assert_eq!(seq.performance_metrics.parallel_tasks, 1);
        assert_eq!(par.performance_metrics.parallel_tasks, analyzer.worker_count());
        seq.created_at = par.created_at;
        seq.performance_metrics = par.performance_metrics.clone();
        assert_eq!(seq, par);
    }

    #[tokio::test]
    async fn processing_time_is_recorded() {
        let result = analyzer().analyze(&example_log()).await.unwrap();
        let metrics = &result.performance_metrics;
        assert!(metrics.processing_time_ms >= 0.0);
        assert!(metrics.processing_time_ms.is_finite());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["performance_metrics"]["parallel_tasks"], 1);
    }

    #[tokio::test]
    async fn concurrent_rejects_empty_log() {
        let err = analyzer().analyze_concurrent(&[]).await.unwrap_err();
        assert_eq!(err, IatError::NoResponses);
    }

    #[test]
    fn worker_count_is_bounded() {
        let analyzer = SessionAnalyzer::new(AnalysisConfig {
            max_workers: 2,
            ..AnalysisConfig::default()
        });
        assert!(analyzer.worker_count() <= 2);
        assert!(analyzer.worker_count() >= 1);
    }
}
