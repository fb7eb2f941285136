//! Response-time statistics and D-Score scoring.
//!
//! Every function here is pure. Metrics that can fail on degenerate data
//! return an [`Outcome`] carrying the documented default.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::outcome::{DataIssue, Outcome};
use crate::model::Pairing;

/// Width multiplier applied to the IQR when trimming outliers.
pub const IQR_FENCE: f64 = 1.5;
/// Half-width of the fixed-margin confidence interval.
pub const FIXED_MARGIN: f64 = 0.2;
/// p-value threshold for significance.
pub const SIGNIFICANCE_ALPHA: f64 = 0.05;
/// Minimum |D| for a result to count as significant.
pub const SIGNIFICANCE_MIN_EFFECT: f64 = 0.2;

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n − 1); 0.0 with fewer than two values.
pub fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Quantile of an already sorted slice, `q` in [0, 1], linear interpolation.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn quantile(xs: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted(xs), q)
}

pub fn median(xs: &[f64]) -> f64 {
    quantile(xs, 0.5)
}

/// Inclusive `[Q1 − 1.5·IQR, Q3 + 1.5·IQR]` fences, or `None` for an empty sample.
pub fn iqr_bounds(xs: &[f64]) -> Option<(f64, f64)> {
    if xs.is_empty() {
        return None;
    }
    let s = sorted(xs);
    let q1 = quantile_sorted(&s, 0.25);
    let q3 = quantile_sorted(&s, 0.75);
    let iqr = q3 - q1;
    Some((q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr))
}

/// Values inside the IQR fences, in their original order.
pub fn trim_outliers(xs: &[f64]) -> Vec<f64> {
    match iqr_bounds(xs) {
        Some((lo, hi)) => xs.iter().copied().filter(|x| *x >= lo && *x <= hi).collect(),
        None => Vec::new(),
    }
}

/// Fraction of values outside the IQR fences.
pub fn outlier_rate(xs: &[f64]) -> f64 {
    match iqr_bounds(xs) {
        Some((lo, hi)) => {
            let outside = xs.iter().filter(|x| **x < lo || **x > hi).count();
            outside as f64 / xs.len() as f64
        }
        None => 0.0,
    }
}

/// Fraction of values satisfying `pred`; 0.0 for an empty slice.
pub fn fraction(xs: &[f64], pred: impl Fn(f64) -> bool) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().filter(|x| pred(**x)).count() as f64 / xs.len() as f64
}

// ---------------------------------------------------------------------------
// D-Score
// ---------------------------------------------------------------------------

/// Standardized latency difference between the incompatible and compatible
/// pairings. Positive when the incompatible pairing is slower.
pub fn d_score(compatible: &[f64], incompatible: &[f64]) -> Outcome<f64> {
    for (pairing, sample) in [
        (Pairing::Compatible, compatible),
        (Pairing::Incompatible, incompatible),
    ] {
        if sample.is_empty() {
            return Outcome::degraded(0.0, DataIssue::EmptyPairing { pairing });
        }
    }

    let comp = trim_outliers(compatible);
    let incomp = trim_outliers(incompatible);
    for (pairing, sample) in [
        (Pairing::Compatible, &comp),
        (Pairing::Incompatible, &incomp),
    ] {
        if sample.is_empty() {
            return Outcome::degraded(0.0, DataIssue::EmptyAfterTrimming { pairing });
        }
    }

    let combined_std = (sample_std(&comp) + sample_std(&incomp)) / 2.0;
    if combined_std == 0.0 {
        return Outcome::degraded(0.0, DataIssue::ZeroVariance);
    }
    Outcome::Computed((mean(&incomp) - mean(&comp)) / combined_std)
}

/// Verbal band for |D|.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interpretation {
    NoPreference,
    SlightPreference,
    ModeratePreference,
    StrongPreference,
}

impl Interpretation {
    pub fn from_d_score(d: f64) -> Self {
        let d = d.abs();
        if d < 0.15 {
            Interpretation::NoPreference
        } else if d < 0.35 {
            Interpretation::SlightPreference
        } else if d < 0.65 {
            Interpretation::ModeratePreference
        } else {
            Interpretation::StrongPreference
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interpretation::NoPreference => "no-preference",
            Interpretation::SlightPreference => "slight-preference",
            Interpretation::ModeratePreference => "moderate-preference",
            Interpretation::StrongPreference => "strong-preference",
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conventional effect-size band for |D|.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectSize {
    pub fn from_d_score(d: f64) -> Self {
        let d = d.abs();
        if d < 0.2 {
            EffectSize::Negligible
        } else if d < 0.5 {
            EffectSize::Small
        } else if d < 0.8 {
            EffectSize::Medium
        } else {
            EffectSize::Large
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectSize::Negligible => "negligible",
            EffectSize::Small => "small",
            EffectSize::Medium => "medium",
            EffectSize::Large => "large",
        }
    }
}

impl fmt::Display for EffectSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Significance
// ---------------------------------------------------------------------------

/// Pooled-variance two-sample Student t-test result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTest {
    pub t: f64,
    pub df: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Tests whether the two sample means differ. `None` when either sample has
/// fewer than two values or the pooled variance is zero.
pub fn student_t_test(a: &[f64], b: &[f64]) -> Option<TTest> {
    let (n1, n2) = (a.len(), b.len());
    if n1 < 2 || n2 < 2 {
        return None;
    }
    let df = (n1 + n2 - 2) as f64;
    let (s1, s2) = (sample_std(a), sample_std(b));
    let pooled_var = ((n1 - 1) as f64 * s1 * s1 + (n2 - 1) as f64 * s2 * s2) / df;
    let se = (pooled_var * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    if se == 0.0 || !se.is_finite() {
        return None;
    }
    let t = (mean(b) - mean(a)) / se;
    Some(TTest {
        t,
        df,
        p_value: t_two_sided_p(t, df),
    })
}

/// Significant when the mean difference is unlikely under the null AND the
/// effect is non-trivial.
pub fn is_significant(p_value: f64, d: f64) -> bool {
    p_value < SIGNIFICANCE_ALPHA && d.abs() > SIGNIFICANCE_MIN_EFFECT
}

/// Two-sided p-value of Student's t with `df` degrees of freedom.
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// ln Γ(x) via the Lanczos approximation.
fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// I_x(a, b).
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln())
        .exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3e-14;
    const FPMIN: f64 = 1e-300;

    let nonzero = |v: f64| if v.abs() < FPMIN { FPMIN } else { v };

    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / nonzero(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / nonzero(1.0 + aa * d);
        c = nonzero(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / nonzero(1.0 + aa * d);
        c = nonzero(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

// ---------------------------------------------------------------------------
// Confidence interval
// ---------------------------------------------------------------------------

/// Precision tier of a reported confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalMethod {
    /// 2.5th/97.5th percentiles of bootstrap D-Scores.
    #[default]
    Bootstrap,
    /// `D ± 0.2`.
    FixedMargin,
}

impl fmt::Display for IntervalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalMethod::Bootstrap => f.write_str("bootstrap"),
            IntervalMethod::FixedMargin => f.write_str("fixed-margin"),
        }
    }
}

impl std::str::FromStr for IntervalMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bootstrap" => Ok(IntervalMethod::Bootstrap),
            "fixed-margin" | "fixed_margin" | "fixed" => Ok(IntervalMethod::FixedMargin),
            other => Err(format!("unknown interval method: {other}")),
        }
    }
}

/// A D-Score interval tagged with how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub method: IntervalMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resamples: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ConfidenceInterval {
    pub fn fixed_margin(d: f64) -> Self {
        Self {
            lower: d - FIXED_MARGIN,
            upper: d + FIXED_MARGIN,
            method: IntervalMethod::FixedMargin,
            resamples: None,
            seed: None,
        }
    }
}

/// Derive a well-mixed per-resample seed from a base seed and a counter (SplitMix64).
pub fn counter_rng_seed(base_seed: u64, counter: u64) -> u64 {
    let mut z = base_seed.wrapping_add(counter.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn resample_into(src: &[f64], dst: &mut Vec<f64>, rng: &mut Xoshiro256PlusPlus) {
    dst.clear();
    dst.extend((0..src.len()).map(|_| src[rng.random_range(0..src.len())]));
}

/// Percentile bootstrap interval for the D-Score.
///
/// Each resample draws both groups with replacement and rescores them. Resample
/// `i` is seeded from `counter_rng_seed(seed, i)`, so the interval does not
/// depend on how rayon splits the work.
pub fn bootstrap_interval(
    compatible: &[f64],
    incompatible: &[f64],
    resamples: usize,
    seed: u64,
) -> Outcome<ConfidenceInterval> {
    let empty = ConfidenceInterval {
        lower: 0.0,
        upper: 0.0,
        method: IntervalMethod::Bootstrap,
        resamples: Some(resamples),
        seed: Some(seed),
    };
    if compatible.is_empty() {
        return Outcome::degraded(
            empty,
            DataIssue::EmptyPairing {
                pairing: Pairing::Compatible,
            },
        );
    }
    if incompatible.is_empty() {
        return Outcome::degraded(
            empty,
            DataIssue::EmptyPairing {
                pairing: Pairing::Incompatible,
            },
        );
    }
    if resamples == 0 {
        return Outcome::degraded(
            empty,
            DataIssue::TooFewTrials {
                required: 1,
                found: 0,
            },
        );
    }

    let mut scores: Vec<f64> = (0..resamples)
        .into_par_iter()
        .map_init(
            || (Vec::new(), Vec::new()),
            |(comp, incomp), i| {
                let mut rng =
                    Xoshiro256PlusPlus::seed_from_u64(counter_rng_seed(seed, i as u64));
                resample_into(compatible, comp, &mut rng);
                resample_into(incompatible, incomp, &mut rng);
                d_score(comp, incomp).into_value()
            },
        )
        .collect();
    scores.sort_by(|a, b| a.total_cmp(b));

    Outcome::Computed(ConfidenceInterval {
        lower: quantile_sorted(&scores, 0.025),
        upper: quantile_sorted(&scores, 0.975),
        ..empty
    })
}

// ---------------------------------------------------------------------------
// Behavioural metrics
// ---------------------------------------------------------------------------

/// `1 − min(std/mean, 1)`; 1.0 with fewer than two values.
pub fn consistency(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 1.0;
    }
    let m = mean(xs);
    if m <= 0.0 {
        return 0.0;
    }
    1.0 - (sample_std(xs) / m).min(1.0)
}

/// Relative change from the first third to the last third of a trial sequence.
/// Negative values mean the participant sped up.
pub fn learning_effect(xs: &[f64]) -> Outcome<f64> {
    let third = xs.len() / 3;
    if third == 0 {
        return Outcome::degraded(
            0.0,
            DataIssue::TooFewTrials {
                required: 3,
                found: xs.len(),
            },
        );
    }
    let first = mean(&xs[..third]);
    let last = mean(&xs[xs.len() - third..]);
    if first == 0.0 {
        return Outcome::degraded(0.0, DataIssue::ZeroBaseline);
    }
    Outcome::Computed((last - first) / first)
}

pub const FATIGUE_MIN_TRIALS: usize = 10;

/// Relative slowdown of the second half of the log against the first half.
pub fn fatigue(xs: &[f64]) -> Outcome<f64> {
    if xs.len() < FATIGUE_MIN_TRIALS {
        return Outcome::degraded(
            0.0,
            DataIssue::TooFewTrials {
                required: FATIGUE_MIN_TRIALS,
                found: xs.len(),
            },
        );
    }
    let half = xs.len() / 2;
    let first = mean(&xs[..half]);
    let second = mean(&xs[half..]);
    if first == 0.0 {
        return Outcome::degraded(0.0, DataIssue::ZeroBaseline);
    }
    Outcome::Computed((second - first) / first)
}

/// Pearson correlation of two equal-length samples; `None` when undefined.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let r = cov / (va * vb).sqrt();
    r.is_finite().then_some(r)
}

pub const SPLIT_HALF_MIN_TRIALS: usize = 4;

/// Correlation between the first `n/2` and the next `n/2` values.
pub fn split_half(xs: &[f64]) -> Outcome<f64> {
    if xs.len() < SPLIT_HALF_MIN_TRIALS {
        return Outcome::degraded(
            0.0,
            DataIssue::TooFewTrials {
                required: SPLIT_HALF_MIN_TRIALS,
                found: xs.len(),
            },
        );
    }
    let half = xs.len() / 2;
    match pearson(&xs[..half], &xs[half..2 * half]) {
        Some(r) => Outcome::Computed(r),
        None => Outcome::degraded(0.0, DataIssue::UndefinedCorrelation),
    }
}
