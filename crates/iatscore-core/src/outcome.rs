//! Per-metric computation outcomes.
//!
//! A metric either computes normally or falls back to a defined default value
//! because the data could not support it. The fallback is never silent: the
//! [`DataIssue`] travels with the value and ends up in the report's
//! `degradations` list.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Pairing;

/// Why a metric fell back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum DataIssue {
    /// No response had an analyzable response time.
    NoValidTrials,
    /// A pairing group had no trials at all.
    EmptyPairing { pairing: Pairing },
    /// IQR trimming removed every trial of a pairing group.
    EmptyAfterTrimming { pairing: Pairing },
    /// The pooled standard deviation was zero.
    ZeroVariance,
    /// Fewer trials than the estimator needs.
    TooFewTrials { required: usize, found: usize },
    /// The correlation was NaN (constant half).
    UndefinedCorrelation,
    /// A ratio's denominator was zero.
    ZeroBaseline,
}

impl fmt::Display for DataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataIssue::NoValidTrials => write!(f, "no trials with a valid response time"),
            DataIssue::EmptyPairing { pairing } => write!(f, "no {pairing} trials"),
            DataIssue::EmptyAfterTrimming { pairing } => {
                write!(f, "outlier trimming removed every {pairing} trial")
            }
            DataIssue::ZeroVariance => write!(f, "zero pooled standard deviation"),
            DataIssue::TooFewTrials { required, found } => {
                write!(f, "needs at least {required} trials, found {found}")
            }
            DataIssue::UndefinedCorrelation => write!(f, "correlation undefined"),
            DataIssue::ZeroBaseline => write!(f, "zero baseline response time"),
        }
    }
}

/// Result of one metric computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Computed(T),
    Degraded { value: T, issue: DataIssue },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, issue: DataIssue) -> Self {
        Outcome::Degraded { value, issue }
    }

    /// The value, whether computed or defaulted.
    pub fn value(&self) -> &T {
        match self {
            Outcome::Computed(v) | Outcome::Degraded { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Computed(v) | Outcome::Degraded { value: v, .. } => v,
        }
    }

    pub fn issue(&self) -> Option<&DataIssue> {
        match self {
            Outcome::Computed(_) => None,
            Outcome::Degraded { issue, .. } => Some(issue),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Computed(v) => Outcome::Computed(f(v)),
            Outcome::Degraded { value, issue } => Outcome::Degraded {
                value: f(value),
                issue,
            },
        }
    }

    /// Unwraps the value, appending a [`Degradation`] for `metric` if it fell back.
    pub fn record(self, metric: Metric, sink: &mut Vec<Degradation>) -> T {
        match self {
            Outcome::Computed(v) => v,
            Outcome::Degraded { value, issue } => {
                sink.push(Degradation { metric, issue });
                value
            }
        }
    }
}

/// Report metrics that can degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DScore,
    ConfidenceInterval,
    Significance,
    CompatibleBlocks,
    IncompatibleBlocks,
    OverallPerformance,
    FatigueEffect,
    Attention,
    DataQuality,
    Reliability,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::DScore => "d_score",
            Metric::ConfidenceInterval => "confidence_interval",
            Metric::Significance => "significance",
            Metric::CompatibleBlocks => "compatible_blocks",
            Metric::IncompatibleBlocks => "incompatible_blocks",
            Metric::OverallPerformance => "overall_performance",
            Metric::FatigueEffect => "fatigue_effect",
            Metric::Attention => "attention",
            Metric::DataQuality => "data_quality",
            Metric::Reliability => "reliability",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric that fell back to its default, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub metric: Metric,
    #[serde(flatten)]
    pub issue: DataIssue,
}
