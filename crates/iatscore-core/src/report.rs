//! Analysis report types with JSON persistence.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block_analysis::BlockSummary;
use crate::outcome::Degradation;
use crate::scoring::ScoringMethod;
use crate::statistics::{ConfidenceInterval, EffectSize, Interpretation};

/// Placeholder until a repeated-measurement design exists.
pub const TEST_RETEST_PLACEHOLDER: f64 = 0.8;

/// A complete statistical report over one response set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// When the report was produced.
    pub created_at: DateTime<Utc>,
    pub d_score: DScoreSummary,
    /// Blocks 3 and 4.
    pub compatible_blocks: BlockSummary,
    /// Blocks 6 and 7.
    pub incompatible_blocks: BlockSummary,
    pub performance: OverallPerformance,
    pub errors: ErrorAnalysis,
    /// Relative slowdown of the second half of the session.
    pub fatigue_effect: f64,
    pub attention: Attention,
    /// 0..=1, higher is cleaner data.
    pub data_quality_score: f64,
    pub reliability: Reliability,
    /// Responses in the analyzed set.
    pub trial_count: usize,
    /// Responses excluded for an out-of-range response time.
    pub discarded_trials: usize,
    /// Metrics that fell back to a default, and why.
    #[serde(default)]
    pub degradations: Vec<Degradation>,
    #[serde(default)]
    pub performance_metrics: PerformanceMetrics,
}

/// Cost of producing the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub processing_time_ms: f64,
    /// Report sections allowed to run at once; 1 for a sequential analysis.
    pub parallel_tasks: usize,
}

/// The D-Score and everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DScoreSummary {
    pub value: f64,
    pub interpretation: Interpretation,
    pub confidence_interval: ConfidenceInterval,
    pub significant: bool,
    /// Two-sided p-value of the mean-difference test, when defined.
    pub p_value: Option<f64>,
    pub effect_size: EffectSize,
    pub scoring_method: ScoringMethod,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallPerformance {
    /// Fraction correct, 0..=1.
    pub accuracy: f64,
    pub mean_rt: f64,
    pub consistency: f64,
    /// Mean RT per block, in block order.
    pub learning_curve: Vec<CurvePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub block_number: u32,
    pub mean_rt: f64,
}

/// Classification of the overall error rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPattern {
    NoErrors,
    LowErrors,
    ModerateErrors,
    HighErrors,
}

impl ErrorPattern {
    pub fn classify(errors: usize, error_rate: f64) -> Self {
        if errors == 0 {
            ErrorPattern::NoErrors
        } else if error_rate < 0.05 {
            ErrorPattern::LowErrors
        } else if error_rate < 0.15 {
            ErrorPattern::ModerateErrors
        } else {
            ErrorPattern::HighErrors
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPattern::NoErrors => "no-errors",
            ErrorPattern::LowErrors => "low-errors",
            ErrorPattern::ModerateErrors => "moderate-errors",
            ErrorPattern::HighErrors => "high-errors",
        }
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub pattern: ErrorPattern,
    pub total_errors: usize,
    pub error_rate: f64,
    /// Incorrect responses per block number.
    pub errors_by_block: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attention {
    /// Overall accuracy.
    pub focus: f64,
    /// `1 − min(cv, 1)` over the whole log.
    pub stability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reliability {
    pub internal_consistency: f64,
    pub split_half_reliability: f64,
    pub test_retest_reliability: f64,
}

impl AnalysisResult {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse report JSON")
    }

    /// True if any metric fell back to a default.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_pattern_bands() {
        assert_eq!(ErrorPattern::classify(0, 0.0), ErrorPattern::NoErrors);
        assert_eq!(ErrorPattern::classify(1, 0.049), ErrorPattern::LowErrors);
        assert_eq!(ErrorPattern::classify(3, 0.05), ErrorPattern::ModerateErrors);
        assert_eq!(ErrorPattern::classify(9, 0.15), ErrorPattern::HighErrors);
        assert_eq!(ErrorPattern::NoErrors.to_string(), "no-errors");
    }

    #[test]
    fn error_pattern_serializes_kebab() {
        let v = serde_json::to_value(ErrorPattern::ModerateErrors).unwrap();
        assert_eq!(v, "moderate-errors");
    }
}
