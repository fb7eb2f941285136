//! D-Score computation strategy.
//!
//! An optional external scorer can take over the point estimate. Whether one
//! is available is decided once, when the analyzer is built; a scorer that
//! fails at analysis time falls back to the native formula and the report
//! says so.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;
use crate::statistics;

/// A third-party D-Score implementation.
#[async_trait]
pub trait ExternalScorer: Send + Sync {
    /// Name recorded in the report (e.g. "pyiat").
    fn name(&self) -> &str;

    /// Score the analyzable compatible and incompatible response times.
    async fn d_score(&self, compatible: &[f64], incompatible: &[f64]) -> anyhow::Result<f64>;
}

/// Which implementation produced the reported D-Score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum ScoringMethod {
    Native,
    External { name: String },
    NativeFallback { name: String, reason: String },
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMethod::Native => f.write_str("native"),
            ScoringMethod::External { name } => write!(f, "external ({name})"),
            ScoringMethod::NativeFallback { name, reason } => {
                write!(f, "native (fallback from {name}: {reason})")
            }
        }
    }
}

/// The resolved scoring capability.
#[derive(Clone, Default)]
pub enum ScoringCapability {
    #[default]
    Native,
    External(Arc<dyn ExternalScorer>),
}

impl fmt::Debug for ScoringCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringCapability::Native => f.write_str("Native"),
            ScoringCapability::External(s) => {
                f.debug_tuple("External").field(&s.name()).finish()
            }
        }
    }
}

impl ScoringCapability {
    /// Resolve the capability once at startup.
    pub fn resolve(scorer: Option<Arc<dyn ExternalScorer>>) -> Self {
        match scorer {
            Some(scorer) => {
                tracing::info!(scorer = scorer.name(), "external D-Score scorer available");
                ScoringCapability::External(scorer)
            }
            None => {
                tracing::info!("using native D-Score formula");
                ScoringCapability::Native
            }
        }
    }

    /// Compute the D-Score point estimate and report which method produced it.
    pub async fn d_score(
        &self,
        compatible: &[f64],
        incompatible: &[f64],
    ) -> (Outcome<f64>, ScoringMethod) {
        let ScoringCapability::External(scorer) = self else {
            return (statistics::d_score(compatible, incompatible), ScoringMethod::Native);
        };

        let native = statistics::d_score(compatible, incompatible);
        if native.is_degraded() {
            // Degenerate groups keep the defined default regardless of scorer.
            return (native, ScoringMethod::Native);
        }

        match scorer.d_score(compatible, incompatible).await {
            Ok(d) if d.is_finite() => (
                Outcome::Computed(d),
                ScoringMethod::External {
                    name: scorer.name().to_string(),
                },
            ),
            Ok(d) => self.fallback(scorer.as_ref(), format!("non-finite score {d}"), native),
            Err(e) => self.fallback(scorer.as_ref(), format!("{e:#}"), native),
        }
    }

    fn fallback(
        &self,
        scorer: &dyn ExternalScorer,
        reason: String,
        native: Outcome<f64>,
    ) -> (Outcome<f64>, ScoringMethod) {
        tracing::warn!(
            scorer = scorer.name(),
            %reason,
            "external scorer failed, using native formula"
        );
        (
            native,
            ScoringMethod::NativeFallback {
                name: scorer.name().to_string(),
                reason,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    #[async_trait]
    impl ExternalScorer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn d_score(&self, _: &[f64], _: &[f64]) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    struct Broken;

    #[async_trait]
    impl ExternalScorer for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn d_score(&self, _: &[f64], _: &[f64]) -> anyhow::Result<f64> {
            anyhow::bail!("package not importable")
        }
    }

    const COMP: [f64; 4] = [500.0, 510.0, 520.0, 530.0];
    const INCOMP: [f64; 4] = [700.0, 710.0, 720.0, 730.0];

    #[tokio::test]
    async fn native_by_default() {
        let cap = ScoringCapability::resolve(None);
        let (d, method) = cap.d_score(&COMP, &INCOMP).await;
        assert_eq!(method, ScoringMethod::Native);
        assert!(*d.value() > 0.0);
    }

    #[tokio::test]
    async fn external_scorer_is_used() {
        let cap = ScoringCapability::resolve(Some(Arc::new(Fixed(0.42))));
        let (d, method) = cap.d_score(&COMP, &INCOMP).await;
        assert_eq!(*d.value(), 0.42);
        assert_eq!(
            method,
            ScoringMethod::External {
                name: "fixed".into()
            }
        );
    }

    #[tokio::test]
    async fn failing_scorer_falls_back() {
        let cap = ScoringCapability::resolve(Some(Arc::new(Broken)));
        let (d, method) = cap.d_score(&COMP, &INCOMP).await;
        assert_eq!(*d.value(), *statistics::d_score(&COMP, &INCOMP).value());
        match method {
            ScoringMethod::NativeFallback { name, reason } => {
                assert_eq!(name, "broken");
                assert!(reason.contains("not importable"));
            }
            other => panic!("unexpected method {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_finite_external_score_falls_back() {
        let cap = ScoringCapability::External(Arc::new(Fixed(f64::NAN)));
        let (_, method) = cap.d_score(&COMP, &INCOMP).await;
        assert!(matches!(method, ScoringMethod::NativeFallback { .. }));
    }

    #[test]
    fn method_serializes_tagged() {
        let v = serde_json::to_value(ScoringMethod::External { name: "pyiat".into() }).unwrap();
        assert_eq!(v["method"], "external");
        assert_eq!(v["name"], "pyiat");
        assert_eq!(format!("{:?}", ScoringCapability::Native), "Native");
    }
}
