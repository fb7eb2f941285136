//! Engine settings and their lookup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use iatscore_core::analyzer::AnalysisConfig;

/// Top-level `iatscore.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub analysis: AnalysisConfig,
    pub session: SessionSettings,
    pub scoring: ScoringSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Seed for block shuffling; OS entropy when absent.
    pub shuffle_seed: Option<u64>,
}

/// Optional external D-Score scorer, run as a subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Program and arguments. Empty disables the external scorer.
    pub command: Vec<String>,
    /// Name recorded in reports.
    pub name: String,
    pub timeout_secs: u64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            name: "external".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Load settings from an explicit path, or search the well-known paths.
///
/// Search order when `path` is `None`:
/// 1. `iatscore.toml` in the current directory
/// 2. `~/.config/iatscore/config.toml`
///
/// Environment variable overrides: `IATSCORE_BOOTSTRAP_RESAMPLES`, `IATSCORE_SEED`,
/// `IATSCORE_INTERVAL`.
pub fn load_settings_from(path: Option<&Path>) -> Result<EngineSettings> {
    let settings_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("iatscore.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut settings = match settings_path {
        Some(path) => {
            tracing::debug!("loading settings from {}", path.display());
            parse_settings(&path)?
        }
        None => EngineSettings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn parse_settings(path: &Path) -> Result<EngineSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse config: {}", path.display()))
}

/// Apply `IATSCORE_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    settings: &mut EngineSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = lookup("IATSCORE_BOOTSTRAP_RESAMPLES") {
        settings.analysis.bootstrap_resamples = v
            .trim()
            .parse()
            .with_context(|| format!("IATSCORE_BOOTSTRAP_RESAMPLES is not a count: {v}"))?;
    }
    if let Some(v) = lookup("IATSCORE_SEED") {
        settings.analysis.seed = Some(
            v.trim()
                .parse()
                .with_context(|| format!("IATSCORE_SEED is not a u64: {v}"))?,
        );
    }
    if let Some(v) = lookup("IATSCORE_INTERVAL") {
        settings.analysis.interval = v.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("iatscore"))
}

/// Sample settings file written by `iatscore init`.
pub const SAMPLE_SETTINGS: &str = r#"# iatscore engine settings

[analysis]
# "bootstrap" (percentile bootstrap) or "fixed-margin" (D +/- 0.2)
interval = "bootstrap"
bootstrap_resamples = 1000
max_workers = 8
# seed = 42

[session]
# shuffle_seed = 7

[scoring]
# External D-Score scorer. Receives {"compatible": [...], "incompatible": [...]}
# on stdin and prints {"d_score": <number>}.
# command = ["python3", "scripts/pyiat_score.py"]
# name = "pyiat"
timeout_secs = 10
"#;
