//! External D-Score scorer run as a subprocess.
//!
//! The command receives `{"compatible": [...], "incompatible": [...]}` on stdin
//! and must print either `{"d_score": <number>}` or a bare number on stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use iatscore_core::scoring::{ExternalScorer, ScoringCapability};

use crate::config::ScoringSettings;

/// Scorer backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandScorer {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandScorer {
    pub fn new(
        name: impl Into<String>,
        program: PathBuf,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            program,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl ExternalScorer for CommandScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn d_score(&self, compatible: &[f64], incompatible: &[f64]) -> Result<f64> {
        let payload = serde_json::json!({
            "compatible": compatible,
            "incompatible": incompatible,
        })
        .to_string();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.program.display()))?;
        let mut stdin = child.stdin.take().context("scorer stdin not captured")?;

        // stdin and stdout must progress together
        let feed = async move {
            let written = stdin.write_all(payload.as_bytes()).await;
            drop(stdin);
            match written {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };
        let (written, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .with_context(|| format!("scorer timed out after {}s", self.timeout.as_secs()))?;

        let output = output.context("failed to run scorer")?;
        written.context("failed to write scorer input")?;
        if !output.status.success() {
            anyhow::bail!("scorer exited with {}", output.status);
        }
        parse_score(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_score(output: &str) -> Result<f64> {
    let value: serde_json::Value = serde_json::from_str(output.trim())
        .with_context(|| format!("scorer printed invalid JSON: {}", output.trim()))?;
    value
        .get("d_score")
        .unwrap_or(&value)
        .as_f64()
        .context("scorer output has no numeric d_score")
}

/// Find `program` either as a path or on `PATH`.
fn locate(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Decide once whether the configured external scorer is usable.
pub fn resolve_capability(settings: &ScoringSettings) -> ScoringCapability {
    let Some((program, args)) = settings.command.split_first() else {
        return ScoringCapability::resolve(None);
    };
    match locate(program) {
        Some(path) => ScoringCapability::resolve(Some(Arc::new(CommandScorer::new(
            settings.name.clone(),
            path,
            args.to_vec(),
            Duration::from_secs(settings.timeout_secs),
        )))),
        None => {
            tracing::warn!(
                scorer = %settings.name,
                "scorer program '{program}' not found, using native formula"
            );
            ScoringCapability::resolve(None)
        }
    }
}
