//! The `iatscore analyze` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use iatscore_bridge::{build_engine, load_settings_from};
use iatscore_core::model::Response;
use iatscore_core::report::AnalysisResult;

#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseLog {
    Document { responses: Vec<Response> },
    Bare(Vec<Response>),
}

pub async fn execute(
    input: PathBuf,
    format: String,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let settings = load_settings_from(config.as_deref())?;
    let responses = read_responses(&input)?;

    let engine = build_engine(&settings);
    let report = engine.analyzer().analyze_concurrent(&responses).await?;
    if report.is_degraded() {
        eprintln!(
            "Warning: {} metric(s) fell back to defaults",
            report.degradations.len()
        );
    }

    match (format.as_str(), output) {
        ("json", Some(path)) => {
            report.save_json(&path)?;
            eprintln!("Report saved to {}", path.display());
            Ok(())
        }
        (format, output) => emit(&render(&report, format)?, output),
    }
}

/// Render `report` in one of the supported output formats.
pub fn render(report: &AnalysisResult, format: &str) -> Result<String> {
    Ok(match format {
        "json" => serde_json::to_string_pretty(report)?,
        "markdown" | "md" => iatscore_report::to_markdown(report),
        "html" => iatscore_report::generate_html(report),
        "text" => render_text(report),
        other => anyhow::bail!("unknown format: {other} (expected json, text, markdown or html)"),
    })
}

/// Write `rendered` to `output`, or to stdout.
pub fn emit(rendered: &str, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            eprintln!("Report saved to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn read_responses(path: &Path) -> Result<Vec<Response>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read responses: {}", path.display()))?;
    let log: ResponseLog = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse responses: {}", path.display()))?;
    Ok(match log {
        ResponseLog::Document { responses } | ResponseLog::Bare(responses) => responses,
    })
}

fn render_text(report: &AnalysisResult) -> String {
    use comfy_table::{Cell, Table};

    let d = &report.d_score;
    let ci = &d.confidence_interval;

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    let rows = [
        ("D-Score", format!("{:.3}", d.value)),
        ("Interpretation", d.interpretation.to_string()),
        (
            "95% interval",
            format!("[{:.3}, {:.3}] ({})", ci.lower, ci.upper, ci.method),
        ),
        (
            "p-value",
            d.p_value
                .map(|p| format!("{p:.4}"))
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("Significant", if d.significant { "yes" } else { "no" }.to_string()),
        ("Effect size", d.effect_size.to_string()),
        ("Scoring", d.scoring_method.to_string()),
        ("Accuracy", format!("{:.1}%", report.performance.accuracy * 100.0)),
        ("Mean RT", format!("{:.0} ms", report.performance.mean_rt)),
        ("Error pattern", report.errors.pattern.to_string()),
        ("Data quality", format!("{:.3}", report.data_quality_score)),
        (
            "Split-half reliability",
            format!("{:.3}", report.reliability.split_half_reliability),
        ),
        (
            "Trials",
            format!("{} ({} discarded)", report.trial_count, report.discarded_trials),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }

    let mut text = table.to_string();
    for deg in &report.degradations {
        text.push_str(&format!("\nWARNING: {} degraded: {}", deg.metric, deg.issue));
    }
    text
}
