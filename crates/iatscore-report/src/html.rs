//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use iatscore_core::block_analysis::BlockSummary;
use iatscore_core::report::{AnalysisResult, CurvePoint};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Generate an HTML report from an analysis result.
pub fn generate_html(report: &AnalysisResult) -> String {
    let mut html = String::new();
    let d = &report.d_score;

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>IAT report: D = {:.3}</title>\n",
        d.value
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    html.push_str("<header>\n");
    html.push_str("<h1>IAT analysis report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">{} trials ({} discarded) | scored by {} | {}</p>\n",
        report.trial_count,
        report.discarded_trials,
        html_escape(&d.scoring_method.to_string()),
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // D-Score
    let ci = &d.confidence_interval;
    let p_value = d
        .p_value
        .map(|p| format!("{p:.4}"))
        .unwrap_or_else(|| "-".to_string());
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>D-Score</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>D</th><th>Interpretation</th><th>95% interval</th><th>Interval method</th><th>p</th><th>Significant</th><th>Effect size</th></tr></thead>\n");
    html.push_str(&format!(
        "<tbody><tr><td class=\"{}\">{:.3}</td><td>{}</td><td>[{:.3}, {:.3}]</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr></tbody>\n",
        if d.value >= 0.0 { "positive" } else { "negative" },
        d.value,
        d.interpretation,
        ci.lower,
        ci.upper,
        interval_label(report),
        p_value,
        if d.significant { "yes" } else { "no" },
        d.effect_size,
    ));
    html.push_str("</table>\n");
    html.push_str("</section>\n");

    // Blocks
    html.push_str("<section class=\"blocks\">\n");
    html.push_str("<h2>Blocks</h2>\n");
    html.push_str("<table class=\"results-table\">\n");
    html.push_str("<thead><tr><th>Pairing</th><th>Trials</th><th>Mean RT</th><th>Median RT</th><th>SD</th><th>Accuracy</th><th>Fast</th><th>Slow</th><th>Outliers</th><th>Learning</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    html.push_str(&block_row("compatible (3, 4)", &report.compatible_blocks));
    html.push_str(&block_row("incompatible (6, 7)", &report.incompatible_blocks));
    html.push_str("</tbody></table>\n");

    if !report.performance.learning_curve.is_empty() {
        html.push_str("<h3>Learning curve</h3>\n");
        html.push_str(&generate_curve_chart(&report.performance.learning_curve));
    }
    html.push_str("</section>\n");

    // Quality
    html.push_str("<section class=\"quality\">\n");
    html.push_str("<h2>Quality</h2>\n");
    html.push_str("<table class=\"summary\">\n<tbody>\n");
    let rows = [
        ("Accuracy", format!("{:.1}%", report.performance.accuracy * 100.0)),
        ("Mean RT", format!("{:.0} ms", report.performance.mean_rt)),
        ("Error pattern", report.errors.pattern.to_string()),
        (
            "Errors",
            format!(
                "{} ({:.1}%)",
                report.errors.total_errors,
                report.errors.error_rate * 100.0
            ),
        ),
        ("Fatigue effect", format!("{:+.3}", report.fatigue_effect)),
        ("Attention focus", format!("{:.3}", report.attention.focus)),
        ("Attention stability", format!("{:.3}", report.attention.stability)),
        ("Data quality", format!("{:.3}", report.data_quality_score)),
        ("Split-half reliability", format!("{:.3}", report.reliability.split_half_reliability)),
        ("Test-retest reliability", format!("{:.3}", report.reliability.test_retest_reliability)),
    ];
    for (label, value) in rows {
        html.push_str(&format!(
            "<tr><th>{}</th><td>{}</td></tr>\n",
            label,
            html_escape(&value)
        ));
    }
    html.push_str("</tbody></table>\n");

    if !report.degradations.is_empty() {
        html.push_str("<h3>Degraded metrics</h3>\n<ul class=\"degraded\">\n");
        for deg in &report.degradations {
            html.push_str(&format!(
                "<li><strong>{}</strong>: {}</li>\n",
                deg.metric,
                html_escape(&deg.issue.to_string())
            ));
        }
        html.push_str("</ul>\n");
    }
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &AnalysisResult, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

pub(crate) fn interval_label(report: &AnalysisResult) -> String {
    let ci = &report.d_score.confidence_interval;
    match (ci.resamples, ci.seed) {
        (Some(n), Some(seed)) => format!("{} ({n} resamples, seed {seed})", ci.method),
        (Some(n), None) => format!("{} ({n} resamples)", ci.method),
        _ => ci.method.to_string(),
    }
}

fn block_row(label: &str, b: &BlockSummary) -> String {
    format!(
        "<tr><td>{}</td><td>{}</td><td>{:.0}</td><td>{:.0}</td><td>{:.1}</td><td>{:.1}%</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{:+.3}</td></tr>\n",
        label,
        b.trial_count,
        b.mean_rt,
        b.median_rt,
        b.std_rt,
        b.accuracy * 100.0,
        b.fast_trials,
        b.slow_trials,
        b.outlier_rate * 100.0,
        b.learning_effect,
    )
}

fn generate_curve_chart(curve: &[CurvePoint]) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 120;

    let slowest = curve.iter().map(|p| p.mean_rt).fold(0.0_f64, f64::max);
    let total_height = curve.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 80,
        total_height
    );

    for (i, point) in curve.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let share = if slowest > 0.0 { point.mean_rt / slowest } else { 0.0 };
        let width = (share * max_width as f64) as usize;

        let color = match point.block_number {
            3 | 4 => "#22c55e",
            6 | 7 => "#ef4444",
            _ => "#9ca3af",
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">block {}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            point.block_number
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.0} ms</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            point.mean_rt
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pos: #dcfce7; --neg: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pos: #064e3b; --neg: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); }
.positive { background: var(--pos); }
.negative { background: var(--neg); }
.degraded li { margin: 0.25rem 0; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::sample_report;
    use iatscore_core::outcome::{DataIssue, Degradation, Metric};

    #[test]
    fn html_report_contains_required_elements() {
        let report = sample_report();
        let html = generate_html(&report);

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("D-Score"));
        assert!(html.contains(report.d_score.interpretation.as_str()));
        assert!(html.contains("bootstrap (200 resamples, seed 3)"));
        assert!(html.contains("block 7"));
        assert!(!html.contains("Degraded metrics"));
    }

    #[test]
    fn html_lists_degradations() {
        let mut report = sample_report();
        report.degradations.push(Degradation {
            metric: Metric::Reliability,
            issue: DataIssue::TooFewTrials {
                required: 4,
                found: 2,
            },
        });
        let html = generate_html(&report);
        assert!(html.contains("Degraded metrics"));
        assert!(html.contains("<strong>reliability</strong>: needs at least 4 trials, found 2"));
    }

    #[test]
    fn html_escapes_scorer_name() {
        let mut report = sample_report();
        report.d_score.scoring_method = iatscore_core::scoring::ScoringMethod::External {
            name: "<script>".into(),
        };
        let html = generate_html(&report);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn html_report_write_to_file() {
        let report = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.html");

        write_html_report(&report, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));
    }
}
