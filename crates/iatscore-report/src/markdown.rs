//! Markdown summary of an analysis report.

use std::fmt::Write;

use iatscore_core::block_analysis::BlockSummary;
use iatscore_core::report::AnalysisResult;

use crate::html::interval_label;

/// Render `report` as a markdown document.
pub fn to_markdown(report: &AnalysisResult) -> String {
    let mut md = String::new();
    let d = &report.d_score;
    let ci = &d.confidence_interval;

    // Writing into a String cannot fail.
    let _ = writeln!(md, "# IAT analysis report\n");
    let _ = writeln!(
        md,
        "_{} trials, {} discarded, generated {}_\n",
        report.trial_count,
        report.discarded_trials,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let _ = writeln!(md, "## D-Score\n");
    let _ = writeln!(md, "| Metric | Value |");
    let _ = writeln!(md, "|--------|-------|");
    let _ = writeln!(md, "| D | {:.3} |", d.value);
    let _ = writeln!(md, "| Interpretation | {} |", d.interpretation);
    let _ = writeln!(
        md,
        "| 95% interval | [{:.3}, {:.3}] {} |",
        ci.lower,
        ci.upper,
        interval_label(report)
    );
    match d.p_value {
        Some(p) => {
            let _ = writeln!(md, "| p | {p:.4} |");
        }
        None => {
            let _ = writeln!(md, "| p | - |");
        }
    }
    let _ = writeln!(md, "| Significant | {} |", if d.significant { "yes" } else { "no" });
    let _ = writeln!(md, "| Effect size | {} |", d.effect_size);
    let _ = writeln!(md, "| Scoring | {} |\n", d.scoring_method);

    let _ = writeln!(md, "## Blocks\n");
    let _ = writeln!(md, "| Pairing | Trials | Mean RT | Median RT | SD | Accuracy |");
    let _ = writeln!(md, "|---------|--------|---------|-----------|----|----------|");
    block_line(&mut md, "compatible", &report.compatible_blocks);
    block_line(&mut md, "incompatible", &report.incompatible_blocks);
    md.push('\n');

    if !report.performance.learning_curve.is_empty() {
        let curve: Vec<String> = report
            .performance
            .learning_curve
            .iter()
            .map(|p| format!("{}: {:.0} ms", p.block_number, p.mean_rt))
            .collect();
        let _ = writeln!(md, "Learning curve: {}\n", curve.join(", "));
    }

    let _ = writeln!(md, "## Quality\n");
    let _ = writeln!(md, "- Accuracy: {:.1}%", report.performance.accuracy * 100.0);
    let _ = writeln!(
        md,
        "- Errors: {} ({})",
        report.errors.total_errors, report.errors.pattern
    );
    let _ = writeln!(md, "- Fatigue effect: {:+.3}", report.fatigue_effect);
    let _ = writeln!(md, "- Data quality: {:.3}", report.data_quality_score);
    let _ = writeln!(
        md,
        "- Split-half reliability: {:.3}",
        report.reliability.split_half_reliability
    );

    if !report.degradations.is_empty() {
        let _ = writeln!(md, "\n## Degraded metrics\n");
        for deg in &report.degradations {
            let _ = writeln!(md, "- `{}`: {}", deg.metric, deg.issue);
        }
    }

    md
}

fn block_line(md: &mut String, label: &str, b: &BlockSummary) {
    let _ = writeln!(
        md,
        "| {} | {} | {:.0} | {:.0} | {:.1} | {:.1}% |",
        label,
        b.trial_count,
        b.mean_rt,
        b.median_rt,
        b.std_rt,
        b.accuracy * 100.0
    );
}
