//! iatscore-report — human-readable renderings of an analysis report.
//!
//! `html` produces a self-contained page, `markdown` a summary suitable for
//! pasting into notes or issue trackers.

pub mod html;
pub mod markdown;

pub use html::{generate_html, write_html_report};
pub use markdown::to_markdown;

#[cfg(test)]
pub(crate) mod fixture {
    use iatscore_core::analyzer::{AnalysisConfig, SessionAnalyzer};
    use iatscore_core::model::{Response, Side};
    use iatscore_core::report::AnalysisResult;

    pub fn sample_report() -> AnalysisResult {
        let mut log = Vec::new();
        for block in [3u32, 4, 6, 7] {
            let base = if block >= 6 { 760 } else { 540 };
            for trial in 1..=10u32 {
                log.push(Response {
                    trial_number: trial,
                    block_number: block,
                    stimulus: format!("word-{trial}"),
                    response: Some(Side::Left),
                    response_time: base + (trial as i64 * 23) % 90,
                    correct: trial != 4 || block != 7,
                    timestamp: String::new(),
                });
            }
        }
        let analyzer = SessionAnalyzer::new(AnalysisConfig {
            bootstrap_resamples: 200,
            seed: Some(3),
            ..AnalysisConfig::default()
        });
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(analyzer.analyze(&log))
            .unwrap()
    }
}
