//! The `iatscore render` command.

use std::path::PathBuf;

use anyhow::Result;

use iatscore_core::report::AnalysisResult;

use super::analyze::{emit, render};

pub fn execute(report: PathBuf, format: String, output: Option<PathBuf>) -> Result<()> {
    let report = AnalysisResult::load_json(&report)?;
    emit(&render(&report, &format)?, output)
}
