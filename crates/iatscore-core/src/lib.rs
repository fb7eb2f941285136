//! iatscore-core — IAT session engine and D-Score scoring.
//!
//! This crate defines the data model, the 7-block design generator, the
//! session lifecycle, and the statistics that turn a response log into an
//! [`report::AnalysisResult`].

pub mod analyzer;
pub mod block_analysis;
pub mod blocks;
pub mod error;
pub mod model;
pub mod outcome;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod session;
pub mod statistics;

pub use analyzer::{AnalysisConfig, SessionAnalyzer};
pub use error::{ErrorKind, IatError};
pub use session::{SessionContext, SessionEngine};
