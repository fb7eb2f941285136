//! iatscore-bridge — JSON action dispatch between a host process and the engine.
//!
//! Decodes `{"action": ...}` requests, routes them to a
//! [`iatscore_core::SessionEngine`], and encodes every outcome as a
//! `{"success": ...}` reply. Also owns the engine settings file and the
//! optional external scorer.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod scorer;

pub use config::{load_settings_from, EngineSettings};
pub use dispatcher::Dispatcher;
pub use error::BridgeError;
pub use protocol::{Reply, ReplyBody, Request};

use iatscore_core::{SessionAnalyzer, SessionEngine};

/// Build a session engine from settings, resolving the scorer once.
pub fn build_engine(settings: &EngineSettings) -> SessionEngine {
    let capability = scorer::resolve_capability(&settings.scoring);
    let analyzer = SessionAnalyzer::new(settings.analysis.clone()).with_capability(capability);
    SessionEngine::new(analyzer).with_shuffle_seed(settings.session.shuffle_seed)
}
