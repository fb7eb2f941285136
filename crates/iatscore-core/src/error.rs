//! Engine error types.
//!
//! These are the failures a caller must see as a structured error. Conditions
//! that only make one metric unavailable are not errors; they travel inside the
//! report as [`crate::outcome::DataIssue`]s instead.

use thiserror::Error;

/// Errors surfaced by the session engine and analyzers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IatError {
    /// A required field was absent from a config or response payload.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field was present but had the wrong shape or value.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The test configuration cannot produce a block design.
    #[error("invalid test configuration: {0}")]
    InvalidConfig(String),

    /// `start_session` was called before any configuration was created.
    #[error("no test configuration loaded")]
    NoConfig,

    /// A response or result request arrived with no session started.
    #[error("no active session")]
    NoActiveSession,

    /// The session was closed by a results request and no longer accepts responses.
    #[error("session {0} is completed and no longer accepts responses")]
    SessionCompleted(String),

    /// Scoring was requested over an empty response set.
    #[error("no responses recorded in session")]
    NoResponses,

    /// A concurrent analysis task panicked or was cancelled.
    #[error("analysis task failed: {0}")]
    Internal(String),
}

/// Coarse classification of an [`IatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incomplete request data.
    Configuration,
    /// An operation called in the wrong session phase.
    Lifecycle,
    /// Not enough data to produce any report.
    Data,
    /// A fault inside the engine itself.
    Internal,
}

impl IatError {
    /// Returns the taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IatError::MissingField(_)
            | IatError::InvalidField { .. }
            | IatError::InvalidConfig(_) => ErrorKind::Configuration,
            IatError::NoConfig | IatError::NoActiveSession | IatError::SessionCompleted(_) => {
                ErrorKind::Lifecycle
            }
            IatError::NoResponses => ErrorKind::Data,
            IatError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if the caller sent a malformed request.
    pub fn is_configuration_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}
