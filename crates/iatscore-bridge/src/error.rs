//! Bridge error types.

use thiserror::Error;

use iatscore_core::error::{ErrorKind, IatError};

/// Errors surfaced as `{ "success": false, "error": ... }` replies.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The request named an action this engine does not handle.
    #[error("unrecognized action: {0}")]
    UnrecognizedAction(String),

    /// The request line was not a JSON object of the expected shape.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The engine rejected the request.
    #[error(transparent)]
    Engine(#[from] IatError),

    /// A handler panicked.
    #[error("internal error: {0}")]
    Panic(String),
}

impl BridgeError {
    /// Short class name reported alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::UnrecognizedAction(_) | BridgeError::MalformedRequest(_) => "protocol",
            BridgeError::Engine(e) => match e.kind() {
                ErrorKind::Configuration => "configuration",
                ErrorKind::Lifecycle => "lifecycle",
                ErrorKind::Data => "data",
                ErrorKind::Internal => "internal",
            },
            BridgeError::Panic(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_action_message() {
        let err = BridgeError::UnrecognizedAction("explode".into());
        assert_eq!(err.to_string(), "unrecognized action: explode");
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn engine_errors_keep_message_and_class() {
        let err = BridgeError::from(IatError::MissingField("name"));
        assert_eq!(err.to_string(), "missing required field: name");
        assert_eq!(err.kind(), "configuration");
        assert_eq!(BridgeError::from(IatError::NoResponses).kind(), "data");
    }
}
