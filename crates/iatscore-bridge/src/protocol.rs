//! Request and reply shapes exchanged with the host process.
//!
//! Requests are JSON objects dispatched on their `action` field. A request
//! with no action but a `responses` array is the analysis-only entry point.
//! Every reply carries `success` and a `timestamp`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use iatscore_core::model::{Response, TestConfig};
use iatscore_core::report::AnalysisResult;
use iatscore_core::session::{ResponseAck, SessionResults, SessionStarted};

use crate::error::BridgeError;

/// A decoded host request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateConfig {
        config: Value,
    },
    StartSession {
        session_id: Option<String>,
        participant_id: Option<String>,
        test_config: Option<Value>,
    },
    ProcessResponse {
        response: Value,
    },
    GetResults,
    Analyze {
        responses: Vec<Response>,
    },
}

impl Request {
    /// Action name, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Request::CreateConfig { .. } => "create_config",
            Request::StartSession { .. } => "start_session",
            Request::ProcessResponse { .. } => "process_response",
            Request::GetResults => "get_results",
            Request::Analyze { .. } => "analyze",
        }
    }

    pub fn parse_line(line: &str) -> Result<Self, BridgeError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| BridgeError::MalformedRequest(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        let Value::Object(mut obj) = value else {
            return Err(BridgeError::MalformedRequest("expected a JSON object".into()));
        };

        let action = match obj.get("action") {
            Some(Value::String(a)) => a.clone(),
            Some(other) => {
                return Err(BridgeError::MalformedRequest(format!(
                    "action must be a string, got {other}"
                )))
            }
            None if obj.contains_key("responses") => "analyze".to_string(),
            None => return Err(BridgeError::MalformedRequest("missing action".into())),
        };

        let text = |obj: &serde_json::Map<String, Value>, key: &str| {
            obj.get(key).and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
        };

        match action.as_str() {
            "create_config" => Ok(Request::CreateConfig {
                config: obj.remove("config").unwrap_or(Value::Null),
            }),
            "start_session" => Ok(Request::StartSession {
                session_id: text(&obj, "session_id"),
                participant_id: text(&obj, "participant_id"),
                test_config: obj.remove("test_config").filter(|v| !v.is_null()),
            }),
            "process_response" => Ok(Request::ProcessResponse {
                response: obj.remove("response").unwrap_or(Value::Null),
            }),
            "get_results" => Ok(Request::GetResults),
            "analyze" => {
                let responses = obj.remove("responses").unwrap_or(Value::Null);
                let responses: Vec<Response> =
                    serde_json::from_value(responses).map_err(|e| {
                        BridgeError::MalformedRequest(format!(
                            "responses must be an array of responses: {e}"
                        ))
                    })?;
                Ok(Request::Analyze { responses })
            }
            other => Err(BridgeError::UnrecognizedAction(other.to_string())),
        }
    }
}

/// Successful reply payloads. Each serializes to its own top-level key.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Config { config: TestConfig },
    Session { session: SessionStarted },
    Result { result: ResponseAck },
    Results { results: SessionResults },
    Analysis { analysis: AnalysisResult },
    Error { error: String, error_kind: &'static str },
}

/// One reply line.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub success: bool,
    #[serde(flatten)]
    pub body: ReplyBody,
    pub timestamp: DateTime<Utc>,
}

impl Reply {
    pub fn ok(body: ReplyBody) -> Self {
        Self {
            success: true,
            body,
            timestamp: Utc::now(),
        }
    }

    pub fn error(err: &BridgeError) -> Self {
        Self {
            success: false,
            body: ReplyBody::Error {
                error: err.to_string(),
                error_kind: err.kind(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Serialize to a single JSON line.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"error":"failed to serialize reply: {}","timestamp":"{}"}}"#,
                e.to_string().replace('"', "'"),
                self.timestamp.to_rfc3339()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_actions() {
        let req = Request::from_value(json!({"action": "get_results"})).unwrap();
        assert_eq!(req, Request::GetResults);

        let req = Request::from_value(json!({
            "action": "start_session",
            "session_id": "abc",
            "participant_id": 42
        }))
        .unwrap();
        assert_eq!(
            req,
            Request::StartSession {
                session_id: Some("abc".into()),
                participant_id: Some("42".into()),
                test_config: None,
            }
        );
    }

    #[test]
    fn responses_without_action_is_analysis() {
        let req = Request::from_value(json!({
            "responses": [{
                "trial_number": 1,
                "block_number": 3,
                "response_time": 500,
                "correct": true
            }]
        }))
        .unwrap();
        match req {
            Request::Analyze { responses } => {
                assert_eq!(responses.len(), 1);
                assert_eq!(responses[0].response_time, 500);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_reported_by_name() {
        let err = Request::from_value(json!({"action": "explode"})).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized action: explode");
    }

    #[test]
    fn malformed_lines() {
        assert!(matches!(
            Request::parse_line("{not json"),
            Err(BridgeError::MalformedRequest(_))
        ));
        assert!(matches!(
            Request::parse_line("[1, 2]"),
            Err(BridgeError::MalformedRequest(_))
        ));
        assert!(matches!(
            Request::parse_line("{}"),
            Err(BridgeError::MalformedRequest(_))
        ));
    }

    #[test]
    fn error_reply_shape() {
        let reply = Reply::error(&BridgeError::UnrecognizedAction("x".into()));
        let v: Value = serde_json::from_str(&reply.to_line()).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "unrecognized action: x");
        assert_eq!(v["error_kind"], "protocol");
        assert!(v["timestamp"].is_string());
    }
}
