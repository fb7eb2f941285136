//! Test-configuration and response payload parsing.
//!
//! Payloads arrive as JSON objects from the host (or as JSON/TOML files for
//! the CLI). Required identity fields are checked explicitly so a missing one
//! is reported by name instead of as a generic deserialization failure.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::error::IatError;
use crate::model::{Response, Side, SidedLabels, TestConfig};

/// Required test-config fields, in the order they are checked, with accepted spellings.
const REQUIRED_CONFIG_FIELDS: [(&str, &[&str]); 4] = [
    ("test_id", &["test_id", "testId"]),
    ("name", &["name"]),
    ("categories", &["categories"]),
    ("attributes", &["attributes"]),
];

fn lookup<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|n| obj.get(*n))
        .filter(|v| !v.is_null())
}

fn as_object<'a>(value: &'a Value, what: &'static str) -> Result<&'a Map<String, Value>, IatError> {
    value.as_object().ok_or_else(|| IatError::InvalidField {
        field: what,
        reason: "expected a JSON object".into(),
    })
}

fn parse_labels(value: &Value, field: &'static str) -> Result<SidedLabels, IatError> {
    let labels: SidedLabels =
        serde_json::from_value(value.clone()).map_err(|e| IatError::InvalidField {
            field,
            reason: format!("expected {{\"left\": [..], \"right\": [..]}}: {e}"),
        })?;
    for side in Side::BOTH {
        if labels.side(side).is_empty() {
            return Err(IatError::InvalidField {
                field,
                reason: format!("{side} must contain at least one label"),
            });
        }
    }
    Ok(labels)
}

/// Build a [`TestConfig`] from a JSON payload, filling optional sections with defaults.
pub fn parse_test_config(value: &Value) -> Result<TestConfig, IatError> {
    let obj = as_object(value, "config")?;
    for (field, names) in REQUIRED_CONFIG_FIELDS {
        if lookup(obj, names).is_none() {
            return Err(IatError::MissingField(field));
        }
    }
    // Checked separately for a field-specific message.
    if let Some(v) = obj.get("categories") {
        parse_labels(v, "categories")?;
    }
    if let Some(v) = obj.get("attributes") {
        parse_labels(v, "attributes")?;
    }

    serde_json::from_value(value.clone()).map_err(|e| IatError::InvalidField {
        field: "config",
        reason: e.to_string(),
    })
}

/// Load a test configuration from a `.json` or `.toml` file.
pub fn load_test_config(path: &Path) -> Result<TestConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read test config: {}", path.display()))?;

    let value: Value = if path.extension().is_some_and(|ext| ext == "toml") {
        let parsed: toml::Value = toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        serde_json::to_value(parsed).context("failed to convert TOML config")?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON: {}", path.display()))?
    };

    parse_test_config(&value).with_context(|| format!("invalid test config: {}", path.display()))
}

/// A response payload after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub response: Response,
    /// Correctness as reported by the client, if it sent one.
    pub correct: Option<bool>,
}

fn integer_field(
    obj: &Map<String, Value>,
    field: &'static str,
    names: &[&str],
) -> Result<u32, IatError> {
    let value = lookup(obj, names).ok_or(IatError::MissingField(field))?;
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| IatError::InvalidField {
            field,
            reason: format!("expected a non-negative integer, got {value}"),
        })
}

/// Validate a `process_response` payload.
///
/// Trial number, block number, stimulus, response and response time are required.
/// An unrecognised response key is kept as "no answer" rather than rejected.
pub fn parse_response(value: &Value) -> Result<ParsedResponse, IatError> {
    let obj = as_object(value, "response")?;

    let trial_number = integer_field(obj, "trial_number", &["trial_number", "trialNumber"])?;
    let block_number = integer_field(obj, "block_number", &["block_number", "blockNumber"])?;

    let stimulus = match lookup(obj, &["stimulus"]).ok_or(IatError::MissingField("stimulus"))? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let side = lookup(obj, &["response"]).ok_or(IatError::MissingField("response"))?;
    let side = side.as_str().and_then(|s| s.parse::<Side>().ok());

    let rt = lookup(obj, &["response_time", "responseTime"])
        .ok_or(IatError::MissingField("response_time"))?;
    let response_time = rt
        .as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| IatError::InvalidField {
            field: "response_time",
            reason: format!("expected milliseconds as a number, got {rt}"),
        })?
        .round() as i64;

    let correct = obj.get("correct").and_then(Value::as_bool);
    let timestamp = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    Ok(ParsedResponse {
        response: Response {
            trial_number,
            block_number,
            stimulus,
            response: side,
            response_time,
            correct: correct.unwrap_or(false),
            timestamp,
        },
        correct,
    })
}

/// A non-fatal issue found in a test configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The offending label, if the warning concerns one.
    pub label: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn general(message: impl Into<String>) -> Self {
        Self {
            label: None,
            message: message.into(),
        }
    }

    fn for_label(label: &str, message: impl Into<String>) -> Self {
        Self {
            label: Some(label.to_string()),
            message: message.into(),
        }
    }
}

/// Check a test configuration for issues that do not prevent a session but
/// make its scoring ambiguous.
pub fn validate_test_config(config: &TestConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for (name, labels) in [
        ("categories", &config.categories),
        ("attributes", &config.attributes),
    ] {
        for side in Side::BOTH {
            let mut seen = HashSet::new();
            for label in labels.side(side) {
                if label.trim().is_empty() {
                    warnings.push(ValidationWarning::for_label(
                        label,
                        format!("{name}.{side} has a blank label"),
                    ));
                } else if !seen.insert(label) {
                    warnings.push(ValidationWarning::for_label(
                        label,
                        format!("duplicate label in {name}.{side}: {label}"),
                    ));
                }
            }
        }
        for label in &labels.left {
            if labels.right.contains(label) {
                warnings.push(ValidationWarning::for_label(
                    label,
                    format!("label '{label}' appears on both sides of {name}"),
                ));
            }
        }
    }

    let categories: HashSet<&String> = config
        .categories
        .left
        .iter()
        .chain(&config.categories.right)
        .collect();
    let mut reported = HashSet::new();
    for label in config.attributes.left.iter().chain(&config.attributes.right) {
        if categories.contains(label) && reported.insert(label) {
            warnings.push(ValidationWarning::for_label(
                label,
                format!("label '{label}' is both a category and an attribute"),
            ));
        }
    }

    if config.blocks_config.len() != crate::blocks::BLOCK_COUNT {
        warnings.push(ValidationWarning::general(format!(
            "blocks_config has {} entries; sessions always use the {}-block design",
            config.blocks_config.len(),
            crate::blocks::BLOCK_COUNT
        )));
    }
    for spec in &config.blocks_config {
        if spec.trials == 0 {
            warnings.push(ValidationWarning::general(format!(
                "block '{}' has zero trials",
                spec.block_type
            )));
        }
    }

    warnings
}
