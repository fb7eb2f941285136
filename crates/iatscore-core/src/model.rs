//! Core data model types for iatscore.
//!
//! Test configurations, the generated block/stimulus design, and the
//! participant responses that the scoring engine consumes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Response times at or below this value are not analyzable.
pub const MIN_RESPONSE_TIME_MS: i64 = 0;
/// Response times at or above this value are not analyzable.
pub const MAX_RESPONSE_TIME_MS: i64 = 10_000;

/// A response key / screen side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Which category/attribute mapping a combined block uses.
///
/// The mapping from block numbers to pairings is fixed by the 7-block design:
/// blocks 3 and 4 are compatible, blocks 6 and 7 are incompatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pairing {
    Compatible,
    Incompatible,
}

impl Pairing {
    pub const BOTH: [Pairing; 2] = [Pairing::Compatible, Pairing::Incompatible];

    /// Block numbers scored under this pairing.
    pub fn block_numbers(&self) -> &'static [u32] {
        match self {
            Pairing::Compatible => &[3, 4],
            Pairing::Incompatible => &[6, 7],
        }
    }

    /// The pairing a block number belongs to, if any.
    pub fn of_block(block_number: u32) -> Option<Pairing> {
        Pairing::BOTH
            .into_iter()
            .find(|p| p.block_numbers().contains(&block_number))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pairing::Compatible => "compatible",
            Pairing::Incompatible => "incompatible",
        }
    }
}

impl fmt::Display for Pairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels assigned to the left and right response keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SidedLabels {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl SidedLabels {
    pub fn side(&self, side: Side) -> &[String] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Total number of labels across both sides.
    pub fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One entry of the configured block plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Block type name (e.g. "practice_combined").
    #[serde(rename = "type")]
    pub block_type: String,
    /// Number of trials the block is meant to have.
    pub trials: u32,
    /// Whether the block is unscored practice.
    #[serde(default)]
    pub is_practice: bool,
}

/// A complete IAT test definition. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Unique identifier for this test.
    #[serde(alias = "testId")]
    pub test_id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Category labels per side.
    pub categories: SidedLabels,
    /// Attribute labels per side.
    pub attributes: SidedLabels,
    /// Display text per phase name.
    #[serde(default = "default_instructions")]
    pub instructions: BTreeMap<String, String>,
    /// Phase durations in milliseconds.
    #[serde(default = "default_timing")]
    pub timing: BTreeMap<String, u64>,
    /// The configured block plan.
    #[serde(default = "default_blocks_config", alias = "blocksConfig")]
    pub blocks_config: Vec<BlockSpec>,
}

pub fn default_instructions() -> BTreeMap<String, String> {
    [
        ("welcome", "Welcome to the implicit association test"),
        ("practice", "This is a practice round"),
        ("test", "This is the real test"),
        ("reverse", "The categories have switched sides"),
        ("complete", "Test complete!"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn default_timing() -> BTreeMap<String, u64> {
    [
        ("stimulus_duration", 2000),
        ("response_timeout", 5000),
        ("feedback_duration", 1000),
        ("block_break", 3000),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn default_blocks_config() -> Vec<BlockSpec> {
    [
        ("practice_categories", 10, true),
        ("practice_attributes", 10, true),
        ("practice_combined", 20, true),
        ("test_combined", 40, false),
        ("reverse_categories", 10, true),
        ("reverse_combined", 20, true),
        ("reverse_test", 40, false),
    ]
    .into_iter()
    .map(|(t, trials, is_practice)| BlockSpec {
        block_type: t.to_string(),
        trials,
        is_practice,
    })
    .collect()
}

/// Whether a stimulus label came from the category or the attribute lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelSource {
    Category,
    Attribute,
}

/// What a stimulus asks the participant to sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StimulusKind {
    Category(Side),
    Attribute(Side),
    Combined(Side),
}

impl StimulusKind {
    /// The side whose key is the correct answer.
    pub fn side(&self) -> Side {
        match *self {
            StimulusKind::Category(s) | StimulusKind::Attribute(s) | StimulusKind::Combined(s) => s,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StimulusKind::Category(Side::Left) => "category_left",
            StimulusKind::Category(Side::Right) => "category_right",
            StimulusKind::Attribute(Side::Left) => "attribute_left",
            StimulusKind::Attribute(Side::Right) => "attribute_right",
            StimulusKind::Combined(Side::Left) => "combined_left",
            StimulusKind::Combined(Side::Right) => "combined_right",
        }
    }
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trial stimulus, owned by its [`Block`].
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulus {
    /// Text shown to the participant (the label itself).
    pub text: String,
    pub source: LabelSource,
    pub kind: StimulusKind,
    pub block_number: u32,
    /// 1-based position within the block.
    pub trial_number: u32,
}

impl Stimulus {
    pub fn correct_response(&self) -> Side {
        self.kind.side()
    }
}

// Wire form keeps `category`/`attribute` as two string fields, one empty.
impl Serialize for Stimulus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (category, attribute) = match self.source {
            LabelSource::Category => (self.text.as_str(), ""),
            LabelSource::Attribute => ("", self.text.as_str()),
        };
        let mut st = serializer.serialize_struct("Stimulus", 7)?;
        st.serialize_field("text", &self.text)?;
        st.serialize_field("category", category)?;
        st.serialize_field("attribute", attribute)?;
        st.serialize_field("correct_response", &self.correct_response())?;
        st.serialize_field("stimulus_type", self.kind.as_str())?;
        st.serialize_field("block_number", &self.block_number)?;
        st.serialize_field("trial_number", &self.trial_number)?;
        st.end()
    }
}

/// The role a block plays in the 7-block design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    PracticeCategories(Side),
    PracticeAttributes(Side),
    PracticeCombined(Pairing),
    TestCombined(Pairing),
}

impl BlockKind {
    /// Presentation order of the canonical design; index + 1 is the block number.
    pub const CANONICAL_SEQUENCE: [BlockKind; 7] = [
        BlockKind::PracticeCategories(Side::Left),
        BlockKind::PracticeAttributes(Side::Right),
        BlockKind::PracticeCombined(Pairing::Compatible),
        BlockKind::TestCombined(Pairing::Compatible),
        BlockKind::PracticeCategories(Side::Right),
        BlockKind::PracticeCombined(Pairing::Incompatible),
        BlockKind::TestCombined(Pairing::Incompatible),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::PracticeCategories(_) => "practice_categories",
            BlockKind::PracticeAttributes(_) => "practice_attributes",
            BlockKind::PracticeCombined(_) => "practice_combined",
            BlockKind::TestCombined(_) => "test_combined",
        }
    }

    pub fn is_practice(&self) -> bool {
        !matches!(self, BlockKind::TestCombined(_))
    }

    /// True exactly for the incompatible combined blocks.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            BlockKind::PracticeCombined(Pairing::Incompatible)
                | BlockKind::TestCombined(Pairing::Incompatible)
        )
    }
}

/// An ordered group of trials presented under one instruction screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// 1-based presentation position.
    pub block_number: u32,
    pub kind: BlockKind,
    pub instructions: String,
    pub stimuli: Vec<Stimulus>,
}

impl Block {
    pub fn is_practice(&self) -> bool {
        self.kind.is_practice()
    }

    pub fn is_reverse(&self) -> bool {
        self.kind.is_reverse()
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("Block", 6)?;
        st.serialize_field("block_number", &self.block_number)?;
        st.serialize_field("block_type", self.kind.as_str())?;
        st.serialize_field("instructions", &self.instructions)?;
        st.serialize_field("stimuli", &self.stimuli)?;
        st.serialize_field("is_practice", &self.is_practice())?;
        st.serialize_field("is_reverse", &self.is_reverse())?;
        st.end()
    }
}

/// One recorded participant answer. Immutable once recorded.
///
/// Deserialization is lenient so that exported front-end data (camelCase keys,
/// fractional milliseconds, missing optional fields) can be scored directly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    #[serde(alias = "trialNumber")]
    pub trial_number: u32,
    #[serde(alias = "blockNumber")]
    pub block_number: u32,
    pub stimulus: String,
    #[serde(deserialize_with = "lenient_side")]
    pub response: Option<Side>,
    /// Response latency in milliseconds.
    #[serde(alias = "responseTime", deserialize_with = "lenient_millis")]
    pub response_time: i64,
    pub correct: bool,
    pub timestamp: String,
}

impl Response {
    /// Whether the latency lies in the open interval scored by the analyzers.
    pub fn is_analyzable(&self) -> bool {
        self.response_time > MIN_RESPONSE_TIME_MS && self.response_time < MAX_RESPONSE_TIME_MS
    }

    pub fn rt(&self) -> f64 {
        self.response_time as f64
    }

    pub fn pairing(&self) -> Option<Pairing> {
        Pairing::of_block(self.block_number)
    }
}

fn lenient_side<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Side>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn lenient_millis<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let raw = Option::<f64>::deserialize(d)?;
    Ok(raw.map(|ms| ms.round() as i64).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_display_and_parse() {
        assert_eq!(Side::Left.to_string(), "left");
        assert_eq!("RIGHT".parse::<Side>().unwrap(), Side::Right);
        assert!("up".parse::<Side>().is_err());
    }

    #[test]
    fn pairing_block_mapping() {
        assert_eq!(Pairing::of_block(3), Some(Pairing::Compatible));
        assert_eq!(Pairing::of_block(4), Some(Pairing::Compatible));
        assert_eq!(Pairing::of_block(6), Some(Pairing::Incompatible));
        assert_eq!(Pairing::of_block(7), Some(Pairing::Incompatible));
        assert_eq!(Pairing::of_block(5), None);
        assert_eq!(Pairing::of_block(1), None);
    }

    #[test]
    fn reverse_only_for_incompatible_combined() {
        let reversed: Vec<u32> = BlockKind::CANONICAL_SEQUENCE
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_reverse())
            .map(|(i, _)| i as u32 + 1)
            .collect();
        assert_eq!(reversed, vec![6, 7]);
    }

    #[test]
    fn stimulus_wire_shape() {
        let stim = Stimulus {
            text: "joy".into(),
            source: LabelSource::Attribute,
            kind: StimulusKind::Combined(Side::Right),
            block_number: 3,
            trial_number: 2,
        };
        let v = serde_json::to_value(&stim).unwrap();
        assert_eq!(v["category"], "");
        assert_eq!(v["attribute"], "joy");
        assert_eq!(v["correct_response"], "right");
        assert_eq!(v["stimulus_type"], "combined_right");
    }

    #[test]
    fn response_accepts_camel_case_and_fractional_ms() {
        let json = r#"{"trialNumber": 4, "blockNumber": 6, "stimulus": "war",
                       "response": "left", "responseTime": 612.6, "correct": true}"#;
        let r: Response = serde_json::from_str(json).unwrap();
        assert_eq!(r.trial_number, 4);
        assert_eq!(r.block_number, 6);
        assert_eq!(r.response_time, 613);
        assert_eq!(r.response, Some(Side::Left));
        assert!(r.is_analyzable());
    }

    #[test]
    fn response_unknown_side_is_none() {
        let r: Response = serde_json::from_str(r#"{"response": "", "response_time": 0}"#).unwrap();
        assert_eq!(r.response, None);
        assert!(!r.is_analyzable());
    }

    #[test]
    fn analyzable_bounds_are_open() {
        let mut r = Response {
            response_time: 10_000,
            ..Default::default()
        };
        assert!(!r.is_analyzable());
        r.response_time = 9_999;
        assert!(r.is_analyzable());
        r.response_time = 1;
        assert!(r.is_analyzable());
    }

    #[test]
    fn test_config_defaults_fill_optional_sections() {
        let json = r#"{"test_id": "t1", "name": "Flowers",
            "categories": {"left": ["rose"], "right": ["spider"]},
            "attributes": {"left": ["good"], "right": ["bad"]}}"#;
        let cfg: TestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.blocks_config.len(), 7);
        assert_eq!(cfg.timing.get("response_timeout"), Some(&5000));
        assert!(cfg.instructions.contains_key("welcome"));
    }

    #[test]
    fn sided_labels_reject_extra_keys() {
        let json = r#"{"left": ["a"], "right": ["b"], "middle": ["c"]}"#;
        assert!(serde_json::from_str::<SidedLabels>(json).is_err());
    }
}
