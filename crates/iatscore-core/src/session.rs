//! IAT session lifecycle.
//!
//! [`SessionEngine`] holds only settings; all mutable session data lives in a
//! caller-owned [`SessionContext`]. One context is one session at a time:
//! starting a new session replaces the previous one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::analyzer::SessionAnalyzer;
use crate::blocks::{self, generate_blocks};
use crate::error::IatError;
use crate::model::{Block, Response, Stimulus, TestConfig};
use crate::parser::{parse_response, parse_test_config};
use crate::report::AnalysisResult;
use crate::statistics;

/// Expected trial total used for progress reporting (7 blocks × 20 trials).
pub const EXPECTED_TRIALS: usize = 7 * 20;
/// Block whose trial at or beyond [`LAST_TRIAL_THRESHOLD`] ends the session.
pub const FINAL_BLOCK: u32 = 7;
pub const LAST_TRIAL_THRESHOLD: u32 = 20;

/// Where a context is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    Completed,
}

/// State of one running or finished session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub participant_id: String,
    pub test_config: TestConfig,
    pub blocks: Vec<Block>,
    /// Append-only; a response's index is its identity.
    pub responses: Vec<Response>,
    pub start_time: DateTime<Utc>,
    /// Frozen results, present once the session is completed.
    results: Option<SessionResults>,
}

impl SessionState {
    pub fn is_completed(&self) -> bool {
        self.results.is_some()
    }

    /// Wire view returned by `start_session`.
    pub fn started(&self) -> SessionStarted {
        SessionStarted {
            session_id: self.session_id.clone(),
            participant_id: self.participant_id.clone(),
            test_config: self.test_config.clone(),
            blocks: self.blocks.clone(),
            total_blocks: self.blocks.len(),
            start_time: self.start_time,
        }
    }
}

/// Caller-owned session context passed into every engine operation.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    config: Option<TestConfig>,
    session: Option<SessionState>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.session {
            None => SessionPhase::Idle,
            Some(s) if s.is_completed() => SessionPhase::Completed,
            Some(_) => SessionPhase::Active,
        }
    }

    pub fn config(&self) -> Option<&TestConfig> {
        self.config.as_ref()
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }
}

/// Payload of a successful `start_session`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: String,
    pub participant_id: String,
    pub test_config: TestConfig,
    pub blocks: Vec<Block>,
    pub total_blocks: usize,
    pub start_time: DateTime<Utc>,
}

/// Acknowledgement of one accepted response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseAck {
    /// 1-based position of the response in the session log.
    pub response_id: usize,
    pub correct: bool,
    pub is_last_response: bool,
    /// Approximate completion, 0..=1.
    pub progress: f64,
    pub next_stimulus: Option<Stimulus>,
}

/// Per-block descriptive rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRollup {
    pub count: usize,
    /// Percent correct.
    pub accuracy: f64,
    pub mean_rt: f64,
    pub std_rt: f64,
}

/// Payload of `get_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResults {
    pub session_id: String,
    pub participant_id: String,
    pub total_responses: usize,
    /// Percent correct over every stored response.
    pub accuracy: f64,
    pub mean_response_time: f64,
    pub median_response_time: f64,
    pub std_response_time: f64,
    pub d_score: f64,
    /// Keyed `block_<n>`.
    pub block_statistics: BTreeMap<String, BlockRollup>,
    pub raw_responses: Vec<Response>,
    /// Seconds from session start to the first results request.
    pub session_duration: f64,
    pub analysis: AnalysisResult,
}

/// Runs sessions against caller-owned contexts.
#[derive(Debug, Clone, Default)]
pub struct SessionEngine {
    analyzer: SessionAnalyzer,
    shuffle_seed: Option<u64>,
}

impl SessionEngine {
    pub fn new(analyzer: SessionAnalyzer) -> Self {
        Self {
            analyzer,
            shuffle_seed: None,
        }
    }

    /// Make block shuffling reproducible.
    pub fn with_shuffle_seed(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    pub fn analyzer(&self) -> &SessionAnalyzer {
        &self.analyzer
    }

    /// Validate and store a test configuration.
    pub fn create_config<'a>(
        &self,
        ctx: &'a mut SessionContext,
        data: &Value,
    ) -> Result<&'a TestConfig, IatError> {
        let config = parse_test_config(data)?;
        tracing::info!(
            test_id = %config.test_id,
            name = %config.name,
            "test configuration created"
        );
        Ok(ctx.config.insert(config))
    }

    /// Start a new session, generating its block design.
    ///
    /// An inline `test_config` replaces the stored configuration first. A
    /// missing session id is minted as a UUID.
    pub fn start_session<'a>(
        &self,
        ctx: &'a mut SessionContext,
        session_id: Option<String>,
        participant_id: Option<String>,
        test_config: Option<&Value>,
    ) -> Result<&'a SessionState, IatError> {
        if let Some(data) = test_config {
            self.create_config(ctx, data)?;
        }
        let config = ctx.config.clone().ok_or(IatError::NoConfig)?;

        let mut rng = match self.shuffle_seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_os_rng(),
        };
        let blocks = generate_blocks(&config, &mut rng)?;

        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let participant_id = participant_id.unwrap_or_default();

        if let Some(previous) = &ctx.session {
            tracing::debug!(session_id = %previous.session_id, "discarding previous session");
        }
        tracing::info!(
            %session_id,
            %participant_id,
            test_id = %config.test_id,
            trials = blocks::total_trials(&blocks),
            "session started"
        );

        Ok(ctx.session.insert(SessionState {
            session_id,
            participant_id,
            test_config: config,
            blocks,
            responses: Vec::new(),
            start_time: Utc::now(),
            results: None,
        }))
    }

    /// Record one participant answer.
    ///
    /// When the payload carries no `correct` flag, correctness is derived from
    /// the generated stimulus at that block/trial position.
    pub fn process_response(
        &self,
        ctx: &mut SessionContext,
        data: &Value,
    ) -> Result<ResponseAck, IatError> {
        let session = ctx.session.as_mut().ok_or(IatError::NoActiveSession)?;
        if session.is_completed() {
            return Err(IatError::SessionCompleted(session.session_id.clone()));
        }

        let parsed = parse_response(data)?;
        let mut response = parsed.response;
        let expected = blocks::find_stimulus(
            &session.blocks,
            response.block_number,
            response.trial_number,
        );
        let derived = matches!(
            (expected, response.response),
            (Some(stimulus), Some(side)) if stimulus.correct_response() == side
        );
        response.correct = parsed.correct.unwrap_or(derived);

        let is_last_response =
            response.block_number == FINAL_BLOCK && response.trial_number >= LAST_TRIAL_THRESHOLD;
        let next_stimulus = if is_last_response {
            None
        } else {
            blocks::next_stimulus(&session.blocks, response.block_number, response.trial_number)
                .cloned()
        };
        let correct = response.correct;

        tracing::debug!(
            block = response.block_number,
            trial = response.trial_number,
            rt_ms = response.response_time,
            correct,
            "response recorded"
        );
        session.responses.push(response);
        let count = session.responses.len();

        Ok(ResponseAck {
            response_id: count,
            correct,
            is_last_response,
            progress: (count as f64 / EXPECTED_TRIALS as f64).min(1.0),
            next_stimulus,
        })
    }

    /// Score the session.
    ///
    /// The first call completes the session and freezes its results; later
    /// calls return the same results and further responses are rejected.
    pub async fn get_results(&self, ctx: &mut SessionContext) -> Result<SessionResults, IatError> {
        let session = ctx.session.as_mut().ok_or(IatError::NoActiveSession)?;
        if let Some(results) = &session.results {
            return Ok(results.clone());
        }
        if session.responses.is_empty() {
            return Err(IatError::NoResponses);
        }

        let analysis = self.analyzer.analyze_concurrent(&session.responses).await?;
        let results = rollup(session, analysis);
        tracing::info!(
            session_id = %results.session_id,
            responses = results.total_responses,
            d_score = results.d_score,
            "session completed"
        );
        Ok(session.results.insert(results).clone())
    }
}

fn rollup(session: &SessionState, analysis: AnalysisResult) -> SessionResults {
    let responses = &session.responses;
    let rts: Vec<f64> = responses.iter().map(Response::rt).collect();

    let mut by_block: BTreeMap<u32, Vec<&Response>> = BTreeMap::new();
    for r in responses {
        by_block.entry(r.block_number).or_default().push(r);
    }
    let block_statistics = by_block
        .into_iter()
        .map(|(block, rs)| {
            let rts: Vec<f64> = rs.iter().map(|r| r.rt()).collect();
            (
                format!("block_{block}"),
                BlockRollup {
                    count: rs.len(),
                    accuracy: percent_correct(rs.iter().copied()),
                    mean_rt: statistics::mean(&rts),
                    std_rt: statistics::sample_std(&rts),
                },
            )
        })
        .collect();

    let duration = Utc::now() - session.start_time;
    SessionResults {
        session_id: session.session_id.clone(),
        participant_id: session.participant_id.clone(),
        total_responses: responses.len(),
        accuracy: percent_correct(responses.iter()),
        mean_response_time: statistics::mean(&rts),
        median_response_time: statistics::median(&rts),
        std_response_time: statistics::sample_std(&rts),
        d_score: analysis.d_score.value,
        block_statistics,
        raw_responses: responses.clone(),
        session_duration: duration.num_milliseconds() as f64 / 1000.0,
        analysis,
    }
}

fn percent_correct<'a>(responses: impl ExactSizeIterator<Item = &'a Response>) -> f64 {
    let total = responses.len();
    if total == 0 {
        return 0.0;
    }
    let correct = responses.filter(|r| r.correct).count();
    correct as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalysisConfig;
    use crate::model::Side;
    use serde_json::json;

    fn engine() -> SessionEngine {
        SessionEngine::new(SessionAnalyzer::new(AnalysisConfig {
            bootstrap_resamples: 100,
            seed: Some(3),
            ..AnalysisConfig::default()
        }))
        .with_shuffle_seed(Some(99))
    }

    fn config() -> Value {
        json!({
            "test_id": "race",
            "name": "Race IAT",
            "categories": {"left": ["A1", "A2"], "right": ["B1", "B2"]},
            "attributes": {"left": ["good"], "right": ["bad"]}
        })
    }

    fn answer(block: u32, trial: u32, rt: i64) -> Value {
        json!({
            "trial_number": trial,
            "block_number": block,
            "stimulus": "A1",
            "response": "left",
            "response_time": rt,
            "correct": true
        })
    }

    fn started() -> SessionContext {
        let engine = engine();
        let mut ctx = SessionContext::new();
        engine.create_config(&mut ctx, &config()).unwrap();
        engine
            .start_session(&mut ctx, Some("s-1".into()), Some("p-1".into()), None)
            .unwrap();
        ctx
    }

    #[test]
    fn lifecycle_phases() {
        let engine = engine();
        let mut ctx = SessionContext::new();
        assert_eq!(ctx.phase(), SessionPhase::Idle);
        assert_eq!(
            engine.start_session(&mut ctx, None, None, None).unwrap_err(),
            IatError::NoConfig
        );
        engine.create_config(&mut ctx, &config()).unwrap();
        let state = engine.start_session(&mut ctx, None, None, None).unwrap();
        assert_eq!(state.blocks.len(), 7);
        assert!(Uuid::parse_str(&state.session_id).is_ok());
        assert_eq!(ctx.phase(), SessionPhase::Active);
    }

    #[test]
    fn inline_config_starts_session() {
        let engine = engine();
        let mut ctx = SessionContext::new();
        let state = engine
            .start_session(&mut ctx, Some("s".into()), Some("p".into()), Some(&config()))
            .unwrap();
        let started = state.started();
        assert_eq!(started.total_blocks, 7);
        assert_eq!(started.test_config.test_id, "race");
        assert_eq!(ctx.config().unwrap().name, "Race IAT");
    }

    #[test]
    fn response_without_session_fails() {
        let mut ctx = SessionContext::new();
        let err = engine().process_response(&mut ctx, &answer(1, 1, 500)).unwrap_err();
        assert_eq!(err, IatError::NoActiveSession);
    }

    #[test]
    fn progress_and_last_response() {
        let engine = engine();
        let mut ctx = started();
        let ack = engine.process_response(&mut ctx, &answer(1, 1, 500)).unwrap();
        assert_eq!(ack.response_id, 1);
        assert!((ack.progress - 1.0 / 140.0).abs() < 1e-12);
        assert!(!ack.is_last_response);
        let next = ack.next_stimulus.unwrap();
        assert_eq!((next.block_number, next.trial_number), (1, 2));

        let ack = engine.process_response(&mut ctx, &answer(7, 20, 500)).unwrap();
        assert!(ack.is_last_response);
        let ack = engine.process_response(&mut ctx, &answer(7, 19, 500)).unwrap();
        assert!(!ack.is_last_response);
    }

    #[test]
    fn last_response_has_no_next_stimulus() {
        let engine = engine();
        let mut ctx = SessionContext::new();
        let wide = json!({
            "test_id": "wide",
            "name": "Wide IAT",
            "categories": {
                "left": ["a1", "a2", "a3", "a4", "a5"],
                "right": ["b1", "b2", "b3", "b4", "b5"]
            },
            "attributes": {"left": ["g1", "g2", "g3"], "right": ["x1", "x2", "x3"]}
        });
        let state = engine
            .start_session(&mut ctx, Some("w".into()), None, Some(&wide))
            .unwrap();
        assert!(state.blocks[6].stimuli.len() > 20);

        let ack = engine.process_response(&mut ctx, &answer(7, 19, 500)).unwrap();
        assert!(!ack.is_last_response);
        assert!(ack.next_stimulus.is_some());

        let ack = engine.process_response(&mut ctx, &answer(7, 20, 500)).unwrap();
        assert!(ack.is_last_response);
        assert!(ack.next_stimulus.is_none());
    }

    #[test]
    fn progress_caps_at_one() {
        let engine = engine();
        let mut ctx = started();
        let mut last = None;
        for i in 0..150 {
            last = Some(engine.process_response(&mut ctx, &answer(3, i + 1, 500)).unwrap());
        }
        assert_eq!(last.unwrap().progress, 1.0);
    }

    #[test]
    fn missing_field_is_rejected_without_recording() {
        let engine = engine();
        let mut ctx = started();
        let mut bad = answer(1, 1, 500);
        bad.as_object_mut().unwrap().remove("response_time");
        let err = engine.process_response(&mut ctx, &bad).unwrap_err();
        assert_eq!(err, IatError::MissingField("response_time"));
        assert!(ctx.session().unwrap().responses.is_empty());
    }

    #[test]
    fn correctness_derived_when_absent() {
        let engine = engine();
        let mut ctx = started();
        // Block 1 trial 1 is the first left category label.
        let mut data = answer(1, 1, 500);
        data.as_object_mut().unwrap().remove("correct");
        assert!(engine.process_response(&mut ctx, &data).unwrap().correct);
        data["response"] = json!("right");
        assert!(!engine.process_response(&mut ctx, &data).unwrap().correct);
        let recorded = &ctx.session().unwrap().responses;
        assert_eq!(recorded[0].response, Some(Side::Left));
        assert!(!recorded[1].correct);
    }

    #[tokio::test]
    async fn results_require_responses() {
        let engine = engine();
        let mut ctx = started();
        assert_eq!(engine.get_results(&mut ctx).await.unwrap_err(), IatError::NoResponses);
        let mut idle = SessionContext::new();
        assert_eq!(
            engine.get_results(&mut idle).await.unwrap_err(),
            IatError::NoActiveSession
        );
    }

    #[tokio::test]
    async fn results_are_frozen_after_first_call() {
        let engine = engine();
        let mut ctx = started();
        let compatible = [500, 520, 510, 530, 505, 515, 525, 495, 540, 500];
        let incompatible = [700, 690, 710, 720, 680, 705, 715, 695, 730, 700];
        for (i, rt) in compatible.iter().enumerate() {
            engine.process_response(&mut ctx, &answer(3, i as u32 + 1, *rt)).unwrap();
        }
        for (i, rt) in incompatible.iter().enumerate() {
            engine.process_response(&mut ctx, &answer(6, i as u32 + 1, *rt)).unwrap();
        }

        let first = engine.get_results(&mut ctx).await.unwrap();
        assert_eq!(first.total_responses, 20);
        assert_eq!(first.accuracy, 100.0);
        assert!(first.d_score > 0.0);
        assert_eq!(first.d_score, first.analysis.d_score.value);
        assert_eq!(first.block_statistics["block_3"].count, 10);
        assert_eq!(first.block_statistics["block_6"].accuracy, 100.0);
        assert_eq!(first.raw_responses.len(), 20);
        assert_eq!(ctx.phase(), SessionPhase::Completed);

        let second = engine.get_results(&mut ctx).await.unwrap();
        assert_eq!(first, second);

        let err = engine.process_response(&mut ctx, &answer(7, 1, 500)).unwrap_err();
        assert_eq!(err, IatError::SessionCompleted("s-1".into()));
    }

    #[tokio::test]
    async fn raw_responses_rescore_identically() {
        let engine = engine();
        let mut ctx = started();
        for i in 0..8u32 {
            engine.process_response(&mut ctx, &answer(4, i + 1, 480 + i as i64 * 7)).unwrap();
            engine.process_response(&mut ctx, &answer(7, i + 1, 650 + i as i64 * 11)).unwrap();
        }
        let results = engine.get_results(&mut ctx).await.unwrap();
        let rescored = engine
            .analyzer()
            .analyze(&results.raw_responses)
            .await
            .unwrap();
        assert_eq!(rescored.d_score.value, results.analysis.d_score.value);
        assert_eq!(rescored.performance.accuracy, results.analysis.performance.accuracy);
        assert_eq!(rescored.performance.mean_rt, results.analysis.performance.mean_rt);
    }

    #[test]
    fn new_session_discards_previous() {
        let engine = engine();
        let mut ctx = started();
        engine.process_response(&mut ctx, &answer(1, 1, 500)).unwrap();
        engine
            .start_session(&mut ctx, Some("s-2".into()), None, None)
            .unwrap();
        let session = ctx.session().unwrap();
        assert_eq!(session.session_id, "s-2");
        assert!(session.responses.is_empty());
    }
}
