//! Routes decoded requests to the session engine.
//!
//! A [`Dispatcher`] owns one engine and one session context, so one
//! dispatcher serves one session at a time. Every failure, including a panic
//! inside a handler, becomes an error reply.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;

use iatscore_core::session::{SessionContext, SessionEngine};

use crate::error::BridgeError;
use crate::protocol::{Reply, ReplyBody, Request};

pub struct Dispatcher {
    engine: SessionEngine,
    ctx: SessionContext,
}

impl Dispatcher {
    pub fn new(engine: SessionEngine) -> Self {
        Self {
            engine,
            ctx: SessionContext::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Handle one raw request line and return one reply line.
    pub async fn handle_line(&mut self, line: &str) -> String {
        let reply = match Request::parse_line(line) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                tracing::warn!("rejected request: {err}");
                Reply::error(&err)
            }
        };
        reply.to_line()
    }

    /// Handle a request given as a JSON value.
    pub async fn handle_value(&mut self, value: Value) -> Reply {
        match Request::from_value(value) {
            Ok(request) => self.handle(request).await,
            Err(err) => Reply::error(&err),
        }
    }

    /// Handle a decoded request.
    pub async fn handle(&mut self, request: Request) -> Reply {
        let action = request.action();
        let outcome = AssertUnwindSafe(self.dispatch(request)).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(BridgeError::Panic(panic_message(panic.as_ref()))),
        };
        match result {
            Ok(body) => Reply::ok(body),
            Err(err) => {
                match &err {
                    BridgeError::Panic(_) => tracing::error!(action, "handler panicked: {err}"),
                    _ => tracing::warn!(action, "request failed: {err}"),
                }
                Reply::error(&err)
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<ReplyBody, BridgeError> {
        match request {
            Request::CreateConfig { config } => {
                let config = self.engine.create_config(&mut self.ctx, &config)?;
                Ok(ReplyBody::Config {
                    config: config.clone(),
                })
            }
            Request::StartSession {
                session_id,
                participant_id,
                test_config,
            } => {
                let state = self.engine.start_session(
                    &mut self.ctx,
                    session_id,
                    participant_id,
                    test_config.as_ref(),
                )?;
                Ok(ReplyBody::Session {
                    session: state.started(),
                })
            }
            Request::ProcessResponse { response } => {
                let ack = self.engine.process_response(&mut self.ctx, &response)?;
                Ok(ReplyBody::Result { result: ack })
            }
            Request::GetResults => {
                let results = self.engine.get_results(&mut self.ctx).await?;
                Ok(ReplyBody::Results { results })
            }
            Request::Analyze { responses } => {
                let analysis = self
                    .engine
                    .analyzer()
                    .analyze_concurrent(&responses)
                    .await?;
                Ok(ReplyBody::Analysis { analysis })
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
