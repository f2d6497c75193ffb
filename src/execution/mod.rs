//! Execution engine: submits code to an interpreter and reduces the
//! message stream it produces into one result.

use std::{fmt, time::Duration};

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    error::{ExecutionError, ExecutionFailure, StartupError},
    process::Interpreter,
};

pub mod reduce;

pub use reduce::{KernelState, Reduction};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_STARTUP_CODE: &str = "import pandas as pd";
/// Floor for `poll_interval`; a zero wait would never yield to the runtime.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Plain-text preview of an executed statement's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedResult {
    pub text: String,
}

impl RenderedResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// A media-type mapping yields its `text/plain` entry; a string is taken
    /// as is; anything else is shown as JSON.
    pub fn from_payload(payload: Option<Value>) -> Self {
        let text = match payload {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(Value::Object(mut map)) => match map.remove("text/plain") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => Value::Object(map).to_string(),
            },
            Some(other) => other.to_string(),
        };
        Self { text }
    }
}

impl fmt::Display for RenderedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-receive wait before re-checking the interpreter.
    pub poll_interval: Duration,
    /// Upper bound on one `execute` call. `None` waits for as long as the
    /// interpreter stays busy.
    pub call_timeout: Option<Duration>,
    /// Run once right after start; an error here fails startup.
    pub startup_code: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            startup_code: Some(DEFAULT_STARTUP_CODE.to_string()),
        }
    }
}

/// Owns one interpreter. Calls take `&mut self`, so a second submission
/// cannot start before the first has returned.
pub struct Executor<I: Interpreter> {
    interpreter: I,
    config: ExecutorConfig,
    shut_down: bool,
}

impl<I: Interpreter> Executor<I> {
    pub async fn start(interpreter: I, mut config: ExecutorConfig) -> Result<Self, StartupError> {
        config.poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut executor = Self { interpreter, config, shut_down: false };
        if let Some(code) = executor.config.startup_code.clone() {
            if !code.trim().is_empty() {
                if let Err(e) = executor.execute(&code).await {
                    executor.shutdown().await;
                    return Err(StartupError::StartupCode(e));
                }
            }
        }
        Ok(executor)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub async fn execute(&mut self, code: &str) -> Result<RenderedResult, ExecutionError> {
        if self.shut_down {
            return Err(ExecutionError::new(
                ExecutionFailure::InterpreterExited,
                vec!["interpreter has been shut down".into()],
            ));
        }

        let submission = self
            .interpreter
            .submit(code)
            .await
            .map_err(|e| ExecutionError::new(ExecutionFailure::Submit, vec![e.to_string()]))?;
        let started = Instant::now();
        let mut reduction = Reduction::new(submission);

        while reduction.state() != KernelState::Idle {
            if !self.interpreter.is_alive().await {
                warn!(submission = reduction.submission(), "interpreter died mid-execution");
                return Err(reduction.abort(ExecutionFailure::InterpreterExited));
            }

            let wait = match self.config.call_timeout {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        warn!(
                            submission = reduction.submission(),
                            limit_secs = limit.as_secs_f64(),
                            "execution exceeded call timeout"
                        );
                        return Err(reduction.abort(ExecutionFailure::TimedOut));
                    }
                    self.config.poll_interval.min(limit - elapsed)
                }
                None => self.config.poll_interval,
            };

            match self.interpreter.receive_next(wait).await {
                Ok(Some(msg)) => reduction.apply(msg),
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "interpreter channel failed");
                    return Err(reduction.abort(ExecutionFailure::ChannelClosed));
                }
            }
        }

        // Pick up anything already queued behind the idle status.
        while let Ok(Some(msg)) = self.interpreter.receive_next(Duration::ZERO).await {
            reduction.apply(msg);
        }

        debug!(
            submission = reduction.submission(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "execution finished"
        );
        reduction.finish()
    }

    /// Stops the interpreter. Safe to call more than once; failures are logged.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        match self.interpreter.stop().await {
            Ok(()) => info!("interpreter stopped"),
            Err(e) => error!(error = %e, "failed to stop interpreter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_prefers_text_plain() {
        let r = RenderedResult::from_payload(Some(json!({"text/html": "<b>", "text/plain": "   a\n0  1"})));
        assert_eq!(r.text, "   a\n0  1");
    }

    #[test]
    fn test_payload_string_and_absent() {
        assert_eq!(RenderedResult::from_payload(Some(json!("final"))).text, "final");
        assert_eq!(RenderedResult::from_payload(None).text, "");
    }

    #[test]
    fn test_payload_mapping_without_plain_text_is_json() {
        let r = RenderedResult::from_payload(Some(json!({"image/png": "iVBOR"})));
        assert_eq!(r.text, r#"{"image/png":"iVBOR"}"#);
    }
}
