//! Folding interpreter messages into a single outcome.

use serde_json::Value;
use tracing::{debug, error};

use super::RenderedResult;
use crate::{
    error::{ExecutionError, ExecutionFailure},
    process::KernelMessage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Busy,
    Idle,
    /// A state name the reducer does not act on, e.g. `starting`.
    Other,
}

impl KernelState {
    fn parse(s: &str) -> Self {
        match s {
            "busy" => Self::Busy,
            "idle" => Self::Idle,
            _ => Self::Other,
        }
    }
}

/// Accumulated view of one submission's messages.
///
/// Payload messages are last-write-wins. An error stands unless a later
/// payload message replaces it.
#[derive(Debug)]
pub struct Reduction {
    submission: String,
    state: KernelState,
    payload: Option<Value>,
    error: Option<Vec<String>>,
    applied: usize,
}

impl Reduction {
    pub fn new(submission: String) -> Self {
        Self { submission, state: KernelState::Busy, payload: None, error: None, applied: 0 }
    }

    pub fn submission(&self) -> &str {
        &self.submission
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn apply(&mut self, msg: KernelMessage) {
        if let Some(parent) = &msg.parent_id {
            if parent != &self.submission {
                debug!(%parent, msg_type = %msg.msg_type, "ignoring message for another submission");
                return;
            }
        }
        let Value::Object(mut content) = msg.content else {
            return;
        };
        self.applied += 1;

        if msg.msg_type == "error" {
            let traceback = traceback_lines(&content);
            error!(traceback = %traceback.join("\n"), "interpreter reported an error");
            self.error = Some(traceback);
        }

        if let Some(data) = content.remove("data") {
            self.payload = Some(data);
            self.error = None;
        } else if let Some(text) = content.remove("text") {
            self.payload = Some(text);
            self.error = None;
        }

        if let Some(state) = content.get("execution_state").and_then(Value::as_str) {
            self.state = KernelState::parse(state);
        }
    }

    /// Outcome after the interpreter went idle.
    pub fn finish(self) -> Result<RenderedResult, ExecutionError> {
        match self.error {
            Some(traceback) => Err(ExecutionError::raised(traceback)),
            None => Ok(RenderedResult::from_payload(self.payload)),
        }
    }

    /// Outcome when the loop ends before idle. Any traceback seen so far is
    /// kept ahead of the reason.
    pub fn abort(self, failure: ExecutionFailure) -> ExecutionError {
        let mut traceback = self.error.unwrap_or_default();
        traceback.push(
            match failure {
                ExecutionFailure::InterpreterExited => "interpreter process exited before going idle",
                ExecutionFailure::ChannelClosed => "interpreter output channel closed before going idle",
                ExecutionFailure::TimedOut => "interpreter still busy when the call timeout expired",
                ExecutionFailure::Submit => "submission failed",
                ExecutionFailure::Raised => "interpreter raised an error",
            }
            .to_string(),
        );
        ExecutionError::new(failure, traceback)
    }
}

/// Jupyter sends the traceback as a list of lines; fall back to
/// `ename: evalue` when it is missing.
fn traceback_lines(content: &serde_json::Map<String, Value>) -> Vec<String> {
    if let Some(Value::Array(lines)) = content.get("traceback") {
        let lines: Vec<String> = lines
            .iter()
            .map(|l| l.as_str().map(str::to_string).unwrap_or_else(|| l.to_string()))
            .collect();
        if !lines.is_empty() {
            return lines;
        }
    }
    let ename = content.get("ename").and_then(Value::as_str).unwrap_or("Error");
    let evalue = content.get("evalue").and_then(Value::as_str).unwrap_or("");
    vec![format!("{ename}: {evalue}")]
}
