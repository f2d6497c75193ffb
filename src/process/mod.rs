//! Interpreter process boundary (submit/receive/health/stop).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::KernelError;

pub mod python;

pub use python::PythonKernel;

/// One message from the interpreter's output channel, Jupyter iopub shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMessage {
    pub msg_type: String,
    /// Submission this message answers, when the interpreter says so.
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub content: Value,
}

impl KernelMessage {
    pub fn new(msg_type: &str, content: Value) -> Self {
        Self { msg_type: msg_type.to_string(), parent_id: None, content }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent_id = Some(parent.to_string());
        self
    }

    pub fn status(state: &str) -> Self {
        Self::new("status", json!({ "execution_state": state }))
    }

    pub fn stream(text: &str) -> Self {
        Self::new("stream", json!({ "name": "stdout", "text": text }))
    }

    pub fn execute_result(data: Value) -> Self {
        Self::new("execute_result", json!({ "data": data }))
    }

    pub fn error(ename: &str, evalue: &str, traceback: &[&str]) -> Self {
        Self::new(
            "error",
            json!({ "ename": ename, "evalue": evalue, "traceback": traceback }),
        )
    }
}

/// A live interpreter. Anything that can take code, report messages, say
/// whether it is still running and stop can back an executor.
#[async_trait]
pub trait Interpreter: Send {
    /// Hands `code` to the interpreter and returns the submission id.
    async fn submit(&mut self, code: &str) -> Result<String, KernelError>;

    /// Next output message, or `None` if nothing arrived within `timeout`.
    async fn receive_next(&mut self, timeout: Duration)
        -> Result<Option<KernelMessage>, KernelError>;

    async fn is_alive(&mut self) -> bool;

    async fn stop(&mut self) -> Result<(), KernelError>;
}
