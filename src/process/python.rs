//! Python interpreter process bootstrap and I/O glue.
//!
//! The child runs a small bootstrap loop that reads `{"msg_id", "code"}`
//! requests as JSON lines on stdin and answers with JSON-line messages on
//! stdout. A reader task parses stdout into an unbounded channel so that
//! `receive_next` can wait on it with a timeout.

use std::{pin::pin, process::Stdio, time::Duration};

use async_stream::stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    sync::mpsc,
};
use tracing::{debug, info, warn};

use super::{Interpreter, KernelMessage};
use crate::error::{KernelError, StartupError};

const BOOTSTRAP: &str = include_str!("bootstrap.py");
const STOP_GRACE: Duration = Duration::from_secs(2);

pub struct PythonKernel {
    child: Child,
    stdin: Option<ChildStdin>,
    messages: mpsc::UnboundedReceiver<KernelMessage>,
    next_submission: u64,
    pid: Option<u32>,
}

impl PythonKernel {
    /// Spawns `program -u -c <bootstrap>`.
    pub async fn start(program: &str) -> Result<Self, StartupError> {
        let mut cmd = Command::new(program);
        cmd.arg("-u") // unbuffered
            .arg("-c")
            .arg(BOOTSTRAP)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child: Child = cmd.spawn().map_err(|source| StartupError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let stdin = child.stdin.take().ok_or(StartupError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(StartupError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(StartupError::MissingPipe("stderr"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut messages = pin!(message_stream(stdout));
            while let Some(msg) = messages.next().await {
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });
        tokio::spawn(forward_stderr(stderr));

        let pid = child.id();
        info!(program, pid = ?pid, "interpreter started");
        Ok(Self { child, stdin: Some(stdin), messages: rx, next_submission: 0, pid })
    }
}

/// Parses the child's stdout into messages, skipping lines that are not JSON.
fn message_stream(stdout: ChildStdout) -> impl Stream<Item = KernelMessage> {
    stream! {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<KernelMessage>(line) {
                        Ok(msg) => yield msg,
                        Err(e) => warn!(error = %e, "unparseable interpreter output"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "interpreter stdout read failed");
                    break;
                }
            }
        }
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "dfsession::interpreter", "{line}");
    }
}

#[async_trait]
impl Interpreter for PythonKernel {
    async fn submit(&mut self, code: &str) -> Result<String, KernelError> {
        let stdin = self.stdin.as_mut().ok_or(KernelError::Disconnected)?;
        self.next_submission += 1;
        let msg_id = format!("exec-{}-{}", self.pid.unwrap_or_default(), self.next_submission);
        let mut line = serde_json::to_string(&json!({ "msg_id": msg_id, "code": code }))?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        debug!(%msg_id, bytes = code.len(), "submitted");
        Ok(msg_id)
    }

    async fn receive_next(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<KernelMessage>, KernelError> {
        match tokio::time::timeout(timeout, self.messages.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(KernelError::Disconnected),
        }
    }

    async fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn stop(&mut self) -> Result<(), KernelError> {
        // Closing stdin ends the bootstrap loop.
        drop(self.stdin.take());
        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(pid = ?self.pid, %status, "interpreter exited");
            }
            Err(_) => {
                warn!(pid = ?self.pid, "interpreter did not exit after stdin closed, killing");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}
