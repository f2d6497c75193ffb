//! Session orchestration: one step log and one interpreter per client.
//!
//! A request is compiled first. If it asked to be kept, its assignment half
//! goes to the step log. The full statement, preview block included, then
//! goes to the executor. Invalid requests touch neither.

use std::path::Path;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    codegen::{
        introspect::{introspection_code, parse_capabilities, Capability},
        Compiler, Intent, Target,
    },
    config::SessionSettings,
    error::{ExecutionError, SessionError},
    execution::{Executor, RenderedResult},
    process::{Interpreter, PythonKernel},
    steplog::{NotebookStepLog, StepLog},
};

pub struct Session<L: StepLog, I: Interpreter> {
    compiler: Compiler,
    log: L,
    executor: Executor<I>,
    closed: bool,
}

impl<L: StepLog, I: Interpreter> Session<L, I> {
    pub fn new(compiler: Compiler, log: L, executor: Executor<I>) -> Self {
        Self { compiler, log, executor, closed: false }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn handle(&mut self, request: &Value) -> Result<RenderedResult, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let intent = Intent::from_json(request)?;
        let statement = self.compiler.compile_intent(&intent)?;
        if intent.persist {
            let index = self.log.append(&statement.persisted_code());
            info!(index, operation = %intent.operation, "step persisted");
        }
        self.run(&statement.full_code()).await
    }

    /// Lists public callables on `target` by asking the interpreter.
    pub async fn capabilities(&mut self, target: Target) -> Result<Vec<Capability>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let output = self.run(&introspection_code(target)).await?;
        parse_capabilities(&output.text).map_err(|e| SessionError::Introspection(e.to_string()))
    }

    /// Re-executes every logged step in order, e.g. after resuming from a
    /// notebook. Stops at the first failure.
    pub async fn replay(&mut self) -> Result<usize, SessionError> {
        let codes: Vec<String> = self.log.steps().iter().map(|s| s.code.clone()).collect();
        for (i, code) in codes.iter().enumerate() {
            if self.closed {
                return Err(SessionError::Closed);
            }
            if let Err(e) = self.run(code).await {
                warn!(step = i, error = %e, "replay stopped");
                return Err(e);
            }
        }
        info!(steps = codes.len(), "replayed step log");
        Ok(codes.len())
    }

    async fn run(&mut self, code: &str) -> Result<RenderedResult, SessionError> {
        match self.executor.execute(code).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_fatal() {
                    self.teardown_after(&e).await;
                }
                Err(e.into())
            }
        }
    }

    async fn teardown_after(&mut self, cause: &ExecutionError) {
        error!(error = %cause, "interpreter unusable, closing session");
        self.executor.shutdown().await;
        self.closed = true;
    }

    /// Exports the log (when a path is given) and stops the interpreter.
    /// Both steps always run; failures are logged.
    pub async fn close(mut self, export_path: Option<&Path>) {
        if let Some(path) = export_path {
            match self.log.export(path) {
                Ok(()) => info!(path = %path.display(), "session exported"),
                Err(e) => error!(error = %e, "session export failed"),
            }
        }
        self.executor.shutdown().await;
        self.closed = true;
    }
}

/// Session over a fresh Python process, optionally resuming a notebook.
pub async fn start_python(
    settings: &SessionSettings,
    resume: Option<&Path>,
) -> Result<Session<NotebookStepLog, PythonKernel>, SessionError> {
    let log = match resume {
        Some(path) => NotebookStepLog::load(path)?,
        None => NotebookStepLog::new(),
    };
    let kernel = PythonKernel::start(&settings.python_bin).await?;
    let executor = Executor::start(kernel, settings.executor_config()).await?;
    Ok(Session::new(settings.compiler(), log, executor))
}
