//! Error taxonomy shared by the compiler, executor, step log and session.

use std::{fmt, io, path::PathBuf};

/// Why an intent was rejected before reaching the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingOperation,
    InvalidOperation,
    InvalidArgsShape,
    InvalidKwargsShape,
    InvalidArgument,
    InvalidKeyword,
    MissingTarget,
    DisallowedTarget,
    OperationNotAllowed,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingOperation => "missing_operation",
            Self::InvalidOperation => "invalid_operation",
            Self::InvalidArgsShape => "invalid_args_shape",
            Self::InvalidKwargsShape => "invalid_kwargs_shape",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidKeyword => "invalid_keyword",
            Self::MissingTarget => "missing_target",
            Self::DisallowedTarget => "disallowed_target",
            Self::OperationNotAllowed => "operation_not_allowed",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-fixable request error. Never reaches the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// What ended an `execute` call unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionFailure {
    /// The interpreter reported an error message for the submission.
    Raised,
    /// The interpreter process died before going idle.
    InterpreterExited,
    /// The message channel closed before going idle.
    ChannelClosed,
    /// The call-wide deadline passed while the interpreter was still busy.
    TimedOut,
    /// The code could not be handed to the interpreter.
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", describe_execution(.failure, .traceback))]
pub struct ExecutionError {
    pub failure: ExecutionFailure,
    pub traceback: Vec<String>,
}

impl ExecutionError {
    pub fn new(failure: ExecutionFailure, traceback: Vec<String>) -> Self {
        Self { failure, traceback }
    }

    pub fn raised(traceback: Vec<String>) -> Self {
        Self::new(ExecutionFailure::Raised, traceback)
    }

    /// Fatal failures leave the interpreter unusable for the next call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.failure, ExecutionFailure::Raised)
    }

    pub fn traceback_text(&self) -> String {
        self.traceback.join("\n")
    }
}

fn describe_execution(failure: &ExecutionFailure, traceback: &[String]) -> String {
    let what = match failure {
        ExecutionFailure::Raised => "interpreter raised an error",
        ExecutionFailure::InterpreterExited => "interpreter process exited",
        ExecutionFailure::ChannelClosed => "interpreter output channel closed",
        ExecutionFailure::TimedOut => "execution timed out",
        ExecutionFailure::Submit => "could not submit code to interpreter",
    };
    match traceback.last() {
        Some(last) => format!("{what}: {last}"),
        None => what.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to spawn interpreter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("interpreter process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("startup code failed: {0}")]
    StartupCode(ExecutionError),
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("notebook path must end in .ipynb: {}", .0.display())]
    Extension(PathBuf),
    #[error("notebook i/o failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed notebook document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures at the interpreter boundary itself.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("interpreter i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("could not encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("interpreter output channel disconnected")]
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("introspection output was not understood: {0}")]
    Introspection(String),
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Stable machine-readable tag for structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.kind.as_str(),
            Self::Execution(_) => "execution_error",
            Self::Startup(_) => "startup_error",
            Self::Format(_) => "format_error",
            Self::Introspection(_) => "introspection_error",
            Self::Closed => "session_closed",
        }
    }

    pub fn traceback(&self) -> &[String] {
        match self {
            Self::Execution(e) => &e.traceback,
            _ => &[],
        }
    }
}
