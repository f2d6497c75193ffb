//! Compile structured dataframe intents into Python, run them in a
//! long-lived interpreter, and keep a replayable log of generating steps.

pub mod codegen;
pub mod config;
pub mod error;
pub mod execution;
pub mod printer;
pub mod process;
pub mod session;
pub mod steplog;

pub use codegen::{CompiledStatement, Compiler, Intent, Target};
pub use error::{ExecutionError, FormatError, SessionError, StartupError, ValidationError};
pub use execution::{Executor, ExecutorConfig, RenderedResult};
pub use process::{Interpreter, KernelMessage, PythonKernel};
pub use session::Session;
pub use steplog::{NotebookStepLog, Step, StepLog};
