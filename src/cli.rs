use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dfsession",
    about = "Run dataframe intents (JSON lines on stdin) against a live Python session",
    version
)]
pub struct Cli {
    /// Python interpreter to launch.
    #[arg(long)]
    pub python: Option<String>,

    /// Rows shown in each preview.
    #[arg(long)]
    pub rows: Option<usize>,

    /// Write persisted steps to this notebook (.ipynb) when the session closes.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Start from the steps of an existing notebook (.ipynb).
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Execute resumed steps once before reading requests.
    #[arg(long, requires = "resume")]
    pub replay: bool,

    /// Upper bound on a single execution in seconds (0 disables).
    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,

    /// Wait per poll of the interpreter channel, in milliseconds.
    #[arg(long = "poll-ms")]
    pub poll_ms: Option<u64>,

    /// Report execution failures without tracebacks.
    #[arg(long = "generic-errors")]
    pub generic_errors: bool,

    /// Emit JSON lines even when stdout is a terminal.
    #[arg(long)]
    pub json: bool,

    /// Print the callables available on a target (df or pd) and exit.
    #[arg(long, value_parser = ["df", "pd"])]
    pub capabilities: Option<String>,

    /// Compile requests and print the generated code without running it.
    #[arg(long = "dry-run", conflicts_with_all = ["capabilities", "replay"])]
    pub dry_run: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
