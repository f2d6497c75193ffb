mod cli;

use std::io;

use anyhow::{Context, Result};
use dfsession::{
    config::{Config, SessionSettings},
    printer::ResultPrinter,
    session, StepLog, Target,
};
use is_terminal::IsTerminal;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Load config, then let CLI flags override it
    let mut cfg = Config::load();
    if let Some(python) = &args.python {
        cfg.set("PYTHON_BIN", python.as_str());
    }
    if let Some(rows) = args.rows {
        cfg.set("DISPLAY_ROWS", rows.to_string());
    }
    if let Some(secs) = args.timeout_secs {
        cfg.set("EXECUTE_TIMEOUT_SECS", secs.to_string());
    }
    if let Some(ms) = args.poll_ms {
        cfg.set("POLL_INTERVAL_MS", ms.to_string());
    }
    if args.generic_errors {
        cfg.set("ERROR_DETAIL", "generic");
    }

    init_logging(&cfg.get("LOG_LEVEL").unwrap_or_else(|| "info".into()));

    let settings = SessionSettings::from_config(&cfg);
    let json = args.json || !io::stdout().is_terminal();
    let printer = ResultPrinter::new(json, settings.error_detail);

    let stdin = tokio::io::stdin();
    if stdin_is_interactive() {
        eprintln!("Enter one JSON request per line, e.g. {{\"mod\": \"pd\", \"func\": \"read_csv\", \"args\": [\"data.csv\"], \"save\": true}}");
    }
    let mut lines = BufReader::new(stdin).lines();

    if args.dry_run {
        let compiler = settings.compiler();
        while let Some(line) = lines.next_line().await? {
            let Some(request) = parse_request(&line, &printer) else { continue };
            match compiler.compile(&request) {
                Ok(stmt) => println!("{}", stmt.full_code()),
                Err(e) => printer.print_err(&e.into()),
            }
        }
        return Ok(());
    }

    let mut session = session::start_python(&settings, args.resume.as_deref())
        .await
        .context("could not start session")?;

    if let Some(target) = args.capabilities.as_deref().and_then(Target::parse) {
        let result = session.capabilities(target).await;
        session.close(None).await;
        let caps = result?;
        println!("{}", serde_json::to_string_pretty(&caps)?);
        return Ok(());
    }

    if args.replay {
        if let Err(e) = session.replay().await {
            printer.print_err(&e);
        }
    }

    while !session.is_closed() {
        let Some(line) = lines.next_line().await? else { break };
        let Some(request) = parse_request(&line, &printer) else { continue };
        if request.get("close").and_then(Value::as_bool) == Some(true) {
            info!("close requested by client");
            break;
        }
        match session.handle(&request).await {
            Ok(result) => printer.print_ok(&result),
            Err(e) => printer.print_err(&e),
        }
    }

    let export = args.export.clone().or_else(|| settings.export_path.clone());
    if export.is_none() && !session.log().is_empty() {
        warn!("no export path configured, persisted steps will be discarded");
    }
    session.close(export.as_deref()).await;
    Ok(())
}

fn stdin_is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Blank lines are skipped; lines that are not JSON get an error payload.
fn parse_request(line: &str, printer: &ResultPrinter) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(v) => Some(v),
        Err(e) => {
            println!("{}", printer.render_failure("invalid_json", &e.to_string(), &[]));
            None
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

