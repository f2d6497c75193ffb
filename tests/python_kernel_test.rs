use std::{process::Command, time::Duration};

use anyhow::Result;
use dfsession::{
    config::{Config, SessionSettings},
    error::ExecutionFailure,
    session, Executor, ExecutorConfig, Interpreter, NotebookStepLog, PythonKernel, StepLog,
};
use serde_json::json;

fn has_python(code: &str) -> bool {
    Command::new("python3")
        .args(["-c", code])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn plain_config() -> ExecutorConfig {
    ExecutorConfig {
        poll_interval: Duration::from_millis(200),
        call_timeout: Some(Duration::from_secs(30)),
        startup_code: None,
    }
}

#[tokio::test]
async fn test_python_kernel_round_trips_state() -> Result<()> {
    if !has_python("pass") {
        println!("Warning: python3 not found, skipping");
        return Ok(());
    }

    let kernel = PythonKernel::start("python3").await?;
    let mut executor = Executor::start(kernel, plain_config()).await?;

    assert_eq!(executor.execute("1 + 1").await?.text, "2");
    assert_eq!(executor.execute("print('hi')").await?.text, "hi\n");
    assert_eq!(executor.execute("x = 5").await?.text, "");
    assert_eq!(executor.execute("x * 2").await?.text, "10");

    let err = executor.execute("raise ValueError('bad')").await.unwrap_err();
    assert_eq!(err.failure, ExecutionFailure::Raised);
    assert_eq!(err.traceback.last().map(String::as_str), Some("ValueError: bad"));

    // Still usable after an error.
    assert_eq!(executor.execute("x").await?.text, "5");

    executor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_python_kernel_exit_is_fatal() -> Result<()> {
    if !has_python("pass") {
        println!("Warning: python3 not found, skipping");
        return Ok(());
    }

    let kernel = PythonKernel::start("python3").await?;
    let mut executor = Executor::start(kernel, plain_config()).await?;

    let err = executor.execute("import os; os._exit(3)").await.unwrap_err();
    assert!(err.is_fatal(), "got {err:?}");
    executor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_user_code_cannot_reach_protocol_stdin() -> Result<()> {
    if !has_python("pass") {
        println!("Warning: python3 not found, skipping");
        return Ok(());
    }

    let kernel = PythonKernel::start("python3").await?;
    let mut executor = Executor::start(kernel, plain_config()).await?;

    let err = executor.execute("exit()").await.unwrap_err();
    assert_eq!(err.failure, ExecutionFailure::Raised);
    assert_eq!(executor.execute("1 + 1").await?.text, "2");

    assert_eq!(executor.execute("import sys; sys.stdin.read()").await?.text, "''");
    assert_eq!(executor.execute("open('/dev/stdin').read()").await?.text, "''");
    assert_eq!(executor.execute("import os; os.write(1, b'stray\\n'); 3").await?.text, "3");

    executor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_python_kernel_stop_ends_process() -> Result<()> {
    if !has_python("pass") {
        println!("Warning: python3 not found, skipping");
        return Ok(());
    }

    let mut kernel = PythonKernel::start("python3").await?;
    assert!(kernel.is_alive().await);
    kernel.stop().await?;
    assert!(!kernel.is_alive().await);
    Ok(())
}

#[tokio::test]
async fn test_pandas_session_end_to_end() -> Result<()> {
    if !has_python("import pandas") {
        println!("Warning: python3 with pandas not found, skipping");
        return Ok(());
    }

    let dir = tempfile::tempdir()?;
    let csv = dir.path().join("data.csv");
    std::fs::write(&csv, "id,name\n1,a\n2,b\n3,c\n")?;
    let export = dir.path().join("session.ipynb");

    let mut cfg = Config::from_file(dir.path().join(".dfsessionrc"));
    cfg.set("POLL_INTERVAL_MS", "200");
    let settings = SessionSettings::from_config(&cfg);
    let mut session = session::start_python(&settings, None).await?;

    let csv_path = csv.to_string_lossy().to_string();
    let table = session
        .handle(&json!({"mod": "pd", "func": "read_csv", "args": [csv_path], "kwargs": {"index_col": "id"}, "save": true}))
        .await?;
    assert!(table.text.contains("<table"), "got {}", table.text);
    assert!(table.text.contains("3 rows"), "got {}", table.text);

    let series = session.handle(&json!({"mod": "df", "func": "count"})).await?;
    assert!(series.text.contains("<table"), "got {}", series.text);

    let caps = session.capabilities(dfsession::Target::Frame).await?;
    assert!(caps.iter().any(|c| c.name == "head"));

    session.close(Some(export.as_path())).await;
    let log = NotebookStepLog::load(&export)?;
    assert_eq!(log.len(), 1);
    assert!(log.range(None, None).starts_with("df = pd.read_csv("));
    Ok(())
}
