use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

use crate::{
    codegen::{Compiler, DEFAULT_DISPLAY_ROWS, DEFAULT_STYLE_CLASSES},
    execution::{ExecutorConfig, DEFAULT_STARTUP_CODE},
};

const ENV_PREFIX: &str = "DFSESSION_";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = default_config_path();
        let mut cfg = Self::from_file(config_path);
        cfg.overlay(env::vars());
        cfg
    }

    /// Environment overlay. `DFSESSION_<KEY>` sets `<KEY>` and wins over a
    /// bare `<KEY>` from the same source.
    pub fn overlay(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        let mut prefixed = Vec::new();
        for (k, v) in vars {
            if let Some(key) = k.strip_prefix(ENV_PREFIX) {
                if is_config_key(key) {
                    prefixed.push((key.to_string(), v));
                }
            } else if is_config_key(&k) {
                self.inner.insert(k, v);
            }
        }
        self.inner.extend(prefixed);
    }

    /// Defaults overlaid with `KEY=VALUE` lines from `path`, if it exists.
    pub fn from_file(config_path: PathBuf) -> Self {
        let mut map = default_map();
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }
        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    /// Comma-separated list; empty entries are dropped.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .get(key)?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            None
        } else {
            Some(items)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDetail {
    /// Tracebacks go to the client as reported.
    Verbose,
    /// Execution failures are reported with a generic marker.
    Generic,
}

/// Typed view of everything a session needs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub python_bin: String,
    pub display_rows: usize,
    pub style_classes: Vec<String>,
    pub poll_interval: Duration,
    pub call_timeout: Option<Duration>,
    pub startup_code: Option<String>,
    pub export_path: Option<PathBuf>,
    pub allowed_operations: Option<Vec<String>>,
    pub error_detail: ErrorDetail,
}

impl SessionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let call_timeout = match cfg.get_u64("EXECUTE_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(300)),
        };
        let error_detail = match cfg.get("ERROR_DETAIL").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("generic") => ErrorDetail::Generic,
            _ => ErrorDetail::Verbose,
        };
        Self {
            python_bin: cfg.get("PYTHON_BIN").unwrap_or_else(|| "python3".into()),
            display_rows: cfg.get_usize("DISPLAY_ROWS").unwrap_or(DEFAULT_DISPLAY_ROWS),
            style_classes: cfg
                .get("STYLE_CLASSES")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| DEFAULT_STYLE_CLASSES.iter().map(|s| s.to_string()).collect()),
            poll_interval: Duration::from_millis(
                cfg.get_u64("POLL_INTERVAL_MS").filter(|ms| *ms > 0).unwrap_or(1000),
            ),
            call_timeout,
            startup_code: cfg.get("STARTUP_CODE").filter(|c| !c.trim().is_empty()),
            export_path: cfg.get_path("EXPORT_PATH"),
            allowed_operations: cfg.get_list("ALLOWED_OPERATIONS"),
            error_detail,
        }
    }

    pub fn compiler(&self) -> Compiler {
        let compiler = Compiler::new(self.display_rows, self.style_classes.clone());
        match &self.allowed_operations {
            Some(ops) => compiler.with_allowed_operations(ops.clone()),
            None => compiler,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            poll_interval: self.poll_interval,
            call_timeout: self.call_timeout,
            startup_code: self.startup_code.clone(),
        }
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "PYTHON_BIN",
        "DISPLAY_ROWS",
        "STYLE_CLASSES",
        "POLL_INTERVAL_MS",
        "EXECUTE_TIMEOUT_SECS",
        "STARTUP_CODE",
        "EXPORT_PATH",
        "ALLOWED_OPERATIONS",
        "ERROR_DETAIL",
        "LOG_LEVEL",
    ];

    KEYS.contains(&k)
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("dfsession").join(".dfsessionrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert("PYTHON_BIN".into(), "python3".into());
    m.insert("STARTUP_CODE".into(), DEFAULT_STARTUP_CODE.into());
    m.insert("STYLE_CLASSES".into(), DEFAULT_STYLE_CLASSES.join(" "));
    m.insert("ERROR_DETAIL".into(), "verbose".into());
    m.insert("LOG_LEVEL".into(), "info".into());

    // Numbers
    m.insert("DISPLAY_ROWS".into(), DEFAULT_DISPLAY_ROWS.to_string());
    m.insert("POLL_INTERVAL_MS".into(), "1000".into());
    m.insert("EXECUTE_TIMEOUT_SECS".into(), "300".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_file(PathBuf::from("/nonexistent/.dfsessionrc"));
        let s = SessionSettings::from_config(&cfg);
        assert_eq!(s.python_bin, "python3");
        assert_eq!(s.display_rows, 5);
        assert_eq!(s.style_classes, vec!["table", "is-fullwidth"]);
        assert_eq!(s.poll_interval, Duration::from_secs(1));
        assert_eq!(s.call_timeout, Some(Duration::from_secs(300)));
        assert_eq!(s.startup_code.as_deref(), Some("import pandas as pd"));
        assert_eq!(s.error_detail, ErrorDetail::Verbose);
        assert!(s.allowed_operations.is_none());
        assert!(s.export_path.is_none());
    }

    #[test]
    fn test_rc_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".dfsessionrc");
        fs::write(
            &path,
            "# comment\nDISPLAY_ROWS=15\nEXECUTE_TIMEOUT_SECS=0\nALLOWED_OPERATIONS=head, describe,,\nERROR_DETAIL=Generic\n",
        )
        .unwrap();
        let s = SessionSettings::from_config(&Config::from_file(path));
        assert_eq!(s.display_rows, 15);
        assert_eq!(s.call_timeout, None);
        assert_eq!(s.allowed_operations, Some(vec!["head".to_string(), "describe".to_string()]));
        assert_eq!(s.error_detail, ErrorDetail::Generic);
    }

    #[test]
    fn test_empty_startup_code_disables_it() {
        let mut cfg = Config::from_file(PathBuf::from("/nonexistent/.dfsessionrc"));
        cfg.set("STARTUP_CODE", "  ");
        assert!(SessionSettings::from_config(&cfg).executor_config().startup_code.is_none());
    }

    #[test]
    fn test_config_keys() {
        assert!(is_config_key("DISPLAY_ROWS"));
        assert!(!is_config_key("DFSESSION_DISPLAY_ROWS"));
        assert!(!is_config_key("HOME"));
    }

    #[test]
    fn test_prefixed_env_overrides_key() {
        let mut cfg = Config::from_file(PathBuf::from("/nonexistent/.dfsessionrc"));
        cfg.overlay(vec![
            ("DFSESSION_DISPLAY_ROWS".to_string(), "15".to_string()),
            ("DISPLAY_ROWS".to_string(), "7".to_string()),
            ("EXECUTE_TIMEOUT_SECS".to_string(), "60".to_string()),
            ("DFSESSION_UNKNOWN".to_string(), "x".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);
        let s = SessionSettings::from_config(&cfg);
        assert_eq!(s.display_rows, 15);
        assert_eq!(s.call_timeout, Some(Duration::from_secs(60)));
        assert!(cfg.get("UNKNOWN").is_none());
        assert!(cfg.get("HOME").is_none());
    }
}
