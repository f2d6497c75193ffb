//! Append-only history of generating statements, exportable as a notebook.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::FormatError;

pub const NOTEBOOK_EXTENSION: &str = "ipynb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub code: String,
}

/// Storage for persisted steps. Any backend offering these operations can
/// stand behind a session.
pub trait StepLog {
    /// Records `code` and returns its 0-based position.
    fn append(&mut self, code: &str) -> usize;

    /// Code of steps in `[start, end)`, joined by newlines in index order.
    /// Bounds default to the whole log and are clamped to it.
    fn range(&self, start: Option<usize>, end: Option<usize>) -> String;

    /// Writes the log durably to `path`.
    fn export(&self, path: &Path) -> Result<(), FormatError>;

    fn steps(&self) -> &[Step];

    fn len(&self) -> usize {
        self.steps().len()
    }

    fn is_empty(&self) -> bool {
        self.steps().is_empty()
    }
}

/// Steps kept in memory and exported as nbformat v4 code cells.
#[derive(Debug, Clone, Default)]
pub struct NotebookStepLog {
    steps: Vec<Step>,
}

impl NotebookStepLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes from a notebook written earlier. Code cells become steps in
    /// document order; other cell types are dropped.
    pub fn load(path: &Path) -> Result<Self, FormatError> {
        require_notebook_extension(path)?;
        let text = fs::read_to_string(path)
            .map_err(|source| FormatError::Io { path: path.to_path_buf(), source })?;
        let doc: NotebookDocument = serde_json::from_str(&text)?;
        let mut log = Self::new();
        for cell in doc.cells.into_iter().filter(|c| c.cell_type == "code") {
            log.append(&cell.source.into_text());
        }
        info!(path = %path.display(), steps = log.len(), "resumed step log");
        Ok(log)
    }

    fn to_document(&self) -> NotebookDocument {
        NotebookDocument {
            cells: self.steps.iter().map(|s| Cell::code(&s.code)).collect(),
            metadata: notebook_metadata(),
            nbformat: 4,
            nbformat_minor: 5,
        }
    }
}

impl StepLog for NotebookStepLog {
    fn append(&mut self, code: &str) -> usize {
        let index = self.steps.len();
        self.steps.push(Step { index, code: code.to_string() });
        debug!(index, "step appended");
        index
    }

    fn range(&self, start: Option<usize>, end: Option<usize>) -> String {
        let len = self.steps.len();
        let end = end.unwrap_or(len).min(len);
        let start = start.unwrap_or(0).min(end);
        self.steps[start..end]
            .iter()
            .map(|s| s.code.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn export(&self, path: &Path) -> Result<(), FormatError> {
        require_notebook_extension(path)?;
        let body = serde_json::to_string_pretty(&self.to_document())?;
        write_atomically(path, body.as_bytes())
            .map_err(|source| FormatError::Io { path: path.to_path_buf(), source })?;
        info!(path = %path.display(), steps = self.steps.len(), "exported step log");
        Ok(())
    }

    fn steps(&self) -> &[Step] {
        &self.steps
    }
}

fn require_notebook_extension(path: &Path) -> Result<(), FormatError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(NOTEBOOK_EXTENSION) => Ok(()),
        _ => Err(FormatError::Extension(path.to_path_buf())),
    }
}

/// Temp file in the target directory, then rename over the destination.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn notebook_metadata() -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(
        "kernelspec".into(),
        serde_json::json!({"display_name": "Python 3", "language": "python", "name": "python3"}),
    );
    m.insert("language_info".into(), serde_json::json!({"name": "python"}));
    m
}

#[derive(Debug, Serialize, Deserialize)]
struct NotebookDocument {
    cells: Vec<Cell>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    nbformat: u32,
    #[serde(default)]
    nbformat_minor: u32,
}

fn default_nbformat() -> u32 {
    4
}

#[derive(Debug, Serialize, Deserialize)]
struct Cell {
    cell_type: String,
    source: CellSource,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outputs: Option<Vec<Value>>,
    #[serde(default)]
    execution_count: Option<u64>,
}

impl Cell {
    fn code(source: &str) -> Self {
        Self {
            cell_type: "code".into(),
            source: CellSource::Text(source.to_string()),
            metadata: Map::new(),
            outputs: Some(Vec::new()),
            execution_count: None,
        }
    }
}

/// nbformat allows a cell source as one string or as a list of lines.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl CellSource {
    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Lines(lines) => lines.concat(),
        }
    }
}
