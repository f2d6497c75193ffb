//! Request compiler: turns a structured intent into Python statement text.
//!
//! The request is untrusted. Two things keep the generated text safe: every
//! string value is emitted as an escaped literal, and the call target comes
//! from a closed set. Operation and keyword names must be plain identifiers,
//! and an optional allow-list narrows operations further.

use serde_json::{Map, Number, Value};

use crate::error::{ValidationError, ValidationErrorKind};

pub mod introspect;

/// Variable that holds results the caller asked to keep.
pub const DURABLE_NAME: &str = "df";
/// Variable that holds throwaway previews.
pub const SCRATCH_NAME: &str = "current_state";

pub const DEFAULT_DISPLAY_ROWS: usize = 5;
pub const DEFAULT_STYLE_CLASSES: &[&str] = &["table", "is-fullwidth"];

/// Call targets an intent may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The live working frame (`df`).
    Frame,
    /// The pandas module namespace (`pd`).
    Pandas,
}

impl Target {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "df" => Some(Self::Frame),
            "pd" => Some(Self::Pandas),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Frame => DURABLE_NAME,
            Self::Pandas => "pd",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Number(Number),
    Bool(bool),
    Null,
}

impl Scalar {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Null => Some(Self::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Python literal text for this value.
    pub fn literal(&self) -> String {
        match self {
            Self::Str(s) => quote(s),
            Self::Number(n) => n.to_string(),
            Self::Bool(true) => "True".into(),
            Self::Bool(false) => "False".into(),
            Self::Null => "None".into(),
        }
    }
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub target: Target,
    pub operation: String,
    pub args: Vec<Scalar>,
    pub kwargs: Vec<(String, Scalar)>,
    pub persist: bool,
}

impl Intent {
    /// Validates the wire form `{"mod", "func", "args", "kwargs", "save"}`.
    /// Unknown fields are ignored.
    pub fn from_json(request: &Value) -> Result<Self, ValidationError> {
        let empty = Map::new();
        let fields = request.as_object().unwrap_or(&empty);

        let operation = match fields.get("func") {
            None => {
                return Err(ValidationError::new(
                    ValidationErrorKind::MissingOperation,
                    "'func' required",
                ))
            }
            Some(Value::String(s)) if is_identifier(s) => s.clone(),
            Some(other) => {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidOperation,
                    format!("'func' must be an identifier, got {other}"),
                ))
            }
        };

        let raw_args: &[Value] = match fields.get("args") {
            None => &[],
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidArgsShape,
                    "'args' should be a list",
                ))
            }
        };
        let raw_kwargs = match fields.get("kwargs") {
            None => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidKwargsShape,
                    "'kwargs' should be a mapping",
                ))
            }
        };

        // An empty string is the UI's way of saying "no positional argument".
        let mut args = Vec::with_capacity(raw_args.len());
        for (i, v) in raw_args.iter().enumerate() {
            if matches!(v, Value::String(s) if s.is_empty()) {
                continue;
            }
            let scalar = Scalar::from_json(v).ok_or_else(|| {
                ValidationError::new(
                    ValidationErrorKind::InvalidArgument,
                    format!("args[{i}] must be a string, number, bool or null"),
                )
            })?;
            args.push(scalar);
        }

        let mut kwargs = Vec::with_capacity(raw_kwargs.len());
        for (name, v) in raw_kwargs {
            if !is_identifier(name) {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidKeyword,
                    format!("keyword {name:?} is not an identifier"),
                ));
            }
            let scalar = Scalar::from_json(v).ok_or_else(|| {
                ValidationError::new(
                    ValidationErrorKind::InvalidArgument,
                    format!("kwargs[{name:?}] must be a string, number, bool or null"),
                )
            })?;
            kwargs.push((name.clone(), scalar));
        }

        let persist = match fields.get("save") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidArgument,
                    "'save' must be a bool",
                ))
            }
        };

        let target = match fields.get("mod") {
            None | Some(Value::Null) => {
                return Err(ValidationError::new(
                    ValidationErrorKind::MissingTarget,
                    "'mod' required",
                ))
            }
            Some(Value::String(s)) if s.is_empty() => {
                return Err(ValidationError::new(
                    ValidationErrorKind::MissingTarget,
                    "'mod' required",
                ))
            }
            Some(v) => v.as_str().and_then(Target::parse).ok_or_else(|| {
                ValidationError::new(
                    ValidationErrorKind::DisallowedTarget,
                    "only 'df' or 'pd' mod is allowed",
                )
            })?,
        };

        Ok(Self { target, operation, args, kwargs, persist })
    }

    /// Rendered call arguments: positionals first, then `name=value` pairs.
    pub fn call_args(&self) -> String {
        self.args
            .iter()
            .map(Scalar::literal)
            .chain(self.kwargs.iter().map(|(k, v)| format!("{k}={}", v.literal())))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Generated text for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    pub assignment_target: &'static str,
    pub expression_text: String,
    pub display_text: String,
}

impl CompiledStatement {
    /// The generating half: what the step log records.
    pub fn persisted_code(&self) -> String {
        format!("{} = {}", self.assignment_target, self.expression_text)
    }

    /// Assignment followed by the preview block; what the interpreter runs.
    pub fn full_code(&self) -> String {
        format!("{}\n{}", self.persisted_code(), self.display_text)
    }
}

#[derive(Debug, Clone)]
pub struct Compiler {
    display_rows: usize,
    style_classes: Vec<String>,
    allowed_operations: Option<Vec<String>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(
            DEFAULT_DISPLAY_ROWS,
            DEFAULT_STYLE_CLASSES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl Compiler {
    pub fn new(display_rows: usize, style_classes: Vec<String>) -> Self {
        Self { display_rows, style_classes, allowed_operations: None }
    }

    /// Restricts operations to a vetted list.
    pub fn with_allowed_operations(mut self, ops: Vec<String>) -> Self {
        self.allowed_operations = Some(ops);
        self
    }

    pub fn compile(&self, request: &Value) -> Result<CompiledStatement, ValidationError> {
        let intent = Intent::from_json(request)?;
        self.compile_intent(&intent)
    }

    pub fn compile_intent(&self, intent: &Intent) -> Result<CompiledStatement, ValidationError> {
        if let Some(allowed) = &self.allowed_operations {
            if !allowed.iter().any(|op| op == &intent.operation) {
                return Err(ValidationError::new(
                    ValidationErrorKind::OperationNotAllowed,
                    format!("operation '{}' is not allowed", intent.operation),
                ));
            }
        }

        let expression_text =
            format!("{}.{}({})", intent.target.symbol(), intent.operation, intent.call_args());
        let assignment_target = if intent.persist { DURABLE_NAME } else { SCRATCH_NAME };
        let display_text = self.display_block(assignment_target);

        Ok(CompiledStatement { assignment_target, expression_text, display_text })
    }

    /// Preview block; the frame/series decision happens inside the interpreter.
    fn display_block(&self, var: &str) -> String {
        let classes = quote(&self.style_classes.join(" "));
        let rows = self.display_rows;
        let frame_html =
            format!("print({var}.head({rows}).to_html(classes={classes}, show_dimensions=True))");
        let series_html = format!(
            "print({var}.to_frame().head({rows}).to_html(classes={classes}, show_dimensions=True))"
        );
        format!(
            "if isinstance({var}, pd.DataFrame):\n    {frame_html}\nelif isinstance({var}, pd.Series):\n    {series_html}"
        )
    }
}

/// Double-quoted Python string literal. JSON string escapes are a subset of
/// Python's, so the JSON encoding is a valid literal.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
