//! Printers: JSON lines for programs, colored text for terminals.

use owo_colors::OwoColorize;
use serde_json::json;

use crate::{config::ErrorDetail, error::SessionError, execution::RenderedResult};

const GENERIC_FAILURE: &str = "execution failed";

pub struct ResultPrinter {
    pub json: bool,
    pub detail: ErrorDetail,
}

impl ResultPrinter {
    pub fn new(json: bool, detail: ErrorDetail) -> Self {
        Self { json, detail }
    }

    pub fn render_ok(&self, result: &RenderedResult) -> String {
        if self.json {
            json!({ "ok": true, "result": result.text }).to_string()
        } else {
            result.text.clone()
        }
    }

    pub fn render_err(&self, err: &SessionError) -> String {
        let generic = self.detail == ErrorDetail::Generic
            && matches!(err, SessionError::Execution(_));
        if generic {
            self.render_failure(err.kind(), GENERIC_FAILURE, &[])
        } else {
            self.render_failure(err.kind(), &err.to_string(), err.traceback())
        }
    }

    /// Error payload for failures that happen outside the session, such as
    /// a request line that is not JSON.
    pub fn render_failure(&self, kind: &str, message: &str, traceback: &[String]) -> String {
        if self.json {
            return json!({
                "ok": false,
                "error": { "kind": kind, "message": message, "traceback": traceback }
            })
            .to_string();
        }
        let mut out = format!("{} {}", format!("error[{kind}]:").red(), message);
        for line in traceback {
            out.push('\n');
            out.push_str(&format!("{}", line.yellow()));
        }
        out
    }

    pub fn print_ok(&self, result: &RenderedResult) {
        println!("{}", self.render_ok(result));
    }

    pub fn print_err(&self, err: &SessionError) {
        println!("{}", self.render_err(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionError, ValidationError, ValidationErrorKind};
    use serde_json::Value;

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_ok_line() {
        let p = ResultPrinter::new(true, ErrorDetail::Verbose);
        let v = parse(&p.render_ok(&RenderedResult::new("<table/>")));
        assert_eq!(v, json!({"ok": true, "result": "<table/>"}));
    }

    #[test]
    fn test_verbose_execution_error_carries_traceback() {
        let p = ResultPrinter::new(true, ErrorDetail::Verbose);
        let err = SessionError::from(ExecutionError::raised(vec!["KeyError: 'a'".into()]));
        let v = parse(&p.render_err(&err));
        assert_eq!(v["error"]["kind"], "execution_error");
        assert_eq!(v["error"]["traceback"][0], "KeyError: 'a'");
    }

    #[test]
    fn test_generic_hides_execution_details_only() {
        let p = ResultPrinter::new(true, ErrorDetail::Generic);
        let exec = SessionError::from(ExecutionError::raised(vec!["secret path".into()]));
        let v = parse(&p.render_err(&exec));
        assert_eq!(v["error"]["message"], GENERIC_FAILURE);
        assert_eq!(v["error"]["traceback"], json!([]));

        let invalid = SessionError::from(ValidationError::new(
            ValidationErrorKind::DisallowedTarget,
            "only 'df' or 'pd' mod is allowed",
        ));
        let v = parse(&p.render_err(&invalid));
        assert_eq!(v["error"]["kind"], "disallowed_target");
        assert_eq!(v["error"]["message"], "only 'df' or 'pd' mod is allowed");
    }

    #[test]
    fn test_text_mode_is_plain_result() {
        let p = ResultPrinter::new(false, ErrorDetail::Verbose);
        assert_eq!(p.render_ok(&RenderedResult::new("2")), "2");
    }
}
