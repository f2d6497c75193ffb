//! Capability discovery: which public callables a target exposes.
//!
//! The generated script prints a JSON array on stdout. It binds no names that
//! outlive the call, and it is never written to the step log.

use serde::{Deserialize, Serialize};

use super::Target;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Python parameter kind, e.g. `POSITIONAL_OR_KEYWORD`, `VAR_KEYWORD`.
    pub kind: String,
    /// `repr()` of the default value, absent when the parameter is required.
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

const INTROSPECT_TEMPLATE: &str = r#"def __dfs_introspect(obj):
    import inspect, json
    def params(fn):
        try:
            sig = inspect.signature(fn)
        except (TypeError, ValueError):
            return []
        return [
            {
                "name": p.name,
                "kind": p.kind.name,
                "default": None if p.default is inspect.Parameter.empty else repr(p.default),
            }
            for p in sig.parameters.values()
        ]
    try:
        members = inspect.getmembers(obj, inspect.isfunction)
    except NotImplementedError:
        members = inspect.getmembers(obj.__class__, inspect.isfunction)
    print(json.dumps([
        {"name": name, "parameters": params(fn)}
        for name, fn in members
        if not name.startswith("_")
    ]))
__dfs_introspect(__DFS_OBJECT__)
del __dfs_introspect"#;

/// Script listing the public functions of `pd.DataFrame` (for `df`) or of
/// the `pd` module.
pub fn introspection_code(target: Target) -> String {
    let object = match target {
        Target::Frame => "pd.DataFrame",
        Target::Pandas => "pd",
    };
    INTROSPECT_TEMPLATE.replace("__DFS_OBJECT__", object)
}

pub fn parse_capabilities(output: &str) -> Result<Vec<Capability>, serde_json::Error> {
    serde_json::from_str(output.trim())
}
