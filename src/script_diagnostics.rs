//! Structured script diagnostics.
//!
//! Rhai provides rich error types (parse + runtime) with positions. These are
//! wrapped into a stable, JSON-serializable format so hosts can surface
//! script problems without scraping logs.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// Syntax/parse errors (compile time).
    ParseError,
    /// Runtime errors in user code.
    RuntimeError,
    /// Script used a variable or function the host does not provide.
    HostApiMisuse,
    /// Script exceeded a sandbox limit (operations, depth, sizes).
    LimitExceeded,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub message: String,
    pub location: Option<ScriptLocation>,
}

impl ScriptDiagnostic {
    pub fn new(kind: ScriptDiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }
}

fn classify_message(message: &str) -> ScriptDiagnosticKind {
    // Rhai error strings are fairly stable; this avoids depending on the
    // exact enum variants.
    let lower = message.to_ascii_lowercase();

    if lower.contains("too many operations")
        || lower.contains("too deep")
        || lower.contains("stack overflow")
        || lower.contains("too large")
    {
        return ScriptDiagnosticKind::LimitExceeded;
    }

    if lower.contains("variable not found")
        || lower.contains("function not found")
        || lower.contains("property not found")
        || lower.contains("mismatched types")
    {
        return ScriptDiagnosticKind::HostApiMisuse;
    }

    ScriptDiagnosticKind::RuntimeError
}

fn location_of(pos: rhai::Position) -> Option<ScriptLocation> {
    let line = pos.line()? as u32;
    if line == 0 {
        return None;
    }
    Some(ScriptLocation {
        line,
        column: (pos.position().unwrap_or(0) as u32).max(1),
    })
}

pub fn from_parse_error(err: &rhai::ParseError) -> ScriptDiagnostic {
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::ParseError,
        message: err.to_string(),
        location: location_of(err.position()),
    }
}

pub fn from_eval_error(err: &rhai::EvalAltResult) -> ScriptDiagnostic {
    let message = err.to_string();
    ScriptDiagnostic {
        kind: classify_message(&message),
        message,
        location: location_of(err.position()),
    }
}
