//! Extension seams for the business logic this bridge deliberately does not
//! implement (§1 Non-goals, §10.7): per-tool parameter validation and
//! result reformatting. Both are external collaborators here; this module
//! only defines the trait shape and a pass-through default.

use serde_json::Value;

use sa_domain::error::Result;

/// Validates tool parameters before a command is queued. The default
/// implementation passes everything through unchanged — wiring in the real
/// per-tool validation (`tools.py`'s Pydantic models, in the original
/// system) is out of scope for this bridge.
pub trait ToolValidator: Send + Sync {
    fn validate(&self, tool: &str, params: Value) -> Result<Value>;
}

/// Reformats a completed command's result before it is handed back to the
/// caller. The default implementation passes the result through unchanged
/// — the original system's TOON/JSON reformatting is out of scope.
pub trait ResultFormatter: Send + Sync {
    fn format(&self, tool: &str, result: Value) -> Value;
}

#[derive(Default)]
pub struct PassthroughValidator;

impl ToolValidator for PassthroughValidator {
    fn validate(&self, _tool: &str, params: Value) -> Result<Value> {
        Ok(params)
    }
}

#[derive(Default)]
pub struct PassthroughFormatter;

impl ResultFormatter for PassthroughFormatter {
    fn format(&self, _tool: &str, result: Value) -> Value {
        result
    }
}
