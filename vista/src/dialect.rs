//! Detection of the dialect a spec document is written in.

use serde_json::Value as JsonValue;

/// Substring of a `$schema` identifier that marks the high-level dialect.
pub const HIGH_LEVEL_MARKER: &str = "vista-lite";

/// Schema identifier of the low-level dialect.
pub const SCHEMA: &str = "https://vista.dev/schema/vista/v1.json";

/// Schema identifier of the high-level dialect.
pub const LITE_SCHEMA: &str = "https://vista.dev/schema/vista-lite/v1.json";

/// The two dialects a spec can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Directly executable.
    Low,
    /// Must be compiled to the low-level dialect before execution.
    High,
}

impl Dialect {
    /// Sniffs the dialect of the given document from its `$schema` field.
    ///
    /// Only a string schema decides: it names the high-level dialect if it
    /// contains [`HIGH_LEVEL_MARKER`], and the low-level dialect otherwise.
    /// Documents without a string schema are assumed to be high-level.
    pub fn detect(doc: &JsonValue) -> Self {
        match doc.get("$schema") {
            Some(JsonValue::String(schema)) if !schema.contains(HIGH_LEVEL_MARKER) => Self::Low,
            _ => Self::High,
        }
    }
}
