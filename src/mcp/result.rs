//! Normalisation of tool invocation outcomes into the MCP result envelope.
//!
//! Every invocation, whether it returns a value or fails, becomes a
//! `{content, isError}` envelope; nothing else ever crosses the dispatch
//! boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::skills::SkillError;

/// Content item in a tool call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result envelope of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,

    /// Whether the tool call resulted in an error.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// Converts a raw invocation outcome into the result envelope.
///
/// - A value already shaped like `{content: [...]}` passes through unchanged.
/// - A [`SkillError`] becomes an error envelope with its message.
/// - Any other value becomes a single text block: strings verbatim, other
///   scalars via their display form, arrays and objects as compact JSON.
#[must_use]
pub fn to_tool_result(outcome: Result<Value, SkillError>) -> ToolResult {
    match outcome {
        Ok(value) => {
            if value.get("content").is_some() {
                if let Ok(envelope) = serde_json::from_value::<ToolResult>(value.clone()) {
                    return envelope;
                }
            }
            ToolResult::text(stringify(&value))
        }
        Err(error) => ToolResult::error(error.to_string()),
    }
}

/// Renders a JSON value as the text of a content block.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        compound => serde_json::to_string(compound).unwrap_or_default(),
    }
}
