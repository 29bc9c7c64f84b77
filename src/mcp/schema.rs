//! Conversion from skill metadata to MCP tool descriptors.
//!
//! Each declared parameter carries a semantic type token (`"str"`, `"int"`,
//! `"List[str]"`, `"Optional[int]"`, ...) which is mapped to a JSON-Schema
//! fragment for the tool's `inputSchema`. Unknown tokens map to the empty,
//! unconstrained schema rather than failing.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::skills::SkillMetadata;

/// A tool definition for `tools/list` responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,

    /// Optional behavioural annotations inferred from skill tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

/// Tag-derived tool annotations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// The raw skill tags.
    pub tags: Vec<String>,

    /// Set when the skill is tagged `read_only`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,

    /// Set when the skill is tagged `idempotent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,

    /// Set when the skill is tagged `destructive`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
}

/// Maps a semantic type token to a JSON-Schema fragment.
#[must_use]
pub fn type_token_to_schema(token: &str) -> Value {
    match token {
        "str" => json!({"type": "string"}),
        "int" => json!({"type": "integer"}),
        "float" => json!({"type": "number"}),
        "bool" => json!({"type": "boolean"}),
        "None" => json!({"type": "null"}),
        "dict" | "Dict" => json!({"type": "object"}),
        "list" | "List" | "tuple" | "Tuple" => json!({"type": "array"}),
        "any" | "Any" => json!({}),
        _ => generic_token_to_schema(token),
    }
}

/// Handles parameterised tokens: `List[T]`, `Dict[...]`, `Union[...]`,
/// `Optional[...]`. Anything unrecognised is unconstrained.
fn generic_token_to_schema(token: &str) -> Value {
    if let Some(inner) = strip_generic(token, &["List[", "list["]) {
        return json!({
            "type": "array",
            "items": type_token_to_schema(inner),
        });
    }

    if strip_generic(token, &["Dict[", "dict["]).is_some() {
        // Key structure is not modelled.
        return json!({"type": "object"});
    }

    if let Some(inner) = strip_generic(token, &["Union[", "Optional["]) {
        let variants: Vec<Value> = split_top_level(inner)
            .into_iter()
            .map(type_token_to_schema)
            .collect();
        return json!({"anyOf": variants});
    }

    json!({})
}

/// Strips one of the given generic prefixes plus the trailing `]`.
fn strip_generic<'a>(token: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    for prefix in prefixes {
        if let Some(rest) = token.strip_prefix(prefix) {
            return rest.strip_suffix(']');
        }
    }
    None
}

/// Splits a comma-separated type list, ignoring commas inside nested brackets.
fn split_top_level(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (index, ch) in inner.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(inner[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }

    let tail = inner[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }

    parts
}

/// Converts skill metadata into an MCP tool descriptor.
#[must_use]
pub fn tool_descriptor(name: &str, metadata: &SkillMetadata) -> ToolDescriptor {
    let mut properties = Map::new();
    for (param_name, spec) in &metadata.parameters {
        let mut schema = type_token_to_schema(&spec.type_name);
        if !spec.description.is_empty() {
            if let Some(obj) = schema.as_object_mut() {
                obj.insert(
                    "description".to_string(),
                    Value::String(spec.description.clone()),
                );
            }
        }
        properties.insert(param_name.clone(), schema);
    }

    let mut input_schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !metadata.required.is_empty() {
        if let Some(obj) = input_schema.as_object_mut() {
            obj.insert(
                "required".to_string(),
                json!(metadata.required),
            );
        }
    }

    let annotations = if metadata.tags.is_empty() {
        None
    } else {
        let has = |tag: &str| metadata.tags.iter().any(|t| t == tag);
        Some(ToolAnnotations {
            tags: metadata.tags.clone(),
            read_only_hint: has("read_only").then_some(true),
            idempotent_hint: has("idempotent").then_some(true),
            destructive_hint: has("destructive").then_some(true),
        })
    };

    ToolDescriptor {
        name: name.to_string(),
        description: metadata.description.clone(),
        input_schema,
        annotations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SkillMetadata;

    #[test]
    fn scalar_tokens() {
        assert_eq!(type_token_to_schema("str"), json!({"type": "string"}));
        assert_eq!(type_token_to_schema("int"), json!({"type": "integer"}));
        assert_eq!(type_token_to_schema("float"), json!({"type": "number"}));
        assert_eq!(type_token_to_schema("bool"), json!({"type": "boolean"}));
        assert_eq!(type_token_to_schema("None"), json!({"type": "null"}));
        assert_eq!(type_token_to_schema("dict"), json!({"type": "object"}));
        assert_eq!(type_token_to_schema("list"), json!({"type": "array"}));
    }

    #[test]
    fn unknown_token_is_unconstrained() {
        assert_eq!(type_token_to_schema("MyCustomThing"), json!({}));
        assert_eq!(type_token_to_schema("Any"), json!({}));
    }

    #[test]
    fn list_recurses_into_items() {
        assert_eq!(
            type_token_to_schema("List[str]"),
            json!({"type": "array", "items": {"type": "string"}})
        );
        assert_eq!(
            type_token_to_schema("list[List[int]]"),
            json!({"type": "array", "items": {"type": "array", "items": {"type": "integer"}}})
        );
    }

    #[test]
    fn dict_keys_not_modelled() {
        assert_eq!(type_token_to_schema("Dict[str, int]"), json!({"type": "object"}));
    }

    #[test]
    fn union_splits_respecting_nested_brackets() {
        assert_eq!(
            type_token_to_schema("Union[str, int]"),
            json!({"anyOf": [{"type": "string"}, {"type": "integer"}]})
        );
        // The comma inside Dict[str, int] must not split the union.
        assert_eq!(
            type_token_to_schema("Union[Dict[str, int], List[str]]"),
            json!({"anyOf": [
                {"type": "object"},
                {"type": "array", "items": {"type": "string"}}
            ]})
        );
    }

    #[test]
    fn optional_maps_to_any_of() {
        assert_eq!(
            type_token_to_schema("Optional[int]"),
            json!({"anyOf": [{"type": "integer"}]})
        );
    }

    #[test]
    fn descriptor_with_params_and_required() {
        let metadata = SkillMetadata::new("Adds two integers")
            .with_param("a", "int", "First operand")
            .with_param("b", "int", "Second operand")
            .with_required(&["a", "b"]);

        let tool = tool_descriptor("add", &metadata);
        assert_eq!(tool.name, "add");
        assert_eq!(tool.description, "Adds two integers");
        assert_eq!(
            tool.input_schema,
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "integer", "description": "First operand"},
                    "b": {"type": "integer", "description": "Second operand"}
                },
                "required": ["a", "b"]
            })
        );
        assert!(tool.annotations.is_none());
    }

    #[test]
    fn no_required_key_when_empty() {
        let metadata = SkillMetadata::new("x").with_param("a", "str", "");
        let tool = tool_descriptor("t", &metadata);
        assert!(tool.input_schema.get("required").is_none());
        // Empty parameter description adds no description key.
        assert_eq!(
            tool.input_schema["properties"]["a"],
            json!({"type": "string"})
        );
    }

    #[test]
    fn tag_annotations_inferred() {
        let metadata = SkillMetadata::new("x").with_tags(&["idempotent", "math"]);
        let tool = tool_descriptor("t", &metadata);
        let annotations = tool.annotations.as_ref().unwrap();
        assert_eq!(annotations.idempotent_hint, Some(true));
        assert!(annotations.read_only_hint.is_none());
        assert!(annotations.destructive_hint.is_none());
        assert_eq!(annotations.tags, vec!["idempotent".to_string(), "math".to_string()]);

        let serialised = serde_json::to_value(&tool).unwrap();
        assert_eq!(serialised["annotations"]["idempotentHint"], json!(true));
        assert!(serialised["annotations"].get("readOnlyHint").is_none());
    }

    #[test]
    fn no_annotations_without_tags() {
        let tool = tool_descriptor("t", &SkillMetadata::new("x"));
        let serialised = serde_json::to_value(&tool).unwrap();
        assert!(serialised.get("annotations").is_none());
    }
}
