//! Tool call parsing: normalizes provider output to `ToolCall` structs.
//!
//! Two sources are handled:
//!
//! 1. **native**: the provider returns structured `tool_calls` with a
//!    function name and arguments (a JSON string for OpenAI-compatible
//!    servers, a JSON object for Ollama).
//!
//! 2. **text-embedded**: small local models often answer with the call
//!    written into their text content instead:
//!    ```text
//!    {"name": "get_time", "arguments": {}}
//!    read_file("/home/ana/notes.txt")
//!    ```
//!    These are recovered only when the name is one of the tools offered in
//!    that turn, so ordinary prose or code samples are left alone.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{ToolCall, ToolDefinition};

/// Parameter name used for `tool("value")` when the schema has no required field.
const FALLBACK_PARAM: &str = "input";

static FUNCTION_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w.]*)\s*\(\s*(?:["']([^"']*)["'])?\s*\)"#)
        .expect("function-call regex is valid")
});

// ─── Native Parsing ──────────────────────────────────────────────────────────

/// Build a `ToolCall` from a native tool call whose arguments are a JSON string.
///
/// Blank arguments become `{}`. Arguments that are not valid JSON are kept
/// verbatim as a string so argument validation can reject the call and report
/// it back to the model, rather than failing the whole provider response.
pub fn parse_native_tool_call(
    id: Option<&str>,
    name: &str,
    arguments_json: &str,
) -> Result<ToolCall, InferenceError> {
    let arguments = if arguments_json.trim().is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_str(arguments_json) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call arguments are not valid JSON");
                serde_json::Value::String(arguments_json.to_string())
            }
        }
    };
    native_call(id, name, arguments, arguments_json)
}

/// Build a `ToolCall` from a native tool call whose arguments are already JSON.
pub fn native_call(
    id: Option<&str>,
    name: &str,
    arguments: serde_json::Value,
    raw: &str,
) -> Result<ToolCall, InferenceError> {
    if name.trim().is_empty() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: raw.to_string(),
            reason: "empty tool name".into(),
        });
    }

    let call_id = id
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));

    Ok(ToolCall {
        id: call_id,
        name: name.to_string(),
        arguments,
    })
}

// ─── Text-Embedded Parsing ───────────────────────────────────────────────────

/// Recover a tool call written into text content.
///
/// Tries the JSON object form first, then the `tool("value")` form. Returns
/// `None` when nothing in the text names an offered tool.
pub fn parse_text_tool_call(text: &str, offered: &[ToolDefinition]) -> Option<ToolCall> {
    if offered.is_empty() {
        return None;
    }
    parse_json_object_call(text, offered).or_else(|| parse_function_call(text, offered))
}

/// Find the first `{"name": ..., "arguments": {...}}` object naming an offered tool.
fn parse_json_object_call(text: &str, offered: &[ToolDefinition]) -> Option<ToolCall> {
    for (idx, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[idx..]).into_iter::<serde_json::Value>();
        let Some(Ok(value)) = stream.next() else {
            continue;
        };
        let Some(name) = value.get("name").and_then(|n| n.as_str()) else {
            continue;
        };
        if !offered.iter().any(|t| t.name == name) {
            continue;
        }
        let arguments = match value.get("arguments").or_else(|| value.get("parameters")) {
            Some(serde_json::Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| serde_json::json!({})),
            Some(v) => v.clone(),
            None => serde_json::json!({}),
        };
        tracing::debug!(tool = name, "recovered JSON tool call from text content");
        return Some(ToolCall::new(name, arguments));
    }
    None
}

/// Find the first `tool("value")` or `tool()` naming an offered tool.
///
/// The single string is bound to the tool's first required parameter.
fn parse_function_call(text: &str, offered: &[ToolDefinition]) -> Option<ToolCall> {
    for caps in FUNCTION_CALL_RE.captures_iter(text) {
        let name = &caps[1];
        let Some(def) = offered.iter().find(|t| t.name == name) else {
            continue;
        };
        let arguments = match caps.get(2) {
            Some(value) => {
                let param = def
                    .required_params()
                    .first()
                    .copied()
                    .unwrap_or(FALLBACK_PARAM)
                    .to_string();
                let mut args = serde_json::Map::new();
                args.insert(param, serde_json::Value::String(value.as_str().to_string()));
                serde_json::Value::Object(args)
            }
            None => serde_json::json!({}),
        };
        tracing::debug!(tool = name, "recovered function-style tool call from text content");
        return Some(ToolCall::new(name, arguments));
    }
    None
}

// ─── Tests ───────────────────────────────────────────────────────────────────
