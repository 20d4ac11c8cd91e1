//! ToolRouter: dispatches model tool calls to registered tools.
//!
//! The ToolRouter is the bridge between the model's tool call decisions and
//! the tool catalog. It handles:
//! - Offer check (the tool was advertised in this turn)
//! - Argument validation against the tool's JSON schema
//! - Execution with a per-tool timeout
//!
//! Every failure is turned into an error `ToolResult` so the loop can feed it
//! back to the model; nothing here aborts a request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::errors::AgentError;
use super::tool_registry::ToolRegistry;
use super::types::ToolResult;
use crate::inference::types::{ToolCall, ToolDefinition};

/// Result of dispatching one tool call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub call: ToolCall,
    pub result: ToolResult,
    /// Set when `result` is an error.
    pub error: Option<AgentError>,
    pub duration_ms: u64,
}

pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl ToolRouter {
    pub fn new(registry: Arc<ToolRegistry>, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
        }
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Dispatch a batch of tool calls from one model turn.
    ///
    /// Processes calls sequentially: later calls may depend on earlier
    /// results, and results must be appended in call order.
    pub async fn dispatch_tool_calls(
        &self,
        tool_calls: &[ToolCall],
        offered: &[ToolDefinition],
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(tool_calls.len());
        for tc in tool_calls {
            outcomes.push(self.dispatch_single(tc, offered).await);
        }
        outcomes
    }

    /// Dispatch a single tool call: offer check → validate → execute.
    pub async fn dispatch_single(&self, tool_call: &ToolCall, offered: &[ToolDefinition]) -> DispatchOutcome {
        let start = Instant::now();

        match self.run(tool_call, offered).await {
            Ok(data) => {
                let elapsed = start.elapsed().as_millis() as u64;
                tracing::info!(tool = %tool_call.name, duration_ms = elapsed, "tool succeeded");
                DispatchOutcome {
                    call: tool_call.clone(),
                    result: ToolResult::ok(data),
                    error: None,
                    duration_ms: elapsed,
                }
            }
            Err(e) => {
                let elapsed = start.elapsed().as_millis() as u64;
                tracing::warn!(tool = %tool_call.name, kind = e.kind(), error = %e, "tool call failed");
                DispatchOutcome {
                    call: tool_call.clone(),
                    result: ToolResult::err(e.to_string()),
                    error: Some(e),
                    duration_ms: elapsed,
                }
            }
        }
    }

    async fn run(&self, tool_call: &ToolCall, offered: &[ToolDefinition]) -> Result<Value, AgentError> {
        let not_found = || AgentError::ToolNotFound {
            tool_name: tool_call.name.clone(),
        };

        // 1. Only tools advertised in this turn may run
        let def = offered
            .iter()
            .find(|d| d.name == tool_call.name)
            .ok_or_else(not_found)?;
        let tool = self.registry.get(&tool_call.name).ok_or_else(not_found)?;

        // 2. Validate
        validate_arguments(def, &tool_call.arguments).map_err(|reason| AgentError::ToolArgumentError {
            tool_name: tool_call.name.clone(),
            reason,
        })?;

        // 3. Execute
        let limit = tool.handle.timeout().unwrap_or(self.default_timeout);
        match tokio::time::timeout(limit, tool.handle.execute(tool_call.arguments.clone())).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => Err(AgentError::ToolExecutionError {
                tool_name: tool_call.name.clone(),
                reason: format!("{e:#}"),
            }),
            Err(_) => Err(AgentError::ToolExecutionError {
                tool_name: tool_call.name.clone(),
                reason: format!("timed out after {}ms", limit.as_millis()),
            }),
        }
    }
}

// ─── Schema Validation ──────────────────────────────────────────────────────

/// Check arguments against the subset of JSON Schema tools use: an object,
/// required fields present, declared property types respected.
pub fn validate_arguments(def: &ToolDefinition, arguments: &Value) -> Result<(), String> {
    let args = arguments
        .as_object()
        .ok_or_else(|| format!("arguments must be a JSON object, got {}", json_type_name(arguments)))?;

    for field in def.required_params() {
        if !args.contains_key(field) {
            return Err(format!("missing required field: '{field}'"));
        }
    }

    let Some(properties) = def.parameters.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in args {
        let Some(expected) = properties.get(key).and_then(|p| p.get("type")) else {
            continue;
        };
        let matches = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !matches {
            return Err(format!(
                "field '{key}' should be {expected}, got {}",
                json_type_name(value)
            ));
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
