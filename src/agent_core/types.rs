//! Shared types for the agent core.
//!
//! Classification decisions, tool results, and the inbound request/response
//! envelope used across the classifier, loop controller and router.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Classification ─────────────────────────────────────────────────────────

/// Task category picked by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Tools,
    Vision,
    Memory,
    Coding,
    Math,
    Creative,
    General,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Tools => "tools",
            TaskType::Vision => "vision",
            TaskType::Memory => "memory",
            TaskType::Coding => "coding",
            TaskType::Math => "math",
            TaskType::Creative => "creative",
            TaskType::General => "general",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lightweight flags accompanying a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub has_image: bool,
}

/// Result of classifying one message. Computed once per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationDecision {
    pub model: String,
    pub task_type: TaskType,
    pub reason: String,
    pub confidence: f32,
}

// ─── Tool Results ───────────────────────────────────────────────────────────

/// Outcome of executing one tool call.
///
/// Serialized as `{"success": true, "data": ...}` or
/// `{"success": false, "error": "..."}`, which is also the payload fed back to
/// the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Text fed back to the model and used as the degraded answer.
    ///
    /// String data is returned as-is; anything else is compact JSON.
    pub fn payload_text(&self) -> String {
        match (&self.data, &self.error) {
            (Some(serde_json::Value::String(s)), _) => s.clone(),
            (Some(data), _) => data.to_string(),
            (None, Some(error)) => serde_json::json!({ "error": error }).to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Record of one executed tool call, reported to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub iteration: u32,
    pub tool_call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

// ─── Request Envelope ───────────────────────────────────────────────────────

/// Inbound request from the UI/transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterRequest {
    pub message: String,
    pub session_id: String,
    #[serde(default)]
    pub context: RequestContext,
}

impl RouterRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            context: RequestContext::default(),
        }
    }

    pub fn with_image(mut self, has_image: bool) -> Self {
        self.context.has_image = has_image;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Response returned to the caller. Never an `Err`: failures are reported
/// with `success: false` and `error`, plus any partial answer in `response`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error kind (e.g. `LoopIterationExhausted`) when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// True when synthesis failed and `response` is the raw last tool result.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub task_type: TaskType,
    pub iterations: u32,
    pub tool_invocations: Vec<ToolInvocation>,
    pub session_id: String,
    /// RFC 3339 completion time.
    pub completed_at: String,
}
