//! Native Ollama Provider Client (`POST {endpoint}/api/chat`).
//!
//! Differences from the OpenAI format: sampling parameters live under
//! `options`, tool call arguments are JSON objects rather than strings, and
//! tool results are matched by `tool_name` instead of a call ID.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use super::config::{ProviderConfig, ToolResultRole};
use super::errors::InferenceError;
use super::openai::{tool_calls_as_text, tool_result_as_user_text};
use super::provider::{http_client, map_send_error, read_success_body, resolve_model, Provider};
use super::tool_call_parser::{native_call, parse_text_tool_call};
use super::types::{GenerationOptions, Message, ProviderReply, Role, ToolDefinition, WireTool};

/// Context window requested from the server.
const NUM_CTX: u32 = 4096;

pub struct OllamaProvider {
    http: HttpClient,
    config: ProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, InferenceError> {
        Ok(Self {
            http: http_client(&config)?,
            config,
        })
    }

    fn url(&self) -> String {
        format!("{}/api/chat", self.config.endpoint.trim_end_matches('/'))
    }
}

// ─── Wire Types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

fn to_ollama_messages(messages: &[Message], tool_role: ToolResultRole) -> Vec<OllamaMessage> {
    messages
        .iter()
        .map(|msg| {
            let plain = |role: Role, content: String| OllamaMessage {
                role,
                content,
                tool_calls: Vec::new(),
                tool_name: None,
            };
            match (msg.role, tool_role) {
                (Role::Tool, ToolResultRole::Tool) => OllamaMessage {
                    role: Role::Tool,
                    content: msg.content.clone(),
                    tool_calls: Vec::new(),
                    tool_name: msg.name.clone(),
                },
                (Role::Tool, ToolResultRole::User) => plain(Role::User, tool_result_as_user_text(msg)),
                (Role::Assistant, ToolResultRole::Tool) if !msg.tool_calls.is_empty() => OllamaMessage {
                    role: Role::Assistant,
                    content: msg.content.clone(),
                    tool_calls: msg
                        .tool_calls
                        .iter()
                        .map(|c| OllamaToolCall {
                            function: OllamaFunction {
                                name: c.name.clone(),
                                arguments: c.arguments.clone(),
                            },
                        })
                        .collect(),
                    tool_name: None,
                },
                (Role::Assistant, ToolResultRole::User) if !msg.tool_calls.is_empty() => {
                    plain(Role::Assistant, tool_calls_as_text(msg))
                }
                (role, _) => plain(role, msg.content.clone()),
            }
        })
        .collect()
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> Result<ProviderReply, InferenceError> {
        let url = self.url();
        let model = resolve_model(&self.config, options);

        let body = OllamaChatRequest {
            model: model.clone(),
            messages: to_ollama_messages(messages, self.config.tool_result_role),
            tools: tools.iter().map(WireTool::from).collect(),
            options: OllamaOptions {
                temperature: options.temperature.unwrap_or(self.config.temperature),
                num_predict: options.max_tokens.unwrap_or(self.config.max_tokens),
                num_ctx: NUM_CTX,
            },
            stream: false,
        };

        tracing::debug!(
            provider = %self.config.name,
            model = %model,
            messages = messages.len(),
            tools = tools.len(),
            "sending ollama chat"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(&self.config, &url, e))?;
        let body_text = read_success_body(&self.config, &url, response).await?;

        parse_ollama_chat(&self.config.name, &body_text, tools, &model)
    }
}

/// Parse a non-streaming `/api/chat` body.
pub fn parse_ollama_chat(
    provider: &str,
    body: &str,
    offered: &[ToolDefinition],
    sent_model: &str,
) -> Result<ProviderReply, InferenceError> {
    #[derive(Deserialize)]
    struct ChatResponse {
        #[serde(default)]
        model: Option<String>,
        message: Option<ChatMessage>,
        #[serde(default)]
        error: Option<String>,
    }

    #[derive(Deserialize)]
    struct ChatMessage {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        tool_calls: Vec<OllamaToolCall>,
    }

    let malformed = |reason: String| InferenceError::MalformedResponse {
        provider: provider.to_string(),
        reason,
    };

    let resp: ChatResponse = serde_json::from_str(body)
        .map_err(|e| malformed(format!("failed to parse ollama chat response: {e}")))?;

    if let Some(error) = resp.error {
        return Err(malformed(error));
    }
    let message = resp
        .message
        .ok_or_else(|| malformed("response has no message".into()))?;

    let content = message.content.filter(|c| !c.trim().is_empty());

    let mut tool_calls = Vec::new();
    for tc in message.tool_calls {
        let arguments = match tc.function.arguments {
            serde_json::Value::Null => serde_json::json!({}),
            // Some models still double-encode arguments.
            serde_json::Value::String(s) => {
                serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
            }
            other => other,
        };
        let raw = arguments.to_string();
        let call = native_call(None, &tc.function.name, arguments, &raw)
            .map_err(|e| malformed(e.to_string()))?;
        tool_calls.push(call);
    }

    if tool_calls.is_empty() {
        if let Some(call) = content.as_deref().and_then(|text| parse_text_tool_call(text, offered)) {
            tool_calls.push(call);
        }
    }

    Ok(ProviderReply {
        content,
        tool_calls,
        model: resp.model.unwrap_or_else(|| sent_model.to_string()),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
