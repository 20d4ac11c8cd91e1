//! OpenAI-compatible Provider Client.
//!
//! Speaks `POST {endpoint}/chat/completions`, which covers the cloud APIs
//! (Groq, Cerebras) and llama.cpp / vLLM style local servers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::config::{ProviderConfig, ToolResultRole};
use super::errors::InferenceError;
use super::provider::{http_client, map_send_error, read_success_body, resolve_model, Provider};
use super::tool_call_parser::{parse_native_tool_call, parse_text_tool_call};
use super::types::{
    ChatCompletionRequest, GenerationOptions, Message, ProviderReply, Role, ToolCallResponse,
    ToolDefinition, WireMessage, WireTool,
};

pub struct OpenAiProvider {
    http: HttpClient,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, InferenceError> {
        Ok(Self {
            http: http_client(&config)?,
            config,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
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

        let wire_tools: Option<Vec<WireTool>> =
            (!tools.is_empty()).then(|| tools.iter().map(WireTool::from).collect());

        let body = ChatCompletionRequest {
            model: model.clone(),
            messages: to_wire_messages(messages, self.config.tool_result_role),
            tool_choice: wire_tools.as_ref().map(|_| "auto".to_string()),
            tools: wire_tools,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            stream: false,
        };

        tracing::debug!(
            provider = %self.config.name,
            model = %model,
            messages = messages.len(),
            tools = tools.len(),
            "sending chat completion"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = self.config.api_key() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(&self.config, &url, e))?;
        let body_text = read_success_body(&self.config, &url, response).await?;

        parse_chat_completion(&self.config.name, &body_text, tools, &model)
    }
}

// ─── Request Translation ─────────────────────────────────────────────────────

/// Translate the canonical conversation into OpenAI wire messages.
///
/// With `ToolResultRole::User`, tool results become user turns with a header
/// and assistant tool calls are rendered into the assistant text, so the
/// provider never sees `tool` roles or dangling `tool_calls`.
pub fn to_wire_messages(messages: &[Message], tool_role: ToolResultRole) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|msg| match (msg.role, tool_role) {
            (Role::Tool, ToolResultRole::Tool) => WireMessage {
                role: Role::Tool,
                content: msg.content.clone(),
                tool_call_id: msg.tool_call_id.clone(),
                tool_calls: None,
            },
            (Role::Tool, ToolResultRole::User) => WireMessage {
                role: Role::User,
                content: tool_result_as_user_text(msg),
                tool_call_id: None,
                tool_calls: None,
            },
            (Role::Assistant, ToolResultRole::Tool) if !msg.tool_calls.is_empty() => WireMessage {
                role: Role::Assistant,
                content: msg.content.clone(),
                tool_call_id: None,
                tool_calls: Some(msg.tool_calls.iter().map(ToolCallResponse::from).collect()),
            },
            (Role::Assistant, ToolResultRole::User) if !msg.tool_calls.is_empty() => WireMessage {
                role: Role::Assistant,
                content: tool_calls_as_text(msg),
                tool_call_id: None,
                tool_calls: None,
            },
            (role, _) => WireMessage {
                role,
                content: msg.content.clone(),
                tool_call_id: None,
                tool_calls: None,
            },
        })
        .collect()
}

/// `[Tool result: name]` header followed by the payload.
pub(crate) fn tool_result_as_user_text(msg: &Message) -> String {
    let name = msg.name.as_deref().unwrap_or("tool");
    format!("[Tool result: {name}]\n{}", msg.content)
}

/// Assistant text followed by one `[Tool call: name args]` line per call.
pub(crate) fn tool_calls_as_text(msg: &Message) -> String {
    let mut text = msg.content.clone();
    for call in &msg.tool_calls {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("[Tool call: {} {}]", call.name, call.arguments));
    }
    text
}

// ─── Response Parsing ────────────────────────────────────────────────────────

/// Parse a non-streaming chat completion body.
///
/// `offered` enables recovery of tool calls written into the text content;
/// `sent_model` is reported when the body carries no model field.
pub fn parse_chat_completion(
    provider: &str,
    body: &str,
    offered: &[ToolDefinition],
    sent_model: &str,
) -> Result<ProviderReply, InferenceError> {
    #[derive(Deserialize)]
    struct CompletionResponse {
        #[serde(default)]
        model: Option<String>,
        choices: Vec<CompletionChoice>,
    }

    #[derive(Deserialize)]
    struct CompletionChoice {
        message: CompletionMessage,
    }

    #[derive(Deserialize)]
    struct CompletionMessage {
        content: Option<String>,
        tool_calls: Option<Vec<CompletionToolCall>>,
    }

    #[derive(Deserialize)]
    struct CompletionToolCall {
        id: Option<String>,
        function: CompletionFunction,
    }

    #[derive(Deserialize)]
    struct CompletionFunction {
        name: String,
        #[serde(default)]
        arguments: String,
    }

    let malformed = |reason: String| InferenceError::MalformedResponse {
        provider: provider.to_string(),
        reason,
    };

    let resp: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| malformed(format!("failed to parse chat completion: {e}")))?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| malformed("empty choices array".into()))?;

    let content = choice.message.content.filter(|c| !c.trim().is_empty());

    let mut tool_calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        let call = parse_native_tool_call(tc.id.as_deref(), &tc.function.name, &tc.function.arguments)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::ToolCall;
    use serde_json::json;

    fn conversation() -> Vec<Message> {
        let call = ToolCall {
            id: "call_1".into(),
            name: "get_time".into(),
            arguments: json!({}),
        };
        vec![
            Message::system("sys"),
            Message::user("quelle heure est-il?"),
            Message::assistant_with_tool_calls("", vec![call.clone()]),
            Message::tool_result(&call, "14:05"),
        ]
    }

    #[test]
    fn test_wire_messages_with_tool_role() {
        let wire = to_wire_messages(&conversation(), ToolResultRole::Tool);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[2].role, Role::Assistant);
        assert_eq!(wire[2].tool_calls.as_ref().map(Vec::len), Some(1));
        assert_eq!(wire[3].role, Role::Tool);
        assert_eq!(wire[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_wire_messages_with_user_role_quirk() {
        let wire = to_wire_messages(&conversation(), ToolResultRole::User);
        assert!(wire.iter().all(|m| m.role != Role::Tool));
        assert!(wire[2].tool_calls.is_none());
        assert_eq!(wire[2].content, "[Tool call: get_time {}]");
        assert_eq!(wire[3].role, Role::User);
        assert_eq!(wire[3].content, "[Tool result: get_time]\n14:05");
    }

    #[test]
    fn test_wire_content_never_null() {
        let wire = to_wire_messages(&conversation(), ToolResultRole::Tool);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json[2]["content"], json!(""));
    }

    #[test]
    fn test_parse_text_reply() {
        let body = json!({
            "model": "llama-3.3-70b-versatile",
            "choices": [{"message": {"role": "assistant", "content": "Bonjour!"}, "finish_reason": "stop"}]
        })
        .to_string();
        let reply = parse_chat_completion("groq", &body, &[], "sent").unwrap();
        assert_eq!(reply.content.as_deref(), Some("Bonjour!"));
        assert!(reply.tool_calls.is_empty());
        assert_eq!(reply.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_parse_native_tool_calls_in_order() {
        let body = json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [
                    {"id": "a", "type": "function", "function": {"name": "get_time", "arguments": "{}"}},
                    {"id": "b", "type": "function", "function": {
                        "name": "read_file",
                        "arguments": "{\"path\":\"/tmp/x\"}"
                    }}
                ]
            }}]
        })
        .to_string();
        let reply = parse_chat_completion("groq", &body, &[], "sent-model").unwrap();
        assert!(reply.content.is_none());
        let names: Vec<&str> = reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["get_time", "read_file"]);
        assert_eq!(reply.tool_calls[1].arguments, json!({"path": "/tmp/x"}));
        assert_eq!(reply.model, "sent-model");
    }

    #[test]
    fn test_parse_recovers_text_embedded_call() {
        let offered = vec![ToolDefinition::new("get_time", "time", json!({"type": "object"}))];
        let body = json!({
            "choices": [{"message": {"content": "{\"name\": \"get_time\", \"arguments\": {}}"}}]
        })
        .to_string();
        let reply = parse_chat_completion("local", &body, &offered, "m").unwrap();
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "get_time");
    }

    #[test]
    fn test_parse_empty_choices_is_malformed() {
        let err = parse_chat_completion("groq", r#"{"choices": []}"#, &[], "m").unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { ref provider, .. } if provider == "groq"));
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let err = parse_chat_completion("groq", "<html>502</html>", &[], "m").unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }
}
