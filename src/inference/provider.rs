//! Provider Client abstraction.
//!
//! A `Provider` is one LLM backend in the fallback chain. Each implementation
//! owns its wire format: the core loop only ever sees canonical `Message`,
//! `ToolDefinition` and `ProviderReply` values.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::{ProviderConfig, WireProtocol};
use super::errors::InferenceError;
use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::types::{GenerationOptions, Message, ProviderReply, ToolDefinition};

/// TCP connection timeout.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Max characters of an error body kept in `HttpError`.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// A single chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in logs and in the response envelope.
    fn name(&self) -> &str;

    /// Upper bound for one `complete` call. Enforced by the fallback chain.
    fn timeout(&self) -> Duration;

    /// Send the conversation and optional tools; return text and/or tool calls.
    ///
    /// An empty `tools` slice means the request is sent without any tool schema.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> Result<ProviderReply, InferenceError>;
}

/// Build the provider for one chain entry.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>, InferenceError> {
    let provider: Arc<dyn Provider> = match config.protocol {
        WireProtocol::Openai => Arc::new(OpenAiProvider::new(config.clone())?),
        WireProtocol::Ollama => Arc::new(OllamaProvider::new(config.clone())?),
    };
    Ok(provider)
}

/// Build every provider of the chain, preserving order.
pub fn build_chain(configs: &[ProviderConfig]) -> Result<Vec<Arc<dyn Provider>>, InferenceError> {
    configs.iter().map(build_provider).collect()
}

// ─── Shared HTTP Helpers ─────────────────────────────────────────────────────

/// HTTP client with a short connect timeout and the provider's request timeout.
pub(crate) fn http_client(config: &ProviderConfig) -> Result<HttpClient, InferenceError> {
    HttpClient::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| InferenceError::ConfigError {
            reason: format!("[{}] failed to build HTTP client: {e}", config.name),
        })
}

/// Model to send: the classifier's hint when the provider serves it,
/// otherwise the configured model.
pub(crate) fn resolve_model(config: &ProviderConfig, options: &GenerationOptions) -> String {
    match options.model_hint.as_deref() {
        Some(hint) if config.serves_hint(hint) => hint.to_string(),
        _ => config.model_id.clone(),
    }
}

/// Map a transport-level `reqwest` failure to an `InferenceError`.
pub(crate) fn map_send_error(config: &ProviderConfig, url: &str, err: reqwest::Error) -> InferenceError {
    if err.is_timeout() {
        InferenceError::ProviderTimeout {
            provider: config.name.clone(),
            duration_secs: config.timeout_secs,
        }
    } else {
        InferenceError::ConnectionFailed {
            provider: config.name.clone(),
            endpoint: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Turn a non-2xx response into `HttpError`, or return the body text.
pub(crate) async fn read_success_body(
    config: &ProviderConfig,
    url: &str,
    response: reqwest::Response,
) -> Result<String, InferenceError> {
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(InferenceError::HttpError {
            provider: config.name.clone(),
            status: status.as_u16(),
            body: truncate_utf8(&body_text, MAX_ERROR_BODY_CHARS).to_string(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| map_send_error(config, url, e))
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_utf8(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
