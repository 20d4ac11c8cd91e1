//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to a provider or walking the chain.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the provider endpoint failed.
    #[error("[{provider}] connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        provider: String,
        endpoint: String,
        reason: String,
    },

    /// The provider did not respond within its configured timeout.
    #[error("[{provider}] provider timeout after {duration_secs}s")]
    ProviderTimeout {
        provider: String,
        duration_secs: u64,
    },

    /// Non-2xx HTTP response from the provider endpoint.
    #[error("[{provider}] HTTP {status}: {body}")]
    HttpError {
        provider: String,
        status: u16,
        body: String,
    },

    /// The provider answered 2xx but the body could not be understood.
    #[error("[{provider}] malformed response: {reason}")]
    MalformedResponse { provider: String, reason: String },

    /// Failed to parse a tool call from the provider's response.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError { raw_response: String, reason: String },

    /// Every provider in the fallback chain failed.
    #[error("all providers failed (tried: {}); last error: {last_error}", attempted.join(", "))]
    AllProvidersFailed {
        attempted: Vec<String>,
        last_error: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether the provider ran out of time (as opposed to failing outright).
    pub fn is_timeout(&self) -> bool {
        matches!(self, InferenceError::ProviderTimeout { .. })
    }
}
