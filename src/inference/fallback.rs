//! Fallback Chain Executor.
//!
//! Tries each provider in configured order until one succeeds. Ordering is
//! static: providers are never re-ranked by latency or success rate.

use std::sync::Arc;

use super::errors::InferenceError;
use super::provider::Provider;
use super::types::{GenerationOptions, Message, ProviderReply, ToolDefinition};

/// A provider that failed during one chain call.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: InferenceError,
}

/// The single provider response used for a chain call.
#[derive(Debug, Clone)]
pub struct ChainResponse {
    /// Provider that produced `reply`.
    pub provider: String,
    pub reply: ProviderReply,
    /// Providers tried before `provider`, in order. Never surfaced as the
    /// top-level error.
    pub failed_attempts: Vec<ProviderFailure>,
}

/// Ordered list of providers shared read-only by all requests.
#[derive(Clone)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn Provider>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Call providers in order until one answers.
    ///
    /// Each attempt is bounded by the provider's timeout. Failed providers
    /// contribute nothing but an entry in `failed_attempts`. When every
    /// provider fails the result is `AllProvidersFailed` with the last error.
    pub async fn call_with_fallback(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> Result<ChainResponse, InferenceError> {
        let mut failed_attempts: Vec<ProviderFailure> = Vec::new();

        for provider in &self.providers {
            let name = provider.name().to_string();
            let limit = provider.timeout();
            tracing::info!(provider = %name, tools = tools.len(), "trying provider");

            let outcome = match tokio::time::timeout(limit, provider.complete(messages, tools, options)).await {
                Ok(result) => result,
                Err(_) => Err(InferenceError::ProviderTimeout {
                    provider: name.clone(),
                    duration_secs: limit.as_secs(),
                }),
            };

            match outcome {
                Ok(reply) => {
                    tracing::info!(
                        provider = %name,
                        model = %reply.model,
                        tool_calls = reply.tool_calls.len(),
                        failed_before = failed_attempts.len(),
                        "provider succeeded"
                    );
                    return Ok(ChainResponse {
                        provider: name,
                        reply,
                        failed_attempts,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        provider = %name,
                        timed_out = error.is_timeout(),
                        error = %error,
                        "provider failed, trying next"
                    );
                    failed_attempts.push(ProviderFailure {
                        provider: name,
                        error,
                    });
                }
            }
        }

        let last_error = failed_attempts
            .last()
            .map(|f| f.error.to_string())
            .unwrap_or_else(|| "no providers configured".to_string());
        tracing::warn!(attempted = failed_attempts.len(), last_error = %last_error, "fallback chain exhausted");

        Err(InferenceError::AllProvidersFailed {
            attempted: failed_attempts.into_iter().map(|f| f.provider).collect(),
            last_error,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
