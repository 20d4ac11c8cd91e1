//! Request entry point.
//!
//! Wires the pipeline for one user message:
//! classification → (tools only) relevance filter → loop → synthesis.
//!
//! The `Router` is immutable after construction and can be shared across
//! concurrent requests; each request owns its conversation and loop state.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use super::classifier::TaskClassifier;
use super::conversation::Conversation;
use super::errors::AgentError;
use super::loop_controller::{LoopController, LoopOutcome};
use super::synthesizer::{degraded_answer, Synthesizer};
use super::tool_prefilter::ToolRelevanceFilter;
use super::tool_registry::ToolRegistry;
use super::tool_router::ToolRouter;
use super::types::{ClassificationDecision, RequestContext, RouterRequest, RouterResponse, TaskType};
use crate::inference::config::RouterConfig;
use crate::inference::fallback::FallbackChain;
use crate::inference::types::GenerationOptions;

/// Error kind reported when a single-shot reply carries no text.
const EMPTY_RESPONSE_KIND: &str = "EmptyResponse";

pub struct Router {
    config: RouterConfig,
    classifier: TaskClassifier,
    tool_filter: ToolRelevanceFilter,
    registry: Arc<ToolRegistry>,
    tool_router: ToolRouter,
    chain: FallbackChain,
}

/// Intermediate result before it is stamped into a `RouterResponse`.
struct Answer {
    response: Option<String>,
    error: Option<(String, String)>,
    degraded: bool,
    provider: Option<String>,
    model: Option<String>,
    iterations: u32,
    loop_outcome: Option<LoopOutcome>,
}

impl Router {
    pub fn new(config: RouterConfig, chain: FallbackChain, registry: ToolRegistry) -> Result<Self, AgentError> {
        let classifier = TaskClassifier::from_config(&config.classifier)?;
        let tool_filter = ToolRelevanceFilter::from_config(&config.tool_filter);
        let registry = Arc::new(registry);
        let tool_router = ToolRouter::new(
            Arc::clone(&registry),
            Duration::from_secs(config.agent_loop.default_tool_timeout_secs),
        );

        tracing::info!(
            providers = ?chain.provider_names(),
            tools = registry.len(),
            "router ready"
        );

        Ok(Self {
            config,
            classifier,
            tool_filter,
            registry,
            tool_router,
            chain,
        })
    }

    pub fn classify(&self, message: &str, context: &RequestContext) -> ClassificationDecision {
        self.classifier.classify(message, context)
    }

    /// Handle one inbound request. Never fails: errors are reported in the
    /// response with `success: false`.
    pub async fn handle(&self, request: RouterRequest) -> RouterResponse {
        let span = tracing::info_span!("request", session_id = %request.session_id);
        self.handle_inner(request).instrument(span).await
    }

    async fn handle_inner(&self, request: RouterRequest) -> RouterResponse {
        let decision = self.classify(&request.message, &request.context);
        tracing::info!(
            task_type = %decision.task_type,
            model = %decision.model,
            confidence = decision.confidence,
            reason = %decision.reason,
            "request classified"
        );

        let options = GenerationOptions {
            model_hint: Some(decision.model.clone()),
            ..Default::default()
        };
        let conversation = Conversation::new(&self.config.system_prompt, &request.message);

        let answer = if decision.task_type == TaskType::Tools {
            self.run_tools(&request.message, conversation, &options).await
        } else {
            self.run_single(conversation, &options).await
        };

        let success = answer.error.is_none();
        let (error_kind, error) = match answer.error {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };
        tracing::info!(
            success,
            iterations = answer.iterations,
            degraded = answer.degraded,
            provider = answer.provider.as_deref().unwrap_or("-"),
            "request finished"
        );

        RouterResponse {
            success,
            response: answer.response,
            error,
            error_kind,
            degraded: answer.degraded,
            model: answer.model,
            provider: answer.provider,
            task_type: decision.task_type,
            iterations: answer.iterations,
            tool_invocations: answer
                .loop_outcome
                .map(|o| o.tool_invocations)
                .unwrap_or_default(),
            session_id: request.session_id,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Non-tool tasks: exactly one chain call, no tools, text returned unchanged.
    async fn run_single(&self, conversation: Conversation, options: &GenerationOptions) -> Answer {
        let mut answer = Answer {
            response: None,
            error: None,
            degraded: false,
            provider: None,
            model: None,
            iterations: 1,
            loop_outcome: None,
        };

        match self
            .chain
            .call_with_fallback(conversation.messages(), &[], options)
            .await
        {
            Ok(resp) => {
                answer.provider = Some(resp.provider.clone());
                answer.model = Some(resp.reply.model.clone());
                if resp.reply.text_content().is_some() {
                    answer.response = resp.reply.content;
                } else {
                    answer.error = Some((
                        EMPTY_RESPONSE_KIND.to_string(),
                        format!("provider '{}' returned an empty response", resp.provider),
                    ));
                }
            }
            Err(source) => {
                let err = AgentError::ProviderChainExhausted { source };
                answer.error = Some((err.kind().to_string(), err.to_string()));
            }
        }
        answer
    }

    /// Tool tasks: filter, loop, then synthesize when any tool ran.
    async fn run_tools(&self, message: &str, conversation: Conversation, options: &GenerationOptions) -> Answer {
        let filtered = self
            .tool_filter
            .relevant_tools(&self.registry.definitions(), message);

        let outcome = LoopController::new(&self.chain, &self.tool_router, &self.config.agent_loop)
            .run(conversation, &filtered.tools, options)
            .await;

        let mut answer = Answer {
            response: outcome.final_text.clone(),
            error: outcome
                .error
                .as_ref()
                .map(|e| (e.kind().to_string(), e.to_string())),
            degraded: false,
            provider: outcome.provider.clone(),
            model: outcome.model.clone(),
            iterations: outcome.iterations,
            loop_outcome: None,
        };

        if outcome.tools_executed() {
            if self.bypass_synthesis(&outcome) {
                tracing::info!("model answer long enough, synthesis skipped");
            } else {
                let synthesizer = Synthesizer::new(&self.chain, &self.config.synthesis_instruction);
                match synthesizer.synthesize(&outcome.conversation, options).await {
                    Ok(s) => {
                        answer.response = Some(s.text);
                        answer.provider = Some(s.provider);
                        answer.model = Some(s.model);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "synthesis failed, returning last tool result");
                        answer.response = degraded_answer(&outcome.conversation, &outcome.tool_invocations);
                        answer.degraded = true;
                    }
                }
            }
        }

        answer.loop_outcome = Some(outcome);
        answer
    }

    fn bypass_synthesis(&self, outcome: &LoopOutcome) -> bool {
        match (self.config.agent_loop.synthesis_bypass_min_chars, &outcome.final_text) {
            (Some(min), Some(text)) => text.chars().count() >= min,
            _ => false,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
