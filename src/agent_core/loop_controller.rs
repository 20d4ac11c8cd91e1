//! Tool-Calling Loop Controller.
//!
//! A small state machine driven one step at a time:
//!
//! ```text
//! AwaitingModel ──tool calls──▶ ExecutingTools ──▶ AwaitingModel
//!       │
//!       ├──text──▶ Done
//!       └──cap / repeated error / chain exhausted──▶ Failed
//! ```
//!
//! Each provider call counts as one iteration. The loop only appends to the
//! conversation and always returns an outcome, even on failure.

use super::conversation::Conversation;
use super::errors::AgentError;
use super::tool_router::{DispatchOutcome, ToolRouter};
use super::types::ToolInvocation;
use crate::inference::config::AgentLoopConfig;
use crate::inference::fallback::FallbackChain;
use crate::inference::provider::truncate_utf8;
use crate::inference::types::{GenerationOptions, Message, ProviderReply, ToolDefinition};

/// Error signature for a reply with neither text nor tool calls.
pub const EMPTY_RESPONSE_SIGNATURE: &str = "empty_response";

/// Everything the loop produced for one request.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub conversation: Conversation,
    pub iterations: u32,
    pub tool_invocations: Vec<ToolInvocation>,
    /// The model's tool-free answer when the loop reached `Done`.
    pub final_text: Option<String>,
    /// Set when the loop ended in `Failed`.
    pub error: Option<AgentError>,
    /// Provider and model of the last successful chain call.
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl LoopOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn tools_executed(&self) -> bool {
        !self.tool_invocations.is_empty()
    }
}

enum Phase {
    AwaitingModel,
    ExecutingTools(ProviderReply),
    Done(String),
    Failed(AgentError),
}

/// Per-request mutable state. Dropped when the loop returns.
struct LoopState {
    iteration: u32,
    last_error: Option<String>,
    conversation: Conversation,
    invocations: Vec<ToolInvocation>,
    provider: Option<String>,
    model: Option<String>,
}

impl LoopState {
    /// Record this iteration's error signature (`None` for a clean
    /// iteration). Returns the abort error when it repeats the previous one.
    fn track_error(&mut self, signature: Option<String>) -> Option<AgentError> {
        let repeated = match (&signature, &self.last_error) {
            (Some(current), Some(previous)) => current == previous,
            _ => false,
        };
        if repeated {
            return signature.map(|signature| AgentError::RepeatedErrorAbort { signature });
        }
        self.last_error = signature;
        None
    }
}

pub struct LoopController<'a> {
    chain: &'a FallbackChain,
    tool_router: &'a ToolRouter,
    config: &'a AgentLoopConfig,
}

impl<'a> LoopController<'a> {
    pub fn new(chain: &'a FallbackChain, tool_router: &'a ToolRouter, config: &'a AgentLoopConfig) -> Self {
        Self {
            chain,
            tool_router,
            config,
        }
    }

    /// Drive the loop until the model answers or a budget runs out.
    pub async fn run(
        &self,
        conversation: Conversation,
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> LoopOutcome {
        let mut state = LoopState {
            iteration: 0,
            last_error: None,
            conversation,
            invocations: Vec::new(),
            provider: None,
            model: None,
        };
        let mut phase = Phase::AwaitingModel;

        loop {
            phase = match phase {
                Phase::AwaitingModel => self.await_model(&mut state, tools, options).await,
                Phase::ExecutingTools(reply) => self.execute_tools(&mut state, reply, tools).await,
                Phase::Done(text) => {
                    tracing::info!(iterations = state.iteration, "loop done");
                    state.conversation.push(Message::assistant(text.clone()));
                    return finish(state, Some(text), None);
                }
                Phase::Failed(error) => {
                    tracing::warn!(iterations = state.iteration, kind = error.kind(), error = %error, "loop failed");
                    return finish(state, None, Some(error));
                }
            };
        }
    }

    async fn await_model(
        &self,
        state: &mut LoopState,
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> Phase {
        if state.iteration >= self.config.max_iterations {
            return Phase::Failed(AgentError::LoopIterationExhausted {
                iterations: state.iteration,
            });
        }
        state.iteration += 1;
        tracing::debug!(iteration = state.iteration, "awaiting model");

        let response = match self
            .chain
            .call_with_fallback(state.conversation.messages(), tools, options)
            .await
        {
            Ok(r) => r,
            Err(source) => return Phase::Failed(AgentError::ProviderChainExhausted { source }),
        };
        state.provider = Some(response.provider.clone());
        state.model = Some(response.reply.model.clone());

        let reply = response.reply;
        if !reply.tool_calls.is_empty() {
            return Phase::ExecutingTools(reply);
        }
        if let Some(text) = reply.text_content() {
            return Phase::Done(text.to_string());
        }

        tracing::warn!(iteration = state.iteration, "empty response from model");
        match state.track_error(Some(EMPTY_RESPONSE_SIGNATURE.to_string())) {
            Some(abort) => Phase::Failed(abort),
            None => Phase::AwaitingModel,
        }
    }

    async fn execute_tools(&self, state: &mut LoopState, reply: ProviderReply, tools: &[ToolDefinition]) -> Phase {
        let outcomes = self
            .tool_router
            .dispatch_tool_calls(&reply.tool_calls, tools)
            .await;

        // One assistant turn plus one result per call, appended together.
        let mut step = Vec::with_capacity(outcomes.len() + 1);
        step.push(Message::assistant_with_tool_calls(
            reply.content.clone().unwrap_or_default(),
            reply.tool_calls.clone(),
        ));
        for outcome in &outcomes {
            let payload = self.truncate_tool_result(&outcome.result.payload_text(), &outcome.call.name);
            step.push(Message::tool_result(&outcome.call, payload));
        }
        state.conversation.append_step(step);

        let iteration = state.iteration;
        state
            .invocations
            .extend(outcomes.iter().map(|o| invocation(iteration, o)));

        match state.track_error(error_signature(&outcomes)) {
            Some(abort) => Phase::Failed(abort),
            None => Phase::AwaitingModel,
        }
    }

    /// Truncate a tool payload that exceeds `max_tool_result_chars`.
    ///
    /// Keeps the beginning of the result and appends a truncation notice.
    fn truncate_tool_result(&self, result: &str, tool_name: &str) -> String {
        let max = self.config.max_tool_result_chars;
        let total = result.chars().count();
        if total <= max {
            return result.to_string();
        }

        tracing::warn!(
            tool = %tool_name,
            original_chars = total,
            truncated_to = max,
            "tool result truncated"
        );
        format!(
            "{}\n\n[... truncated: showing first {max} of {total} chars]",
            truncate_utf8(result, max)
        )
    }
}

fn finish(state: LoopState, final_text: Option<String>, error: Option<AgentError>) -> LoopOutcome {
    LoopOutcome {
        conversation: state.conversation,
        iterations: state.iteration,
        tool_invocations: state.invocations,
        final_text,
        error,
        provider: state.provider,
        model: state.model,
    }
}

/// Combined signature of the failed calls of one iteration, `None` if all succeeded.
fn error_signature(outcomes: &[DispatchOutcome]) -> Option<String> {
    let parts: Vec<String> = outcomes
        .iter()
        .filter_map(|o| o.error.as_ref().map(AgentError::signature))
        .collect();
    (!parts.is_empty()).then(|| parts.join("|"))
}

fn invocation(iteration: u32, outcome: &DispatchOutcome) -> ToolInvocation {
    ToolInvocation {
        iteration,
        tool_call_id: outcome.call.id.clone(),
        name: outcome.call.name.clone(),
        arguments: outcome.call.arguments.clone(),
        success: outcome.result.success,
        error: outcome.result.error.clone(),
        duration_ms: outcome.duration_ms,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::agent_core::tool_registry::test_tools::registry;
    use crate::inference::errors::InferenceError;
    use crate::inference::mock::{MockProvider, MockStep};
    use crate::inference::types::{Role, ToolCall};
    use serde_json::json;

    struct Harness {
        chain: FallbackChain,
        router: ToolRouter,
        offered: Vec<ToolDefinition>,
        config: AgentLoopConfig,
    }

    impl Harness {
        fn new(provider: Arc<MockProvider>) -> Self {
            let reg = Arc::new(registry());
            let offered = reg.definitions();
            Self {
                chain: FallbackChain::new(vec![provider]),
                router: ToolRouter::new(reg, Duration::from_secs(2)),
                offered,
                config: AgentLoopConfig::default(),
            }
        }

        async fn run(&self) -> LoopOutcome {
            LoopController::new(&self.chain, &self.router, &self.config)
                .run(
                    Conversation::new("sys", "quelle heure est-il?"),
                    &self.offered,
                    &GenerationOptions::default(),
                )
                .await
        }
    }

    fn call(name: &str, args: serde_json::Value) -> ProviderReply {
        ProviderReply::tool_calls("m", vec![ToolCall::new(name, args)])
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let mock = Arc::new(
            MockProvider::new("p")
                .then(MockStep::Reply(call("get_time", json!({}))))
                .then(MockStep::Reply(ProviderReply::text("m", "Il est 14:05."))),
        );
        let outcome = Harness::new(mock.clone()).run().await;

        assert!(outcome.success());
        assert_eq!(outcome.final_text.as_deref(), Some("Il est 14:05."));
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_invocations.len(), 1);
        assert_eq!(outcome.provider.as_deref(), Some("p"));

        // The second call saw the tool result.
        let second = &mock.calls()[1];
        assert_eq!(second.messages.last().unwrap().role, Role::Tool);
        assert_eq!(second.messages.last().unwrap().content, "14:05");
    }

    #[tokio::test]
    async fn test_always_tool_call_exhausts_exactly_at_cap() {
        let mock = Arc::new(MockProvider::new("p").always(MockStep::Reply(call("get_time", json!({})))));
        let mut harness = Harness::new(mock.clone());
        harness.config.max_iterations = 4;
        let outcome = harness.run().await;

        assert!(!outcome.success());
        assert!(matches!(
            outcome.error,
            Some(AgentError::LoopIterationExhausted { iterations: 4 })
        ));
        assert_eq!(outcome.iterations, 4);
        assert_eq!(mock.call_count(), 4);
        assert_eq!(outcome.tool_invocations.len(), 4);
    }

    #[tokio::test]
    async fn test_one_result_per_call_in_order() {
        let calls = vec![
            ToolCall::new("echo", json!({"text": "a"})),
            ToolCall::new("broken", json!({})),
            ToolCall::new("echo", json!({"text": "c"})),
        ];
        let ids: Vec<String> = calls.iter().map(|c| c.id.clone()).collect();
        let mock = Arc::new(
            MockProvider::new("p")
                .then(MockStep::Reply(ProviderReply::tool_calls("m", calls)))
                .then(MockStep::Reply(ProviderReply::text("m", "fini"))),
        );
        let outcome = Harness::new(mock).run().await;

        let results: Vec<&Message> = outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(results.len(), 3);
        let result_ids: Vec<String> = results.iter().filter_map(|m| m.tool_call_id.clone()).collect();
        assert_eq!(result_ids, ids);
        assert_eq!(results[0].content, "a");
        assert!(results[1].content.contains("disk on fire"));
        assert_eq!(results[2].content, "c");
        assert!(outcome.success(), "tool errors are not fatal");
    }

    #[tokio::test]
    async fn test_same_error_twice_aborts() {
        let mock = Arc::new(MockProvider::new("p").always(MockStep::Reply(call("rm_rf", json!({})))));
        let outcome = Harness::new(mock.clone()).run().await;

        match outcome.error {
            Some(AgentError::RepeatedErrorAbort { signature }) => {
                assert!(signature.contains("ToolNotFound:rm_rf"))
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.call_count(), 2);
        // Both rounds were fully appended before the abort.
        assert_eq!(outcome.conversation.tool_result_count(), 2);
    }

    #[tokio::test]
    async fn test_different_errors_do_not_abort() {
        let mock = Arc::new(
            MockProvider::new("p")
                .then(MockStep::Reply(call("rm_rf", json!({}))))
                .then(MockStep::Reply(call("broken", json!({}))))
                .then(MockStep::Reply(ProviderReply::text("m", "désolé"))),
        );
        let outcome = Harness::new(mock).run().await;
        assert!(outcome.success());
        assert_eq!(outcome.iterations, 3);
    }

    #[tokio::test]
    async fn test_two_empty_replies_abort() {
        let mock = Arc::new(MockProvider::new("p").always(MockStep::Reply(ProviderReply::text("m", "  "))));
        let outcome = Harness::new(mock).run().await;
        match outcome.error {
            Some(AgentError::RepeatedErrorAbort { signature }) => assert_eq!(signature, EMPTY_RESPONSE_SIGNATURE),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn test_chain_exhaustion_is_fatal() {
        let mock = Arc::new(MockProvider::new("p").always(MockStep::Fail(InferenceError::ConnectionFailed {
            provider: "p".into(),
            endpoint: "http://localhost:1".into(),
            reason: "refused".into(),
        })));
        let outcome = Harness::new(mock).run().await;
        assert!(matches!(outcome.error, Some(AgentError::ProviderChainExhausted { .. })));
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.provider.is_none());
    }

    #[tokio::test]
    async fn test_long_tool_result_truncated() {
        let long = "x".repeat(50);
        let mock = Arc::new(
            MockProvider::new("p")
                .then(MockStep::Reply(call("echo", json!({"text": long}))))
                .then(MockStep::Reply(ProviderReply::text("m", "ok"))),
        );
        let mut harness = Harness::new(mock);
        harness.config.max_tool_result_chars = 10;
        let outcome = harness.run().await;
        let result = outcome.conversation.last_tool_result().unwrap();
        assert!(result.content.starts_with("xxxxxxxxxx\n\n"));
        assert!(result.content.contains("[... truncated: showing first 10 of 50 chars]"));
    }
}
