//! Response Synthesizer.
//!
//! After tools have run, one more chain call is made with an empty tool set
//! so the model has to answer in prose. If that call fails, the last successful
//! tool result is returned as a degraded answer instead of an empty one.

use super::conversation::Conversation;
use super::errors::AgentError;
use super::types::ToolInvocation;
use crate::inference::fallback::FallbackChain;
use crate::inference::types::{GenerationOptions, Message, Role};

/// A successful synthesis.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub text: String,
    pub provider: String,
    pub model: String,
}

pub struct Synthesizer<'a> {
    chain: &'a FallbackChain,
    instruction: &'a str,
}

impl<'a> Synthesizer<'a> {
    pub fn new(chain: &'a FallbackChain, instruction: &'a str) -> Self {
        Self { chain, instruction }
    }

    /// Produce the final prose answer from the conversation up to its last
    /// tool result. Never offers tools.
    pub async fn synthesize(
        &self,
        conversation: &Conversation,
        options: &GenerationOptions,
    ) -> Result<Synthesis, AgentError> {
        let mut messages = conversation.through_last_tool_result().to_vec();
        if !self.instruction.trim().is_empty() {
            messages.push(Message::user(self.instruction));
        }

        let response = self
            .chain
            .call_with_fallback(&messages, &[], options)
            .await
            .map_err(|e| AgentError::SynthesisFailed {
                reason: e.to_string(),
            })?;

        let text = response
            .reply
            .text_content()
            .ok_or_else(|| AgentError::SynthesisFailed {
                reason: format!("provider '{}' returned no text", response.provider),
            })?
            .to_string();

        tracing::info!(provider = %response.provider, chars = text.len(), "synthesis complete");
        Ok(Synthesis {
            text,
            model: response.reply.model.clone(),
            provider: response.provider,
        })
    }
}

/// Answer used when synthesis fails: the last successful tool-result payload,
/// or the last tool result of any kind when every call failed.
pub fn degraded_answer(conversation: &Conversation, invocations: &[ToolInvocation]) -> Option<String> {
    let succeeded = |id: &str| invocations.iter().any(|i| i.success && i.tool_call_id == id);

    conversation
        .messages()
        .iter()
        .rev()
        .filter(|m| m.role == Role::Tool)
        .find(|m| m.tool_call_id.as_deref().is_some_and(succeeded))
        .or_else(|| conversation.last_tool_result())
        .map(|m| m.content.clone())
        .filter(|c| !c.trim().is_empty())
}
