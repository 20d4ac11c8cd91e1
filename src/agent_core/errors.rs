//! Agent Core error types.
//!
//! Tool-level variants are recovered by the loop (they become tool-result
//! messages). Loop-level variants end the request with `success: false`.

use thiserror::Error;

use crate::inference::errors::InferenceError;

/// Errors that can occur during agent core operations.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// The model called a tool that was not offered in that turn.
    #[error("tool '{tool_name}' was not offered in this turn")]
    ToolNotFound { tool_name: String },

    /// The model's arguments do not satisfy the tool's schema.
    #[error("invalid arguments for '{tool_name}': {reason}")]
    ToolArgumentError { tool_name: String, reason: String },

    /// The tool ran and failed, or exceeded its timeout.
    #[error("tool '{tool_name}' failed: {reason}")]
    ToolExecutionError { tool_name: String, reason: String },

    /// The loop hit its iteration cap without a final answer.
    #[error("loop iteration cap reached after {iterations} iterations")]
    LoopIterationExhausted { iterations: u32 },

    /// The same error occurred in two consecutive iterations.
    #[error("aborted after repeated error: {signature}")]
    RepeatedErrorAbort { signature: String },

    /// Every provider in the chain failed for a loop step.
    #[error("provider chain exhausted: {source}")]
    ProviderChainExhausted {
        #[source]
        source: InferenceError,
    },

    /// The tool-free synthesis call failed.
    #[error("synthesis failed: {reason}")]
    SynthesisFailed { reason: String },

    /// A tool with this name is already registered.
    #[error("tool '{tool_name}' is already registered")]
    DuplicateTool { tool_name: String },

    /// A classification rule could not be compiled.
    #[error("invalid classifier rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },
}

impl AgentError {
    /// Stable error-kind name reported in the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ToolNotFound { .. } => "ToolNotFound",
            AgentError::ToolArgumentError { .. } => "ToolArgumentError",
            AgentError::ToolExecutionError { .. } => "ToolExecutionError",
            AgentError::LoopIterationExhausted { .. } => "LoopIterationExhausted",
            AgentError::RepeatedErrorAbort { .. } => "RepeatedErrorAbort",
            AgentError::ProviderChainExhausted { .. } => "ProviderChainExhausted",
            AgentError::SynthesisFailed { .. } => "SynthesisFailed",
            AgentError::DuplicateTool { .. } => "DuplicateTool",
            AgentError::InvalidRule { .. } => "InvalidRule",
        }
    }

    /// Signature used by the repeated-error guard.
    ///
    /// Two errors with the same signature are "the same error": same kind,
    /// same tool, same reason.
    pub fn signature(&self) -> String {
        match self {
            AgentError::ToolNotFound { tool_name } => format!("ToolNotFound:{tool_name}"),
            AgentError::ToolArgumentError { tool_name, reason }
            | AgentError::ToolExecutionError { tool_name, reason } => {
                format!("{}:{tool_name}:{reason}", self.kind())
            }
            other => format!("{}:{other}", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_distinguishes_tools() {
        let a = AgentError::ToolNotFound { tool_name: "a".into() };
        let b = AgentError::ToolNotFound { tool_name: "b".into() };
        assert_ne!(a.signature(), b.signature());
        assert_eq!(a.signature(), AgentError::ToolNotFound { tool_name: "a".into() }.signature());
    }

    #[test]
    fn test_chain_exhausted_keeps_source() {
        let err = AgentError::ProviderChainExhausted {
            source: InferenceError::AllProvidersFailed {
                attempted: vec!["ollama".into()],
                last_error: "HTTP 500".into(),
            },
        };
        assert_eq!(err.kind(), "ProviderChainExhausted");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("HTTP 500"));
    }
}
