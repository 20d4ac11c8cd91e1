//! Agent Core: orchestration layer for the Ana router.
//!
//! Submodules:
//! - `classifier`: Rule-based task classification and model choice
//! - `tool_registry`: Catalog of executable tools
//! - `tool_prefilter`: Keyword pre-filter for the tools offered per request
//! - `tool_router`: Validates and dispatches model tool calls
//! - `conversation`: Append-only message history for one request
//! - `loop_controller`: Bounded tool-calling state machine
//! - `synthesizer`: Final prose answer after tool use
//! - `router`: Request entry point tying the above together
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod classifier;
pub mod conversation;
pub mod errors;
pub mod loop_controller;
pub mod router;
pub mod synthesizer;
pub mod tool_prefilter;
pub mod tool_registry;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use classifier::TaskClassifier;
pub use conversation::Conversation;
pub use errors::AgentError;
pub use loop_controller::{LoopController, LoopOutcome};
pub use router::Router;
pub use synthesizer::{degraded_answer, Synthesis, Synthesizer};
pub use tool_prefilter::ToolRelevanceFilter;
pub use tool_registry::{Tool, ToolRegistry};
pub use tool_router::ToolRouter;
pub use types::{
    ClassificationDecision, RequestContext, RouterRequest, RouterResponse, TaskType,
    ToolInvocation, ToolResult,
};
