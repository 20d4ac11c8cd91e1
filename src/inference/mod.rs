//! Inference layer: Provider Clients and the Fallback Chain Executor.
//!
//! This module handles all communication with LLM backends:
//! - Provider trait with OpenAI-compatible and native Ollama adapters
//! - Tool call parsing (native calls + calls written into text content)
//! - Ordered fallback across the provider chain with per-provider timeouts
//! - Router configuration loading from `ana-router.yaml`
//!
//! Providers are interchangeable via config: adding a cloud API or a local
//! server is a config change, not a code change.

pub mod config;
pub mod errors;
pub mod fallback;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use config::{ProviderConfig, RouterConfig};
pub use errors::InferenceError;
pub use fallback::{ChainResponse, FallbackChain, ProviderFailure};
pub use provider::{build_chain, build_provider, Provider};
pub use types::{GenerationOptions, Message, ProviderReply, Role, ToolCall, ToolDefinition};
