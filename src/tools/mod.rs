//! Built-in tools available to the CLI.
//!
//! Each tool implements [`Tool`](crate::agent_core::Tool) and declares its
//! capability group so the relevance filter does not have to guess.

pub mod files;
pub mod time;

use std::sync::Arc;

use crate::agent_core::{AgentError, ToolRegistry};

pub use files::{FileEntry, ListFilesTool, ReadFileTool};
pub use time::GetTimeTool;

/// Register every built-in tool, in catalog order.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), AgentError> {
    registry.register(Arc::new(GetTimeTool))?;
    registry.register(Arc::new(ListFilesTool))?;
    registry.register(Arc::new(ReadFileTool::default()))?;
    Ok(())
}

/// A registry holding only the built-in tools.
pub fn builtin_registry() -> Result<ToolRegistry, AgentError> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry)?;
    Ok(registry)
}
