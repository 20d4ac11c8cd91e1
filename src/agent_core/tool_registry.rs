//! Tool Registry.
//!
//! Holds the full catalog of invocable tools for the process lifetime. The
//! catalog is built at startup and read-only at request time, so it can be
//! shared across concurrent requests behind an `Arc` without locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::AgentError;
use crate::inference::types::ToolDefinition;

/// A named, schema-described capability.
///
/// The core never looks inside a tool: it validates arguments against
/// `parameters()` and awaits `execute`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters(&self) -> serde_json::Value;

    /// Capability groups. Empty means the relevance filter infers them.
    fn groups(&self) -> Vec<String> {
        Vec::new()
    }

    /// Per-tool timeout. `None` uses the loop default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Run the tool with validated arguments.
    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// One registered tool with its cached definition.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub handle: Arc<dyn Tool>,
}

/// Ordered tool catalog with name lookup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool { tool_name: name });
        }

        let definition = ToolDefinition::new(name.clone(), tool.description(), tool.parameters())
            .with_groups(tool.groups());

        tracing::debug!(tool = %name, groups = ?definition.groups, "tool registered");
        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            handle: tool,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).and_then(|&i| self.tools.get(i))
    }

    /// All definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_tools::*;
    use super::*;

    #[test]
    fn test_registration_order_preserved() {
        let reg = registry();
        let names: Vec<String> = reg.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["get_time", "echo", "broken", "slow"]);
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut reg = registry();
        let err = reg.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool { ref tool_name } if tool_name == "echo"));
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_groups_carried_into_definition() {
        let reg = registry();
        assert_eq!(reg.get("get_time").unwrap().definition.groups, vec!["time"]);
        assert!(reg.get("echo").unwrap().definition.groups.is_empty());
        assert!(reg.get("missing").is_none());
    }
}
