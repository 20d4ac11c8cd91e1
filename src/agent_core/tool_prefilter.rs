//! Relevance pre-filter for tool selection.
//!
//! Tools are tagged with capability groups (files, web, shell, memory, ...),
//! either explicitly or by matching group hints against the tool's name and
//! description. For each message the filter detects which groups the text
//! touches, using the same keyword style as the classifier, and offers only
//! the tools of those groups, capped at `max_tools`. When nothing matches, a
//! small default set is offered, never the full catalog.

use serde::Serialize;

use crate::inference::config::ToolFilterConfig;
use crate::inference::types::ToolDefinition;

/// Tools offered for one request.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredTools {
    /// Selected tools in catalog order.
    pub tools: Vec<ToolDefinition>,
    /// Groups that selected them, in config order.
    pub groups: Vec<String>,
    /// `true` when no group matched and the default groups were used.
    pub used_default: bool,
}

#[derive(Debug, Clone)]
struct ToolGroup {
    name: String,
    keywords: Vec<String>,
    tool_hints: Vec<String>,
}

/// Keyword-driven tool filter built once from `ToolFilterConfig`.
#[derive(Debug, Clone)]
pub struct ToolRelevanceFilter {
    groups: Vec<ToolGroup>,
    default_groups: Vec<String>,
    max_tools: usize,
}

fn lowered(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ToolRelevanceFilter {
    pub fn from_config(config: &ToolFilterConfig) -> Self {
        Self {
            groups: config
                .groups
                .iter()
                .map(|g| ToolGroup {
                    name: g.name.clone(),
                    keywords: lowered(&g.keywords),
                    tool_hints: lowered(&g.tool_hints),
                })
                .collect(),
            default_groups: config.default_groups.clone(),
            max_tools: config.max_tools.max(1),
        }
    }

    /// Groups a tool belongs to: its explicit tags, or the groups whose hints
    /// appear in its name or description.
    pub fn tool_groups(&self, def: &ToolDefinition) -> Vec<String> {
        if !def.groups.is_empty() {
            return def.groups.clone();
        }
        let name = def.name.to_lowercase();
        let description = def.description.to_lowercase();
        self.groups
            .iter()
            .filter(|g| {
                g.tool_hints
                    .iter()
                    .any(|h| name.contains(h.as_str()) || description.contains(h.as_str()))
            })
            .map(|g| g.name.clone())
            .collect()
    }

    /// Groups whose keywords appear in the message, in config order.
    pub fn detect_groups(&self, message: &str) -> Vec<String> {
        let text = message.to_lowercase();
        self.groups
            .iter()
            .filter(|g| g.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|g| g.name.clone())
            .collect()
    }

    /// Narrow the catalog to the tools relevant to `message`.
    pub fn relevant_tools(&self, all_tools: &[ToolDefinition], message: &str) -> FilteredTools {
        let detected = self.detect_groups(message);
        let used_default = detected.is_empty();
        let groups = if used_default {
            self.default_groups.clone()
        } else {
            detected
        };

        let tools: Vec<ToolDefinition> = all_tools
            .iter()
            .filter(|def| self.tool_groups(def).iter().any(|g| groups.contains(g)))
            .take(self.max_tools)
            .cloned()
            .collect();

        tracing::info!(
            groups = ?groups,
            used_default,
            selected = tools.len(),
            catalog = all_tools.len(),
            "tool pre-filter"
        );

        FilteredTools {
            tools,
            groups,
            used_default,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
