//! Router configuration loading and validation.
//!
//! Reads `ana-router.yaml` and resolves environment variables. The config is
//! the single source of truth for the provider chain, classification rules,
//! tool groups, and loop budgets. It is loaded once at startup and shared
//! read-only by every request.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;
use crate::agent_core::types::TaskType;

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "ana-router.yaml";

/// Env var pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "ANA_ROUTER_CONFIG";

// ─── Provider Chain ──────────────────────────────────────────────────────────

/// Where a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Local,
    Cloud,
}

/// Which wire protocol the provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProtocol {
    /// OpenAI Chat Completions (`POST {endpoint}/chat/completions`).
    #[default]
    Openai,
    /// Native Ollama chat (`POST {endpoint}/api/chat`).
    Ollama,
}

/// Role used on the wire for tool results.
///
/// Some fine-tuned local models ignore `tool` messages entirely; for those the
/// result is sent as a `user` message with a short header instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultRole {
    #[default]
    Tool,
    User,
}

/// One entry of the fallback chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub model_id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub protocol: WireProtocol,
    pub endpoint: String,
    /// Bearer token. Empty strings (unset `${VAR}`) are treated as absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub tool_result_role: ToolResultRole,
    /// When `true`, the classifier's preferred model replaces `model_id`.
    #[serde(default)]
    pub accepts_model_hint: bool,
    /// Models the server actually hosts. A hint outside this list is ignored.
    /// Empty means every hint is accepted.
    #[serde(default)]
    pub hint_models: Vec<String>,
}

impl ProviderConfig {
    /// API key with blank values filtered out.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Whether a classifier hint may replace `model_id` for this provider.
    pub fn serves_hint(&self, hint: &str) -> bool {
        self.accepts_model_hint
            && !hint.trim().is_empty()
            && (self.hint_models.is_empty() || self.hint_models.iter().any(|m| m == hint))
    }
}

fn default_provider_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}

// ─── Classification Rules ────────────────────────────────────────────────────

/// One ordered rule group.
///
/// A group matches when its image requirement (if any) is satisfied and at
/// least one keyword or regex matches. A group with `requires_image` and no
/// patterns matches on the image flag alone.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleGroupConfig {
    pub task_type: TaskType,
    pub model: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_rule_confidence")]
    pub confidence: f32,
    /// Case-insensitive substrings.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regular expressions, matched against the original message.
    #[serde(default)]
    pub regexes: Vec<String>,
    #[serde(default)]
    pub requires_image: bool,
}

fn default_rule_confidence() -> f32 {
    0.9
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Model picked when no group matches.
    pub default_model: String,
    #[serde(default = "default_fallback_confidence")]
    pub default_confidence: f32,
    /// Evaluated in order; the first match wins.
    #[serde(default)]
    pub rules: Vec<RuleGroupConfig>,
}

fn default_fallback_confidence() -> f32 {
    0.5
}

// ─── Tool Filter ─────────────────────────────────────────────────────────────

/// A capability group of tools.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolGroupConfig {
    pub name: String,
    /// Message keywords that select this group.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Substrings of tool names/descriptions that place an untagged tool in
    /// this group.
    #[serde(default)]
    pub tool_hints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolFilterConfig {
    #[serde(default)]
    pub groups: Vec<ToolGroupConfig>,
    /// Groups offered when the message matches none.
    #[serde(default = "default_tool_groups")]
    pub default_groups: Vec<String>,
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,
}

fn default_tool_groups() -> Vec<String> {
    vec!["memory".into(), "files".into()]
}
fn default_max_tools() -> usize {
    10
}

// ─── Agent Loop ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AgentLoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Tool payloads longer than this are truncated before reaching the model.
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
    /// When set, a tool-free answer of at least this many characters after
    /// tool use is returned as-is and synthesis is skipped.
    #[serde(default)]
    pub synthesis_bypass_min_chars: Option<usize>,
    #[serde(default = "default_tool_timeout")]
    pub default_tool_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_tool_result_chars() -> usize {
    6_000
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tool_result_chars: default_max_tool_result_chars(),
            synthesis_bypass_min_chars: None,
            default_tool_timeout_secs: default_tool_timeout(),
        }
    }
}

// ─── Top Level ───────────────────────────────────────────────────────────────

/// Immutable, process-wide router configuration (mirrors `ana-router.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Ordered fallback chain.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_classifier")]
    pub classifier: ClassifierConfig,
    #[serde(default = "default_tool_filter")]
    pub tool_filter: ToolFilterConfig,
    #[serde(default)]
    pub agent_loop: AgentLoopConfig,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Appended as a user turn before the tool-free synthesis call.
    #[serde(default = "default_synthesis_instruction")]
    pub synthesis_instruction: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            classifier: default_classifier(),
            tool_filter: default_tool_filter(),
            agent_loop: AgentLoopConfig::default(),
            system_prompt: default_system_prompt(),
            synthesis_instruction: default_synthesis_instruction(),
        }
    }
}

impl RouterConfig {
    /// Check the invariants the router relies on.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.providers.is_empty() {
            return config_err("provider chain is empty");
        }
        let mut seen = HashSet::new();
        for p in &self.providers {
            if p.name.trim().is_empty() {
                return config_err("provider with empty name");
            }
            if !seen.insert(p.name.as_str()) {
                return config_err(format!("duplicate provider name '{}'", p.name));
            }
            if p.endpoint.trim().is_empty() {
                return config_err(format!("provider '{}' has no endpoint", p.name));
            }
            if p.timeout_secs == 0 {
                return config_err(format!("provider '{}' has a zero timeout", p.name));
            }
        }

        if self.agent_loop.max_iterations == 0 {
            return config_err("agent_loop.max_iterations must be positive");
        }
        if self.agent_loop.max_tool_result_chars == 0 {
            return config_err("agent_loop.max_tool_result_chars must be positive");
        }
        if self.agent_loop.default_tool_timeout_secs == 0 {
            return config_err("agent_loop.default_tool_timeout_secs must be positive");
        }
        if self.tool_filter.max_tools == 0 {
            return config_err("tool_filter.max_tools must be positive");
        }

        let group_names: HashSet<&str> = self
            .tool_filter
            .groups
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        for name in &self.tool_filter.default_groups {
            if !group_names.contains(name.as_str()) {
                return config_err(format!("default tool group '{name}' is not defined"));
            }
        }

        for (idx, rule) in self.classifier.rules.iter().enumerate() {
            if rule.keywords.is_empty() && rule.regexes.is_empty() && !rule.requires_image {
                return config_err(format!(
                    "classifier rule #{idx} ({}) has no patterns and no image requirement",
                    rule.task_type
                ));
            }
            for pattern in &rule.regexes {
                if let Err(e) = regex::Regex::new(pattern) {
                    return config_err(format!("classifier rule #{idx}: bad regex '{pattern}': {e}"));
                }
            }
        }

        Ok(())
    }
}

fn config_err<T>(reason: impl Into<String>) -> Result<T, InferenceError> {
    Err(InferenceError::ConfigError {
        reason: reason.into(),
    })
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve the config path.
///
/// Checks `ANA_ROUTER_CONFIG` first, then searches upward from `start` for
/// `ana-router.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    // 1. Check env var
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.exists() {
            return Ok(candidate);
        }
        return config_err(format!(
            "{CONFIG_ENV_VAR} points at {} which does not exist",
            candidate.display()
        ));
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    config_err(format!("could not find {CONFIG_FILE_NAME}"))
}

/// Load, interpolate, parse and validate a config file.
///
/// Environment variables are interpolated in `${VAR_NAME}` and
/// `${VAR_NAME:-default}` form before parsing.
pub fn load_router_config(path: &Path) -> Result<RouterConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config = parse_router_config(&raw)?;
    tracing::info!(
        path = %path.display(),
        providers = config.providers.len(),
        rules = config.classifier.rules.len(),
        "router config loaded"
    );
    Ok(config)
}

/// Parse and validate config text.
pub fn parse_router_config(raw: &str) -> Result<RouterConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);

    let config: RouterConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    config.validate()?;
    Ok(config)
}

/// Load the config from an explicit path, or discover it, or fall back to the
/// built-in defaults when no file exists.
pub fn load_or_default(explicit: Option<&Path>, start: &Path) -> Result<RouterConfig, InferenceError> {
    if let Some(path) = explicit {
        return load_router_config(path);
    }
    match find_config_path(start) {
        Ok(path) => load_router_config(&path),
        Err(e) if std::env::var(CONFIG_ENV_VAR).is_ok() => Err(e),
        Err(_) => {
            tracing::info!("no {CONFIG_FILE_NAME} found, using built-in defaults");
            let config = RouterConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => expand_tilde(default),
        },
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Built-in Defaults ───────────────────────────────────────────────────────

fn default_providers() -> Vec<ProviderConfig> {
    let env_key = |var: &str| std::env::var(var).ok().filter(|v| !v.is_empty());
    vec![
        ProviderConfig {
            name: "ollama".into(),
            model_id: "qwen2.5-coder:7b".into(),
            kind: ProviderKind::Local,
            protocol: WireProtocol::Ollama,
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            timeout_secs: 120,
            temperature: default_temperature(),
            max_tokens: 2048,
            tool_result_role: ToolResultRole::Tool,
            accepts_model_hint: true,
            hint_models: vec![
                "qwen2.5-coder:7b".into(),
                "llama3.2-vision:11b".into(),
                "deepseek-coder-v2:16b-lite-instruct-q4_K_M".into(),
            ],
        },
        ProviderConfig {
            name: "groq".into(),
            model_id: "llama-3.3-70b-versatile".into(),
            kind: ProviderKind::Cloud,
            protocol: WireProtocol::Openai,
            endpoint: "https://api.groq.com/openai/v1".into(),
            api_key: env_key("GROQ_API_KEY"),
            timeout_secs: default_provider_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            tool_result_role: ToolResultRole::Tool,
            accepts_model_hint: false,
            hint_models: Vec::new(),
        },
        ProviderConfig {
            name: "cerebras".into(),
            model_id: "llama-3.3-70b".into(),
            kind: ProviderKind::Cloud,
            protocol: WireProtocol::Openai,
            endpoint: "https://api.cerebras.ai/v1".into(),
            api_key: env_key("CEREBRAS_API_KEY"),
            timeout_secs: default_provider_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            tool_result_role: ToolResultRole::Tool,
            accepts_model_hint: false,
            hint_models: Vec::new(),
        },
    ]
}

fn rule(
    task_type: TaskType,
    model: &str,
    reason: &str,
    confidence: f32,
    keywords: &[&str],
) -> RuleGroupConfig {
    RuleGroupConfig {
        task_type,
        model: model.into(),
        reason: Some(reason.into()),
        confidence,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        regexes: Vec::new(),
        requires_image: false,
    }
}

fn default_classifier() -> ClassifierConfig {
    let vision = RuleGroupConfig {
        requires_image: true,
        ..rule(TaskType::Vision, "llama3.2-vision:11b", "image attached", 1.0, &[])
    };
    let tools = rule(
        TaskType::Tools,
        "qwen2.5-coder:7b",
        "tool keyword",
        0.95,
        &[
            "heure", "quelle heure", "what time", "meteo", "météo", "weather", "température",
            "fichier", "file", "lis le", "liste les", "quels fichiers", "dossier", "directory",
            "execute", "exécute", "commande", "shell", "cherche sur", "recherche web",
            "wikipedia", "web", "souviens", "rappelles", "mémoire ana", "memoire ana",
            "cpu", "disque", "disk", "ping ", "infos systeme", "mot de passe", "hash",
        ],
    );
    let coding = rule(
        TaskType::Coding,
        "deepseek-coder-v2:16b-lite-instruct-q4_K_M",
        "coding keyword",
        0.9,
        &[
            "javascript", "typescript", "python", "rust", "react", "fonction", "function",
            "classe", "algorithme", "algorithm", "refactor", "debug", "bug", "compile",
            "api rest", "endpoint", "requête sql", "sql",
        ],
    );
    let math = RuleGroupConfig {
        regexes: vec![r"\d+\s*[\+\-\*/]\s*\d+".into()],
        ..rule(
            TaskType::Math,
            "llama-3.3-70b",
            "math expression",
            0.85,
            &["équation", "equation", "dérivée", "derivative", "intégrale", "pourcentage"],
        )
    };
    let memory = rule(
        TaskType::Memory,
        "llama-3.3-70b",
        "memory keyword",
        0.85,
        &[
            "je t'ai dit", "je t ai dit", "notre conversation", "on en a parlé", "tu te rappelles",
            "ma voiture", "remember",
        ],
    );
    let creative = rule(
        TaskType::Creative,
        "llama-3.3-70b",
        "creative keyword",
        0.8,
        &["poème", "poeme", "poem", "histoire", "story", "brainstorm", "chanson"],
    );

    ClassifierConfig {
        default_model: "llama-3.3-70b".into(),
        default_confidence: default_fallback_confidence(),
        rules: vec![vision, tools, coding, math, memory, creative],
    }
}

fn tool_group(name: &str, keywords: &[&str], hints: &[&str]) -> ToolGroupConfig {
    ToolGroupConfig {
        name: name.into(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        tool_hints: hints.iter().map(|h| h.to_string()).collect(),
    }
}

fn default_tool_filter() -> ToolFilterConfig {
    ToolFilterConfig {
        groups: vec![
            tool_group(
                "time",
                &["heure", "time", "date", "jour", "aujourd'hui", "today"],
                &["time", "date", "clock"],
            ),
            tool_group(
                "files",
                &["fichier", "file", "dossier", "folder", "directory", "lis le", "liste"],
                &["file", "dir", "path"],
            ),
            tool_group(
                "web",
                &["web", "cherche sur", "internet", "wikipedia", "url", "http", "meteo", "météo", "weather"],
                &["web", "http", "url", "search", "weather", "wiki"],
            ),
            tool_group(
                "shell",
                &["commande", "shell", "execute", "exécute", "terminal", "processus"],
                &["shell", "command", "exec", "process"],
            ),
            tool_group(
                "memory",
                &["souviens", "rappelles", "mémoire", "memoire", "remember"],
                &["memory", "remember", "recall"],
            ),
            tool_group(
                "system",
                &["cpu", "ram", "disque", "disk", "système", "systeme"],
                &["system", "cpu", "disk", "ram"],
            ),
        ],
        default_groups: default_tool_groups(),
        max_tools: default_max_tools(),
    }
}

fn default_system_prompt() -> String {
    "You are Ana, a helpful personal assistant. Answer in the user's language. \
     Use the provided tools when the request needs live data or local files, \
     and answer directly otherwise."
        .into()
}

fn default_synthesis_instruction() -> String {
    "Using the tool results above, answer the user's original request in plain prose. \
     Do not call any tools."
        .into()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
