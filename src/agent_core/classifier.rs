//! Task Classifier.
//!
//! A deterministic, ordered rule evaluator. Each rule group holds keyword and
//! regex patterns plus an optional image requirement; the first matching
//! group wins and a default decision guarantees totality. Ambiguity between
//! groups is resolved by rank only: there is no scoring.

use regex::{Regex, RegexBuilder};

use super::errors::AgentError;
use super::types::{ClassificationDecision, RequestContext, TaskType};
use crate::inference::config::{ClassifierConfig, RuleGroupConfig};

/// A single compiled pattern.
#[derive(Debug, Clone)]
enum Pattern {
    /// Lowercased substring.
    Keyword(String),
    /// Case-insensitive regex.
    Regex(Regex),
}

impl Pattern {
    fn matches(&self, original: &str, lowered: &str) -> bool {
        match self {
            Pattern::Keyword(kw) => lowered.contains(kw.as_str()),
            Pattern::Regex(re) => re.is_match(original),
        }
    }

    fn describe(&self) -> &str {
        match self {
            Pattern::Keyword(kw) => kw,
            Pattern::Regex(re) => re.as_str(),
        }
    }
}

/// A compiled rule group.
#[derive(Debug, Clone)]
struct RuleGroup {
    task_type: TaskType,
    model: String,
    reason: String,
    confidence: f32,
    patterns: Vec<Pattern>,
    requires_image: bool,
}

impl RuleGroup {
    fn compile(index: usize, config: &RuleGroupConfig) -> Result<Self, AgentError> {
        let mut patterns: Vec<Pattern> = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .map(Pattern::Keyword)
            .collect();

        for raw in &config.regexes {
            let re = RegexBuilder::new(raw)
                .case_insensitive(true)
                .build()
                .map_err(|e| AgentError::InvalidRule {
                    index,
                    reason: format!("bad regex '{raw}': {e}"),
                })?;
            patterns.push(Pattern::Regex(re));
        }

        if patterns.is_empty() && !config.requires_image {
            return Err(AgentError::InvalidRule {
                index,
                reason: "no patterns and no image requirement".into(),
            });
        }

        Ok(Self {
            task_type: config.task_type,
            model: config.model.clone(),
            reason: config
                .reason
                .clone()
                .unwrap_or_else(|| format!("{} rule", config.task_type)),
            confidence: config.confidence.clamp(0.0, 1.0),
            patterns,
            requires_image: config.requires_image,
        })
    }

    /// Returns the reason for a match, or `None`.
    fn evaluate(&self, original: &str, lowered: &str, context: &RequestContext) -> Option<String> {
        if self.requires_image && !context.has_image {
            return None;
        }
        if self.patterns.is_empty() {
            return Some(self.reason.clone());
        }
        self.patterns
            .iter()
            .find(|p| p.matches(original, lowered))
            .map(|p| format!("{} ({})", self.reason, p.describe()))
    }
}

/// Ordered keyword/regex classifier built once from `ClassifierConfig`.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    rules: Vec<RuleGroup>,
    default_model: String,
    default_confidence: f32,
}

impl TaskClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, AgentError> {
        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| RuleGroup::compile(idx, rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            default_model: config.default_model.clone(),
            default_confidence: config.default_confidence.clamp(0.0, 1.0),
        })
    }

    /// Pick the task type and preferred model for a message.
    pub fn classify(&self, message: &str, context: &RequestContext) -> ClassificationDecision {
        let lowered = message.to_lowercase();

        for rule in &self.rules {
            if let Some(reason) = rule.evaluate(message, &lowered, context) {
                tracing::debug!(task_type = %rule.task_type, reason = %reason, "classified");
                return ClassificationDecision {
                    model: rule.model.clone(),
                    task_type: rule.task_type,
                    reason,
                    confidence: rule.confidence,
                };
            }
        }

        ClassificationDecision {
            model: self.default_model.clone(),
            task_type: TaskType::General,
            reason: "no rule matched, general conversation".into(),
            confidence: self.default_confidence,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::config::RouterConfig;

    fn default_classifier() -> TaskClassifier {
        TaskClassifier::from_config(&RouterConfig::default().classifier).unwrap()
    }

    fn no_image() -> RequestContext {
        RequestContext::default()
    }

    fn rule(task_type: TaskType, keywords: &[&str]) -> RuleGroupConfig {
        RuleGroupConfig {
            task_type,
            model: format!("{task_type}-model"),
            reason: None,
            confidence: 0.9,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            regexes: Vec::new(),
            requires_image: false,
        }
    }

    #[test]
    fn test_time_question_is_tools() {
        let d = default_classifier().classify("quelle heure est-il?", &no_image());
        assert_eq!(d.task_type, TaskType::Tools);
        assert!(d.reason.contains("heure"));
    }

    #[test]
    fn test_greeting_is_general_default() {
        let d = default_classifier().classify("bonjour", &no_image());
        assert_eq!(d.task_type, TaskType::General);
        assert_eq!(d.model, "llama-3.3-70b");
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn test_image_context_beats_tool_keyword() {
        let ctx = RequestContext { has_image: true };
        let d = default_classifier().classify("quelle heure sur cette photo?", &ctx);
        assert_eq!(d.task_type, TaskType::Vision);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let d = default_classifier().classify("Quelle HEURE est-il", &no_image());
        assert_eq!(d.task_type, TaskType::Tools);
    }

    #[test]
    fn test_math_regex() {
        let d = default_classifier().classify("combien font 12 * 7 ?", &no_image());
        assert_eq!(d.task_type, TaskType::Math);
    }

    #[test]
    fn test_order_within_group_does_not_matter() {
        let forward = ClassifierConfig {
            default_model: "d".into(),
            default_confidence: 0.5,
            rules: vec![rule(TaskType::Memory, &["souviens", "voiture"])],
        };
        let reversed = ClassifierConfig {
            default_model: "d".into(),
            default_confidence: 0.5,
            rules: vec![rule(TaskType::Memory, &["voiture", "souviens"])],
        };
        let a = TaskClassifier::from_config(&forward).unwrap();
        let b = TaskClassifier::from_config(&reversed).unwrap();
        for msg in ["tu te souviens?", "ma voiture", "tu te souviens de ma voiture"] {
            assert_eq!(
                a.classify(msg, &no_image()).task_type,
                b.classify(msg, &no_image()).task_type
            );
            assert_eq!(a.classify(msg, &no_image()).task_type, TaskType::Memory);
        }
    }

    #[test]
    fn test_priority_across_groups() {
        // "calcul" (math) and "souviens" (memory) both present: earlier group wins.
        let math_first = ClassifierConfig {
            default_model: "d".into(),
            default_confidence: 0.5,
            rules: vec![rule(TaskType::Math, &["calcul"]), rule(TaskType::Memory, &["souviens"])],
        };
        let memory_first = ClassifierConfig {
            default_model: "d".into(),
            default_confidence: 0.5,
            rules: vec![rule(TaskType::Memory, &["souviens"]), rule(TaskType::Math, &["calcul"])],
        };
        let msg = "tu te souviens du calcul d'hier?";
        assert_eq!(
            TaskClassifier::from_config(&math_first).unwrap().classify(msg, &no_image()).task_type,
            TaskType::Math
        );
        assert_eq!(
            TaskClassifier::from_config(&memory_first).unwrap().classify(msg, &no_image()).task_type,
            TaskType::Memory
        );
    }

    #[test]
    fn test_image_rule_without_image_is_skipped() {
        let config = ClassifierConfig {
            default_model: "d".into(),
            default_confidence: 0.5,
            rules: vec![RuleGroupConfig {
                requires_image: true,
                ..rule(TaskType::Vision, &["photo"])
            }],
        };
        let c = TaskClassifier::from_config(&config).unwrap();
        assert_eq!(c.classify("une photo", &no_image()).task_type, TaskType::General);
        let ctx = RequestContext { has_image: true };
        assert_eq!(c.classify("une photo", &ctx).task_type, TaskType::Vision);
        assert_eq!(c.classify("autre chose", &ctx).task_type, TaskType::General);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let config = ClassifierConfig {
            default_model: "d".into(),
            default_confidence: 0.5,
            rules: vec![RuleGroupConfig {
                regexes: vec!["[".into()],
                ..rule(TaskType::Math, &[])
            }],
        };
        let err = TaskClassifier::from_config(&config).unwrap_err();
        assert!(matches!(err, AgentError::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn test_empty_rule_is_rejected() {
        let config = ClassifierConfig {
            default_model: "d".into(),
            default_confidence: 0.5,
            rules: vec![rule(TaskType::Coding, &[])],
        };
        assert!(TaskClassifier::from_config(&config).is_err());
    }
}
