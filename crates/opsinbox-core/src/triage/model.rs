//! Triage data models.

use serde::{Deserialize, Serialize};

/// Priority bucket for a triaged message. `P0` is the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Drop everything.
    P0,
    /// Needs prompt attention.
    P1,
    /// Normal attention.
    P2,
    /// Read later, archive, or ignore.
    P3,
}

impl Priority {
    /// Parse from database string representation.
    ///
    /// Unknown values fall back to `P2`, the "normal attention" bucket.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "P0" => Self::P0,
            "P1" => Self::P1,
            "P3" => Self::P3,
            _ => Self::P2,
        }
    }

    /// Strict parse, for validating user-supplied rule configuration.
    #[must_use]
    pub fn parse_strict(s: &str) -> Option<Self> {
        match s {
            "P0" => Some(Self::P0),
            "P1" => Some(Self::P1),
            "P2" => Some(Self::P2),
            "P3" => Some(Self::P3),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields of a message the triage engine looks at.
///
/// All fields are raw header/preview strings and may be empty or malformed;
/// the engine is total over every combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailForTriage {
    /// Raw `From:` header, display name and all.
    pub from: String,
    /// Raw subject line.
    pub subject: String,
    /// Short preview of the body text.
    pub snippet: String,
    /// Raw `Date:` header value.
    pub date: String,
}

/// Output of the triage engine for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    /// Priority bucket.
    pub priority: Priority,
    /// Public category label (`security`, `billing`, `operations`, `career`,
    /// `learning`, `low`, or `general`).
    pub category: String,
    /// Fixed human-readable summary for the category.
    pub summary: String,
    /// Fixed suggested action for the category.
    pub action: String,
    /// Heuristic confidence in `[0.60, 0.98]`, rounded to two decimals.
    pub confidence: f64,
}

/// Per-message override recorded by a user on top of the engine's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageOverride {
    /// Whether the message has been handled.
    pub done: bool,
    /// Free-form note, capped at [`TriageOverride::MAX_NOTE_LEN`] characters.
    pub note: String,
    /// User tags, trimmed and capped at [`TriageOverride::MAX_TAGS`].
    pub tags: Vec<String>,
    /// RFC 3339 timestamp of the last change.
    pub updated_at: String,
}

impl TriageOverride {
    /// Maximum stored note length, in characters.
    pub const MAX_NOTE_LEN: usize = 1000;

    /// Maximum number of stored tags.
    pub const MAX_TAGS: usize = 10;

    /// Normalizes a raw note: truncated at the character cap.
    #[must_use]
    pub fn normalize_note(note: &str) -> String {
        note.chars().take(Self::MAX_NOTE_LEN).collect()
    }

    /// Normalizes raw tags: trimmed, empties dropped, capped in count.
    #[must_use]
    pub fn normalize_tags(tags: &[String]) -> Vec<String> {
        tags.iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .take(Self::MAX_TAGS)
            .collect()
    }
}

/// An admin-configurable triage rule.
///
/// Stored rules complement the built-in tables; `matchers` are keyword
/// substrings and the rule routes matching messages to `category` at
/// `priority`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique identifier (`rule-<millis>` for user-created rules).
    pub id: String,
    /// Short display name.
    pub name: String,
    /// What the rule is for.
    pub description: String,
    /// Keyword matchers; at least one is required.
    pub matchers: Vec<String>,
    /// Priority assigned to matching messages.
    pub priority: Priority,
    /// Category assigned to matching messages.
    pub category: String,
    /// Disabled rules are kept but not applied.
    pub enabled: bool,
}

/// Validation failure for a user-supplied [`RuleConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleConfigError {
    /// Name is empty or whitespace.
    #[error("rule name is required")]
    MissingName,

    /// Description is empty or whitespace.
    #[error("rule description is required")]
    MissingDescription,

    /// Category is empty or whitespace.
    #[error("rule category is required")]
    MissingCategory,

    /// No usable matcher remained after trimming.
    #[error("rule requires at least one matcher")]
    MissingMatchers,
}

impl RuleConfig {
    /// The rule seeded on first use so the rule list is never empty.
    #[must_use]
    pub fn default_security_rule() -> Self {
        Self {
            id: "rule-security-1".to_string(),
            name: "Security alerts".to_string(),
            description: "Escalate suspicious and verification-related messages.".to_string(),
            matchers: vec![
                "verification code".to_string(),
                "security alert".to_string(),
                "suspicious".to_string(),
            ],
            priority: Priority::P0,
            category: "security".to_string(),
            enabled: true,
        }
    }

    /// Trims fields and checks the invariants user-created rules must hold.
    ///
    /// # Errors
    ///
    /// Returns the first failed invariant.
    pub fn validate(&mut self) -> Result<(), RuleConfigError> {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        self.category = self.category.trim().to_string();
        self.matchers = self
            .matchers
            .iter()
            .map(|matcher| matcher.trim().to_string())
            .filter(|matcher| !matcher.is_empty())
            .collect();

        if self.name.is_empty() {
            return Err(RuleConfigError::MissingName);
        }
        if self.description.is_empty() {
            return Err(RuleConfigError::MissingDescription);
        }
        if self.category.is_empty() {
            return Err(RuleConfigError::MissingCategory);
        }
        if self.matchers.is_empty() {
            return Err(RuleConfigError::MissingMatchers);
        }
        Ok(())
    }
}

/// Mode of the optional AI triage collaborator.
///
/// The deterministic rules engine is always the guaranteed fallback; AI
/// classification never replaces it, only shadows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
    /// No AI calls at all.
    #[default]
    Disabled,
    /// AI runs alongside the rules engine for comparison; results are not
    /// served.
    Shadow,
}

impl AiMode {
    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Shadow => "shadow",
        }
    }
}

/// System feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Whether AI shadow triage is on.
    pub ai_triage_enabled: bool,
    /// Derived AI mode; `Shadow` exactly when `ai_triage_enabled`.
    pub ai_mode: AiMode,
}

impl FeatureFlags {
    /// Builds flags from the single persisted toggle.
    #[must_use]
    pub const fn from_toggle(ai_triage_enabled: bool) -> Self {
        Self {
            ai_triage_enabled,
            ai_mode: if ai_triage_enabled {
                AiMode::Shadow
            } else {
                AiMode::Disabled
            },
        }
    }

    /// The strategy served when AI is disabled, errors, or disagrees.
    #[must_use]
    pub const fn safe_fallback(&self) -> &'static str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_roundtrip() {
        for priority in [Priority::P0, Priority::P1, Priority::P2, Priority::P3] {
            assert_eq!(Priority::parse(priority.as_str()), priority);
            assert_eq!(Priority::parse_strict(priority.as_str()), Some(priority));
        }
    }

    #[test]
    fn test_priority_parse_falls_back_to_p2() {
        assert_eq!(Priority::parse("urgent"), Priority::P2);
        assert_eq!(Priority::parse(""), Priority::P2);
        assert_eq!(Priority::parse_strict("urgent"), None);
    }

    #[test]
    fn test_override_note_is_capped() {
        let long = "x".repeat(TriageOverride::MAX_NOTE_LEN + 50);
        let note = TriageOverride::normalize_note(&long);
        assert_eq!(note.chars().count(), TriageOverride::MAX_NOTE_LEN);
    }

    #[test]
    fn test_override_tags_are_trimmed_and_capped() {
        let raw: Vec<String> = (0..15)
            .map(|i| {
                if i == 3 {
                    "   ".to_string()
                } else {
                    format!(" tag-{i} ")
                }
            })
            .collect();
        let tags = TriageOverride::normalize_tags(&raw);

        assert_eq!(tags.len(), TriageOverride::MAX_TAGS);
        assert_eq!(tags[0], "tag-0");
        assert!(!tags.contains(&String::new()));
    }

    #[test]
    fn test_rule_config_validation() {
        let mut rule = RuleConfig::default_security_rule();
        assert!(rule.validate().is_ok());

        let mut unnamed = RuleConfig {
            name: "   ".to_string(),
            ..RuleConfig::default_security_rule()
        };
        assert_eq!(unnamed.validate(), Err(RuleConfigError::MissingName));

        let mut no_matchers = RuleConfig {
            matchers: vec!["  ".to_string()],
            ..RuleConfig::default_security_rule()
        };
        assert_eq!(
            no_matchers.validate(),
            Err(RuleConfigError::MissingMatchers)
        );
    }

    #[test]
    fn test_feature_flags_from_toggle() {
        let on = FeatureFlags::from_toggle(true);
        assert_eq!(on.ai_mode, AiMode::Shadow);
        assert_eq!(on.safe_fallback(), "rules");

        let off = FeatureFlags::from_toggle(false);
        assert_eq!(off.ai_mode, AiMode::Disabled);
    }
}
