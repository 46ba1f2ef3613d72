//! Conversation and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Persona,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Persona => "persona",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "persona" => Some(Self::Persona),
            _ => None,
        }
    }
}

/// One recorded exchange in a conversation.
///
/// User turns never carry a persona name; persona turns always do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub persona_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            persona_name: None,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn persona(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Persona,
            persona_name: Some(name.into()),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Label used when the turn is replayed as prompt context
    pub fn speaker(&self) -> &str {
        match self.role {
            TurnRole::User => "User",
            TurnRole::Persona => self.persona_name.as_deref().unwrap_or("Assistant"),
        }
    }
}

/// Ordered history of turns for one conversation.
///
/// Turns are append-only and read back in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session with a fresh id
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn append(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse label attached to a quality score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Excellent,
    High,
    Good,
    Moderate,
    Fair,
    NeedsImprovement,
}

impl ConfidenceLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            9..=u8::MAX => Self::Excellent,
            8 => Self::High,
            7 => Self::Good,
            6 => Self::Moderate,
            5 => Self::Fair,
            _ => Self::NeedsImprovement,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Excellent => "Excellent",
            Self::High => "High",
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Fair => "Fair",
            Self::NeedsImprovement => "Needs Improvement",
        };
        f.write_str(label)
    }
}

/// Heuristic quality annotation for a piece of generated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: u8,
    pub confidence: ConfidenceLevel,
    pub suggestions: Vec<String>,
}

/// Result of answering one query. Built once and returned, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub session_id: String,
    pub query: String,
    /// Persona turns produced for this query, in invocation order
    pub turns: Vec<Turn>,
    pub synthesized_text: String,
    pub quality_score: u8,
    pub quality: QualityAssessment,
    pub elapsed_ms: u64,
}

impl AggregatedResponse {
    /// Names of the personas that answered, in invocation order
    pub fn personas(&self) -> Vec<&str> {
        self.turns
            .iter()
            .filter_map(|t| t.persona_name.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_turns_have_no_persona() {
        let turn = Turn::user("What is GDPR?");
        assert_eq!(turn.role, TurnRole::User);
        assert!(turn.persona_name.is_none());
        assert_eq!(turn.speaker(), "User");
    }

    #[test]
    fn persona_turn_speaker_is_persona_name() {
        let turn = Turn::persona("ComplianceExpert", "Compliance assessment complete.");
        assert_eq!(turn.speaker(), "ComplianceExpert");
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(ConfidenceLevel::from_score(10), ConfidenceLevel::Excellent);
        assert_eq!(ConfidenceLevel::from_score(9), ConfidenceLevel::Excellent);
        assert_eq!(ConfidenceLevel::from_score(8), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(5), ConfidenceLevel::Fair);
        assert_eq!(ConfidenceLevel::from_score(1), ConfidenceLevel::NeedsImprovement);
        assert_eq!(
            ConfidenceLevel::NeedsImprovement.to_string(),
            "Needs Improvement"
        );
    }

    #[test]
    fn role_parse_matches_as_str() {
        for role in [TurnRole::User, TurnRole::Persona] {
            assert_eq!(TurnRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(TurnRole::parse("system"), None);
    }
}
