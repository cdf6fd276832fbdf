use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Who authored a message in the conversation
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

// Represents a single message in a conversation. Never mutated after it is appended.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationMessage {
    #[serde(default = "Uuid::new_v4")] // Generate a new UUID if missing during deserialization
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            timestamp,
        }
    }
}

/// Small home profile used to personalise the system instruction.
///
/// Every field is optional: the profile is built up from whatever the user
/// mentions and cached under a namespaced key between sessions.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handiness_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<String>,
}

impl UserContext {
    pub fn is_empty(&self) -> bool {
        self.home_type.is_none()
            && self.handiness_level.is_none()
            && self.home_age.is_none()
            && self.square_footage.is_none()
    }

    /// Overlays the fields present in `other`, keeping existing values otherwise.
    pub fn merge(&mut self, other: UserContext) {
        if other.home_type.is_some() {
            self.home_type = other.home_type;
        }
        if other.handiness_level.is_some() {
            self.handiness_level = other.handiness_level;
        }
        if other.home_age.is_some() {
            self.home_age = other.home_age;
        }
        if other.square_footage.is_some() {
            self.square_footage = other.square_footage;
        }
    }
}

// Signed-in user. Its presence means context collection is skipped.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handiness_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<String>,
}

impl UserProfile {
    /// Context handed to the model for a signed-in user, with defaults for blanks.
    pub fn context(&self) -> UserContext {
        UserContext {
            home_type: Some(self.home_type.clone().unwrap_or_else(|| "home".to_string())),
            handiness_level: Some(
                self.handiness_level
                    .clone()
                    .unwrap_or_else(|| "some experience".to_string()),
            ),
            home_age: Some(self.home_age.clone().unwrap_or_else(|| "unknown".to_string())),
            square_footage: Some(
                self.square_footage
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiyFeasibility {
    Yes,
    Partial,
    No,
}

// Reads the leading word of a free-form label value, e.g. "Low (an afternoon)".
fn leading_word(value: &str) -> String {
    value
        .trim()
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Structured fields extracted from the assistant's closing message.
///
/// Values are kept verbatim; the typed accessors interpret them when possible.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diy_feasible: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_concerns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialist_needed: Option<String>,
}

impl AssessmentSummary {
    pub fn complexity_level(&self) -> Option<Complexity> {
        match leading_word(self.complexity.as_deref()?).as_str() {
            "low" => Some(Complexity::Low),
            "medium" => Some(Complexity::Medium),
            "high" => Some(Complexity::High),
            _ => None,
        }
    }

    pub fn diy_feasibility(&self) -> Option<DiyFeasibility> {
        match leading_word(self.diy_feasible.as_deref()?).as_str() {
            "yes" => Some(DiyFeasibility::Yes),
            "partial" => Some(DiyFeasibility::Partial),
            "no" => Some(DiyFeasibility::No),
            _ => None,
        }
    }
}

// Assessment persisted by the "find a specialist" and "save" actions
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SavedAssessment {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String, // "active" when created from a chat
    #[serde(rename = "type")]
    pub kind: String, // "AI Triage"
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,
    pub ai_complete: bool,
    pub diagnosis: String,
    pub confidence: Complexity,
    pub specialist_type: String,
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub chat_transcript: Vec<ConversationMessage>,
    #[serde(default)]
    pub summary: AssessmentSummary,
}

// Assessment shared with the community for peer advice
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommunityPost {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub likes: u32,
    pub assessment: AssessmentSummary,
}

// Represents a configured API endpoint/model
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelConfig {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String, // User-friendly name (e.g., "OpenAI GPT-3.5")
    pub provider: String, // e.g., "openai_compatible"
    pub api_url: String, // Base URL, or a same-origin proxy path
    // Reference to the key, not the key itself: 'keyring', 'env:MY_API_KEY', or none for a proxy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_ref: Option<String>,
    // JSON string: model, max_tokens, temperature, timeout_secs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<String>,
}
