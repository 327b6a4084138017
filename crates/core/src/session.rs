//! Session, stage, and the business facts accumulated by tools.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::ConversationContext;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Conversation phase. Declaration order is the only direction of travel.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Business unit not yet determined.
    #[default]
    Routing,
    /// Unit known, contact incomplete.
    Collecting,
    /// Contact complete, inquiry not yet captured.
    Resolving,
    /// Inquiry captured, awaiting termination.
    Closing,
    /// Terminal.
    Ended,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Routing => "ROUTING",
            Stage::Collecting => "COLLECTING",
            Stage::Resolving => "RESOLVING",
            Stage::Closing => "CLOSING",
            Stage::Ended => "ENDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Ended)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ROUTING" => Ok(Stage::Routing),
            "COLLECTING" => Ok(Stage::Collecting),
            "RESOLVING" => Ok(Stage::Resolving),
            "CLOSING" => Ok(Stage::Closing),
            "ENDED" => Ok(Stage::Ended),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Lifecycle status of a stored session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Ended,
    /// Abandoned after the idle timeout; a new session replaces it.
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Expired => "expired",
        }
    }
}

/// Status reported to the chat caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Ended,
}

/// The contact fields a customer must provide before an inquiry is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Name,
    Phone,
    Email,
    CompanyName,
    TaxId,
}

impl ContactField {
    pub const ALL: [ContactField; 5] = [
        ContactField::Name,
        ContactField::Phone,
        ContactField::Email,
        ContactField::CompanyName,
        ContactField::TaxId,
    ];

    /// Argument name used by the contact tool for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactField::Name => "name",
            ContactField::Phone => "phone",
            ContactField::Email => "email",
            ContactField::CompanyName => "company_name",
            ContactField::TaxId => "tax_id",
        }
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

impl ContactFields {
    pub fn get(&self, field: ContactField) -> Option<&str> {
        match field {
            ContactField::Name => self.name.as_deref(),
            ContactField::Phone => self.phone.as_deref(),
            ContactField::Email => self.email.as_deref(),
            ContactField::CompanyName => self.company_name.as_deref(),
            ContactField::TaxId => self.tax_id.as_deref(),
        }
    }

    pub fn set(&mut self, field: ContactField, value: impl Into<String>) {
        let slot = match field {
            ContactField::Name => &mut self.name,
            ContactField::Phone => &mut self.phone,
            ContactField::Email => &mut self.email,
            ContactField::CompanyName => &mut self.company_name,
            ContactField::TaxId => &mut self.tax_id,
        };
        *slot = Some(value.into());
    }

    /// Fields that are absent or blank, in declaration order.
    pub fn missing(&self) -> Vec<ContactField> {
        ContactField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none_or(|v| v.trim().is_empty()))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Facts established by tool side effects over the life of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessFacts {
    /// Selected business unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(default)]
    pub contact: ContactFields,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inquiry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub closed: bool,
}

/// One conversation: its context, stage, and accumulated facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub stage: Stage,
    pub status: SessionStatus,
    pub context: ConversationContext,
    pub facts: BusinessFacts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            stage: Stage::Routing,
            status: SessionStatus::Active,
            context: ConversationContext::new(),
            facts: BusinessFacts::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn conversation_status(&self) -> ConversationStatus {
        if self.stage == Stage::Ended {
            ConversationStatus::Ended
        } else {
            ConversationStatus::Active
        }
    }

    /// An active session untouched for longer than `idle_timeout`.
    /// A zero timeout disables expiry.
    pub fn is_idle_expired(&self, idle_timeout: std::time::Duration, now: DateTime<Utc>) -> bool {
        if idle_timeout.is_zero() || self.status != SessionStatus::Active {
            return false;
        }
        let Ok(limit) = Duration::from_std(idle_timeout) else {
            return false;
        };
        now - self.updated_at > limit
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        if self.stage == Stage::Ended {
            self.status = SessionStatus::Ended;
        }
    }
}
