use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for submitted adoption applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for cats in the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatId(pub String);

/// Identifier wrapper for the applicant account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

/// Well-known form question keys the rule filter and fallback evaluator read.
///
/// The form itself stays an open mapping; anything beyond these keys is
/// carried opaquely and only seen by the external judgment backend.
pub mod answers {
    pub const STERILIZATION_POSITION: &str = "sterilization_position";
    pub const HAS_PROTECTIVE_NETTING: &str = "has_protective_netting";
    pub const HOUSING_TYPE: &str = "housing_type";
    pub const MOTIVATION: &str = "motivation";
    pub const HAS_EXPERIENCE: &str = "has_experience";
    pub const HAS_TIME: &str = "has_time";
    pub const HAS_SPACE: &str = "has_space";
}

/// A single applicant answer. Free-text questions carry `Text`, checkbox
/// style questions carry `Flag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Text(String),
}

/// Opaque question -> answer mapping supplied by the applicant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormResponses(pub BTreeMap<String, AnswerValue>);

impl FormResponses {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Free-text answer for a question, if present.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AnswerValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Boolean answer for a question, if present. A textual "yes"/"no" is
    /// accepted so imports from older form versions keep working.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(AnswerValue::Flag(value)) => Some(*value),
            Some(AnswerValue::Text(value)) => match value.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" => Some(true),
                "no" | "false" => Some(false),
                _ => None,
            },
            None => None,
        }
    }

    pub fn insert_text(&mut self, key: &str, value: &str) {
        self.0
            .insert(key.to_string(), AnswerValue::Text(value.to_string()));
    }

    pub fn insert_flag(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_string(), AnswerValue::Flag(value));
    }
}

/// High level status tracked throughout the application lifecycle.
///
/// `AutoRejected`, `Approved`, and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    PendingReview,
    AutoRejected,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::PendingReview => "pending_review",
            ApplicationStatus::AutoRejected => "auto_rejected",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::AutoRejected
                | ApplicationStatus::Approved
                | ApplicationStatus::Rejected
        )
    }

    /// Statuses still competing for a cat; forced to `Rejected` when a
    /// sibling application is approved.
    pub const fn is_open(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::PendingReview
        )
    }
}

/// Verdict enum the automated evaluation stage produces.
///
/// `Approve` is advisory only: the lifecycle still routes it to
/// `PendingReview` because the automated stage never approves on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskDecision {
    Reject,
    Review,
    Approve,
}

impl RiskDecision {
    pub const fn label(self) -> &'static str {
        match self {
            RiskDecision::Reject => "REJECT",
            RiskDecision::Review => "REVIEW",
            RiskDecision::Approve => "APPROVE",
        }
    }
}

/// Structured evaluation attached to an application once the rule filter or
/// risk scorer has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: u8,
    pub decision: RiskDecision,
    pub reason: Option<String>,
    pub flags: Vec<String>,
    pub risk_breakdown: BTreeMap<String, String>,
    pub evaluated_at: DateTime<Utc>,
    /// Normalized description of a backend failure absorbed by the fallback
    /// evaluator; never surfaced to the applicant.
    pub error: Option<String>,
}

/// Cat activity levels relevant to living-space compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    Medium,
    High,
}

/// Sterilization state tracked by the cat catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SterilizationStatus {
    Sterilized,
    Pending,
    NotApplicable,
}

/// Adoption state tracked by the cat catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdoptionStatus {
    Available,
    Adopted,
}

/// Read-only requirements view supplied by the cat catalog collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatRequirements {
    pub needs_protective_netting: bool,
    pub requires_large_house: bool,
    pub activity_level: ActivityLevel,
    pub sterilization_status: SterilizationStatus,
}

/// Catalog snapshot used at submission and approval time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatSnapshot {
    pub cat_id: CatId,
    pub requirements: CatRequirements,
    pub adoption_status: AdoptionStatus,
}

/// Decision supplied by the human reviewer for a `pending_review` application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerDecision {
    Approved,
    Rejected,
}
