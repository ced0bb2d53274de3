use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AdoptionStatus, ApplicantId, ApplicationId, ApplicationStatus, CatId, CatSnapshot, Evaluation,
    FormResponses, SterilizationStatus,
};

/// Repository record for an adoption application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub cat_id: CatId,
    pub applicant_id: ApplicantId,
    pub form_responses: FormResponses,
    pub status: ApplicationStatus,
    pub evaluation: Option<Evaluation>,
    pub submitted_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn decision_rationale(&self) -> String {
        match &self.evaluation {
            Some(evaluation) => match &evaluation.reason {
                Some(reason) => reason.clone(),
                None => format!(
                    "scored {}/100 ({}), awaiting human review",
                    evaluation.score,
                    evaluation.decision.label()
                ),
            },
            None => "pending evaluation".to_string(),
        }
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application_id.clone(),
            cat_id: self.cat_id.clone(),
            status: self.status.label(),
            decision_rationale: self.decision_rationale(),
            score: self.evaluation.as_ref().map(|evaluation| evaluation.score),
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub cat_id: CatId,
    pub status: &'static str,
    pub decision_rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for applications so the service can be exercised in
/// isolation.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError>;
    fn update(&self, record: ApplicationRecord) -> Result<(), StoreError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError>;
    /// All applications referencing a cat, regardless of status.
    fn for_cat(&self, cat_id: &CatId) -> Result<Vec<ApplicationRecord>, StoreError>;
    /// Applications still in `submitted` with no evaluation attached,
    /// oldest first.
    fn awaiting_evaluation(&self) -> Result<Vec<ApplicationRecord>, StoreError>;
}

/// Error enumeration for cat catalog failures.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("cat not found")]
    NotFound,
    #[error("cat catalog unavailable: {0}")]
    Unavailable(String),
}

/// Boundary to the cat catalog collaborator. Only the contract the pipeline
/// needs: a requirements snapshot plus the two status writes triggered by
/// approval and sterilization follow-up.
pub trait CatDirectory: Send + Sync {
    fn snapshot(&self, cat_id: &CatId) -> Result<CatSnapshot, DirectoryError>;
    fn set_adoption_status(
        &self,
        cat_id: &CatId,
        status: AdoptionStatus,
    ) -> Result<(), DirectoryError>;
    fn set_sterilization_status(
        &self,
        cat_id: &CatId,
        status: SterilizationStatus,
    ) -> Result<(), DirectoryError>;
}

/// Storage abstraction for post-adoption tracking tasks.
pub trait TrackingRepository: Send + Sync {
    fn insert(&self, task: super::tracking::TrackingTask)
        -> Result<super::tracking::TrackingTask, StoreError>;
    fn update(&self, task: super::tracking::TrackingTask) -> Result<(), StoreError>;
    fn fetch(
        &self,
        id: &super::tracking::TaskId,
    ) -> Result<Option<super::tracking::TrackingTask>, StoreError>;
    fn for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<super::tracking::TrackingTask>, StoreError>;
    /// Pending tasks whose due date is strictly before `today`.
    fn pending_due_before(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<super::tracking::TrackingTask>, StoreError>;
}
