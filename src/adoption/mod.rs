//! Adoption-application evaluation and lifecycle pipeline.
//!
//! A submitted application runs through the deterministic rule filter, then
//! (when no kill-switch fires) the external risk scorer, and lands in
//! `pending_review` or `auto_rejected`. A human reviewer resolves pending
//! applications; approval flips the cat's adoption status, schedules
//! tracking tasks, and rejects competing applications for the same cat.

pub mod domain;
pub mod infra;
pub mod repository;
pub mod router;
pub mod rules;
pub mod scorer;
pub mod service;
pub mod tracking;

#[cfg(test)]
mod tests;

pub use domain::{
    answers, ActivityLevel, AdoptionStatus, AnswerValue, ApplicantId, ApplicationId,
    ApplicationStatus, CatId, CatRequirements, CatSnapshot, Evaluation, FormResponses,
    ReviewerDecision, RiskDecision, SterilizationStatus,
};
pub use repository::{
    ApplicationRecord, ApplicationRepository, ApplicationStatusView, CatDirectory, DirectoryError,
    StoreError, TrackingRepository,
};
pub use router::adoption_router;
pub use rules::{RuleFilter, RuleVerdict};
pub use scorer::{
    BatchItem, BatchOutcome, JudgmentCallError, JudgmentGateway, JudgmentRequest, RiskScorer,
};
pub use service::{AdoptionService, AdoptionServiceError};
pub use tracking::{TaskId, TaskStatus, TaskType, TrackingError, TrackingScheduler, TrackingTask};
