use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{
    AdoptionStatus, ApplicantId, ApplicationId, ApplicationStatus, CatId, Evaluation,
    FormResponses, ReviewerDecision, RiskDecision,
};
use super::repository::{
    ApplicationRecord, ApplicationRepository, CatDirectory, DirectoryError, StoreError,
    TrackingRepository,
};
use super::scorer::{BatchItem, RiskScorer};
use super::tracking::{TrackingError, TrackingScheduler};
use crate::config::TrackingPolicy;

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Error raised by the adoption service.
#[derive(Debug, thiserror::Error)]
pub enum AdoptionServiceError {
    #[error("invalid submission: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("invariant violation: {0}")]
    Invariant(String),
    /// The approval side-effect bundle stopped partway; the caller must retry
    /// the approval as a whole.
    #[error("approval incomplete at step '{step}': {source}")]
    ApprovalIncomplete {
        step: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Service composing the rule filter, risk scorer, tracking scheduler, and
/// the application state machine.
///
/// All collaborators are injected so tests can replace the judgment backend
/// and the stores with doubles.
pub struct AdoptionService<A, C, T> {
    applications: Arc<A>,
    cats: Arc<C>,
    scorer: RiskScorer,
    tracking: TrackingScheduler<A, C, T>,
    cat_locks: Mutex<HashMap<CatId, Arc<Mutex<()>>>>,
}

impl<A, C, T> AdoptionService<A, C, T>
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    pub fn new(
        applications: Arc<A>,
        cats: Arc<C>,
        tasks: Arc<T>,
        scorer: RiskScorer,
        tracking_policy: TrackingPolicy,
    ) -> Self {
        let tracking = TrackingScheduler::new(
            applications.clone(),
            cats.clone(),
            tasks,
            tracking_policy,
        );

        Self {
            applications,
            cats,
            scorer,
            tracking,
            cat_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracking(&self) -> &TrackingScheduler<A, C, T> {
        &self.tracking
    }

    /// Submit a new application and run the evaluation pipeline on it.
    ///
    /// The record lands in `auto_rejected` when the rule filter or scorer
    /// decides REJECT, in `pending_review` otherwise. The external backend is
    /// consulted at most once, after the rule filter has passed.
    pub fn submit_application(
        &self,
        cat_id: CatId,
        applicant_id: ApplicantId,
        form_responses: FormResponses,
        now: DateTime<Utc>,
    ) -> Result<ApplicationRecord, AdoptionServiceError> {
        if form_responses.is_empty() {
            return Err(AdoptionServiceError::Validation(
                "form_responses must not be empty".to_string(),
            ));
        }

        let snapshot = self.cats.snapshot(&cat_id)?;
        if snapshot.adoption_status != AdoptionStatus::Available {
            return Err(AdoptionServiceError::Invariant(
                "cat is no longer available for adoption".to_string(),
            ));
        }

        let record = self.applications.insert(ApplicationRecord {
            application_id: next_application_id(),
            cat_id,
            applicant_id,
            form_responses,
            status: ApplicationStatus::Submitted,
            evaluation: None,
            submitted_at: now,
        })?;

        let evaluation =
            self.scorer
                .score(&snapshot.requirements, &record.form_responses, now);
        self.apply_evaluation(record, evaluation)
    }

    fn apply_evaluation(
        &self,
        mut record: ApplicationRecord,
        evaluation: Evaluation,
    ) -> Result<ApplicationRecord, AdoptionServiceError> {
        record.status = match evaluation.decision {
            RiskDecision::Reject => ApplicationStatus::AutoRejected,
            // The automated stage never approves; an APPROVE verdict is
            // advisory and still goes to a human.
            RiskDecision::Review | RiskDecision::Approve => ApplicationStatus::PendingReview,
        };
        record.evaluation = Some(evaluation);
        self.applications.update(record.clone())?;

        info!(
            application = %record.application_id.0,
            status = record.status.label(),
            score = record.evaluation.as_ref().map(|evaluation| evaluation.score),
            "application evaluated"
        );

        Ok(record)
    }

    /// Fetch an application for API responses.
    pub fn get_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, AdoptionServiceError> {
        let record = self
            .applications
            .fetch(application_id)?
            .ok_or(StoreError::NotFound)?;
        Ok(record)
    }

    /// Fetch the evaluation attached to an application.
    pub fn get_evaluation(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Evaluation, AdoptionServiceError> {
        let record = self.get_application(application_id)?;
        record
            .evaluation
            .ok_or_else(|| AdoptionServiceError::Invariant("application not yet evaluated".to_string()))
    }

    /// Apply a human reviewer's verdict to a `pending_review` application.
    pub fn record_reviewer_decision(
        &self,
        application_id: &ApplicationId,
        decision: ReviewerDecision,
    ) -> Result<ApplicationRecord, AdoptionServiceError> {
        let record = self.get_application(application_id)?;

        if record.status != ApplicationStatus::PendingReview {
            return Err(AdoptionServiceError::Invariant(format!(
                "reviewer decisions apply to pending_review applications, found '{}'",
                record.status.label()
            )));
        }

        match decision {
            ReviewerDecision::Rejected => {
                let mut rejected = record;
                rejected.status = ApplicationStatus::Rejected;
                self.applications.update(rejected.clone())?;
                info!(application = %rejected.application_id.0, "application rejected by reviewer");
                Ok(rejected)
            }
            ReviewerDecision::Approved => self.approve(record),
        }
    }

    /// Approval side-effect bundle, serialized per cat.
    ///
    /// Order: cat status, tracking tasks, sibling rejection, then the final
    /// status write. A failure partway surfaces `ApprovalIncomplete` and the
    /// application stays `pending_review` so the whole bundle can be retried.
    fn approve(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, AdoptionServiceError> {
        let lock = self.lock_for_cat(&record.cat_id);
        let _guard = lock.lock().expect("cat approval lock poisoned");

        let siblings = self.applications.for_cat(&record.cat_id)?;
        if siblings
            .iter()
            .any(|sibling| sibling.status == ApplicationStatus::Approved)
        {
            return Err(AdoptionServiceError::Invariant(
                "cat already has an approved application".to_string(),
            ));
        }

        let snapshot = self.cats.snapshot(&record.cat_id)?;

        self.cats
            .set_adoption_status(&record.cat_id, AdoptionStatus::Adopted)
            .map_err(|source| AdoptionServiceError::ApprovalIncomplete {
                step: "cat adoption status",
                source: Box::new(source),
            })?;

        self.tracking
            .schedule_for_approval(
                &record.application_id,
                record.submitted_at,
                snapshot.requirements.sterilization_status,
            )
            .map_err(|source| AdoptionServiceError::ApprovalIncomplete {
                step: "tracking task creation",
                source: Box::new(source),
            })?;

        for mut sibling in siblings {
            if sibling.application_id == record.application_id || !sibling.status.is_open() {
                continue;
            }
            sibling.status = ApplicationStatus::Rejected;
            self.applications.update(sibling).map_err(|source| {
                AdoptionServiceError::ApprovalIncomplete {
                    step: "sibling rejection",
                    source: Box::new(source),
                }
            })?;
        }

        let mut approved = record;
        approved.status = ApplicationStatus::Approved;
        self.applications.update(approved.clone()).map_err(|source| {
            AdoptionServiceError::ApprovalIncomplete {
                step: "status write",
                source: Box::new(source),
            }
        })?;

        info!(
            application = %approved.application_id.0,
            cat = %approved.cat_id.0,
            "adoption approved"
        );

        Ok(approved)
    }

    /// Re-run the evaluation pipeline over applications still sitting in
    /// `submitted` (e.g. after an outage left them unevaluated). Items are
    /// scored sequentially with `delay` between backend calls; one failing
    /// item never aborts the rest.
    pub fn evaluate_backlog(
        &self,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApplicationRecord>, AdoptionServiceError> {
        let backlog = self.applications.awaiting_evaluation()?;

        let mut items = Vec::new();
        for record in &backlog {
            let snapshot = self.cats.snapshot(&record.cat_id)?;
            items.push(BatchItem {
                application_id: record.application_id.clone(),
                requirements: snapshot.requirements,
                responses: record.form_responses.clone(),
            });
        }

        let outcomes = self.scorer.score_batch(&items, delay, now);

        let mut updated = Vec::with_capacity(outcomes.len());
        for (record, outcome) in backlog.into_iter().zip(outcomes) {
            debug_assert_eq!(record.application_id, outcome.application_id);
            updated.push(self.apply_evaluation(record, outcome.evaluation)?);
        }

        Ok(updated)
    }

    /// Complete a tracking task through the service facade.
    pub fn complete_tracking_task(
        &self,
        task_id: &super::tracking::TaskId,
        notes: Option<String>,
        certificate_reference: Option<String>,
    ) -> Result<super::tracking::TrackingTask, AdoptionServiceError> {
        self.tracking
            .complete_task(task_id, notes, certificate_reference)
            .map_err(|err| match err {
                TrackingError::AlreadyCompleted => {
                    AdoptionServiceError::Invariant("task already completed".to_string())
                }
                TrackingError::Store(source) => AdoptionServiceError::Store(source),
                TrackingError::Directory(source) => AdoptionServiceError::Directory(source),
            })
    }

    fn lock_for_cat(&self, cat_id: &CatId) -> Arc<Mutex<()>> {
        let mut locks = self.cat_locks.lock().expect("cat lock registry poisoned");
        // An entry only the registry still references belongs to a finished
        // approval and can go.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(cat_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn cat_lock_count(&self) -> usize {
        self.cat_locks.lock().expect("cat lock registry poisoned").len()
    }
}
