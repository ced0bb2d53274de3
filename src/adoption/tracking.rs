use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{ApplicationId, CatId, SterilizationStatus};
use super::repository::{
    ApplicationRepository, CatDirectory, DirectoryError, StoreError, TrackingRepository,
};
use crate::config::TrackingPolicy;

/// Identifier wrapper for tracking tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

/// Kinds of post-adoption follow-up obligations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    WelfareCheck,
    SterilizationFollowup,
}

impl TaskType {
    pub const fn label(self) -> &'static str {
        match self {
            TaskType::WelfareCheck => "welfare_check",
            TaskType::SterilizationFollowup => "sterilization_followup",
        }
    }
}

/// Task lifecycle. `Completed` is terminal and never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Overdue,
    Completed,
}

impl TaskStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Overdue => "overdue",
            TaskStatus::Completed => "completed",
        }
    }
}

/// Scheduled post-adoption follow-up with a due date and completion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingTask {
    pub task_id: TaskId,
    pub application_id: ApplicationId,
    pub task_type: TaskType,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub notes: Option<String>,
    pub certificate_reference: Option<String>,
}

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    let id = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TaskId(format!("task-{id:06}"))
}

/// Error raised by tracking operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("task already completed")]
    AlreadyCompleted,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Creates, ages, and completes post-adoption tracking tasks.
///
/// Task creation happens only through the approval path; the overdue sweep
/// and completion can be driven from anywhere and are safe to interleave.
pub struct TrackingScheduler<A, C, T> {
    applications: Arc<A>,
    cats: Arc<C>,
    tasks: Arc<T>,
    policy: TrackingPolicy,
}

impl<A, C, T> TrackingScheduler<A, C, T>
where
    A: ApplicationRepository,
    C: CatDirectory,
    T: TrackingRepository,
{
    pub fn new(applications: Arc<A>, cats: Arc<C>, tasks: Arc<T>, policy: TrackingPolicy) -> Self {
        Self {
            applications,
            cats,
            tasks,
            policy,
        }
    }

    pub fn policy(&self) -> TrackingPolicy {
        self.policy
    }

    /// Create the follow-up task set for a freshly approved application.
    ///
    /// Exactly one welfare check per approval; a sterilization follow-up only
    /// when the cat's sterilization was still pending at approval time. Due
    /// dates are anchored on the submission time of the application.
    pub fn schedule_for_approval(
        &self,
        application_id: &ApplicationId,
        submitted_at: DateTime<Utc>,
        sterilization_status: SterilizationStatus,
    ) -> Result<Vec<TrackingTask>, StoreError> {
        let anchor = submitted_at.date_naive();
        let mut created = Vec::new();

        let welfare = self.tasks.insert(TrackingTask {
            task_id: next_task_id(),
            application_id: application_id.clone(),
            task_type: TaskType::WelfareCheck,
            due_date: add_months(anchor, self.policy.welfare_months),
            status: TaskStatus::Pending,
            notes: None,
            certificate_reference: None,
        })?;
        created.push(welfare);

        if sterilization_status == SterilizationStatus::Pending {
            let followup = self.tasks.insert(TrackingTask {
                task_id: next_task_id(),
                application_id: application_id.clone(),
                task_type: TaskType::SterilizationFollowup,
                due_date: add_months(anchor, self.policy.sterilization_months),
                status: TaskStatus::Pending,
                notes: None,
                certificate_reference: None,
            })?;
            created.push(followup);
        }

        info!(
            application = %application_id.0,
            tasks = created.len(),
            "tracking tasks scheduled for approved adoption"
        );

        Ok(created)
    }

    /// Transition every pending task past its due date to overdue.
    ///
    /// Idempotent: a second sweep with the same date finds nothing left to
    /// move, and completed tasks are never touched.
    pub fn sweep_overdue(&self, today: NaiveDate) -> Result<usize, StoreError> {
        let due = self.tasks.pending_due_before(today)?;
        let mut flipped = 0;

        for task in due {
            // Re-read from the store before writing; a completion that
            // committed after the scan keeps the task completed.
            let mut current = match self.tasks.fetch(&task.task_id)? {
                Some(current) => current,
                None => continue,
            };
            if current.status != TaskStatus::Pending {
                continue;
            }
            current.status = TaskStatus::Overdue;
            self.tasks.update(current)?;
            flipped += 1;
        }

        if flipped > 0 {
            info!(count = flipped, "tracking tasks marked overdue");
        }

        Ok(flipped)
    }

    /// Complete a pending or overdue task, recording notes and an optional
    /// certificate reference. Completing a sterilization follow-up also
    /// propagates the sterilized status back to the cat.
    pub fn complete_task(
        &self,
        task_id: &TaskId,
        notes: Option<String>,
        certificate_reference: Option<String>,
    ) -> Result<TrackingTask, TrackingError> {
        let mut task = self
            .tasks
            .fetch(task_id)?
            .ok_or(StoreError::NotFound)?;

        if task.status == TaskStatus::Completed {
            return Err(TrackingError::AlreadyCompleted);
        }

        task.status = TaskStatus::Completed;
        task.notes = notes;
        task.certificate_reference = certificate_reference;
        self.tasks.update(task.clone())?;

        if task.task_type == TaskType::SterilizationFollowup {
            let cat_id = self.cat_for_application(&task.application_id)?;
            self.cats
                .set_sterilization_status(&cat_id, SterilizationStatus::Sterilized)?;
            info!(task = %task.task_id.0, cat = %cat_id.0, "sterilization confirmed");
        }

        Ok(task)
    }

    /// Tasks created for one application, ordered by due date.
    pub fn tasks_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<TrackingTask>, StoreError> {
        self.tasks.for_application(application_id)
    }

    fn cat_for_application(&self, application_id: &ApplicationId) -> Result<CatId, TrackingError> {
        let record = self
            .applications
            .fetch(application_id)?
            .ok_or(StoreError::NotFound)?;
        Ok(record.cat_id)
    }
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}
