//! In-memory infrastructure used by the binary and the test suites. The
//! production deployment swaps these for database-backed implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::warn;

use super::domain::{AdoptionStatus, ApplicationId, ApplicationStatus, CatId, CatSnapshot, SterilizationStatus};
use super::repository::{
    ApplicationRecord, ApplicationRepository, CatDirectory, DirectoryError, StoreError,
    TrackingRepository,
};
use super::scorer::{JudgmentCallError, JudgmentGateway, JudgmentRequest};
use super::tracking::{TaskId, TaskStatus, TrackingTask};

#[derive(Default, Clone)]
pub struct MemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl ApplicationRepository for MemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError> {
        let mut guard = self.records.lock().expect("application store poisoned");
        if guard.contains_key(&record.application_id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("application store poisoned");
        if !guard.contains_key(&record.application_id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(record.application_id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("application store poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_cat(&self, cat_id: &CatId) -> Result<Vec<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("application store poisoned");
        Ok(guard
            .values()
            .filter(|record| &record.cat_id == cat_id)
            .cloned()
            .collect())
    }

    fn awaiting_evaluation(&self) -> Result<Vec<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("application store poisoned");
        let mut backlog: Vec<ApplicationRecord> = guard
            .values()
            .filter(|record| {
                record.status == ApplicationStatus::Submitted && record.evaluation.is_none()
            })
            .cloned()
            .collect();
        backlog.sort_by_key(|record| record.submitted_at);
        Ok(backlog)
    }
}

#[derive(Default, Clone)]
pub struct MemoryCatDirectory {
    cats: Arc<Mutex<HashMap<CatId, CatSnapshot>>>,
}

impl MemoryCatDirectory {
    pub fn register(&self, snapshot: CatSnapshot) {
        let mut guard = self.cats.lock().expect("cat directory poisoned");
        guard.insert(snapshot.cat_id.clone(), snapshot);
    }
}

impl CatDirectory for MemoryCatDirectory {
    fn snapshot(&self, cat_id: &CatId) -> Result<CatSnapshot, DirectoryError> {
        let guard = self.cats.lock().expect("cat directory poisoned");
        guard.get(cat_id).cloned().ok_or(DirectoryError::NotFound)
    }

    fn set_adoption_status(
        &self,
        cat_id: &CatId,
        status: AdoptionStatus,
    ) -> Result<(), DirectoryError> {
        let mut guard = self.cats.lock().expect("cat directory poisoned");
        let snapshot = guard.get_mut(cat_id).ok_or(DirectoryError::NotFound)?;
        snapshot.adoption_status = status;
        Ok(())
    }

    fn set_sterilization_status(
        &self,
        cat_id: &CatId,
        status: SterilizationStatus,
    ) -> Result<(), DirectoryError> {
        let mut guard = self.cats.lock().expect("cat directory poisoned");
        let snapshot = guard.get_mut(cat_id).ok_or(DirectoryError::NotFound)?;
        snapshot.requirements.sterilization_status = status;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct MemoryTrackingRepository {
    tasks: Arc<Mutex<HashMap<TaskId, TrackingTask>>>,
}

impl TrackingRepository for MemoryTrackingRepository {
    fn insert(&self, task: TrackingTask) -> Result<TrackingTask, StoreError> {
        let mut guard = self.tasks.lock().expect("tracking store poisoned");
        if guard.contains_key(&task.task_id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    fn update(&self, task: TrackingTask) -> Result<(), StoreError> {
        let mut guard = self.tasks.lock().expect("tracking store poisoned");
        if !guard.contains_key(&task.task_id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(task.task_id.clone(), task);
        Ok(())
    }

    fn fetch(&self, id: &TaskId) -> Result<Option<TrackingTask>, StoreError> {
        let guard = self.tasks.lock().expect("tracking store poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<TrackingTask>, StoreError> {
        let guard = self.tasks.lock().expect("tracking store poisoned");
        let mut tasks: Vec<TrackingTask> = guard
            .values()
            .filter(|task| &task.application_id == application_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.due_date);
        Ok(tasks)
    }

    fn pending_due_before(&self, today: NaiveDate) -> Result<Vec<TrackingTask>, StoreError> {
        let guard = self.tasks.lock().expect("tracking store poisoned");
        Ok(guard
            .values()
            .filter(|task| task.status == TaskStatus::Pending && task.due_date < today)
            .cloned()
            .collect())
    }
}

/// Gateway used when no judgment API key is configured: every call reports
/// the backend as disabled so the scorer's deterministic fallback answers.
#[derive(Debug, Default)]
pub struct OfflineJudgmentGateway;

impl JudgmentGateway for OfflineJudgmentGateway {
    fn judge(&self, _request: &JudgmentRequest<'_>) -> Result<Value, JudgmentCallError> {
        Err(JudgmentCallError::Disabled)
    }
}

/// Pick the judgment gateway for this process. Vendor clients register here;
/// this build ships only the offline gateway, so a configured key still runs
/// on the deterministic fallback.
pub fn gateway_from_config(config: &crate::config::JudgmentConfig) -> Box<dyn JudgmentGateway> {
    if config.api_key.is_some() {
        warn!("JUDGMENT_API_KEY is set but no vendor judgment client is linked; using the deterministic fallback");
    } else {
        warn!("JUDGMENT_API_KEY not configured; evaluations run on the deterministic fallback");
    }
    Box::new(OfflineJudgmentGateway)
}
