use std::sync::Arc;

use chrono::NaiveDate;

use super::common::{applicant, submitted_at};
use crate::adoption::domain::{
    ActivityLevel, AdoptionStatus, ApplicationId, ApplicationStatus, CatId, CatRequirements,
    CatSnapshot, FormResponses, SterilizationStatus,
};
use crate::adoption::infra::{
    MemoryApplicationRepository, MemoryCatDirectory, MemoryTrackingRepository,
};
use crate::adoption::repository::{
    ApplicationRecord, ApplicationRepository, CatDirectory, StoreError, TrackingRepository,
};
use crate::adoption::tracking::{TaskId, TaskStatus, TaskType, TrackingError, TrackingScheduler, TrackingTask};
use crate::config::TrackingPolicy;

struct Fixture {
    scheduler: TrackingScheduler<
        MemoryApplicationRepository,
        MemoryCatDirectory,
        MemoryTrackingRepository,
    >,
    applications: Arc<MemoryApplicationRepository>,
    cats: Arc<MemoryCatDirectory>,
}

fn fixture() -> Fixture {
    let applications = Arc::new(MemoryApplicationRepository::default());
    let cats = Arc::new(MemoryCatDirectory::default());
    let tasks = Arc::new(MemoryTrackingRepository::default());
    let scheduler = TrackingScheduler::new(
        applications.clone(),
        cats.clone(),
        tasks,
        TrackingPolicy::default(),
    );

    Fixture {
        scheduler,
        applications,
        cats,
    }
}

fn seed_application(fixture: &Fixture, application_id: &str, cat_id: &str) -> ApplicationId {
    let id = ApplicationId(application_id.to_string());
    fixture
        .applications
        .insert(ApplicationRecord {
            application_id: id.clone(),
            cat_id: CatId(cat_id.to_string()),
            applicant_id: applicant("user-1"),
            form_responses: FormResponses::default(),
            status: ApplicationStatus::Approved,
            evaluation: None,
            submitted_at: submitted_at(),
        })
        .expect("store reachable");
    id
}

fn seed_cat(fixture: &Fixture, cat_id: &str, sterilization: SterilizationStatus) {
    fixture.cats.register(CatSnapshot {
        cat_id: CatId(cat_id.to_string()),
        requirements: CatRequirements {
            needs_protective_netting: false,
            requires_large_house: false,
            activity_level: ActivityLevel::Medium,
            sterilization_status: sterilization,
        },
        adoption_status: AdoptionStatus::Adopted,
    });
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

#[test]
fn pending_sterilization_schedules_both_tasks() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t1", "cat-1");

    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Pending)
        .expect("scheduling should succeed");

    assert_eq!(created.len(), 2);

    let welfare = created
        .iter()
        .find(|task| task.task_type == TaskType::WelfareCheck)
        .expect("welfare check scheduled");
    assert_eq!(welfare.due_date, date(2025, 7, 1));
    assert_eq!(welfare.status, TaskStatus::Pending);

    let followup = created
        .iter()
        .find(|task| task.task_type == TaskType::SterilizationFollowup)
        .expect("sterilization follow-up scheduled");
    assert_eq!(followup.due_date, date(2025, 10, 1));
}

#[test]
fn sterilized_cat_gets_only_the_welfare_check() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t2", "cat-1");

    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Sterilized)
        .expect("scheduling should succeed");

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].task_type, TaskType::WelfareCheck);
}

#[test]
fn not_applicable_sterilization_also_skips_the_followup() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t3", "cat-1");

    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::NotApplicable)
        .expect("scheduling should succeed");

    assert_eq!(created.len(), 1);
}

#[test]
fn sweep_flips_only_past_due_pending_tasks() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t4", "cat-1");
    fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Pending)
        .expect("scheduling should succeed");

    // welfare due 2025-07-01, follow-up due 2025-10-01
    let flipped = fixture
        .scheduler
        .sweep_overdue(date(2025, 8, 1))
        .expect("sweep should succeed");
    assert_eq!(flipped, 1);

    let tasks = fixture
        .scheduler
        .tasks_for_application(&id)
        .expect("store reachable");
    assert_eq!(tasks[0].status, TaskStatus::Overdue);
    assert_eq!(tasks[1].status, TaskStatus::Pending);
}

#[test]
fn sweep_is_idempotent() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t5", "cat-1");
    fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Pending)
        .expect("scheduling should succeed");

    let first = fixture
        .scheduler
        .sweep_overdue(date(2026, 1, 1))
        .expect("sweep should succeed");
    assert_eq!(first, 2);

    let second = fixture
        .scheduler
        .sweep_overdue(date(2026, 1, 1))
        .expect("sweep should succeed");
    assert_eq!(second, 0);
}

#[test]
fn task_due_exactly_today_is_not_overdue() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t6", "cat-1");
    fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Sterilized)
        .expect("scheduling should succeed");

    let flipped = fixture
        .scheduler
        .sweep_overdue(date(2025, 7, 1))
        .expect("sweep should succeed");
    assert_eq!(flipped, 0);
}

#[test]
fn completion_records_notes_and_reference() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t7", "cat-1");
    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Sterilized)
        .expect("scheduling should succeed");

    let completed = fixture
        .scheduler
        .complete_task(
            &created[0].task_id,
            Some("cat settled in well".to_string()),
            None,
        )
        .expect("completion should succeed");

    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.notes.as_deref(), Some("cat settled in well"));
}

#[test]
fn completing_twice_is_refused() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t8", "cat-1");
    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Sterilized)
        .expect("scheduling should succeed");

    fixture
        .scheduler
        .complete_task(&created[0].task_id, None, None)
        .expect("first completion should succeed");

    let result = fixture.scheduler.complete_task(&created[0].task_id, None, None);
    assert!(matches!(result, Err(TrackingError::AlreadyCompleted)));
}

#[test]
fn sterilization_completion_updates_the_cat() {
    let fixture = fixture();
    seed_cat(&fixture, "cat-1", SterilizationStatus::Pending);
    let id = seed_application(&fixture, "app-t9", "cat-1");
    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Pending)
        .expect("scheduling should succeed");

    let followup = created
        .iter()
        .find(|task| task.task_type == TaskType::SterilizationFollowup)
        .expect("follow-up scheduled");

    let completed = fixture
        .scheduler
        .complete_task(
            &followup.task_id,
            Some("procedure done at clinic".to_string()),
            Some("cert-2025-0042".to_string()),
        )
        .expect("completion should succeed");
    assert_eq!(completed.certificate_reference.as_deref(), Some("cert-2025-0042"));

    let snapshot = fixture
        .cats
        .snapshot(&CatId("cat-1".to_string()))
        .expect("cat exists");
    assert_eq!(
        snapshot.requirements.sterilization_status,
        SterilizationStatus::Sterilized
    );
}

#[test]
fn overdue_task_can_still_be_completed() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t10", "cat-1");
    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Sterilized)
        .expect("scheduling should succeed");

    fixture
        .scheduler
        .sweep_overdue(date(2026, 1, 1))
        .expect("sweep should succeed");

    let completed = fixture
        .scheduler
        .complete_task(&created[0].task_id, Some("late but done".to_string()), None)
        .expect("completion should succeed");
    assert_eq!(completed.status, TaskStatus::Completed);
}

/// Store that completes every scanned task right after the scan returns,
/// interleaving a completion between the sweep's read and its write.
struct CompletingDuringScanStore {
    inner: MemoryTrackingRepository,
}

impl TrackingRepository for CompletingDuringScanStore {
    fn insert(&self, task: TrackingTask) -> Result<TrackingTask, StoreError> {
        self.inner.insert(task)
    }

    fn update(&self, task: TrackingTask) -> Result<(), StoreError> {
        self.inner.update(task)
    }

    fn fetch(&self, id: &TaskId) -> Result<Option<TrackingTask>, StoreError> {
        self.inner.fetch(id)
    }

    fn for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<TrackingTask>, StoreError> {
        self.inner.for_application(application_id)
    }

    fn pending_due_before(&self, today: NaiveDate) -> Result<Vec<TrackingTask>, StoreError> {
        let due = self.inner.pending_due_before(today)?;
        for task in &due {
            let mut completed = task.clone();
            completed.status = TaskStatus::Completed;
            self.inner.update(completed)?;
        }
        Ok(due)
    }
}

#[test]
fn completion_between_scan_and_write_wins_over_the_sweep() {
    let applications = Arc::new(MemoryApplicationRepository::default());
    let cats = Arc::new(MemoryCatDirectory::default());
    let tasks = Arc::new(CompletingDuringScanStore {
        inner: MemoryTrackingRepository::default(),
    });
    let scheduler =
        TrackingScheduler::new(applications, cats, tasks, TrackingPolicy::default());

    let id = ApplicationId("app-race".to_string());
    scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Sterilized)
        .expect("scheduling should succeed");

    let flipped = scheduler
        .sweep_overdue(date(2026, 1, 1))
        .expect("sweep should succeed");
    assert_eq!(flipped, 0);

    let refreshed = scheduler
        .tasks_for_application(&id)
        .expect("store reachable");
    assert_eq!(refreshed[0].status, TaskStatus::Completed);
}

#[test]
fn completed_tasks_survive_later_sweeps() {
    let fixture = fixture();
    let id = seed_application(&fixture, "app-t11", "cat-1");
    let created = fixture
        .scheduler
        .schedule_for_approval(&id, submitted_at(), SterilizationStatus::Sterilized)
        .expect("scheduling should succeed");

    fixture
        .scheduler
        .complete_task(&created[0].task_id, None, None)
        .expect("completion should succeed");

    let flipped = fixture
        .scheduler
        .sweep_overdue(date(2026, 1, 1))
        .expect("sweep should succeed");
    assert_eq!(flipped, 0);

    let tasks = fixture
        .scheduler
        .tasks_for_application(&id)
        .expect("store reachable");
    assert_eq!(tasks[0].status, TaskStatus::Completed);
}
