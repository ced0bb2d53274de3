use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::adoption::domain::{
    answers, ActivityLevel, AdoptionStatus, ApplicantId, CatId, CatRequirements, CatSnapshot,
    FormResponses, SterilizationStatus,
};
use crate::adoption::infra::{
    MemoryApplicationRepository, MemoryCatDirectory, MemoryTrackingRepository,
};
use crate::adoption::rules::RuleFilter;
use crate::adoption::scorer::{JudgmentCallError, JudgmentGateway, JudgmentRequest, RiskScorer};
use crate::adoption::service::AdoptionService;
use crate::config::TrackingPolicy;

pub(super) type TestService = AdoptionService<
    MemoryApplicationRepository,
    MemoryCatDirectory,
    MemoryTrackingRepository,
>;

/// Scripted judgment backend double: hands out queued responses and counts
/// calls so tests can assert the rule filter short-circuits.
#[derive(Debug, Default)]
pub(super) struct ScriptedGateway {
    responses: Mutex<VecDeque<Result<Value, JudgmentCallError>>>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub(super) fn queue_ok(&self, payload: Value) {
        self.responses
            .lock()
            .expect("gateway script poisoned")
            .push_back(Ok(payload));
    }

    pub(super) fn queue_err(&self, error: JudgmentCallError) {
        self.responses
            .lock()
            .expect("gateway script poisoned")
            .push_back(Err(error));
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl JudgmentGateway for Arc<ScriptedGateway> {
    fn judge(&self, _request: &JudgmentRequest<'_>) -> Result<Value, JudgmentCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .expect("gateway script poisoned")
            .pop_front()
            .unwrap_or(Err(JudgmentCallError::Disabled))
    }
}

pub(super) fn submitted_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("valid instant")
}

pub(super) fn requirements() -> CatRequirements {
    CatRequirements {
        needs_protective_netting: false,
        requires_large_house: false,
        activity_level: ActivityLevel::Medium,
        sterilization_status: SterilizationStatus::Pending,
    }
}

pub(super) fn netting_requirements() -> CatRequirements {
    CatRequirements {
        needs_protective_netting: true,
        ..requirements()
    }
}

pub(super) fn large_house_requirements() -> CatRequirements {
    CatRequirements {
        requires_large_house: true,
        ..requirements()
    }
}

/// A form with every answer an ideal applicant would give.
pub(super) fn ideal_form() -> FormResponses {
    let mut form = FormResponses::default();
    form.insert_text(
        answers::STERILIZATION_POSITION,
        "fully committed to sterilization",
    );
    form.insert_flag(answers::HAS_PROTECTIVE_NETTING, true);
    form.insert_text(answers::HOUSING_TYPE, "house with a garden");
    form.insert_flag(answers::HAS_EXPERIENCE, true);
    form.insert_flag(answers::HAS_TIME, true);
    form.insert_flag(answers::HAS_SPACE, true);
    form.insert_text(
        answers::MOTIVATION,
        "We want to give a rescued cat a calm and permanent home with daily care.",
    );
    form
}

pub(super) fn review_payload(score: i64) -> Value {
    json!({
        "decision": "REVIEW",
        "score": score,
        "reason": null,
        "flags": ["detailed motivation"],
        "risk_breakdown": {
            "sterilization": "PASS - applicant supports the policy",
            "overall": "average candidate, human review required"
        }
    })
}

pub(super) fn cat(id: &str, requirements: CatRequirements) -> CatSnapshot {
    CatSnapshot {
        cat_id: CatId(id.to_string()),
        requirements,
        adoption_status: AdoptionStatus::Available,
    }
}

pub(super) fn applicant(id: &str) -> ApplicantId {
    ApplicantId(id.to_string())
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) applications: Arc<MemoryApplicationRepository>,
    pub(super) cats: Arc<MemoryCatDirectory>,
    pub(super) tasks: Arc<MemoryTrackingRepository>,
    pub(super) gateway: Arc<ScriptedGateway>,
}

pub(super) fn build_harness() -> Harness {
    let applications = Arc::new(MemoryApplicationRepository::default());
    let cats = Arc::new(MemoryCatDirectory::default());
    let tasks = Arc::new(MemoryTrackingRepository::default());
    let gateway = Arc::new(ScriptedGateway::default());

    let scorer = RiskScorer::new(RuleFilter, Box::new(gateway.clone()));
    let service = Arc::new(AdoptionService::new(
        applications.clone(),
        cats.clone(),
        tasks.clone(),
        scorer,
        TrackingPolicy::default(),
    ));

    Harness {
        service,
        applications,
        cats,
        tasks,
        gateway,
    }
}
