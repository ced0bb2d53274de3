use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicantId, ApplicationId, CatId, FormResponses, ReviewerDecision};
use super::repository::{
    ApplicationRepository, CatDirectory, DirectoryError, StoreError, TrackingRepository,
};
use super::service::{AdoptionService, AdoptionServiceError};
use super::tracking::TaskId;

/// Router builder exposing HTTP endpoints for the adoption pipeline.
pub fn adoption_router<A, C, T>(service: Arc<AdoptionService<A, C, T>>) -> Router
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/adoption/cats/:cat_id/applications",
            post(submit_handler::<A, C, T>),
        )
        .route(
            "/api/v1/adoption/applications/:application_id",
            get(status_handler::<A, C, T>),
        )
        .route(
            "/api/v1/adoption/applications/:application_id/evaluation",
            get(evaluation_handler::<A, C, T>),
        )
        .route(
            "/api/v1/adoption/applications/:application_id/decision",
            post(decision_handler::<A, C, T>),
        )
        .route(
            "/api/v1/adoption/tasks/:task_id/complete",
            post(complete_task_handler::<A, C, T>),
        )
        .route(
            "/api/v1/adoption/tasks/sweep",
            post(sweep_handler::<A, C, T>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    applicant_id: String,
    form_responses: FormResponses,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    decision: ReviewerDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteTaskRequest {
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    certificate_reference: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct SweepRequest {
    #[serde(default)]
    today: Option<NaiveDate>,
}

fn error_response(error: AdoptionServiceError) -> Response {
    let status = match &error {
        AdoptionServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdoptionServiceError::Store(StoreError::NotFound)
        | AdoptionServiceError::Directory(DirectoryError::NotFound) => StatusCode::NOT_FOUND,
        AdoptionServiceError::Store(StoreError::Conflict)
        | AdoptionServiceError::Invariant(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<A, C, T>(
    State(service): State<Arc<AdoptionService<A, C, T>>>,
    Path(cat_id): Path<String>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    let submitted = service.submit_application(
        CatId(cat_id),
        ApplicantId(request.applicant_id),
        request.form_responses,
        Utc::now(),
    );

    match submitted {
        Ok(record) => (StatusCode::CREATED, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<A, C, T>(
    State(service): State<Arc<AdoptionService<A, C, T>>>,
    Path(application_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    match service.get_application(&ApplicationId(application_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn evaluation_handler<A, C, T>(
    State(service): State<Arc<AdoptionService<A, C, T>>>,
    Path(application_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    match service.get_evaluation(&ApplicationId(application_id)) {
        Ok(evaluation) => (StatusCode::OK, axum::Json(evaluation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decision_handler<A, C, T>(
    State(service): State<Arc<AdoptionService<A, C, T>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    match service.record_reviewer_decision(&ApplicationId(application_id), request.decision) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn complete_task_handler<A, C, T>(
    State(service): State<Arc<AdoptionService<A, C, T>>>,
    Path(task_id): Path<String>,
    axum::Json(request): axum::Json<CompleteTaskRequest>,
) -> Response
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    let completed = service.complete_tracking_task(
        &TaskId(task_id),
        request.notes,
        request.certificate_reference,
    );

    match completed {
        Ok(task) => (StatusCode::OK, axum::Json(task)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn sweep_handler<A, C, T>(
    State(service): State<Arc<AdoptionService<A, C, T>>>,
    request: Option<axum::Json<SweepRequest>>,
) -> Response
where
    A: ApplicationRepository + 'static,
    C: CatDirectory + 'static,
    T: TrackingRepository + 'static,
{
    // the body is optional; a bare POST sweeps as of today
    let request = request.map(|axum::Json(request)| request).unwrap_or_default();
    let today = request.today.unwrap_or_else(|| Utc::now().date_naive());
    match service.tracking().sweep_overdue(today) {
        Ok(count) => (
            StatusCode::OK,
            axum::Json(json!({ "marked_overdue": count })),
        )
            .into_response(),
        Err(error) => error_response(AdoptionServiceError::Store(error)),
    }
}
