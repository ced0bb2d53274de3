use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use katze::adoption::infra::{
    gateway_from_config, MemoryApplicationRepository, MemoryCatDirectory,
    MemoryTrackingRepository,
};
use katze::adoption::{
    adoption_router, answers, ActivityLevel, AdoptionService, AdoptionStatus, ApplicantId,
    CatId, CatRequirements, CatSnapshot, FormResponses, ReviewerDecision, RiskScorer, RuleFilter,
    SterilizationStatus,
};
use katze::config::AppConfig;
use katze::error::AppError;
use katze::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

type Service = AdoptionService<
    MemoryApplicationRepository,
    MemoryCatDirectory,
    MemoryTrackingRepository,
>;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Katze Adoption Service",
    about = "Run the adoption-application evaluation and tracking pipeline",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Re-evaluate applications left in `submitted`, pacing backend calls
    /// with the configured batch delay
    Backlog,
    /// Run a sample adoption workflow offline and print the outcomes
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Backlog => run_backlog(),
        Command::Demo => run_demo(),
    }
}

fn build_service(config: &AppConfig) -> (Arc<Service>, Arc<MemoryCatDirectory>) {
    let applications = Arc::new(MemoryApplicationRepository::default());
    let cats = Arc::new(MemoryCatDirectory::default());
    let tasks = Arc::new(MemoryTrackingRepository::default());
    let scorer = RiskScorer::new(RuleFilter, gateway_from_config(&config.judgment));

    let service = Arc::new(AdoptionService::new(
        applications,
        cats.clone(),
        tasks,
        scorer,
        config.tracking,
    ));

    (service, cats)
}

fn seed_demo_catalog(cats: &MemoryCatDirectory) {
    cats.register(CatSnapshot {
        cat_id: CatId("cat-mishka".to_string()),
        requirements: CatRequirements {
            needs_protective_netting: true,
            requires_large_house: false,
            activity_level: ActivityLevel::Medium,
            sterilization_status: SterilizationStatus::Pending,
        },
        adoption_status: AdoptionStatus::Available,
    });
    cats.register(CatSnapshot {
        cat_id: CatId("cat-felix".to_string()),
        requirements: CatRequirements {
            needs_protective_netting: false,
            requires_large_house: true,
            activity_level: ActivityLevel::High,
            sterilization_status: SterilizationStatus::Sterilized,
        },
        adoption_status: AdoptionStatus::Available,
    });
    cats.register(CatSnapshot {
        cat_id: CatId("cat-luna".to_string()),
        requirements: CatRequirements {
            needs_protective_netting: false,
            requires_large_house: false,
            activity_level: ActivityLevel::Low,
            sterilization_status: SterilizationStatus::NotApplicable,
        },
        adoption_status: AdoptionStatus::Available,
    });
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (service, cats) = build_service(&config);
    seed_demo_catalog(&cats);
    info!("seeded in-memory cat catalog with demo entries");

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(adoption_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "adoption pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_backlog() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let (service, cats) = build_service(&config);
    seed_demo_catalog(&cats);

    let updated = service
        .evaluate_backlog(config.judgment.batch_delay, Utc::now())
        .map_err(AppError::from)?;

    println!("re-evaluated {} application(s)", updated.len());
    for record in &updated {
        print_outcome("Backlog item", record);
    }

    Ok(())
}

fn run_demo() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let (service, cats) = build_service(&config);
    seed_demo_catalog(&cats);

    println!("Adoption pipeline demo (judgment backend offline, deterministic fallback)");

    let now = Utc::now();

    // Kill-switch rejection: breeding intent in the sterilization answer.
    let mut breeder_form = FormResponses::default();
    breeder_form.insert_text(answers::STERILIZATION_POSITION, "we would love kittens");
    breeder_form.insert_flag(answers::HAS_PROTECTIVE_NETTING, true);
    breeder_form.insert_text(answers::MOTIVATION, "Cats are adorable.");

    let rejected = service
        .submit_application(
            CatId("cat-mishka".to_string()),
            ApplicantId("user-ada".to_string()),
            breeder_form,
            now,
        )
        .map_err(AppError::from)?;
    print_outcome("Breeding-intent applicant", &rejected);

    // Clean application: passes the rules, falls back to the review band.
    let mut solid_form = FormResponses::default();
    solid_form.insert_text(answers::STERILIZATION_POSITION, "fully support sterilization");
    solid_form.insert_flag(answers::HAS_PROTECTIVE_NETTING, true);
    solid_form.insert_flag(answers::HAS_EXPERIENCE, true);
    solid_form.insert_flag(answers::HAS_TIME, true);
    solid_form.insert_flag(answers::HAS_SPACE, true);
    solid_form.insert_text(answers::HOUSING_TYPE, "house with a garden");
    solid_form.insert_text(
        answers::MOTIVATION,
        "We lost our senior cat last year and want to give a rescue a calm, permanent home.",
    );

    let pending = service
        .submit_application(
            CatId("cat-mishka".to_string()),
            ApplicantId("user-bo".to_string()),
            solid_form,
            now,
        )
        .map_err(AppError::from)?;
    print_outcome("Experienced applicant", &pending);

    let approved = service
        .record_reviewer_decision(&pending.application_id, ReviewerDecision::Approved)
        .map_err(AppError::from)?;
    print_outcome("After reviewer approval", &approved);

    println!("\nTracking tasks scheduled:");
    let tasks = service
        .tracking()
        .tasks_for_application(&approved.application_id)
        .map_err(|err| AppError::from(katze::adoption::AdoptionServiceError::Store(err)))?;
    for task in tasks {
        println!(
            "- {} due {} ({})",
            task.task_type.label(),
            task.due_date,
            task.status.label()
        );
    }

    Ok(())
}

fn print_outcome(label: &str, record: &katze::adoption::ApplicationRecord) {
    let view = record.status_view();
    println!("\n{label}");
    println!("- application: {}", view.application_id.0);
    println!("- status: {}", view.status);
    match view.score {
        Some(score) => println!("- score: {score}/100"),
        None => println!("- score: not evaluated"),
    }
    println!("- rationale: {}", view.decision_rationale);
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
