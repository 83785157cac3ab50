//! HTTP API gateway for Siloed.
//!
//! Exposes task submission, history, record lookup, out-of-band answers to
//! pending questions, cancellation, and health/status endpoints.
//!
//! Built on Axum; every route shares one [`Orchestrator`] and therefore one
//! rate limiter.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siloed_config::{AppConfig, ConfigError};
use siloed_core::event::EventBus;
use siloed_core::store::TaskStore;
use siloed_core::task::{StructuredResult, TaskId, TaskRecord};
use siloed_core::Error;
use siloed_orchestrator::{AnswerBoard, LoopSettings, Orchestrator, RateLimitSnapshot, RateLimiter};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub answers: Arc<AnswerBoard>,
}

impl GatewayState {
    /// Wrap an orchestrator, routing its questions to a fresh [`AnswerBoard`].
    pub fn new(orchestrator: Orchestrator) -> Self {
        let answers = Arc::new(AnswerBoard::new());
        Self {
            orchestrator: Arc::new(orchestrator.with_interaction(answers.clone())),
            answers,
        }
    }
}

type SharedState = Arc<GatewayState>;

/// Error body: `(status, {"error": "..."})`.
type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build an orchestrator from configuration.
///
/// The rate limiter publishes quota waits on `event_bus`.
pub fn build_orchestrator(
    config: &AppConfig,
    store: Arc<dyn TaskStore>,
    event_bus: Arc<EventBus>,
) -> Result<Orchestrator, ConfigError> {
    let primary = siloed_providers::build_from_config(&config.primary, &config.retry)?;
    let delegate = siloed_providers::build_from_config(&config.delegate, &config.retry)?;
    let limiter =
        Arc::new(RateLimiter::from_config(&config.rate_limit).with_event_bus(event_bus.clone()));

    Ok(
        Orchestrator::new(primary, delegate, limiter, LoopSettings::from_config(config))
            .with_store(store)
            .with_event_bus(event_bus),
    )
}

/// Build the Axum router with all gateway routes.
///
/// Layers: permissive CORS, 1 MB request body limit, HTTP trace logging.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/process", post(process_handler))
        .route("/task-history", get(history_handler))
        .route("/tasks/{id}", get(task_handler))
        .route("/tasks/{id}/questions", get(questions_handler))
        .route("/tasks/{id}/answer", post(answer_handler))
        .route("/tasks/{id}/cancel", post(cancel_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server with file-backed task records.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = siloed_store::open(&config.storage.dir);
    serve(config, store).await
}

/// Start the gateway HTTP server with the given record store.
pub async fn serve(
    config: AppConfig,
    store: Arc<dyn TaskStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let orchestrator = build_orchestrator(&config, store, Arc::new(EventBus::default()))?;
    let state = Arc::new(GatewayState::new(orchestrator));

    info!(
        addr = %addr,
        provider = state.orchestrator.primary_name(),
        model = %config.primary.model,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

// --- DTOs ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub user_input: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub task_id: String,
    #[serde(flatten)]
    pub result: StructuredResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub tasks: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionsResponse {
    pub questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub active_tasks: Vec<String>,
    pub rate_limit: RateLimitSnapshot,
}

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::TaskAlreadyRunning(_) | Error::Cancelled(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// --- Handlers ---

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        provider: state.orchestrator.primary_name().to_string(),
        timestamp: Utc::now(),
    })
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        active_tasks: state
            .orchestrator
            .active_tasks()
            .into_iter()
            .map(|id| id.0)
            .collect(),
        rate_limit: state.orchestrator.limiter().snapshot(),
    })
}

async fn process_handler(
    State(state): State<SharedState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let task_id = req.task_id.map(TaskId).unwrap_or_default();
    info!(
        task_id = %task_id,
        input_len = req.user_input.len(),
        "Task submitted"
    );

    match state.orchestrator.submit(task_id.clone(), &req.user_input).await {
        Ok(result) => Ok(Json(ProcessResponse {
            task_id: task_id.0,
            result,
        })),
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Task processing failed");
            Err(api_error(e))
        }
    }
}

async fn history_handler(
    State(state): State<SharedState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let ids = state.orchestrator.history().await.map_err(api_error)?;
    Ok(Json(HistoryResponse {
        tasks: ids.into_iter().map(|id| HistoryEntry { id: id.0 }).collect(),
    }))
}

async fn task_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    match state.orchestrator.record(&TaskId(id)).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Task not found".into(),
            }),
        )),
        Err(e) => Err(api_error(e)),
    }
}

async fn questions_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<QuestionsResponse>, StatusCode> {
    state
        .answers
        .pending(&TaskId(id))
        .map(|questions| Json(QuestionsResponse { questions }))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn answer_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> StatusCode {
    let task_id = TaskId(id);
    if state.answers.answer(&task_id, req.answer) {
        info!(task_id = %task_id, "Answer delivered");
        StatusCode::NO_CONTENT
    } else {
        warn!(task_id = %task_id, "Answer for a task with no pending questions");
        StatusCode::NOT_FOUND
    }
}

async fn cancel_handler(State(state): State<SharedState>, Path(id): Path<String>) -> StatusCode {
    if state.orchestrator.cancel(&TaskId(id)) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
