//! End-to-end integration tests for the Siloed orchestrator.
//!
//! These tests exercise the full pipeline from user input to persisted task
//! record: configuration, the orchestration loop with delegation, the shared
//! rate limiter, the file store, and the HTTP gateway.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use siloed_config::AppConfig;
use siloed_core::error::ProviderError;
use siloed_core::event::{DomainEvent, EventBus, QuotaKind};
use siloed_core::provider::{GenerateRequest, GenerateResponse, Provider};
use siloed_core::store::TaskStore;
use siloed_core::task::TaskId;
use siloed_gateway::{GatewayState, build_orchestrator, build_router};
use siloed_orchestrator::{LoopSettings, Orchestrator, RateLimiter};
use siloed_store::FileTaskStore;
use tower::ServiceExt;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence,
/// repeating the last one once the script runs out.
struct ScriptedProvider {
    responses: Vec<String>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: responses.iter().map(|r| r.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn inputs(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.input.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);

        let text = self
            .responses
            .get(call)
            .or(self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(GenerateResponse {
            text,
            input_tokens: 10,
            output_tokens: 5,
            model: "e2e-model".into(),
        })
    }
}

fn settings(max_iterations: usize) -> LoopSettings {
    LoopSettings {
        max_iterations,
        delay_after_requests: 0,
        seed: Some(11),
        ..LoopSettings::default()
    }
}

fn generous_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(1_000, 10_000_000, Duration::from_secs(60)))
}

// ── Full pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn delegated_task_is_processed_and_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let primary = Arc::new(ScriptedProvider::new(&[
        "<internal_monologue>plan the sort</internal_monologue>\
         <wizard_task>write a merge sort</wizard_task>",
        "<internal_monologue>needs tests</internal_monologue>\
         <wizard_task>add unit tests</wizard_task><wizard_task>write docs</wizard_task>",
        "<Response_to_User>All set</Response_to_User><tasks>review\nship</tasks>",
    ]));
    let delegate = Arc::new(ScriptedProvider::new(&[
        "<wizard_response>done<code>fn sort() {}</code></wizard_response>",
    ]));

    let orchestrator = Orchestrator::new(
        primary.clone(),
        delegate.clone(),
        generous_limiter(),
        settings(3),
    )
    .with_store(Arc::new(FileTaskStore::new(tmp.path().to_path_buf())));

    let task = orchestrator
        .submit_task(TaskId::from("sort-1"), "Sort my list")
        .await
        .unwrap();

    assert_eq!(primary.calls(), 3);
    assert_eq!(
        delegate.inputs(),
        vec!["write a merge sort", "add unit tests", "write docs"]
    );
    assert_eq!(task.final_result.response_to_user, "All set");
    assert_eq!(task.final_result.tasks, vec!["review", "ship"]);
    assert_eq!(task.delegations.len(), 3);
    assert_eq!(task.delegations[0].parsed.code, "fn sort() {}");
    // 3 primary + 3 delegate calls at 15 tokens each
    assert_eq!(task.total_tokens(), 90);

    // A fresh store over the same directory sees the record
    let reopened = FileTaskStore::new(tmp.path().to_path_buf());
    assert_eq!(reopened.list().await.unwrap(), vec![TaskId::from("sort-1")]);
    let record = reopened.get(&TaskId::from("sort-1")).await.unwrap().unwrap();
    assert_eq!(record.user_input, "Sort my list");
    assert_eq!(record.final_response.response_to_user, "All set");
    assert_eq!(record.iterations.len(), 3);
    assert_eq!(record.iterations[1].extracted_monologue, "needs tests");
}

#[tokio::test]
async fn each_reply_feeds_the_next_pass() {
    let primary = Arc::new(ScriptedProvider::new(&["first", "second", "third"]));
    let orchestrator = Orchestrator::new(
        primary.clone(),
        Arc::new(ScriptedProvider::new(&["unused"])),
        generous_limiter(),
        settings(3),
    );

    orchestrator.submit(TaskId::new(), "start").await.unwrap();
    assert_eq!(primary.inputs(), vec!["start", "first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn quota_waits_are_published_on_the_bus() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let limiter = Arc::new(
        RateLimiter::new(1, 10_000_000, Duration::from_secs(60)).with_event_bus(bus.clone()),
    );
    let orchestrator = Orchestrator::new(
        Arc::new(ScriptedProvider::new(&["x"])),
        Arc::new(ScriptedProvider::new(&["unused"])),
        limiter,
        settings(2),
    )
    .with_event_bus(bus);

    let start = tokio::time::Instant::now();
    orchestrator.submit(TaskId::from("q"), "go").await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));

    let mut waits = Vec::new();
    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        match event.as_ref() {
            DomainEvent::QuotaWait { kind, wait_ms, .. } => waits.push((*kind, *wait_ms)),
            DomainEvent::TaskCompleted { iterations, .. } => completed = *iterations == 2,
            _ => {}
        }
    }
    assert_eq!(waits.len(), 1);
    assert_eq!(waits[0].0, QuotaKind::Requests);
    assert!(waits[0].1 <= 60_000);
    assert!(completed);
}

// ── Configuration ────────────────────────────────────────────────────────

#[test]
fn orchestrator_builds_from_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[primary]
kind = "custom"
model = "my-model"
api_url = "http://127.0.0.1:9/v1"

[orchestrator]
max_iterations = 12
seed = 3
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    let orchestrator = build_orchestrator(
        &config,
        Arc::new(FileTaskStore::new(tmp.path().join("tasks"))),
        Arc::new(EventBus::default()),
    )
    .unwrap();

    assert_eq!(orchestrator.primary_name(), "custom");
    assert_eq!(orchestrator.settings().model, "my-model");
    assert_eq!(orchestrator.settings().max_iterations, 12);
    assert_eq!(orchestrator.settings().seed, Some(3));
}

// ── Gateway ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn gateway_round_trip_with_file_store() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        Arc::new(ScriptedProvider::new(&[
            "<Response_to_User>Hello from the loop</Response_to_User>",
        ])),
        Arc::new(ScriptedProvider::new(&["unused"])),
        generous_limiter(),
        settings(2),
    )
    .with_store(Arc::new(FileTaskStore::new(tmp.path().to_path_buf())));
    let state = Arc::new(GatewayState::new(orchestrator));

    let request = Request::builder()
        .method("POST")
        .uri("/process")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"user_input": "hi", "task_id": "web-1"}).to_string(),
        ))
        .unwrap();
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["response_to_user"], "Hello from the loop");

    assert!(tmp.path().join("task_web-1.json").exists());

    let request = Request::builder()
        .uri("/tasks/web-1")
        .body(Body::empty())
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let record: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(record["task_id"], "web-1");
    assert_eq!(record["final_response"]["response_to_user"], "Hello from the loop");
}
