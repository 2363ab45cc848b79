#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use reelsmith_api::config::ServerConfig;
use reelsmith_api::registry::RunRegistry;
use reelsmith_api::router::build_app_router;
use reelsmith_api::state::AppState;
use reelsmith_events::EventBus;
use reelsmith_pipeline::{PipelineConfig, PipelineOrchestrator, SoundEffectPlacement};
use reelsmith_provider::{OfflineStageClient, RetryPolicy, StagePolicy};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

/// Pipeline settings with millisecond retry delays.
pub fn pipeline_config(scene_count: u32) -> PipelineConfig {
    PipelineConfig {
        scene_count,
        stage_policy: StagePolicy {
            retry: RetryPolicy {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                ..RetryPolicy::default()
            },
            ..StagePolicy::default()
        },
        sound_effects: SoundEffectPlacement::PerScene,
        ..PipelineConfig::default()
    }
}

/// The router plus the handles tests inspect directly.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub offline: Arc<OfflineStageClient>,
}

/// Build the full application router on top of `offline`, through the same
/// [`build_app_router`] the binary uses.
pub fn build_test_app_with(offline: Arc<OfflineStageClient>, pipeline: PipelineConfig) -> TestApp {
    let config = test_config();
    let orchestrator = PipelineOrchestrator::new(
        offline.clone(),
        pipeline,
        Arc::new(EventBus::default()),
    );
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::new(orchestrator),
        runs: Arc::new(RunRegistry::new()),
    };
    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        offline,
    }
}

/// A three-scene offline app.
pub fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(OfflineStageClient::new(3)), pipeline_config(3))
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a run for `idea` and return its id.
pub async fn start_run(app: Router, idea: &str) -> String {
    let response = post_json(app, "/api/v1/runs", serde_json::json!({ "idea": idea })).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    json["data"]["id"].as_str().unwrap().to_string()
}

/// Poll `GET /api/v1/runs/{id}` until the run reaches `status`.
pub async fn wait_for_status(app: Router, id: &str, status: &str) -> serde_json::Value {
    let uri = format!("/api/v1/runs/{id}");
    for _ in 0..500 {
        let json = body_json(get(app.clone(), &uri).await).await;
        if json["data"]["status"] == status {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {id} never reached status {status}");
}
