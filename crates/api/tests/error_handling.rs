//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no router is
//! involved.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use reelsmith_api::error::AppError;
use reelsmith_core::{CoreError, SceneIndex, Stage};
use reelsmith_pipeline::PipelineError;
use reelsmith_provider::StageError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: AppError::NotFound maps to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::NotFound {
        entity: "Run",
        id: "42".to_string(),
    };

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Run with id 42 not found");
}

// ---------------------------------------------------------------------------
// Test: validation errors are shown; bookkeeping errors are not
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("idea must not be empty".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "idea must not be empty");
}

#[tokio::test]
async fn bookkeeping_error_hides_details() {
    let err = AppError::Pipeline(PipelineError::Bookkeeping(CoreError::ArtifactNotFound {
        scene: SceneIndex::FIRST,
        kind: reelsmith_core::ArtifactKind::SceneVideo,
    }));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Test: stage failures map to gateway errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stage_timeout_returns_504() {
    let err = AppError::Pipeline(PipelineError::StageCallFailed {
        stage: Stage::GenerateVideo,
        source: StageError::Timeout {
            stage: Stage::GenerateVideo,
            after: Duration::from_secs(600),
        },
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["code"], "STAGE_TIMEOUT");
}

#[tokio::test]
async fn stage_api_error_returns_502() {
    let err = AppError::Pipeline(PipelineError::StageCallFailed {
        stage: Stage::Storyboard,
        source: StageError::Api {
            status: 500,
            body: "boom".into(),
        },
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "STAGE_FAILED");
    assert!(json["error"].as_str().unwrap().contains("storyboard"));
}

// ---------------------------------------------------------------------------
// Test: merge failures list every unreadable input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn merge_failure_lists_unreadable_inputs() {
    let err = AppError::Pipeline(PipelineError::MergeFailed {
        unreadable: vec!["a.mp4".into(), "c.mp4".into()],
        reason: "inputs could not be read".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "MERGE_FAILED");
    assert_eq!(
        json["error"],
        "Merge failed: inputs could not be read (a.mp4, c.mp4)"
    );
}

// ---------------------------------------------------------------------------
// Test: conflicts and cancellations map to 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conflict_error_returns_409() {
    let (status, json) = error_to_response(AppError::Conflict("run is running".into())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(json["error"], "run is running");

    let (status, json) = error_to_response(AppError::Pipeline(PipelineError::Cancelled)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CANCELLED");
}
