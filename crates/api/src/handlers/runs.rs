//! Handlers for the `/runs` resource.
//!
//! Runs execute in background tasks; every handler here returns immediately
//! with a snapshot of the run.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use reelsmith_core::{
    Artifact, ArtifactRef, Character, CoreError, PipelineRun, RunFailure, RunStatus, SceneIndex,
    SceneRecord, SceneState, SceneStatus, StageFailure,
};
use reelsmith_pipeline::PipelineError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::registry::RunEntry;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartRun {
    pub idea: String,
}

/// One line of the run list.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub idea: String,
    pub status: RunStatus,
    pub scene_count: usize,
    pub completed_scenes: usize,
    pub final_video: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SceneView {
    pub index: SceneIndex,
    pub description: String,
    pub state: SceneState,
    pub status: SceneStatus,
    pub failure: Option<StageFailure>,
    pub starting_image: Option<String>,
    pub video: Option<String>,
    pub scored_video: Option<String>,
    /// Every artifact stored under this scene.
    pub artifacts: Vec<Artifact>,
}

/// Full run snapshot.
#[derive(Debug, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub character: Option<Character>,
    pub sound_effect: Option<String>,
    pub scenes: Vec<SceneView>,
    pub failure: Option<RunFailure>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn locator(run: &PipelineRun, reference: Option<ArtifactRef>) -> Option<String> {
    reference
        .and_then(|r| run.resolve(r).ok())
        .map(|a| a.locator.clone())
}

fn summarize(run: &PipelineRun) -> RunSummary {
    RunSummary {
        id: run.id,
        idea: run.idea.clone(),
        status: run.status,
        scene_count: run.scenes().len(),
        completed_scenes: run.completed_scenes(),
        final_video: locator(run, run.final_video),
        created_at: run.created_at,
        updated_at: run.updated_at,
    }
}

fn scene_view(run: &PipelineRun, record: &SceneRecord) -> SceneView {
    SceneView {
        index: record.index,
        description: record.description.clone(),
        state: record.state,
        status: record.status,
        failure: record.failure.clone(),
        starting_image: locator(run, record.starting_image),
        video: locator(run, record.video),
        scored_video: locator(run, record.scored_video),
        artifacts: run
            .artifacts()
            .artifacts_for(record.index)
            .into_iter()
            .cloned()
            .collect(),
    }
}

fn detail(run: &PipelineRun) -> RunDetail {
    RunDetail {
        summary: summarize(run),
        character: run.storyboard().map(|s| s.character().clone()),
        sound_effect: run.storyboard().map(|s| s.sound_effect().to_string()),
        scenes: run.scenes().iter().map(|r| scene_view(run, r)).collect(),
        failure: run.failure.clone(),
    }
}

async fn find_run(state: &AppState, id: Uuid) -> AppResult<RunEntry> {
    state.runs.get(id).await.ok_or(AppError::NotFound {
        entity: "Run",
        id: id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// POST /api/v1/runs
///
/// Register a run for `idea` and execute it in the background. Returns 202
/// with the run summary.
pub async fn start_run(
    State(state): State<AppState>,
    Json(input): Json<StartRun>,
) -> AppResult<impl IntoResponse> {
    let run = state.orchestrator.start(&input.idea)?;
    let entry = state.runs.register(run).await;
    state
        .runs
        .spawn_execution(state.orchestrator.clone(), entry.clone());

    tracing::info!(run_id = %entry.id, "Run submitted");

    let summary = summarize(&*entry.run.read().await);
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: summary })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/runs
///
/// Run summaries, oldest first.
pub async fn list_runs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let mut summaries = Vec::new();
    for entry in state.runs.entries().await {
        summaries.push(summarize(&*entry.run.read().await));
    }
    summaries.sort_by_key(|s| s.created_at);
    Ok(Json(DataResponse { data: summaries }))
}

/// GET /api/v1/runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let entry = find_run(&state, id).await?;
    let snapshot = detail(&*entry.run.read().await);
    Ok(Json(DataResponse { data: snapshot }))
}

// ---------------------------------------------------------------------------
// Cancel / resume
// ---------------------------------------------------------------------------

/// POST /api/v1/runs/{id}/cancel
///
/// Request cancellation. The run stops before its next scene; an in-flight
/// stage call finishes first. 409 if the run already finished.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let entry = find_run(&state, id).await?;
    let summary = summarize(&*entry.run.read().await);
    if summary.status.is_finished() {
        return Err(AppError::Conflict(format!(
            "Run {id} already finished with status {:?}",
            summary.status
        )));
    }
    entry.cancel.cancel();
    tracing::info!(run_id = %id, "Run cancellation requested");
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: summary })))
}

/// POST /api/v1/runs/{id}/resume
///
/// Resume a failed or cancelled run from its first unfinished scene. 409
/// for any other status.
pub async fn resume_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let entry = find_run(&state, id).await?;
    let status = entry.run.read().await.status;
    if !status.is_resumable() {
        return Err(AppError::Conflict(format!(
            "Run {id} cannot be resumed while {status:?}"
        )));
    }

    let (entry, from) = match state.runs.prepare_resume(id, &state.orchestrator).await {
        Ok(Some(prepared)) => prepared,
        Ok(None) => {
            return Err(AppError::NotFound {
                entity: "Run",
                id: id.to_string(),
            })
        }
        // Lost a race with a concurrent resume.
        Err(PipelineError::Bookkeeping(CoreError::Validation(msg))) => {
            return Err(AppError::Conflict(msg));
        }
        Err(e) => return Err(e.into()),
    };
    state
        .runs
        .spawn_execution(state.orchestrator.clone(), entry.clone());

    tracing::info!(run_id = %id, from_scene = ?from.map(SceneIndex::get), "Run resumed");

    let summary = summarize(&*entry.run.read().await);
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: summary })))
}
