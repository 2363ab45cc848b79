//! Ad hoc frame extraction, merging and sound effects.
//!
//! These run through the same frame bridge, merger and policy-wrapped
//! client as pipeline runs, independently of any run.

use axum::extract::State;
use axum::Json;
use reelsmith_core::storyboard::DEFAULT_SOUND_EFFECT;
use reelsmith_core::{Artifact, ArtifactKind, SceneIndex, Stage};
use reelsmith_pipeline::PipelineError;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtractFrameRequest {
    pub video_url: String,
}

#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub frame_url: String,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub video_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub merged_video_url: String,
    pub inputs: usize,
}

#[derive(Debug, Deserialize)]
pub struct SoundEffectRequest {
    pub video_url: String,
    #[serde(default)]
    pub sound_effect: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SoundEffectResponse {
    pub video_url: String,
    pub sound_effect: String,
}

fn require<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(value)
}

/// POST /api/v1/frames/extract
pub async fn extract_frame(
    State(state): State<AppState>,
    Json(input): Json<ExtractFrameRequest>,
) -> AppResult<Json<DataResponse<FrameResponse>>> {
    let video_url = require("video_url", &input.video_url)?;
    let video = Artifact::new(SceneIndex::FIRST, ArtifactKind::SceneVideo, video_url);
    let frame = state.orchestrator.frame_bridge().extract_frame(&video).await?;
    Ok(Json(DataResponse {
        data: FrameResponse {
            frame_url: frame.locator,
        },
    }))
}

/// POST /api/v1/videos/merge
///
/// Concatenate `video_urls` in order. One URL is returned as is.
pub async fn merge_videos(
    State(state): State<AppState>,
    Json(input): Json<MergeRequest>,
) -> AppResult<Json<DataResponse<MergeResponse>>> {
    if input.video_urls.is_empty() {
        return Err(AppError::BadRequest(
            "video_urls must contain at least one URL".to_string(),
        ));
    }
    let videos = input
        .video_urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let index = u32::try_from(i + 1)
                .map_err(|_| AppError::BadRequest("too many video_urls".to_string()))
                .and_then(|n| SceneIndex::new(n).map_err(AppError::from))?;
            Ok(Artifact::new(
                index,
                ArtifactKind::SceneVideo,
                require("video_urls", url)?,
            ))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let merged = state.orchestrator.merger().merge(&videos).await?;
    tracing::info!(inputs = videos.len(), merged = %merged.locator, "Ad hoc merge");
    Ok(Json(DataResponse {
        data: MergeResponse {
            merged_video_url: merged.locator,
            inputs: videos.len(),
        },
    }))
}

/// POST /api/v1/videos/sound-effect
///
/// `sound_effect` defaults to `ambient`.
pub async fn add_sound_effect(
    State(state): State<AppState>,
    Json(input): Json<SoundEffectRequest>,
) -> AppResult<Json<DataResponse<SoundEffectResponse>>> {
    let video_url = require("video_url", &input.video_url)?;
    let sound_effect = input
        .sound_effect
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SOUND_EFFECT)
        .to_string();

    let scored = state
        .orchestrator
        .client()
        .add_sound_effect(video_url, &sound_effect)
        .await
        .map_err(PipelineError::stage_call(Stage::AddSoundEffect))?;
    Ok(Json(DataResponse {
        data: SoundEffectResponse {
            video_url: scored,
            sound_effect,
        },
    }))
}
