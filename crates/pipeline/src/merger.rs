//! Concatenating scene clips into the final video.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reelsmith_core::ffmpeg;
use reelsmith_core::{Artifact, ArtifactKind};
use reelsmith_provider::StageClient;

use crate::error::PipelineError;
use crate::media::{file_locator, locator_digest, materialize};

/// Concatenates an ordered list of videos into one `final-video` artifact.
///
/// Input order is output order. A single input yields an artifact with the
/// same locator. The final artifact is attached to the last input's scene.
#[async_trait]
pub trait VideoMerger: Send + Sync {
    async fn merge(&self, videos: &[Artifact]) -> Result<Artifact, PipelineError>;
}

/// Shared preconditions. Returns the final artifact directly when there is
/// nothing to concatenate.
fn trivial_merge(videos: &[Artifact]) -> Result<Option<Artifact>, PipelineError> {
    let non_video: Vec<String> = videos
        .iter()
        .filter(|v| !v.kind.is_video())
        .map(|v| v.locator.clone())
        .collect();
    if !non_video.is_empty() {
        return Err(PipelineError::MergeFailed {
            unreadable: non_video,
            reason: "inputs must be videos".to_string(),
        });
    }
    match videos {
        [] => Err(PipelineError::MergeFailed {
            unreadable: Vec::new(),
            reason: "no videos to merge".to_string(),
        }),
        [only] => Ok(Some(final_artifact(videos, only.locator.clone()))),
        _ => Ok(None),
    }
}

fn final_artifact(videos: &[Artifact], locator: String) -> Artifact {
    let scene = videos
        .last()
        .map(|v| v.scene)
        .unwrap_or(reelsmith_core::SceneIndex::FIRST);
    Artifact::new(scene, ArtifactKind::FinalVideo, locator)
}

// ---------------------------------------------------------------------------
// RemoteVideoMerger
// ---------------------------------------------------------------------------

/// Delegates to the provider's `merge-videos` capability.
pub struct RemoteVideoMerger {
    client: Arc<dyn StageClient>,
}

impl RemoteVideoMerger {
    pub fn new(client: Arc<dyn StageClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VideoMerger for RemoteVideoMerger {
    async fn merge(&self, videos: &[Artifact]) -> Result<Artifact, PipelineError> {
        if let Some(single) = trivial_merge(videos)? {
            return Ok(single);
        }
        let urls: Vec<String> = videos.iter().map(|v| v.locator.clone()).collect();
        let merged = self
            .client
            .merge_videos(&urls)
            .await
            .map_err(|e| PipelineError::MergeFailed {
                unreadable: Vec::new(),
                reason: e.to_string(),
            })?;
        Ok(final_artifact(videos, merged))
    }
}

// ---------------------------------------------------------------------------
// FfmpegVideoMerger
// ---------------------------------------------------------------------------

/// Local concatenation with the ffmpeg concat demuxer (`-c copy`). Inputs
/// whose stream layouts differ, such as scored clips next to a raw clip
/// whose sound effect failed, are re-encoded through a concat filter.
///
/// Output goes to `{media_dir}/merged/{digest}.mp4`, where the digest covers
/// the ordered input locators.
pub struct FfmpegVideoMerger {
    http: reqwest::Client,
    media_dir: PathBuf,
}

impl FfmpegVideoMerger {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            media_dir: media_dir.into(),
        }
    }
}

#[async_trait]
impl VideoMerger for FfmpegVideoMerger {
    async fn merge(&self, videos: &[Artifact]) -> Result<Artifact, PipelineError> {
        if let Some(single) = trivial_merge(videos)? {
            return Ok(single);
        }

        let downloads = self.media_dir.join("downloads");
        let resolved = futures::future::join_all(
            videos
                .iter()
                .map(|v| materialize(&self.http, &v.locator, &downloads)),
        )
        .await;

        let mut inputs = Vec::with_capacity(videos.len());
        let mut unreadable = Vec::new();
        for (video, result) in videos.iter().zip(resolved) {
            match result {
                Ok(path) => inputs.push(path),
                Err(reason) => {
                    tracing::warn!(video = %video.locator, reason = %reason, "Merge input unreadable");
                    unreadable.push(video.locator.clone());
                }
            }
        }
        if !unreadable.is_empty() {
            return Err(PipelineError::MergeFailed {
                reason: format!("{} of {} inputs unreadable", unreadable.len(), videos.len()),
                unreadable,
            });
        }

        let probed =
            futures::future::join_all(inputs.iter().map(|p| ffmpeg::probe_video(p))).await;
        let mut probes = Vec::with_capacity(inputs.len());
        for ((video, path), result) in videos.iter().zip(inputs).zip(probed) {
            match result {
                Ok(probe) if ffmpeg::has_video_stream(&probe) => {
                    probes.push(ffmpeg::ConcatInput::from_probe(path, &probe));
                }
                Ok(_) => {
                    tracing::warn!(video = %video.locator, "Merge input has no video stream");
                    unreadable.push(video.locator.clone());
                }
                Err(e) => {
                    tracing::warn!(video = %video.locator, error = %e, "Merge input unreadable");
                    unreadable.push(video.locator.clone());
                }
            }
        }
        if !unreadable.is_empty() {
            return Err(PipelineError::MergeFailed {
                reason: format!("{} of {} inputs unreadable", unreadable.len(), videos.len()),
                unreadable,
            });
        }

        let merged_dir = self.media_dir.join("merged");
        let io_failed = |e: std::io::Error| PipelineError::MergeFailed {
            unreadable: Vec::new(),
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(&merged_dir).await.map_err(io_failed)?;

        let key = locator_digest(
            &videos
                .iter()
                .map(|v| v.locator.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let output = merged_dir.join(format!("{key}.mp4"));
        let concat_failed = |e: ffmpeg::FfmpegError| PipelineError::MergeFailed {
            unreadable: Vec::new(),
            reason: e.to_string(),
        };

        if ffmpeg::layouts_match(&probes) {
            let list_path = merged_dir.join(format!("{key}.txt"));
            let paths: Vec<&Path> = probes.iter().map(|p| p.path.as_path()).collect();
            tokio::fs::write(&list_path, ffmpeg::concat_list(&paths))
                .await
                .map_err(io_failed)?;
            let copied = ffmpeg::concat_videos(&list_path, &output).await;
            let _ = tokio::fs::remove_file(&list_path).await;
            copied.map_err(concat_failed)?;
        } else {
            tracing::info!(inputs = probes.len(), "Merge inputs differ in audio, re-encoding");
            ffmpeg::concat_reencode(&probes, &output)
                .await
                .map_err(concat_failed)?;
        }

        tracing::info!(inputs = videos.len(), output = %output.display(), "Merged videos");
        Ok(final_artifact(videos, file_locator(&output)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
