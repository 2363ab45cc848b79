//! Deriving the next scene's starting image from the previous scene's video.
//!
//! Both implementations are deterministic: the same source video always
//! yields the same frame artifact.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reelsmith_core::ffmpeg;
use reelsmith_core::{Artifact, ArtifactKind};
use reelsmith_provider::StageClient;

use crate::error::PipelineError;
use crate::media::{file_locator, locator_digest, materialize};

/// Extracts a representative frame from a finished scene video.
#[async_trait]
pub trait FrameBridge: Send + Sync {
    /// Return a `frame-image` artifact for the scene that follows `video`.
    async fn extract_frame(&self, video: &Artifact) -> Result<Artifact, PipelineError>;
}

/// Only scene clips (raw or scored) can seed the next scene.
fn check_source(video: &Artifact) -> Result<(), PipelineError> {
    match video.kind {
        ArtifactKind::SceneVideo | ArtifactKind::ScoredVideo => Ok(()),
        other => Err(PipelineError::FrameExtractionFailed {
            video: video.locator.clone(),
            reason: format!("source is a {other}, not a scene video"),
        }),
    }
}

fn frame_artifact(video: &Artifact, locator: String) -> Artifact {
    Artifact::new(video.scene.next(), ArtifactKind::FrameImage, locator)
}

// ---------------------------------------------------------------------------
// RemoteFrameBridge
// ---------------------------------------------------------------------------

/// Sources remembered by [`RemoteFrameBridge`] before the oldest is evicted.
pub const FRAME_MEMO_CAPACITY: usize = 256;

/// Delegates to the provider's `extract-frame` capability and memoizes the
/// result per source locator.
///
/// The memo is bounded; a run keeps its own `frame-image` artifacts, so an
/// evicted source only costs a repeat call for ad hoc extractions.
pub struct RemoteFrameBridge {
    client: Arc<dyn StageClient>,
    memo: Mutex<FrameMemo>,
}

/// Insertion-ordered map from source locator to frame locator.
#[derive(Default)]
struct FrameMemo {
    capacity: usize,
    frames: HashMap<String, String>,
    order: VecDeque<String>,
}

impl FrameMemo {
    fn get(&self, video: &str) -> Option<String> {
        self.frames.get(video).cloned()
    }

    /// First writer wins so concurrent callers agree on one frame.
    fn insert(&mut self, video: &str, frame: String) -> String {
        if let Some(existing) = self.frames.get(video) {
            return existing.clone();
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.frames.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(video.to_string());
        self.frames.insert(video.to_string(), frame.clone());
        frame
    }
}

impl RemoteFrameBridge {
    pub fn new(client: Arc<dyn StageClient>) -> Self {
        Self::with_capacity(client, FRAME_MEMO_CAPACITY)
    }

    pub fn with_capacity(client: Arc<dyn StageClient>, capacity: usize) -> Self {
        Self {
            client,
            memo: Mutex::new(FrameMemo {
                capacity: capacity.max(1),
                ..FrameMemo::default()
            }),
        }
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, FrameMemo> {
        self.memo.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FrameBridge for RemoteFrameBridge {
    async fn extract_frame(&self, video: &Artifact) -> Result<Artifact, PipelineError> {
        check_source(video)?;
        if let Some(frame) = self.memo().get(&video.locator) {
            return Ok(frame_artifact(video, frame));
        }

        let frame = self
            .client
            .extract_frame(&video.locator)
            .await
            .map_err(|e| PipelineError::FrameExtractionFailed {
                video: video.locator.clone(),
                reason: e.to_string(),
            })?;

        let frame = self.memo().insert(&video.locator, frame);
        Ok(frame_artifact(video, frame))
    }
}

// ---------------------------------------------------------------------------
// FfmpegFrameBridge
// ---------------------------------------------------------------------------

/// Local extraction: the frame at the temporal midpoint, via ffmpeg.
///
/// Frames are written to `{media_dir}/frames/{sha256(locator)}.png`; an
/// existing file for the same source is reused as is.
pub struct FfmpegFrameBridge {
    http: reqwest::Client,
    media_dir: PathBuf,
}

impl FfmpegFrameBridge {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            media_dir: media_dir.into(),
        }
    }

    fn frame_path(&self, locator: &str) -> PathBuf {
        self.media_dir
            .join("frames")
            .join(format!("{}.png", locator_digest(locator)))
    }

    async fn extract(&self, video: &Artifact) -> Result<PathBuf, String> {
        let target = self.frame_path(&video.locator);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(target);
        }

        let source = materialize(&self.http, &video.locator, &self.media_dir.join("downloads")).await?;
        let probe = ffmpeg::probe_video(&source)
            .await
            .map_err(|e| e.to_string())?;
        if !ffmpeg::has_video_stream(&probe) {
            return Err("no video stream".to_string());
        }
        let timestamp = ffmpeg::midpoint_timestamp(&probe).ok_or("video is empty")?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("create {}: {e}", parent.display()))?;
        }
        ffmpeg::extract_frame_at(&source, &target, timestamp)
            .await
            .map_err(|e| e.to_string())?;

        if frame_is_blank(&target)? {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(format!("frame at {timestamp:.3}s is blank"));
        }

        tracing::debug!(
            video = %video.locator,
            frame = %target.display(),
            timestamp,
            "Extracted midpoint frame",
        );
        Ok(target)
    }
}

#[async_trait]
impl FrameBridge for FfmpegFrameBridge {
    async fn extract_frame(&self, video: &Artifact) -> Result<Artifact, PipelineError> {
        check_source(video)?;
        let path = self
            .extract(video)
            .await
            .map_err(|reason| PipelineError::FrameExtractionFailed {
                video: video.locator.clone(),
                reason,
            })?;
        Ok(frame_artifact(video, file_locator(&path)))
    }
}

fn frame_is_blank(path: &Path) -> Result<bool, String> {
    let image = image::open(path).map_err(|e| format!("decode {}: {e}", path.display()))?;
    Ok(is_uniform(&image))
}

/// A frame with a single luma value everywhere carries no picture.
pub fn is_uniform(image: &image::DynamicImage) -> bool {
    let luma = image.to_luma8();
    let mut pixels = luma.pixels().map(|p| p.0[0]);
    match pixels.next() {
        None => true,
        Some(first) => pixels.all(|v| v == first),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reelsmith_core::{SceneIndex, Stage};
    use reelsmith_provider::OfflineStageClient;

    use super::*;

    fn scene(n: u32) -> SceneIndex {
        SceneIndex::new(n).unwrap()
    }

    fn video(n: u32, locator: &str) -> Artifact {
        Artifact::new(scene(n), ArtifactKind::SceneVideo, locator)
    }

    #[tokio::test]
    async fn remote_frame_belongs_to_next_scene() {
        let offline = Arc::new(OfflineStageClient::default());
        let bridge = RemoteFrameBridge::new(offline.clone());

        let frame = bridge
            .extract_frame(&video(3, "offline://generate-video/v3.mp4"))
            .await
            .unwrap();

        assert_eq!(frame.scene, scene(4));
        assert_eq!(frame.kind, ArtifactKind::FrameImage);
        assert_eq!(
            offline.calls_to(Stage::ExtractFrame)[0].inputs,
            vec!["offline://generate-video/v3.mp4"]
        );
    }

    #[tokio::test]
    async fn remote_extraction_is_memoized() {
        let offline = Arc::new(OfflineStageClient::default());
        let bridge = RemoteFrameBridge::new(offline.clone());
        let source = video(1, "https://cdn/v1.mp4");

        let first = bridge.extract_frame(&source).await.unwrap();
        let second = bridge.extract_frame(&source).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(offline.call_count(Stage::ExtractFrame), 1);
    }

    #[tokio::test]
    async fn remote_memo_evicts_oldest_source() {
        let offline = Arc::new(OfflineStageClient::default());
        let bridge = RemoteFrameBridge::with_capacity(offline.clone(), 2);
        let first = video(1, "https://cdn/v1.mp4");

        let before = bridge.extract_frame(&first).await.unwrap();
        bridge.extract_frame(&video(2, "https://cdn/v2.mp4")).await.unwrap();
        bridge.extract_frame(&video(3, "https://cdn/v3.mp4")).await.unwrap();
        assert_eq!(bridge.memo().frames.len(), 2);

        let after = bridge.extract_frame(&first).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(offline.call_count(Stage::ExtractFrame), 4);
    }

    #[tokio::test]
    async fn remote_failure_is_frame_extraction_failed() {
        let offline = Arc::new(OfflineStageClient::default());
        offline.fail_stage_always(Stage::ExtractFrame, false);
        let bridge = RemoteFrameBridge::new(offline);

        assert_matches!(
            bridge.extract_frame(&video(1, "https://cdn/v1.mp4")).await,
            Err(PipelineError::FrameExtractionFailed { video, .. }) if video == "https://cdn/v1.mp4"
        );
    }

    #[tokio::test]
    async fn non_video_source_rejected() {
        let bridge = RemoteFrameBridge::new(Arc::new(OfflineStageClient::default()));
        let image = Artifact::new(scene(1), ArtifactKind::CombinedImage, "https://cdn/c.png");
        assert_matches!(
            bridge.extract_frame(&image).await,
            Err(PipelineError::FrameExtractionFailed { reason, .. }) if reason.contains("combined-image")
        );
    }

    #[tokio::test]
    async fn ffmpeg_unreadable_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FfmpegFrameBridge::new(dir.path());
        assert_matches!(
            bridge
                .extract_frame(&video(1, "file:///no/such/video.mp4"))
                .await,
            Err(PipelineError::FrameExtractionFailed { .. })
        );
    }

    #[tokio::test]
    async fn ffmpeg_reuses_existing_frame() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FfmpegFrameBridge::new(dir.path());
        let source = video(2, "https://cdn/v2.mp4");
        let path = bridge.frame_path(&source.locator);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"png").unwrap();

        let a = bridge.extract_frame(&source).await.unwrap();
        let b = bridge.extract_frame(&source).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.locator, file_locator(&path));
        assert_eq!(a.scene, scene(3));
    }

    #[test]
    fn uniform_image_is_blank() {
        let black = image::DynamicImage::ImageRgb8(image::RgbImage::new(16, 9));
        assert!(is_uniform(&black));

        let mut picture = image::RgbImage::new(16, 9);
        picture.put_pixel(8, 4, image::Rgb([200, 120, 40]));
        assert!(!is_uniform(&image::DynamicImage::ImageRgb8(picture)));
    }
}
