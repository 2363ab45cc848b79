//! Drives a whole run: storyboard, shared character, scenes in order, merge.

use std::sync::Arc;

use reelsmith_core::{
    Artifact, ArtifactKind, PipelineRun, RunFailure, SceneIndex, Stage, Storyboard,
};
use reelsmith_events::{event_types, EventBus, PipelineEvent};
use reelsmith_provider::{ResilientStageClient, StageClient};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::config::{MediaBackend, PipelineConfig, SoundEffectPlacement};
use crate::error::{PipelineError, PipelineFailure};
use crate::frame_bridge::{FfmpegFrameBridge, FrameBridge, RemoteFrameBridge};
use crate::merger::{FfmpegVideoMerger, RemoteVideoMerger, VideoMerger};
use crate::scene_runner::{SceneRunner, SharedRun};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub final_video: Artifact,
    /// The clips that went into the merge, in scene order.
    pub scene_videos: Vec<Artifact>,
    pub completed_scenes: usize,
}

/// Where a run stopped, before the completed-scene count is attached.
struct Halt {
    scene: Option<SceneIndex>,
    stage: Stage,
    cause: PipelineError,
}

impl Halt {
    fn new(scene: Option<SceneIndex>, stage: Stage, cause: impl Into<PipelineError>) -> Self {
        Self {
            scene,
            stage,
            cause: cause.into(),
        }
    }
}

/// Sequences the stages of one or more pipeline runs.
///
/// The orchestrator is stateless between runs: every run is an explicit
/// [`SharedRun`] passed in by the caller, so one orchestrator can serve many
/// runs concurrently. Scenes within a run are never parallelized.
pub struct PipelineOrchestrator {
    client: Arc<dyn StageClient>,
    frame_bridge: Arc<dyn FrameBridge>,
    merger: Arc<dyn VideoMerger>,
    checkpoints: Option<CheckpointStore>,
    config: PipelineConfig,
    events: Arc<EventBus>,
}

impl PipelineOrchestrator {
    /// Wrap `client` with the configured timeouts and retries, and pick the
    /// frame bridge and merger for the configured media backend.
    pub fn new(client: Arc<dyn StageClient>, config: PipelineConfig, events: Arc<EventBus>) -> Self {
        let client: Arc<dyn StageClient> = Arc::new(ResilientStageClient::new(
            client,
            config.stage_policy.clone(),
        ));
        let (frame_bridge, merger): (Arc<dyn FrameBridge>, Arc<dyn VideoMerger>) =
            match config.media_backend {
                MediaBackend::Remote => (
                    Arc::new(RemoteFrameBridge::new(client.clone())),
                    Arc::new(RemoteVideoMerger::new(client.clone())),
                ),
                MediaBackend::Ffmpeg => (
                    Arc::new(FfmpegFrameBridge::new(config.media_dir.clone())),
                    Arc::new(FfmpegVideoMerger::new(config.media_dir.clone())),
                ),
            };
        let checkpoints = config.checkpoint_dir.clone().map(CheckpointStore::new);
        Self {
            client,
            frame_bridge,
            merger,
            checkpoints,
            config,
            events,
        }
    }

    pub fn with_frame_bridge(mut self, frame_bridge: Arc<dyn FrameBridge>) -> Self {
        self.frame_bridge = frame_bridge;
        self
    }

    pub fn with_merger(mut self, merger: Arc<dyn VideoMerger>) -> Self {
        self.merger = merger;
        self
    }

    /// The policy-wrapped client used for every stage call.
    pub fn client(&self) -> &Arc<dyn StageClient> {
        &self.client
    }

    pub fn frame_bridge(&self) -> &Arc<dyn FrameBridge> {
        &self.frame_bridge
    }

    pub fn merger(&self) -> &Arc<dyn VideoMerger> {
        &self.merger
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn checkpoints(&self) -> Option<&CheckpointStore> {
        self.checkpoints.as_ref()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Turn `idea` into a finished reel in one call.
    ///
    /// A rejected idea fails before any run exists; the failure then carries
    /// the nil run id.
    pub async fn run_pipeline(&self, idea: &str) -> Result<PipelineOutcome, PipelineFailure> {
        let run = self.start(idea).map_err(|cause| PipelineFailure {
            run_id: Uuid::nil(),
            scene_index: None,
            stage: Stage::Storyboard,
            completed_scenes: 0,
            cause,
        })?;
        self.execute(&run, &CancellationToken::new()).await
    }

    /// Create a pending run for `idea` without executing it.
    pub fn start(&self, idea: &str) -> Result<SharedRun, PipelineError> {
        let idea = idea.trim();
        if idea.is_empty() {
            return Err(reelsmith_core::CoreError::Validation(
                "idea must not be empty".to_string(),
            )
            .into());
        }
        let run = PipelineRun::new(idea);
        tracing::info!(run_id = %run.id, idea, "Run created");
        Ok(Arc::new(RwLock::new(run)))
    }

    /// Reset a failed or cancelled run so it can be executed again.
    ///
    /// Returns the scene execution will restart from, or `None` when every
    /// scene is already done and only the merge remains.
    pub async fn prepare_resume(&self, run: &SharedRun) -> Result<Option<SceneIndex>, PipelineError> {
        let mut guard = run.write().await;
        let from = guard.prepare_resume()?;
        tracing::info!(
            run_id = %guard.id,
            from_scene = ?from.map(SceneIndex::get),
            completed_scenes = guard.completed_scenes(),
            "Run prepared for resume",
        );
        Ok(from)
    }

    /// Continue a failed or cancelled run from its first unfinished scene.
    ///
    /// Stored storyboard, character, setting and completed scenes are
    /// reused. Nothing is retried automatically: this runs once per call.
    pub async fn resume(
        &self,
        run: &SharedRun,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        if let Err(cause) = self.prepare_resume(run).await {
            let guard = run.read().await;
            let (scene_index, stage) = guard.resume_point();
            return Err(PipelineFailure {
                run_id: guard.id,
                scene_index,
                stage,
                completed_scenes: guard.completed_scenes(),
                cause,
            });
        }
        self.execute(run, cancel).await
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute a pending run until it succeeds, fails or is cancelled.
    ///
    /// A run that already has a storyboard continues where it stopped; call
    /// [`prepare_resume`](Self::prepare_resume) first for failed runs.
    pub async fn execute(
        &self,
        run: &SharedRun,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let (run_id, completed, resumed) = {
            let mut guard = run.write().await;
            guard.mark_running();
            (guard.id, guard.completed_scenes(), guard.storyboard().is_some())
        };
        let started_event = if resumed {
            event_types::RUN_RESUMED
        } else {
            event_types::RUN_STARTED
        };
        tracing::info!(run_id = %run_id, completed_scenes = completed, "Run executing");
        self.events.publish(
            PipelineEvent::new(started_event, run_id)
                .with_payload(serde_json::json!({ "completed_scenes": completed })),
        );

        let result = self.drive(run, run_id, cancel).await;

        let mut guard = run.write().await;
        let completed_scenes = guard.completed_scenes();
        let result = match result {
            Ok(outcome) => {
                tracing::info!(
                    run_id = %run_id,
                    final_video = %outcome.final_video.locator,
                    completed_scenes,
                    "Run succeeded",
                );
                self.events.publish(
                    PipelineEvent::new(event_types::RUN_SUCCEEDED, run_id).with_payload(
                        serde_json::json!({ "final_video": outcome.final_video.locator }),
                    ),
                );
                Ok(outcome)
            }
            Err(halt) => {
                let record = RunFailure {
                    scene: halt.scene,
                    stage: halt.stage,
                    message: halt.cause.to_string(),
                    completed_scenes,
                };
                let failure = PipelineFailure {
                    run_id,
                    scene_index: halt.scene,
                    stage: halt.stage,
                    completed_scenes,
                    cause: halt.cause,
                };
                let mut event = if failure.is_cancelled() {
                    tracing::info!(run_id = %run_id, completed_scenes, "Run cancelled");
                    guard.mark_cancelled(record);
                    PipelineEvent::new(event_types::RUN_CANCELLED, run_id)
                } else {
                    if failure.cause.is_bookkeeping() {
                        tracing::error!(run_id = %run_id, error = %failure, "Run bookkeeping error");
                    } else {
                        tracing::warn!(run_id = %run_id, error = %failure, "Run failed");
                    }
                    guard.mark_failed(record);
                    PipelineEvent::new(event_types::RUN_FAILED, run_id)
                };
                event = event.with_stage(failure.stage).with_payload(serde_json::json!({
                    "completed_scenes": completed_scenes,
                    "error": failure.cause.to_string(),
                }));
                if let Some(scene) = failure.scene_index {
                    event = event.with_scene(scene);
                }
                self.events.publish(event);
                Err(failure)
            }
        };
        drop(guard);
        self.checkpoint(run).await;
        result
    }

    async fn drive(
        &self,
        run: &SharedRun,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, Halt> {
        self.ensure_storyboard(run, run_id, cancel).await?;
        self.ensure_character(run, run_id, cancel).await?;

        let runner = SceneRunner::new(
            self.client.clone(),
            self.frame_bridge.clone(),
            self.config.sound_effects,
            self.config.refine_video_prompt,
        );

        loop {
            let next = run.read().await.next_unfinished_scene();
            let Some(index) = next else { break };
            let first_stage = index.position().first_stage();
            if cancel.is_cancelled() {
                return Err(Halt::new(Some(index), first_stage, PipelineError::Cancelled));
            }

            tracing::info!(run_id = %run_id, scene = %index, "Scene started");
            self.events
                .publish(PipelineEvent::new(event_types::SCENE_STARTED, run_id).with_scene(index));

            let result = runner.run(run, index).await;
            self.checkpoint(run).await;

            match result {
                Ok(()) => {
                    let video = {
                        let guard = run.read().await;
                        guard
                            .scene(index)
                            .ok()
                            .and_then(|s| s.merge_input())
                            .and_then(|r| guard.resolve(r).ok())
                            .map(|a| a.locator.clone())
                    };
                    self.events.publish(
                        PipelineEvent::new(event_types::SCENE_SUCCEEDED, run_id)
                            .with_scene(index)
                            .with_payload(serde_json::json!({ "video": video })),
                    );
                }
                Err(err) => {
                    self.events.publish(
                        PipelineEvent::new(event_types::SCENE_FAILED, run_id)
                            .with_scene(index)
                            .with_stage(err.stage)
                            .with_payload(serde_json::json!({ "error": err.error.to_string() })),
                    );
                    return Err(Halt::new(Some(err.scene), err.stage, err.error));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Halt::new(None, Stage::MergeVideos, PipelineError::Cancelled));
        }
        self.merge(run, run_id).await
    }

    /// Generate and validate the storyboard unless the run already has one.
    async fn ensure_storyboard(
        &self,
        run: &SharedRun,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let idea = {
            let guard = run.read().await;
            if guard.storyboard().is_some() {
                return Ok(());
            }
            guard.idea.clone()
        };
        let halt = |cause: PipelineError| Halt::new(None, Stage::Storyboard, cause);
        if cancel.is_cancelled() {
            return Err(halt(PipelineError::Cancelled));
        }

        let draft = self
            .client
            .storyboard(&idea)
            .await
            .map_err(PipelineError::stage_call(Stage::Storyboard))
            .map_err(halt)?;
        let storyboard = Storyboard::from_draft(draft, self.config.scene_count)
            .map_err(|e| halt(PipelineError::InvalidStoryboard(e.to_string())))?;
        let scene_count = storyboard.scene_count();

        run.write()
            .await
            .attach_storyboard(storyboard)
            .map_err(|e| halt(e.into()))?;
        tracing::info!(run_id = %run_id, scene_count, "Storyboard ready");
        self.events.publish(
            PipelineEvent::new(event_types::STORYBOARD_READY, run_id)
                .with_stage(Stage::Storyboard)
                .with_payload(serde_json::json!({ "scene_count": scene_count })),
        );
        Ok(())
    }

    /// Generate the shared character image unless it is already stored.
    async fn ensure_character(
        &self,
        run: &SharedRun,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let character = {
            let guard = run.read().await;
            if guard
                .artifacts()
                .contains(SceneIndex::FIRST, ArtifactKind::CharacterImage)
            {
                return Ok(());
            }
            guard
                .storyboard()
                .map(|s| s.character().clone())
                .ok_or_else(|| {
                    Halt::new(
                        None,
                        Stage::CharacterPrompt,
                        reelsmith_core::CoreError::Internal(format!(
                            "run {run_id} has no storyboard"
                        )),
                    )
                })?
        };
        if cancel.is_cancelled() {
            return Err(Halt::new(None, Stage::CharacterPrompt, PipelineError::Cancelled));
        }

        let prompt = self
            .client
            .character_prompt(&character.name, &character.description)
            .await
            .map_err(PipelineError::stage_call(Stage::CharacterPrompt))
            .map_err(|e| Halt::new(None, Stage::CharacterPrompt, e))?;
        let url = self
            .client
            .character_image(&prompt)
            .await
            .map_err(PipelineError::stage_call(Stage::CharacterImage))
            .map_err(|e| Halt::new(None, Stage::CharacterImage, e))?;

        run.write()
            .await
            .store_artifact(Artifact::new(
                SceneIndex::FIRST,
                ArtifactKind::CharacterImage,
                url.clone(),
            ))
            .map_err(|e| Halt::new(None, Stage::CharacterImage, e))?;
        tracing::info!(run_id = %run_id, name = %character.name, "Character ready");
        self.events.publish(
            PipelineEvent::new(event_types::CHARACTER_READY, run_id)
                .with_stage(Stage::CharacterImage)
                .with_payload(serde_json::json!({ "name": character.name, "image": url })),
        );
        Ok(())
    }

    async fn merge(&self, run: &SharedRun, run_id: Uuid) -> Result<PipelineOutcome, Halt> {
        let halt = |cause: PipelineError| Halt::new(None, Stage::MergeVideos, cause);

        let (scene_videos, sound_effect) = {
            let guard = run.read().await;
            let inputs = guard.merge_inputs().map_err(|e| halt(e.into()))?;
            let sound_effect = guard
                .storyboard()
                .map(|s| s.sound_effect().to_string())
                .unwrap_or_default();
            (inputs, sound_effect)
        };

        let mut final_video = self.merger.merge(&scene_videos).await.map_err(halt)?;
        tracing::info!(
            run_id = %run_id,
            inputs = scene_videos.len(),
            final_video = %final_video.locator,
            "Merge completed",
        );
        self.events.publish(
            PipelineEvent::new(event_types::MERGE_COMPLETED, run_id)
                .with_stage(Stage::MergeVideos)
                .with_payload(serde_json::json!({
                    "inputs": scene_videos.len(),
                    "final_video": final_video.locator,
                })),
        );

        if self.config.sound_effects == SoundEffectPlacement::FinalVideo {
            match self
                .client
                .add_sound_effect(&final_video.locator, &sound_effect)
                .await
            {
                Ok(url) => {
                    final_video = Artifact::new(final_video.scene, ArtifactKind::FinalVideo, url);
                }
                Err(e) => {
                    tracing::warn!(
                        run_id = %run_id,
                        error = %e,
                        "Sound effect on final video failed, keeping the unscored merge",
                    );
                }
            }
        }

        let mut guard = run.write().await;
        guard
            .complete(final_video.clone())
            .map_err(|e| halt(e.into()))?;
        Ok(PipelineOutcome {
            run_id,
            final_video,
            completed_scenes: guard.completed_scenes(),
            scene_videos,
        })
    }

    /// Best-effort checkpoint write of a snapshot, taken without holding
    /// the lock across the file write.
    async fn checkpoint(&self, run: &SharedRun) {
        let Some(store) = &self.checkpoints else {
            return;
        };
        let snapshot = run.read().await.clone();
        if let Err(e) = store.save(&snapshot).await {
            tracing::warn!(run_id = %snapshot.id, error = %e, "Failed to write checkpoint");
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reelsmith_provider::OfflineStageClient;

    use super::*;

    #[tokio::test]
    async fn empty_idea_rejected_before_run_exists() {
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(OfflineStageClient::default()),
            PipelineConfig::default(),
            Arc::new(EventBus::default()),
        );
        let failure = orchestrator.run_pipeline("   ").await.unwrap_err();
        assert!(failure.run_id.is_nil());
        assert_matches!(
            failure.cause,
            PipelineError::Bookkeeping(reelsmith_core::CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn start_trims_idea() {
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(OfflineStageClient::default()),
            PipelineConfig::default(),
            Arc::new(EventBus::default()),
        );
        let run = orchestrator.start("  A robot learns to paint \n").unwrap();
        let guard = run.read().await;
        assert_eq!(guard.idea, "A robot learns to paint");
        assert_eq!(guard.status, reelsmith_core::RunStatus::Pending);
    }
}
