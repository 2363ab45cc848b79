//! Executes the stages of one scene against the shared run state.
//!
//! Lock discipline: the runner takes a short lock on the [`PipelineRun`] to
//! read inputs or record a result, and never holds it across a stage call.
//! Readers can snapshot the run while a stage is in flight.

use std::sync::Arc;

use reelsmith_core::{
    Artifact, ArtifactKind, PipelineRun, SceneIndex, ScenePosition, SceneState, Stage,
};
use reelsmith_provider::StageClient;
use tokio::sync::RwLock;

use crate::config::SoundEffectPlacement;
use crate::error::{PipelineError, SceneError};
use crate::frame_bridge::FrameBridge;

/// A run shared between the orchestrator (writer) and progress readers.
pub type SharedRun = Arc<RwLock<PipelineRun>>;

/// Inputs a scene reads from the storyboard before its first stage.
struct SceneInputs {
    description: String,
    opening_setting: String,
    sound_effect: String,
}

/// Drives a single scene from `Init` to `Done`.
///
/// Scene 1 builds its starting image from the shared character and a fresh
/// setting; every later scene starts from a frame of the previous scene's
/// video. Any failed stage moves the scene to `Failed` and stops it.
pub struct SceneRunner {
    client: Arc<dyn StageClient>,
    frame_bridge: Arc<dyn FrameBridge>,
    sound_effects: SoundEffectPlacement,
    refine_video_prompt: bool,
}

impl SceneRunner {
    pub fn new(
        client: Arc<dyn StageClient>,
        frame_bridge: Arc<dyn FrameBridge>,
        sound_effects: SoundEffectPlacement,
        refine_video_prompt: bool,
    ) -> Self {
        Self {
            client,
            frame_bridge,
            sound_effects,
            refine_video_prompt,
        }
    }

    /// Run scene `index` to completion.
    ///
    /// On failure the scene record is already `Failed` when this returns.
    pub async fn run(&self, run: &SharedRun, index: SceneIndex) -> Result<(), SceneError> {
        let first_stage = index.position().first_stage();
        let inputs = {
            let mut guard = run.write().await;
            guard
                .begin_scene(index)
                .map_err(|e| SceneError::new(index, first_stage, e))?;
            scene_inputs(&guard, index).map_err(|e| SceneError::new(index, first_stage, e))?
        };

        let result = self.drive(run, index, &inputs).await;

        if let Err(err) = &result {
            tracing::warn!(
                scene = %index,
                stage = %err.stage,
                error = %err.error,
                "Scene failed",
            );
            let mut guard = run.write().await;
            if let Err(e) = guard.fail_scene(index, err.stage, err.error.to_string()) {
                tracing::error!(scene = %index, error = %e, "Could not record scene failure");
            }
        }
        result
    }

    async fn drive(
        &self,
        run: &SharedRun,
        index: SceneIndex,
        inputs: &SceneInputs,
    ) -> Result<(), SceneError> {
        let starting_image = match index.position() {
            ScenePosition::First => self.opening_image(run, index, inputs).await?,
            ScenePosition::Subsequent { previous } => {
                self.bridged_image(run, index, previous).await?
            }
        };

        let video = self
            .generate_video(run, index, inputs, &starting_image)
            .await?;

        if self.sound_effects == SoundEffectPlacement::PerScene {
            self.score(run, index, &video, &inputs.sound_effect).await?;
        }

        let mut guard = run.write().await;
        guard
            .advance_scene(index, SceneState::Done)
            .map_err(|e| SceneError::new(index, Stage::GenerateVideo, e))?;
        tracing::info!(scene = %index, video = %video.locator, "Scene done");
        Ok(())
    }

    /// Scene 1: setting (unless already stored), then combine with the
    /// character. The combined image is the starting image.
    async fn opening_image(
        &self,
        run: &SharedRun,
        index: SceneIndex,
        inputs: &SceneInputs,
    ) -> Result<Artifact, SceneError> {
        let fail = |stage: Stage| move |e: PipelineError| SceneError::new(index, stage, e);

        let existing_setting = {
            let guard = run.read().await;
            guard.shared_artifact(ArtifactKind::SettingImage).ok().cloned()
        };

        let setting = match existing_setting {
            Some(setting) => {
                tracing::debug!(scene = %index, "Reusing stored setting image");
                setting
            }
            None => {
                let prompt = self
                    .client
                    .setting_prompt(&inputs.opening_setting)
                    .await
                    .map_err(PipelineError::stage_call(Stage::SettingPrompt))
                    .map_err(fail(Stage::SettingPrompt))?;
                let url = self
                    .client
                    .setting_image(&prompt)
                    .await
                    .map_err(PipelineError::stage_call(Stage::SettingImage))
                    .map_err(fail(Stage::SettingImage))?;
                let setting = Artifact::new(SceneIndex::FIRST, ArtifactKind::SettingImage, url);
                run.write()
                    .await
                    .store_artifact(setting.clone())
                    .map_err(|e| fail(Stage::SettingImage)(e.into()))?;
                setting
            }
        };
        {
            let mut guard = run.write().await;
            guard
                .advance_scene(index, SceneState::SettingReady)
                .map_err(|e| fail(Stage::SettingImage)(e.into()))?;
        }

        let character = {
            let guard = run.read().await;
            guard
                .shared_artifact(ArtifactKind::CharacterImage)
                .cloned()
                .map_err(|e| fail(Stage::CombineImage)(e.into()))?
        };

        let prompt = self
            .client
            .combine_prompt(&inputs.description)
            .await
            .map_err(PipelineError::stage_call(Stage::CombinePrompt))
            .map_err(fail(Stage::CombinePrompt))?;
        let url = self
            .client
            .combine_image(&prompt, &character.locator, &setting.locator)
            .await
            .map_err(PipelineError::stage_call(Stage::CombineImage))
            .map_err(fail(Stage::CombineImage))?;

        let combined = Artifact::new(index, ArtifactKind::CombinedImage, url);
        let mut guard = run.write().await;
        let record = |e: reelsmith_core::CoreError| fail(Stage::CombineImage)(e.into());
        let reference = guard.store_artifact(combined.clone()).map_err(record)?;
        guard
            .advance_scene(index, SceneState::CombinedReady)
            .map_err(record)?;
        guard.set_starting_image(index, reference).map_err(record)?;
        guard
            .advance_scene(index, SceneState::StartImageReady)
            .map_err(record)?;
        Ok(combined)
    }

    /// Scenes 2..N: a frame of the previous scene's raw video.
    async fn bridged_image(
        &self,
        run: &SharedRun,
        index: SceneIndex,
        previous: SceneIndex,
    ) -> Result<Artifact, SceneError> {
        let fail = |e: PipelineError| SceneError::new(index, Stage::ExtractFrame, e);

        let previous_video = {
            let guard = run.read().await;
            let reference = guard
                .scene(previous)
                .map_err(|e| fail(e.into()))?
                .video
                .ok_or(reelsmith_core::CoreError::ArtifactNotFound {
                    scene: previous,
                    kind: ArtifactKind::SceneVideo,
                })
                .map_err(|e| fail(e.into()))?;
            guard.resolve(reference).cloned().map_err(|e| fail(e.into()))?
        };

        let frame = self
            .frame_bridge
            .extract_frame(&previous_video)
            .await
            .map_err(fail)?;
        if frame.scene != index || frame.kind != ArtifactKind::FrameImage {
            return Err(fail(PipelineError::Bookkeeping(
                reelsmith_core::CoreError::Internal(format!(
                    "frame bridge returned {} for scene {} instead of a frame for scene {index}",
                    frame.kind, frame.scene
                )),
            )));
        }

        let mut guard = run.write().await;
        guard
            .store_artifact(frame.clone())
            .map_err(|e| fail(e.into()))?;
        guard
            .advance_scene(index, SceneState::StartImageReady)
            .map_err(|e| fail(e.into()))?;
        Ok(frame)
    }

    async fn generate_video(
        &self,
        run: &SharedRun,
        index: SceneIndex,
        inputs: &SceneInputs,
        starting_image: &Artifact,
    ) -> Result<Artifact, SceneError> {
        let prompt = if self.refine_video_prompt {
            self.client
                .video_prompt(&inputs.description)
                .await
                .map_err(PipelineError::stage_call(Stage::VideoPrompt))
                .map_err(|e| SceneError::new(index, Stage::VideoPrompt, e))?
        } else {
            inputs.description.clone()
        };

        let url = self
            .client
            .generate_video(&prompt, &starting_image.locator)
            .await
            .map_err(PipelineError::stage_call(Stage::GenerateVideo))
            .map_err(|e| SceneError::new(index, Stage::GenerateVideo, e))?;

        let video = Artifact::new(index, ArtifactKind::SceneVideo, url);
        let mut guard = run.write().await;
        let record = |e: reelsmith_core::CoreError| SceneError::new(index, Stage::GenerateVideo, e);
        guard.store_artifact(video.clone()).map_err(record)?;
        guard
            .advance_scene(index, SceneState::VideoReady)
            .map_err(record)?;
        Ok(video)
    }

    /// Best-effort sound effect. A provider failure keeps the unscored clip;
    /// only bookkeeping errors fail the scene.
    async fn score(
        &self,
        run: &SharedRun,
        index: SceneIndex,
        video: &Artifact,
        sound_effect: &str,
    ) -> Result<(), SceneError> {
        match self
            .client
            .add_sound_effect(&video.locator, sound_effect)
            .await
        {
            Ok(url) => {
                run.write()
                    .await
                    .store_artifact(Artifact::new(index, ArtifactKind::ScoredVideo, url))
                    .map_err(|e| SceneError::new(index, Stage::AddSoundEffect, e))?;
            }
            Err(e) => {
                tracing::warn!(
                    scene = %index,
                    sound_effect,
                    error = %e,
                    "Sound effect failed, keeping the original clip",
                );
            }
        }
        Ok(())
    }
}

fn scene_inputs(run: &PipelineRun, index: SceneIndex) -> Result<SceneInputs, PipelineError> {
    let storyboard = run.storyboard().ok_or_else(|| {
        PipelineError::Bookkeeping(reelsmith_core::CoreError::Internal(format!(
            "run {} has no storyboard",
            run.id
        )))
    })?;
    let scene = storyboard.scene(index).ok_or_else(|| {
        PipelineError::Bookkeeping(reelsmith_core::CoreError::Internal(format!(
            "storyboard has no scene {index}"
        )))
    })?;
    Ok(SceneInputs {
        description: scene.description.clone(),
        opening_setting: storyboard.opening_setting().to_string(),
        sound_effect: storyboard.sound_effect().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reelsmith_core::storyboard::SceneDraft;
    use reelsmith_core::{Character, SceneStatus, Storyboard, StoryboardDraft};
    use reelsmith_provider::OfflineStageClient;

    use super::*;
    use crate::frame_bridge::RemoteFrameBridge;

    fn scene(n: u32) -> SceneIndex {
        SceneIndex::new(n).unwrap()
    }

    fn shared_run(count: u32) -> SharedRun {
        let draft = StoryboardDraft {
            characters: vec![Character {
                name: "Unit 7".into(),
                description: "A small rusted robot".into(),
            }],
            sound_effect: Some("brush".into()),
            scenes: (1..=count)
                .map(|n| SceneDraft {
                    scene_number: None,
                    setting: (n == 1).then(|| "A sunlit attic".to_string()),
                    description: format!("The robot paints stroke {n}"),
                })
                .collect(),
        };
        let mut run = PipelineRun::new("A robot learns to paint");
        run.attach_storyboard(Storyboard::from_draft(draft, count).unwrap())
            .unwrap();
        run.store_artifact(Artifact::new(
            SceneIndex::FIRST,
            ArtifactKind::CharacterImage,
            "https://cdn/character.png",
        ))
        .unwrap();
        Arc::new(RwLock::new(run))
    }

    fn runner(offline: &Arc<OfflineStageClient>, sound: SoundEffectPlacement) -> SceneRunner {
        SceneRunner::new(
            offline.clone(),
            Arc::new(RemoteFrameBridge::new(offline.clone())),
            sound,
            false,
        )
    }

    #[tokio::test]
    async fn first_scene_combines_character_and_setting() {
        let offline = Arc::new(OfflineStageClient::default());
        let run = shared_run(2);

        runner(&offline, SoundEffectPlacement::Disabled)
            .run(&run, scene(1))
            .await
            .unwrap();

        let guard = run.read().await;
        let record = guard.scene(scene(1)).unwrap();
        assert_eq!(record.state, SceneState::Done);
        assert_eq!(record.status, SceneStatus::Succeeded);

        let setting = guard.shared_artifact(ArtifactKind::SettingImage).unwrap();
        let combine = &offline.calls_to(Stage::CombineImage)[0];
        assert_eq!(combine.inputs[1], "https://cdn/character.png");
        assert_eq!(combine.inputs[2], setting.locator);

        let combined = guard.artifacts().get(scene(1), ArtifactKind::CombinedImage).unwrap();
        assert_eq!(
            record.starting_image,
            Some(combined.reference()),
            "scene 1 starts from its combined image"
        );
        let video_call = &offline.calls_to(Stage::GenerateVideo)[0];
        assert_eq!(video_call.inputs[0], "The robot paints stroke 1");
        assert_eq!(video_call.inputs[1], combined.locator);
    }

    #[tokio::test]
    async fn later_scene_starts_from_previous_frame() {
        let offline = Arc::new(OfflineStageClient::default());
        let run = shared_run(2);
        let runner = runner(&offline, SoundEffectPlacement::Disabled);

        runner.run(&run, scene(1)).await.unwrap();
        runner.run(&run, scene(2)).await.unwrap();

        let guard = run.read().await;
        let video1 = guard.artifacts().get(scene(1), ArtifactKind::SceneVideo).unwrap();
        let frame2 = guard.artifacts().get(scene(2), ArtifactKind::FrameImage).unwrap();
        assert_eq!(offline.calls_to(Stage::ExtractFrame)[0].inputs, vec![video1.locator.clone()]);
        assert_eq!(offline.calls_to(Stage::GenerateVideo)[1].inputs[1], frame2.locator);

        // Only scene 1 touches setting and combine stages.
        assert_eq!(offline.call_count(Stage::SettingImage), 1);
        assert_eq!(offline.call_count(Stage::CombineImage), 1);
        assert_eq!(
            guard.scene(scene(2)).unwrap().setting_image,
            guard.scene(scene(1)).unwrap().setting_image
        );
    }

    #[tokio::test]
    async fn sound_effect_failure_keeps_raw_clip() {
        let offline = Arc::new(OfflineStageClient::default());
        offline.fail_stage_always(Stage::AddSoundEffect, false);
        let run = shared_run(1);

        runner(&offline, SoundEffectPlacement::PerScene)
            .run(&run, scene(1))
            .await
            .unwrap();

        let guard = run.read().await;
        let record = guard.scene(scene(1)).unwrap();
        assert_eq!(record.state, SceneState::Done);
        assert!(record.scored_video.is_none());
        assert_eq!(record.merge_input(), record.video);
    }

    #[tokio::test]
    async fn sound_effect_uses_storyboard_word() {
        let offline = Arc::new(OfflineStageClient::default());
        let run = shared_run(1);

        runner(&offline, SoundEffectPlacement::PerScene)
            .run(&run, scene(1))
            .await
            .unwrap();

        assert_eq!(offline.calls_to(Stage::AddSoundEffect)[0].inputs[1], "brush");
        let guard = run.read().await;
        assert!(guard.scene(scene(1)).unwrap().scored_video.is_some());
    }

    #[tokio::test]
    async fn failed_stage_marks_scene_failed_and_stops() {
        let offline = Arc::new(OfflineStageClient::default());
        offline.fail_stage(Stage::CombinePrompt, 1, false);
        let run = shared_run(1);

        let err = runner(&offline, SoundEffectPlacement::PerScene)
            .run(&run, scene(1))
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::CombinePrompt);
        assert_matches!(err.error, PipelineError::StageCallFailed { stage: Stage::CombinePrompt, .. });
        assert_eq!(offline.call_count(Stage::CombineImage), 0);
        assert_eq!(offline.call_count(Stage::GenerateVideo), 0);

        let guard = run.read().await;
        let record = guard.scene(scene(1)).unwrap();
        assert_eq!(record.state, SceneState::Failed);
        assert_eq!(record.failure.as_ref().unwrap().stage, Stage::CombinePrompt);
    }

    #[tokio::test]
    async fn refined_prompt_replaces_description() {
        let offline = Arc::new(OfflineStageClient::default());
        let run = shared_run(1);
        let runner = SceneRunner::new(
            offline.clone(),
            Arc::new(RemoteFrameBridge::new(offline.clone())),
            SoundEffectPlacement::Disabled,
            true,
        );

        runner.run(&run, scene(1)).await.unwrap();

        assert_eq!(offline.call_count(Stage::VideoPrompt), 1);
        let prompt = &offline.calls_to(Stage::GenerateVideo)[0].inputs[0];
        assert!(prompt.starts_with("video-prompt prompt:"), "{prompt}");
    }

    #[tokio::test]
    async fn existing_setting_is_reused() {
        let offline = Arc::new(OfflineStageClient::default());
        let run = shared_run(1);
        run.write()
            .await
            .store_artifact(Artifact::new(
                SceneIndex::FIRST,
                ArtifactKind::SettingImage,
                "https://cdn/setting.png",
            ))
            .unwrap();

        runner(&offline, SoundEffectPlacement::Disabled)
            .run(&run, scene(1))
            .await
            .unwrap();

        assert_eq!(offline.call_count(Stage::SettingPrompt), 0);
        assert_eq!(offline.call_count(Stage::SettingImage), 0);
        assert_eq!(
            offline.calls_to(Stage::CombineImage)[0].inputs[2],
            "https://cdn/setting.png"
        );
    }
}
