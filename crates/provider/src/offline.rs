//! Deterministic local backend.
//!
//! Produces `offline://{stage}/{digest}.{ext}` locators derived from the call
//! inputs, so the same inputs always yield the same output. Every call is
//! recorded in order, and failures or delays can be injected per stage.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reelsmith_core::storyboard::{SceneDraft, DEFAULT_SCENE_COUNT, DEFAULT_SOUND_EFFECT};
use reelsmith_core::{Character, Stage, StoryboardDraft};
use sha2::{Digest, Sha256};

use crate::client::StageClient;
use crate::error::StageError;

/// One recorded call: the stage and its inputs in argument order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCall {
    pub stage: Stage,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum FailOn {
    /// The n-th call (1-based) to the stage.
    Call(u32),
    Always,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    stage: Stage,
    on: FailOn,
    transient: bool,
}

#[derive(Default)]
struct OfflineState {
    calls: Vec<StageCall>,
    counters: HashMap<Stage, u32>,
    failures: Vec<InjectedFailure>,
    delays: HashMap<Stage, Duration>,
    storyboard: Option<StoryboardDraft>,
}

/// Offline [`StageClient`] for dry runs and tests.
pub struct OfflineStageClient {
    scene_count: u32,
    state: Mutex<OfflineState>,
}

impl OfflineStageClient {
    /// A backend whose generated storyboards have `scene_count` scenes.
    pub fn new(scene_count: u32) -> Self {
        Self {
            scene_count,
            state: Mutex::new(OfflineState::default()),
        }
    }

    /// Return `draft` from every storyboard call instead of generating one.
    pub fn with_storyboard(self, draft: StoryboardDraft) -> Self {
        self.lock().storyboard = Some(draft);
        self
    }

    /// Fail the `call_number`-th call (1-based) to `stage`.
    ///
    /// Transient failures look like a 503, permanent ones like a 422.
    pub fn fail_stage(&self, stage: Stage, call_number: u32, transient: bool) {
        self.lock().failures.push(InjectedFailure {
            stage,
            on: FailOn::Call(call_number),
            transient,
        });
    }

    /// Fail every call to `stage`.
    pub fn fail_stage_always(&self, stage: Stage, transient: bool) {
        self.lock().failures.push(InjectedFailure {
            stage,
            on: FailOn::Always,
            transient,
        });
    }

    /// Sleep for `delay` before answering calls to `stage`.
    pub fn delay_stage(&self, stage: Stage, delay: Duration) {
        self.lock().delays.insert(stage, delay);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StageCall> {
        self.lock().calls.clone()
    }

    /// Calls made to one stage, in order.
    pub fn calls_to(&self, stage: Stage) -> Vec<StageCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.stage == stage)
            .cloned()
            .collect()
    }

    pub fn call_count(&self, stage: Stage) -> usize {
        self.lock().calls.iter().filter(|c| c.stage == stage).count()
    }

    /// The locator this backend produces for `stage` given `inputs`.
    pub fn locator_for(stage: Stage, inputs: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for input in inputs {
            hasher.update(input.as_bytes());
            hasher.update([0x1f]);
        }
        let digest = hasher.finalize();
        let short: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        let ext = if stage.is_video() { "mp4" } else { "png" };
        format!("offline://{}/{short}.{ext}", stage.as_str())
    }

    // ---- private helpers ----

    fn lock(&self) -> std::sync::MutexGuard<'_, OfflineState> {
        // A poisoned lock only means a test panicked mid-call; the recorded
        // state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call, then apply any injected delay and failure.
    async fn enter(&self, stage: Stage, inputs: &[&str]) -> Result<(), StageError> {
        let (delay, failure) = {
            let mut state = self.lock();
            state.calls.push(StageCall {
                stage,
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
            });
            let counter = state.counters.entry(stage).or_insert(0);
            *counter += 1;
            let call_number = *counter;
            let failure = state.failures.iter().copied().find(|f| {
                f.stage == stage
                    && match f.on {
                        FailOn::Call(n) => n == call_number,
                        FailOn::Always => true,
                    }
            });
            (state.delays.get(&stage).copied(), failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            None => Ok(()),
            Some(f) if f.transient => Err(StageError::Api {
                status: 503,
                body: format!("injected transient failure in {stage}"),
            }),
            Some(_) => Err(StageError::Api {
                status: 422,
                body: format!("injected permanent failure in {stage}"),
            }),
        }
    }

    async fn produce(&self, stage: Stage, inputs: &[&str]) -> Result<String, StageError> {
        self.enter(stage, inputs).await?;
        Ok(Self::locator_for(stage, inputs))
    }

    async fn prompt(&self, stage: Stage, inputs: &[&str]) -> Result<String, StageError> {
        self.enter(stage, inputs).await?;
        Ok(format!("{stage} prompt: {}", inputs.join(" / ")))
    }

    fn generate_storyboard(&self, idea: &str) -> StoryboardDraft {
        let scenes = (1..=self.scene_count)
            .map(|n| SceneDraft {
                scene_number: Some(serde_json::Value::String(n.to_string())),
                setting: (n == 1).then(|| format!("The world of: {idea}")),
                description: format!("Scene {n} of {}: {idea}", self.scene_count),
            })
            .collect();
        StoryboardDraft {
            characters: vec![Character {
                name: "Protagonist".to_string(),
                description: format!("The main character of: {idea}"),
            }],
            sound_effect: Some(DEFAULT_SOUND_EFFECT.to_string()),
            scenes,
        }
    }
}

impl Default for OfflineStageClient {
    fn default() -> Self {
        Self::new(DEFAULT_SCENE_COUNT)
    }
}

#[async_trait]
impl StageClient for OfflineStageClient {
    async fn storyboard(&self, idea: &str) -> Result<StoryboardDraft, StageError> {
        self.enter(Stage::Storyboard, &[idea]).await?;
        let fixed = self.lock().storyboard.clone();
        Ok(fixed.unwrap_or_else(|| self.generate_storyboard(idea)))
    }

    async fn character_prompt(&self, name: &str, description: &str) -> Result<String, StageError> {
        self.prompt(Stage::CharacterPrompt, &[description, name])
            .await
    }

    async fn character_image(&self, prompt: &str) -> Result<String, StageError> {
        self.produce(Stage::CharacterImage, &[prompt]).await
    }

    async fn setting_prompt(&self, description: &str) -> Result<String, StageError> {
        self.prompt(Stage::SettingPrompt, &[description]).await
    }

    async fn setting_image(&self, prompt: &str) -> Result<String, StageError> {
        self.produce(Stage::SettingImage, &[prompt]).await
    }

    async fn combine_prompt(&self, scene_description: &str) -> Result<String, StageError> {
        self.prompt(Stage::CombinePrompt, &[scene_description]).await
    }

    async fn combine_image(
        &self,
        prompt: &str,
        character_image: &str,
        setting_image: &str,
    ) -> Result<String, StageError> {
        self.produce(
            Stage::CombineImage,
            &[prompt, character_image, setting_image],
        )
        .await
    }

    async fn extract_frame(&self, video_url: &str) -> Result<String, StageError> {
        self.produce(Stage::ExtractFrame, &[video_url]).await
    }

    async fn video_prompt(&self, scene_description: &str) -> Result<String, StageError> {
        self.prompt(Stage::VideoPrompt, &[scene_description]).await
    }

    async fn generate_video(
        &self,
        prompt: &str,
        initial_image: &str,
    ) -> Result<String, StageError> {
        self.produce(Stage::GenerateVideo, &[prompt, initial_image])
            .await
    }

    async fn add_sound_effect(
        &self,
        video_url: &str,
        sound_effect: &str,
    ) -> Result<String, StageError> {
        self.produce(Stage::AddSoundEffect, &[video_url, sound_effect])
            .await
    }

    async fn merge_videos(&self, video_urls: &[String]) -> Result<String, StageError> {
        let inputs: Vec<&str> = video_urls.iter().map(String::as_str).collect();
        if inputs.len() < 2 {
            self.enter(Stage::MergeVideos, &inputs).await?;
            return Err(StageError::Api {
                status: 400,
                body: "At least 2 video URLs are required for merging".to_string(),
            });
        }
        self.produce(Stage::MergeVideos, &inputs).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
