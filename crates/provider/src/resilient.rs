//! Timeout and retry decorator for any [`StageClient`].
//!
//! Every call gets a mandatory per-stage timeout. Transient failures are
//! retried with exponential backoff up to [`RetryPolicy::max_attempts`];
//! permanent failures are returned immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelsmith_core::{Stage, StoryboardDraft};

use crate::client::StageClient;
use crate::error::StageError;

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Timeouts and retries applied to stage calls.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePolicy {
    /// Timeout for prompt and image stages.
    pub timeout: Duration,
    /// Timeout for video stages (generate, sound effect, merge).
    pub video_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            video_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
        }
    }
}

impl StagePolicy {
    pub fn timeout_for(&self, stage: Stage) -> Duration {
        if stage.is_video() {
            self.video_timeout
        } else {
            self.timeout
        }
    }
}

/// Calculate the next backoff delay, clamped to [`RetryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// [`StageClient`] decorator enforcing a [`StagePolicy`].
pub struct ResilientStageClient {
    inner: Arc<dyn StageClient>,
    policy: StagePolicy,
}

impl ResilientStageClient {
    pub fn new(inner: Arc<dyn StageClient>, policy: StagePolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &StagePolicy {
        &self.policy
    }

    /// Run `op` under the stage timeout, retrying transient failures.
    async fn call<T, F, Fut>(&self, stage: Stage, mut op: F) -> Result<T, StageError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StageError>> + Send,
        T: Send,
    {
        let timeout = self.policy.timeout_for(stage);
        let max_attempts = self.policy.retry.max_attempts.max(1);
        let mut delay = self.policy.retry.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout {
                    stage,
                    after: timeout,
                }),
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(stage = %stage, attempt, "Stage succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                tracing::warn!(
                    stage = %stage,
                    attempt,
                    transient = err.is_transient(),
                    error = %err,
                    "Stage call failed",
                );
                return Err(err);
            }

            tracing::warn!(
                stage = %stage,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Stage attempt {attempt}/{max_attempts} failed, retrying",
            );
            tokio::time::sleep(delay).await;
            delay = next_delay(delay, &self.policy.retry);
        }
    }
}

#[async_trait]
impl StageClient for ResilientStageClient {
    async fn storyboard(&self, idea: &str) -> Result<StoryboardDraft, StageError> {
        self.call(Stage::Storyboard, || self.inner.storyboard(idea))
            .await
    }

    async fn character_prompt(&self, name: &str, description: &str) -> Result<String, StageError> {
        self.call(Stage::CharacterPrompt, || {
            self.inner.character_prompt(name, description)
        })
        .await
    }

    async fn character_image(&self, prompt: &str) -> Result<String, StageError> {
        self.call(Stage::CharacterImage, || self.inner.character_image(prompt))
            .await
    }

    async fn setting_prompt(&self, description: &str) -> Result<String, StageError> {
        self.call(Stage::SettingPrompt, || {
            self.inner.setting_prompt(description)
        })
        .await
    }

    async fn setting_image(&self, prompt: &str) -> Result<String, StageError> {
        self.call(Stage::SettingImage, || self.inner.setting_image(prompt))
            .await
    }

    async fn combine_prompt(&self, scene_description: &str) -> Result<String, StageError> {
        self.call(Stage::CombinePrompt, || {
            self.inner.combine_prompt(scene_description)
        })
        .await
    }

    async fn combine_image(
        &self,
        prompt: &str,
        character_image: &str,
        setting_image: &str,
    ) -> Result<String, StageError> {
        self.call(Stage::CombineImage, || {
            self.inner
                .combine_image(prompt, character_image, setting_image)
        })
        .await
    }

    async fn extract_frame(&self, video_url: &str) -> Result<String, StageError> {
        self.call(Stage::ExtractFrame, || self.inner.extract_frame(video_url))
            .await
    }

    async fn video_prompt(&self, scene_description: &str) -> Result<String, StageError> {
        self.call(Stage::VideoPrompt, || {
            self.inner.video_prompt(scene_description)
        })
        .await
    }

    async fn generate_video(
        &self,
        prompt: &str,
        initial_image: &str,
    ) -> Result<String, StageError> {
        self.call(Stage::GenerateVideo, || {
            self.inner.generate_video(prompt, initial_image)
        })
        .await
    }

    async fn add_sound_effect(
        &self,
        video_url: &str,
        sound_effect: &str,
    ) -> Result<String, StageError> {
        self.call(Stage::AddSoundEffect, || {
            self.inner.add_sound_effect(video_url, sound_effect)
        })
        .await
    }

    async fn merge_videos(&self, video_urls: &[String]) -> Result<String, StageError> {
        self.call(Stage::MergeVideos, || self.inner.merge_videos(video_urls))
            .await
    }
}
