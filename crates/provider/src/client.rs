//! The capability interface the pipeline depends on.

use async_trait::async_trait;
use reelsmith_core::StoryboardDraft;

use crate::error::StageError;

/// One operation per generation capability offered by the provider.
///
/// Every call is fallible, not idempotent and potentially slow. Image and
/// video operations return the opaque locator (usually a URL) of the
/// produced media; prompt operations return prompt text.
#[async_trait]
pub trait StageClient: Send + Sync {
    /// Character, scenes and ambient sound effect for an idea.
    async fn storyboard(&self, idea: &str) -> Result<StoryboardDraft, StageError>;

    async fn character_prompt(&self, name: &str, description: &str) -> Result<String, StageError>;

    /// 1:1 character portrait on a solid dark background.
    async fn character_image(&self, prompt: &str) -> Result<String, StageError>;

    async fn setting_prompt(&self, description: &str) -> Result<String, StageError>;

    /// 16:9 cinematic setting image.
    async fn setting_image(&self, prompt: &str) -> Result<String, StageError>;

    async fn combine_prompt(&self, scene_description: &str) -> Result<String, StageError>;

    /// Place the character into the setting, producing a 16:9 image.
    async fn combine_image(
        &self,
        prompt: &str,
        character_image: &str,
        setting_image: &str,
    ) -> Result<String, StageError>;

    /// A representative (not first) frame of a video, as an image.
    async fn extract_frame(&self, video_url: &str) -> Result<String, StageError>;

    async fn video_prompt(&self, scene_description: &str) -> Result<String, StageError>;

    /// 5 s, 480p, 24 fps, 16:9 clip animated from `initial_image`.
    async fn generate_video(&self, prompt: &str, initial_image: &str)
        -> Result<String, StageError>;

    async fn add_sound_effect(
        &self,
        video_url: &str,
        sound_effect: &str,
    ) -> Result<String, StageError>;

    /// Concatenate videos in order. The provider requires at least two.
    async fn merge_videos(&self, video_urls: &[String]) -> Result<String, StageError>;
}
