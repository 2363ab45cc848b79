//! JSON-over-HTTP client for the generation service.
//!
//! Every endpoint is `POST {base_url}/{stage}` with a small JSON body and
//! answers with an envelope:
//!
//! ```json
//! { "status": "success", "message": "...", "image_url": "https://..." }
//! { "status": "error",   "message": "Failed to generate image: ..." }
//! ```

use async_trait::async_trait;
use reelsmith_core::{Stage, StoryboardDraft};
use serde::Deserialize;
use serde_json::json;

use crate::client::StageClient;
use crate::error::StageError;

/// HTTP client for one generation service instance.
pub struct HttpStageClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// Turn an `"error"` envelope into [`StageError::Provider`].
    fn into_success(self) -> Result<Self, StageError> {
        match self.status.as_str() {
            "success" => Ok(self),
            "error" => Err(StageError::Provider {
                message: self
                    .message
                    .unwrap_or_else(|| "unknown provider error".to_string()),
            }),
            other => Err(StageError::InvalidResponse(format!(
                "unexpected envelope status {other:?}"
            ))),
        }
    }

    /// A required non-empty string payload field.
    fn text(&self, field: &str) -> Result<String, StageError> {
        self.fields
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StageError::InvalidResponse(format!("response has no {field}")))
    }

    fn take(&mut self, field: &str) -> Result<serde_json::Value, StageError> {
        self.fields
            .remove(field)
            .filter(|v| !v.is_null())
            .ok_or_else(|| StageError::InvalidResponse(format!("response has no {field}")))
    }
}

impl HttpStageClient {
    /// * `base_url` - e.g. `http://localhost:8000`, without a trailing slash.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- private helpers ----

    async fn post(&self, stage: Stage, body: serde_json::Value) -> Result<Envelope, StageError> {
        let url = format!("{}/{}", self.base_url, stage.as_str());
        tracing::debug!(stage = %stage, url = %url, "Calling provider");

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let envelope: Envelope = Self::parse_response(response).await?;
        envelope.into_success()
    }

    async fn post_for(
        &self,
        stage: Stage,
        body: serde_json::Value,
        field: &str,
    ) -> Result<String, StageError> {
        self.post(stage, body).await?.text(field)
    }

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or [`StageError::Api`] with the body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StageError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StageError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StageError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| StageError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn storyboard(&self, idea: &str) -> Result<StoryboardDraft, StageError> {
        let mut envelope = self.post(Stage::Storyboard, json!({ "idea": idea })).await?;
        let data = envelope.take("data")?;
        serde_json::from_value(data)
            .map_err(|e| StageError::InvalidResponse(format!("storyboard data: {e}")))
    }

    async fn character_prompt(&self, name: &str, description: &str) -> Result<String, StageError> {
        self.post_for(
            Stage::CharacterPrompt,
            json!({ "description": description, "name": name }),
            "prompt",
        )
        .await
    }

    async fn character_image(&self, prompt: &str) -> Result<String, StageError> {
        self.post_for(Stage::CharacterImage, json!({ "prompt": prompt }), "image_url")
            .await
    }

    async fn setting_prompt(&self, description: &str) -> Result<String, StageError> {
        self.post_for(
            Stage::SettingPrompt,
            json!({ "description": description }),
            "prompt",
        )
        .await
    }

    async fn setting_image(&self, prompt: &str) -> Result<String, StageError> {
        self.post_for(Stage::SettingImage, json!({ "prompt": prompt }), "image_url")
            .await
    }

    async fn combine_prompt(&self, scene_description: &str) -> Result<String, StageError> {
        self.post_for(
            Stage::CombinePrompt,
            json!({ "scene_description": scene_description }),
            "prompt",
        )
        .await
    }

    async fn combine_image(
        &self,
        prompt: &str,
        character_image: &str,
        setting_image: &str,
    ) -> Result<String, StageError> {
        self.post_for(
            Stage::CombineImage,
            json!({
                "prompt": prompt,
                "character_image": character_image,
                "setting_image": setting_image,
            }),
            "image_url",
        )
        .await
    }

    async fn extract_frame(&self, video_url: &str) -> Result<String, StageError> {
        self.post_for(
            Stage::ExtractFrame,
            json!({ "video_url": video_url }),
            "frame_url",
        )
        .await
    }

    async fn video_prompt(&self, scene_description: &str) -> Result<String, StageError> {
        self.post_for(
            Stage::VideoPrompt,
            json!({ "scene_description": scene_description }),
            "prompt",
        )
        .await
    }

    async fn generate_video(
        &self,
        prompt: &str,
        initial_image: &str,
    ) -> Result<String, StageError> {
        self.post_for(
            Stage::GenerateVideo,
            json!({ "prompt": prompt, "initial_image": initial_image }),
            "video_url",
        )
        .await
    }

    async fn add_sound_effect(
        &self,
        video_url: &str,
        sound_effect: &str,
    ) -> Result<String, StageError> {
        self.post_for(
            Stage::AddSoundEffect,
            json!({ "video_url": video_url, "sound_effect": sound_effect }),
            "video_url",
        )
        .await
    }

    async fn merge_videos(&self, video_urls: &[String]) -> Result<String, StageError> {
        self.post_for(
            Stage::MergeVideos,
            json!({ "video_urls": video_urls }),
            "merged_video_url",
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
