use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reelsmith_core::config::{env_opt, env_or, env_parse, parse_flag, parse_value};
use reelsmith_core::storyboard::{validate_scene_count, DEFAULT_SCENE_COUNT};
use reelsmith_core::CoreError;
use reelsmith_provider::{RetryPolicy, StagePolicy};

/// Default directory for downloaded media, extracted frames and merges.
pub const DEFAULT_MEDIA_DIR: &str = "data/media";

/// Where the storyboard's ambient sound effect is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundEffectPlacement {
    Disabled,
    /// On every scene clip before merging.
    #[default]
    PerScene,
    /// Once, on the merged video.
    FinalVideo,
}

impl FromStr for SoundEffectPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" | "disabled" => Ok(Self::Disabled),
            "per-scene" | "scene" => Ok(Self::PerScene),
            "final" | "final-video" => Ok(Self::FinalVideo),
            other => Err(format!(
                "unknown sound effect placement {other:?} (expected off, per-scene or final)"
            )),
        }
    }
}

/// Which implementation extracts frames and merges videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaBackend {
    /// The provider's `extract-frame` and `merge-videos` capabilities.
    #[default]
    Remote,
    /// Local `ffprobe`/`ffmpeg`.
    Ffmpeg,
}

impl FromStr for MediaBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "ffmpeg" | "local" => Ok(Self::Ffmpeg),
            other => Err(format!(
                "unknown media backend {other:?} (expected remote or ffmpeg)"
            )),
        }
    }
}

/// Pipeline behaviour settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Scenes per storyboard.
    pub scene_count: u32,
    pub stage_policy: StagePolicy,
    pub sound_effects: SoundEffectPlacement,
    /// Run the video-prompt stage instead of using scene descriptions verbatim.
    pub refine_video_prompt: bool,
    /// Checkpointing is disabled when `None`.
    pub checkpoint_dir: Option<PathBuf>,
    pub media_backend: MediaBackend,
    pub media_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scene_count: DEFAULT_SCENE_COUNT,
            stage_policy: StagePolicy::default(),
            sound_effects: SoundEffectPlacement::default(),
            refine_video_prompt: false,
            checkpoint_dir: None,
            media_backend: MediaBackend::default(),
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default       |
    /// |---------------------------------|---------------|
    /// | `REELSMITH_SCENE_COUNT`         | `12`          |
    /// | `REELSMITH_STAGE_TIMEOUT_SECS`  | `120`         |
    /// | `REELSMITH_VIDEO_TIMEOUT_SECS`  | `600`         |
    /// | `REELSMITH_MAX_ATTEMPTS`        | `3`           |
    /// | `REELSMITH_RETRY_INITIAL_MS`    | `2000`        |
    /// | `REELSMITH_CHECKPOINT_DIR`      | (disabled)    |
    /// | `REELSMITH_SOUND_EFFECT`        | `per-scene`   |
    /// | `REELSMITH_REFINE_VIDEO_PROMPT` | `false`       |
    /// | `REELSMITH_MEDIA_BACKEND`       | `remote`      |
    /// | `REELSMITH_MEDIA_DIR`           | `data/media`  |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = StagePolicy::default();

        let scene_count = env_parse("REELSMITH_SCENE_COUNT", DEFAULT_SCENE_COUNT)?;
        let stage_timeout = env_parse(
            "REELSMITH_STAGE_TIMEOUT_SECS",
            defaults.timeout.as_secs(),
        )?;
        let video_timeout = env_parse(
            "REELSMITH_VIDEO_TIMEOUT_SECS",
            defaults.video_timeout.as_secs(),
        )?;
        let max_attempts = env_parse("REELSMITH_MAX_ATTEMPTS", defaults.retry.max_attempts)?;
        let retry_initial_ms = env_parse(
            "REELSMITH_RETRY_INITIAL_MS",
            defaults.retry.initial_delay.as_millis() as u64,
        )?;

        let sound_effects = parse_value(
            "REELSMITH_SOUND_EFFECT",
            &env_or("REELSMITH_SOUND_EFFECT", "per-scene"),
        )?;
        let refine_video_prompt = parse_flag(
            "REELSMITH_REFINE_VIDEO_PROMPT",
            &env_or("REELSMITH_REFINE_VIDEO_PROMPT", "false"),
        )?;
        let media_backend = parse_value(
            "REELSMITH_MEDIA_BACKEND",
            &env_or("REELSMITH_MEDIA_BACKEND", "remote"),
        )?;

        let config = Self {
            scene_count,
            stage_policy: StagePolicy {
                timeout: Duration::from_secs(stage_timeout),
                video_timeout: Duration::from_secs(video_timeout),
                retry: RetryPolicy {
                    max_attempts,
                    initial_delay: Duration::from_millis(retry_initial_ms),
                    ..defaults.retry
                },
            },
            sound_effects,
            refine_video_prompt,
            checkpoint_dir: env_opt("REELSMITH_CHECKPOINT_DIR").map(PathBuf::from),
            media_backend,
            media_dir: PathBuf::from(env_or("REELSMITH_MEDIA_DIR", DEFAULT_MEDIA_DIR)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_scene_count(self.scene_count)?;
        if self.stage_policy.retry.max_attempts == 0 {
            return Err(CoreError::Validation(
                "REELSMITH_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.stage_policy.timeout.is_zero() || self.stage_policy.video_timeout.is_zero() {
            return Err(CoreError::Validation(
                "stage timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
