use std::fmt;

use reelsmith_core::{CoreError, SceneIndex, Stage};
use reelsmith_provider::StageError;
use uuid::Uuid;

/// Errors raised while driving a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {source}")]
    StageCallFailed {
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("Frame extraction failed for {video}: {reason}")]
    FrameExtractionFailed { video: String, reason: String },

    #[error("Merge failed: {reason}")]
    MergeFailed {
        /// Inputs that could not be read, in input order.
        unreadable: Vec<String>,
        reason: String,
    },

    #[error("Invalid storyboard: {0}")]
    InvalidStoryboard(String),

    #[error("Bookkeeping error: {0}")]
    Bookkeeping(#[from] CoreError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn stage_call(stage: Stage) -> impl FnOnce(StageError) -> PipelineError {
        move |source| PipelineError::StageCallFailed { stage, source }
    }

    /// Whether the error points at a defect rather than a provider or media
    /// failure.
    pub fn is_bookkeeping(&self) -> bool {
        matches!(self, PipelineError::Bookkeeping(e) if e.is_bookkeeping())
    }
}

/// A scene stopped at `stage`.
#[derive(Debug, thiserror::Error)]
#[error("scene {scene} failed during {stage}: {error}")]
pub struct SceneError {
    pub scene: SceneIndex,
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl SceneError {
    pub fn new(scene: SceneIndex, stage: Stage, error: impl Into<PipelineError>) -> Self {
        Self {
            scene,
            stage,
            error: error.into(),
        }
    }
}

/// The first fatal failure of a run.
///
/// Scenes before `scene_index` are `Done` and keep their artifacts, so the
/// run can be resumed from the failing scene.
#[derive(Debug)]
pub struct PipelineFailure {
    pub run_id: Uuid,
    /// `None` when the run failed outside any scene (storyboard, character,
    /// merge).
    pub scene_index: Option<SceneIndex>,
    pub stage: Stage,
    pub completed_scenes: usize,
    pub cause: PipelineError,
}

impl PipelineFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, PipelineError::Cancelled)
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scene_index {
            Some(scene) => write!(
                f,
                "run {} failed at scene {scene} during {} ({} scenes completed): {}",
                self.run_id, self.stage, self.completed_scenes, self.cause
            ),
            None => write!(
                f,
                "run {} failed during {} ({} scenes completed): {}",
                self.run_id, self.stage, self.completed_scenes, self.cause
            ),
        }
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
