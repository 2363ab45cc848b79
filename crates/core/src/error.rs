use crate::scene_state::SceneState;
use crate::types::{ArtifactKind, SceneIndex};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Artifact {kind} already stored for scene {scene}")]
    DuplicateArtifact { scene: SceneIndex, kind: ArtifactKind },

    #[error("Artifact {kind} not found for scene {scene}")]
    ArtifactNotFound { scene: SceneIndex, kind: ArtifactKind },

    #[error("Scene {scene} cannot move from {from} to {to}")]
    InvalidTransition {
        scene: SceneIndex,
        from: SceneState,
        to: SceneState,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error indicates broken internal bookkeeping rather than
    /// bad caller input.
    pub fn is_bookkeeping(&self) -> bool {
        matches!(
            self,
            CoreError::DuplicateArtifact { .. }
                | CoreError::ArtifactNotFound { .. }
                | CoreError::InvalidTransition { .. }
                | CoreError::Internal(_)
        )
    }
}
