//! Per-scene state machine.
//!
//! ```text
//! Init ──► SettingReady ──► CombinedReady ──► StartImageReady ──► VideoReady ──► Done
//!   │          (scene 1 only)                        ▲
//!   └────────────────── (scenes 2..N) ───────────────┘
//!
//! any non-terminal state ──► Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SceneIndex;

/// Progress of a single scene through its generation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneState {
    Init,
    /// Scene 1 only: the shared setting image exists.
    SettingReady,
    /// Scene 1 only: character and setting combined into one image.
    CombinedReady,
    StartImageReady,
    VideoReady,
    Done,
    Failed,
}

impl SceneState {
    pub fn as_str(self) -> &'static str {
        match self {
            SceneState::Init => "init",
            SceneState::SettingReady => "setting_ready",
            SceneState::CombinedReady => "combined_ready",
            SceneState::StartImageReady => "start_image_ready",
            SceneState::VideoReady => "video_ready",
            SceneState::Done => "done",
            SceneState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SceneState::Done | SceneState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SceneState) -> bool {
        use SceneState::*;
        match (self, next) {
            (Init, SettingReady)
            | (Init, StartImageReady)
            | (SettingReady, CombinedReady)
            | (CombinedReady, StartImageReady)
            | (StartImageReady, VideoReady)
            | (VideoReady, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Validate and perform a transition for `scene`.
    pub fn transition(self, scene: SceneIndex, next: SceneState) -> Result<SceneState, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                scene,
                from: self,
                to: next,
            })
        }
    }

    /// Coarse status implied by this state.
    pub fn status(self) -> SceneStatus {
        match self {
            SceneState::Init => SceneStatus::Pending,
            SceneState::Done => SceneStatus::Succeeded,
            SceneState::Failed => SceneStatus::Failed,
            _ => SceneStatus::Running,
        }
    }
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse lifecycle of a scene record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const ALL: [SceneState; 7] = [
        SceneState::Init,
        SceneState::SettingReady,
        SceneState::CombinedReady,
        SceneState::StartImageReady,
        SceneState::VideoReady,
        SceneState::Done,
        SceneState::Failed,
    ];

    #[test]
    fn first_scene_path_is_legal() {
        let path = [
            SceneState::Init,
            SceneState::SettingReady,
            SceneState::CombinedReady,
            SceneState::StartImageReady,
            SceneState::VideoReady,
            SceneState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn subsequent_scene_skips_setting_and_combine() {
        assert!(SceneState::Init.can_transition_to(SceneState::StartImageReady));
        assert!(!SceneState::Init.can_transition_to(SceneState::CombinedReady));
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        for state in ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(state.can_transition_to(SceneState::Failed), "{state}");
        }
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for from in [SceneState::Done, SceneState::Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn skipping_video_is_rejected() {
        let scene = SceneIndex::new(2).unwrap();
        assert_matches!(
            SceneState::StartImageReady.transition(scene, SceneState::Done),
            Err(CoreError::InvalidTransition {
                from: SceneState::StartImageReady,
                to: SceneState::Done,
                ..
            })
        );
    }

    #[test]
    fn status_follows_state() {
        assert_eq!(SceneState::Init.status(), SceneStatus::Pending);
        assert_eq!(SceneState::VideoReady.status(), SceneStatus::Running);
        assert_eq!(SceneState::Done.status(), SceneStatus::Succeeded);
        assert_eq!(SceneState::Failed.status(), SceneStatus::Failed);
    }
}
