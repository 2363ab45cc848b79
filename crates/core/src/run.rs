//! The mutable aggregate state of one pipeline execution.
//!
//! A [`PipelineRun`] is created when an idea is submitted and is owned by
//! the orchestrator for the lifetime of that call. Every mutation goes
//! through the methods here so the scene records, the scene state machine
//! and the [`ArtifactStore`] never disagree.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact_store::ArtifactStore;
use crate::error::CoreError;
use crate::scene_state::{SceneState, SceneStatus};
use crate::storyboard::Storyboard;
use crate::types::{Artifact, ArtifactKind, ArtifactRef, SceneIndex, Stage, Timestamp};

/// Kinds discarded when a failed scene is reset for a resumed run.
///
/// Character and setting images survive: they are shared by every scene.
const SCENE_LOCAL_KINDS: [ArtifactKind; 4] = [
    ArtifactKind::CombinedImage,
    ArtifactKind::FrameImage,
    ArtifactKind::SceneVideo,
    ArtifactKind::ScoredVideo,
];

// ---------------------------------------------------------------------------
// Status / failure types
// ---------------------------------------------------------------------------

/// Lifecycle of the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Whether [`resume`](crate::PipelineRun::prepare_resume) may pick this
    /// run up again.
    pub fn is_resumable(self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Cancelled)
    }
}

/// Which stage of a scene failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// The first fatal failure of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// `None` outside any scene (storyboard, character, merge).
    pub scene: Option<SceneIndex>,
    pub stage: Stage,
    pub message: String,
    pub completed_scenes: usize,
}

// ---------------------------------------------------------------------------
// SceneRecord
// ---------------------------------------------------------------------------

/// Per-scene mutable state. Artifact fields are back-references into the
/// run's [`ArtifactStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub index: SceneIndex,
    pub description: String,
    pub state: SceneState,
    pub status: SceneStatus,
    /// Shared character image (always stored under scene 1).
    pub character: Option<ArtifactRef>,
    /// Shared setting image (always stored under scene 1).
    pub setting_image: Option<ArtifactRef>,
    pub combined_image: Option<ArtifactRef>,
    pub starting_image: Option<ArtifactRef>,
    pub video: Option<ArtifactRef>,
    pub scored_video: Option<ArtifactRef>,
    pub failure: Option<StageFailure>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl SceneRecord {
    fn new(index: SceneIndex, description: String) -> Self {
        Self {
            index,
            description,
            state: SceneState::Init,
            status: SceneStatus::Pending,
            character: None,
            setting_image: None,
            combined_image: None,
            starting_image: None,
            video: None,
            scored_video: None,
            failure: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// The clip that goes into the final merge: the scored variant when one
    /// exists, otherwise the raw scene video.
    pub fn merge_input(&self) -> Option<ArtifactRef> {
        self.scored_video.or(self.video)
    }
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub idea: String,
    pub status: RunStatus,
    storyboard: Option<Storyboard>,
    scenes: Vec<SceneRecord>,
    artifacts: ArtifactStore,
    pub final_video: Option<ArtifactRef>,
    pub failure: Option<RunFailure>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PipelineRun {
    pub fn new(idea: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            idea: idea.into(),
            status: RunStatus::Pending,
            storyboard: None,
            scenes: Vec::new(),
            artifacts: ArtifactStore::new(),
            final_video: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    // ---- read access ----

    pub fn storyboard(&self) -> Option<&Storyboard> {
        self.storyboard.as_ref()
    }

    pub fn scenes(&self) -> &[SceneRecord] {
        &self.scenes
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn scene(&self, index: SceneIndex) -> Result<&SceneRecord, CoreError> {
        self.scenes.get(index.offset()).ok_or_else(|| {
            CoreError::Internal(format!("run {} has no scene {index}", self.id))
        })
    }

    /// Shared character/setting artifacts live under scene 1.
    pub fn shared_artifact(&self, kind: ArtifactKind) -> Result<&Artifact, CoreError> {
        self.artifacts.get(SceneIndex::FIRST, kind)
    }

    pub fn resolve(&self, reference: ArtifactRef) -> Result<&Artifact, CoreError> {
        self.artifacts.resolve(reference)
    }

    /// Number of scenes that reached `Done`.
    pub fn completed_scenes(&self) -> usize {
        self.scenes
            .iter()
            .filter(|s| s.state == SceneState::Done)
            .count()
    }

    /// First scene that has not reached `Done`, in scene order.
    pub fn next_unfinished_scene(&self) -> Option<SceneIndex> {
        self.scenes
            .iter()
            .find(|s| s.state != SceneState::Done)
            .map(|s| s.index)
    }

    /// The scene and stage execution would continue from.
    pub fn resume_point(&self) -> (Option<SceneIndex>, Stage) {
        if self.storyboard.is_none() {
            return (None, Stage::Storyboard);
        }
        if !self
            .artifacts
            .contains(SceneIndex::FIRST, ArtifactKind::CharacterImage)
        {
            return (None, Stage::CharacterPrompt);
        }
        match self.next_unfinished_scene() {
            Some(index) => (Some(index), index.position().first_stage()),
            None => (None, Stage::MergeVideos),
        }
    }

    /// Ordered merge inputs. Fails if any scene is not `Done`.
    pub fn merge_inputs(&self) -> Result<Vec<Artifact>, CoreError> {
        self.scenes
            .iter()
            .map(|scene| {
                let reference = scene
                    .merge_input()
                    .filter(|_| scene.state == SceneState::Done)
                    .ok_or(CoreError::ArtifactNotFound {
                        scene: scene.index,
                        kind: ArtifactKind::SceneVideo,
                    })?;
                self.artifacts.resolve(reference).cloned()
            })
            .collect()
    }

    // ---- run lifecycle ----

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.failure = None;
        self.touch();
    }

    pub fn mark_failed(&mut self, failure: RunFailure) {
        self.status = RunStatus::Failed;
        self.failure = Some(failure);
        self.touch();
    }

    pub fn mark_cancelled(&mut self, failure: RunFailure) {
        self.status = RunStatus::Cancelled;
        self.failure = Some(failure);
        self.touch();
    }

    /// Store the merged output and finish the run.
    pub fn complete(&mut self, final_video: Artifact) -> Result<ArtifactRef, CoreError> {
        if final_video.kind != ArtifactKind::FinalVideo {
            return Err(CoreError::Internal(format!(
                "expected a final-video artifact, got {}",
                final_video.kind
            )));
        }
        let reference = self.artifacts.put(final_video)?;
        self.final_video = Some(reference);
        self.status = RunStatus::Succeeded;
        self.failure = None;
        self.touch();
        Ok(reference)
    }

    /// Attach the validated storyboard and create one pending record per
    /// scene. A run has exactly one storyboard.
    pub fn attach_storyboard(&mut self, storyboard: Storyboard) -> Result<(), CoreError> {
        if self.storyboard.is_some() {
            return Err(CoreError::Internal(format!(
                "run {} already has a storyboard",
                self.id
            )));
        }
        self.scenes = storyboard
            .scenes()
            .iter()
            .map(|s| SceneRecord::new(s.index, s.description.clone()))
            .collect();
        self.storyboard = Some(storyboard);
        self.touch();
        Ok(())
    }

    // ---- scene mutation ----

    /// Record an artifact and link it into its scene's record.
    pub fn store_artifact(&mut self, artifact: Artifact) -> Result<ArtifactRef, CoreError> {
        let scene = artifact.scene;
        let kind = artifact.kind;
        if kind == ArtifactKind::FinalVideo {
            return Err(CoreError::Internal(
                "final video must be stored through complete()".to_string(),
            ));
        }
        // Validate the scene exists before touching the store.
        self.scene(scene)?;
        let reference = self.artifacts.put(artifact)?;
        let record = self.scene_mut(scene)?;
        match kind {
            ArtifactKind::CharacterImage => record.character = Some(reference),
            ArtifactKind::SettingImage => record.setting_image = Some(reference),
            ArtifactKind::CombinedImage => record.combined_image = Some(reference),
            ArtifactKind::FrameImage => record.starting_image = Some(reference),
            ArtifactKind::SceneVideo => record.video = Some(reference),
            ArtifactKind::ScoredVideo => record.scored_video = Some(reference),
            ArtifactKind::FinalVideo => {}
        }
        self.touch();
        Ok(reference)
    }

    /// Mark a scene as running and link the shared artifacts into it.
    pub fn begin_scene(&mut self, index: SceneIndex) -> Result<(), CoreError> {
        let character = self
            .artifacts
            .contains(SceneIndex::FIRST, ArtifactKind::CharacterImage)
            .then(|| ArtifactRef::new(SceneIndex::FIRST, ArtifactKind::CharacterImage));
        let setting = self
            .artifacts
            .contains(SceneIndex::FIRST, ArtifactKind::SettingImage)
            .then(|| ArtifactRef::new(SceneIndex::FIRST, ArtifactKind::SettingImage));

        let record = self.scene_mut(index)?;
        if record.state != SceneState::Init {
            return Err(CoreError::Internal(format!(
                "scene {index} cannot begin from state {}",
                record.state
            )));
        }
        record.status = SceneStatus::Running;
        record.character = character;
        record.setting_image = setting;
        record.started_at = Some(chrono::Utc::now());
        self.touch();
        Ok(())
    }

    /// Move a scene to its next state.
    pub fn advance_scene(&mut self, index: SceneIndex, next: SceneState) -> Result<(), CoreError> {
        if next == SceneState::Failed {
            return Err(CoreError::Internal(
                "use fail_scene to record a failure".to_string(),
            ));
        }
        let record = self.scene_mut(index)?;
        record.state = record.state.transition(index, next)?;
        if next == SceneState::Done {
            record.status = SceneStatus::Succeeded;
            record.completed_at = Some(chrono::Utc::now());
        }
        self.touch();
        Ok(())
    }

    /// Point the scene's starting image at an already-stored artifact
    /// (scene 1 starts from its combined image).
    pub fn set_starting_image(
        &mut self,
        index: SceneIndex,
        reference: ArtifactRef,
    ) -> Result<(), CoreError> {
        self.artifacts.resolve(reference)?;
        self.scene_mut(index)?.starting_image = Some(reference);
        self.touch();
        Ok(())
    }

    /// Move a scene to `Failed`, recording the stage and message.
    pub fn fail_scene(
        &mut self,
        index: SceneIndex,
        stage: Stage,
        message: impl Into<String>,
    ) -> Result<(), CoreError> {
        let record = self.scene_mut(index)?;
        record.state = record.state.transition(index, SceneState::Failed)?;
        record.status = SceneStatus::Failed;
        record.failure = Some(StageFailure {
            stage,
            message: message.into(),
        });
        record.completed_at = Some(chrono::Utc::now());
        self.touch();
        Ok(())
    }

    /// Prepare a failed or cancelled run for another attempt.
    ///
    /// Completed scenes keep their artifacts. The first unfinished scene
    /// loses its scene-local artifacts and returns to `Init`; later scenes
    /// were never started and stay untouched. Returns the scene to resume
    /// from, or `None` when no scene needs work (every scene is done, or the
    /// storyboard was never attached).
    pub fn prepare_resume(&mut self) -> Result<Option<SceneIndex>, CoreError> {
        if !self.status.is_resumable() {
            return Err(CoreError::Validation(format!(
                "run {} cannot be resumed while {:?}",
                self.id, self.status
            )));
        }
        let next = self.next_unfinished_scene();
        if let Some(index) = next {
            for kind in SCENE_LOCAL_KINDS {
                self.artifacts.remove(index, kind);
            }
            let record = self.scene_mut(index)?;
            let description = std::mem::take(&mut record.description);
            *record = SceneRecord::new(index, description);
        }
        self.status = RunStatus::Pending;
        self.failure = None;
        self.touch();
        Ok(next)
    }

    fn scene_mut(&mut self, index: SceneIndex) -> Result<&mut SceneRecord, CoreError> {
        let id = self.id;
        self.scenes
            .get_mut(index.offset())
            .ok_or_else(|| CoreError::Internal(format!("run {id} has no scene {index}")))
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
