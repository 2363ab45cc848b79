//! JSON checkpoints of [`PipelineRun`] state.
//!
//! One file per run, `run_{id}.json`, rewritten after every scene. A
//! checkpoint written after scene `k` holds scenes `1..=k` as `Done` and is
//! enough to resume the run from scene `k + 1` in a new process.

use std::path::{Path, PathBuf};

use reelsmith_core::PipelineRun;
use uuid::Uuid;

use crate::error::PipelineError;

/// Default directory for run checkpoints.
pub const DEFAULT_CHECKPOINT_DIR: &str = "data/checkpoints";

const FILE_PREFIX: &str = "run_";
const FILE_SUFFIX: &str = ".json";

/// Directory-backed store for run checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{run_id}{FILE_SUFFIX}"))
    }

    /// Write the run's current state. The previous checkpoint is replaced
    /// atomically.
    pub async fn save(&self, run: &PipelineRun) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| checkpoint_error("create", &self.dir, e))?;

        let json = serde_json::to_vec_pretty(run)
            .map_err(|e| PipelineError::Checkpoint(format!("serialize run {}: {e}", run.id)))?;

        let path = self.path_for(run.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| checkpoint_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| checkpoint_error("rename", &tmp, e))?;

        tracing::debug!(
            run_id = %run.id,
            completed_scenes = run.completed_scenes(),
            path = %path.display(),
            "Checkpoint written",
        );
        Ok(path)
    }

    pub async fn load(&self, run_id: Uuid) -> Result<PipelineRun, PipelineError> {
        let path = self.path_for(run_id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| checkpoint_error("read", &path, e))?;
        let run: PipelineRun = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::Checkpoint(format!("parse {}: {e}", path.display())))?;
        if run.id != run_id {
            return Err(PipelineError::Checkpoint(format!(
                "{} holds run {}, expected {run_id}",
                path.display(),
                run.id
            )));
        }
        Ok(run)
    }

    /// Ids of every checkpointed run, sorted. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<Uuid>, PipelineError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(checkpoint_error("list", &self.dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| checkpoint_error("list", &self.dir, e))?
        {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
                .and_then(|n| Uuid::parse_str(n).ok())
            else {
                continue;
            };
            ids.push(id);
        }
        ids.sort();
        Ok(ids)
    }
}

fn checkpoint_error(action: &str, path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::Checkpoint(format!("{action} {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reelsmith_core::storyboard::SceneDraft;
    use reelsmith_core::{
        Artifact, ArtifactKind, Character, SceneIndex, SceneState, Storyboard, StoryboardDraft,
    };

    use super::*;

    fn run_with_one_done_scene() -> PipelineRun {
        let draft = StoryboardDraft {
            characters: vec![Character {
                name: "Mira".into(),
                description: "A lighthouse keeper".into(),
            }],
            sound_effect: None,
            scenes: (1..=2)
                .map(|n| SceneDraft {
                    scene_number: Some(serde_json::json!(n)),
                    setting: Some("A storm-lashed coast".into()),
                    description: format!("Beat {n}"),
                })
                .collect(),
        };
        let scene = SceneIndex::FIRST;
        let mut run = PipelineRun::new("A lighthouse in a storm");
        run.attach_storyboard(Storyboard::from_draft(draft, 2).unwrap())
            .unwrap();
        run.begin_scene(scene).unwrap();
        run.store_artifact(Artifact::new(scene, ArtifactKind::FrameImage, "f1"))
            .unwrap();
        run.advance_scene(scene, SceneState::StartImageReady).unwrap();
        run.store_artifact(Artifact::new(scene, ArtifactKind::SceneVideo, "v1"))
            .unwrap();
        run.advance_scene(scene, SceneState::VideoReady).unwrap();
        run.advance_scene(scene, SceneState::Done).unwrap();
        run
    }

    #[tokio::test]
    async fn save_then_load_restores_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints"));
        let run = run_with_one_done_scene();

        let path = store.save(&run).await.unwrap();
        assert_eq!(path, store.path_for(run.id));
        assert!(!path.with_extension("json.tmp").exists());

        let restored = store.load(run.id).await.unwrap();
        assert_eq!(restored, run);
        assert_eq!(restored.next_unfinished_scene(), Some(SceneIndex::new(2).unwrap()));
    }

    #[tokio::test]
    async fn save_overwrites_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut run = run_with_one_done_scene();
        store.save(&run).await.unwrap();

        run.mark_running();
        store.save(&run).await.unwrap();

        assert_eq!(store.load(run.id).await.unwrap().status, run.status);
        assert_eq!(store.list().await.unwrap(), vec![run.id]);
    }

    #[tokio::test]
    async fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert_matches!(
            store.load(Uuid::new_v4()).await,
            Err(PipelineError::Checkpoint(_))
        );
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let id = Uuid::new_v4();
        std::fs::write(store.path_for(id), b"{not json").unwrap();
        assert_matches!(
            store.load(id).await,
            Err(PipelineError::Checkpoint(msg)) if msg.contains("parse")
        );
    }

    #[tokio::test]
    async fn list_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("run_nope.json"), b"{}").unwrap();
        assert!(store.list().await.unwrap().is_empty());

        let missing = CheckpointStore::new(dir.path().join("absent"));
        assert!(missing.list().await.unwrap().is_empty());
    }
}
