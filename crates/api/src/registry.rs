//! In-memory registry of the runs this server knows about.
//!
//! Each run executes in a background task tracked by a [`TaskTracker`], with
//! its own [`CancellationToken`] derived from the server's shutdown token.
//! Cancelling the shutdown token cancels every run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reelsmith_core::{RunFailure, SceneIndex};
use reelsmith_pipeline::{CheckpointStore, PipelineError, PipelineOrchestrator, SharedRun};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// A registered run and the token that cancels its current execution.
#[derive(Clone, Debug)]
pub struct RunEntry {
    pub id: Uuid,
    pub run: SharedRun,
    pub cancel: CancellationToken,
}

pub struct RunRegistry {
    runs: RwLock<HashMap<Uuid, RunEntry>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn register(&self, run: SharedRun) -> RunEntry {
        let id = run.read().await.id;
        let entry = RunEntry {
            id,
            run,
            cancel: self.shutdown.child_token(),
        };
        self.runs.write().await.insert(id, entry.clone());
        entry
    }

    pub async fn get(&self, id: Uuid) -> Option<RunEntry> {
        self.runs.read().await.get(&id).cloned()
    }

    pub async fn entries(&self) -> Vec<RunEntry> {
        self.runs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Reset a failed or cancelled run for another execution and give it a
    /// fresh cancellation token. Both happen under the registry lock, so a
    /// concurrent cancel or resume sees either the old entry or the new one.
    ///
    /// `Ok(None)` if the run is unknown. A run that is not resumable leaves
    /// the entry and its token untouched.
    pub async fn prepare_resume(
        &self,
        id: Uuid,
        orchestrator: &PipelineOrchestrator,
    ) -> Result<Option<(RunEntry, Option<SceneIndex>)>, PipelineError> {
        let mut runs = self.runs.write().await;
        let Some(entry) = runs.get_mut(&id) else {
            return Ok(None);
        };
        let from = orchestrator.prepare_resume(&entry.run).await?;
        // The previous token may already be cancelled.
        entry.cancel = self.shutdown.child_token();
        Ok(Some((entry.clone(), from)))
    }

    /// Execute the run in the background.
    pub fn spawn_execution(&self, orchestrator: Arc<PipelineOrchestrator>, entry: RunEntry) {
        self.tasks.spawn(async move {
            match orchestrator.execute(&entry.run, &entry.cancel).await {
                Ok(outcome) => tracing::info!(
                    run_id = %entry.id,
                    final_video = %outcome.final_video.locator,
                    "Background run finished",
                ),
                Err(failure) => tracing::warn!(
                    run_id = %entry.id,
                    error = %failure,
                    "Background run stopped",
                ),
            }
        });
    }

    /// Load every checkpointed run. Runs that were still executing when the
    /// previous process stopped are marked `Cancelled` so they can be
    /// resumed. Unreadable checkpoints are skipped.
    pub async fn restore(&self, store: &CheckpointStore) -> Result<usize, PipelineError> {
        let mut restored = 0;
        for id in store.list().await? {
            let mut run = match store.load(id).await {
                Ok(run) => run,
                Err(e) => {
                    tracing::warn!(run_id = %id, error = %e, "Skipping unreadable checkpoint");
                    continue;
                }
            };
            if !run.status.is_finished() {
                let (scene, stage) = run.resume_point();
                let completed_scenes = run.completed_scenes();
                run.mark_cancelled(RunFailure {
                    scene,
                    stage,
                    message: "interrupted by server restart".to_string(),
                    completed_scenes,
                });
            }
            self.register(Arc::new(RwLock::new(run))).await;
            restored += 1;
        }
        Ok(restored)
    }

    /// Cancel every run and wait up to `timeout` for their tasks to stop.
    /// Returns `false` if some tasks were still running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.shutdown.cancel();
        self.tasks.close();
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use reelsmith_core::{PipelineRun, RunStatus};

    use super::*;

    fn orchestrator() -> PipelineOrchestrator {
        let offline = Arc::new(reelsmith_provider::OfflineStageClient::new(2));
        PipelineOrchestrator::new(
            offline,
            reelsmith_pipeline::PipelineConfig {
                scene_count: 2,
                ..Default::default()
            },
            Arc::new(reelsmith_events::EventBus::default()),
        )
    }

    #[tokio::test]
    async fn resume_renews_token_of_stopped_run() {
        let registry = RunRegistry::new();
        let mut run = PipelineRun::new("idea");
        run.mark_cancelled(RunFailure {
            scene: None,
            stage: reelsmith_core::Stage::Storyboard,
            message: "stopped".to_string(),
            completed_scenes: 0,
        });
        let entry = registry.register(Arc::new(RwLock::new(run))).await;
        entry.cancel.cancel();

        let (renewed, from) = registry
            .prepare_resume(entry.id, &orchestrator())
            .await
            .unwrap()
            .unwrap();
        assert!(!renewed.cancel.is_cancelled());
        assert_eq!(from, None);
        assert_eq!(renewed.run.read().await.status, RunStatus::Pending);

        let current = registry.get(entry.id).await.unwrap();
        assert!(!current.cancel.is_cancelled());
        assert!(registry
            .prepare_resume(Uuid::new_v4(), &orchestrator())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejected_resume_keeps_current_token() {
        let registry = RunRegistry::new();
        let entry = registry
            .register(Arc::new(RwLock::new(PipelineRun::new("idea"))))
            .await;

        // A pending run is not resumable.
        assert_matches::assert_matches!(
            registry.prepare_resume(entry.id, &orchestrator()).await,
            Err(PipelineError::Bookkeeping(_))
        );

        entry.cancel.cancel();
        assert!(registry.get(entry.id).await.unwrap().cancel.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_cancels_every_run() {
        let registry = RunRegistry::new();
        let entry = registry
            .register(Arc::new(RwLock::new(PipelineRun::new("idea"))))
            .await;
        assert!(registry.shutdown(Duration::from_secs(1)).await);
        assert!(entry.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn restore_marks_interrupted_runs_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut interrupted = PipelineRun::new("interrupted");
        interrupted.mark_running();
        store.save(&interrupted).await.unwrap();

        let registry = RunRegistry::new();
        assert_eq!(registry.restore(&store).await.unwrap(), 1);

        let entry = registry.get(interrupted.id).await.unwrap();
        let run = entry.run.read().await;
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(run.status.is_resumable());
    }
}
