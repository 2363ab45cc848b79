//! Write-once record of every artifact produced during a run.
//!
//! The store is the single source of truth for artifact locators. Scene
//! records and stage inputs refer to entries by [`ArtifactRef`] and resolve
//! them here, so nothing hands raw URLs from one stage to the next.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{Artifact, ArtifactKind, ArtifactRef, SceneIndex};

/// Artifacts keyed by `(scene, kind)`. At most one artifact per key.
///
/// Serializes as a flat, ordered list of artifacts so checkpoints stay
/// readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Artifact>", into = "Vec<Artifact>")]
pub struct ArtifactStore {
    artifacts: HashMap<ArtifactRef, Artifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an artifact. Fails with [`CoreError::DuplicateArtifact`] if an
    /// artifact of the same kind already exists for the same scene.
    pub fn put(&mut self, artifact: Artifact) -> Result<ArtifactRef, CoreError> {
        let key = artifact.reference();
        if self.artifacts.contains_key(&key) {
            return Err(CoreError::DuplicateArtifact {
                scene: key.scene,
                kind: key.kind,
            });
        }
        self.artifacts.insert(key, artifact);
        Ok(key)
    }

    /// Look up an artifact. Fails with [`CoreError::ArtifactNotFound`].
    pub fn get(&self, scene: SceneIndex, kind: ArtifactKind) -> Result<&Artifact, CoreError> {
        self.artifacts
            .get(&ArtifactRef::new(scene, kind))
            .ok_or(CoreError::ArtifactNotFound { scene, kind })
    }

    /// Resolve a back-reference held by a scene record.
    pub fn resolve(&self, reference: ArtifactRef) -> Result<&Artifact, CoreError> {
        self.get(reference.scene, reference.kind)
    }

    pub fn contains(&self, scene: SceneIndex, kind: ArtifactKind) -> bool {
        self.artifacts.contains_key(&ArtifactRef::new(scene, kind))
    }

    /// Drop an artifact. Only used when a failed scene is reset for resume.
    pub fn remove(&mut self, scene: SceneIndex, kind: ArtifactKind) -> Option<Artifact> {
        self.artifacts.remove(&ArtifactRef::new(scene, kind))
    }

    /// All artifacts of one scene, ordered by kind.
    pub fn artifacts_for(&self, scene: SceneIndex) -> Vec<&Artifact> {
        let mut found: Vec<&Artifact> = self
            .artifacts
            .values()
            .filter(|a| a.scene == scene)
            .collect();
        found.sort_by_key(|a| a.kind);
        found
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl From<Vec<Artifact>> for ArtifactStore {
    fn from(list: Vec<Artifact>) -> Self {
        let artifacts = list.into_iter().map(|a| (a.reference(), a)).collect();
        Self { artifacts }
    }
}

impl From<ArtifactStore> for Vec<Artifact> {
    fn from(store: ArtifactStore) -> Self {
        let mut list: Vec<Artifact> = store.artifacts.into_values().collect();
        list.sort_by_key(|a| a.reference());
        list
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
