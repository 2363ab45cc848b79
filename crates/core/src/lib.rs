//! Domain types and bookkeeping for the reelsmith generation pipeline.
//!
//! This crate has no internal dependencies so it can be shared by the
//! provider adapters, the pipeline orchestrator, the API and the worker.
//!
//! - [`types`]: scene indices, stages, artifact kinds and references.
//! - [`storyboard`]: validated storyboard built from a provider draft.
//! - [`artifact_store`]: the write-once record of every produced artifact.
//! - [`scene_state`]: the per-scene state machine.
//! - [`run`]: the mutable aggregate state of one pipeline execution.
//! - [`ffmpeg`]: `ffprobe`/`ffmpeg` command helpers.
//! - [`config`]: environment-variable parsing for `from_env` constructors.

pub mod artifact_store;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod run;
pub mod scene_state;
pub mod storyboard;
pub mod types;

pub use artifact_store::ArtifactStore;
pub use error::CoreError;
pub use run::{PipelineRun, RunFailure, RunStatus, SceneRecord, StageFailure};
pub use scene_state::{SceneState, SceneStatus};
pub use storyboard::{Character, SceneDescriptor, Storyboard, StoryboardDraft};
pub use types::{Artifact, ArtifactKind, ArtifactRef, SceneIndex, ScenePosition, Stage};
