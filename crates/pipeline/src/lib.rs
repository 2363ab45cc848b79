//! The reel generation pipeline.
//!
//! [`PipelineOrchestrator`] turns an idea into a finished multi-scene video:
//! storyboard, shared character, then one [`SceneRunner`] pass per scene in
//! narrative order, and finally a [`VideoMerger`] pass over the scene clips.
//! Scenes after the first start from a frame of the previous scene's video,
//! obtained through a [`FrameBridge`].

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod frame_bridge;
pub mod media;
pub mod merger;
pub mod orchestrator;
pub mod scene_runner;

pub use checkpoint::CheckpointStore;
pub use config::{MediaBackend, PipelineConfig, SoundEffectPlacement};
pub use error::{PipelineError, PipelineFailure, SceneError};
pub use frame_bridge::{FfmpegFrameBridge, FrameBridge, RemoteFrameBridge};
pub use merger::{FfmpegVideoMerger, RemoteVideoMerger, VideoMerger};
pub use orchestrator::{PipelineOrchestrator, PipelineOutcome};
pub use scene_runner::{SceneRunner, SharedRun};
