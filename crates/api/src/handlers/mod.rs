//! Request handlers.
//!
//! Handlers delegate to the [`PipelineOrchestrator`](reelsmith_pipeline::PipelineOrchestrator)
//! and the run registry, and map errors via [`AppError`](crate::error::AppError).

pub mod media;
pub mod runs;
