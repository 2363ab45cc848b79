//! Reelsmith progress events.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`]: the event envelope published by the orchestrator.
//! - [`event_types`]: the dot-separated event names.

pub mod bus;

pub use bus::{event_types, EventBus, PipelineEvent};
