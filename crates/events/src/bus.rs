//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`PipelineEvent`]s. It is
//! shared via `Arc<EventBus>` between the orchestrator and whatever is
//! watching progress (the API, the worker's log sink, tests).

use chrono::{DateTime, Utc};
use reelsmith_core::{SceneIndex, Stage};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Event names published by the pipeline.
pub mod event_types {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_RESUMED: &str = "run.resumed";
    pub const STORYBOARD_READY: &str = "run.storyboard_ready";
    pub const CHARACTER_READY: &str = "run.character_ready";
    pub const SCENE_STARTED: &str = "scene.started";
    pub const SCENE_SUCCEEDED: &str = "scene.succeeded";
    pub const SCENE_FAILED: &str = "scene.failed";
    pub const MERGE_COMPLETED: &str = "run.merge_completed";
    pub const RUN_SUCCEEDED: &str = "run.succeeded";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_CANCELLED: &str = "run.cancelled";
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Something that happened during a pipeline run.
///
/// Constructed via [`PipelineEvent::new`] and enriched with
/// [`with_scene`](PipelineEvent::with_scene),
/// [`with_stage`](PipelineEvent::with_stage) and
/// [`with_payload`](PipelineEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Dot-separated event name, e.g. `"scene.succeeded"`.
    pub event_type: String,

    pub run_id: Uuid,

    pub scene_index: Option<SceneIndex>,

    pub stage: Option<Stage>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(event_type: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            run_id,
            scene_index: None,
            stage: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_scene(mut self, scene: SceneIndex) -> Self {
        self.scene_index = Some(scene);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use reelsmith_events::bus::{event_types, EventBus, PipelineEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PipelineEvent::new(event_types::RUN_STARTED, uuid::Uuid::new_v4()));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody is listening.
    pub fn publish(&self, event: PipelineEvent) {
        tracing::trace!(
            event_type = %event.event_type,
            run_id = %event.run_id,
            "Publishing pipeline event",
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
