//! Adapters for the external generation provider.
//!
//! The pipeline only ever talks to a [`StageClient`]. This crate supplies
//! three implementations:
//!
//! - [`HttpStageClient`]: JSON-over-HTTP client for the generation service.
//! - [`OfflineStageClient`]: deterministic local backend with failure
//!   injection, used for dry runs and tests.
//! - [`ResilientStageClient`]: decorator adding per-call timeouts and
//!   bounded retries with exponential backoff to any client.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod offline;
pub mod resilient;

pub use client::StageClient;
pub use config::{Backend, ProviderConfig};
pub use error::StageError;
pub use http::HttpStageClient;
pub use offline::{OfflineStageClient, StageCall};
pub use resilient::{next_delay, ResilientStageClient, RetryPolicy, StagePolicy};
