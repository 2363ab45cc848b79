pub mod health;
pub mod media;
pub mod runs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /runs                       list, start
/// /runs/{id}                  snapshot
/// /runs/{id}/cancel           request cancellation (POST)
/// /runs/{id}/resume           resume a failed or cancelled run (POST)
///
/// /frames/extract             ad hoc frame extraction (POST)
///
/// /videos/merge               ad hoc merge (POST)
/// /videos/sound-effect        ad hoc sound effect (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/runs", runs::router())
        .merge(media::router())
}
