//! Ad hoc media operations outside any run.

use axum::routing::post;
use axum::Router;

use crate::handlers::media;
use crate::state::AppState;

/// ```text
/// POST   /frames/extract          -> extract_frame
/// POST   /videos/merge            -> merge_videos
/// POST   /videos/sound-effect     -> add_sound_effect
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/frames/extract", post(media::extract_frame))
        .route("/videos/merge", post(media::merge_videos))
        .route("/videos/sound-effect", post(media::add_sound_effect))
}
