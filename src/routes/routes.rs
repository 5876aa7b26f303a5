//! Defines the HTTP surface of the service.
//!
//! ## Structure
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Video records** (bearer token required)
//!   - `POST /api/videos`: create a video record
//!   - `GET  /api/videos`: list the caller's videos
//!   - `GET  /api/videos/{video_id}`: fetch one video
//!
//! - **Uploads** (bearer token required, multipart bodies)
//!   - `POST /api/video_upload/{video_id}`: field `video`, `video/mp4` only
//!   - `POST /api/thumbnail_upload/{video_id}`: field `thumbnail`, JPEG or PNG
//!
//! - **Public files**
//!   - `GET  /assets/{name}`: thumbnails
//!   - `GET|HEAD /objects/{bucket}/{*key}`: public-read objects of the local store

use crate::{
    handlers::{
        asset_handlers::{get_asset, get_object, head_object},
        health_handlers::{healthz, readyz},
        video_handlers::{create_video, get_video, list_videos, upload_thumbnail, upload_video},
    },
    services::thumbnail_service::MAX_THUMBNAIL_BYTES,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 1 << 20;

/// Build the router. Body limits come from the configured upload cap so
/// oversized requests are cut off before any processing.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let video_limit = body_limit(max_upload_bytes);
    let thumbnail_limit = body_limit(MAX_THUMBNAIL_BYTES);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/videos", post(create_video).get(list_videos))
        .route("/api/videos/{video_id}", get(get_video))
        .route(
            "/api/video_upload/{video_id}",
            post(upload_video).layer(DefaultBodyLimit::max(video_limit)),
        )
        .route(
            "/api/thumbnail_upload/{video_id}",
            post(upload_thumbnail).layer(DefaultBodyLimit::max(thumbnail_limit)),
        )
        .route("/assets/{name}", get(get_asset))
        .route("/objects/{bucket}/{*key}", get(get_object).head(head_object))
}

fn body_limit(payload: u64) -> usize {
    usize::try_from(payload.saturating_add(MULTIPART_OVERHEAD_BYTES)).unwrap_or(usize::MAX)
}
