//! HTTP handlers for video records and their media uploads.
//! Upload bodies are streamed from the multipart field straight into the
//! services; nothing is buffered in memory.

use crate::{
    auth::AuthUser,
    errors::AppError,
    models::video::{NewVideo, Video},
    services::video_store::VideoStoreError,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures::StreamExt;
use std::io;
use uuid::Uuid;

const VIDEO_FIELD: &str = "video";
const THUMBNAIL_FIELD: &str = "thumbnail";

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("Invalid ID"))
}

fn lookup_error(err: VideoStoreError) -> AppError {
    match err {
        VideoStoreError::NotFound(_) => AppError::not_found("Couldn't find video"),
        other => {
            tracing::error!(error = %other, "video lookup failed");
            AppError::internal("Couldn't get video")
        }
    }
}

/// `POST /api/videos`: register a video the caller can upload media to.
pub async fn create_video(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<NewVideo>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("Title is required"));
    }

    let video = state.videos.create(user_id, payload).await.map_err(|err| {
        tracing::error!(error = %err, "failed to create video");
        AppError::internal("Couldn't create video")
    })?;

    tracing::info!(video_id = %video.id, user_id = %user_id, "video created");
    Ok((StatusCode::CREATED, Json(video)))
}

/// `GET /api/videos`: the caller's videos, newest first.
pub async fn list_videos(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Video>>, AppError> {
    let videos = state
        .videos
        .list_for_user(user_id)
        .await
        .map_err(lookup_error)?;
    Ok(Json(videos))
}

/// `GET /api/videos/{video_id}`
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let video = state.videos.get(video_id).await.map_err(lookup_error)?;
    if video.user_id != user_id {
        return Err(AppError::unauthorized("You don't own this video"));
    }
    Ok(Json(video))
}

/// `POST /api/video_upload/{video_id}`: multipart field `video`.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let body = field.map(|chunk| chunk.map_err(io::Error::other));
        let video = state
            .pipeline
            .upload_video(user_id, video_id, content_type.as_deref(), body)
            .await?;
        return Ok(Json(video));
    }

    Err(AppError::bad_request("Unable to parse form file"))
}

/// `POST /api/thumbnail_upload/{video_id}`: multipart field `thumbnail`.
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some(THUMBNAIL_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let body = field.map(|chunk| chunk.map_err(io::Error::other));
        let video = state
            .thumbnails
            .upload_thumbnail(user_id, video_id, content_type.as_deref(), body)
            .await?;
        return Ok(Json(video));
    }

    Err(AppError::bad_request("Unable to parse form file"))
}
