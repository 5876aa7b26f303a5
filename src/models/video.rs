//! Represents a video record owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A video the user has registered and may attach media to.
///
/// The record is created empty; `video_url` and `thumbnail_url` are filled in
/// place by the upload paths once the media is stored.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Video {
    /// Unique identifier for this video.
    pub id: Uuid,

    /// ID of the user who created the video.
    pub user_id: Uuid,

    pub title: String,

    pub description: String,

    /// Public URL of the thumbnail, once uploaded.
    pub thumbnail_url: Option<String>,

    /// Public URL of the processed video, set only after a verified upload.
    pub video_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for `POST /api/videos`.
#[derive(Deserialize, Clone, Debug)]
pub struct NewVideo {
    pub title: String,
    #[serde(default)]
    pub description: String,
}
