//! Video record persistence.

use crate::models::video::{NewVideo, Video};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum VideoStoreError {
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type VideoStoreResult<T> = Result<T, VideoStoreError>;

/// Key-value access to video records by id.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn get(&self, id: Uuid) -> VideoStoreResult<Video>;

    /// Overwrite the mutable fields of an existing record.
    async fn update(&self, video: &Video) -> VideoStoreResult<()>;

    async fn create(&self, user_id: Uuid, new: NewVideo) -> VideoStoreResult<Video>;

    async fn list_for_user(&self, user_id: Uuid) -> VideoStoreResult<Vec<Video>>;
}

#[derive(Clone)]
pub struct SqliteVideoStore {
    db: Arc<SqlitePool>,
}

impl SqliteVideoStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoStore for SqliteVideoStore {
    async fn get(&self, id: Uuid) -> VideoStoreResult<Video> {
        sqlx::query_as::<_, Video>(
            "SELECT id, user_id, title, description, thumbnail_url, video_url,
                    created_at, updated_at
             FROM videos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(VideoStoreError::NotFound(id))
    }

    async fn update(&self, video: &Video) -> VideoStoreResult<()> {
        let result = sqlx::query(
            "UPDATE videos
             SET title = ?, description = ?, thumbnail_url = ?, video_url = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(video.updated_at)
        .bind(video.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VideoStoreError::NotFound(video.id));
        }
        Ok(())
    }

    async fn create(&self, user_id: Uuid, new: NewVideo) -> VideoStoreResult<Video> {
        let now = Utc::now();
        let video = Video {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            description: new.description,
            thumbnail_url: None,
            video_url: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO videos
                (id, user_id, title, description, thumbnail_url, video_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(video.id)
        .bind(video.user_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&*self.db)
        .await?;

        Ok(video)
    }

    async fn list_for_user(&self, user_id: Uuid) -> VideoStoreResult<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(
            "SELECT id, user_id, title, description, thumbnail_url, video_url,
                    created_at, updated_at
             FROM videos WHERE user_id = ?
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(videos)
    }
}
