//! Thumbnail uploads.
//!
//! Thumbnails skip all media processing: the image is written under the
//! assets directory with a random name and served from `/assets`.

use crate::{
    config::AppConfig,
    models::video::Video,
    services::{
        keys::{self, KeyError},
        upload_pipeline::media_type,
        video_store::{VideoStore, VideoStoreError},
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};
use uuid::Uuid;

/// Thumbnails are small; anything past this is rejected.
pub const MAX_THUMBNAIL_BYTES: u64 = 10 << 20;

const THUMBNAIL_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error("caller does not own this video")]
    NotOwner,
    #[error("missing Content-Type for thumbnail")]
    MissingContentType,
    #[error("thumbnail must be a JPEG or PNG image, got `{0}`")]
    UnsupportedContentType(String),
    #[error("thumbnail exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("failed to look up video: {0}")]
    Lookup(#[source] VideoStoreError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to write thumbnail: {0}")]
    Io(#[from] io::Error),
    #[error("failed to save thumbnail url: {0}")]
    Persist(#[source] VideoStoreError),
}

#[derive(Clone)]
pub struct ThumbnailService {
    config: Arc<AppConfig>,
    videos: Arc<dyn VideoStore>,
}

impl ThumbnailService {
    pub fn new(config: Arc<AppConfig>, videos: Arc<dyn VideoStore>) -> Self {
        Self { config, videos }
    }

    #[tracing::instrument(skip_all, fields(video_id = %video_id, user_id = %caller))]
    pub async fn upload_thumbnail<S>(
        &self,
        caller: Uuid,
        video_id: Uuid,
        content_type: Option<&str>,
        body: S,
    ) -> Result<Video, ThumbnailError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut video = self.videos.get(video_id).await.map_err(|err| match err {
            VideoStoreError::NotFound(id) => ThumbnailError::NotFound(id),
            other => ThumbnailError::Lookup(other),
        })?;
        if video.user_id != caller {
            return Err(ThumbnailError::NotOwner);
        }

        let content_type = content_type
            .map(media_type)
            .ok_or(ThumbnailError::MissingContentType)?;
        if !THUMBNAIL_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ThumbnailError::UnsupportedContentType(content_type));
        }

        let name = keys::asset_name(&content_type)?;
        tokio::fs::create_dir_all(&self.config.assets_root).await?;

        // write beside the destination, then rename so readers never see a partial file
        let (file, tmp_path) = tempfile::Builder::new()
            .prefix(".thumbnail")
            .tempfile_in(&self.config.assets_root)?
            .into_parts();
        let mut file = File::from_std(file);

        let mut written: u64 = 0;
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > MAX_THUMBNAIL_BYTES {
                return Err(ThumbnailError::TooLarge {
                    limit: MAX_THUMBNAIL_BYTES,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let dest = self.config.assets_root.join(&name);
        tmp_path.persist(&dest).map_err(|err| err.error)?;

        video.thumbnail_url = Some(self.config.asset_url(&name));
        video.updated_at = Utc::now();
        if let Err(err) = self.videos.update(&video).await {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(ThumbnailError::Persist(err));
        }

        tracing::info!(name = %name, size_bytes = written, "thumbnail stored");
        Ok(video)
    }
}
