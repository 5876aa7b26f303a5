//! The video upload pipeline.
//!
//! One call handles one request and runs these steps in order, stopping at
//! the first failure:
//!
//! 1. load the record and check the caller owns it
//! 2. accept only `video/mp4`
//! 3. stage the body on local disk, then rewind it
//! 4. classify orientation with `ffprobe` (best effort, falls back to `other`)
//! 5. rewrite for fast start with `ffmpeg`
//! 6. derive the object key from the orientation
//! 7. put the artifact as `public-read`, then `head` it to verify
//! 8. record the public URL on the video
//!
//! Nothing is retried. Staged and processed files are owned by drop guards,
//! so they are removed however the call ends.

use crate::{
    config::AppConfig,
    models::video::Video,
    services::{
        aspect::{AspectClassifier, AspectRatio, MetadataProbe},
        keys::{self, KeyError},
        object_store::{ObjectAcl, ObjectStore, ObjectStoreError, PutObject},
        remux::{RemuxError, Remuxer},
        staging::{ProcessedArtifact, StageError, StagedUpload},
        video_store::{VideoStore, VideoStoreError},
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use std::{io, sync::Arc};
use thiserror::Error;
use uuid::Uuid;

/// The only media type accepted for video uploads.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error("caller does not own this video")]
    NotOwner,
    #[error("missing Content-Type for video")]
    MissingContentType,
    #[error("unsupported content type `{0}`, expected video/mp4")]
    UnsupportedContentType(String),
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("failed to look up video: {0}")]
    Lookup(#[source] VideoStoreError),
    #[error("failed to stage upload: {0}")]
    Stage(#[source] StageError),
    #[error("failed to process video: {0}")]
    Remux(#[from] RemuxError),
    #[error("failed to build object key: {0}")]
    Key(#[from] KeyError),
    #[error("failed to read processed video: {0}")]
    Artifact(#[source] io::Error),
    #[error("failed to upload `{key}`: {source}")]
    Upload {
        key: String,
        #[source]
        source: ObjectStoreError,
    },
    #[error("failed to verify upload of `{key}`: {reason}")]
    Verify { key: String, reason: String },
    #[error("failed to save video url (object `{key}` is orphaned): {source}")]
    Persist {
        key: String,
        #[source]
        source: VideoStoreError,
    },
}

impl UploadError {
    /// Message safe to show the caller for failures that are logged instead.
    pub fn public_message(&self) -> &'static str {
        match self {
            UploadError::Remux(_) => "Error processing video",
            UploadError::Upload { .. } => "Error uploading video",
            UploadError::Verify { .. } => "Error verifying video upload",
            UploadError::Persist { .. } => "Error updating video",
            _ => "Internal server error",
        }
    }
}

impl From<StageError> for UploadError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::TooLarge { limit } => UploadError::TooLarge { limit },
            other => UploadError::Stage(other),
        }
    }
}

/// Strip parameters and normalize case, e.g. `Video/MP4; codecs=avc1` -> `video/mp4`.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Clone)]
pub struct UploadPipeline {
    config: Arc<AppConfig>,
    classifier: AspectClassifier,
    remuxer: Arc<dyn Remuxer>,
    objects: Arc<dyn ObjectStore>,
    videos: Arc<dyn VideoStore>,
}

impl UploadPipeline {
    pub fn new(
        config: Arc<AppConfig>,
        probe: Arc<dyn MetadataProbe>,
        remuxer: Arc<dyn Remuxer>,
        objects: Arc<dyn ObjectStore>,
        videos: Arc<dyn VideoStore>,
    ) -> Self {
        Self {
            config,
            classifier: AspectClassifier::new(probe),
            remuxer,
            objects,
            videos,
        }
    }

    /// Run the full upload for `video_id` on behalf of `caller`.
    ///
    /// `content_type` is the declared type of the multipart part and `body`
    /// its bytes. Returns the updated record.
    #[tracing::instrument(skip_all, fields(video_id = %video_id, user_id = %caller))]
    pub async fn upload_video<S>(
        &self,
        caller: Uuid,
        video_id: Uuid,
        content_type: Option<&str>,
        body: S,
    ) -> Result<Video, UploadError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut video = self.authorize(caller, video_id).await?;

        let content_type = content_type
            .map(media_type)
            .ok_or(UploadError::MissingContentType)?;
        if content_type != VIDEO_CONTENT_TYPE {
            return Err(UploadError::UnsupportedContentType(content_type));
        }

        let mut staged =
            StagedUpload::stage(&self.config.staging_dir, body, self.config.max_upload_bytes)
                .await?;
        staged
            .rewind()
            .await
            .map_err(|err| UploadError::Stage(err.into()))?;

        let aspect = match self.classifier.classify(staged.path()).await {
            Ok(aspect) => aspect,
            Err(err) => {
                tracing::warn!(error = %err, "could not classify video, filing under `other`");
                AspectRatio::Other
            }
        };

        let processed = ProcessedArtifact::adopt(self.remuxer.remux(staged.path()).await?);
        tracing::debug!(path = %processed.path().display(), "rewrote video for fast start");

        let key = keys::object_key(&content_type, Some(aspect))?;

        let (file, len) = processed.open().await.map_err(UploadError::Artifact)?;
        let put = PutObject {
            bucket: &self.config.s3_bucket,
            key: &key,
            content_type: &content_type,
            acl: ObjectAcl::PublicRead,
        };
        self.objects
            .put_object(put, Box::pin(file))
            .await
            .map_err(|source| UploadError::Upload {
                key: key.clone(),
                source,
            })?;

        self.verify(&key, len).await?;

        video.video_url = Some(self.config.object_url(&key));
        video.updated_at = Utc::now();
        self.videos
            .update(&video)
            .await
            .map_err(|source| UploadError::Persist {
                key: key.clone(),
                source,
            })?;

        tracing::info!(
            key = %key,
            aspect = %aspect,
            size_bytes = len,
            staged_bytes = staged.len(),
            "video uploaded"
        );

        Ok(video)
    }

    async fn authorize(&self, caller: Uuid, video_id: Uuid) -> Result<Video, UploadError> {
        let video = self.videos.get(video_id).await.map_err(|err| match err {
            VideoStoreError::NotFound(id) => UploadError::NotFound(id),
            other => UploadError::Lookup(other),
        })?;

        if video.user_id != caller {
            return Err(UploadError::NotOwner);
        }
        Ok(video)
    }

    /// Confirm the store holds the object with the expected length.
    async fn verify(&self, key: &str, expected_len: u64) -> Result<(), UploadError> {
        let head = self
            .objects
            .head_object(&self.config.s3_bucket, key)
            .await
            .map_err(|err| UploadError::Verify {
                key: key.to_string(),
                reason: err.to_string(),
            })?;

        if head.content_length != expected_len {
            return Err(UploadError::Verify {
                key: key.to_string(),
                reason: format!(
                    "stored {} bytes, expected {}",
                    head.content_length, expected_len
                ),
            });
        }
        Ok(())
    }
}
