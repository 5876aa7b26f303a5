//! Shared state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        aspect::FfprobeProbe,
        local_object_store::LocalObjectStore,
        remux::FfmpegRemuxer,
        thumbnail_service::ThumbnailService,
        upload_pipeline::UploadPipeline,
        video_store::{SqliteVideoStore, VideoStore},
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<SqlitePool>,
    pub videos: Arc<dyn VideoStore>,
    /// Local backend, used to serve public objects.
    pub objects: LocalObjectStore,
    pub pipeline: UploadPipeline,
    pub thumbnails: ThumbnailService,
}

impl AppState {
    /// Wire the production collaborators: SQLite records, the local object
    /// store, and the ffprobe/ffmpeg binaries named in `config`.
    pub fn new(config: AppConfig, db: Arc<SqlitePool>) -> Self {
        let config = Arc::new(config);
        let videos: Arc<dyn VideoStore> = Arc::new(SqliteVideoStore::new(db.clone()));
        let objects = LocalObjectStore::new(db.clone(), config.object_store_dir.clone());

        let pipeline = UploadPipeline::new(
            config.clone(),
            Arc::new(FfprobeProbe::new(
                config.ffprobe_path.clone(),
                config.subprocess_timeout,
            )),
            Arc::new(FfmpegRemuxer::new(
                config.ffmpeg_path.clone(),
                config.subprocess_timeout,
            )),
            Arc::new(objects.clone()),
            videos.clone(),
        );
        let thumbnails = ThumbnailService::new(config.clone(), videos.clone());

        Self {
            config,
            db,
            videos,
            objects,
            pipeline,
            thumbnails,
        }
    }
}
