//! Test helpers: an in-process server wired with fake media tools and an
//! in-memory object store.
//!
//! Run with: `cargo test --test video_upload_test` (no ffmpeg needed).

#![allow(dead_code)]

pub mod fakes;

use axum_test::{
    TestResponse, TestServer,
    multipart::{MultipartForm, Part},
};
use bytes::Bytes;
use fakes::{FailingUpdates, FakeProbe, FakeRemuxer, MemoryObjectStore};
use std::{path::Path, sync::Arc, time::Duration};
use tempfile::TempDir;
use tubely::{
    auth,
    config::AppConfig,
    db,
    models::video::{NewVideo, Video},
    routes,
    services::{
        local_object_store::LocalObjectStore,
        thumbnail_service::ThumbnailService,
        upload_pipeline::UploadPipeline,
        video_store::{SqliteVideoStore, VideoStore},
    },
    state::AppState,
};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-for-tubely";
pub const TEST_BUCKET: &str = "tubely-test";

/// Bytes standing in for a 2-second 1920x1080 MP4; the fakes never decode them.
pub const FAKE_MP4: &[u8] = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2avc1mp41fake-mdat";

/// Test application: server, shared state and the directories it owns.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub objects: Arc<MemoryObjectStore>,
    pub staging_dir: TempDir,
    pub assets_dir: TempDir,
    pub _object_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Files left in the staging directory.
    pub fn staged_files(&self) -> Vec<String> {
        list_dir(self.staging_dir.path())
    }

    pub async fn create_video(&self, owner: Uuid) -> Video {
        self.state
            .videos
            .create(
                owner,
                NewVideo {
                    title: "Boots".into(),
                    description: "a walk in the snow".into(),
                },
            )
            .await
            .expect("create video")
    }

    pub async fn video(&self, id: Uuid) -> Video {
        self.state.videos.get(id).await.expect("get video")
    }

    pub async fn upload_video(
        &self,
        caller: Uuid,
        video_id: &str,
        content_type: &str,
        bytes: &'static [u8],
    ) -> TestResponse {
        let part = Part::bytes(Bytes::from_static(bytes))
            .file_name("boots.mp4")
            .mime_type(content_type);
        self.server
            .post(&format!("/api/video_upload/{}", video_id))
            .add_header("Authorization", format!("Bearer {}", token_for(caller)))
            .multipart(MultipartForm::new().add_part("video", part))
            .await
    }
}

pub fn token_for(user_id: Uuid) -> String {
    auth::make_jwt(user_id, TEST_JWT_SECRET, Duration::from_secs(3600)).expect("mint token")
}

pub fn list_dir(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect()
}

/// 1920x1080 probe, copying remuxer, working object store.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(
        FakeProbe::fixed(1920, 1080),
        FakeRemuxer::copying(),
        MemoryObjectStore::new(),
    )
    .await
}

/// Setup test app with in-memory SQLite, temp directories and the given fakes.
pub async fn setup_test_app_with(
    probe: FakeProbe,
    remuxer: FakeRemuxer,
    objects: MemoryObjectStore,
) -> TestApp {
    build_test_app(probe, remuxer, objects, false).await
}

/// Working media fakes, but saving a video record always fails.
pub async fn setup_test_app_failing_updates() -> TestApp {
    build_test_app(
        FakeProbe::fixed(1920, 1080),
        FakeRemuxer::copying(),
        MemoryObjectStore::new(),
        true,
    )
    .await
}

async fn build_test_app(
    probe: FakeProbe,
    remuxer: FakeRemuxer,
    objects: MemoryObjectStore,
    fail_video_updates: bool,
) -> TestApp {
    let staging_dir = tempfile::tempdir().expect("staging dir");
    let assets_dir = tempfile::tempdir().expect("assets dir");
    let object_dir = tempfile::tempdir().expect("object dir");

    let config = Arc::new(AppConfig {
        host: "127.0.0.1".into(),
        port: 8091,
        database_url: "sqlite::memory:".into(),
        assets_root: assets_dir.path().to_path_buf(),
        staging_dir: staging_dir.path().to_path_buf(),
        object_store_dir: object_dir.path().to_path_buf(),
        s3_bucket: TEST_BUCKET.into(),
        s3_region: "us-east-1".into(),
        object_base_url: format!("https://{}.s3.us-east-1.amazonaws.com", TEST_BUCKET),
        asset_base_url: "http://localhost:8091".into(),
        jwt_secret: TEST_JWT_SECRET.into(),
        ffprobe_path: "ffprobe".into(),
        ffmpeg_path: "ffmpeg".into(),
        subprocess_timeout: Duration::from_secs(30),
        max_upload_bytes: 1 << 20,
    });

    let pool = db::connect(&config.database_url).await.expect("connect sqlite");
    db::run_migrations(&pool).await.expect("migrate");
    let db = Arc::new(pool);

    let mut videos: Arc<dyn VideoStore> = Arc::new(SqliteVideoStore::new(db.clone()));
    if fail_video_updates {
        videos = Arc::new(FailingUpdates(videos));
    }
    let objects = Arc::new(objects);
    let pipeline = UploadPipeline::new(
        config.clone(),
        Arc::new(probe),
        Arc::new(remuxer),
        objects.clone(),
        videos.clone(),
    );

    let state = AppState {
        config: config.clone(),
        db: db.clone(),
        videos: videos.clone(),
        objects: LocalObjectStore::new(db, config.object_store_dir.clone()),
        pipeline,
        thumbnails: ThumbnailService::new(config.clone(), videos),
    };

    let app = routes::routes::routes(config.max_upload_bytes).with_state(state.clone());
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        objects,
        staging_dir,
        assets_dir,
        _object_dir: object_dir,
    }
}
