//! Stand-ins for ffprobe, ffmpeg and the object store.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::io::AsyncReadExt;
use tubely::{
    models::video::{NewVideo, Video},
    services::{
        aspect::{MetadataProbe, ProbeError, VideoDimensions},
        object_store::{
            ObjectAcl, ObjectBody, ObjectHead, ObjectStore, ObjectStoreError, ObjectStoreResult,
            PutObject, PutObjectOutput,
        },
        remux::{FfmpegRemuxer, RemuxError, Remuxer, processed_path},
        subprocess::SubprocessError,
        video_store::{VideoStore, VideoStoreError, VideoStoreResult},
    },
};
use uuid::Uuid;

/// Prefix the fake remuxer writes so tests can tell processed bytes apart.
pub const FASTSTART_MARKER: &[u8] = b"faststart:";

pub enum FakeProbe {
    Fixed(VideoDimensions),
    Failing,
    Panicking,
}

impl FakeProbe {
    pub fn fixed(width: u32, height: u32) -> Self {
        FakeProbe::Fixed(VideoDimensions { width, height })
    }
}

#[async_trait]
impl MetadataProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, ProbeError> {
        assert!(path.exists(), "probe ran against a missing file");
        match self {
            FakeProbe::Fixed(dims) => Ok(*dims),
            FakeProbe::Failing => Err(ProbeError::NoVideoStream),
            FakeProbe::Panicking => panic!("probe blew up"),
        }
    }
}

pub enum FakeRemuxer {
    /// Writes the marker plus the input to the `.processing` sibling.
    Copying,
    /// Leaves nothing behind and reports a timeout.
    Failing,
    /// Runs the ffmpeg wrapper against whatever program it was built with.
    Binary(FfmpegRemuxer),
}

impl FakeRemuxer {
    pub fn copying() -> Self {
        FakeRemuxer::Copying
    }
}

#[async_trait]
impl Remuxer for FakeRemuxer {
    async fn remux(&self, input: &Path) -> Result<PathBuf, RemuxError> {
        match self {
            FakeRemuxer::Copying => {
                let mut data = FASTSTART_MARKER.to_vec();
                data.extend(tokio::fs::read(input).await.expect("read staged file"));
                let out = processed_path(input);
                tokio::fs::write(&out, data).await.expect("write processed file");
                Ok(out)
            }
            FakeRemuxer::Failing => Err(RemuxError::Subprocess(SubprocessError::TimedOut {
                program: "ffmpeg".into(),
                timeout: Duration::from_secs(1),
            })),
            FakeRemuxer::Binary(remuxer) => remuxer.remux(input).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub acl: ObjectAcl,
}

/// Object store keeping everything in a map, with switchable failures.
#[derive(Default)]
pub struct MemoryObjectStore {
    blobs: Mutex<HashMap<(String, String), StoredBlob>>,
    puts: AtomicUsize,
    fail_put: bool,
    fail_head: bool,
    short_head: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_put() -> Self {
        Self {
            fail_put: true,
            ..Self::default()
        }
    }

    pub fn failing_head() -> Self {
        Self {
            fail_head: true,
            ..Self::default()
        }
    }

    /// Heads report one byte less than was stored.
    pub fn short_head() -> Self {
        Self {
            short_head: true,
            ..Self::default()
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// All stored `(bucket, key)` pairs with their blobs.
    pub fn objects(&self) -> Vec<((String, String), StoredBlob)> {
        self.blobs
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        req: PutObject<'_>,
        mut body: ObjectBody,
    ) -> ObjectStoreResult<PutObjectOutput> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put {
            return Err(ObjectStoreError::Backend("simulated put failure".into()));
        }

        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).await?;
        let size = bytes.len() as u64;

        self.blobs.lock().unwrap().insert(
            (req.bucket.to_string(), req.key.to_string()),
            StoredBlob {
                bytes,
                content_type: req.content_type.to_string(),
                acl: req.acl,
            },
        );
        Ok(PutObjectOutput { etag: None, size })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<ObjectHead> {
        if self.fail_head {
            return Err(ObjectStoreError::Backend("simulated head failure".into()));
        }

        let blobs = self.blobs.lock().unwrap();
        let blob = blobs
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        let stored = blob.bytes.len() as u64;
        Ok(ObjectHead {
            content_length: if self.short_head {
                stored.saturating_sub(1)
            } else {
                stored
            },
            content_type: Some(blob.content_type.clone()),
            etag: None,
            acl: blob.acl,
        })
    }
}

/// Delegates to the wrapped store but fails every `update`.
pub struct FailingUpdates(pub Arc<dyn VideoStore>);

#[async_trait]
impl VideoStore for FailingUpdates {
    async fn get(&self, id: Uuid) -> VideoStoreResult<Video> {
        self.0.get(id).await
    }

    async fn update(&self, _video: &Video) -> VideoStoreResult<()> {
        Err(VideoStoreError::Sqlx(sqlx::Error::PoolClosed))
    }

    async fn create(&self, user_id: Uuid, new: NewVideo) -> VideoStoreResult<Video> {
        self.0.create(user_id, new).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> VideoStoreResult<Vec<Video>> {
        self.0.list_for_user(user_id).await
    }
}
