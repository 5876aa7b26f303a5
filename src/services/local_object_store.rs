//! src/services/local_object_store.rs
//!
//! LocalObjectStore: an `ObjectStore` backed by SQLite for object metadata and
//! local disk for payloads, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::{
    models::stored_object::StoredObject,
    services::object_store::{
        ObjectAcl, ObjectBody, ObjectHead, ObjectStore, ObjectStoreError, ObjectStoreResult,
        PutObject, PutObjectOutput,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempPath;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Bucket names become directory names: 3-63 lowercase letters, digits,
    /// dots and hyphens, starting and ending with a letter or digit.
    fn ensure_bucket_name_safe(name: &str) -> ObjectStoreResult<()> {
        let len_ok = (BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&name.len());
        let chars_ok = name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'));
        let edges_ok = !(name.starts_with(['.', '-']) || name.ends_with(['.', '-']));
        if len_ok && chars_ok && edges_ok && !name.contains("..") {
            Ok(())
        } else {
            Err(ObjectStoreError::Backend(format!(
                "invalid bucket name `{}`",
                name
            )))
        }
    }

    /// Two-level shard directories from MD5(bucket/key), keeping directory
    /// sizes bounded.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Payload path for `bucket`/`key`. Parent directories may not exist yet.
    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.base_path.join(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket, key, content_type, size_bytes, etag, acl, last_modified
             FROM objects
             WHERE bucket = ? AND key = ?",
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await
        .map_err(backend)?
        .ok_or_else(|| ObjectStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Open a stored object for streaming out.
    ///
    /// Returns `NotFound` if the metadata row or the payload file is missing.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> ObjectStoreResult<(StoredObject, File)> {
        Self::ensure_bucket_name_safe(bucket)?;
        Self::ensure_key_safe(key)?;
        let object = self.fetch_object(bucket, key).await?;

        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    ObjectStoreError::Io(err)
                }
            })?;

        Ok((object, file))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    /// Stream the body to a temp file beside the destination while computing
    /// size and MD5, fsync, upsert the metadata row, then rename into place.
    /// A failed upsert leaves any previous payload and row untouched.
    async fn put_object(
        &self,
        req: PutObject<'_>,
        body: ObjectBody,
    ) -> ObjectStoreResult<PutObjectOutput> {
        Self::ensure_bucket_name_safe(req.bucket)?;
        Self::ensure_key_safe(req.key)?;

        let file_path = self.object_path(req.bucket, req.key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = TempPath::from_path(parent.join(format!(".tmp-{}", Uuid::new_v4())));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        let mut stream = ReaderStream::new(body);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let etag = format!("{:x}", digest.compute());

        // the row is written first; the payload replaces the old one only once
        // the row is in, and the transaction commits only once the payload is
        let mut tx = match self.db.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                discard_temp(tmp_path);
                return Err(backend(err));
            }
        };
        let upsert = sqlx::query(
            r#"
            INSERT INTO objects (
                id, bucket, key, content_type, size_bytes, etag, acl, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                acl = excluded.acl,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.bucket)
        .bind(req.key)
        .bind(req.content_type)
        .bind(size_bytes as i64)
        .bind(&etag)
        .bind(req.acl.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        if let Err(err) = upsert {
            discard_temp(tmp_path);
            return Err(backend(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            discard_temp(tmp_path);
            return Err(err.into());
        }
        // the temp name no longer exists once renamed
        let _ = tmp_path.keep();

        if let Err(err) = tx.commit().await {
            tracing::error!(
                bucket = req.bucket,
                key = req.key,
                error = %err,
                "payload replaced but metadata commit failed"
            );
            return Err(backend(err));
        }

        tracing::debug!(
            bucket = req.bucket,
            key = req.key,
            size_bytes,
            "stored object"
        );

        Ok(PutObjectOutput {
            etag: Some(etag),
            size: size_bytes,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<ObjectHead> {
        Self::ensure_bucket_name_safe(bucket)?;
        Self::ensure_key_safe(key)?;
        let object = self.fetch_object(bucket, key).await?;

        match fs::metadata(self.object_path(bucket, key)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        Ok(ObjectHead {
            content_length: object.size_bytes.max(0) as u64,
            content_type: object.content_type,
            etag: object.etag,
            acl: ObjectAcl::parse(&object.acl).unwrap_or(ObjectAcl::Private),
        })
    }
}

fn backend(err: sqlx::Error) -> ObjectStoreError {
    ObjectStoreError::Backend(err.to_string())
}

/// Remove an unused temp payload, logging rather than masking the original error.
fn discard_temp(tmp_path: TempPath) {
    let path = tmp_path.to_path_buf();
    if let Err(err) = tmp_path.close() {
        tracing::warn!(path = %path.display(), error = %err, "could not remove temp payload");
    }
}
