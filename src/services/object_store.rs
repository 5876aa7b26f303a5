//! Object store contract used by the upload paths.
//!
//! Only two operations are needed: write an object and read back its
//! metadata. Any backend that can answer both (the local disk store, a cloud
//! bucket, a test double) can sit behind this trait.

use async_trait::async_trait;
use std::{fmt, io, pin::Pin};
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("object store backend error: {0}")]
    Backend(String),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Canned access control applied to a new object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAcl {
    Private,
    PublicRead,
}

impl ObjectAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(ObjectAcl::Private),
            "public-read" => Some(ObjectAcl::PublicRead),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streamed object payload.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Parameters of a single put.
#[derive(Debug, Clone, Copy)]
pub struct PutObject<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub content_type: &'a str,
    pub acl: ObjectAcl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub etag: Option<String>,
    pub size: u64,
}

/// What a metadata-only lookup reports about an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub acl: ObjectAcl,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `req.bucket`/`req.key`, replacing any existing object.
    async fn put_object(
        &self,
        req: PutObject<'_>,
        body: ObjectBody,
    ) -> ObjectStoreResult<PutObjectOutput>;

    /// Metadata of an existing object; `NotFound` when absent.
    async fn head_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<ObjectHead>;
}
