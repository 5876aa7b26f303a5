//! Scoped temporary files for uploads in flight.
//!
//! Both the staged upload and the processed artifact are held by
//! `tempfile::TempPath`, which removes the file when dropped. Every exit from
//! the pipeline (early return, error, panic unwinding, or a cancelled request
//! future) therefore deletes them.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tempfile::TempPath;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncSeekExt, AsyncWriteExt},
};

const STAGED_PREFIX: &str = "tubely-upload";
const STAGED_SUFFIX: &str = ".mp4";

#[derive(Debug, Error)]
pub enum StageError {
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("failed to read upload body: {0}")]
    Body(#[source] io::Error),
    #[error("failed to write staged upload: {0}")]
    Io(#[from] io::Error),
}

/// The raw request body, copied to local disk.
#[derive(Debug)]
pub struct StagedUpload {
    file: File,
    path: TempPath,
    len: u64,
}

impl StagedUpload {
    /// Copy `body` into a new temporary file under `dir`.
    ///
    /// Fails with `TooLarge` as soon as more than `limit` bytes arrive; the
    /// partial file is removed.
    pub async fn stage<S>(dir: &Path, body: S, limit: u64) -> Result<Self, StageError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let named = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .suffix(STAGED_SUFFIX)
            .tempfile_in(dir)?;
        let (file, path) = named.into_parts();
        let mut file = File::from_std(file);

        let mut len: u64 = 0;
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StageError::Body)?;
            len += chunk.len() as u64;
            if len > limit {
                return Err(StageError::TooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!(path = %path.display(), size_bytes = len, "staged upload");

        Ok(Self { file, path, len })
    }

    /// Reset the read position so the next reader starts at byte zero.
    pub async fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A file produced from the staged upload, deleted when dropped.
#[derive(Debug)]
pub struct ProcessedArtifact {
    path: TempPath,
}

impl ProcessedArtifact {
    /// Take ownership of an existing file; it is removed when this value drops.
    pub fn adopt(path: PathBuf) -> Self {
        Self {
            path: TempPath::from_path(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the artifact for reading, returning the handle and its length.
    pub async fn open(&self) -> io::Result<(File, u64)> {
        let file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = io::Result<Bytes>> + use<> {
        let items: Vec<io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        stream::iter(items)
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn stages_body_and_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedUpload::stage(dir.path(), chunks(&["hello ", "world"]), 1024)
            .await
            .unwrap();

        assert_eq!(staged.len(), 11);
        assert!(staged.path().starts_with(dir.path()));
        assert!(
            staged
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(STAGED_PREFIX)
        );

        staged.rewind().await.unwrap();
        let mut contents = String::new();
        staged.file.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "hello world");
    }

    #[tokio::test]
    async fn dropping_staged_upload_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::stage(dir.path(), chunks(&["abc"]), 1024)
            .await
            .unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let err = StagedUpload::stage(dir.path(), chunks(&["0123", "4567"]), 6)
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::TooLarge { limit: 6 }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn body_error_is_reported_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);

        let err = StagedUpload::stage(dir.path(), body, 1024).await.unwrap_err();
        assert!(matches!(err, StageError::Body(_)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn adopted_artifact_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4.processing");
        std::fs::write(&path, b"processed").unwrap();

        let artifact = ProcessedArtifact::adopt(path.clone());
        let (_file, len) = artifact.open().await.unwrap();
        assert_eq!(len, 9);

        drop(_file);
        drop(artifact);
        assert!(!path.exists());
    }
}
