//! Fast-start container rewriting.
//!
//! Moves the MP4 index (`moov` atom) to the front of the file with a stream
//! copy so players can start before the whole file has downloaded.

use crate::services::subprocess::{self, SubprocessError};
use async_trait::async_trait;
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;

/// Suffix appended to the input path to name the rewritten file.
pub const PROCESSED_SUFFIX: &str = ".processing";

#[derive(Debug, Error)]
pub enum RemuxError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("failed to release remux output: {0}")]
    Release(#[source] io::Error),
}

/// Rewrites a local video for progressive playback.
///
/// On success the returned path belongs to the caller, who is responsible for
/// deleting it.
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, input: &Path) -> Result<PathBuf, RemuxError>;
}

/// Sibling path the rewritten file is written to.
pub fn processed_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(PROCESSED_SUFFIX);
    PathBuf::from(name)
}

/// `Remuxer` backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    program: String,
    timeout: Duration,
}

impl FfmpegRemuxer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    #[tracing::instrument(skip(self), fields(process.executable.name = %self.program))]
    async fn remux(&self, input: &Path) -> Result<PathBuf, RemuxError> {
        // removes partial output on failure, timeout, or when this future is dropped
        let output = TempPath::from_path(processed_path(input));

        let mut cmd = Command::new(&self.program);
        cmd.args(["-nostdin", "-y", "-i"])
            .arg(input)
            .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
            .arg(&*output);

        if let Err(err) = subprocess::run(cmd, self.timeout).await {
            tracing::warn!(error = %err, "ffmpeg failed");
            return Err(err.into());
        }

        output.keep().map_err(|err| RemuxError::Release(err.error))
    }
}
