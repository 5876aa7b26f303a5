//! Orientation detection for staged videos.
//!
//! `ffprobe` reports the stream geometry; the ratio is bucketed with a small
//! tolerance because container metadata rarely encodes exact ratios.

use crate::services::subprocess::{self, SubprocessError};
use async_trait::async_trait;
use serde::Deserialize;
use std::{fmt, path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::process::Command;

const LANDSCAPE_RANGE: (f64, f64) = (1.77, 1.78);
const PORTRAIT_RANGE: (f64, f64) = (0.56, 0.57);

/// Orientation bucket an upload is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    /// 16:9
    Landscape,
    /// 9:16
    Portrait,
    Other,
}

impl AspectRatio {
    /// Bucket a width/height pair.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let ratio = f64::from(width) / f64::from(height);
        if (LANDSCAPE_RANGE.0..=LANDSCAPE_RANGE.1).contains(&ratio) {
            AspectRatio::Landscape
        } else if (PORTRAIT_RANGE.0..=PORTRAIT_RANGE.1).contains(&ratio) {
            AspectRatio::Portrait
        } else {
            AspectRatio::Other
        }
    }

    /// The ratio label, e.g. `16:9`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Other => "other",
        }
    }

    /// Path segment used as the object key prefix.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "landscape",
            AspectRatio::Portrait => "portrait",
            AspectRatio::Other => "other",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("could not parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no video streams found")]
    NoVideoStream,
    #[error("video stream is missing width or height")]
    MissingDimensions,
}

/// Reads stream geometry from a local file.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, ProbeError>;
}

/// `MetadataProbe` backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MetadataProbe for FfprobeProbe {
    #[tracing::instrument(skip(self), fields(process.executable.name = %self.program))]
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, ProbeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path);

        let output = subprocess::run(cmd, self.timeout).await.inspect_err(|err| {
            tracing::warn!(error = %err, "ffprobe failed");
        })?;

        parse_probe_output(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Extract the first video stream's geometry from `ffprobe -print_format json`.
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoDimensions, ProbeError> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;

    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().is_none_or(|t| t == "video"))
        .ok_or(ProbeError::NoVideoStream)?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) => Ok(VideoDimensions { width, height }),
        _ => Err(ProbeError::MissingDimensions),
    }
}

/// Classifies staged files into orientation buckets.
#[derive(Clone)]
pub struct AspectClassifier {
    probe: Arc<dyn MetadataProbe>,
}

impl AspectClassifier {
    pub fn new(probe: Arc<dyn MetadataProbe>) -> Self {
        Self { probe }
    }

    pub async fn classify(&self, path: &Path) -> Result<AspectRatio, ProbeError> {
        let dims = self.probe.probe(path).await?;
        let aspect = AspectRatio::from_dimensions(dims.width, dims.height);
        tracing::debug!(
            width = dims.width,
            height = dims.height,
            aspect = %aspect,
            "classified video"
        );
        Ok(aspect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_common_resolutions() {
        assert_eq!(AspectRatio::from_dimensions(1920, 1080), AspectRatio::Landscape);
        assert_eq!(AspectRatio::from_dimensions(1280, 720), AspectRatio::Landscape);
        assert_eq!(AspectRatio::from_dimensions(1080, 1920), AspectRatio::Portrait);
        assert_eq!(AspectRatio::from_dimensions(1000, 1000), AspectRatio::Other);
        assert_eq!(AspectRatio::from_dimensions(640, 480), AspectRatio::Other);
    }

    #[test]
    fn tolerance_covers_slightly_off_ratios() {
        // 854x480 is 1.7791...
        assert_eq!(AspectRatio::from_dimensions(854, 480), AspectRatio::Landscape);
        // 608x1080 is 0.5629...
        assert_eq!(AspectRatio::from_dimensions(608, 1080), AspectRatio::Portrait);
    }

    #[test]
    fn zero_height_is_other() {
        assert_eq!(AspectRatio::from_dimensions(1920, 0), AspectRatio::Other);
        assert_eq!(AspectRatio::from_dimensions(0, 0), AspectRatio::Other);
    }

    #[test]
    fn labels_and_prefixes() {
        assert_eq!(AspectRatio::Landscape.to_string(), "16:9");
        assert_eq!(AspectRatio::Portrait.as_str(), "9:16");
        assert_eq!(AspectRatio::Portrait.key_prefix(), "portrait");
        assert_eq!(AspectRatio::Other.key_prefix(), "other");
    }

    #[test]
    fn parses_first_video_stream() {
        let json = br#"{
            "streams": [
                {"index": 0, "codec_type": "audio", "codec_name": "aac"},
                {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1080, "height": 1920}
            ]
        }"#;

        let dims = parse_probe_output(json).unwrap();
        assert_eq!(dims, VideoDimensions { width: 1080, height: 1920 });
    }

    #[test]
    fn rejects_output_without_video() {
        let audio_only = br#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(audio_only),
            Err(ProbeError::NoVideoStream)
        ));

        let empty = br#"{"streams": []}"#;
        assert!(matches!(parse_probe_output(empty), Err(ProbeError::NoVideoStream)));
    }

    #[test]
    fn rejects_garbage_and_missing_geometry() {
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(ProbeError::Parse(_))
        ));

        let no_size = br#"{"streams": [{"codec_type": "video"}]}"#;
        assert!(matches!(
            parse_probe_output(no_size),
            Err(ProbeError::MissingDimensions)
        ));
    }

    struct FixedProbe(VideoDimensions);

    #[async_trait]
    impl MetadataProbe for FixedProbe {
        async fn probe(&self, _path: &Path) -> Result<VideoDimensions, ProbeError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn classifier_uses_probe_geometry() {
        let classifier = AspectClassifier::new(Arc::new(FixedProbe(VideoDimensions {
            width: 1920,
            height: 1080,
        })));

        let aspect = classifier.classify(Path::new("/tmp/video.mp4")).await.unwrap();
        assert_eq!(aspect, AspectRatio::Landscape);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ffprobe_failure_is_a_probe_error() {
        let probe = FfprobeProbe::new("false", Duration::from_secs(5));
        let err = probe.probe(Path::new("/tmp/missing.mp4")).await.unwrap_err();
        assert!(matches!(err, ProbeError::Subprocess(SubprocessError::Failed { .. })));
    }
}
