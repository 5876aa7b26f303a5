use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

const DEFAULT_PORT: u16 = 8091;
const DEFAULT_SUBPROCESS_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1 << 30;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once at startup
/// and handed to the services as `Arc<AppConfig>`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Directory thumbnails are written to and served from.
    pub assets_root: PathBuf,
    /// Directory staged uploads and processed artifacts live in.
    pub staging_dir: PathBuf,
    /// Root directory of the local object store backend.
    pub object_store_dir: PathBuf,
    pub s3_bucket: String,
    pub s3_region: String,
    /// Public prefix for object URLs, without trailing slash.
    pub object_base_url: String,
    /// Public prefix for asset URLs, without trailing slash.
    pub asset_base_url: String,
    pub jwt_secret: String,
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    pub subprocess_timeout: Duration,
    pub max_upload_bytes: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Tubely video upload service")]
pub struct Args {
    /// Host to bind to (overrides TUBELY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides TUBELY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides TUBELY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Thumbnail directory (overrides TUBELY_ASSETS_ROOT)
    #[arg(long)]
    pub assets_root: Option<PathBuf>,

    /// Temporary directory for uploads (overrides TUBELY_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Local object store root (overrides TUBELY_OBJECT_STORE_DIR)
    #[arg(long)]
    pub object_store_dir: Option<PathBuf>,

    /// Bucket videos are uploaded to (overrides TUBELY_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Region used when building object URLs (overrides TUBELY_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Public base URL for uploaded objects (overrides TUBELY_OBJECT_BASE_URL)
    #[arg(long)]
    pub object_base_url: Option<String>,

    /// Public base URL for assets (overrides TUBELY_ASSET_BASE_URL)
    #[arg(long)]
    pub asset_base_url: Option<String>,

    /// HS256 secret used to validate access tokens (overrides TUBELY_JWT_SECRET)
    #[arg(long)]
    pub jwt_secret: Option<String>,

    /// ffprobe binary (overrides TUBELY_FFPROBE_PATH)
    #[arg(long)]
    pub ffprobe_path: Option<String>,

    /// ffmpeg binary (overrides TUBELY_FFMPEG_PATH)
    #[arg(long)]
    pub ffmpeg_path: Option<String>,

    /// Upper bound for each ffprobe/ffmpeg run (overrides TUBELY_SUBPROCESS_TIMEOUT_SECS)
    #[arg(long)]
    pub subprocess_timeout_secs: Option<u64>,

    /// Maximum accepted upload size (overrides TUBELY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already parsed CLI args with their environment fallbacks.
    pub fn from_args(args: Args) -> Result<Self> {
        let port = match args.port {
            Some(port) => port,
            None => env_parse("TUBELY_PORT")?.unwrap_or(DEFAULT_PORT),
        };
        let s3_bucket = args
            .s3_bucket
            .unwrap_or_else(|| env_or("TUBELY_S3_BUCKET", "tubely-videos"));
        let s3_region = args
            .s3_region
            .unwrap_or_else(|| env_or("TUBELY_S3_REGION", "us-east-1"));

        let object_base_url = args
            .object_base_url
            .or_else(|| env::var("TUBELY_OBJECT_BASE_URL").ok())
            .unwrap_or_else(|| format!("https://{}.s3.{}.amazonaws.com", s3_bucket, s3_region));
        let asset_base_url = args
            .asset_base_url
            .or_else(|| env::var("TUBELY_ASSET_BASE_URL").ok())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let jwt_secret = match args.jwt_secret.or_else(|| env::var("TUBELY_JWT_SECRET").ok()) {
            Some(secret) if !secret.is_empty() => secret,
            _ => bail!("a JWT secret is required (--jwt-secret or TUBELY_JWT_SECRET)"),
        };

        let timeout_secs = match args.subprocess_timeout_secs {
            Some(secs) => secs,
            None => env_parse("TUBELY_SUBPROCESS_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_SUBPROCESS_TIMEOUT_SECS),
        };
        let max_upload_bytes = match args.max_upload_bytes {
            Some(bytes) => bytes,
            None => env_parse("TUBELY_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        Ok(Self {
            host: args.host.unwrap_or_else(|| env_or("TUBELY_HOST", "0.0.0.0")),
            port,
            database_url: args
                .database_url
                .unwrap_or_else(|| env_or("TUBELY_DATABASE_URL", "sqlite://./data/tubely.db")),
            assets_root: args
                .assets_root
                .unwrap_or_else(|| env_or("TUBELY_ASSETS_ROOT", "./assets").into()),
            staging_dir: args
                .staging_dir
                .or_else(|| env::var("TUBELY_STAGING_DIR").ok().map(PathBuf::from))
                .unwrap_or_else(env::temp_dir),
            object_store_dir: args
                .object_store_dir
                .unwrap_or_else(|| env_or("TUBELY_OBJECT_STORE_DIR", "./data/objects").into()),
            s3_bucket,
            s3_region,
            object_base_url: object_base_url.trim_end_matches('/').to_string(),
            asset_base_url: asset_base_url.trim_end_matches('/').to_string(),
            jwt_secret,
            ffprobe_path: args
                .ffprobe_path
                .unwrap_or_else(|| env_or("TUBELY_FFPROBE_PATH", "ffprobe")),
            ffmpeg_path: args
                .ffmpeg_path
                .unwrap_or_else(|| env_or("TUBELY_FFMPEG_PATH", "ffmpeg")),
            subprocess_timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public URL of an object uploaded under `key`.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.object_base_url, key)
    }

    /// Public URL of a thumbnail stored as `name` under `assets_root`.
    pub fn asset_url(&self, name: &str) -> String {
        format!("{}/assets/{}", self.asset_base_url, name)
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
