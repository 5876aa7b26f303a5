use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tubely::{config, db, routes, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Environment file (optional) ---
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        addr = %cfg.addr(),
        bucket = %cfg.s3_bucket,
        staging_dir = %cfg.staging_dir.display(),
        "Starting tubely"
    );

    // --- Ensure local directories exist ---
    for dir in [&cfg.assets_root, &cfg.staging_dir, &cfg.object_store_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            tracing::info!("Created directory {}", dir.display());
        }
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if !db_path.contains(":memory:") {
        let db_path = Path::new(db_path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        // sqlx refuses to open a database file that does not exist yet
        if !db_path.exists() {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(db_path)?;
        }
    }

    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Build router ---
    let max_upload_bytes = cfg.max_upload_bytes;
    let state = AppState::new(cfg, db);
    let app: Router = routes::routes::routes(max_upload_bytes).with_state(state.clone());

    // --- Start server ---
    let addr = state.config.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(state.config.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", state.config.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
