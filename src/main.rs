use anyhow::Result;
use axum::Router;
use fileshelf::{
    config::AppConfig,
    handlers::ServerState,
    key::KeyCodec,
    routes,
    services::{presign::UrlSigner, store::StoreService},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate_only) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting fileshelf with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // Create parent directory if needed; create_if_missing only makes the file.
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let connect_options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );

    // --- Apply schema (idempotent) ---
    StoreService::migrate(&db).await?;
    if migrate_only {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let codec = KeyCodec::new(cfg.root_prefix.clone());
    let store = StoreService::new(db, cfg.storage_dir.clone(), codec.clone());

    let secret = match cfg.presign_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!(
                "FILESHELF_PRESIGN_SECRET is not set; presigned URLs will not survive a restart"
            );
            Uuid::new_v4().to_string()
        }
    };
    let public_base = cfg
        .public_base_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", cfg.addr()));
    let signer = UrlSigner::new(secret.into_bytes(), public_base, cfg.presign_ttl_secs);

    let state = ServerState {
        store,
        signer,
        policy: cfg.upload_policy(),
        codec,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
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
