use anyhow::Result;
use axum::Router;
use services::{
    blob_store::{BlobStore, LocalBlobStore},
    catalog_service::CatalogService,
    image_service::ImageAssetCoordinator,
    movie_repository::SqliteMovieRepository,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + startup flags ---
    let (cfg, flags) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting movie-catalog with config: {:?}", cfg);

    // --- Ensure blob directory exists ---
    if !Path::new(&cfg.blob_dir).exists() {
        fs::create_dir_all(&cfg.blob_dir)?;
        tracing::info!("Created blob directory at {}", cfg.blob_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if db_path != ":memory:" {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    // --- Schema ---
    db::run_migrations(&db).await?;
    if flags.migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let blobs = Arc::new(LocalBlobStore::new(
        cfg.blob_dir.clone(),
        cfg.blob_container.clone(),
        cfg.public_base_url.clone(),
    ));
    blobs.ensure_container().await?;

    let repo = Arc::new(SqliteMovieRepository::new(db.clone()));
    if flags.seed {
        db::seed_if_empty(repo.as_ref()).await?;
    }

    let catalog = CatalogService::new(
        repo,
        ImageAssetCoordinator::new(blobs.clone()),
        cfg.page_size,
    );
    let state = state::AppState { catalog, blobs, db };

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(state);

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
