//! Shared state handed to every handler.

use crate::services::{blob_store::LocalBlobStore, catalog_service::CatalogService};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,

    /// Serves stored images and backs the readiness probe.
    pub blobs: Arc<LocalBlobStore>,

    pub db: Arc<SqlitePool>,
}
