//! Defines routes for the movie catalog and the images it serves.
//!
//! ## Structure
//! - **Movies**
//!   - `GET    /movies`      list (genre, rating, sort, search, page)
//!   - `POST   /movies`      create (multipart form, optional `image`)
//!   - `GET    /movies/{id}` details
//!   - `PUT    /movies/{id}` edit (multipart form with `version`)
//!   - `DELETE /movies/{id}` delete record and image
//!
//! - **Blobs**
//!   - `GET|HEAD /blobs/{container}/{key}` stored image
//!
//! - **Probes**: `/healthz`, `/readyz`

use crate::{
    handlers::{
        blob_handlers::{get_blob, head_blob},
        health_handlers::{healthz, readyz},
        movie_handlers::{create_movie, delete_movie, edit_movie, get_movie, list_movies},
    },
    state::AppState,
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};

/// Build the router. `max_upload_bytes` caps every request body, which in
/// practice bounds the image part of create and edit.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/movies", get(list_movies).post(create_movie))
        .route(
            "/movies/{id}",
            get(get_movie).put(edit_movie).delete(delete_movie),
        )
        .route("/blobs/{container}/{key}", get(get_blob).head(head_blob))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
