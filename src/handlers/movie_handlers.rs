//! HTTP handlers for the movie catalog.
//! Create and edit take `multipart/form-data` so a poster image can ride
//! along with the form fields; everything else is plain JSON.

use crate::{
    errors::AppError,
    models::movie::{Movie, MovieForm},
    services::{
        catalog_service::{CreateMovie, EditMovie, EditOutcome, MovieIndex},
        image_service::ImagePayload,
        movie_query::ListParams,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};

/// Form fields and file part shared by create and edit.
#[derive(Debug, Default)]
struct MovieSubmission {
    form: MovieForm,
    version: Option<String>,
    image: Option<ImagePayload>,
    remove_image: bool,
}

/// `GET /movies?genre=&rating=&sort=&search=&page=`
pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<MovieIndex>, AppError> {
    Ok(Json(state.catalog.list(params).await?))
}

/// `GET /movies/{id}`
pub async fn get_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Movie>, AppError> {
    Ok(Json(state.catalog.details(id).await?))
}

/// `POST /movies`
pub async fn create_movie(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let submission = read_submission(multipart).await?;
    let movie = state
        .catalog
        .create(CreateMovie {
            form: submission.form,
            image: submission.image,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(movie)))
}

/// `PUT /movies/{id}`
pub async fn edit_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<EditOutcome>, AppError> {
    let submission = read_submission(multipart).await?;
    let outcome = state
        .catalog
        .edit(
            id,
            EditMovie {
                form: submission.form,
                version: submission.version,
                image: submission.image,
                remove_image: submission.remove_image,
            },
        )
        .await?;

    Ok(Json(outcome))
}

/// `DELETE /movies/{id}`
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drain the multipart body. Unknown fields are ignored; a file part with
/// no bytes counts as no image.
async fn read_submission(mut multipart: Multipart) -> Result<MovieSubmission, AppError> {
    let mut submission = MovieSubmission::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if !bytes.is_empty() {
                submission.image = Some(ImagePayload {
                    bytes,
                    content_type,
                    file_name,
                });
            }
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "title" => submission.form.title = Some(value),
            "release_date" => submission.form.release_date = Some(value),
            "genre" => submission.form.genre = Some(value),
            "price" => submission.form.price = Some(value),
            "rating" => submission.form.rating = Some(value),
            "version" => submission.version = Some(value),
            "remove_image" => submission.remove_image = is_checked(&value),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(submission)
}

fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1" | "yes"
    )
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
