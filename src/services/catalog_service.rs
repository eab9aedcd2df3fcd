//! src/services/catalog_service.rs
//!
//! The operations behind the movie endpoints. Lists are
//! composed by the query builder and paged by the pagination engine; writes
//! go through the image coordinator first and the repository second, with
//! the coordinator compensating when the repository write fails.

use crate::{
    models::{
        movie::{FieldError, Movie, MovieForm},
        page::PaginatedList,
        sort::SortOption,
    },
    services::{
        blob_store::BlobError,
        image_service::{AssetError, AssetWarning, ImageAssetCoordinator, ImagePayload},
        movie_query::{ListParams, MovieFilter, MovieQuery, MovieQuerySource},
        movie_repository::{MovieRepository, RepositoryError},
    },
};
use serde::Serialize;
use std::{num::NonZeroU32, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("image upload failed: {0}")]
    UploadFailure(#[source] BlobError),
    #[error("image delete failed: {0}")]
    DeleteFailure(#[source] BlobError),
    #[error("movie {0} not found")]
    NotFound(i64),
    #[error("movie {0} was modified by another request")]
    ConcurrencyConflict(i64),
    #[error("persistence failure: {0}")]
    Persistence(#[source] sqlx::Error),
    #[error("stored image reference `{0}` is invalid")]
    InvalidReference(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl From<AssetError> for CatalogError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::UploadFailure(inner) => CatalogError::UploadFailure(inner),
            AssetError::DeleteFailure(inner) => CatalogError::DeleteFailure(inner),
            AssetError::InvalidReference(uri) => CatalogError::InvalidReference(uri),
        }
    }
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(id) => CatalogError::ConcurrencyConflict(id),
            RepositoryError::Sqlx(inner) => {
                error!(error = %inner, "database operation failed");
                CatalogError::Persistence(inner)
            }
        }
    }
}

/// Everything the list view needs for one request.
#[derive(Serialize, Debug)]
pub struct MovieIndex {
    pub movies: PaginatedList<Movie>,
    /// Distinct genres across the whole catalog, ignoring active filters.
    pub genres: Vec<String>,
    /// Distinct ratings across the whole catalog, ignoring active filters.
    pub ratings: Vec<String>,
    pub filter: MovieFilter,
    pub sort: SortOption,
}

/// Create request: form fields plus an optional image.
#[derive(Debug, Default)]
pub struct CreateMovie {
    pub form: MovieForm,
    pub image: Option<ImagePayload>,
}

/// Edit request. `version` is the concurrency token the caller read.
#[derive(Debug, Default)]
pub struct EditMovie {
    pub form: MovieForm,
    pub version: Option<String>,
    pub image: Option<ImagePayload>,
    /// Drop the current image. Ignored when a new image is supplied.
    pub remove_image: bool,
}

#[derive(Serialize, Debug)]
pub struct EditOutcome {
    pub movie: Movie,
    /// Blobs that should have been removed but were left behind.
    pub warnings: Vec<AssetWarning>,
}

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn MovieRepository>,
    images: ImageAssetCoordinator,
    page_size: NonZeroU32,
}

impl CatalogService {
    pub fn new(
        repo: Arc<dyn MovieRepository>,
        images: ImageAssetCoordinator,
        page_size: NonZeroU32,
    ) -> Self {
        Self {
            repo,
            images,
            page_size,
        }
    }

    /// Filtered, sorted, paged list plus facets.
    pub async fn list(&self, params: ListParams) -> CatalogResult<MovieIndex> {
        let query = MovieQuery::from_params(params);
        debug!(
            filtered = !query.filter.is_empty(),
            sort = ?query.sort,
            page = ?query.page,
            "listing movies"
        );
        let source = MovieQuerySource::new(&*self.repo, &query);

        let (movies, genres, ratings) = tokio::try_join!(
            PaginatedList::create(&source, query.page, self.page_size),
            self.repo.distinct_genres(),
            self.repo.distinct_ratings(),
        )?;

        Ok(MovieIndex {
            movies,
            genres,
            ratings,
            filter: query.filter,
            sort: query.sort,
        })
    }

    pub async fn details(&self, id: i64) -> CatalogResult<Movie> {
        self.repo.find(id).await?.ok_or(CatalogError::NotFound(id))
    }

    /// Upload the image (if any), then insert the record. An upload failure
    /// means no record is written; an insert failure removes the new blob.
    pub async fn create(&self, request: CreateMovie) -> CatalogResult<Movie> {
        let draft = request.form.validate().map_err(CatalogError::Validation)?;
        let mut change = self.images.stage_upload(request.image, None).await?;

        match self.repo.insert(&draft, change.image_uri()).await {
            Ok(movie) => {
                self.images.commit(&mut change);
                info!(movie_id = movie.id, image_uri = ?movie.image_uri, "movie created");
                Ok(movie)
            }
            Err(err) => {
                self.images.compensate(&mut change).await;
                warn!(state = ?change.state(), "movie insert failed; image change rolled back");
                Err(err.into())
            }
        }
    }

    /// Edit a movie and reconcile its image.
    ///
    /// - new image: upload it, remove the replaced one (failure is only a
    ///   warning), then write the record
    /// - `remove_image` without a new image: remove the current one; if that
    ///   fails nothing is written
    /// - record write fails after an upload: the upload is removed again and
    ///   the write failure is reported
    pub async fn edit(&self, id: i64, request: EditMovie) -> CatalogResult<EditOutcome> {
        let (draft, version) = match (
            request.form.validate(),
            parse_version(request.version.as_deref()),
        ) {
            (Ok(draft), Ok(version)) => (draft, version),
            (draft, version) => {
                let mut errors = draft.err().unwrap_or_default();
                errors.extend(version.err());
                return Err(CatalogError::Validation(errors));
            }
        };

        let current = self.details(id).await?;
        if current.version != version {
            return Err(CatalogError::ConcurrencyConflict(id));
        }

        let previous = current.image_uri;
        let mut warnings = Vec::new();
        let mut change = if request.image.is_some() {
            let mut change = self.images.stage_upload(request.image, previous).await?;
            warnings.extend(self.images.retire_previous(&mut change).await);
            change
        } else if request.remove_image {
            self.images.stage_removal(previous).await?
        } else {
            self.images.stage_upload(None, previous).await?
        };

        match self
            .repo
            .update(id, version, &draft, change.image_uri())
            .await
        {
            Ok(movie) => {
                self.images.commit(&mut change);
                info!(movie_id = id, version = movie.version, image_uri = ?movie.image_uri, "movie updated");
                Ok(EditOutcome { movie, warnings })
            }
            Err(err) => {
                self.images.compensate(&mut change).await;
                warn!(movie_id = id, state = ?change.state(), "movie update failed; image change rolled back");
                Err(self.classify_update_failure(id, err).await)
            }
        }
    }

    /// Remove a movie, then its image. The record removal is what counts;
    /// an image that cannot be deleted is logged and left behind.
    pub async fn delete(&self, id: i64) -> CatalogResult<Movie> {
        let movie = self.repo.delete(id).await?.ok_or(CatalogError::NotFound(id))?;

        if let Some(uri) = movie.image_uri.as_deref() {
            self.images.discard(uri).await;
        }

        info!(movie_id = id, "movie deleted");
        Ok(movie)
    }

    /// A failed version check means the row is gone or moved on; tell the two
    /// apart by looking the row up again.
    async fn classify_update_failure(&self, id: i64, err: RepositoryError) -> CatalogError {
        match err {
            RepositoryError::Conflict(_) => match self.repo.exists(id).await {
                Ok(false) => CatalogError::NotFound(id),
                Ok(true) => CatalogError::ConcurrencyConflict(id),
                Err(lookup) => {
                    warn!(movie_id = id, error = %lookup, "existence check after conflict failed");
                    CatalogError::ConcurrencyConflict(id)
                }
            },
            other => other.into(),
        }
    }
}

fn parse_version(raw: Option<&str>) -> Result<i64, FieldError> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| FieldError {
            field: "version",
            message: "is required".into(),
        })
}
