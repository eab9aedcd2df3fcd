//! src/services/movie_repository.rs
//!
//! Persistence for movie records. `SqliteMovieRepository` keeps one flat
//! `movies` table; every update is guarded by the row's `version` column so a
//! write based on a stale read is reported as a conflict instead of silently
//! overwriting a concurrent edit.

use crate::{
    models::{
        movie::{Movie, MovieDraft, MovieRow},
        sort::SortOption,
    },
    services::movie_query::MovieFilter,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;

const MOVIE_COLUMNS: &str =
    "id, title, release_date, genre, price_cents, rating, image_uri, version, updated_at";

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The row was deleted or its version moved on since it was read.
    #[error("movie {0} was modified or deleted concurrently")]
    Conflict(i64),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait MovieRepository: Send + Sync {
    /// Number of movies matching `filter`.
    async fn count_matching(&self, filter: &MovieFilter) -> RepositoryResult<u64>;

    /// One window of the movies matching `filter`, in `sort` order.
    async fn fetch_matching(
        &self,
        filter: &MovieFilter,
        sort: SortOption,
        offset: u64,
        limit: u64,
    ) -> RepositoryResult<Vec<Movie>>;

    /// Distinct genres across the whole table, ascending.
    async fn distinct_genres(&self) -> RepositoryResult<Vec<String>>;

    /// Distinct ratings across the whole table, ascending.
    async fn distinct_ratings(&self) -> RepositoryResult<Vec<String>>;

    async fn find(&self, id: i64) -> RepositoryResult<Option<Movie>>;

    async fn exists(&self, id: i64) -> RepositoryResult<bool>;

    async fn insert(&self, draft: &MovieDraft, image_uri: Option<&str>) -> RepositoryResult<Movie>;

    /// Overwrite movie `id` if its version is still `expected_version`.
    ///
    /// Returns `Conflict` when no row matched.
    async fn update(
        &self,
        id: i64,
        expected_version: i64,
        draft: &MovieDraft,
        image_uri: Option<&str>,
    ) -> RepositoryResult<Movie>;

    /// Remove movie `id`, returning the removed row.
    async fn delete(&self, id: i64) -> RepositoryResult<Option<Movie>>;
}

#[derive(Clone)]
pub struct SqliteMovieRepository {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMovieRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    async fn distinct_column(&self, column: &'static str) -> RepositoryResult<Vec<String>> {
        let sql = format!("SELECT DISTINCT {column} FROM movies ORDER BY {column} ASC");
        Ok(sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&*self.db)
            .await?)
    }
}

#[async_trait]
impl MovieRepository for SqliteMovieRepository {
    async fn count_matching(&self, filter: &MovieFilter) -> RepositoryResult<u64> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM movies WHERE 1 = 1");
        filter.push_conditions(&mut builder);
        let count: i64 = builder.build_query_scalar().fetch_one(&*self.db).await?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_matching(
        &self,
        filter: &MovieFilter,
        sort: SortOption,
        offset: u64,
        limit: u64,
    ) -> RepositoryResult<Vec<Movie>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(MOVIE_COLUMNS);
        builder.push(" FROM movies WHERE 1 = 1");
        filter.push_conditions(&mut builder);
        builder.push(" ORDER BY ");
        builder.push(sort.order_by());
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(offset as i64);

        let rows: Vec<MovieRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows.into_iter().map(Movie::from).collect())
    }

    async fn distinct_genres(&self) -> RepositoryResult<Vec<String>> {
        self.distinct_column("genre").await
    }

    async fn distinct_ratings(&self) -> RepositoryResult<Vec<String>> {
        self.distinct_column("rating").await
    }

    async fn find(&self, id: i64) -> RepositoryResult<Option<Movie>> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.map(Movie::from))
    }

    async fn exists(&self, id: i64) -> RepositoryResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM movies WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, draft: &MovieDraft, image_uri: Option<&str>) -> RepositoryResult<Movie> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "INSERT INTO movies (title, title_folded, release_date, genre, price_cents, rating, image_uri, version, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)
             RETURNING {MOVIE_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(draft.title_folded())
        .bind(draft.release_date)
        .bind(&draft.genre)
        .bind(draft.price_cents())
        .bind(&draft.rating)
        .bind(image_uri)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: i64,
        expected_version: i64,
        draft: &MovieDraft,
        image_uri: Option<&str>,
    ) -> RepositoryResult<Movie> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "UPDATE movies SET
                title = ?, title_folded = ?, release_date = ?, genre = ?, price_cents = ?,
                rating = ?, image_uri = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?
             RETURNING {MOVIE_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(draft.title_folded())
        .bind(draft.release_date)
        .bind(&draft.genre)
        .bind(draft.price_cents())
        .bind(&draft.rating)
        .bind(image_uri)
        .bind(Utc::now())
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&*self.db)
        .await?;

        row.map(Movie::from).ok_or(RepositoryError::Conflict(id))
    }

    async fn delete(&self, id: i64) -> RepositoryResult<Option<Movie>> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "DELETE FROM movies WHERE id = ? RETURNING {MOVIE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.map(Movie::from))
    }
}
