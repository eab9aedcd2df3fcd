//! Shared fixtures for service tests: an in-memory database and failure
//! injecting wrappers around the real blob store and repository.

use crate::{
    db,
    models::{
        movie::{Movie, MovieDraft, MovieForm},
        sort::SortOption,
    },
    services::{
        blob_store::{BlobError, BlobResult, BlobStore, BlobStream, LocalBlobStore, stream_from_bytes},
        movie_query::MovieFilter,
        movie_repository::{MovieRepository, RepositoryError, RepositoryResult, SqliteMovieRepository},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;
use tokio::fs;

/// Migrated in-memory database on a single long-lived connection.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    db::run_migrations(&pool).await.expect("migrations");
    Arc::new(pool)
}

pub fn draft(title: &str, release_date: &str, genre: &str, price: &str, rating: &str) -> MovieDraft {
    form(title, release_date, genre, price, rating)
        .validate()
        .expect("valid draft")
}

pub fn form(title: &str, release_date: &str, genre: &str, price: &str, rating: &str) -> MovieForm {
    MovieForm {
        title: Some(title.into()),
        release_date: Some(release_date.into()),
        genre: Some(genre.into()),
        price: Some(price.into()),
        rating: Some(rating.into()),
    }
}

pub fn draft_of(movie: &Movie) -> MovieDraft {
    MovieDraft {
        title: movie.title.clone(),
        release_date: movie.release_date,
        genre: movie.genre.clone(),
        price: movie.price,
        rating: movie.rating.clone(),
    }
}

fn injected(what: &str) -> BlobError {
    BlobError::Store(io::Error::new(ErrorKind::ConnectionReset, format!("injected {what} failure")))
}

/// Local blob store whose uploads and deletes can be switched to fail.
pub struct FlakyBlobStore {
    inner: LocalBlobStore,
    root: PathBuf,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
}

impl FlakyBlobStore {
    pub async fn new() -> (Arc<Self>, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let inner = LocalBlobStore::new(dir.path(), "files", "http://localhost:3000/blobs");
        inner.ensure_container().await.expect("container");
        let store = Arc::new(Self {
            root: dir.path().join("files"),
            inner,
            fail_uploads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        });
        (store, dir)
    }

    pub fn fail_uploads(&self, on: bool) {
        self.fail_uploads.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    /// Upload calls received, failed ones included.
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Delete calls received, failed ones included.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Store a blob directly, bypassing counters and failure switches.
    pub async fn seed_blob(&self) -> String {
        self.inner
            .upload(stream_from_bytes(Bytes::from_static(b"old-poster")), "image/jpeg", None)
            .await
            .expect("seed blob")
    }

    pub async fn exists(&self, uri: &str) -> bool {
        let Ok(key) = LocalBlobStore::key_from_uri(uri) else {
            return false;
        };
        self.inner
            .open(self.inner.container(), &key.to_string())
            .await
            .is_ok()
    }

    /// Number of blobs in the container (one sidecar per blob).
    pub async fn blob_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let Ok(mut entries) = fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "json") {
                    count += 1;
                }
            }
        }
        count
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn ensure_container(&self) -> BlobResult<()> {
        self.inner.ensure_container().await
    }

    async fn upload(
        &self,
        content: BlobStream,
        content_type: &str,
        name_hint: Option<&str>,
    ) -> BlobResult<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(injected("upload"));
        }
        self.inner.upload(content, content_type, name_hint).await
    }

    async fn delete(&self, uri: &str) -> BlobResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(uri).await
    }
}

/// What the next write through [`FlakyRepository`] runs into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interference {
    None,
    /// Another request edits the row first, so the version check fails.
    ConcurrentEdit,
    /// Another request deletes the row first.
    ConcurrentDelete,
    /// The database itself errors out.
    StorageError,
}

/// SQLite repository with injectable interference on insert/update.
pub struct FlakyRepository {
    pub inner: SqliteMovieRepository,
    update: Mutex<Interference>,
    fail_inserts: AtomicBool,
}

impl FlakyRepository {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteMovieRepository::new(memory_pool().await),
            update: Mutex::new(Interference::None),
            fail_inserts: AtomicBool::new(false),
        })
    }

    pub fn interfere_with_next_update(&self, interference: Interference) {
        *self.update.lock().unwrap() = interference;
    }

    pub fn fail_inserts(&self, on: bool) {
        self.fail_inserts.store(on, Ordering::SeqCst);
    }

    fn take_interference(&self) -> Interference {
        std::mem::replace(&mut *self.update.lock().unwrap(), Interference::None)
    }
}

#[async_trait]
impl MovieRepository for FlakyRepository {
    async fn count_matching(&self, filter: &MovieFilter) -> RepositoryResult<u64> {
        self.inner.count_matching(filter).await
    }

    async fn fetch_matching(
        &self,
        filter: &MovieFilter,
        sort: SortOption,
        offset: u64,
        limit: u64,
    ) -> RepositoryResult<Vec<Movie>> {
        self.inner.fetch_matching(filter, sort, offset, limit).await
    }

    async fn distinct_genres(&self) -> RepositoryResult<Vec<String>> {
        self.inner.distinct_genres().await
    }

    async fn distinct_ratings(&self) -> RepositoryResult<Vec<String>> {
        self.inner.distinct_ratings().await
    }

    async fn find(&self, id: i64) -> RepositoryResult<Option<Movie>> {
        self.inner.find(id).await
    }

    async fn exists(&self, id: i64) -> RepositoryResult<bool> {
        self.inner.exists(id).await
    }

    async fn insert(&self, draft: &MovieDraft, image_uri: Option<&str>) -> RepositoryResult<Movie> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.inner.insert(draft, image_uri).await
    }

    async fn update(
        &self,
        id: i64,
        expected_version: i64,
        draft: &MovieDraft,
        image_uri: Option<&str>,
    ) -> RepositoryResult<Movie> {
        match self.take_interference() {
            Interference::None => {}
            Interference::ConcurrentEdit => {
                if let Some(current) = self.inner.find(id).await? {
                    self.inner
                        .update(id, current.version, &draft_of(&current), current.image_uri.as_deref())
                        .await?;
                }
            }
            Interference::ConcurrentDelete => {
                self.inner.delete(id).await?;
            }
            Interference::StorageError => {
                return Err(RepositoryError::Sqlx(sqlx::Error::PoolTimedOut));
            }
        }
        self.inner.update(id, expected_version, draft, image_uri).await
    }

    async fn delete(&self, id: i64) -> RepositoryResult<Option<Movie>> {
        self.inner.delete(id).await
    }
}
