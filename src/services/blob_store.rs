//! src/services/blob_store.rs
//!
//! Blob store adapter. The catalog only ever talks to the `BlobStore` trait:
//! upload bytes under a freshly generated key and get a public URI back, or
//! delete by URI. `LocalBlobStore` keeps the payloads on disk sharded beneath
//! `base_path/{container}/{shard}/{shard}/{key}`, with a JSON sidecar per blob
//! holding its content type and checksum.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use serde::{Deserialize, Serialize};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Byte stream handed to [`BlobStore::upload`].
pub type BlobStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob store failure: {0}")]
    Store(#[from] io::Error),
    #[error("blob reference `{0}` cannot be mapped to a store key")]
    InvalidReference(String),
    #[error("blob metadata is corrupt: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("blob `{0}` not found")]
    NotFound(String),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Contract of the external object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the container if it does not exist yet. Idempotent.
    async fn ensure_container(&self) -> BlobResult<()>;

    /// Store `content` under a new unique key and return its public URI.
    async fn upload(
        &self,
        content: BlobStream,
        content_type: &str,
        name_hint: Option<&str>,
    ) -> BlobResult<String>;

    /// Remove the blob behind `uri`. Deleting a blob that is already gone is
    /// not an error.
    async fn delete(&self, uri: &str) -> BlobResult<()>;
}

/// Sidecar metadata written next to every payload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlobMeta {
    pub key: Uuid,
    pub content_type: String,
    pub size_bytes: i64,
    pub etag: String,
    pub name_hint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Disk-backed blob store with one flat container.
#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    /// Root directory for all containers.
    base_path: PathBuf,

    /// Name of the single container blobs are written to.
    container: String,

    /// Prefix of every URI handed out, e.g. `http://127.0.0.1:3000/blobs`.
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        container: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            container: container.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn container_root(&self) -> PathBuf {
        self.base_path.join(&self.container)
    }

    /// Two-level shard directories from MD5(container/key), first two bytes
    /// as lowercase hex.
    fn shards(container: &str, key: &Uuid) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", container, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &Uuid) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(&self.container, key);
        let mut path = self.container_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key.to_string());
        path
    }

    fn meta_path(blob_path: &Path) -> PathBuf {
        blob_path.with_extension("json")
    }

    /// Public URI for a stored key.
    pub fn uri_for(&self, key: &Uuid) -> String {
        format!("{}/{}/{}", self.public_base_url, self.container, key)
    }

    /// Extract the store key from a URI previously produced by `uri_for`.
    ///
    /// Takes the last path segment, ignoring any query, fragment or file
    /// extension, and requires it to be a UUID.
    pub fn key_from_uri(uri: &str) -> BlobResult<Uuid> {
        let path = uri
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        let segment = path.rsplit('/').next().unwrap_or_default();
        let stem = segment.split('.').next().unwrap_or_default();
        Uuid::parse_str(stem).map_err(|_| BlobError::InvalidReference(uri.to_string()))
    }

    /// Open a stored blob for reading.
    ///
    /// Returns NotFound for an unknown container, an unknown key, or a
    /// payload whose sidecar is missing.
    pub async fn open(&self, container: &str, key: &str) -> BlobResult<(BlobMeta, File)> {
        let key = Uuid::parse_str(key).map_err(|_| BlobError::NotFound(key.to_string()))?;
        if container != self.container {
            return Err(BlobError::NotFound(key.to_string()));
        }

        let path = self.blob_path(&key);
        let raw_meta = fs::read(Self::meta_path(&path))
            .await
            .map_err(|err| not_found_or(err, &key))?;
        let meta: BlobMeta = serde_json::from_slice(&raw_meta)?;
        let file = File::open(&path)
            .await
            .map_err(|err| not_found_or(err, &key))?;

        Ok((meta, file))
    }

    /// Write `content` into a temp file beside `final_path`, then fsync and
    /// rename into place. Returns size and MD5 etag. The temp file is removed
    /// on every error path.
    async fn write_payload(
        &self,
        final_path: &Path,
        content: BlobStream,
    ) -> BlobResult<(i64, String)> {
        let parent = final_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BlobError::Store(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(content);
        while let Some(chunk_res) = content.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(BlobError::Store(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobError::Store(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Store(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Store(err));
        }

        if let Err(err) = fs::rename(&tmp_path, final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Store(err));
        }

        Ok((size_bytes, format!("{:x}", digest.compute())))
    }

    /// Remove empty shard directories up to the container root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.container_root();
        let mut current = start.to_path_buf();
        while current.starts_with(&stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn ensure_container(&self) -> BlobResult<()> {
        let root = self.container_root();
        fs::create_dir_all(&root).await?;
        debug!(container = %self.container, path = %root.display(), "blob container ready");
        Ok(())
    }

    async fn upload(
        &self,
        content: BlobStream,
        content_type: &str,
        name_hint: Option<&str>,
    ) -> BlobResult<String> {
        // v4 keys are never reused, so nothing is ever overwritten.
        let key = Uuid::new_v4();
        let path = self.blob_path(&key);
        let (size_bytes, etag) = self.write_payload(&path, content).await?;

        let meta = BlobMeta {
            key,
            content_type: content_type.to_string(),
            size_bytes,
            etag,
            name_hint: name_hint.map(str::to_string),
            created_at: Utc::now(),
        };
        let encoded = serde_json::to_vec(&meta)?;
        if let Err(err) = fs::write(Self::meta_path(&path), encoded).await {
            let _ = fs::remove_file(&path).await;
            return Err(BlobError::Store(err));
        }

        let uri = self.uri_for(&key);
        tracing::info!(%uri, size_bytes, content_type, "blob uploaded");
        Ok(uri)
    }

    async fn delete(&self, uri: &str) -> BlobResult<()> {
        let key = Self::key_from_uri(uri)?;
        let path = self.blob_path(&key);

        // Payload first: a failure here leaves the blob whole and servable.
        for target in [path.clone(), Self::meta_path(&path)] {
            match fs::remove_file(&target).await {
                Ok(_) => debug!("removed {}", target.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("{} already missing", target.display());
                }
                Err(err) => return Err(BlobError::Store(err)),
            }
        }

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }

        tracing::info!(%uri, "blob deleted");
        Ok(())
    }
}

fn not_found_or(err: io::Error, key: &Uuid) -> BlobError {
    if err.kind() == ErrorKind::NotFound {
        BlobError::NotFound(key.to_string())
    } else {
        BlobError::Store(err)
    }
}

/// Wrap an in-memory payload as a single-chunk [`BlobStream`].
pub fn stream_from_bytes(bytes: Bytes) -> BlobStream {
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}
