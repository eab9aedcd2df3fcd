//! Image asset coordinator.
//!
//! Keeps a movie's `image_uri` and the blob store in agreement across the
//! create/edit/delete flows. Raw [`BlobError`]s never leave this module; they
//! are classified into [`AssetError`] (which aborts the request) or
//! [`AssetWarning`] (a logged residue, e.g. a blob that could not be removed).
//!
//! The per-request lifecycle is tracked by [`ImageChange`]:
//!
//! ```text
//! NoImageChange ───────────────────────────────► Committed
//! UploadPending ─► UploadSucceeded ─► (retire old) ─► Committed
//!      │                 └─► CompensatingDelete ─► Failed
//!      └─► Failed
//! DeletePending ─► Committed | Failed
//! ```

use crate::services::blob_store::{BlobError, BlobStore, stream_from_bytes};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// An uploaded image as received from the caller.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("image upload failed")]
    UploadFailure(#[source] BlobError),
    #[error("image delete failed")]
    DeleteFailure(#[source] BlobError),
    #[error("stored image reference `{0}` is invalid")]
    InvalidReference(String),
}

/// Non-blocking outcome: a blob that should have been removed but was not.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AssetWarning {
    pub uri: String,
    pub message: String,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    /// No file supplied and no removal requested.
    NoImageChange,
    /// A new blob is being written.
    UploadPending,
    /// The new blob exists; the record update is outstanding.
    UploadSucceeded,
    /// The existing blob is being removed, or was removed and the record
    /// update is outstanding.
    DeletePending,
    /// The record now agrees with the blob store.
    Committed,
    /// The record write failed and the new blob is being removed.
    CompensatingDelete,
    Failed,
}

/// Image side of a single create/edit request.
#[derive(Clone, Debug)]
pub struct ImageChange {
    state: AssetState,
    previous: Option<String>,
    uploaded: Option<String>,
    target: Option<String>,
}

impl ImageChange {
    fn unchanged(previous: Option<String>) -> Self {
        Self {
            state: AssetState::NoImageChange,
            target: previous.clone(),
            previous,
            uploaded: None,
        }
    }

    pub fn state(&self) -> AssetState {
        self.state
    }

    /// Reference the record should be written with.
    pub fn image_uri(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Blob written by this request, if any.
    pub fn uploaded_uri(&self) -> Option<&str> {
        self.uploaded.as_deref()
    }
}

/// Mediates every write to image blobs. Holds no per-request state, so one
/// instance is shared by all requests.
#[derive(Clone)]
pub struct ImageAssetCoordinator {
    store: Arc<dyn BlobStore>,
}

impl ImageAssetCoordinator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Upload `payload` when present.
    ///
    /// Without a payload the change keeps `previous`. A failed upload leaves
    /// nothing behind, so there is nothing to compensate.
    pub async fn stage_upload(
        &self,
        payload: Option<ImagePayload>,
        previous: Option<String>,
    ) -> Result<ImageChange, AssetError> {
        let mut change = ImageChange::unchanged(previous);
        let Some(payload) = payload else {
            return Ok(change);
        };

        change.state = AssetState::UploadPending;
        let size_bytes = payload.bytes.len();
        match self
            .store
            .upload(
                stream_from_bytes(payload.bytes),
                &payload.content_type,
                payload.file_name.as_deref(),
            )
            .await
        {
            Ok(uri) => {
                change.state = AssetState::UploadSucceeded;
                change.uploaded = Some(uri.clone());
                change.target = Some(uri);
                Ok(change)
            }
            Err(err) => {
                error!(error = %err, size_bytes, content_type = %payload.content_type, "image upload failed");
                Err(AssetError::UploadFailure(err))
            }
        }
    }

    /// Remove `previous` because the caller asked for the image to go.
    ///
    /// Any failure aborts the edit: the record must keep pointing at the
    /// blob the caller believes was removed.
    pub async fn stage_removal(&self, previous: Option<String>) -> Result<ImageChange, AssetError> {
        let mut change = ImageChange::unchanged(previous);
        let Some(uri) = change.previous.clone() else {
            return Ok(change);
        };

        change.state = AssetState::DeletePending;
        match self.store.delete(&uri).await {
            Ok(()) => {
                change.target = None;
                Ok(change)
            }
            Err(BlobError::InvalidReference(bad)) => {
                error!(%uri, "stored image reference cannot be parsed");
                Err(AssetError::InvalidReference(bad))
            }
            Err(err) => {
                error!(error = %err, %uri, "image delete failed");
                Err(AssetError::DeleteFailure(err))
            }
        }
    }

    /// After a successful replacement upload, remove the image it replaces.
    ///
    /// Never fails the request: the new blob is already canonical, so a
    /// failure only leaks the old one.
    pub async fn retire_previous(&self, change: &mut ImageChange) -> Option<AssetWarning> {
        if change.state != AssetState::UploadSucceeded {
            return None;
        }
        let uri = change.previous.clone()?;

        change.state = AssetState::DeletePending;
        let outcome = self.store.delete(&uri).await;
        change.state = AssetState::UploadSucceeded;

        match outcome {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, %uri, "replaced image could not be deleted; blob leaked");
                Some(AssetWarning {
                    uri,
                    message: "previous image could not be removed".into(),
                })
            }
        }
    }

    /// Mark the change as persisted.
    pub fn commit(&self, change: &mut ImageChange) {
        change.state = AssetState::Committed;
    }

    /// The record write failed: delete the blob this request uploaded and
    /// point the change back at the previous reference.
    ///
    /// A failed cleanup is logged only; the caller keeps reporting the
    /// persistence failure that triggered it.
    pub async fn compensate(&self, change: &mut ImageChange) {
        if let Some(uri) = change.uploaded.take() {
            change.state = AssetState::CompensatingDelete;
            match self.store.delete(&uri).await {
                Ok(()) => info!(%uri, "removed image orphaned by failed write"),
                Err(err) => {
                    warn!(error = %err, %uri, "compensating image delete failed; blob leaked");
                }
            }
        }
        change.target = change.previous.clone();
        change.state = AssetState::Failed;
    }

    /// Remove the image of a movie that is being deleted. Failures are
    /// residue, not errors.
    pub async fn discard(&self, uri: &str) -> Option<AssetWarning> {
        match self.store.delete(uri).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, %uri, "image of deleted movie could not be removed; blob leaked");
                Some(AssetWarning {
                    uri: uri.to_string(),
                    message: "image could not be removed".into(),
                })
            }
        }
    }
}
