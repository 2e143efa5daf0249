use crate::services::catalog::CatalogApiError;
use crate::services::playlist_sync::PlaylistSnapshot;
use crate::types::CatalogId;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[error("Snapshot store error: {0}")]
pub(crate) struct SnapshotStoreError(pub(crate) Box<dyn std::error::Error + Send + Sync>);

#[async_trait]
pub(crate) trait SnapshotStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<PlaylistSnapshot>, SnapshotStoreError>;

    async fn save(&self, snapshot: &PlaylistSnapshot) -> Result<(), SnapshotStoreError>;

    async fn delete(&self, remote_id: &CatalogId) -> Result<(), SnapshotStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum PlaylistSyncError {
    #[error(transparent)]
    CatalogApiError(#[from] CatalogApiError),
    #[error(transparent)]
    SnapshotStoreError(#[from] SnapshotStoreError),
    #[error("Playlist file error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("{0} tracks could not be fetched")]
    UnavailableTracks(usize),
}

/// The local file no longer matches its snapshot. Never fatal: the file is regenerated.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SyncConflictError {
    #[error("Playlist file {0} is missing")]
    FileMissing(PathBuf),
    #[error("Playlist file {0} was modified outside of sync")]
    FileModified(PathBuf),
}
