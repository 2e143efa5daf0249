use super::types::{CatalogItem, LibraryScope, PlaylistHeader, PlaylistTracksPage};
use crate::types::{CatalogId, ItemKind};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub(crate) enum CatalogApiError {
    #[error("Rate limited by catalog API")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Transient catalog API failure: {0}")]
    Transient(String),
    #[error("Requested object does not exist")]
    NotFound,
    #[error("Permanent catalog API failure: {0}")]
    Permanent(String),
    #[error("Catalog API request timed out")]
    Timeout,
}

impl CatalogApiError {
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self,
            CatalogApiError::RateLimited { .. }
                | CatalogApiError::Transient(_)
                | CatalogApiError::Timeout
        )
    }

    pub(crate) fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[async_trait]
pub(crate) trait CatalogApi: Send + Sync {
    /// Maximum number of ids accepted by a single `fetch_batch` call for `kind`.
    fn max_batch_size(&self, kind: ItemKind) -> usize;

    /// Items missing from a successful response are treated as gone.
    async fn fetch_batch(
        &self,
        ids: &[CatalogId],
        kind: ItemKind,
    ) -> Result<Vec<CatalogItem>, CatalogApiError>;

    async fn fetch_playlist_header(
        &self,
        id: &CatalogId,
    ) -> Result<PlaylistHeader, CatalogApiError>;

    /// Pages are numbered from zero.
    async fn fetch_playlist_tracks(
        &self,
        id: &CatalogId,
        page: u32,
    ) -> Result<PlaylistTracksPage, CatalogApiError>;

    async fn fetch_library_shape(
        &self,
        scope: LibraryScope,
    ) -> Result<Vec<CatalogId>, CatalogApiError>;
}
