use super::extended::ExtendedFields;
use crate::types::{CatalogId, ItemKind};
use crate::utils::unix_timestamp_ms;
use serde::Serialize;

#[derive(Eq, PartialEq, Hash, Clone, Debug)]
pub(crate) struct CacheKey {
    pub(crate) id: CatalogId,
    pub(crate) kind: ItemKind,
}

impl CacheKey {
    pub(crate) fn new(id: CatalogId, kind: ItemKind) -> Self {
        Self { id, kind }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FailureKind {
    /// Retries were exhausted. The item is refetched on the next request.
    Transient,
    /// The catalog reported the item as gone.
    Permanent,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize)]
#[serde(tag = "state", content = "failure", rename_all = "lowercase")]
pub(crate) enum FetchState {
    Absent,
    Pending,
    Ready,
    Failed(FailureKind),
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize)]
pub(crate) struct ParentRef {
    pub(crate) id: CatalogId,
    pub(crate) name: String,
}

#[derive(Eq, PartialEq, Clone, Debug, Default, Serialize)]
pub(crate) struct BasicFields {
    pub(crate) name: String,
    pub(crate) duration_ms: Option<u64>,
    pub(crate) images: Vec<String>,
    pub(crate) album: Option<ParentRef>,
    pub(crate) artists: Vec<ParentRef>,
    pub(crate) release_date: Option<String>,
    pub(crate) owner: Option<String>,
    pub(crate) total_tracks: Option<u32>,
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize)]
pub(crate) struct CatalogItem {
    pub(crate) id: CatalogId,
    pub(crate) kind: ItemKind,
    pub(crate) basic: BasicFields,
    pub(crate) extended: ExtendedFields,
    pub(crate) fetch_state: FetchState,
    pub(crate) last_fetched_at: Option<u64>,
}

impl CatalogItem {
    pub(crate) fn absent(id: CatalogId, kind: ItemKind) -> Self {
        Self {
            id,
            kind,
            basic: BasicFields::default(),
            extended: ExtendedFields::default(),
            fetch_state: FetchState::Absent,
            last_fetched_at: None,
        }
    }

    pub(crate) fn ready(
        id: CatalogId,
        kind: ItemKind,
        basic: BasicFields,
        extended: ExtendedFields,
    ) -> Self {
        Self {
            id,
            kind,
            basic,
            extended,
            fetch_state: FetchState::Ready,
            last_fetched_at: Some(unix_timestamp_ms()),
        }
    }

    pub(crate) fn failed(id: CatalogId, kind: ItemKind, failure: FailureKind) -> Self {
        Self {
            fetch_state: FetchState::Failed(failure),
            last_fetched_at: Some(unix_timestamp_ms()),
            ..Self::absent(id, kind)
        }
    }

    pub(crate) fn key(&self) -> CacheKey {
        CacheKey::new(self.id.clone(), self.kind)
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(self.fetch_state, FetchState::Ready)
    }

    pub(crate) fn is_permanently_failed(&self) -> bool {
        matches!(self.fetch_state, FetchState::Failed(FailureKind::Permanent))
    }

    pub(crate) fn primary_artist(&self) -> Option<&ParentRef> {
        self.basic.artists.first()
    }
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize)]
pub(crate) struct PlaylistHeader {
    pub(crate) id: CatalogId,
    pub(crate) name: String,
    pub(crate) version_token: String,
}

#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub(crate) struct PlaylistTracksPage {
    pub(crate) track_ids: Vec<CatalogId>,
    pub(crate) next_page: Option<u32>,
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LibraryScope {
    SavedTracks,
    SavedAlbums,
    FollowedArtists,
    Playlists,
}

impl LibraryScope {
    pub(crate) const ALL: [LibraryScope; 4] = [
        LibraryScope::SavedTracks,
        LibraryScope::SavedAlbums,
        LibraryScope::FollowedArtists,
        LibraryScope::Playlists,
    ];

    pub(crate) fn item_kind(&self) -> ItemKind {
        match self {
            LibraryScope::SavedTracks => ItemKind::Track,
            LibraryScope::SavedAlbums => ItemKind::Album,
            LibraryScope::FollowedArtists => ItemKind::Artist,
            LibraryScope::Playlists => ItemKind::Playlist,
        }
    }
}

impl std::fmt::Display for LibraryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LibraryScope::SavedTracks => "saved_tracks",
            LibraryScope::SavedAlbums => "saved_albums",
            LibraryScope::FollowedArtists => "followed_artists",
            LibraryScope::Playlists => "playlists",
        };

        write!(f, "{}", name)
    }
}
