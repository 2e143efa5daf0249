use super::extended::{ExtendedFields, FieldSource, Sourced};
use super::traits::{CatalogApi, CatalogApiError};
use super::types::{
    BasicFields, CacheKey, CatalogItem, LibraryScope, ParentRef, PlaylistHeader,
    PlaylistTracksPage,
};
use crate::types::{CatalogId, ItemKind};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn parent(id: &str) -> ParentRef {
    ParentRef {
        id: id.into(),
        name: format!("Name of {}", id),
    }
}

pub(crate) fn track(id: &str, album_id: &str, artist_id: &str, duration_ms: u64) -> CatalogItem {
    CatalogItem::ready(
        id.into(),
        ItemKind::Track,
        BasicFields {
            name: format!("Title of {}", id),
            duration_ms: Some(duration_ms),
            album: Some(parent(album_id)),
            artists: vec![parent(artist_id)],
            ..BasicFields::default()
        },
        ExtendedFields::default(),
    )
}

pub(crate) fn album(id: &str, artist_id: &str, label: &str) -> CatalogItem {
    CatalogItem::ready(
        id.into(),
        ItemKind::Album,
        BasicFields {
            name: format!("Name of {}", id),
            artists: vec![parent(artist_id)],
            release_date: Some("1996-02-19".into()),
            ..BasicFields::default()
        },
        ExtendedFields {
            label: Some(Sourced::new(label.to_string(), FieldSource::Catalog)),
            copyrights: Some(Sourced::new(
                vec![format!("(P) 1996 {}", label)],
                FieldSource::Catalog,
            )),
            ..ExtendedFields::default()
        },
    )
}

pub(crate) fn artist(id: &str, genres: &[&str], followers: u64) -> CatalogItem {
    CatalogItem::ready(
        id.into(),
        ItemKind::Artist,
        BasicFields {
            name: format!("Name of {}", id),
            ..BasicFields::default()
        },
        ExtendedFields {
            genres: Some(Sourced::new(
                genres.iter().map(|genre| genre.to_string()).collect(),
                FieldSource::Catalog,
            )),
            follower_count: Some(Sourced::new(followers, FieldSource::Catalog)),
            ..ExtendedFields::default()
        },
    )
}

pub(crate) fn ids(ids: &[&str]) -> Vec<CatalogId> {
    ids.iter().map(|id| CatalogId::from(*id)).collect()
}

struct Playlist {
    header: PlaylistHeader,
    tracks: Vec<CatalogId>,
}

#[derive(Default)]
struct Activity {
    active: usize,
    max_active: usize,
}

/// Catalog backed by in-memory fixtures. Every call is logged.
pub(crate) struct CatalogApiMock {
    items: Mutex<HashMap<CacheKey, CatalogItem>>,
    playlists: Mutex<Vec<Playlist>>,
    library: Mutex<HashMap<LibraryScope, Option<Vec<CatalogId>>>>,
    batch_failures: Mutex<VecDeque<CatalogApiError>>,
    latency: Duration,
    page_size: usize,
    activity: Mutex<Activity>,
    pub(crate) batch_calls: Mutex<Vec<(ItemKind, Vec<CatalogId>)>>,
    pub(crate) header_calls: Mutex<Vec<CatalogId>>,
    pub(crate) track_page_calls: Mutex<Vec<(CatalogId, u32)>>,
}

impl CatalogApiMock {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            playlists: Mutex::new(vec![]),
            library: Mutex::new(HashMap::new()),
            batch_failures: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
            page_size: 100,
            activity: Mutex::new(Activity::default()),
            batch_calls: Mutex::new(vec![]),
            header_calls: Mutex::new(vec![]),
            track_page_calls: Mutex::new(vec![]),
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub(crate) fn add_item(&self, item: CatalogItem) {
        self.items.lock().unwrap().insert(item.key(), item);
    }

    pub(crate) fn remove_item(&self, id: &str, kind: ItemKind) {
        self.items
            .lock()
            .unwrap()
            .remove(&CacheKey::new(id.into(), kind));
    }

    pub(crate) fn set_playlist(&self, id: &str, name: &str, version_token: &str, tracks: &[&str]) {
        let mut playlists = self.playlists.lock().unwrap();
        let playlist = Playlist {
            header: PlaylistHeader {
                id: id.into(),
                name: name.into(),
                version_token: version_token.into(),
            },
            tracks: self::ids(tracks),
        };

        match playlists.iter_mut().find(|p| *p.header.id == *id) {
            Some(existing) => *existing = playlist,
            None => playlists.push(playlist),
        }
    }

    pub(crate) fn remove_playlist(&self, id: &str) {
        self.playlists
            .lock()
            .unwrap()
            .retain(|playlist| *playlist.header.id != *id);
    }

    pub(crate) fn set_library(&self, scope: LibraryScope, ids: &[&str]) {
        self.library
            .lock()
            .unwrap()
            .insert(scope, Some(self::ids(ids)));
    }

    pub(crate) fn fail_library(&self, scope: LibraryScope) {
        self.library.lock().unwrap().insert(scope, None);
    }

    pub(crate) fn push_batch_failure(&self, error: CatalogApiError) {
        self.batch_failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn batch_calls_for(&self, kind: ItemKind) -> usize {
        self.batch_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call_kind, _)| *call_kind == kind)
            .count()
    }

    pub(crate) fn total_batch_calls(&self) -> usize {
        self.batch_calls.lock().unwrap().len()
    }

    pub(crate) fn track_page_call_count(&self) -> usize {
        self.track_page_calls.lock().unwrap().len()
    }

    pub(crate) fn max_concurrent_batches(&self) -> usize {
        self.activity.lock().unwrap().max_active
    }
}

#[async_trait]
impl CatalogApi for CatalogApiMock {
    fn max_batch_size(&self, kind: ItemKind) -> usize {
        match kind {
            ItemKind::Track => 50,
            ItemKind::Album => 20,
            ItemKind::Artist => 50,
            ItemKind::Playlist => 1,
        }
    }

    async fn fetch_batch(
        &self,
        ids: &[CatalogId],
        kind: ItemKind,
    ) -> Result<Vec<CatalogItem>, CatalogApiError> {
        self.batch_calls
            .lock()
            .unwrap()
            .push((kind, ids.to_vec()));

        {
            let mut activity = self.activity.lock().unwrap();
            activity.active += 1;
            activity.max_active = activity.max_active.max(activity.active);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.activity.lock().unwrap().active -= 1;

        if let Some(error) = self.batch_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let items = self.items.lock().unwrap();

        Ok(ids
            .iter()
            .filter_map(|id| items.get(&CacheKey::new(id.clone(), kind)).cloned())
            .collect())
    }

    async fn fetch_playlist_header(
        &self,
        id: &CatalogId,
    ) -> Result<PlaylistHeader, CatalogApiError> {
        self.header_calls.lock().unwrap().push(id.clone());

        self.playlists
            .lock()
            .unwrap()
            .iter()
            .find(|playlist| playlist.header.id == *id)
            .map(|playlist| playlist.header.clone())
            .ok_or(CatalogApiError::NotFound)
    }

    async fn fetch_playlist_tracks(
        &self,
        id: &CatalogId,
        page: u32,
    ) -> Result<PlaylistTracksPage, CatalogApiError> {
        self.track_page_calls
            .lock()
            .unwrap()
            .push((id.clone(), page));

        let playlists = self.playlists.lock().unwrap();
        let playlist = playlists
            .iter()
            .find(|playlist| playlist.header.id == *id)
            .ok_or(CatalogApiError::NotFound)?;

        let start = page as usize * self.page_size;
        let end = (start + self.page_size).min(playlist.tracks.len());
        let track_ids = playlist.tracks.get(start..end).unwrap_or_default().to_vec();
        let next_page = if end < playlist.tracks.len() {
            Some(page + 1)
        } else {
            None
        };

        Ok(PlaylistTracksPage {
            track_ids,
            next_page,
        })
    }

    async fn fetch_library_shape(
        &self,
        scope: LibraryScope,
    ) -> Result<Vec<CatalogId>, CatalogApiError> {
        if scope == LibraryScope::Playlists {
            if let Some(None) = self.library.lock().unwrap().get(&scope) {
                return Err(CatalogApiError::Transient("Library unavailable".into()));
            }

            return Ok(self
                .playlists
                .lock()
                .unwrap()
                .iter()
                .map(|playlist| playlist.header.id.clone())
                .collect());
        }

        match self.library.lock().unwrap().get(&scope) {
            Some(Some(ids)) => Ok(ids.clone()),
            Some(None) => Err(CatalogApiError::Transient("Library unavailable".into())),
            None => Ok(vec![]),
        }
    }
}
