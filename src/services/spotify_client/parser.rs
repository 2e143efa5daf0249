use crate::services::catalog::{
    BasicFields, CatalogItem, ExtendedFields, FieldSource, LibraryScope, ParentRef,
    PlaylistHeader, PlaylistTracksPage, Sourced,
};
use crate::types::{CatalogId, ItemKind};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Image {
    url: String,
}

#[derive(Deserialize)]
struct SimpleObject {
    id: Option<String>,
    #[serde(default)]
    name: String,
}

impl SimpleObject {
    fn to_parent(&self) -> Option<ParentRef> {
        self.id.as_ref().map(|id| ParentRef {
            id: id.as_str().into(),
            name: self.name.clone(),
        })
    }
}

#[derive(Deserialize)]
struct SimpleAlbum {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Deserialize)]
struct Track {
    id: Option<String>,
    #[serde(default)]
    name: String,
    duration_ms: Option<u64>,
    album: Option<SimpleAlbum>,
    #[serde(default)]
    artists: Vec<SimpleObject>,
}

#[derive(Deserialize)]
struct Copyright {
    text: String,
}

#[derive(Deserialize)]
struct Album {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    artists: Vec<SimpleObject>,
    release_date: Option<String>,
    total_tracks: Option<u32>,
    label: Option<String>,
    #[serde(default)]
    copyrights: Vec<Copyright>,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Deserialize)]
struct Followers {
    total: Option<u64>,
}

#[derive(Deserialize)]
struct Artist {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    genres: Vec<String>,
    followers: Option<Followers>,
}

#[derive(Deserialize)]
struct Owner {
    display_name: Option<String>,
    id: Option<String>,
}

#[derive(Deserialize)]
struct TracksTotal {
    total: Option<u32>,
}

#[derive(Deserialize)]
struct Playlist {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    snapshot_id: String,
    #[serde(default)]
    images: Option<Vec<Image>>,
    owner: Option<Owner>,
    tracks: Option<TracksTotal>,
}

fn catalog_field<T>(value: T) -> Option<Sourced<T>> {
    Some(Sourced::new(value, FieldSource::Catalog))
}

fn image_urls(images: &[Image]) -> Vec<String> {
    images.iter().map(|image| image.url.clone()).collect()
}

fn parents(objects: &[SimpleObject]) -> Vec<ParentRef> {
    objects.iter().filter_map(SimpleObject::to_parent).collect()
}

fn track_item(track: Track) -> Option<CatalogItem> {
    let id = track.id?;
    let images = track
        .album
        .as_ref()
        .map(|album| image_urls(&album.images))
        .unwrap_or_default();
    let album = track.album.and_then(|album| {
        album.id.map(|id| ParentRef {
            id: id.into(),
            name: album.name,
        })
    });

    Some(CatalogItem::ready(
        id.into(),
        ItemKind::Track,
        BasicFields {
            name: track.name,
            duration_ms: track.duration_ms,
            images,
            album,
            artists: parents(&track.artists),
            ..BasicFields::default()
        },
        ExtendedFields::default(),
    ))
}

fn album_item(album: Album) -> CatalogItem {
    let copyrights: Vec<String> = album
        .copyrights
        .into_iter()
        .map(|copyright| copyright.text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    CatalogItem::ready(
        album.id.into(),
        ItemKind::Album,
        BasicFields {
            name: album.name,
            images: image_urls(&album.images),
            artists: parents(&album.artists),
            release_date: album.release_date,
            total_tracks: album.total_tracks,
            ..BasicFields::default()
        },
        ExtendedFields {
            label: album.label.and_then(catalog_field),
            copyrights: catalog_field(copyrights),
            genres: catalog_field(album.genres),
            ..ExtendedFields::default()
        },
    )
}

fn artist_item(artist: Artist) -> CatalogItem {
    CatalogItem::ready(
        artist.id.into(),
        ItemKind::Artist,
        BasicFields {
            name: artist.name,
            images: image_urls(&artist.images),
            ..BasicFields::default()
        },
        ExtendedFields {
            genres: catalog_field(artist.genres),
            follower_count: artist
                .followers
                .and_then(|followers| followers.total)
                .and_then(catalog_field),
            ..ExtendedFields::default()
        },
    )
}

#[derive(Deserialize)]
struct TracksResponse {
    tracks: Vec<Option<Track>>,
}

#[derive(Deserialize)]
struct AlbumsResponse {
    albums: Vec<Option<Album>>,
}

#[derive(Deserialize)]
struct ArtistsResponse {
    artists: Vec<Option<Artist>>,
}

/// Unknown ids come back as `null` entries and are left out.
pub(crate) fn parse_batch(raw_json: &str, kind: ItemKind) -> Result<Vec<CatalogItem>, ParseError> {
    let items = match kind {
        ItemKind::Track => serde_json::from_str::<TracksResponse>(raw_json)?
            .tracks
            .into_iter()
            .flatten()
            .filter_map(track_item)
            .collect(),
        ItemKind::Album => serde_json::from_str::<AlbumsResponse>(raw_json)?
            .albums
            .into_iter()
            .flatten()
            .map(album_item)
            .collect(),
        ItemKind::Artist => serde_json::from_str::<ArtistsResponse>(raw_json)?
            .artists
            .into_iter()
            .flatten()
            .map(artist_item)
            .collect(),
        ItemKind::Playlist => vec![parse_playlist(raw_json)?.1],
    };

    Ok(items)
}

pub(crate) fn parse_playlist(raw_json: &str) -> Result<(PlaylistHeader, CatalogItem), ParseError> {
    let playlist: Playlist = serde_json::from_str(raw_json)?;
    let id = CatalogId::from(playlist.id);

    let header = PlaylistHeader {
        id: id.clone(),
        name: playlist.name.clone(),
        version_token: playlist.snapshot_id,
    };
    let owner = playlist
        .owner
        .and_then(|owner| owner.display_name.or(owner.id));

    let item = CatalogItem::ready(
        id,
        ItemKind::Playlist,
        BasicFields {
            name: playlist.name,
            images: image_urls(&playlist.images.unwrap_or_default()),
            owner,
            total_tracks: playlist.tracks.and_then(|tracks| tracks.total),
            ..BasicFields::default()
        },
        ExtendedFields::default(),
    );

    Ok((header, item))
}

#[derive(Deserialize)]
struct PlaylistTrackEntry {
    track: Option<SimpleObject>,
}

#[derive(Deserialize)]
struct PlaylistTracksResponse {
    #[serde(default)]
    items: Vec<PlaylistTrackEntry>,
    next: Option<String>,
}

/// Local files and removed tracks carry no id and are skipped.
pub(crate) fn parse_playlist_tracks(
    raw_json: &str,
    page: u32,
) -> Result<PlaylistTracksPage, ParseError> {
    let response: PlaylistTracksResponse = serde_json::from_str(raw_json)?;

    Ok(PlaylistTracksPage {
        track_ids: response
            .items
            .into_iter()
            .filter_map(|entry| entry.track.and_then(|track| track.id))
            .map(CatalogId::from)
            .collect(),
        next_page: response.next.map(|_| page + 1),
    })
}

#[derive(Deserialize)]
struct SavedEntry {
    track: Option<SimpleObject>,
    album: Option<SimpleObject>,
}

#[derive(Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct FollowedArtistsResponse {
    artists: Paging<SimpleObject>,
}

/// One page of a library listing: ids plus the absolute URL of the next page.
pub(crate) fn parse_library_page(
    raw_json: &str,
    scope: LibraryScope,
) -> Result<(Vec<CatalogId>, Option<String>), ParseError> {
    let (ids, next): (Vec<Option<String>>, Option<String>) = match scope {
        LibraryScope::SavedTracks => {
            let page: Paging<SavedEntry> = serde_json::from_str(raw_json)?;
            let ids = page
                .items
                .into_iter()
                .map(|entry| entry.track.and_then(|track| track.id))
                .collect();
            (ids, page.next)
        }
        LibraryScope::SavedAlbums => {
            let page: Paging<SavedEntry> = serde_json::from_str(raw_json)?;
            let ids = page
                .items
                .into_iter()
                .map(|entry| entry.album.and_then(|album| album.id))
                .collect();
            (ids, page.next)
        }
        LibraryScope::FollowedArtists => {
            let response: FollowedArtistsResponse = serde_json::from_str(raw_json)?;
            let ids = response
                .artists
                .items
                .into_iter()
                .map(|artist| artist.id)
                .collect();
            (ids, response.artists.next)
        }
        LibraryScope::Playlists => {
            let page: Paging<SimpleObject> = serde_json::from_str(raw_json)?;
            let ids = page.items.into_iter().map(|playlist| playlist.id).collect();
            (ids, page.next)
        }
    };

    Ok((ids.into_iter().flatten().map(CatalogId::from).collect(), next))
}
