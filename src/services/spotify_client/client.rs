use crate::services::catalog::{
    CatalogApi, CatalogApiError, CatalogItem, LibraryScope, PlaylistHeader, PlaylistTracksPage,
};
use crate::services::spotify_client::parser::{
    parse_batch, parse_library_page, parse_playlist, parse_playlist_tracks,
};
use crate::types::{CatalogId, ItemKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PLAYLIST_TRACKS_PAGE_SIZE: u32 = 100;
const LIBRARY_PAGE_SIZE: u32 = 50;
const PLAYLIST_FIELDS: &str = "id,name,snapshot_id,images,owner(id,display_name),tracks(total)";
const PLAYLIST_TRACKS_FIELDS: &str = "items(track(id)),next";

pub(crate) enum AccessToken {
    Static(String),
    /// Re-read before every request, so an external helper can refresh it.
    File(PathBuf),
}

/// Catalog backed by the Spotify Web API.
pub(crate) struct SpotifyClient {
    client: Client,
    endpoint: String,
    market: Option<String>,
    access_token: AccessToken,
}

fn map_request_error(error: reqwest::Error) -> CatalogApiError {
    if error.is_timeout() {
        CatalogApiError::Timeout
    } else {
        CatalogApiError::Transient(error.to_string())
    }
}

fn map_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> CatalogApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CatalogApiError::RateLimited { retry_after },
        StatusCode::NOT_FOUND => CatalogApiError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::REQUEST_TIMEOUT => {
            CatalogApiError::Transient(format!("{}: {}", status, body))
        }
        status if status.is_server_error() => {
            CatalogApiError::Transient(format!("{}: {}", status, body))
        }
        status => CatalogApiError::Permanent(format!("{}: {}", status, body)),
    }
}

fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    value
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn malformed(error: impl std::fmt::Display) -> CatalogApiError {
    CatalogApiError::Transient(format!("Malformed catalog response: {}", error))
}

impl SpotifyClient {
    pub(crate) fn create(
        endpoint: &str,
        access_token: AccessToken,
        market: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let market = match market.trim() {
            "" => None,
            market => Some(market.to_string()),
        };

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            market,
            access_token,
        })
    }

    async fn bearer_token(&self) -> Result<String, CatalogApiError> {
        let token = match &self.access_token {
            AccessToken::Static(token) => token.trim().to_string(),
            AccessToken::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|error| {
                    CatalogApiError::Transient(format!("Unable to read access token: {}", error))
                })?
                .trim()
                .to_string(),
        };

        if token.is_empty() {
            return Err(CatalogApiError::Transient("Access token is empty".into()));
        }

        Ok(token)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, CatalogApiError> {
        let token = self.bearer_token().await?;

        debug!(url, ?query, "Calling catalog API");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();

        if status.is_success() {
            return response.text().await.map_err(map_request_error);
        }

        let retry_after = parse_retry_after(response.headers().get(reqwest::header::RETRY_AFTER));
        let body = response.text().await.unwrap_or_default();

        Err(map_status(status, retry_after, body.trim()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn with_market(&self, mut query: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(market) = &self.market {
            query.push(("market", market.clone()));
        }
        query
    }

    fn library_url(&self, scope: LibraryScope) -> (String, Vec<(&'static str, String)>) {
        let limit = ("limit", LIBRARY_PAGE_SIZE.to_string());

        match scope {
            LibraryScope::SavedTracks => (self.url("me/tracks"), vec![limit]),
            LibraryScope::SavedAlbums => (self.url("me/albums"), vec![limit]),
            LibraryScope::FollowedArtists => (
                self.url("me/following"),
                vec![("type", "artist".to_string()), limit],
            ),
            LibraryScope::Playlists => (self.url("me/playlists"), vec![limit]),
        }
    }
}

#[async_trait]
impl CatalogApi for SpotifyClient {
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
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let ids_param = ids.iter().map(|id| &**id).collect::<Vec<_>>().join(",");

        let raw_json = match kind {
            ItemKind::Track => {
                let query = self.with_market(vec![("ids", ids_param)]);
                self.get(&self.url("tracks"), &query).await?
            }
            ItemKind::Album => {
                let query = self.with_market(vec![("ids", ids_param)]);
                self.get(&self.url("albums"), &query).await?
            }
            ItemKind::Artist => self.get(&self.url("artists"), &[("ids", ids_param)]).await?,
            ItemKind::Playlist => {
                let mut items = Vec::with_capacity(ids.len());

                for id in ids {
                    let raw_json = self
                        .get(
                            &self.url(&format!("playlists/{}", id)),
                            &[("fields", PLAYLIST_FIELDS.to_string())],
                        )
                        .await?;
                    items.push(parse_playlist(&raw_json).map_err(malformed)?.1);
                }

                return Ok(items);
            }
        };

        parse_batch(&raw_json, kind).map_err(malformed)
    }

    async fn fetch_playlist_header(
        &self,
        id: &CatalogId,
    ) -> Result<PlaylistHeader, CatalogApiError> {
        let raw_json = self
            .get(
                &self.url(&format!("playlists/{}", id)),
                &[("fields", PLAYLIST_FIELDS.to_string())],
            )
            .await?;

        Ok(parse_playlist(&raw_json).map_err(malformed)?.0)
    }

    async fn fetch_playlist_tracks(
        &self,
        id: &CatalogId,
        page: u32,
    ) -> Result<PlaylistTracksPage, CatalogApiError> {
        let query = self.with_market(vec![
            ("fields", PLAYLIST_TRACKS_FIELDS.to_string()),
            ("limit", PLAYLIST_TRACKS_PAGE_SIZE.to_string()),
            ("offset", (page * PLAYLIST_TRACKS_PAGE_SIZE).to_string()),
        ]);

        let raw_json = self
            .get(&self.url(&format!("playlists/{}/tracks", id)), &query)
            .await?;

        parse_playlist_tracks(&raw_json, page).map_err(malformed)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_library_shape(
        &self,
        scope: LibraryScope,
    ) -> Result<Vec<CatalogId>, CatalogApiError> {
        let (first_url, query) = self.library_url(scope);

        let mut ids = vec![];
        let mut raw_json = self.get(&first_url, &query).await?;

        loop {
            let (page_ids, next) = parse_library_page(&raw_json, scope).map_err(malformed)?;
            ids.extend(page_ids);

            match next {
                // `next` already carries the query string.
                Some(next) => raw_json = self.get(&next, &[]).await?,
                None => break,
            }
        }

        debug!(%scope, items = ids.len(), "Library listing fetched");

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_statuses_to_retry_classes() {
        assert!(matches!(
            map_status(
                StatusCode::TOO_MANY_REQUESTS,
                Some(Duration::from_secs(7)),
                ""
            ),
            CatalogApiError::RateLimited {
                retry_after: Some(delay)
            } if delay == Duration::from_secs(7)
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, None, ""),
            CatalogApiError::NotFound
        ));
        assert!(map_status(StatusCode::BAD_GATEWAY, None, "").is_transient());
        assert!(map_status(StatusCode::UNAUTHORIZED, None, "").is_transient());
        assert!(!map_status(StatusCode::BAD_REQUEST, None, "invalid id").is_transient());
    }

    #[test]
    fn should_parse_retry_after_seconds() {
        let value = reqwest::header::HeaderValue::from_static("12");

        assert_eq!(parse_retry_after(Some(&value)), Some(Duration::from_secs(12)));
        assert_eq!(
            parse_retry_after(Some(&reqwest::header::HeaderValue::from_static("soon"))),
            None
        );
        assert_eq!(parse_retry_after(None), None);
    }

    #[tokio::test]
    async fn should_read_access_token_from_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("token");
        std::fs::write(&path, "secret-token\n").unwrap();

        let client = SpotifyClient::create(
            "https://api.spotify.com/v1/",
            AccessToken::File(path.clone()),
            "from_token",
        )
        .unwrap();

        assert_eq!(client.bearer_token().await.unwrap(), "secret-token");
        assert_eq!(client.url("tracks"), "https://api.spotify.com/v1/tracks");

        std::fs::write(&path, "  ").unwrap();
        assert!(client.bearer_token().await.is_err());
    }
}
