use crate::lastfm::parser::{parse_album_description, parse_artist_info};
use crate::pacing::{request_pacer, RequestPacer};
use crate::{ArtistInfo, ContentProviderError, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(250);

pub struct LastFmClient {
    client: Client,
    api_key: String,
    base_url: String,
    pacer: RequestPacer,
}

#[derive(Serialize)]
struct Query<'a> {
    method: &'a str,
    artist: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    album: Option<&'a str>,
    api_key: &'a str,
    format: &'a str,
    autocorrect: &'a str,
}

impl LastFmClient {
    pub fn create(api_key: &str) -> Result<Self, ContentProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: LASTFM_API_BASE.to_string(),
            pacer: request_pacer(MIN_REQUEST_INTERVAL),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    async fn call(&self, query: &Query<'_>) -> Result<String, ContentProviderError> {
        self.pacer.until_ready().await;

        debug!(method = query.method, artist = query.artist, "Calling Last.fm");

        let response = self
            .client
            .get(&self.base_url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }

    /// Biography and best available image of an artist in a single request.
    pub async fn artist_info(&self, artist: &str) -> Result<ArtistInfo, ContentProviderError> {
        if artist.trim().is_empty() {
            return Ok(ArtistInfo::default());
        }

        let raw_json = self
            .call(&Query {
                method: "artist.getInfo",
                artist,
                album: None,
                api_key: &self.api_key,
                format: "json",
                autocorrect: "1",
            })
            .await?;

        Ok(parse_artist_info(&raw_json)?)
    }

    pub async fn album_description(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Option<String>, ContentProviderError> {
        if artist.trim().is_empty() || album.trim().is_empty() {
            return Ok(None);
        }

        let raw_json = self
            .call(&Query {
                method: "album.getInfo",
                artist,
                album: Some(album),
                api_key: &self.api_key,
                format: "json",
                autocorrect: "1",
            })
            .await?;

        Ok(parse_album_description(&raw_json)?)
    }
}
