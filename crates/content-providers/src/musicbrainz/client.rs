use crate::musicbrainz::parser::{
    parse_artist_search, parse_wikipedia_extract, parse_wikipedia_title,
};
use crate::pacing::{request_pacer, RequestPacer};
use crate::{ContentProviderError, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const WIKIPEDIA_API_BASE: &str = "https://en.wikipedia.org/w/api.php";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// MusicBrainz allows one request per second per client.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Artist biographies via a MusicBrainz artist search and the Wikipedia page
/// linked from the artist's url relations. No API key is required.
pub struct MusicBrainzClient {
    client: Client,
    musicbrainz_url: String,
    wikipedia_url: String,
    pacer: RequestPacer,
}

impl MusicBrainzClient {
    pub fn create() -> Result<Self, ContentProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            musicbrainz_url: MUSICBRAINZ_API_BASE.to_string(),
            wikipedia_url: WIKIPEDIA_API_BASE.to_string(),
            pacer: request_pacer(MIN_REQUEST_INTERVAL),
        })
    }

    pub fn with_base_urls(mut self, musicbrainz_url: &str, wikipedia_url: &str) -> Self {
        self.musicbrainz_url = musicbrainz_url.to_string();
        self.wikipedia_url = wikipedia_url.to_string();
        self
    }

    async fn musicbrainz_get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String, ContentProviderError> {
        self.pacer.until_ready().await;

        let response = self
            .client
            .get(format!("{}/{}", self.musicbrainz_url, path))
            .query(query)
            .query(&[("fmt", "json")])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }

    pub async fn artist_biography(
        &self,
        artist: &str,
    ) -> Result<Option<String>, ContentProviderError> {
        if artist.trim().is_empty() {
            return Ok(None);
        }

        let raw_json = self
            .musicbrainz_get("artist/", &[("query", artist), ("limit", "1")])
            .await?;
        let mbid = match parse_artist_search(&raw_json)? {
            Some(mbid) => mbid,
            None => {
                debug!(artist, "Artist not found on MusicBrainz");
                return Ok(None);
            }
        };

        let raw_json = self
            .musicbrainz_get(&format!("artist/{}", mbid), &[("inc", "url-rels")])
            .await?;
        let page_title = match parse_wikipedia_title(&raw_json)? {
            Some(page_title) => page_title,
            None => {
                debug!(artist, %mbid, "No Wikipedia relation for artist");
                return Ok(None);
            }
        };

        let raw_json = self
            .client
            .get(&self.wikipedia_url)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("titles", page_title.as_str()),
                ("format", "json"),
                ("redirects", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(parse_wikipedia_extract(&raw_json)?)
    }
}
