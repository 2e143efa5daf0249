use crate::config::ContentProviderKind;
use crate::services::catalog::{Claim, InFlight};
use crate::services::enrichment::{EnrichmentProvider, EnrichmentProviderError};
use async_trait::async_trait;
use content_providers::{ArtistInfo, ContentProviderError, LastFmClient, MusicBrainzClient};
use std::sync::Arc;
use tracing::{info, warn};

fn provider_error(error: ContentProviderError) -> EnrichmentProviderError {
    EnrichmentProviderError(Box::new(error))
}

/// Selects the configured provider once at startup.
pub(crate) fn create_enrichment_provider(
    kind: ContentProviderKind,
    lastfm_api_key: Option<&str>,
) -> Arc<dyn EnrichmentProvider> {
    let provider: Arc<dyn EnrichmentProvider> = match kind {
        ContentProviderKind::None => Arc::new(NoProvider),
        ContentProviderKind::LastFm => match lastfm_api_key.map(str::trim) {
            Some(api_key) if !api_key.is_empty() => match LastFmClient::create(api_key) {
                Ok(client) => Arc::new(LastFmProvider::new(client)),
                Err(error) => {
                    warn!(%error, "Unable to initialize Last.fm client; enrichment disabled");
                    Arc::new(NoProvider)
                }
            },
            _ => {
                warn!("LASTFM_API_KEY is not set; enrichment disabled");
                Arc::new(NoProvider)
            }
        },
        ContentProviderKind::MusicBrainz => match MusicBrainzClient::create() {
            Ok(client) => Arc::new(MusicBrainzProvider { client }),
            Err(error) => {
                warn!(%error, "Unable to initialize MusicBrainz client; enrichment disabled");
                Arc::new(NoProvider)
            }
        },
    };

    info!(provider = provider.name(), "Enrichment provider selected");

    provider
}

pub(crate) struct NoProvider;

#[async_trait]
impl EnrichmentProvider for NoProvider {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn fetch_artist_bio(
        &self,
        _artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        Ok(None)
    }

    async fn fetch_album_description(
        &self,
        _artist: &str,
        _album: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        Ok(None)
    }

    async fn fetch_artist_image(
        &self,
        _artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        Ok(None)
    }
}

/// Last.fm answers biography and image with one request; concurrent asks
/// for the same artist share it.
pub(crate) struct LastFmProvider {
    client: LastFmClient,
    artist_requests: InFlight<String, ArtistInfo>,
}

impl LastFmProvider {
    pub(crate) fn new(client: LastFmClient) -> Self {
        Self {
            client,
            artist_requests: InFlight::new(),
        }
    }

    async fn artist_info(&self, artist: &str) -> Result<ArtistInfo, EnrichmentProviderError> {
        match self.artist_requests.claim(artist.to_lowercase()) {
            Claim::Owner(guard) => {
                let info = self.client.artist_info(artist).await.map_err(provider_error)?;
                guard.resolve(info.clone());
                Ok(info)
            }
            Claim::Waiter(waiter) => waiter.wait().await.ok_or_else(|| {
                EnrichmentProviderError(format!("Artist lookup for {} failed", artist).into())
            }),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for LastFmProvider {
    fn name(&self) -> &'static str {
        "lastfm"
    }

    async fn fetch_artist_bio(
        &self,
        artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        Ok(self.artist_info(artist).await?.biography)
    }

    async fn fetch_album_description(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        self.client
            .album_description(artist, album)
            .await
            .map_err(provider_error)
    }

    async fn fetch_artist_image(
        &self,
        artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        Ok(self.artist_info(artist).await?.image_url)
    }
}

/// Biographies only: MusicBrainz resolves the artist, Wikipedia supplies the text.
pub(crate) struct MusicBrainzProvider {
    client: MusicBrainzClient,
}

#[async_trait]
impl EnrichmentProvider for MusicBrainzProvider {
    fn name(&self) -> &'static str {
        "musicbrainz"
    }

    async fn fetch_artist_bio(
        &self,
        artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        self.client
            .artist_biography(artist)
            .await
            .map_err(provider_error)
    }

    async fn fetch_album_description(
        &self,
        _artist: &str,
        _album: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        Ok(None)
    }

    async fn fetch_artist_image(
        &self,
        _artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        Ok(None)
    }
}
