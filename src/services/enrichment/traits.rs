use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("Enrichment provider failed: {0}")]
pub(crate) struct EnrichmentProviderError(pub(crate) Box<dyn std::error::Error + Send + Sync>);

/// Source of biographies, album descriptions and artist images. `Ok(None)`
/// means the provider has nothing for the request.
#[async_trait]
pub(crate) trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn fetch_artist_bio(&self, artist: &str)
        -> Result<Option<String>, EnrichmentProviderError>;

    async fn fetch_album_description(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Option<String>, EnrichmentProviderError>;

    async fn fetch_artist_image(
        &self,
        artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError>;
}
