use super::pipeline::{EnrichmentEvent, EnrichmentPipeline, EnrichmentSubscription};
use super::traits::{EnrichmentProvider, EnrichmentProviderError};
use crate::services::catalog::testing::{album, artist, track, CatalogApiMock};
use crate::services::catalog::{
    BatchFetcher, CacheKey, CatalogCache, CatalogItem, FetchPriority, FetcherConfig,
    FieldSource, Sourced,
};
use crate::types::{CatalogId, ItemKind, ListToken};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ProviderMock {
    enabled: bool,
    failing: bool,
    bios: HashMap<String, String>,
    artist_bio_calls: Mutex<Vec<String>>,
    album_description_calls: Mutex<Vec<(String, String)>>,
    artist_image_calls: Mutex<Vec<String>>,
}

impl ProviderMock {
    fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    fn with_bio(mut self, artist: &str, bio: &str) -> Self {
        self.bios.insert(artist.into(), bio.into());
        self
    }

    fn provider_calls(&self) -> usize {
        self.artist_bio_calls.lock().unwrap().len()
            + self.album_description_calls.lock().unwrap().len()
            + self.artist_image_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl EnrichmentProvider for ProviderMock {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_artist_bio(
        &self,
        artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        self.artist_bio_calls.lock().unwrap().push(artist.into());

        if self.failing {
            return Err(EnrichmentProviderError(Box::new(Error::new(
                ErrorKind::Other,
                "Service unavailable",
            ))));
        }

        Ok(self.bios.get(artist).cloned())
    }

    async fn fetch_album_description(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        self.album_description_calls
            .lock()
            .unwrap()
            .push((artist.into(), album.into()));

        Ok(None)
    }

    async fn fetch_artist_image(
        &self,
        artist: &str,
    ) -> Result<Option<String>, EnrichmentProviderError> {
        self.artist_image_calls.lock().unwrap().push(artist.into());

        Ok(Some(format!("https://images.test/{}.png", artist.len())))
    }
}

/// 50 tracks spread over 10 albums and 8 artists.
fn library_api() -> CatalogApiMock {
    let api = CatalogApiMock::new().with_latency(Duration::from_millis(20));

    for index in 0..50 {
        api.add_item(track(
            &format!("t{}", index),
            &format!("al{}", index % 10),
            &format!("ar{}", index % 8),
            200_000,
        ));
    }

    for index in 0..10 {
        api.add_item(album(
            &format!("al{}", index),
            &format!("ar{}", index % 8),
            "Deconstruction",
        ));
    }

    for index in 0..8 {
        api.add_item(artist(&format!("ar{}", index), &["trance"], 1_500));
    }

    api
}

fn track_ids() -> Vec<CatalogId> {
    (0..50)
        .map(|index| CatalogId::from(format!("t{}", index)))
        .collect()
}

fn create_pipeline(
    api: &Arc<CatalogApiMock>,
    provider: &Arc<ProviderMock>,
) -> (Arc<BatchFetcher>, Arc<EnrichmentPipeline>) {
    let fetcher = Arc::new(BatchFetcher::new(
        api.clone(),
        Arc::new(CatalogCache::new(Duration::from_secs(3600))),
        FetcherConfig::default(),
    ));
    let pipeline = Arc::new(EnrichmentPipeline::new(
        Arc::clone(&fetcher),
        provider.clone(),
        2,
    ));

    (fetcher, pipeline)
}

async fn primary_list(fetcher: &BatchFetcher) -> Vec<CatalogItem> {
    let ids = track_ids();
    let mut items = fetcher
        .get_or_fetch(&ids, ItemKind::Track, FetchPriority::Foreground)
        .await;

    ids.iter().filter_map(|id| items.remove(id)).collect()
}

async fn collect_events(mut subscription: EnrichmentSubscription) -> Vec<EnrichmentEvent> {
    let mut events = vec![];

    while let Some(event) = subscription.recv().await {
        events.push(event);
    }

    events
}

/// Latest item per row.
fn latest_rows(events: &[EnrichmentEvent]) -> HashMap<usize, CatalogItem> {
    events
        .iter()
        .map(|event| (event.index, event.item.clone()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn list_of_50_tracks_needs_one_primary_and_two_enrichment_batches() {
    let api = Arc::new(library_api());
    let provider = Arc::new(ProviderMock::default());
    let (fetcher, pipeline) = create_pipeline(&api, &provider);

    let items = primary_list(&fetcher).await;
    assert_eq!(api.total_batch_calls(), 1);

    let token = ListToken::new();
    let (returned, subscription) = pipeline.enrich(token, items.clone());
    assert_eq!(returned, items);

    let events = collect_events(subscription).await;

    assert_eq!(api.batch_calls_for(ItemKind::Track), 1);
    assert_eq!(api.batch_calls_for(ItemKind::Album), 1);
    assert_eq!(api.batch_calls_for(ItemKind::Artist), 1);
    assert_eq!(provider.provider_calls(), 0);

    let rows = latest_rows(&events);
    assert_eq!(rows.len(), 50);
    assert!(events.iter().all(|event| event.list_token == token));

    let row = &rows[&9];
    assert_eq!(row.id, CatalogId::from("t9"));
    assert_eq!(
        row.extended.label,
        Some(Sourced::new("Deconstruction".to_string(), FieldSource::Catalog))
    );
    assert_eq!(
        row.extended.biography,
        Some(Sourced::new(
            "Genres: trance. 1.5K followers.".to_string(),
            FieldSource::Derived
        ))
    );
}

#[tokio::test(start_paused = true)]
async fn provider_fields_take_precedence_over_derived_summaries() {
    let api = Arc::new(library_api());
    let provider =
        Arc::new(ProviderMock::enabled().with_bio("Name of ar1", "Born in Switzerland."));
    let (fetcher, pipeline) = create_pipeline(&api, &provider);

    let items = primary_list(&fetcher).await;
    let (_, subscription) = pipeline.enrich(ListToken::new(), items);
    let rows = latest_rows(&collect_events(subscription).await);

    // Rows 1, 9, 17... belong to artist ar1.
    assert_eq!(
        rows[&1].extended.biography,
        Some(Sourced::new(
            "Born in Switzerland.".to_string(),
            FieldSource::Provider
        ))
    );
    assert!(rows[&1].extended.image_url.is_some());

    // No provider bio for ar2: the derived summary stays.
    assert_eq!(
        rows[&2].extended.biography.as_ref().map(|bio| bio.source),
        Some(FieldSource::Derived)
    );

    // Provider has no album descriptions: derived one is used.
    assert_eq!(
        rows[&0].extended.description.as_ref().map(|text| text.source),
        Some(FieldSource::Derived)
    );

    assert_eq!(provider.artist_bio_calls.lock().unwrap().len(), 8);
    assert_eq!(provider.artist_image_calls.lock().unwrap().len(), 8);
    assert_eq!(provider.album_description_calls.lock().unwrap().len(), 10);

    let cached_artist = fetcher
        .cache()
        .get(&CacheKey::new("ar1".into(), ItemKind::Artist))
        .unwrap();
    assert_eq!(
        cached_artist.extended.biography.map(|bio| bio.source),
        Some(FieldSource::Provider)
    );
}

#[tokio::test(start_paused = true)]
async fn provider_fetches_are_shared_between_lists() {
    let api = Arc::new(library_api());
    let provider = Arc::new((0..8).fold(ProviderMock::enabled(), |provider, index| {
        provider.with_bio(&format!("Name of ar{}", index), "Biography.")
    }));
    let (fetcher, pipeline) = create_pipeline(&api, &provider);

    let items = primary_list(&fetcher).await;
    let (_, first) = pipeline.enrich(ListToken::new(), items.clone());
    let (_, second) = pipeline.enrich(ListToken::new(), items);

    let (first, second) = tokio::join!(collect_events(first), collect_events(second));

    assert!(!first.is_empty());
    assert!(!second.is_empty());
    assert_eq!(provider.artist_bio_calls.lock().unwrap().len(), 8);
    assert_eq!(api.batch_calls_for(ItemKind::Album), 1);
    assert_eq!(api.batch_calls_for(ItemKind::Artist), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_provider_does_not_break_enrichment() {
    let api = Arc::new(library_api());
    let provider = Arc::new(ProviderMock {
        failing: true,
        ..ProviderMock::enabled()
    });
    let (fetcher, pipeline) = create_pipeline(&api, &provider);

    let items = primary_list(&fetcher).await;
    let (_, subscription) = pipeline.enrich(ListToken::new(), items);
    let rows = latest_rows(&collect_events(subscription).await);

    assert_eq!(rows.len(), 50);
    assert_eq!(
        rows[&3].extended.biography.as_ref().map(|bio| bio.source),
        Some(FieldSource::Derived)
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_subscription_starts_no_jobs_and_emits_nothing() {
    let api = Arc::new(library_api());
    let provider = Arc::new(ProviderMock::enabled());
    let (fetcher, pipeline) = create_pipeline(&api, &provider);

    let items = primary_list(&fetcher).await;
    let (_, mut subscription) = pipeline.enrich(ListToken::new(), items);
    subscription.cancel();

    tokio::time::sleep(Duration::from_secs(5)).await;

    let (events, closed) = subscription.drain();

    assert!(events.is_empty());
    assert!(closed);
    assert_eq!(api.total_batch_calls(), 1);
    assert_eq!(provider.provider_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn album_and_artist_rows_show_their_own_fields() {
    let api = Arc::new(library_api());
    let provider = Arc::new(ProviderMock::default());
    let (fetcher, pipeline) = create_pipeline(&api, &provider);

    let albums = fetcher
        .get_or_fetch(
            &["al0".into(), "al1".into()],
            ItemKind::Album,
            FetchPriority::Foreground,
        )
        .await;
    let mut rows: Vec<CatalogItem> = vec![
        albums[&CatalogId::from("al0")].clone(),
        albums[&CatalogId::from("al1")].clone(),
    ];
    rows.push(CatalogItem::absent("p1".into(), ItemKind::Playlist));

    let (_, subscription) = pipeline.enrich(ListToken::new(), rows);
    let rows = latest_rows(&collect_events(subscription).await);

    // Albums were cached by the primary fetch.
    assert_eq!(api.batch_calls_for(ItemKind::Album), 1);
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[&0].extended.description,
        Some(Sourced::new(
            "Released 1996-02-19. Label: Deconstruction. (P) 1996 Deconstruction".to_string(),
            FieldSource::Derived
        ))
    );
    assert_eq!(rows[&0].extended.biography, None);
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_flight_keeps_running_fetches_cached_but_emits_nothing() {
    let api = Arc::new(library_api().with_latency(Duration::from_secs(1)));
    let provider = Arc::new(ProviderMock::enabled());
    let (fetcher, pipeline) = create_pipeline(&api, &provider);

    let items = primary_list(&fetcher).await;
    let (_, mut subscription) = pipeline.enrich(ListToken::new(), items);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.batch_calls_for(ItemKind::Album), 1);
    subscription.cancel();

    tokio::time::sleep(Duration::from_secs(5)).await;

    let (events, closed) = subscription.drain();

    assert!(events.is_empty());
    assert!(closed);
    assert_eq!(provider.provider_calls(), 0);
    assert!(fetcher
        .cache()
        .get(&CacheKey::new("al0".into(), ItemKind::Album))
        .unwrap()
        .is_ready());
}
