use super::summary::{album_summary, artist_summary};
use super::traits::EnrichmentProvider;
use crate::services::catalog::{
    BatchFetcher, CacheKey, CatalogCache, CatalogItem, Claim, ExtendedFields, FetchPriority,
    FieldSource, InFlight, Sourced,
};
use crate::types::{CatalogId, ItemKind, ListToken};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone, Debug, Serialize)]
pub(crate) struct EnrichmentEvent {
    pub(crate) list_token: ListToken,
    pub(crate) index: usize,
    pub(crate) item: CatalogItem,
}

/// Receiving end of one list's enrichment. Dropping it cancels the enrichment.
pub(crate) struct EnrichmentSubscription {
    list_token: ListToken,
    events: mpsc::UnboundedReceiver<EnrichmentEvent>,
    cancel: CancellationToken,
}

impl EnrichmentSubscription {
    pub(crate) fn list_token(&self) -> ListToken {
        self.list_token
    }

    /// Waits for the next event. `None` once the enrichment is finished or cancelled.
    pub(crate) async fn recv(&mut self) -> Option<EnrichmentEvent> {
        self.events.recv().await
    }

    /// Takes every event available right now. The flag is `true` once no more
    /// events will follow.
    pub(crate) fn drain(&mut self) -> (Vec<EnrichmentEvent>, bool) {
        let mut events = vec![];

        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => return (events, false),
                Err(TryRecvError::Disconnected) => return (events, true),
            }
        }
    }

    /// Not-yet-started jobs are dropped. Jobs already running still update the
    /// cache, but their events are discarded.
    pub(crate) fn cancel(&mut self) {
        self.cancel.cancel();
        self.events.close();
    }
}

impl Drop for EnrichmentSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
enum Job {
    Catalog {
        kind: ItemKind,
        ids: Vec<CatalogId>,
    },
    ArtistProfile {
        id: CatalogId,
        artist: String,
    },
    AlbumDescription {
        id: CatalogId,
        artist: String,
        album: String,
    },
}

#[derive(Default)]
struct RowSources {
    album: Option<CacheKey>,
    artist: Option<CacheKey>,
}

/// Which cached albums and artists feed which rows, and the jobs to fill them.
struct EnrichmentPlan {
    rows: Vec<RowSources>,
    catalog_jobs: Vec<Job>,
    provider_jobs: Vec<Job>,
}

impl EnrichmentPlan {
    fn new(items: &[CatalogItem], with_provider: bool) -> Self {
        let mut rows = Vec::with_capacity(items.len());
        let mut album_ids = vec![];
        let mut artist_ids = vec![];
        let mut album_jobs = vec![];
        let mut artist_jobs = vec![];
        let mut seen_albums = HashSet::new();
        let mut seen_artists = HashSet::new();

        let mut add_album = |id: &CatalogId, album: &str, artist: Option<&str>| {
            if seen_albums.insert(id.clone()) {
                album_ids.push(id.clone());

                if let Some(artist) = artist {
                    album_jobs.push(Job::AlbumDescription {
                        id: id.clone(),
                        artist: artist.to_string(),
                        album: album.to_string(),
                    });
                }
            }
        };

        let mut add_artist = |id: &CatalogId, artist: &str| {
            if seen_artists.insert(id.clone()) {
                artist_ids.push(id.clone());
                artist_jobs.push(Job::ArtistProfile {
                    id: id.clone(),
                    artist: artist.to_string(),
                });
            }
        };

        for item in items {
            let mut sources = RowSources::default();
            let artist_name = item.primary_artist().map(|artist| artist.name.as_str());

            match item.kind {
                ItemKind::Track => {
                    if let Some(album) = &item.basic.album {
                        add_album(&album.id, &album.name, artist_name);
                        sources.album = Some(CacheKey::new(album.id.clone(), ItemKind::Album));
                    }

                    if let Some(artist) = item.primary_artist() {
                        add_artist(&artist.id, &artist.name);
                        sources.artist = Some(CacheKey::new(artist.id.clone(), ItemKind::Artist));
                    }
                }
                ItemKind::Album if item.is_ready() => {
                    add_album(&item.id, &item.basic.name, artist_name);
                    sources.album = Some(item.key());
                }
                ItemKind::Artist if item.is_ready() => {
                    add_artist(&item.id, &item.basic.name);
                    sources.artist = Some(item.key());
                }
                ItemKind::Album | ItemKind::Artist | ItemKind::Playlist => (),
            }

            rows.push(sources);
        }

        let mut catalog_jobs = vec![];

        if !album_ids.is_empty() {
            catalog_jobs.push(Job::Catalog {
                kind: ItemKind::Album,
                ids: album_ids,
            });
        }

        if !artist_ids.is_empty() {
            catalog_jobs.push(Job::Catalog {
                kind: ItemKind::Artist,
                ids: artist_ids,
            });
        }

        let provider_jobs = if with_provider {
            artist_jobs.into_iter().chain(album_jobs).collect()
        } else {
            vec![]
        };

        Self {
            rows,
            catalog_jobs,
            provider_jobs,
        }
    }
}

/// Updated extended fields of cached albums and artists.
type JobOutcome = Vec<(CacheKey, ExtendedFields)>;

/// What one list has been shown so far.
struct ListState<'a> {
    list_token: ListToken,
    rows: &'a [CatalogItem],
    row_sources: &'a [RowSources],
    views: Vec<ExtendedFields>,
    sources: HashMap<CacheKey, ExtendedFields>,
}

impl ListState<'_> {
    /// Folds a job outcome into the row views and returns one event per row
    /// whose view changed.
    fn apply(&mut self, outcome: JobOutcome, cache: &CatalogCache) -> Vec<EnrichmentEvent> {
        let mut updated = HashSet::new();

        for (key, fields) in outcome {
            self.sources.entry(key.clone()).or_default().merge(fields);
            updated.insert(key);
        }

        let mut events = vec![];

        for (index, row) in self.rows.iter().enumerate() {
            let row_sources = &self.row_sources[index];
            let affected = [&row_sources.album, &row_sources.artist]
                .into_iter()
                .flatten()
                .any(|key| updated.contains(key));

            if !affected {
                continue;
            }

            let view = compose_view(row, row_sources, &self.sources);

            if view == self.views[index] {
                continue;
            }

            let item = match cache.merge_extended(&row.key(), view.clone()) {
                Some(cached) => cached,
                None => CatalogItem {
                    extended: view.clone(),
                    ..row.clone()
                },
            };

            self.views[index] = view;

            events.push(EnrichmentEvent {
                list_token: self.list_token,
                index,
                item,
            });
        }

        events
    }
}

pub(crate) struct EnrichmentPipeline {
    fetcher: Arc<BatchFetcher>,
    provider: Arc<dyn EnrichmentProvider>,
    workers: Arc<Semaphore>,
    provider_in_flight: InFlight<CacheKey, ExtendedFields>,
}

impl EnrichmentPipeline {
    pub(crate) fn new(
        fetcher: Arc<BatchFetcher>,
        provider: Arc<dyn EnrichmentProvider>,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            provider,
            workers: Arc::new(Semaphore::new(concurrency.max(1))),
            provider_in_flight: InFlight::new(),
        }
    }

    /// Hands `items` back untouched and enriches them in the background. Every
    /// row whose view improves is reported through the subscription.
    pub(crate) fn enrich(
        self: &Arc<Self>,
        list_token: ListToken,
        items: Vec<CatalogItem>,
    ) -> (Vec<CatalogItem>, EnrichmentSubscription) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn({
            let pipeline = Arc::clone(self);
            let rows = items.clone();
            let cancel = cancel.clone();

            async move {
                pipeline.run(list_token, rows, sender, cancel).await;
            }
        });

        let subscription = EnrichmentSubscription {
            list_token,
            events: receiver,
            cancel,
        };

        (items, subscription)
    }

    async fn run(
        self: Arc<Self>,
        list_token: ListToken,
        rows: Vec<CatalogItem>,
        events: mpsc::UnboundedSender<EnrichmentEvent>,
        cancel: CancellationToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }

        let EnrichmentPlan {
            rows: row_sources,
            catalog_jobs,
            provider_jobs,
        } = EnrichmentPlan::new(&rows, self.provider.is_enabled());

        debug!(
            %list_token,
            rows = rows.len(),
            catalog_jobs = catalog_jobs.len(),
            provider_jobs = provider_jobs.len(),
            "Enriching list"
        );

        let mut list = ListState {
            list_token,
            rows: &rows,
            row_sources: &row_sources,
            views: rows.iter().map(|row| row.extended.clone()).collect(),
            sources: HashMap::new(),
        };

        // Provider jobs only start once catalog detail is cached.
        for jobs in [catalog_jobs, provider_jobs] {
            let mut running: FuturesUnordered<_> = jobs
                .into_iter()
                .map(|job| self.start_job(job, cancel.clone()))
                .collect();

            while let Some(outcome) = running.next().await {
                let outcome = match outcome {
                    Some(outcome) if !cancel.is_cancelled() => outcome,
                    _ => continue,
                };

                for event in list.apply(outcome, self.fetcher.cache()) {
                    if events.send(event).is_err() {
                        debug!(%list_token, "Enrichment subscriber is gone");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }

        debug!(%list_token, "List enrichment finished");
    }

    /// Waits for a worker, unless the list is cancelled first.
    async fn start_job(
        self: &Arc<Self>,
        job: Job,
        cancel: CancellationToken,
    ) -> Option<JobOutcome> {
        let _permit = tokio::select! {
            permit = Arc::clone(&self.workers).acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => return None,
        };

        if cancel.is_cancelled() {
            return None;
        }

        Some(self.run_job(job).await)
    }

    async fn run_job(&self, job: Job) -> JobOutcome {
        match job {
            Job::Catalog { kind, ids } => self.run_catalog_job(kind, &ids).await,
            Job::ArtistProfile { id, artist } => {
                let key = CacheKey::new(id, ItemKind::Artist);

                self.run_provider_job(key, move |existing| {
                    let needs_bio = !provided(&existing.biography);
                    let needs_image = !provided(&existing.image_url);

                    async move {
                        let (biography, image_url) = tokio::join!(
                            async {
                                if needs_bio {
                                    self.provider.fetch_artist_bio(&artist).await
                                } else {
                                    Ok(None)
                                }
                            },
                            async {
                                if needs_image {
                                    self.provider.fetch_artist_image(&artist).await
                                } else {
                                    Ok(None)
                                }
                            },
                        );

                        ExtendedFields {
                            biography: self.provided_text("biography", &artist, biography),
                            image_url: self.provided_text("image", &artist, image_url),
                            ..ExtendedFields::default()
                        }
                    }
                })
                .await
            }
            Job::AlbumDescription { id, artist, album } => {
                let key = CacheKey::new(id, ItemKind::Album);

                self.run_provider_job(key, move |existing| {
                    let needed = !provided(&existing.description);

                    async move {
                        if !needed {
                            return ExtendedFields::default();
                        }

                        let description = self
                            .provider
                            .fetch_album_description(&artist, &album)
                            .await;

                        ExtendedFields {
                            description: self.provided_text(
                                "album description",
                                &album,
                                description,
                            ),
                            ..ExtendedFields::default()
                        }
                    }
                })
                .await
            }
        }
    }

    async fn run_catalog_job(&self, kind: ItemKind, ids: &[CatalogId]) -> JobOutcome {
        let items = self
            .fetcher
            .get_or_fetch(ids, kind, FetchPriority::Foreground)
            .await;

        let mut outcome = vec![];

        for id in ids {
            let item = match items.get(id) {
                Some(item) if item.is_ready() => item,
                _ => continue,
            };

            let derived = match kind {
                ItemKind::Album => ExtendedFields {
                    description: album_summary(item)
                        .map(|summary| Sourced::new(summary, FieldSource::Derived)),
                    ..ExtendedFields::default()
                },
                ItemKind::Artist => ExtendedFields {
                    biography: artist_summary(item)
                        .map(|summary| Sourced::new(summary, FieldSource::Derived)),
                    ..ExtendedFields::default()
                },
                ItemKind::Track | ItemKind::Playlist => ExtendedFields::default(),
            };

            let extended = match self.fetcher.cache().merge_extended(&item.key(), derived.clone()) {
                Some(cached) => cached.extended,
                None => {
                    let mut extended = item.extended.clone();
                    extended.merge(derived);
                    extended
                }
            };

            outcome.push((item.key(), extended));
        }

        outcome
    }

    /// At most one provider fetch per key is in flight; concurrent lists attach
    /// to it.
    async fn run_provider_job<F, Fut>(&self, key: CacheKey, fetch: F) -> JobOutcome
    where
        F: FnOnce(ExtendedFields) -> Fut,
        Fut: std::future::Future<Output = ExtendedFields>,
    {
        let guard = match self.provider_in_flight.claim(key.clone()) {
            Claim::Owner(guard) => guard,
            Claim::Waiter(waiter) => {
                return match waiter.wait().await {
                    Some(fields) => vec![(key, fields)],
                    None => vec![],
                };
            }
        };

        let existing = self
            .fetcher
            .cache()
            .get(&key)
            .map(|item| item.extended)
            .unwrap_or_default();

        let fetched = fetch(existing.clone()).await;

        let fields = match self.fetcher.cache().merge_extended(&key, fetched.clone()) {
            Some(cached) => cached.extended,
            None => {
                let mut fields = existing;
                fields.merge(fetched);
                fields
            }
        };

        guard.resolve(fields.clone());

        vec![(key, fields)]
    }

    fn provided_text<E: std::fmt::Display>(
        &self,
        what: &str,
        subject: &str,
        result: Result<Option<String>, E>,
    ) -> Option<Sourced<String>> {
        match result {
            Ok(text) => text
                .filter(|text| !text.trim().is_empty())
                .map(|text| Sourced::new(text, FieldSource::Provider)),
            Err(error) => {
                warn!(
                    provider = self.provider.name(),
                    what,
                    subject,
                    %error,
                    "Enrichment provider failed"
                );
                None
            }
        }
    }
}

fn provided<T>(field: &Option<Sourced<T>>) -> bool {
    matches!(field, Some(field) if field.source == FieldSource::Provider)
}

/// A track row shows album detail next to artist detail; album and artist rows
/// show their own.
fn compose_view(
    row: &CatalogItem,
    row_sources: &RowSources,
    sources: &HashMap<CacheKey, ExtendedFields>,
) -> ExtendedFields {
    let mut view = row.extended.clone();
    let album = row_sources.album.as_ref().and_then(|key| sources.get(key));
    let artist = row_sources.artist.as_ref().and_then(|key| sources.get(key));

    match row.kind {
        ItemKind::Track => {
            if let Some(album) = album {
                view.merge(ExtendedFields {
                    label: album.label.clone(),
                    copyrights: album.copyrights.clone(),
                    description: album.description.clone(),
                    ..ExtendedFields::default()
                });
            }

            if let Some(artist) = artist {
                view.merge(ExtendedFields {
                    genres: artist.genres.clone(),
                    follower_count: artist.follower_count.clone(),
                    biography: artist.biography.clone(),
                    image_url: artist.image_url.clone(),
                    ..ExtendedFields::default()
                });
            }
        }
        ItemKind::Album => {
            if let Some(album) = album {
                view.merge(album.clone());
            }
        }
        ItemKind::Artist => {
            if let Some(artist) = artist {
                view.merge(artist.clone());
            }
        }
        ItemKind::Playlist => (),
    }

    view
}
