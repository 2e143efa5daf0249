use crate::services::catalog::{BatchFetcher, CatalogApi, FetchPriority, LibraryScope};
use crate::types::{CatalogId, ItemKind};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Serialize)]
pub(crate) struct GroupReport {
    pub(crate) scope: LibraryScope,
    pub(crate) items: usize,
    pub(crate) ready: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub(crate) struct PrecacheReport {
    pub(crate) warmed: Vec<GroupReport>,
    pub(crate) failed: Vec<LibraryScope>,
    /// Distinct tracks found in the user's playlists.
    pub(crate) playlist_tracks: usize,
}

/// Walks the user's library and primes the catalog cache with background
/// priority.
pub(crate) struct PrecacheScheduler {
    api: Arc<dyn CatalogApi>,
    fetcher: Arc<BatchFetcher>,
}

/// Requests precache runs from outside the scheduler task.
#[derive(Clone)]
pub(crate) struct PrecacheTrigger(Arc<Notify>);

impl PrecacheTrigger {
    /// Requests a run. Requests made while a run is active collapse into one
    /// follow-up run.
    pub(crate) fn trigger(&self) {
        self.0.notify_one();
    }
}

pub(crate) struct PrecacheHandle {
    trigger: PrecacheTrigger,
    task: JoinHandle<()>,
}

impl PrecacheHandle {
    pub(crate) fn trigger(&self) -> PrecacheTrigger {
        self.trigger.clone()
    }

    pub(crate) async fn join(self) {
        if let Err(error) = self.task.await {
            warn!(?error, "Precache task ended abnormally");
        }
    }
}

impl PrecacheScheduler {
    pub(crate) fn new(api: Arc<dyn CatalogApi>, fetcher: Arc<BatchFetcher>) -> Self {
        Self { api, fetcher }
    }

    pub(crate) async fn run_precache(&self, scopes: &[LibraryScope]) -> PrecacheReport {
        let mut report = PrecacheReport::default();

        for scope in scopes {
            let ids = match self.api.fetch_library_shape(*scope).await {
                Ok(ids) => ids,
                Err(error) => {
                    warn!(%scope, ?error, "Unable to list library group; skipping");
                    report.failed.push(*scope);
                    continue;
                }
            };

            let items = self
                .fetcher
                .get_or_fetch(&ids, scope.item_kind(), FetchPriority::Background)
                .await;
            let ready = items.values().filter(|item| item.is_ready()).count();

            debug!(%scope, items = items.len(), ready, "Library group warmed");

            report.warmed.push(GroupReport {
                scope: *scope,
                items: items.len(),
                ready,
            });

            if *scope == LibraryScope::Playlists {
                report.playlist_tracks = self.warm_playlist_tracks(&ids).await;
            }
        }

        report
    }

    /// Pages through every playlist and warms its tracks. A playlist that
    /// cannot be listed is skipped.
    async fn warm_playlist_tracks(&self, playlist_ids: &[CatalogId]) -> usize {
        let mut seen = HashSet::new();
        let mut track_ids = vec![];

        for playlist_id in playlist_ids {
            let mut page = 0;

            loop {
                let tracks_page = match self.api.fetch_playlist_tracks(playlist_id, page).await {
                    Ok(tracks_page) => tracks_page,
                    Err(error) => {
                        warn!(playlist = %playlist_id, ?error, "Unable to list playlist tracks; skipping");
                        break;
                    }
                };

                track_ids.extend(
                    tracks_page
                        .track_ids
                        .into_iter()
                        .filter(|id| seen.insert(id.clone())),
                );

                match tracks_page.next_page {
                    Some(next_page) => page = next_page,
                    None => break,
                }
            }
        }

        if track_ids.is_empty() {
            return 0;
        }

        let items = self
            .fetcher
            .get_or_fetch(&track_ids, ItemKind::Track, FetchPriority::Background)
            .await;
        let ready = items.values().filter(|item| item.is_ready()).count();

        debug!(
            playlists = playlist_ids.len(),
            tracks = track_ids.len(),
            ready,
            "Playlist tracks warmed"
        );

        track_ids.len()
    }

    /// Runs once right away, then every `interval` or on trigger, until
    /// `shutdown` is cancelled.
    pub(crate) fn spawn(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> PrecacheHandle {
        let trigger = Arc::new(Notify::new());

        let task = tokio::spawn({
            let trigger = Arc::clone(&trigger);

            async move {
                loop {
                    let report = tokio::select! {
                        report = self.run_precache(&LibraryScope::ALL) => report,
                        _ = shutdown.cancelled() => break,
                    };

                    info!(
                        warmed = report.warmed.len(),
                        failed = report.failed.len(),
                        ?report,
                        "Precache run finished"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(interval) => (),
                        _ = trigger.notified() => debug!("Precache run requested"),
                        _ = shutdown.cancelled() => break,
                    }
                }

                info!("Precache scheduler stopped");
            }
        });

        PrecacheHandle {
            trigger: PrecacheTrigger(trigger),
            task,
        }
    }
}
