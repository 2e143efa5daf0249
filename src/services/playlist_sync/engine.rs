use crate::services::catalog::{
    BatchFetcher, CatalogApi, CatalogApiError, CatalogItem, FetchPriority, LibraryScope,
    PlaylistHeader,
};
use crate::services::playlist_sync::files::PlaylistFiles;
use crate::services::playlist_sync::m3u::{
    disambiguated_playlist_filename, listing_hash, render_playlist, retitle,
    safe_playlist_filename,
};
use crate::services::playlist_sync::{
    PlaylistSnapshot, PlaylistSyncConfig, PlaylistSyncError, SnapshotStore, SyncConflictError,
    SyncReport, SyncRun,
};
use crate::types::{CatalogId, ItemKind};
use crate::utils::unix_timestamp_ms;
use futures::{stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum PlaylistOutcome {
    Synced(PathBuf),
    Skipped(PathBuf),
}

#[derive(Default)]
struct SyncState {
    running: bool,
    queued: bool,
}

/// Clears the running flag if a run is dropped midway. A pass queued behind
/// the dropped run stays queued for the next caller.
struct RunningGuard<'a> {
    state: &'a Mutex<SyncState>,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.running = false;
        }
    }
}

const SHORT_ID_LEN: usize = 6;

fn record_failure(
    report: &mut SyncReport,
    live_paths: &mut HashSet<PathBuf>,
    snapshot: Option<&PlaylistSnapshot>,
    id: CatalogId,
    error: &PlaylistSyncError,
) {
    warn!(%id, %error, "Unable to sync playlist");
    // Keep whatever was written last time.
    if let Some(snapshot) = snapshot {
        live_paths.insert(snapshot.local_path.clone());
    }
    report.failed.push(id);
}

/// Mirrors the user's remote playlists as local `.m3u` files.
pub(crate) struct PlaylistSyncEngine {
    api: Arc<dyn CatalogApi>,
    fetcher: Arc<BatchFetcher>,
    store: Arc<dyn SnapshotStore>,
    files: PlaylistFiles,
    config: PlaylistSyncConfig,
    state: Mutex<SyncState>,
    reports: watch::Sender<Option<SyncReport>>,
}

impl PlaylistSyncEngine {
    pub(crate) fn new(
        api: Arc<dyn CatalogApi>,
        fetcher: Arc<BatchFetcher>,
        store: Arc<dyn SnapshotStore>,
        config: PlaylistSyncConfig,
    ) -> Self {
        let files = PlaylistFiles::new(
            config.playlists_directory.clone(),
            config.file_prefix.clone(),
        );
        let (reports, _) = watch::channel(None);

        Self {
            api,
            fetcher,
            store,
            files,
            config,
            state: Mutex::new(SyncState::default()),
            reports,
        }
    }

    pub(crate) fn last_report(&self) -> Option<SyncReport> {
        self.reports.borrow().clone()
    }

    pub(crate) fn subscribe_reports(&self) -> watch::Receiver<Option<SyncReport>> {
        self.reports.subscribe()
    }

    /// Runs a full sync pass. A call made while a pass is in progress does
    /// not start a second one; it queues exactly one more pass behind the
    /// current one and returns [`SyncRun::Coalesced`].
    pub(crate) async fn sync_playlists(&self) -> Result<SyncRun, PlaylistSyncError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

            if state.running {
                state.queued = true;
                debug!("Playlist sync already running; queued one more pass");
                return Ok(SyncRun::Coalesced);
            }

            state.running = true;
        }

        let mut guard = RunningGuard {
            state: &self.state,
            armed: true,
        };

        loop {
            let result = self.run_once().await;

            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

            if !state.queued {
                state.running = false;
                guard.armed = false;
                return result.map(SyncRun::Completed);
            }

            state.queued = false;
            debug!("Running queued playlist sync pass");
        }
    }

    /// Runs [`Self::sync_playlists`] on its own task, so the pass and any pass
    /// queued behind it complete even if the caller stops waiting.
    pub(crate) fn spawn_sync(self: Arc<Self>) -> JoinHandle<Result<SyncRun, PlaylistSyncError>> {
        tokio::spawn(async move { self.sync_playlists().await })
    }

    async fn run_once(&self) -> Result<SyncReport, PlaylistSyncError> {
        let snapshots: HashMap<CatalogId, PlaylistSnapshot> = self
            .store
            .load_all()
            .await?
            .into_iter()
            .map(|snapshot| (snapshot.remote_id.clone(), snapshot))
            .collect();

        let mut seen = HashSet::new();
        let remote_ids: Vec<CatalogId> = self
            .api
            .fetch_library_shape(LibraryScope::Playlists)
            .await?
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let concurrency = self.config.concurrency.max(1);

        let mut headers: HashMap<CatalogId, Result<PlaylistHeader, CatalogApiError>> =
            stream::iter(remote_ids.iter().cloned())
                .map(|id| async move {
                    let header = self.api.fetch_playlist_header(&id).await;
                    (id, header)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut report = SyncReport::default();
        let mut live_paths = HashSet::new();
        let mut listed = Vec::with_capacity(remote_ids.len());

        for id in &remote_ids {
            match headers.remove(id) {
                Some(Ok(header)) => listed.push(header),
                Some(Err(error)) => record_failure(
                    &mut report,
                    &mut live_paths,
                    snapshots.get(id),
                    id.clone(),
                    &PlaylistSyncError::from(error),
                ),
                None => (),
            }
        }

        let paths = self.assign_paths(&listed, &snapshots);

        let outcomes: Vec<(CatalogId, Result<PlaylistOutcome, PlaylistSyncError>)> =
            stream::iter(listed.into_iter().zip(paths))
                .map(|(header, path)| {
                    let snapshot = snapshots.get(&header.id).cloned();

                    async move {
                        let id = header.id.clone();
                        let result = self.sync_playlist(header, path, snapshot).await;
                        (id, result)
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        for (id, result) in outcomes {
            match result {
                Ok(PlaylistOutcome::Synced(path)) => {
                    live_paths.insert(path);
                    report.synced.push(id);
                }
                Ok(PlaylistOutcome::Skipped(path)) => {
                    live_paths.insert(path);
                    report.skipped.push(id);
                }
                Err(error) => {
                    let snapshot = snapshots.get(&id);
                    record_failure(&mut report, &mut live_paths, snapshot, id, &error);
                }
            }
        }

        for (id, snapshot) in &snapshots {
            if seen.contains(id) {
                continue;
            }

            if let Err(error) = self.remove_playlist(snapshot).await {
                warn!(%id, %error, "Unable to remove deleted playlist");
                live_paths.insert(snapshot.local_path.clone());
                report.failed.push(id.clone());
                continue;
            }

            info!(%id, name = %snapshot.name, "Removed deleted playlist");
            report.removed.push(id.clone());
        }

        self.remove_orphans(&live_paths).await;

        report.sort();

        info!(
            synced = report.synced.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            removed = report.removed.len(),
            "Playlist sync finished"
        );

        self.reports.send_replace(Some(report.clone()));

        Ok(report)
    }

    /// Gives every listed playlist its own file, in listing order. Playlists
    /// sharing a name keep the plain file name for the one already holding it
    /// (or the first listed); the rest get a short id suffix.
    fn assign_paths(
        &self,
        listed: &[PlaylistHeader],
        snapshots: &HashMap<CatalogId, PlaylistSnapshot>,
    ) -> Vec<PathBuf> {
        let prefix = &self.config.file_prefix;
        let filenames: Vec<String> = listed
            .iter()
            .map(|header| safe_playlist_filename(prefix, &header.name))
            .collect();

        let mut holders: HashMap<&str, &CatalogId> = HashMap::new();
        for (header, filename) in listed.iter().zip(&filenames) {
            let path = self.files.path_for(filename);
            let holds_file = snapshots
                .get(&header.id)
                .is_some_and(|snapshot| snapshot.local_path == path);

            if holds_file {
                holders.insert(filename, &header.id);
            } else {
                holders.entry(filename).or_insert(&header.id);
            }
        }

        let mut taken: HashSet<String> = filenames.iter().cloned().collect();

        listed
            .iter()
            .zip(&filenames)
            .map(|(header, filename)| {
                if holders.get(filename.as_str()) == Some(&&header.id) {
                    return self.files.path_for(filename);
                }

                let mut unique = disambiguated_playlist_filename(
                    prefix,
                    &header.name,
                    &header.id,
                    SHORT_ID_LEN,
                );
                if taken.contains(&unique) {
                    unique = disambiguated_playlist_filename(
                        prefix,
                        &header.name,
                        &header.id,
                        header.id.len(),
                    );
                }

                debug!(id = %header.id, filename = %unique, "Playlist name is shared; using a distinct file");
                taken.insert(unique.clone());
                self.files.path_for(&unique)
            })
            .collect()
    }

    #[tracing::instrument(skip(self, header, snapshot), fields(id = %header.id))]
    async fn sync_playlist(
        &self,
        header: PlaylistHeader,
        path: PathBuf,
        snapshot: Option<PlaylistSnapshot>,
    ) -> Result<PlaylistOutcome, PlaylistSyncError> {
        let id = &header.id;

        if let Some(snapshot) = &snapshot {
            if snapshot.version_token == header.version_token {
                if let Some(content) = self.verified_content(snapshot).await? {
                    if snapshot.name == header.name && snapshot.local_path == path {
                        debug!(%id, "Playlist unchanged");
                        return Ok(PlaylistOutcome::Skipped(path));
                    }

                    if let Some(content) = retitle(&content, &header.name) {
                        self.write_playlist(&header, &path, &content).await?;
                        info!(%id, from = %snapshot.name, to = %header.name, "Playlist renamed");
                        return Ok(PlaylistOutcome::Synced(path));
                    }
                }
            }
        }

        let tracks = self.fetch_tracks(id).await?;
        let content = render_playlist(&header.name, &tracks, self.config.proxy_port);

        if let Some(snapshot) = &snapshot {
            if snapshot.local_path == path && self.file_matches(&path, &content).await? {
                self.save_snapshot(&header, &path, &content).await?;
                debug!(%id, "Playlist content unchanged; write skipped");
                return Ok(PlaylistOutcome::Synced(path));
            }
        }

        self.write_playlist(&header, &path, &content).await?;

        info!(%id, name = %header.name, tracks = tracks.len(), "Playlist written");

        Ok(PlaylistOutcome::Synced(path))
    }

    /// Content of the snapshot's file if it is still what the engine wrote.
    async fn verified_content(
        &self,
        snapshot: &PlaylistSnapshot,
    ) -> Result<Option<String>, PlaylistSyncError> {
        let conflict = match self.files.read(&snapshot.local_path).await? {
            Some(content) if listing_hash(&content) == snapshot.track_ids_hash => {
                return Ok(Some(content))
            }
            Some(_) => SyncConflictError::FileModified(snapshot.local_path.clone()),
            None => SyncConflictError::FileMissing(snapshot.local_path.clone()),
        };

        warn!(id = %snapshot.remote_id, %conflict, "Regenerating playlist file");

        Ok(None)
    }

    async fn file_matches(&self, path: &Path, content: &str) -> Result<bool, PlaylistSyncError> {
        Ok(self.files.read(path).await?.as_deref() == Some(content))
    }

    async fn fetch_tracks(&self, id: &CatalogId) -> Result<Vec<CatalogItem>, PlaylistSyncError> {
        let mut track_ids = vec![];
        let mut page = 0;

        loop {
            let tracks_page = self.api.fetch_playlist_tracks(id, page).await?;
            track_ids.extend(tracks_page.track_ids);

            match tracks_page.next_page {
                Some(next_page) => page = next_page,
                None => break,
            }
        }

        let items = self
            .fetcher
            .get_or_fetch(&track_ids, ItemKind::Track, FetchPriority::Background)
            .await;

        let mut tracks = Vec::with_capacity(track_ids.len());
        let mut unavailable = 0;

        for track_id in &track_ids {
            match items.get(track_id) {
                Some(item) if item.is_ready() => tracks.push(item.clone()),
                Some(item) if item.is_permanently_failed() => {
                    debug!(playlist = %id, track = %track_id, "Track no longer exists; omitted");
                }
                _ => unavailable += 1,
            }
        }

        if unavailable > 0 {
            return Err(PlaylistSyncError::UnavailableTracks(unavailable));
        }

        Ok(tracks)
    }

    /// A previous file under another name is left to [`Self::remove_orphans`],
    /// which runs once every playlist of the pass has its path.
    async fn write_playlist(
        &self,
        header: &PlaylistHeader,
        path: &Path,
        content: &str,
    ) -> Result<(), PlaylistSyncError> {
        self.files.write(path, content).await?;

        self.save_snapshot(header, path, content).await
    }

    async fn save_snapshot(
        &self,
        header: &PlaylistHeader,
        path: &Path,
        content: &str,
    ) -> Result<(), PlaylistSyncError> {
        let snapshot = PlaylistSnapshot {
            remote_id: header.id.clone(),
            name: header.name.clone(),
            version_token: header.version_token.clone(),
            local_path: path.to_path_buf(),
            track_ids_hash: listing_hash(content),
            last_synced_at: unix_timestamp_ms(),
        };

        Ok(self.store.save(&snapshot).await?)
    }

    async fn remove_playlist(&self, snapshot: &PlaylistSnapshot) -> Result<(), PlaylistSyncError> {
        self.files.remove(&snapshot.local_path).await?;
        self.store.delete(&snapshot.remote_id).await?;

        Ok(())
    }

    async fn remove_orphans(&self, live_paths: &HashSet<PathBuf>) {
        let owned = match self.files.list_owned().await {
            Ok(owned) => owned,
            Err(error) => {
                warn!(%error, "Unable to list playlist files");
                return;
            }
        };

        for path in owned {
            if live_paths.contains(&path) {
                continue;
            }

            match self.files.remove(&path).await {
                Ok(()) => info!(?path, "Removed orphaned playlist file"),
                Err(error) => warn!(?path, %error, "Unable to remove orphaned playlist file"),
            }
        }
    }

    /// Syncs right away, then every `interval` until `shutdown` is cancelled.
    pub(crate) fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = self.sync_playlists() => {
                        if let Err(error) = result {
                            warn!(%error, "Playlist sync failed");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => (),
                    _ = shutdown.cancelled() => break,
                }
            }

            info!("Playlist sync stopped");
        })
    }
}
