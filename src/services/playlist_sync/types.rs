use crate::types::CatalogId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub(crate) struct PlaylistSyncConfig {
    pub(crate) concurrency: usize,
    pub(crate) playlists_directory: PathBuf,
    pub(crate) file_prefix: String,
    pub(crate) proxy_port: u16,
}

impl Default for PlaylistSyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            playlists_directory: PathBuf::from("playlists"),
            file_prefix: "Spotify - ".to_string(),
            proxy_port: 52308,
        }
    }
}

/// What is known about a remote playlist at the time it was last written to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct PlaylistSnapshot {
    pub(crate) remote_id: CatalogId,
    pub(crate) name: String,
    pub(crate) version_token: String,
    pub(crate) local_path: PathBuf,
    /// Hash of the file content written for this version.
    pub(crate) track_ids_hash: String,
    pub(crate) last_synced_at: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct SyncReport {
    pub(crate) synced: Vec<CatalogId>,
    pub(crate) skipped: Vec<CatalogId>,
    pub(crate) failed: Vec<CatalogId>,
    pub(crate) removed: Vec<CatalogId>,
}

impl SyncReport {
    pub(crate) fn sort(&mut self) {
        self.synced.sort();
        self.skipped.sort();
        self.failed.sort();
        self.removed.sort();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SyncRun {
    Completed(SyncReport),
    /// Another run was in progress; one more pass was queued behind it.
    Coalesced,
}
