use crate::services::playlist_sync::{PlaylistSnapshot, SnapshotStore, SnapshotStoreError};
use crate::storage::{InMemoryStorage, OnDiskStorage};
use crate::types::CatalogId;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

const SNAPSHOTS_PREFIX: &str = "playlist-snapshots";

fn serialize(snapshot: &PlaylistSnapshot) -> Result<String, SnapshotStoreError> {
    serde_json::to_string(snapshot).map_err(|error| SnapshotStoreError(Box::new(error)))
}

/// Unreadable records are skipped; their playlists are regenerated on the next pass.
fn deserialize_all(entries: HashMap<String, String>) -> Vec<PlaylistSnapshot> {
    entries
        .into_iter()
        .filter_map(
            |(key, value)| match serde_json::from_str::<PlaylistSnapshot>(&value) {
                Ok(snapshot) => Some(snapshot),
                Err(error) => {
                    warn!(%key, %error, "Skipping unreadable playlist snapshot");
                    None
                }
            },
        )
        .collect()
}

/// Snapshot keys end up as file names.
fn snapshot_key(remote_id: &CatalogId) -> String {
    urlencoding::encode(remote_id).into_owned()
}

#[async_trait]
impl SnapshotStore for OnDiskStorage {
    async fn load_all(&self) -> Result<Vec<PlaylistSnapshot>, SnapshotStoreError> {
        let entries = self
            .get_all(SNAPSHOTS_PREFIX)
            .await
            .map_err(|error| SnapshotStoreError(Box::new(error)))?;

        Ok(deserialize_all(entries))
    }

    async fn save(&self, snapshot: &PlaylistSnapshot) -> Result<(), SnapshotStoreError> {
        let value = serialize(snapshot)?;

        OnDiskStorage::save(
            self,
            SNAPSHOTS_PREFIX,
            &snapshot_key(&snapshot.remote_id),
            &value,
        )
        .await
        .map_err(|error| SnapshotStoreError(Box::new(error)))
    }

    async fn delete(&self, remote_id: &CatalogId) -> Result<(), SnapshotStoreError> {
        OnDiskStorage::delete(self, SNAPSHOTS_PREFIX, &snapshot_key(remote_id))
            .await
            .map_err(|error| SnapshotStoreError(Box::new(error)))
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStorage {
    async fn load_all(&self) -> Result<Vec<PlaylistSnapshot>, SnapshotStoreError> {
        Ok(deserialize_all(
            self.get_all(SNAPSHOTS_PREFIX).unwrap_or_default(),
        ))
    }

    async fn save(&self, snapshot: &PlaylistSnapshot) -> Result<(), SnapshotStoreError> {
        let value = serialize(snapshot)?;

        InMemoryStorage::save(
            self,
            SNAPSHOTS_PREFIX,
            &snapshot_key(&snapshot.remote_id),
            &value,
        );

        Ok(())
    }

    async fn delete(&self, remote_id: &CatalogId) -> Result<(), SnapshotStoreError> {
        InMemoryStorage::delete(self, SNAPSHOTS_PREFIX, &snapshot_key(remote_id));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn snapshot(id: &str) -> PlaylistSnapshot {
        PlaylistSnapshot {
            remote_id: id.into(),
            name: format!("Playlist {}", id),
            version_token: "v1".into(),
            local_path: PathBuf::from(format!("/tmp/{}.m3u", id)),
            track_ids_hash: "0123456789abcdef".into(),
            last_synced_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn should_persist_snapshots_on_disk() {
        let directory = tempfile::tempdir().unwrap();
        let storage = OnDiskStorage::create(directory.path());

        SnapshotStore::save(&storage, &snapshot("p1")).await.unwrap();
        SnapshotStore::save(&storage, &snapshot("spotify:playlist/2"))
            .await
            .unwrap();

        let mut loaded = storage.load_all().await.unwrap();
        loaded.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));

        assert_eq!(loaded, vec![snapshot("p1"), snapshot("spotify:playlist/2")]);

        SnapshotStore::delete(&storage, &"spotify:playlist/2".into())
            .await
            .unwrap();

        assert_eq!(storage.load_all().await.unwrap(), vec![snapshot("p1")]);
    }

    #[tokio::test]
    async fn should_keep_snapshots_in_memory() {
        let storage = InMemoryStorage::new();

        assert!(storage.load_all().await.unwrap().is_empty());

        SnapshotStore::save(&storage, &snapshot("p1")).await.unwrap();
        SnapshotStore::delete(&storage, &"p2".into()).await.unwrap();

        assert_eq!(storage.load_all().await.unwrap(), vec![snapshot("p1")]);
    }

    #[tokio::test]
    async fn should_skip_unreadable_snapshots() {
        let directory = tempfile::tempdir().unwrap();
        let on_disk = OnDiskStorage::create(directory.path());
        let in_memory = InMemoryStorage::new();

        SnapshotStore::save(&on_disk, &snapshot("p1")).await.unwrap();
        OnDiskStorage::save(&on_disk, SNAPSHOTS_PREFIX, "p2", "{not json")
            .await
            .unwrap();
        SnapshotStore::save(&in_memory, &snapshot("p1")).await.unwrap();
        InMemoryStorage::save(&in_memory, SNAPSHOTS_PREFIX, "p2", "{not json");

        assert_eq!(on_disk.load_all().await.unwrap(), vec![snapshot("p1")]);
        assert_eq!(in_memory.load_all().await.unwrap(), vec![snapshot("p1")]);
    }
}
