use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::create_dir_all;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Writes `content` to a temporary sibling of `path` and renames it into place,
/// so readers see either the previous or the new content. Every call writes
/// its own temporary file.
pub(crate) async fn write_atomically(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }

    let mut temp_name = OsString::from(".");
    temp_name.push(path.file_name().unwrap_or_default());
    temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let temp_path = path.with_file_name(temp_name);

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)
        .await?;

    if let Err(error) = file.write_all(content).await {
        drop(file);
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(error);
    }

    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await
}

pub(crate) struct OnDiskStorage {
    path: PathBuf,
}

impl OnDiskStorage {
    pub(crate) fn create(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn entry_path(&self, prefix: &str, key: &str) -> PathBuf {
        self.path.join(prefix).join(key)
    }

    pub(crate) async fn get(
        &self,
        prefix: &str,
        key: &str,
    ) -> Result<Option<String>, std::io::Error> {
        match tokio::fs::read_to_string(self.entry_path(prefix, key)).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if matches!(error.kind(), std::io::ErrorKind::NotFound) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub(crate) async fn get_all(
        &self,
        prefix: &str,
    ) -> Result<HashMap<String, String>, std::io::Error> {
        let path = self.path.join(prefix);

        let mut map = HashMap::new();

        let mut dir_reader = match tokio::fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(error) if matches!(error.kind(), std::io::ErrorKind::NotFound) => {
                return Ok(HashMap::new())
            }
            Err(error) => return Err(error),
        };

        while let Some(entry) = dir_reader.next_entry().await? {
            let filename = entry.file_name().to_str().unwrap_or_default().to_string();

            // Leftovers of interrupted writes.
            if filename.is_empty() || filename.starts_with('.') {
                continue;
            }

            let content = tokio::fs::read_to_string(entry.path()).await?;
            map.insert(filename, content);
        }

        Ok(map)
    }

    pub(crate) async fn save(
        &self,
        prefix: &str,
        key: &str,
        value: &str,
    ) -> Result<(), std::io::Error> {
        write_atomically(&self.entry_path(prefix, key), value.as_bytes()).await
    }

    pub(crate) async fn delete(&self, prefix: &str, key: &str) -> Result<(), std::io::Error> {
        match tokio::fs::remove_file(self.entry_path(prefix, key)).await {
            Err(error) if matches!(error.kind(), std::io::ErrorKind::NotFound) => Ok(()),
            result => result,
        }
    }
}
