use crate::storage::write_atomically;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The directory holding generated playlist files. Only files carrying
/// `prefix` are considered owned by the sync engine.
pub(crate) struct PlaylistFiles {
    directory: PathBuf,
    prefix: String,
}

impl PlaylistFiles {
    pub(crate) fn new(directory: PathBuf, prefix: String) -> Self {
        Self { directory, prefix }
    }

    pub(crate) fn path_for(&self, filename: &str) -> PathBuf {
        self.directory.join(filename)
    }

    pub(crate) async fn read(&self, path: &Path) -> Result<Option<String>, std::io::Error> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub(crate) async fn write(&self, path: &Path, content: &str) -> Result<(), std::io::Error> {
        write_atomically(path, content.as_bytes()).await
    }

    pub(crate) async fn remove(&self, path: &Path) -> Result<(), std::io::Error> {
        match tokio::fs::remove_file(path).await {
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }

    pub(crate) async fn list_owned(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut reader = match tokio::fs::read_dir(&self.directory).await {
            Ok(reader) => reader,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(error) => return Err(error),
        };

        let mut paths = vec![];

        while let Some(entry) = reader.next_entry().await? {
            let filename = entry.file_name();
            let Some(filename) = filename.to_str() else {
                continue;
            };

            if filename.starts_with(&self.prefix) && filename.ends_with(".m3u") {
                paths.push(self.path_for(filename));
            }
        }

        paths.sort();

        Ok(paths)
    }
}
