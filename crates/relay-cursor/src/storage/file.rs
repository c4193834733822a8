//! File-backed cursor storage.

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use relay_core::{CursorError, CursorStore, MessageId};
use tokio::io::AsyncWriteExt;

const APP_DIR: &str = "relay-sync";
const FILE_NAME: &str = "cursor";
const FALLBACK_FILE: &str = "relay_cursor.txt";

/// Cursor persisted as a decimal string in a single small file.
///
/// Writes go to a sibling temp file which is synced and then renamed
/// over the target, so a crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileCursor {
    path: PathBuf,
}

impl FileCursor {
    /// Create a cursor backed by `path`. Nothing is touched on disk yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Per-user default location, or `./relay_cursor.txt` when the
    /// platform has no local data directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir().map_or_else(
            || PathBuf::from(FALLBACK_FILE),
            |dir| dir.join(APP_DIR).join(FILE_NAME),
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from(FILE_NAME), ToOwned::to_owned);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for FileCursor {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[async_trait]
impl CursorStore for FileCursor {
    async fn load(&self) -> MessageId {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No saved cursor, starting from 0");
                return 0;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to read cursor: {e}");
                return 0;
            }
        };

        raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "Corrupt cursor file ({e}), starting from 0");
            0
        })
    }

    async fn save(&self, id: MessageId) -> Result<(), CursorError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        if let Err(e) = replace(&tmp, &self.path, id).await {
            match tokio::fs::remove_file(&tmp).await {
                Err(cleanup) if cleanup.kind() != ErrorKind::NotFound => {
                    tracing::debug!(path = %tmp.display(), "Failed to remove temp cursor: {cleanup}");
                }
                _ => {}
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Write `id` to `tmp`, flush it to disk, then rename it over `path`.
async fn replace(tmp: &Path, path: &Path, id: MessageId) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(id.to_string().as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, path).await
}
