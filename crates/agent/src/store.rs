//! File-backed thread store: one JSON file per thread.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::thread::{StoreError, ThreadState, ThreadStore, ThreadSummary};

pub struct FileThreadStore {
    dir: PathBuf,
}

impl FileThreadStore {
    /// Create the store under `<data_dir>/threads`, ensuring the directory exists.
    pub fn new(data_dir: &Path) -> Result<Self, StoreError> {
        let dir = data_dir.join("threads");
        std::fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        info!(path = %dir.display(), "thread store initialized");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(thread_id)))
    }
}

/// Thread ids come from callers; anything outside `[A-Za-z0-9_-]` is
/// percent-encoded so ids map to distinct, safe file names.
fn file_stem(thread_id: &str) -> String {
    let mut stem = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl ThreadStore for FileThreadStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>, StoreError> {
        let path = self.thread_path(thread_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let state = serde_json::from_str(&data).map_err(|source| StoreError::Serialization {
            thread_id: thread_id.to_string(),
            source,
        })?;
        Ok(Some(state))
    }

    /// Write to a sibling temp file and rename over the target.
    async fn save(&self, state: &ThreadState) -> Result<(), StoreError> {
        let path = self.thread_path(&state.thread_id);
        let tmp = path.with_extension("json.tmp");
        let data =
            serde_json::to_string_pretty(state).map_err(|source| StoreError::Serialization {
                thread_id: state.thread_id.clone(),
                source,
            })?;
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ThreadSummary>, StoreError> {
        let mut summaries = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(data) => match serde_json::from_str::<ThreadState>(&data) {
                    Ok(state) => summaries.push(ThreadSummary::from(&state)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping corrupt thread");
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read thread");
                }
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        tokio::fs::metadata(&self.dir)
            .await
            .map(|_| ())
            .map_err(|e| io_error(&self.dir, e))
    }

    fn store_name(&self) -> &str {
        "file"
    }
}
