use crate::error::{ParseError, PersistError};
use crate::model::{self, Document};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::fs;

/// Start time of the most recent local write, shared with the change watcher.
#[derive(Debug, Clone, Default)]
pub struct LastWrite(Arc<Mutex<Option<Instant>>>);

impl LastWrite {
    pub fn record(&self, at: Instant) {
        *self.0.lock().expect("last write mutex") = Some(at);
    }

    pub fn get(&self) -> Option<Instant> {
        *self.0.lock().expect("last write mutex")
    }

    /// True if a local write started less than `window` before `now`.
    pub fn is_within(&self, window: Duration, now: Instant) -> bool {
        self.get()
            .map_or(false, |at| now.saturating_duration_since(at) < window)
    }
}

/// Reads and writes the backing file.
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    last_write: LastWrite,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_write(&self) -> &LastWrite {
        &self.last_write
    }

    /// Serialize `doc` and write it to `path` in full.
    pub async fn write(&self, path: &Path, doc: &Document) -> Result<(), PersistError> {
        let content = doc.to_pretty_json()?;

        self.last_write.record(Instant::now());
        fs::write(path, content)
            .await
            .map_err(|source| PersistError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        log::debug!("wrote {} ({} bookmarks)", path.display(), doc.bookmarks.len());
        Ok(())
    }

    pub async fn read(&self, path: &Path) -> Result<Document, ParseError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ParseError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ParseError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        model::parse(&bytes)
    }
}
