use crate::debounce;
use crate::error::WatchSetupError;
use crate::watch::{EventSink, FsEvent, FsEventKind, Unsubscribe, WatchProvider};
use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

impl From<&EventKind> for FsEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => FsEventKind::Create,
            EventKind::Modify(ModifyKind::Metadata(_)) => FsEventKind::Other,
            EventKind::Modify(_) => FsEventKind::Modify,
            EventKind::Remove(_) => FsEventKind::Remove,
            _ => FsEventKind::Other,
        }
    }
}

/// Watch provider backed by the platform's native notification API.
///
/// The parent directory is watched rather than the file itself so that
/// editors and sync clients which replace the file by rename are still seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyProvider;

impl WatchProvider for NotifyProvider {
    fn subscribe(
        &self,
        path: &Path,
        window: Duration,
        sink: EventSink,
    ) -> Result<Unsubscribe, WatchSetupError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| WatchSetupError::NoParent(path.to_path_buf()))?
            .to_os_string();
        let folder = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => return Err(WatchSetupError::NoParent(path.to_path_buf())),
        };

        let (raw_tx, raw_rx) = mpsc::channel::<FsEvent>();
        let target = path.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if !event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        return;
                    }
                    let _ = raw_tx.send(FsEvent {
                        path: target.clone(),
                        kind: FsEventKind::from(&event.kind),
                    });
                }
                Err(e) => log::warn!("watch error: {}", e),
            },
            Config::default(),
        )
        .map_err(|source| WatchSetupError::Notify {
            path: path.to_path_buf(),
            source,
        })?;

        watcher
            .watch(&folder, RecursiveMode::NonRecursive)
            .map_err(|source| WatchSetupError::Notify {
                path: path.to_path_buf(),
                source,
            })?;

        // The coalescing thread exits once the watcher, and with it the
        // sending half of the raw channel, is dropped.
        debounce::spawn(window, raw_rx, sink)?;

        Ok(Box::new(move || drop(watcher)))
    }
}
