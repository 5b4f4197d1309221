use crate::config::SyncConfig;
use crate::error::WatchSetupError;
use crate::persist::LastWrite;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

// ---- Watch provider contract ----

/// What happened to the watched file. Ordered by precedence when merging a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FsEventKind {
    /// Access, metadata-only and unclassified events.
    Other,
    Create,
    Modify,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

pub type EventSink = Arc<dyn Fn(FsEvent) + Send + Sync>;

/// Calling it ends the subscription.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Source of coalesced change notifications for a single file.
pub trait WatchProvider: Send {
    fn subscribe(
        &self,
        path: &Path,
        debounce: Duration,
        sink: EventSink,
    ) -> Result<Unsubscribe, WatchSetupError>;
}

// ---- Echo filter ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not a content change or removal.
    Ignored,
    /// Arrived inside the suppression window after a local write.
    Suppressed,
    Accepted,
}

pub fn classify(event: &FsEvent, last_write: &LastWrite, window: Duration, now: Instant) -> Verdict {
    if !matches!(event.kind, FsEventKind::Modify | FsEventKind::Remove) {
        return Verdict::Ignored;
    }
    if last_write.is_within(window, now) {
        return Verdict::Suppressed;
    }
    Verdict::Accepted
}

/// A change to the backing file that did not come from this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

// ---- Change watcher ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching(PathBuf),
    Stopped,
}

struct Active {
    cancelled: Arc<AtomicBool>,
    unsubscribe: Unsubscribe,
}

/// Watches one backing file at a time and forwards genuine external
/// changes to the session over a channel.
pub struct ChangeWatcher {
    provider: Box<dyn WatchProvider>,
    last_write: LastWrite,
    coalesce: Duration,
    suppression: Duration,
    state: WatchState,
    active: Option<Active>,
    changes: mpsc::UnboundedSender<ExternalChange>,
}

impl ChangeWatcher {
    pub fn new(
        provider: Box<dyn WatchProvider>,
        last_write: LastWrite,
        config: &SyncConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ExternalChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            provider,
            last_write,
            coalesce: config.coalesce(),
            suppression: config.suppression(),
            state: WatchState::Idle,
            active: None,
            changes: tx,
        };
        (watcher, rx)
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn watched_path(&self) -> Option<&Path> {
        match &self.state {
            WatchState::Watching(path) => Some(path),
            _ => None,
        }
    }

    /// Begin watching `path`. An existing subscription is torn down first.
    pub fn start(&mut self, path: &Path) -> Result<(), WatchSetupError> {
        if self.active.is_some() {
            self.stop();
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let sink = self.sink(path.to_path_buf(), Arc::clone(&cancelled));
        let unsubscribe = self.provider.subscribe(path, self.coalesce, sink)?;

        log::debug!("watching {}", path.display());
        self.active = Some(Active {
            cancelled,
            unsubscribe,
        });
        self.state = WatchState::Watching(path.to_path_buf());
        Ok(())
    }

    /// Stop watching. Safe to call in any state.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancelled.store(true, Ordering::SeqCst);
            (active.unsubscribe)();
            log::debug!("stopped watching");
        }
        if self.state != WatchState::Idle {
            self.state = WatchState::Stopped;
        }
    }

    pub fn restart(&mut self, path: &Path) -> Result<(), WatchSetupError> {
        self.stop();
        self.start(path)
    }

    fn sink(&self, path: PathBuf, cancelled: Arc<AtomicBool>) -> EventSink {
        let last_write = self.last_write.clone();
        let window = self.suppression;
        let changes = self.changes.clone();

        Arc::new(move |event: FsEvent| {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            match classify(&event, &last_write, window, Instant::now()) {
                Verdict::Ignored => {}
                Verdict::Suppressed => {
                    log::debug!("ignoring echo of own write to {}", path.display());
                }
                Verdict::Accepted => {
                    log::info!("external change to {} ({:?})", path.display(), event.kind);
                    let _ = changes.send(ExternalChange {
                        path: path.clone(),
                        kind: event.kind,
                    });
                }
            }
        })
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---- Test support ----

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    type Subscribers = Arc<Mutex<Vec<(u64, PathBuf, EventSink)>>>;

    /// In-memory provider; tests fire events by hand.
    #[derive(Clone, Default)]
    pub struct FakeWatch {
        subscribers: Subscribers,
        next: Arc<Mutex<u64>>,
        pub fail: Arc<AtomicBool>,
    }

    impl FakeWatch {
        pub fn fire(&self, path: &Path, kind: FsEventKind) {
            let sinks: Vec<EventSink> = self
                .subscribers
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, p, _)| p == path)
                .map(|(_, _, sink)| Arc::clone(sink))
                .collect();
            for sink in sinks {
                sink(FsEvent {
                    path: path.to_path_buf(),
                    kind,
                });
            }
        }

        pub fn watched(&self) -> Vec<PathBuf> {
            self.subscribers
                .lock()
                .unwrap()
                .iter()
                .map(|(_, p, _)| p.clone())
                .collect()
        }
    }

    impl WatchProvider for FakeWatch {
        fn subscribe(
            &self,
            path: &Path,
            _debounce: Duration,
            sink: EventSink,
        ) -> Result<Unsubscribe, WatchSetupError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(WatchSetupError::NoParent(path.to_path_buf()));
            }
            let id = {
                let mut next = self.next.lock().unwrap();
                *next += 1;
                *next
            };
            self.subscribers
                .lock()
                .unwrap()
                .push((id, path.to_path_buf(), sink));

            let subscribers = Arc::clone(&self.subscribers);
            Ok(Box::new(move || {
                subscribers.lock().unwrap().retain(|(i, _, _)| *i != id);
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeWatch;
    use super::*;

    fn watcher(fake: &FakeWatch, last_write: LastWrite) -> (ChangeWatcher, mpsc::UnboundedReceiver<ExternalChange>) {
        ChangeWatcher::new(Box::new(fake.clone()), last_write, &SyncConfig::default())
    }

    #[test]
    fn test_classify() {
        let last_write = LastWrite::default();
        let window = Duration::from_millis(500);
        let now = Instant::now();
        let ev = |kind| FsEvent {
            path: PathBuf::from("a.json"),
            kind,
        };

        assert_eq!(classify(&ev(FsEventKind::Other), &last_write, window, now), Verdict::Ignored);
        assert_eq!(classify(&ev(FsEventKind::Create), &last_write, window, now), Verdict::Ignored);
        assert_eq!(classify(&ev(FsEventKind::Modify), &last_write, window, now), Verdict::Accepted);
        assert_eq!(classify(&ev(FsEventKind::Remove), &last_write, window, now), Verdict::Accepted);

        last_write.record(now);
        let soon = now + Duration::from_millis(100);
        let later = now + Duration::from_millis(600);
        assert_eq!(classify(&ev(FsEventKind::Modify), &last_write, window, soon), Verdict::Suppressed);
        assert_eq!(classify(&ev(FsEventKind::Modify), &last_write, window, later), Verdict::Accepted);
    }

    #[test]
    fn test_state_transitions() {
        let fake = FakeWatch::default();
        let (mut w, _rx) = watcher(&fake, LastWrite::default());
        assert_eq!(w.state(), &WatchState::Idle);

        // Stopping an idle watcher changes nothing.
        w.stop();
        assert_eq!(w.state(), &WatchState::Idle);

        let a = PathBuf::from("/tmp/a.json");
        let b = PathBuf::from("/tmp/b.json");
        w.start(&a).unwrap();
        assert_eq!(w.state(), &WatchState::Watching(a.clone()));

        w.restart(&b).unwrap();
        assert_eq!(w.watched_path(), Some(b.as_path()));
        assert_eq!(fake.watched(), vec![b.clone()]);

        w.stop();
        w.stop();
        assert_eq!(w.state(), &WatchState::Stopped);
        assert!(fake.watched().is_empty());

        w.start(&a).unwrap();
        assert_eq!(w.state(), &WatchState::Watching(a));
    }

    #[test]
    fn test_forwards_only_genuine_changes() {
        let fake = FakeWatch::default();
        let last_write = LastWrite::default();
        let (mut w, mut rx) = watcher(&fake, last_write.clone());
        let path = PathBuf::from("/tmp/a.json");
        w.start(&path).unwrap();

        fake.fire(&path, FsEventKind::Other);
        assert!(rx.try_recv().is_err());

        fake.fire(&path, FsEventKind::Modify);
        let change = rx.try_recv().unwrap();
        assert_eq!(change.path, path);
        assert_eq!(change.kind, FsEventKind::Modify);

        last_write.record(Instant::now());
        fake.fire(&path, FsEventKind::Modify);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_no_events_after_stop() {
        let fake = FakeWatch::default();
        let (mut w, mut rx) = watcher(&fake, LastWrite::default());
        let path = PathBuf::from("/tmp/a.json");
        w.start(&path).unwrap();
        w.stop();

        fake.fire(&path, FsEventKind::Modify);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_setup_failure_leaves_watcher_unsubscribed() {
        let fake = FakeWatch::default();
        fake.fail.store(true, Ordering::SeqCst);
        let (mut w, _rx) = watcher(&fake, LastWrite::default());

        assert!(w.start(Path::new("/tmp/a.json")).is_err());
        assert_eq!(w.state(), &WatchState::Idle);
        assert!(w.watched_path().is_none());
    }
}
