use crate::config::SyncConfig;
use crate::dialog::DialogProvider;
use crate::error::{ParseError, PersistError, Result, WatchSetupError};
use crate::model::Document;
use crate::persist::Gateway;
use crate::settings::SettingsStore;
use crate::store::BookmarkStore;
use crate::watch::{ChangeWatcher, ExternalChange, WatchProvider};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;

const APP_NAME: &str = "marksync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// The user dismissed the save dialog.
    Cancelled,
}

/// One open document: the store, its backing file and the watcher on it.
///
/// All operations take `&mut self`, so a write always finishes before the
/// backing path can change and reloads never overlap with mutations.
pub struct Session {
    config: SyncConfig,
    store: BookmarkStore,
    gateway: Gateway,
    watcher: ChangeWatcher,
    changes: mpsc::UnboundedReceiver<ExternalChange>,
    dialog: Box<dyn DialogProvider>,
    settings: Box<dyn SettingsStore>,
    file_path: Option<PathBuf>,
    saving: bool,
    error: String,
    watch_error: Option<WatchSetupError>,
}

impl Session {
    pub fn new(
        config: SyncConfig,
        watch: Box<dyn WatchProvider>,
        dialog: Box<dyn DialogProvider>,
        settings: Box<dyn SettingsStore>,
    ) -> Self {
        let gateway = Gateway::new();
        let (watcher, changes) = ChangeWatcher::new(watch, gateway.last_write().clone(), &config);
        Self {
            config,
            store: BookmarkStore::new(),
            gateway,
            watcher,
            changes,
            dialog,
            settings,
            file_path: None,
            saving: false,
            error: String::new(),
            watch_error: None,
        }
    }

    // ── Status ─────────────────────────────────────────────────────────────

    pub fn store(&self) -> &BookmarkStore {
        &self.store
    }

    /// The only way to edit the document.
    pub fn store_mut(&mut self) -> &mut BookmarkStore {
        &mut self.store
    }

    pub fn document(&self) -> &Document {
        self.store.document()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Message from the last failed operation, empty if it succeeded.
    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.watched_path().is_some()
    }

    /// Why live reload is off for the current file, if setting it up failed.
    pub fn watch_error(&self) -> Option<&WatchSetupError> {
        self.watch_error.as_ref()
    }

    /// Window title, e.g. `• bookmarks.json — marksync` while dirty.
    pub fn title(&self) -> String {
        let base = match self.file_path.as_deref().and_then(Path::file_name) {
            Some(name) => format!("{} — {}", name.to_string_lossy(), APP_NAME),
            None => APP_NAME.to_string(),
        };
        if self.is_dirty() {
            format!("• {}", base)
        } else {
            base
        }
    }

    // ── File lifecycle ─────────────────────────────────────────────────────

    /// Start over with an empty document and ask where to save it.
    pub async fn new_document(&mut self) -> Result<SaveOutcome> {
        self.watcher.stop();
        self.store.replace(Document::default());
        self.file_path = None;
        self.error.clear();
        self.watch_error = None;
        self.save_as().await
    }

    /// Ask the dialog for a file and open it. Returns `None` if cancelled.
    pub async fn open(&mut self) -> Result<Option<PathBuf>> {
        let Some(path) = self.dialog.pick_open_path() else {
            return Ok(None);
        };
        self.open_path(path.clone()).await?;
        Ok(Some(path))
    }

    /// Load `path` and make it the backing file.
    ///
    /// On failure the current document and path are kept, and watching
    /// resumes on the previous file.
    pub async fn open_path(&mut self, path: PathBuf) -> Result<()> {
        self.watcher.stop();
        match self.gateway.read(&path).await {
            Ok(doc) => {
                log::info!("opened {} ({} bookmarks)", path.display(), doc.bookmarks.len());
                self.store.replace(doc);
                self.error.clear();
                self.adopt(path);
                Ok(())
            }
            Err(e) => {
                log::error!("failed to open {}: {}", path.display(), e);
                self.error = e.to_string();
                self.resume_watching();
                Err(e.into())
            }
        }
    }

    /// Initial load of the file used last time. A file that no longer
    /// exists is not an error: the session starts empty on that path.
    pub async fn restore(&mut self, candidate: Option<PathBuf>) -> Result<()> {
        let Some(path) = candidate else {
            return Ok(());
        };
        self.watcher.stop();
        match self.gateway.read(&path).await {
            Ok(doc) => {
                log::info!("restored {}", path.display());
                self.store.replace(doc);
                self.error.clear();
                self.adopt(path);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                log::info!("{} does not exist yet, starting empty", path.display());
                self.store.replace(Document::default());
                self.error.clear();
                self.watch(&path);
                self.file_path = Some(path);
                Ok(())
            }
            Err(e) => {
                log::error!("failed to restore {}: {}", path.display(), e);
                self.error = e.to_string();
                self.resume_watching();
                Err(e.into())
            }
        }
    }

    pub async fn save(&mut self) -> Result<SaveOutcome> {
        match self.file_path.clone() {
            Some(path) => {
                self.persist(&path).await?;
                Ok(SaveOutcome::Saved(path))
            }
            None => self.save_as().await,
        }
    }

    pub async fn save_as(&mut self) -> Result<SaveOutcome> {
        match self.dialog.pick_save_path() {
            Some(path) => self.save_as_path(path).await,
            None => Ok(SaveOutcome::Cancelled),
        }
    }

    /// Write to `path`, and only once that succeeded switch the session to it.
    pub async fn save_as_path(&mut self, path: PathBuf) -> Result<SaveOutcome> {
        self.persist(&path).await?;
        log::info!("saved as {}", path.display());
        self.adopt(path.clone());
        Ok(SaveOutcome::Saved(path))
    }

    /// Write to the current file if autosave is on and the document has
    /// been idle long enough. Returns whether a write happened.
    pub async fn autosave(&mut self) -> Result<bool> {
        let Some(delay) = self.config.autosave() else {
            return Ok(false);
        };
        let Some(path) = self.file_path.clone() else {
            return Ok(false);
        };
        if !self.store.is_dirty() {
            return Ok(false);
        }
        match self.store.idle_for(Instant::now()) {
            Some(idle) if idle >= delay => {}
            _ => return Ok(false),
        }
        self.persist(&path).await?;
        Ok(true)
    }

    async fn persist(&mut self, path: &Path) -> std::result::Result<(), PersistError> {
        if self.saving {
            return Err(PersistError::Busy);
        }
        self.saving = true;
        let result = self.gateway.write(path, self.store.document()).await;
        self.saving = false;

        match &result {
            Ok(()) => {
                self.store.mark_clean();
                self.error.clear();
            }
            Err(e) => {
                log::error!("failed to save {}: {}", path.display(), e);
                self.error = e.to_string();
            }
        }
        result
    }

    fn adopt(&mut self, path: PathBuf) {
        self.watch(&path);
        if let Err(e) = self.settings.set_last_file(&path) {
            log::warn!("could not record last file: {:#}", e);
        }
        self.file_path = Some(path);
    }

    fn watch(&mut self, path: &Path) {
        match self.watcher.restart(path) {
            Ok(()) => self.watch_error = None,
            Err(e) => {
                log::warn!("live reload disabled for {}: {}", path.display(), e);
                self.watch_error = Some(e);
            }
        }
    }

    fn resume_watching(&mut self) {
        if let Some(path) = self.file_path.clone() {
            self.watch(&path);
        }
    }

    // ── External changes ───────────────────────────────────────────────────

    /// Wait for the watcher to report an external change.
    pub async fn next_external_change(&mut self) -> Option<ExternalChange> {
        self.changes.recv().await
    }

    pub fn try_next_external_change(&mut self) -> Option<ExternalChange> {
        self.changes.try_recv().ok()
    }

    /// Reload the document from disk after an external change.
    ///
    /// The file on disk wins over unsaved local edits. Returns whether the
    /// document was replaced. An unparsable file (often a write still in
    /// progress) is logged and skipped; a missing or unreadable one is
    /// reported through `error`.
    pub async fn apply_external_change(&mut self, change: ExternalChange) -> Result<bool> {
        if self.file_path.as_deref() != Some(change.path.as_path()) {
            log::debug!("dropping change for {}, no longer open", change.path.display());
            return Ok(false);
        }
        if self
            .gateway
            .last_write()
            .is_within(self.config.suppression(), Instant::now())
        {
            log::debug!("dropping change for {}, own write", change.path.display());
            return Ok(false);
        }

        match self.gateway.read(&change.path).await {
            Ok(doc) => {
                if self.store.is_dirty() {
                    log::warn!(
                        "{} changed on disk, discarding unsaved edits",
                        change.path.display()
                    );
                }
                self.store.replace(doc);
                self.error.clear();
                log::info!("reloaded {}", change.path.display());
                Ok(true)
            }
            Err(e @ ParseError::Malformed { .. }) => {
                log::warn!("ignoring external edit of {}: {}", change.path.display(), e);
                Ok(false)
            }
            Err(e) => {
                log::warn!("reload of {} failed: {}", change.path.display(), e);
                self.error = e.to_string();
                Err(e.into())
            }
        }
    }

    /// Apply every change reported so far. Returns how many reloads happened.
    pub async fn sync_external_changes(&mut self) -> Result<usize> {
        let mut reloaded = 0;
        while let Some(change) = self.try_next_external_change() {
            if self.apply_external_change(change).await? {
                reloaded += 1;
            }
        }
        Ok(reloaded)
    }
}
