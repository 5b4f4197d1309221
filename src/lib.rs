//! Local-first bookmark store kept in sync with a single JSON file.
//!
//! A [`Session`] owns the in-memory [`Document`], writes it to the backing
//! file on save and reloads it when the file is changed by someone else.
//! Notifications caused by the session's own writes are recognised by time:
//! anything arriving within the suppression window after a local write is
//! treated as its echo.

pub mod config;
pub mod debounce;
pub mod dialog;
pub mod error;
pub mod model;
pub mod notify_provider;
pub mod persist;
pub mod session;
pub mod settings;
pub mod store;
pub mod watch;

pub use config::SyncConfig;
pub use dialog::{DialogProvider, NoDialog};
pub use error::{ParseError, PersistError, StoreError, WatchSetupError};
pub use model::{Bookmark, Document, NewBookmark, NewProject, Project};
pub use notify_provider::NotifyProvider;
pub use persist::Gateway;
pub use session::{SaveOutcome, Session};
pub use settings::{JsonSettingsStore, SettingsStore};
pub use store::BookmarkStore;
pub use watch::{ChangeWatcher, ExternalChange, FsEvent, FsEventKind, WatchProvider, WatchState};

/// Session on the native file watcher with settings in the default location.
///
/// The file recorded as last opened is not loaded; pass
/// [`JsonSettingsStore::last_opened_file`] to [`Session::restore`] for that.
pub fn default_session(
    config: SyncConfig,
    dialog: Box<dyn DialogProvider>,
) -> anyhow::Result<(Session, JsonSettingsStore)> {
    let settings = JsonSettingsStore::open_default()?;
    let session = Session::new(
        config,
        Box::new(NotifyProvider),
        dialog,
        Box::new(settings.clone()),
    );
    Ok((session, settings))
}
