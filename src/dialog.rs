use std::path::PathBuf;

/// Asks the user for a file. `None` means the user cancelled.
pub trait DialogProvider: Send {
    fn pick_open_path(&mut self) -> Option<PathBuf>;
    fn pick_save_path(&mut self) -> Option<PathBuf>;
}

/// For headless use: every prompt is cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDialog;

impl DialogProvider for NoDialog {
    fn pick_open_path(&mut self) -> Option<PathBuf> {
        None
    }

    fn pick_save_path(&mut self) -> Option<PathBuf> {
        None
    }
}
