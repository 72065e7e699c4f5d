//! Scoped working-directory changes

use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Changes the process working directory and restores the previous one on drop.
///
/// The working directory is process-wide; holders must not overlap across
/// threads.
#[derive(Debug)]
pub struct WorkdirGuard {
    previous: PathBuf,
}

impl WorkdirGuard {
    pub fn enter(path: &Path) -> std::io::Result<Self> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(path)?;
        debug!(from = %previous.display(), to = %path.display(), "Changed working directory");
        Ok(Self { previous })
    }

    /// Directory that will be restored
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            error!(path = %self.previous.display(), "Failed to restore working directory: {}", e);
        }
    }
}
