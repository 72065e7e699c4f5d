//! Project root discovery
//!
//! Walks upward from each configured search root, a bounded number of
//! levels, looking for the directory that holds the server entry point.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{HarnessError, HarnessResult};

/// Find the first directory that looks like the project root
pub fn discover_root(config: &ServerConfig) -> HarnessResult<PathBuf> {
    let mut searched = Vec::with_capacity(config.search_roots.len());

    for start in &config.search_roots {
        let start = absolutize(start)?;
        if let Some(root) = ascend(&start, config) {
            debug!(root = %root.display(), "Found project root");
            return Ok(root);
        }
        searched.push(start);
    }

    Err(HarnessError::Discovery {
        entry_point: config.entry_point.clone(),
        searched,
        max_depth: config.max_depth,
    })
}

fn ascend(start: &Path, config: &ServerConfig) -> Option<PathBuf> {
    let mut current = start;

    // The starting directory itself counts as the first level
    for _ in 0..config.max_depth {
        if is_project_root(current, config) {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }

    None
}

fn is_project_root(dir: &Path, config: &ServerConfig) -> bool {
    if !dir.join(&config.entry_point).is_file() {
        return false;
    }
    match &config.companion_dir {
        Some(companion) => dir.join(companion).is_dir(),
        None => true,
    }
}

fn absolutize(path: &Path) -> HarnessResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
