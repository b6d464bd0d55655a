//! One server per state directory, so two servers never interleave writes
//! to the same sync report.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::Path;

const LOCK_FILE: &str = "server.lock";

/// Holds the lock until dropped
pub struct LockGuard {
    _file: File,
}

/// Fails if another server already holds the lock for `state_dir`.
pub fn acquire_lock(state_dir: &Path) -> Result<LockGuard> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;

    let path = state_dir.join(LOCK_FILE);
    let file = File::create(&path).context("Failed to create lock file")?;

    file.try_lock_exclusive().map_err(|_| {
        anyhow::anyhow!(
            "Another calrules-server is already using {}.\n\
            If you believe this is an error, remove: {}",
            state_dir.display(),
            path.display()
        )
    })?;

    Ok(LockGuard { _file: file })
}
