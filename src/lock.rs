//! Single-writer enforcement.
//!
//! The pool and index files have no provision for concurrent writers (the
//! Non-goals explicitly exclude multi-writer concurrency). [`PoolLock`]
//! takes an advisory exclusive lock on a sentinel file inside the pool
//! directory for the lifetime of the process, so a second `imagepile`
//! invocation against the same directory fails fast with a usage error
//! instead of corrupting lockstep.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::ImagepileError;

pub const LOCK_FILE_NAME: &str = ".imagepile.lock";

pub struct PoolLock {
    file: File,
}

impl PoolLock {
    /// Acquire the exclusive lock on `dir`'s sentinel file. Fails with a
    /// usage error (not a fatal I/O error) if another process already holds
    /// it, since this is an expected, recoverable condition for the caller.
    pub fn acquire(dir: &Path) -> Result<Self, ImagepileError> {
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| ImagepileError::environment(&path, e))?;

        file.try_lock_exclusive().map_err(|_| {
            ImagepileError::Usage(format!(
                "pool directory {} is already locked by another imagepile process",
                dir.display()
            ))
        })?;

        Ok(Self { file })
    }
}

impl Drop for PoolLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
