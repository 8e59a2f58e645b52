//! Pool-directory discovery.
//!
//! The pool directory is resolved from the `IMGDIR` environment variable.
//! Its absence or emptiness is a usage error, not a default-to-cwd
//! fallback: silently writing a dedup store into whatever directory the
//! shell happened to be in is the kind of surprise this crate avoids.

use std::env;
use std::path::PathBuf;

use crate::error::ImagepileError;

pub const IMGDIR_VAR: &str = "IMGDIR";

/// Resolve the pool directory from `IMGDIR`, creating it if absent.
pub fn pool_dir() -> Result<PathBuf, ImagepileError> {
    let raw = env::var(IMGDIR_VAR).map_err(|_| {
        ImagepileError::Usage(format!("{IMGDIR_VAR} is not set; point it at the pool directory"))
    })?;
    if raw.is_empty() {
        return Err(ImagepileError::Usage(format!("{IMGDIR_VAR} is set but empty")));
    }

    let dir = PathBuf::from(raw);
    std::fs::create_dir_all(&dir).map_err(|e| ImagepileError::environment(&dir, e))?;
    Ok(dir)
}
