//! Crate-wide error type.
//!
//! Every fatal condition described in the design's error table collapses to
//! one of these variants. There is no local recovery: any `Err` returned
//! from a public API is terminal for the calling process. `main` converts
//! the `Display` message to a diagnostic on stderr and a non-zero exit code.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagepileError {
    /// Missing verb, bad `head_skip`, or another CLI-argument problem
    /// caught before any I/O is attempted.
    #[error("usage error: {0}")]
    Usage(String),

    /// `IMGDIR` unset, or the pool directory/files could not be opened.
    #[error("environment error: {0}")]
    Environment(String),

    /// Bad descriptor signature, `head_skip >= B`, `tail_bytes > B`, or a
    /// partial fingerprint record in the index — the on-disk state is
    /// inconsistent with the format it claims to be.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// A short input read that is neither the legitimate head-skip case nor
    /// end-of-input.
    #[error("truncated input: {0}")]
    Truncation(String),

    /// A short write to the pool or index, or a seek/read failure.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// Allocation failure while growing a lookup leaf.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A termination signal was observed outside the ingest critical
    /// section; the run was aborted cleanly but did not complete.
    #[error("interrupted by signal before completion")]
    Interrupted,
}

impl ImagepileError {
    pub fn environment(path: &PathBuf, detail: impl std::fmt::Display) -> Self {
        ImagepileError::Environment(format!("{}: {detail}", path.display()))
    }
}
