//! Cooperative termination handling.
//!
//! Ingest's critical section — append to the pool, append to the index,
//! update the in-memory lookup, all inside [`crate::store::Store::resolve_or_insert`]
//! — must never be interrupted mid-way (I1, I3). Rather than block or
//! ignore signals outright, a [`TerminationGuard`] latches a flag on
//! SIGINT/SIGTERM/SIGHUP that [`crate::ingest::ingest`] polls only between
//! whole blocks, after the current block's critical section has already
//! completed and before the next one starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ImagepileError;

/// Holds the shared flag set by the registered signal handlers. Dropping
/// this does not unregister the handlers — they are process-lifetime, same
/// as the flag they set.
pub struct TerminationGuard {
    flag: Arc<AtomicBool>,
}

impl TerminationGuard {
    /// Register SIGINT, SIGTERM, and SIGHUP to set a shared flag instead of
    /// terminating the process immediately.
    pub fn install() -> Result<Self, ImagepileError> {
        let flag = Arc::new(AtomicBool::new(false));
        for sig in [
            signal_hook::consts::SIGINT,
            signal_hook::consts::SIGTERM,
            signal_hook::consts::SIGHUP,
        ] {
            signal_hook::flag::register(sig, Arc::clone(&flag))
                .map_err(|e| ImagepileError::Environment(format!("signal registration failed: {e}")))?;
        }
        Ok(Self { flag })
    }

    /// True once a tracked signal has arrived. Callers must only observe
    /// this between critical sections, never inside one.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
