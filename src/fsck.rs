//! Lockstep diagnostic and repair.
//!
//! Ingest's critical section appends to the pool, then appends to the
//! index (see [`crate::signal`]). A process killed between those two
//! writes — before a [`crate::signal::TerminationGuard`] could intervene,
//! or by `SIGKILL` — leaves the pool exactly one block ahead of the index.
//! [`check_and_repair`] detects this specific, expected drift and restores
//! I1 by discarding the dangling unindexed tail block, so the next
//! invocation behaves as if that block had never been appended (the
//! restart-equivalence property). Any other drift is unexpected and is
//! reported as fatal corruption rather than guessed at.
//!
//! Loosely mirrors the shape of a health-scan report, without the
//! per-block log this crate has no equivalent need for: a single pass
//! over file sizes is enough to diagnose lockstep, since blocks carry no
//! independent self-describing header to scan.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::ImagepileError;
use crate::index::INDEX_FILE_NAME;
use crate::pool::POOL_FILE_NAME;
use crate::BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsckReport {
    /// Pool and index agree; nothing to do.
    Clean { block_count: u32 },
    /// The pool had exactly one unindexed tail block, now discarded.
    Repaired { discarded_ordinal: u32 },
}

/// Inspect `dir`'s pool and index files and repair a single-block drift
/// left by an interrupted ingest, before either file is opened for normal
/// use. Must run before [`crate::store::Store::open`].
pub fn check_and_repair(dir: &Path) -> Result<FsckReport, ImagepileError> {
    let pool_path = dir.join(POOL_FILE_NAME);
    let index_path = dir.join(INDEX_FILE_NAME);

    let pool_len = std::fs::metadata(&pool_path)
        .map(|m| m.len())
        .unwrap_or(0);
    let index_len = std::fs::metadata(&index_path)
        .map(|m| m.len())
        .unwrap_or(0);

    if pool_len % BLOCK_SIZE as u64 != 0 {
        return Err(ImagepileError::Corruption(format!(
            "pool file length {pool_len} is not a multiple of block size {BLOCK_SIZE}"
        )));
    }
    if index_len % 8 != 0 {
        return Err(ImagepileError::Corruption(format!(
            "index file length {index_len} is not a multiple of 8"
        )));
    }

    let pool_blocks = pool_len / BLOCK_SIZE as u64;
    let index_fingerprints = index_len / 8;

    if pool_blocks == index_fingerprints {
        return Ok(FsckReport::Clean { block_count: pool_blocks as u32 });
    }

    if pool_blocks == index_fingerprints + 1 {
        let discarded_ordinal = index_fingerprints as u32;
        let file = OpenOptions::new()
            .write(true)
            .open(&pool_path)
            .map_err(|e| ImagepileError::environment(&pool_path, e))?;
        file.set_len(index_fingerprints * BLOCK_SIZE as u64)?;
        tracing::warn!(discarded_ordinal, "discarded unindexed tail block to restore lockstep");
        return Ok(FsckReport::Repaired { discarded_ordinal });
    }

    Err(ImagepileError::Corruption(format!(
        "lockstep unrecoverable: pool has {pool_blocks} blocks, index has {index_fingerprints} fingerprints"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn clean_store_reports_clean() {
        let dir = tempdir().unwrap();
        {
            let mut store = Store::open(dir.path()).unwrap();
            store.resolve_or_insert(&[0xAAu8; BLOCK_SIZE]).unwrap();
        }
        assert_eq!(
            check_and_repair(dir.path()).unwrap(),
            FsckReport::Clean { block_count: 1 }
        );
    }

    #[test]
    fn dangling_tail_block_is_discarded() {
        let dir = tempdir().unwrap();
        {
            let mut store = Store::open(dir.path()).unwrap();
            store.resolve_or_insert(&[0xAAu8; BLOCK_SIZE]).unwrap();
        }
        // Simulate a crash between the pool append and the index append.
        let pool_path = dir.path().join(POOL_FILE_NAME);
        let mut f = OpenOptions::new().append(true).open(&pool_path).unwrap();
        f.write_all(&[0xBBu8; BLOCK_SIZE]).unwrap();

        let report = check_and_repair(dir.path()).unwrap();
        assert_eq!(report, FsckReport::Repaired { discarded_ordinal: 1 });

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.block_count().unwrap(), 1);
        store.check_lockstep().unwrap();
    }

    #[test]
    fn unrecoverable_drift_is_fatal() {
        let dir = tempdir().unwrap();
        {
            let mut store = Store::open(dir.path()).unwrap();
            store.resolve_or_insert(&[0xAAu8; BLOCK_SIZE]).unwrap();
        }
        let pool_path = dir.path().join(POOL_FILE_NAME);
        let mut f = OpenOptions::new().append(true).open(&pool_path).unwrap();
        f.write_all(&[0xBBu8; BLOCK_SIZE]).unwrap();
        f.write_all(&[0xCCu8; BLOCK_SIZE]).unwrap();

        assert!(matches!(check_and_repair(dir.path()), Err(ImagepileError::Corruption(_))));
    }
}
