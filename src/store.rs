//! [`Store`] — the owning context object over one pool directory.
//!
//! The in-memory lookup and the pool/index file handles are conceptually
//! process-wide singletons with a well-defined init (read the index) and
//! teardown (flush and drop). Rather than carry them as hidden ambient
//! state, every operation in this crate takes an explicit `&mut Store` —
//! this is the seam that keeps [`crate::ingest`] and [`crate::reconstruct`]
//! testable without a filesystem fixture larger than a temp directory.

use std::path::Path;

use crate::error::ImagepileError;
use crate::fingerprint::{Fingerprinter, Xxh3Fingerprinter};
use crate::index::HashIndex;
use crate::pool::Pool;
use crate::BLOCK_SIZE;

/// Owns the Pool, the Hash Index, and the fingerprinter for one process
/// invocation. Construct with [`Store::open`]; a single exclusive writer
/// per pool directory is the caller's responsibility (see [`crate::lock`]).
pub struct Store {
    pool: Pool,
    index: HashIndex,
    fingerprinter: Box<dyn Fingerprinter>,
}

impl Store {
    /// Open (creating if absent) the pool and index files inside `dir`,
    /// rebuilding the in-memory lookup from the index file.
    pub fn open(dir: &Path) -> Result<Self, ImagepileError> {
        Self::with_fingerprinter(dir, Box::new(Xxh3Fingerprinter))
    }

    pub fn with_fingerprinter(
        dir: &Path,
        fingerprinter: Box<dyn Fingerprinter>,
    ) -> Result<Self, ImagepileError> {
        let pool = Pool::open_in_dir(dir)?;
        let index = HashIndex::open_in_dir(dir)?;
        Ok(Self { pool, index, fingerprinter })
    }

    /// Block count currently in the pool (also the index's fingerprint
    /// count, under I1).
    pub fn block_count(&self) -> Result<u32, ImagepileError> {
        self.pool.block_count()
    }

    pub fn index_len(&self) -> u64 {
        self.index.len()
    }

    /// Verify I1: the index's fingerprint count equals the pool's block
    /// count.
    pub fn check_lockstep(&self) -> Result<(), ImagepileError> {
        let pool_blocks = self.pool.block_count()? as u64;
        if pool_blocks != self.index.len() {
            return Err(ImagepileError::Corruption(format!(
                "lockstep violated: pool has {pool_blocks} blocks, index has {} fingerprints",
                self.index.len()
            )));
        }
        Ok(())
    }

    /// Core dedup lookup (spec step 4 of ingest): fingerprint the block,
    /// walk every candidate ordinal sharing that fingerprint's bucket, and
    /// verify each by a byte-exact comparison against the pool (I2). On
    /// the first verified match, return its ordinal without touching
    /// persistent state. If no candidate matches, append the block to the
    /// pool, insert its fingerprint into the index (persisted), and return
    /// the freshly assigned ordinal.
    pub fn resolve_or_insert(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<u32, ImagepileError> {
        let fingerprint = self.fingerprinter.fingerprint(block);

        let mut candidates = self.index.find(fingerprint);
        while let Some(candidate) = candidates.next() {
            if &self.pool.read(candidate)? == block {
                return Ok(candidate);
            }
        }

        let ordinal = self.pool.append(block)?;
        self.index.insert(fingerprint, ordinal, true)?;
        Ok(ordinal)
    }

    /// Read back a previously stored block by ordinal (reconstruct path).
    pub fn read(&mut self, ordinal: u32) -> Result<[u8; BLOCK_SIZE], ImagepileError> {
        self.pool.read(ordinal)
    }

    /// Flush both the pool and index file handles.
    pub fn flush(&mut self) -> Result<(), ImagepileError> {
        self.pool.flush()?;
        self.index.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn novel_blocks_get_distinct_ordinals() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let a = [0xAAu8; BLOCK_SIZE];
        let mut b = [0xAAu8; BLOCK_SIZE];
        b[0] = 0xBB;

        let oa = store.resolve_or_insert(&a).unwrap();
        let ob = store.resolve_or_insert(&b).unwrap();
        assert_ne!(oa, ob);
        assert_eq!(store.block_count().unwrap(), 2);
    }

    #[test]
    fn repeated_block_reuses_ordinal() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let a = [0x11u8; BLOCK_SIZE];

        let first = store.resolve_or_insert(&a).unwrap();
        let second = store.resolve_or_insert(&a).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.block_count().unwrap(), 1);
    }

    /// I2: a crafted fingerprint collision must not alias a different
    /// block's ordinal.
    #[test]
    fn fingerprint_collision_forces_distinct_ordinal() {
        struct AlwaysZero;
        impl Fingerprinter for AlwaysZero {
            fn fingerprint(&self, _block: &[u8; BLOCK_SIZE]) -> u64 {
                0
            }
        }

        let dir = tempdir().unwrap();
        let mut store = Store::with_fingerprinter(dir.path(), Box::new(AlwaysZero)).unwrap();
        let a = [0xAAu8; BLOCK_SIZE];
        let mut b = [0xAAu8; BLOCK_SIZE];
        b[0] = 0x01;

        let oa = store.resolve_or_insert(&a).unwrap();
        let ob = store.resolve_or_insert(&b).unwrap();
        assert_ne!(oa, ob);
        assert_eq!(store.block_count().unwrap(), 2);
        assert_eq!(store.read(oa).unwrap(), a);
        assert_eq!(store.read(ob).unwrap(), b);
    }

    #[test]
    fn lockstep_holds_after_mixed_inserts() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        for i in 0..10u8 {
            let mut block = [0u8; BLOCK_SIZE];
            block[0] = i % 3; // forces some repeats
            store.resolve_or_insert(&block).unwrap();
        }
        store.check_lockstep().unwrap();
    }
}
