//! Block Pool — an append-only file of fixed-size blocks.
//!
//! # On-disk layout
//!
//! Unframed concatenation of [`crate::BLOCK_SIZE`]-byte blocks. File size is
//! always a multiple of `BLOCK_SIZE`. No header, no per-block metadata —
//! the pool trusts its caller (the index) for everything except raw bytes.
//!
//! # Addressing
//!
//! A block's address is its zero-based ordinal position from the start of
//! the file: `offset = ordinal * BLOCK_SIZE`. Ordinals are dense and
//! 32-bit, which keeps image descriptors compact — one image of size `S`
//! costs roughly `S / BLOCK_SIZE * 4` bytes of metadata regardless of how
//! much deduplication is achieved.
//!
//! # Invariants
//!
//! Blocks are written once, at the tail, and never mutated or removed
//! (I3, I4). A short write or short read is treated as fatal corruption —
//! there is no partial-block recovery path in this module; see
//! [`crate::fsck`] for restoring lockstep after an interrupted run.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::ImagepileError;
use crate::BLOCK_SIZE;

pub const POOL_FILE_NAME: &str = "imagepile.db";

/// The append-only block store. Owns its file handle for the lifetime of
/// one process invocation.
pub struct Pool {
    file: File,
}

impl Pool {
    /// Open (creating if absent) the pool file at `path`.
    pub fn open(path: &Path) -> Result<Self, ImagepileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| ImagepileError::environment(&path.to_path_buf(), e))?;
        Ok(Self { file })
    }

    /// Open the pool file named [`POOL_FILE_NAME`] inside `dir`.
    pub fn open_in_dir(dir: &Path) -> Result<Self, ImagepileError> {
        Self::open(&dir.join(POOL_FILE_NAME))
    }

    /// Number of whole blocks currently stored. Fatal if the file length is
    /// not a multiple of `BLOCK_SIZE` — that can only happen after an
    /// interrupted write that did not complete an atomic block.
    pub fn block_count(&self) -> Result<u32, ImagepileError> {
        let len = self.file.metadata()?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(ImagepileError::Corruption(format!(
                "pool file length {len} is not a multiple of block size {BLOCK_SIZE}"
            )));
        }
        Ok((len / BLOCK_SIZE as u64) as u32)
    }

    /// Append `block` to the tail and return its newly assigned ordinal.
    ///
    /// Defined only on exactly `BLOCK_SIZE`-byte blocks. A short write is
    /// fatal: the pool does not retry or pad on the caller's behalf.
    pub fn append(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<u32, ImagepileError> {
        let ordinal = self.block_count()?;
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(block)?;
        Ok(ordinal)
    }

    /// Read the block at `ordinal`. Fatal on a short read.
    pub fn read(&mut self, ordinal: u32) -> Result<[u8; BLOCK_SIZE], ImagepileError> {
        let offset = ordinal as u64 * BLOCK_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut block = [0u8; BLOCK_SIZE];
        self.file.read_exact(&mut block).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ImagepileError::Corruption(format!(
                    "short read of pool block {ordinal} (pool truncated or ordinal out of range)"
                ))
            } else {
                ImagepileError::Io(e)
            }
        })?;
        Ok(block)
    }

    pub fn flush(&mut self) -> Result<(), ImagepileError> {
        Ok(self.file.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_assigns_dense_ordinals() {
        let dir = tempdir().unwrap();
        let mut pool = Pool::open_in_dir(dir.path()).unwrap();
        let a = [0xAAu8; BLOCK_SIZE];
        let b = [0xBBu8; BLOCK_SIZE];
        assert_eq!(pool.append(&a).unwrap(), 0);
        assert_eq!(pool.append(&b).unwrap(), 1);
        assert_eq!(pool.block_count().unwrap(), 2);
    }

    #[test]
    fn read_returns_written_bytes() {
        let dir = tempdir().unwrap();
        let mut pool = Pool::open_in_dir(dir.path()).unwrap();
        let block = [0x42u8; BLOCK_SIZE];
        let ord = pool.append(&block).unwrap();
        assert_eq!(pool.read(ord).unwrap(), block);
    }

    #[test]
    fn read_past_end_is_corruption() {
        let dir = tempdir().unwrap();
        let mut pool = Pool::open_in_dir(dir.path()).unwrap();
        pool.append(&[0u8; BLOCK_SIZE]).unwrap();
        assert!(matches!(pool.read(5), Err(ImagepileError::Corruption(_))));
    }

    #[test]
    fn reopen_preserves_blocks() {
        let dir = tempdir().unwrap();
        let block = [0x7Fu8; BLOCK_SIZE];
        {
            let mut pool = Pool::open_in_dir(dir.path()).unwrap();
            pool.append(&block).unwrap();
        }
        let mut pool = Pool::open_in_dir(dir.path()).unwrap();
        assert_eq!(pool.block_count().unwrap(), 1);
        assert_eq!(pool.read(0).unwrap(), block);
    }
}
