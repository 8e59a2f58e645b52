//! Block fingerprinting.
//!
//! The on-disk pool and index formats do not encode which hash function
//! produced a fingerprint — per the design, "the hash is not part of the
//! persisted format of the pool, only of the persisted index" and any
//! 64-bit non-cryptographic hash with good distribution is acceptable.
//! [`Fingerprinter`] is the seam: swapping the default implementation never
//! changes [`crate::pool`] or [`crate::descriptor`], only the bytes written
//! to the index file of a freshly built pool.
//!
//! The default, [`Xxh3Fingerprinter`], uses xxh3-64 — fast, well
//! distributed, and not cryptographically hardened, which is exactly the
//! class of hash the design calls for. [`crate::index`] never trusts a
//! fingerprint match alone (I2); every candidate is still verified against
//! the pool by byte comparison regardless of which `Fingerprinter` is in
//! use.

use crate::BLOCK_SIZE;

/// Computes a 64-bit fingerprint for a fixed-size block.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, block: &[u8; BLOCK_SIZE]) -> u64;
}

/// Default fingerprinter: xxh3-64 over the raw block bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xxh3Fingerprinter;

impl Fingerprinter for Xxh3Fingerprinter {
    #[inline]
    fn fingerprint(&self, block: &[u8; BLOCK_SIZE]) -> u64 {
        xxhash_rust::xxh3::xxh3_64(block)
    }
}
