//! # imagepile — content-addressed block deduplication for disk images
//!
//! Format guarantees:
//! - All numeric fields are little-endian; never negotiated
//! - Blocks are fixed-size ([`BLOCK_SIZE`] bytes); there is no variable-length
//!   chunking and no compression
//! - The pool file is append-only: a block, once written, is never moved or
//!   rewritten (I3, I4)
//! - The hash index's fingerprint count always equals the pool's block count
//!   (I1); a fingerprint match is only ever treated as provisional until a
//!   byte-exact comparison against the pool confirms it (I2)
//! - An image descriptor is self-contained given the pool in use at ingest
//!   time (I5) — no other file is needed to reconstruct the original bytes

pub mod descriptor;
pub mod env;
pub mod error;
pub mod fingerprint;
pub mod fsck;
pub mod ingest;
pub mod index;
pub mod lock;
pub mod pool;
pub mod reconstruct;
pub mod signal;
pub mod store;

/// Fixed block size for both the pool and every descriptor ordinal.
pub const BLOCK_SIZE: usize = 4096;

pub use error::ImagepileError;
pub use ingest::ingest;
pub use reconstruct::reconstruct;
pub use store::Store;
