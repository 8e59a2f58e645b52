//! Hash Index and in-memory lookup.
//!
//! # On-disk layout
//!
//! The index file (`imagepile.hash_index`) is a flat sequence of 64-bit
//! fingerprints in little-endian order, one per pool block, appended in
//! lockstep with [`crate::pool::Pool::append`] (I1). There is no header.
//!
//! # In-memory lookup
//!
//! A fixed array of 65,536 buckets, indexed by the high 16 bits of the
//! fingerprint. Each bucket is a chain of fixed-capacity ([`LEAF_CAPACITY`]
//! = 64) leaves holding `(fingerprint, ordinal)` pairs in insertion order.
//! When a leaf fills, a new leaf is appended to the bucket's chain.
//!
//! This shape — rather than open addressing or a balanced tree — is chosen
//! because the working-set size is unknown ahead of time, insertion never
//! reorders existing entries, and [`HashIndex::find`] must cheaply and
//! resumably enumerate *every* entry sharing a fingerprint prefix so that
//! each candidate can be verified against the pool by byte comparison
//! (I2) without restarting the scan.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ImagepileError;

pub const INDEX_FILE_NAME: &str = "imagepile.hash_index";

/// Number of buckets, keyed on the high 16 bits of a fingerprint.
pub const BUCKET_COUNT: usize = 1 << 16;

/// Maximum `(fingerprint, ordinal)` pairs per leaf before a new leaf is
/// linked to the bucket's chain.
pub const LEAF_CAPACITY: usize = 64;

#[inline]
fn bucket_of(fingerprint: u64) -> usize {
    (fingerprint >> 48) as usize
}

/// One fixed-capacity node in a bucket's chain.
#[derive(Default)]
struct Leaf {
    entries: Vec<(u64, u32)>,
}

impl Leaf {
    fn is_full(&self) -> bool {
        self.entries.len() >= LEAF_CAPACITY
    }

    fn push(&mut self, fingerprint: u64, ordinal: u32) -> Result<(), ImagepileError> {
        self.entries
            .try_reserve(1)
            .map_err(|e| ImagepileError::ResourceExhausted(e.to_string()))?;
        self.entries.push((fingerprint, ordinal));
        Ok(())
    }
}

#[derive(Default)]
struct Bucket {
    leaves: Vec<Leaf>,
}

impl Bucket {
    fn insert(&mut self, fingerprint: u64, ordinal: u32) -> Result<(), ImagepileError> {
        if self.leaves.last().map(Leaf::is_full).unwrap_or(true) {
            self.leaves
                .try_reserve(1)
                .map_err(|e| ImagepileError::ResourceExhausted(e.to_string()))?;
            self.leaves.push(Leaf::default());
        }
        self.leaves.last_mut().unwrap().push(fingerprint, ordinal)
    }
}

/// The persistent index file plus its rebuilt in-memory lookup.
pub struct HashIndex {
    buckets: Vec<Bucket>,
    file: File,
    /// Running count of fingerprints persisted; equals the pool's block
    /// count under I1.
    len: u64,
}

impl HashIndex {
    /// Open `imagepile.hash_index` inside `dir`, rebuilding the in-memory
    /// lookup by reading the file sequentially from the start.
    pub fn open_in_dir(dir: &Path) -> Result<Self, ImagepileError> {
        Self::open(&dir.join(INDEX_FILE_NAME))
    }

    pub fn open(path: &Path) -> Result<Self, ImagepileError> {
        // Ensure the file exists before the sequential rebuild read.
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| ImagepileError::environment(&path.to_path_buf(), e))?;

        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        buckets.resize_with(BUCKET_COUNT, Bucket::default);
        let mut index = Self {
            buckets,
            // `append(true)` ensures every `insert` write lands at EOF
            // regardless of the cursor left over from opening or from the
            // rebuild read, matching the index's append-only contract (I4).
            file: OpenOptions::new()
                .append(true)
                .open(path)
                .map_err(|e| ImagepileError::environment(&path.to_path_buf(), e))?,
            len: 0,
        };
        index.rebuild(path)?;
        Ok(index)
    }

    /// Sequentially read every fingerprint in the index file and insert it
    /// with `persist = false`, in order, so ordinal `i` is assigned to the
    /// i-th fingerprint read. A short trailing record is fatal corruption.
    fn rebuild(&mut self, path: &Path) -> Result<(), ImagepileError> {
        let f = File::open(path)
            .map_err(|e| ImagepileError::environment(&path.to_path_buf(), e))?;
        let mut reader = BufReader::new(f);
        let mut buf = [0u8; 8];
        let mut ordinal: u32 = 0;
        loop {
            let mut read = 0usize;
            while read < 8 {
                let n = reader.read(&mut buf[read..])?;
                if n == 0 {
                    break;
                }
                read += n;
            }
            if read == 0 {
                break;
            }
            if read < 8 {
                return Err(ImagepileError::Corruption(format!(
                    "partial fingerprint record ({read} of 8 bytes) at index offset {}",
                    ordinal as u64 * 8
                )));
            }
            let fingerprint = (&buf[..]).read_u64::<LittleEndian>()?;
            self.insert(fingerprint, ordinal, false)?;
            ordinal += 1;
        }
        Ok(())
    }

    /// Number of fingerprints in the index (== pool block count under I1).
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Place a new entry in the bucket selected by the fingerprint's high
    /// 16 bits. When `persist` is true the fingerprint is also appended to
    /// the index file; `persist` is false only during startup rebuild.
    pub fn insert(&mut self, fingerprint: u64, ordinal: u32, persist: bool) -> Result<(), ImagepileError> {
        self.buckets[bucket_of(fingerprint)].insert(fingerprint, ordinal)?;
        if persist {
            self.file.write_u64::<LittleEndian>(fingerprint)?;
        }
        self.len += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ImagepileError> {
        Ok(self.file.flush()?)
    }

    /// Return a resumable iterator over every ordinal whose stored
    /// fingerprint equals `fingerprint`, in insertion order.
    pub fn find(&self, fingerprint: u64) -> Find<'_> {
        Find {
            buckets: &self.buckets,
            fingerprint,
            bucket_idx: bucket_of(fingerprint),
            leaf_idx: 0,
            entry_idx: 0,
        }
    }
}

/// A resumable cursor over candidates sharing a fingerprint's bucket.
///
/// Implemented as a plain `(leaf_idx, entry_idx)` cursor — no heap
/// allocation per call, and no restart after a candidate is rejected by
/// byte comparison.
pub struct Find<'a> {
    buckets: &'a [Bucket],
    fingerprint: u64,
    bucket_idx: usize,
    leaf_idx: usize,
    entry_idx: usize,
}

impl<'a> Iterator for Find<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let leaves = &self.buckets[self.bucket_idx].leaves;
        while self.leaf_idx < leaves.len() {
            let entries = &leaves[self.leaf_idx].entries;
            while self.entry_idx < entries.len() {
                let (fp, ordinal) = entries[self.entry_idx];
                self.entry_idx += 1;
                if fp == self.fingerprint {
                    return Some(ordinal);
                }
            }
            self.leaf_idx += 1;
            self.entry_idx = 0;
        }
        None
    }
}
