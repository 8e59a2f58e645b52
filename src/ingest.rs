//! Ingest Pipeline — converts a byte stream into a reference stream while
//! growing the pool.
//!
//! # Algorithm
//!
//! 1. Read the first block: at most `BLOCK_SIZE - head_skip` bytes into the
//!    tail of a zeroed `BLOCK_SIZE` buffer (the leading `head_skip` bytes
//!    are never populated or emitted). Every later block reads a full
//!    `BLOCK_SIZE` bytes.
//! 2. A read that returns fewer bytes than requested, under this crate's
//!    blocking retry-to-completion reader, is always genuine end-of-input
//!    (see [`read_fill`]): the remainder of the buffer is zero-padded, the
//!    block is resolved, its ordinal recorded, and `tail_bytes` is set to
//!    the true byte count. A read that returns zero bytes at a block
//!    boundary ends the stream cleanly with no partial block.
//! 3. Every buffered block is resolved against the pool via
//!    [`crate::store::Store::resolve_or_insert`] (fingerprint lookup,
//!    then a mandatory byte-exact comparison per I2) and its ordinal is
//!    recorded in input order.
//! 4. `head_skip` is consumed after the first block.
//! 5. Once input is exhausted, the 12-byte header (now that `tail_bytes` is
//!    known) and the full ordinal stream are written to `output` in one
//!    pass. Buffering the ordinals rather than seeking back to patch a
//!    placeholder header keeps `output` a plain [`Write`] — the CLI's `-`
//!    stdout sentinel is a pipe, which cannot be sought.

use std::io::{Read, Write};

use crate::descriptor::{self, DescriptorHeader};
use crate::error::ImagepileError;
use crate::signal::TerminationGuard;
use crate::store::Store;
use crate::BLOCK_SIZE;

pub type ProgressFn<'a> = dyn FnMut(u64, u64) + 'a;

/// Read until `buf` is full or the underlying reader reaches end-of-input.
/// Loops across short reads from pipes/sockets so that, under blocking
/// synchronous I/O, a result shorter than `buf.len()` unambiguously means
/// end-of-input.
fn read_fill<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize, ImagepileError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Ingest `input` into `store`, emitting an image descriptor to `output`.
///
/// `head_skip` must be in `[0, BLOCK_SIZE)`. `progress`, when given, is
/// called once per ingested block with `(blocks_done, bytes_done)` — it is
/// an external collaborator, not part of the dedup contract. `guard`, when
/// given, is polled between blocks (never inside the append-pool /
/// append-index critical section) so a caught termination signal ends the
/// run cleanly with [`ImagepileError::Interrupted`].
pub fn ingest<R: Read, W: Write>(
    store: &mut Store,
    mut input: R,
    mut output: W,
    head_skip: u32,
    mut progress: Option<&mut ProgressFn<'_>>,
    guard: Option<&TerminationGuard>,
) -> Result<(), ImagepileError> {
    if head_skip as usize >= BLOCK_SIZE {
        return Err(ImagepileError::Usage(format!(
            "head_skip {head_skip} must be less than block size {BLOCK_SIZE}"
        )));
    }

    let mut ordinals: Vec<u32> = Vec::new();
    let mut tail_bytes: u32 = BLOCK_SIZE as u32;

    let mut skip = head_skip as usize;
    let mut blocks_done: u64 = 0;
    let mut bytes_done: u64 = 0;

    loop {
        let want = BLOCK_SIZE - skip;
        let mut buf = [0u8; BLOCK_SIZE];
        let n = read_fill(&mut input, &mut buf[skip..skip + want])?;

        if n == want {
            // Full block (possibly the final one, discovered only on the
            // next iteration's zero-byte read — the BLOCK_SIZE tail_bytes
            // default already covers that case).
            let ordinal = store.resolve_or_insert(&buf)?;
            ordinals.push(ordinal);

            blocks_done += 1;
            bytes_done += (skip + n) as u64;
            skip = 0; // head_skip is consumed after the first block

            if let Some(ref mut cb) = progress {
                cb(blocks_done, bytes_done);
            }
            if let Some(g) = guard {
                if g.is_requested() {
                    store.flush()?;
                    return Err(ImagepileError::Interrupted);
                }
            }
        } else if n == 0 {
            // Clean end of input at a block boundary: nothing more to do.
            break;
        } else {
            // End of input reached partway through this block.
            buf[skip + n..].fill(0);
            let ordinal = store.resolve_or_insert(&buf)?;
            ordinals.push(ordinal);
            tail_bytes = (skip + n) as u32;

            blocks_done += 1;
            bytes_done += (skip + n) as u64;
            if let Some(ref mut cb) = progress {
                cb(blocks_done, bytes_done);
            }
            break;
        }
    }

    DescriptorHeader { head_skip, tail_bytes }.write(&mut output)?;
    for ordinal in ordinals {
        descriptor::write_ordinal(&mut output, ordinal)?;
    }

    store.flush()?;
    output.flush()?;
    tracing::info!(blocks_done, bytes_done, "ingest complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::reconstruct;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn roundtrip(data: &[u8], head_skip: u32) -> Vec<u8> {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut descriptor = Vec::new();
        ingest(&mut store, Cursor::new(data), &mut descriptor, head_skip, None, None).unwrap();

        let mut out = Vec::new();
        reconstruct(&mut store, Cursor::new(descriptor), &mut out).unwrap();
        out
    }

    #[test]
    fn empty_input_round_trips() {
        assert_eq!(roundtrip(&[], 0), Vec::<u8>::new());
    }

    #[test]
    fn two_full_blocks_round_trip() {
        let z = vec![0u8; BLOCK_SIZE];
        let a = vec![0xAAu8; BLOCK_SIZE];
        let mut data = z.clone();
        data.extend_from_slice(&a);
        assert_eq!(roundtrip(&data, 0), data);
    }

    #[test]
    fn dedup_reuses_ordinal_for_repeated_block() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let z = vec![0u8; BLOCK_SIZE];
        let a = vec![0xAAu8; BLOCK_SIZE];
        let mut data = z.clone();
        data.extend_from_slice(&z);
        data.extend_from_slice(&a);

        let mut descriptor = Vec::new();
        ingest(&mut store, Cursor::new(&data), &mut descriptor, 0, None, None).unwrap();
        assert_eq!(store.block_count().unwrap(), 2); // only Z and A are unique

        let ordinals: Vec<u32> = descriptor[12..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(ordinals, vec![0, 0, 1]);
    }

    #[test]
    fn short_eof_sets_tail_bytes() {
        let data = vec![0xAAu8; 3000];
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut descriptor = Vec::new();
        ingest(&mut store, Cursor::new(&data), &mut descriptor, 0, None, None).unwrap();

        let hdr = DescriptorHeader::read(&mut Cursor::new(&descriptor)).unwrap();
        assert_eq!(hdr.tail_bytes, 3000);
        let ordinals: Vec<u32> = descriptor[12..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(ordinals.len(), 1);

        assert_eq!(roundtrip(&data, 0), data);
    }

    #[test]
    fn head_skip_short_first_block_then_full_block() {
        let mut data = vec![0xCCu8; BLOCK_SIZE - 512];
        data.extend(vec![0xAAu8; BLOCK_SIZE]);
        let rebuilt = roundtrip(&data, 512);
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn rejects_head_skip_out_of_range() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut descriptor = Vec::new();
        let err = ingest(
            &mut store,
            Cursor::new(&[][..]),
            &mut descriptor,
            BLOCK_SIZE as u32,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ImagepileError::Usage(_)));
    }
}
