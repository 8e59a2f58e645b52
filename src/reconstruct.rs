//! Reconstruct Pipeline — converts an image descriptor back into the
//! original byte stream.
//!
//! # Algorithm
//!
//! 1. Read and validate the 12-byte header (magic, `head_skip < B`,
//!    `tail_bytes <= B`).
//! 2. Read ordinals one at a time, looking one ahead so the final ordinal
//!    is known before it is written (end-of-descriptor lookahead).
//! 3. For each ordinal, fetch its block from the pool and write the slice
//!    `block[start..end]`, where `start = head_skip` only for the very
//!    first ordinal (otherwise `0`), and `end = tail_bytes` only for the
//!    very last ordinal (otherwise `B`). This composes correctly even when
//!    a descriptor has exactly one ordinal that is simultaneously first and
//!    last, reproducing the documented total length
//!    `(n-1)*B + tail_bytes - head_skip`.
//! 4. An empty descriptor (zero ordinals) reconstructs to zero bytes;
//!    `head_skip`/`tail_bytes` are not consulted.

use std::io::{Read, Write};

use crate::descriptor::{self, DescriptorHeader};
use crate::error::ImagepileError;
use crate::store::Store;
use crate::BLOCK_SIZE;

pub fn reconstruct<R: Read, W: Write>(
    store: &mut Store,
    mut input: R,
    mut output: W,
) -> Result<(), ImagepileError> {
    let header = DescriptorHeader::read(&mut input)?;

    let mut pending = match descriptor::read_ordinal(&mut input)? {
        Some(ord) => ord,
        None => return Ok(()), // empty descriptor: zero bytes, no validation needed
    };
    let mut is_first = true;

    loop {
        let next = descriptor::read_ordinal(&mut input)?;
        let is_last = next.is_none();

        let block = store.read(pending)?;
        let start = if is_first { header.head_skip as usize } else { 0 };
        let end = if is_last { header.tail_bytes as usize } else { BLOCK_SIZE };
        if start > end {
            return Err(ImagepileError::Corruption(format!(
                "descriptor's single block has head_skip {start} past tail_bytes {end}"
            )));
        }
        output.write_all(&block[start..end])?;

        match next {
            Some(ord) => {
                pending = ord;
                is_first = false;
            }
            None => break,
        }
    }

    output.flush()?;
    Ok(())
}
