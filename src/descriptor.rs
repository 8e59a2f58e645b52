//! Image descriptor — the reference stream emitted by ingest and consumed
//! by reconstruct.
//!
//! # On-disk layout
//!
//! ```text
//! offset  size  field
//! 0       4     'IPIL' (0x49 0x50 0x49 0x4C)
//! 4       4     head_skip      (u32 little-endian, 0 <= head_skip < B)
//! 8       4     tail_bytes     (u32 little-endian, 0 < tail_bytes <= B)
//! 12      4n    ordinals       (n x u32 little-endian, n >= 1)
//! ```
//!
//! The descriptor reconstructs to exactly `(n-1)*B + tail_bytes - head_skip`
//! bytes. It is self-contained (I5): given the pool in use at ingest time,
//! nothing else is needed to recover the original bytes.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ImagepileError;
use crate::BLOCK_SIZE;

pub const MAGIC: &[u8; 4] = b"IPIL";
pub const HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeader {
    pub head_skip: u32,
    pub tail_bytes: u32,
}

impl DescriptorHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), ImagepileError> {
        w.write_all(MAGIC)?;
        w.write_u32::<LittleEndian>(self.head_skip)?;
        w.write_u32::<LittleEndian>(self.tail_bytes)?;
        Ok(())
    }

    /// Read and validate the 12-byte header. Fatal (`Corruption`) on a bad
    /// signature, `head_skip >= B`, or `tail_bytes > B`.
    pub fn read<R: Read>(r: &mut R) -> Result<Self, ImagepileError> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ImagepileError::Corruption("descriptor shorter than the 12-byte header".into())
            } else {
                ImagepileError::Io(e)
            }
        })?;

        if &buf[0..4] != MAGIC {
            return Err(ImagepileError::Corruption(format!(
                "bad descriptor signature {}, expected {}",
                hex::encode(&buf[0..4]),
                hex::encode(MAGIC)
            )));
        }
        let head_skip = (&buf[4..8]).read_u32::<LittleEndian>()?;
        let tail_bytes = (&buf[8..12]).read_u32::<LittleEndian>()?;

        if head_skip as usize >= BLOCK_SIZE {
            return Err(ImagepileError::Corruption(format!(
                "head_skip {head_skip} >= block size {BLOCK_SIZE}"
            )));
        }
        if tail_bytes as usize > BLOCK_SIZE {
            return Err(ImagepileError::Corruption(format!(
                "tail_bytes {tail_bytes} > block size {BLOCK_SIZE}"
            )));
        }

        Ok(Self { head_skip, tail_bytes })
    }
}

pub fn write_ordinal<W: Write>(w: &mut W, ordinal: u32) -> Result<(), ImagepileError> {
    Ok(w.write_u32::<LittleEndian>(ordinal)?)
}

/// Read one ordinal, or `None` on clean end-of-stream.
pub fn read_ordinal<R: Read>(r: &mut R) -> Result<Option<u32>, ImagepileError> {
    let mut buf = [0u8; 4];
    let mut read = 0usize;
    while read < 4 {
        let n = r.read(&mut buf[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    if read == 0 {
        return Ok(None);
    }
    if read < 4 {
        return Err(ImagepileError::Corruption(format!(
            "partial ordinal record ({read} of 4 bytes) at end of descriptor"
        )));
    }
    Ok(Some((&buf[..]).read_u32::<LittleEndian>()?))
}
