//! Archive framing.
//!
//! ```text
//! block   = LOCATOR "zPQ" level 1 header segment* 255
//! segment = 1 name 0 comment 0 0 data 0 0 0 0 (253 sha1[20] | 254)
//! ```
//!
//! `data` is arithmetic coded when the model has components, otherwise
//! it is a list of chunks each prefixed by its length (u32 BE). Either way
//! it starts, in the first segment of a block, with the post-processing
//! header: `0` to pass bytes through, or `1 len:u16le code` for a program.
//! All model state carries over from one segment to the next.

mod compressor;
mod decompresser;
mod postprocessor;

#[cfg(test)]
mod tests;

use std::io;

pub use compressor::Compressor;
pub use decompresser::{Decompresser, SegmentInfo};

use crate::{sha1::Digest, Error};

/// Marks the start of a block in arbitrary data
pub const LOCATOR: [u8; 13] = [0x37, 0x6b, 0x53, 0x74, 0xa0, 0x31, 0x83, 0xd3, 0x8c, 0xb2, 0x28, 0xb0, 0xd3];
pub(crate) const MAGIC: &[u8; 3] = b"zPQ";

/// Format level of blocks with components. Blocks without any are level 2.
pub(crate) const LEVEL_MODELED: u8 = 1;
pub(crate) const LEVEL_STORED: u8 = 2;
pub(crate) const BLOCK_TYPE: u8 = 1;

pub(crate) const SEGMENT_START: u8 = 1;
pub(crate) const BLOCK_END: u8 = 255;
pub(crate) const WITH_HASH: u8 = 253;
pub(crate) const WITHOUT_HASH: u8 = 254;

/// Largest chunk of a block without components
pub const MAX_CHUNK: usize = 1 << 16;

/// Outcome of checking a segment against the hash stored after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentCheck {
    /// No hash was stored
    Unchecked,
    Verified(Digest),
    Mismatch { expected: Digest, actual: Digest },
    /// The segment was skipped, this is the hash it was stored with
    Skipped(Digest),
}

impl SegmentCheck {
    /// `false` only for a mismatch
    pub fn is_ok(&self) -> bool { !matches!(self, Self::Mismatch { .. }) }
}

fn misuse(what: &str) -> Error { io::Error::new(io::ErrorKind::InvalidInput, what.to_owned()).into() }
