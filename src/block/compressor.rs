use log::debug;

use super::{
    misuse, postprocessor, BLOCK_END, BLOCK_TYPE, LEVEL_MODELED, LEVEL_STORED, LOCATOR, MAGIC, MAX_CHUNK,
    SEGMENT_START, WITHOUT_HASH, WITH_HASH,
};
use crate::{
    coder::Encoder,
    error::Result,
    io::ByteWrite,
    model::Model,
    predictor::Predictor,
    sha1::Digest,
    vm::ExecMode,
};

enum Coding {
    Modeled { predictor: Predictor, encoder: Encoder },
    Stored { chunk: Vec<u8> },
}

impl Coding {
    fn put(&mut self, out: &mut impl ByteWrite, byte: u8) -> Result<()> {
        match self {
            Self::Modeled { predictor, encoder } => encoder.encode_byte(out, predictor, byte),
            Self::Stored { chunk } => {
                chunk.push(byte);
                if chunk.len() == MAX_CHUNK {
                    flush_chunk(out, chunk)?;
                }
                Ok(())
            }
        }
    }

    /// Ends the data of a segment with the 4 zero bytes
    fn finish(&mut self, out: &mut impl ByteWrite) -> Result<()> {
        match self {
            Self::Modeled { encoder, .. } => encoder.finish(out)?,
            Self::Stored { chunk } => flush_chunk(out, chunk)?,
        }
        out.put_all(&[0; 4])?;
        Ok(())
    }
}

fn flush_chunk(out: &mut impl ByteWrite, chunk: &mut Vec<u8>) -> std::io::Result<()> {
    if chunk.is_empty() {
        return Ok(());
    }
    out.put_all(&(chunk.len() as u32).to_be_bytes())?;
    out.put_all(chunk)?;
    chunk.clear();
    Ok(())
}

struct Block {
    coding: Coding,
    /// Post-processing header, coded ahead of the first segment's data
    pending: Option<Vec<u8>>,
    /// Data bytes coded so far
    bytes: u64,
    in_segment: bool,
    segments: usize,
}

/// Writes blocks and segments. Calls go
/// `start_block (start_segment compress* end_segment)+ end_block`.
///
/// Bytes given to `compress` are coded as they are: when the model
/// carries a post-processing program, they must already be in the form
/// that program turns back into the original.
pub struct Compressor<W> {
    out: W,
    mode: ExecMode,
    block: Option<Block>,
}

impl<W: ByteWrite> Compressor<W> {
    pub fn new(out: W) -> Self { Self { out, mode: ExecMode::default(), block: None } }

    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn into_inner(self) -> W { self.out }

    pub fn start_block(&mut self, model: &Model) -> Result<()> {
        if self.block.is_some() {
            return Err(misuse("block already started"));
        }
        model.validate()?;
        let coding = if model.is_modeled() {
            Coding::Modeled { predictor: Predictor::new(model, self.mode)?, encoder: Encoder::new() }
        } else {
            Coding::Stored { chunk: Vec::new() }
        };
        let level = if model.is_modeled() { LEVEL_MODELED } else { LEVEL_STORED };

        self.out.put_all(&LOCATOR)?;
        self.out.put_all(MAGIC)?;
        self.out.put_all(&[level, BLOCK_TYPE])?;
        self.out.put_all(&model.header())?;
        debug!("block: level {level}, {} components", model.components.len());

        let pending = Some(postprocessor::header(model.pcomp.as_ref()));
        self.block = Some(Block { coding, pending, bytes: 0, in_segment: false, segments: 0 });
        Ok(())
    }

    /// Opens a segment. An empty name continues the previous file.
    pub fn start_segment(&mut self, name: &[u8], comment: &[u8]) -> Result<()> {
        let block = self.block.as_mut().ok_or_else(|| misuse("segment outside of a block"))?;
        if block.in_segment {
            return Err(misuse("segment already started"));
        }
        if name.contains(&0) || comment.contains(&0) {
            return Err(misuse("segment name and comment cannot contain 0 bytes"));
        }
        self.out.put(SEGMENT_START)?;
        self.out.put_all(name)?;
        self.out.put(0)?;
        self.out.put_all(comment)?;
        self.out.put_all(&[0, 0])?;

        if let Some(header) = block.pending.take() {
            for byte in header {
                block.coding.put(&mut self.out, byte)?;
            }
        }
        block.in_segment = true;
        Ok(())
    }

    pub fn compress(&mut self, data: &[u8]) -> Result<()> {
        let block = self.block.as_mut().filter(|b| b.in_segment).ok_or_else(|| misuse("no segment started"))?;
        for &byte in data {
            block.coding.put(&mut self.out, byte).map_err(|err| err.at(block.bytes))?;
            block.bytes += 1;
        }
        Ok(())
    }

    /// Closes the segment, storing `hash` (of the original bytes) if given
    pub fn end_segment(&mut self, hash: Option<&Digest>) -> Result<()> {
        let block = self.block.as_mut().filter(|b| b.in_segment).ok_or_else(|| misuse("no segment started"))?;
        block.coding.finish(&mut self.out)?;
        match hash {
            Some(digest) => {
                self.out.put(WITH_HASH)?;
                self.out.put_all(&digest.0)?;
            }
            None => self.out.put(WITHOUT_HASH)?,
        }
        block.in_segment = false;
        block.segments += 1;
        Ok(())
    }

    pub fn end_block(&mut self) -> Result<()> {
        match self.block.take() {
            Some(block) if !block.in_segment => {
                self.out.put(BLOCK_END)?;
                debug!("block end after {} segments", block.segments);
                Ok(())
            }
            Some(block) => {
                self.block = Some(block);
                Err(misuse("segment still open"))
            }
            None => Err(misuse("no block started")),
        }
    }
}
