//! Whole-buffer entry points on top of [`Compressor`] and [`Decompresser`].

use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;

use crate::{
    block::{Compressor, Decompresser, SegmentCheck, SegmentInfo},
    error::Result,
    filter::Filter,
    io::SliceReader,
    model::{Level, Model},
    sha1::{Digest, Sha1},
    Error,
};
pub use crate::vm::ExecMode;

/// Where the model of a block comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Preset(Level),
    /// A model built by hand or compiled from text. Combined with
    /// [`Filter::None`], a post-processing program it carries sees the
    /// input unchanged.
    Custom(Model),
}

impl Default for Method {
    fn default() -> Self { Self::Preset(Level::default()) }
}

impl Method {
    pub fn model(&self) -> Model {
        match self {
            Self::Preset(level) => level.model(),
            Self::Custom(model) => model.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub method: Method,
    pub filter: Filter,
    pub mode: ExecMode,
    /// Decode every block again and compare hashes
    pub verify: bool,
    /// Store the SHA-1 of each segment
    pub checksum: bool,
    pub name: Vec<u8>,
    pub comment: Vec<u8>,
    /// Input bytes per block for [`compress_parallel`]
    pub block_size: usize,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            method: Method::default(),
            filter: Filter::default(),
            mode: ExecMode::default(),
            verify: true,
            checksum: true,
            name: Vec::new(),
            comment: Vec::new(),
            block_size: 1 << 24,
        }
    }
}

impl CompressOptions {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_level(self, level: Level) -> Self { self.with_method(Method::Preset(level)) }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_name(mut self, name: impl Into<Vec<u8>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<Vec<u8>>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// The model blocks are written with, the filter's inverse attached
    pub fn model(&self) -> Model {
        let model = self.method.model();
        match self.filter.program() {
            Some(program) => {
                let (ph, pm) = self.filter.memory();
                model.with_pcomp(Some(program), ph, pm)
            }
            None => model,
        }
    }
}

/// Compresses `data` into a single block with one segment
pub fn compress(data: &[u8], options: &CompressOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    compress_block(&mut out, &options.model(), data, &options.name, options)?;
    Ok(out)
}

/// Cuts `data` in `block_size` pieces and compresses them as independent
/// blocks on the rayon pool. Only the first block carries the name, the
/// rest continue it.
pub fn compress_parallel(data: &[u8], options: &CompressOptions) -> Result<Vec<u8>> {
    if data.len() <= options.block_size {
        return compress(data, options);
    }
    let model = options.model();
    let blocks = data
        .par_chunks(options.block_size)
        .enumerate()
        .map(|(i, chunk)| {
            let name: &[u8] = if i == 0 { &options.name } else { b"" };
            let mut out = Vec::new();
            compress_block(&mut out, &model, chunk, name, options)?;
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(blocks.concat())
}

fn compress_block(out: &mut Vec<u8>, model: &Model, data: &[u8], name: &[u8], options: &CompressOptions) -> Result<()> {
    let timer = Instant::now();
    let start = out.len();
    let digest = Sha1::digest(data);
    let mut filtered = Vec::with_capacity(data.len());
    options.filter.encoder().apply(data, &mut filtered);

    let mut compressor = Compressor::new(&mut *out).with_mode(options.mode);
    compressor.start_block(model)?;
    compressor.start_segment(name, &options.comment)?;
    compressor.compress(&filtered)?;
    compressor.end_segment(options.checksum.then_some(&digest))?;
    compressor.end_block()?;

    if options.verify {
        verify(&out[start..], &digest)?;
    }
    let csize = out.len() - start;
    info!(
        "block: {} -> {} bytes (ratio: {:.3}) in {:?}",
        data.len(),
        csize,
        csize as f64 / data.len().max(1) as f64,
        timer.elapsed()
    );
    Ok(())
}

/// Replays a block with the interpreter
fn verify(block: &[u8], expected: &Digest) -> Result<()> {
    let mut decompresser = Decompresser::new(SliceReader::new(block)).with_mode(ExecMode::Interpret);
    let mut hasher = Sha1::new();
    while decompresser.find_block()? {
        while decompresser.find_filename()?.is_some() {
            decompresser.decompress(&mut hasher)?;
            decompresser.read_segment_end()?;
        }
    }
    let actual = hasher.finish();
    if actual != *expected {
        return Err(Error::VerificationFailed { expected: *expected, actual });
    }
    Ok(())
}

/// Decodes every segment of every block found in `archive` and returns
/// their concatenation. A hash mismatch is logged, not returned.
pub fn decompress(archive: &[u8], mode: ExecMode) -> Result<Vec<u8>> {
    let mut decompresser = Decompresser::new(SliceReader::new(archive)).with_mode(mode);
    let mut out = Vec::new();
    while decompresser.find_block()? {
        while let Some(name) = decompresser.find_filename()? {
            decompresser.decompress(&mut out)?;
            if let SegmentCheck::Mismatch { .. } = decompresser.read_segment_end()? {
                warn!("segment '{}' does not match its stored hash", String::from_utf8_lossy(&name));
            }
        }
    }
    Ok(out)
}

/// Segments of `archive` without decoding them
pub fn list(archive: &[u8]) -> Result<Vec<SegmentInfo>> {
    Decompresser::new(SliceReader::new(archive)).list()
}
