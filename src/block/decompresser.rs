use std::io;

use log::{debug, trace, warn};

use super::{
    misuse, postprocessor::PostProcessor, SegmentCheck, BLOCK_END, BLOCK_TYPE, LEVEL_MODELED, LEVEL_STORED,
    LOCATOR, MAGIC, SEGMENT_START, WITHOUT_HASH, WITH_HASH,
};
use crate::{
    coder::Decoder,
    error::Result,
    io::{ByteRead, ByteWrite, Counter},
    model::Model,
    predictor::Predictor,
    sha1::{Digest, Sha1},
    vm::ExecMode,
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between blocks
    Block,
    /// Expecting a segment or the end of the block
    Segment,
    Comment,
    Data,
    /// Data read, expecting the trailer
    End,
}

enum Source {
    Modeled { predictor: Predictor, decoder: Decoder },
    Stored { left: u32 },
}

struct Block {
    model: Model,
    source: Source,
    post: PostProcessor,
    /// Model state matches the encoder's. A skipped segment breaks this.
    synced: bool,
}

/// A segment as listed by [`Decompresser::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub block: usize,
    pub name: Vec<u8>,
    pub comment: Vec<u8>,
    pub check: SegmentCheck,
}

/// Reads blocks and segments in stream order:
///
/// ```text
/// while find_block()? {
///     while let Some(name) = find_filename()? {
///         read_comment()?;      (optional)
///         decompress(out)?;     (or skip()?)
///         read_segment_end()?;
///     }
/// }
/// ```
pub struct Decompresser<R> {
    input: R,
    mode: ExecMode,
    state: State,
    block: Option<Block>,
    hasher: Sha1,
    decoded: bool,
    /// Trailer byte already consumed by `skip`
    trailer: Option<u8>,
}

/// Writes to the output and hashes what went by
struct Tee<'a, W> {
    out: &'a mut W,
    hasher: &'a mut Sha1,
}

impl<W: ByteWrite> ByteWrite for Tee<'_, W> {
    fn put(&mut self, byte: u8) -> io::Result<()> {
        self.hasher.update(&[byte]);
        self.out.put(byte)
    }

    fn put_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.hasher.update(bytes);
        self.out.put_all(bytes)
    }
}

impl<R: ByteRead> Decompresser<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            mode: ExecMode::default(),
            state: State::Block,
            block: None,
            hasher: Sha1::new(),
            decoded: false,
            trailer: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn into_inner(self) -> R { self.input }

    /// Model of the current block
    pub fn model(&self) -> Option<&Model> { self.block.as_ref().map(|b| &b.model) }

    fn byte(&mut self) -> Result<u8> {
        self.input.get()?.ok_or(Error::UnexpectedEof { offset: self.input.offset() })
    }

    fn string(&mut self) -> Result<Vec<u8>> {
        let mut s = Vec::new();
        loop {
            match self.byte()? {
                0 => return Ok(s),
                c => s.push(c),
            }
        }
    }

    fn corrupt(&self, reason: &'static str) -> Error { Error::Corrupt { offset: self.input.offset(), reason } }

    /// Scans to the next block and reads its header. `false` when the
    /// input ends first.
    pub fn find_block(&mut self) -> Result<bool> {
        let mut window = [0u8; 16];
        let mut seen = 0;
        loop {
            let Some(byte) = self.input.get()? else {
                self.state = State::Block;
                return Ok(false);
            };
            window.copy_within(1.., 0);
            window[15] = byte;
            seen += 1;
            if seen >= window.len() && window[..13] == LOCATOR && window[13..] == MAGIC[..] {
                break;
            }
        }
        let start = self.input.offset() - 16;

        let level = self.byte()?;
        if level != LEVEL_MODELED && level != LEVEL_STORED {
            return Err(self.corrupt("unsupported format level"));
        }
        if self.byte()? != BLOCK_TYPE {
            return Err(self.corrupt("unsupported block type"));
        }
        let model = Model::read(&mut self.input)?;
        if level == LEVEL_MODELED && !model.is_modeled() {
            return Err(self.corrupt("level 1 block without components"));
        }
        debug!("block at byte {start}: level {level}, {} components", model.components.len());

        let source = if model.is_modeled() {
            Source::Modeled { predictor: Predictor::new(&model, self.mode)?, decoder: Decoder::new() }
        } else {
            Source::Stored { left: 0 }
        };
        let post = PostProcessor::new(model.ph, model.pm, self.mode);
        self.block = Some(Block { model, source, post, synced: true });
        self.state = State::Segment;
        Ok(true)
    }

    /// Starts the next segment of the block, returning its name (empty
    /// when it continues the previous file). `None` at the end of the block.
    pub fn find_filename(&mut self) -> Result<Option<Vec<u8>>> {
        if self.state != State::Segment {
            return Ok(None);
        }
        match self.input.get()? {
            Some(SEGMENT_START) => {
                let name = self.string()?;
                self.state = State::Comment;
                debug!("segment '{}'", String::from_utf8_lossy(&name));
                Ok(Some(name))
            }
            Some(BLOCK_END) => {
                self.end_block();
                Ok(None)
            }
            None => {
                warn!("input ends inside a block");
                self.end_block();
                Ok(None)
            }
            Some(other) => {
                warn!("expected a segment at byte {}, found {other}", self.input.offset() - 1);
                self.end_block();
                Ok(None)
            }
        }
    }

    fn end_block(&mut self) {
        self.block = None;
        self.state = State::Block;
    }

    pub fn read_comment(&mut self) -> Result<Vec<u8>> {
        if self.state != State::Comment {
            return Err(misuse("comment read out of order"));
        }
        let comment = self.string()?;
        if self.byte()? != 0 {
            return Err(self.corrupt("reserved segment byte is not 0"));
        }
        self.state = State::Data;
        Ok(comment)
    }

    /// Decodes the rest of the segment into `out`
    pub fn decompress(&mut self, out: &mut impl ByteWrite) -> Result<()> {
        if self.state == State::Comment {
            self.read_comment()?;
        }
        if self.state != State::Data {
            return Err(misuse("no segment to decompress"));
        }
        let block = self.block.as_mut().ok_or_else(|| misuse("no block"))?;
        if !block.synced {
            return Err(Error::Corrupt {
                offset: self.input.offset(),
                reason: "segment depends on a skipped segment",
            });
        }

        let mut tee = Tee { out, hasher: &mut self.hasher };
        let mut coded = 0u64;
        loop {
            let byte = match &mut block.source {
                Source::Modeled { predictor, decoder } => {
                    decoder.decode_byte(&mut self.input, predictor).map_err(|err| err.at(self.input.offset()))?
                }
                Source::Stored { left } => stored_byte(&mut self.input, left)?,
            };
            block.post.write(byte, &mut tee, self.input.offset())?;
            if byte.is_none() {
                break;
            }
            coded += 1;
        }
        trace!("segment: {coded} bytes decoded, {} written", self.hasher.len());
        self.decoded = true;
        self.state = State::End;
        Ok(())
    }

    /// Moves past the data of the segment without producing output.
    /// Modeled data is scanned, not decoded, which leaves later segments
    /// of the block undecodable.
    pub fn skip(&mut self) -> Result<()> {
        if self.state == State::Comment {
            self.read_comment()?;
        }
        if self.state != State::Data {
            return Err(misuse("no segment to skip"));
        }
        let block = self.block.as_mut().ok_or_else(|| misuse("no block"))?;
        match &mut block.source {
            Source::Modeled { decoder, .. } => {
                // coded data never holds 4 zeros in a row, but may end in zeros
                let mut zeros = 0;
                loop {
                    let byte = self.input.get()?.ok_or(Error::UnexpectedEof { offset: self.input.offset() })?;
                    match byte {
                        0 => zeros += 1,
                        _ if zeros >= 4 => {
                            self.trailer = Some(byte);
                            break;
                        }
                        _ => zeros = 0,
                    }
                }
                *decoder = Decoder::new();
                block.synced = false;
            }
            Source::Stored { left } => {
                // still fed to the post-processor so later segments stay decodable
                let mut sink = Counter::default();
                loop {
                    let byte = stored_byte(&mut self.input, left)?;
                    block.post.write(byte, &mut sink, self.input.offset())?;
                    if byte.is_none() {
                        break;
                    }
                }
            }
        }
        self.decoded = false;
        self.state = State::End;
        Ok(())
    }

    /// Reads the segment trailer and checks the hash, if one was stored,
    /// against the decoded bytes.
    pub fn read_segment_end(&mut self) -> Result<SegmentCheck> {
        if matches!(self.state, State::Comment | State::Data) {
            self.skip()?;
        }
        if self.state != State::End {
            return Err(misuse("no segment to end"));
        }
        let marker = match self.trailer.take() {
            Some(byte) => byte,
            None => self.byte()?,
        };
        let actual = self.hasher.finish();
        let check = match marker {
            WITH_HASH => {
                let mut expected = Digest([0; 20]);
                for byte in expected.0.iter_mut() {
                    *byte = self.byte()?;
                }
                match self.decoded {
                    false => SegmentCheck::Skipped(expected),
                    true if expected == actual => SegmentCheck::Verified(actual),
                    true => {
                        warn!("segment hash mismatch: stored {expected}, decoded {actual}");
                        SegmentCheck::Mismatch { expected, actual }
                    }
                }
            }
            WITHOUT_HASH => SegmentCheck::Unchecked,
            _ => return Err(self.corrupt("bad segment trailer")),
        };
        self.decoded = false;
        self.state = State::Segment;
        Ok(check)
    }

    /// Walks every segment of every remaining block, skipping the data
    pub fn list(&mut self) -> Result<Vec<SegmentInfo>> {
        let mut segments = Vec::new();
        let mut block = 0;
        while self.find_block()? {
            while let Some(name) = self.find_filename()? {
                let comment = self.read_comment()?;
                self.skip()?;
                let check = self.read_segment_end()?;
                segments.push(SegmentInfo { block, name, comment, check });
            }
            block += 1;
        }
        Ok(segments)
    }
}

/// Next byte of a stored segment, `None` at its terminating empty chunk
fn stored_byte(input: &mut impl ByteRead, left: &mut u32) -> Result<Option<u8>> {
    let mut next = || input.get()?.ok_or(Error::UnexpectedEof { offset: input.offset() });
    if *left == 0 {
        *left = u32::from_be_bytes([next()?, next()?, next()?, next()?]);
        if *left == 0 {
            return Ok(None);
        }
    }
    *left -= 1;
    next().map(Some)
}
