//! Binary arithmetic coder. Probabilities are 16 bit with 1 for "one",
//! every byte is preceded by a "more data" flag coded with probability 0
//! and the segment ends with a flag of 1, which also flushes the coder.


use std::io;

use crate::{
    error::Result,
    io::{ByteRead, ByteWrite},
    predictor::Predictor,
    u8, unroll_for, Error,
};

/// Predicts bits one at a time, learning each after it is coded
pub trait BitModel {
    /// p(1) in 15 bits
    fn predict(&mut self) -> u16;
    fn update(&mut self, bit: u32) -> Result<()>;
}

impl BitModel for Predictor {
    #[inline]
    fn predict(&mut self) -> u16 { Predictor::predict(self) }
    #[inline]
    fn update(&mut self, bit: u32) -> Result<()> { Predictor::update(self, bit) }
}

#[inline(always)]
fn split(low: u32, high: u32, p: u32) -> u32 {
    low + ((u64::from(high - low) * u64::from(p)) >> 16) as u32
}

pub struct Encoder {
    low: u32,
    high: u32,
}

impl Default for Encoder {
    fn default() -> Self { Self::new() }
}

impl Encoder {
    pub fn new() -> Self { Self { low: 1, high: u32::MAX } }

    pub fn encode(&mut self, out: &mut impl ByteWrite, bit: u32, p: u32) -> io::Result<()> {
        let mid = split(self.low, self.high, p);
        if bit == 1 {
            self.high = mid;
        } else {
            self.low = mid + 1;
        }
        while (self.high ^ self.low) < 1 << 24 {
            out.put(u8!(self.high >> 24))?;
            self.high = self.high << 8 | 255;
            self.low <<= 8;
            self.low += u32::from(self.low == 0);
        }
        Ok(())
    }

    pub fn encode_byte(&mut self, out: &mut impl ByteWrite, model: &mut impl BitModel, byte: u8) -> Result<()> {
        self.encode(out, 0, 0)?;
        unroll_for!(bit in byte, {
            let p = u32::from(model.predict()) * 2 + 1;
            self.encode(out, u32::from(bit), p)?;
            model.update(u32::from(bit))?;
        });
        Ok(())
    }

    /// Codes the end flag, which flushes the range, and restarts the
    /// coder for another segment
    pub fn finish(&mut self, out: &mut impl ByteWrite) -> io::Result<()> {
        self.encode(out, 1, 0)?;
        *self = Self::new();
        Ok(())
    }
}

pub struct Decoder {
    low: u32,
    high: u32,
    /// Coded bits in the window, 0 before the first byte of a segment
    curr: u32,
}

impl Default for Decoder {
    fn default() -> Self { Self::new() }
}

fn next(input: &mut impl ByteRead) -> Result<u8> {
    input.get()?.ok_or(Error::UnexpectedEof { offset: input.offset() })
}

impl Decoder {
    pub fn new() -> Self { Self { low: 1, high: u32::MAX, curr: 0 } }

    pub fn decode(&mut self, input: &mut impl ByteRead, p: u32) -> Result<u32> {
        let mid = split(self.low, self.high, p);
        let bit = if self.curr <= mid {
            self.high = mid;
            1
        } else {
            self.low = mid + 1;
            0
        };
        while (self.high ^ self.low) < 1 << 24 {
            self.high = self.high << 8 | 255;
            self.low <<= 8;
            self.low += u32::from(self.low == 0);
            self.curr = self.curr << 8 | u32::from(next(input)?);
        }
        Ok(bit)
    }

    /// Next byte of the segment, `None` after its last one
    pub fn decode_byte(&mut self, input: &mut impl ByteRead, model: &mut impl BitModel) -> Result<Option<u8>> {
        if self.curr == 0 {
            for _ in 0..4 {
                self.curr = self.curr << 8 | u32::from(next(input)?);
            }
        }
        if self.decode(input, 0)? == 1 {
            // the 4 zero bytes ending a segment were pulled into the window
            if self.curr != 0 {
                return Err(Error::Corrupt { offset: input.offset(), reason: "bad end of segment" });
            }
            *self = Self::new();
            return Ok(None);
        }

        let mut c8 = 1;
        while c8 < 256 {
            let p = u32::from(model.predict()) * 2 + 1;
            let bit = self.decode(input, p)?;
            model.update(bit)?;
            c8 = c8 * 2 + bit;
        }
        Ok(Some(u8!(c8 - 256)))
    }
}
