use super::{alloc, Component, Context};
use crate::{error::Result, tables::tables};

const MAX_LEN: usize = 255;

/// Predicts the next bit of the longest recent match of the current
/// context, found through a hash of the context into the history buffer.
pub struct MatchModel {
    index: Vec<u32>, // context hash -> position after its last occurrence
    buf: Vec<u8>,
    ptr: usize,
    len: usize,
    offset: usize,
    bitpos: u32,
}

impl MatchModel {
    pub fn new(s: u8, b: u8) -> Result<Self> {
        let index = alloc("match index", 1 << s, 0)?;
        let mut buf = alloc("match buffer", 1 << b, 0)?;
        buf[0] = 1;
        Ok(Self { index, buf, ptr: 0, len: 0, offset: 0, bitpos: 0 })
    }

    pub fn match_len(&self) -> usize { self.len }

    #[inline(always)]
    fn mask(&self) -> usize { self.buf.len() - 1 }

    #[inline(always)]
    fn at(&self, back: usize) -> u8 { self.buf[self.ptr.wrapping_sub(back) & self.mask()] }

    fn expected_bit(&self) -> u32 {
        u32::from(self.at(self.offset) >> (7 - self.bitpos)) & 1
    }
}

impl Component for MatchModel {
    fn predict(&self, _cx: &Context) -> i32 {
        if self.len == 0 {
            return 0;
        }
        let t = tables();
        let sign = 1 - 2 * self.expected_bit() as i32;
        t.stretch((t.dt2k[self.len] * sign) as u32 & 32767)
    }

    fn update(&mut self, cx: &Context, _own: i32, bit: u32) {
        if self.len > 0 && self.expected_bit() != bit {
            self.len = 0;
        }
        let cur = &mut self.buf[self.ptr];
        *cur = cur.wrapping_mul(2).wrapping_add(bit as u8);

        self.bitpos += 1;
        if self.bitpos < 8 {
            return;
        }
        self.bitpos = 0;
        self.ptr = (self.ptr + 1) & self.mask();

        let slot = cx.h as usize & (self.index.len() - 1);
        if self.len == 0 {
            self.offset = self.ptr.wrapping_sub(self.index[slot] as usize);
            if self.offset & self.mask() != 0 {
                while self.len < MAX_LEN
                    && self.at(self.len + 1) == self.at(self.offset.wrapping_add(self.len + 1))
                {
                    self.len += 1;
                }
            }
        } else if self.len < MAX_LEN {
            self.len += 1;
        }
        self.index[slot] = self.ptr as u32;
    }
}
