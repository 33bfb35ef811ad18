use super::{alloc, train, Component, Context};
use crate::{error::Result, tables::tables, u32};

/// Secondary estimation: refines an input probability by interpolating
/// between the two nearest of 33 buckets of a context-selected row.
pub struct Sse {
    cm: Vec<u32>,
    input: usize,
    limit: u32,
}

impl Sse {
    pub fn new(s: u8, j: u8, start: u8, limit: u8) -> Result<Self> {
        let t = tables();
        let mut cm = alloc("sse buckets", 32 << s, 0)?;
        for (i, cell) in cm.iter_mut().enumerate() {
            let p = u32!(t.squash((i & 31) as i32 * 64 - 992));
            *cell = (p << 17) | u32::from(start);
        }
        Ok(Self { cm, input: usize::from(j), limit: u32::from(limit) * 4 })
    }

    /// Lower bucket and interpolation weight (of 64) towards the upper one
    fn bucket(&self, cx: &Context) -> (usize, u32) {
        let row = cx.h.wrapping_add(cx.c8) as usize & (self.cm.len() / 32 - 1);
        let pq = (cx.p[self.input] + 992).clamp(0, 1983) as u32;
        (row * 32 + (pq >> 6) as usize, pq & 63)
    }
}

impl Component for Sse {
    fn predict(&self, cx: &Context) -> i32 {
        let (lo, wt) = self.bucket(cx);
        let p = ((self.cm[lo] >> 10) * (64 - wt) + (self.cm[lo + 1] >> 10) * wt) >> 13;
        tables().stretch(p)
    }

    fn update(&mut self, cx: &Context, _own: i32, bit: u32) {
        let (lo, wt) = self.bucket(cx);
        let nearest = lo + (wt >> 5) as usize;
        train(&mut self.cm[nearest], bit, self.limit);
    }
}
