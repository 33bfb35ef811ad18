use super::{alloc, train, Component, Context};
use crate::{error::Result, tables::tables};

/// Fixed prediction
pub struct Const {
    p: i32,
}

impl Const {
    pub fn new(c: u8) -> Self { Self { p: (i32::from(c) - 128) * 4 } }
}

impl Component for Const {
    fn predict(&self, _cx: &Context) -> i32 { self.p }
    fn update(&mut self, _cx: &Context, _own: i32, _bit: u32) {}
}

/// Direct context model: the context hash, combined with the bits of the
/// current byte, selects one adaptive counter.
pub struct Cm {
    cm: Vec<u32>,
    limit: u32,
    cxt: usize,
}

impl Cm {
    pub fn new(s: u8, limit: u8) -> Result<Self> {
        let cm = alloc("cm counters", 1 << s, 0x8000_0000)?;
        Ok(Self { cm, limit: u32::from(limit) * 4, cxt: 0 })
    }
}

impl Component for Cm {
    fn select(&mut self, cx: &Context) {
        self.cxt = (cx.h ^ cx.hmap4) as usize & (self.cm.len() - 1);
    }

    fn predict(&self, _cx: &Context) -> i32 { tables().stretch(self.cm[self.cxt] >> 17) }

    fn update(&mut self, _cx: &Context, _own: i32, bit: u32) {
        train(&mut self.cm[self.cxt], bit, self.limit);
    }
}
