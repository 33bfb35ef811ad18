use super::{alloc, Component, Context};
use crate::{
    error::Result,
    state_table::StateTable,
    tables::{clamp2k, clamp512k, tables},
    u8,
};

/// Hashed table of 16-byte buckets: a check byte followed by the bit
/// history states of one nibble (15 nodes of the nibble tree).
struct HistoryTable {
    ht: Vec<u8>,
    bits: u32,
    bucket: usize,
    slot: usize,
}

impl HistoryTable {
    fn new(s: u8) -> Result<Self> {
        let ht = alloc("bit history buckets", 64 << s, 0)?;
        Ok(Self { ht, bits: u32::from(s) + 2, bucket: 0, slot: 0 })
    }

    /// Claims a bucket at nibble boundaries, then picks the state for the bit
    fn select(&mut self, cx: &Context) {
        if cx.c8 == 1 || (cx.c8 & 0xf0) == 16 {
            self.bucket = self.find(cx.h.wrapping_add(cx.c8 * 16));
        }
        self.slot = self.bucket + (cx.hmap4 & 15) as usize;
    }

    #[inline(always)]
    fn state(&self) -> u8 { self.ht[self.slot] }

    fn set_state(&mut self, state: u8) { self.ht[self.slot] = state; }

    /// Probes 3 adjacent buckets for the check byte, replacing the one whose
    /// first state has the smallest count when none matches.
    fn find(&mut self, cxt: u32) -> usize {
        let chk = u8!((cxt >> self.bits) & 255);
        let h0 = cxt.wrapping_mul(16) as usize & (self.ht.len() - 16);
        let candidates = [h0, h0 ^ 16, h0 ^ 32];
        if let Some(&hit) = candidates.iter().find(|&&b| self.ht[b] == chk) {
            return hit;
        }

        let [b0, b1, b2] = candidates.map(|b| self.ht[b + 1]);
        let victim = if b0 <= b1 && b0 <= b2 {
            h0
        } else if b1 < b2 {
            h0 ^ 16
        } else {
            h0 ^ 32
        };
        self.ht[victim..victim + 16].fill(0);
        self.ht[victim] = chk;
        victim
    }
}

/// Indirect context model: context -> bit history -> adaptive probability
pub struct Icm {
    history: HistoryTable,
    cm: Vec<u32>,
}

impl Icm {
    pub fn new(s: u8) -> Result<Self> {
        let st = StateTable::get();
        let cm = (0..=255).map(|state| st.cminit(state)).collect();
        Ok(Self { history: HistoryTable::new(s)?, cm })
    }
}

impl Component for Icm {
    fn select(&mut self, cx: &Context) { self.history.select(cx) }

    fn predict(&self, _cx: &Context) -> i32 {
        let state = self.history.state();
        tables().stretch(self.cm[usize::from(state)] >> 8)
    }

    fn update(&mut self, _cx: &Context, _own: i32, bit: u32) {
        let state = self.history.state();
        self.history.set_state(StateTable::get().next(state, bit));
        let pn = &mut self.cm[usize::from(state)];
        let err = bit as i32 * 32767 - (*pn >> 8) as i32;
        *pn = pn.wrapping_add((err >> 2) as u32);
    }
}

/// Indirect secondary estimation: the bit history of the context selects
/// a weight pair that adjusts the prediction of an earlier component.
pub struct Isse {
    history: HistoryTable,
    w: Vec<[i32; 2]>,
    input: usize,
}

impl Isse {
    pub fn new(s: u8, j: u8) -> Result<Self> {
        let st = StateTable::get();
        let t = tables();
        let w = (0..=255)
            .map(|state| [1 << 15, clamp512k(t.stretch(st.cminit(state) >> 8) * 1024)])
            .collect();
        Ok(Self { history: HistoryTable::new(s)?, w, input: usize::from(j) })
    }
}

impl Component for Isse {
    fn select(&mut self, cx: &Context) { self.history.select(cx) }

    fn predict(&self, cx: &Context) -> i32 {
        let [w0, w1] = self.w[usize::from(self.history.state())];
        clamp2k((w0 * cx.p[self.input] + w1 * 64) >> 16)
    }

    fn update(&mut self, cx: &Context, own: i32, bit: u32) {
        let state = self.history.state();
        let err = bit as i32 * 32767 - tables().squash(own);
        let w = &mut self.w[usize::from(state)];
        w[0] = clamp512k(w[0] + ((err * cx.p[self.input] + (1 << 12)) >> 13));
        w[1] = clamp512k(w[1] + ((err + 16) >> 5));
        self.history.set_state(StateTable::get().next(state, bit));
    }
}
