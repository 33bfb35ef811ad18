use super::{alloc, Component, Context};
use crate::{
    error::Result,
    tables::{clamp2k, clamp512k, tables},
    u16,
};

/// Fixed weighted average of two inputs
pub struct Avg {
    j: usize,
    k: usize,
    wt: i32,
}

impl Avg {
    pub fn new(j: u8, k: u8, wt: u8) -> Self {
        Self { j: usize::from(j), k: usize::from(k), wt: i32::from(wt) }
    }
}

impl Component for Avg {
    fn predict(&self, cx: &Context) -> i32 {
        (cx.p[self.j] * self.wt + cx.p[self.k] * (256 - self.wt)) >> 8
    }

    fn update(&mut self, _cx: &Context, _own: i32, _bit: u32) {}
}

/// Adaptive mix of two inputs, the weight (16 bit fraction) is selected by
/// the context hash plus the masked partial byte.
pub struct Mix2 {
    w: Vec<u16>,
    j: usize,
    k: usize,
    rate: i32,
    mask: u32,
    cxt: usize,
}

impl Mix2 {
    pub fn new(s: u8, j: u8, k: u8, rate: u8, mask: u8) -> Result<Self> {
        Ok(Self {
            w: alloc("mix2 weights", 1 << s, 1 << 15)?,
            j: usize::from(j),
            k: usize::from(k),
            rate: i32::from(rate),
            mask: u32::from(mask),
            cxt: 0,
        })
    }
}

impl Component for Mix2 {
    fn select(&mut self, cx: &Context) {
        self.cxt = cx.h.wrapping_add(cx.c8 & self.mask) as usize & (self.w.len() - 1);
    }

    fn predict(&self, cx: &Context) -> i32 {
        let w = i32::from(self.w[self.cxt]);
        clamp2k((w * cx.p[self.j] + (65536 - w) * cx.p[self.k]) >> 16)
    }

    fn update(&mut self, cx: &Context, own: i32, bit: u32) {
        let err = ((bit as i32 * 32767 - tables().squash(own)) * self.rate) >> 5;
        let w = i32::from(self.w[self.cxt]) + ((err * (cx.p[self.j] - cx.p[self.k]) + (1 << 12)) >> 13);
        self.w[self.cxt] = u16!(w.clamp(0, 65535));
    }
}

/// Adaptive mix of `m` consecutive inputs. Each weight set (16 bit fixed
/// point) is selected by the context hash plus the masked partial byte.
pub struct Mix {
    w: Vec<i32>,
    j: usize,
    m: usize,
    sets: usize,
    rate: i32,
    mask: u32,
    cxt: usize,
}

impl Mix {
    pub fn new(s: u8, j: u8, m: u8, rate: u8, mask: u8) -> Result<Self> {
        let m = usize::from(m);
        Ok(Self {
            w: alloc("mix weights", m << s, 65536 / m as i32)?,
            j: usize::from(j),
            m,
            sets: 1 << s,
            rate: i32::from(rate),
            mask: u32::from(mask),
            cxt: 0,
        })
    }

    pub fn weights(&self) -> &[i32] { &self.w[self.cxt..self.cxt + self.m] }
}

impl Component for Mix {
    fn select(&mut self, cx: &Context) {
        let set = cx.h.wrapping_add(cx.c8 & self.mask) as usize & (self.sets - 1);
        self.cxt = set * self.m;
    }

    fn predict(&self, cx: &Context) -> i32 {
        let inputs = &cx.p[self.j..self.j + self.m];
        let dot: i32 = self.weights().iter().zip(inputs).map(|(&w, &p)| (w >> 8) * p).sum();
        clamp2k(dot >> 8)
    }

    fn update(&mut self, cx: &Context, own: i32, bit: u32) {
        let err = ((bit as i32 * 32767 - tables().squash(own)) * self.rate) >> 4;
        let inputs = &cx.p[self.j..self.j + self.m];
        for (w, &p) in self.w[self.cxt..self.cxt + self.m].iter_mut().zip(inputs) {
            *w = clamp512k(*w + ((err * p + (1 << 12)) >> 13));
        }
    }
}
