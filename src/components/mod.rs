mod direct;
mod indirect;
mod match_model;
mod mixer;
mod sse;


use std::mem::size_of;

pub use direct::{Cm, Const};
pub use indirect::{Icm, Isse};
pub use match_model::MatchModel;
pub use mixer::{Avg, Mix, Mix2};
pub use sse::Sse;

use crate::{error::Result, model::ComponentSpec, tables::tables, Error};

/// What a component sees while coding one bit
#[derive(Clone, Copy)]
pub struct Context<'a> {
    /// Hash the context program left for this component
    pub h: u32,
    /// Bits of the current byte seen so far, with a leading 1
    pub c8: u32,
    /// Nibble tree index, the first nibble's bits are kept during the second
    pub hmap4: u32,
    /// Predictions (stretched) of the components before this one
    pub p: &'a [i32],
}

pub trait Component {
    /// Points the component at the table cells used for the next bit.
    /// Runs at load and after every update. Hashed tables claim buckets here.
    fn select(&mut self, _cx: &Context) {}

    /// Stretched probability of a one, in [-2047, 2047].
    fn predict(&self, cx: &Context) -> i32;

    /// Learns `bit`. `own` is what `predict` returned for it.
    fn update(&mut self, cx: &Context, own: i32, bit: u32);
}

/// One node of the predictor network
pub enum Node {
    Const(Const),
    Cm(Cm),
    Icm(Icm),
    Match(MatchModel),
    Avg(Avg),
    Mix2(Mix2),
    Mix(Mix),
    Isse(Isse),
    Sse(Sse),
}

impl Node {
    pub fn new(spec: &ComponentSpec) -> Result<Self> {
        let node = match *spec {
            ComponentSpec::Const { c } => Self::Const(Const::new(c)),
            ComponentSpec::Cm { s, limit } => Self::Cm(Cm::new(s, limit)?),
            ComponentSpec::Icm { s } => Self::Icm(Icm::new(s)?),
            ComponentSpec::Match { s, b } => Self::Match(MatchModel::new(s, b)?),
            ComponentSpec::Avg { j, k, wt } => Self::Avg(Avg::new(j, k, wt)),
            ComponentSpec::Mix2 { s, j, k, rate, mask } => Self::Mix2(Mix2::new(s, j, k, rate, mask)?),
            ComponentSpec::Mix { s, j, m, rate, mask } => Self::Mix(Mix::new(s, j, m, rate, mask)?),
            ComponentSpec::Isse { s, j } => Self::Isse(Isse::new(s, j)?),
            ComponentSpec::Sse { s, j, start, limit } => Self::Sse(Sse::new(s, j, start, limit)?),
        };
        Ok(node)
    }
}

// static dispatch over the closed set of kinds
macro_rules! dispatch {
    ($node:expr, $c:ident => $call:expr) => {
        match $node {
            Node::Const($c) => $call,
            Node::Cm($c) => $call,
            Node::Icm($c) => $call,
            Node::Match($c) => $call,
            Node::Avg($c) => $call,
            Node::Mix2($c) => $call,
            Node::Mix($c) => $call,
            Node::Isse($c) => $call,
            Node::Sse($c) => $call,
        }
    };
}

impl Component for Node {
    #[inline]
    fn select(&mut self, cx: &Context) { dispatch!(self, c => c.select(cx)) }
    #[inline]
    fn predict(&self, cx: &Context) -> i32 { dispatch!(self, c => c.predict(cx)) }
    #[inline]
    fn update(&mut self, cx: &Context, own: i32, bit: u32) { dispatch!(self, c => c.update(cx, own, bit)) }
}

/// Allocates a model table, reporting failure instead of aborting
pub(crate) fn alloc<T: Clone>(table: &'static str, len: usize, fill: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| Error::Alloc { table, bytes: len.saturating_mul(size_of::<T>()) })?;
    v.resize(len, fill);
    Ok(v)
}

/// Adaptive probability counter: high 22 bits are p(1), low 10 bits a hit
/// count that slows adaptation down until it reaches `limit`.
#[inline(always)]
pub(crate) fn train(cell: &mut u32, bit: u32, limit: u32) {
    let count = *cell & 0x3ff;
    let err = bit as i32 * 32767 - (*cell >> 17) as i32;
    let step = err.wrapping_mul(tables().dt[count as usize]) & -1024;
    *cell = cell.wrapping_add(step as u32).wrapping_add(u32::from(count < limit));
}
