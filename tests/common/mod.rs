/*
 * Inputs shared by the integration tests.
 */
#![allow(dead_code)]

use rand::{rngs::StdRng, Rng, SeedableRng};

pub const SEED: u64 = 0x5eed;

/// Words drawn from a small vocabulary, compressible by any model
pub fn text(len: usize, seed: u64) -> Vec<u8> {
    let words = ["context ", "mixing ", "model ", "predicts ", "the ", "next ", "bit ", "of ", "input.\n"];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        out.extend_from_slice(words[rng.gen_range(0..words.len())].as_bytes());
    }
    out.truncate(len);
    out
}

pub fn random(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Slowly rising bytes with a short periodic wobble
pub fn ramp(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i / 3 + (i % 7)) as u8).collect()
}

#[derive(Debug, Clone, Copy)]
pub enum Input {
    Empty,
    Byte,
    Text,
    Random,
    Zeros,
    Ramp,
}

impl Input {
    pub fn bytes(self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Byte => vec![0x7f],
            Self::Text => text(6000, SEED),
            Self::Random => random(3000, SEED),
            Self::Zeros => vec![0; 5000],
            Self::Ramp => ramp(4000),
        }
    }
}
