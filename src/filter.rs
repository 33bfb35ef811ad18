use std::{fmt, str::FromStr};

use crate::vm::Program;

/// Reversible transform applied before modeling. The decoder undoes it
/// with the post-processing program the block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    None,
    /// Replaces each byte with its difference to the previous one
    Delta,
}

// a> 255 if halt endif a+=c a&= 255 out c=a halt
const DELTA_INVERSE: &[u8] = &[239, 255, 47, 1, 56, 130, 175, 255, 57, 80, 56, 0];

impl Filter {
    /// The program inverting the filter, `None` when decoding passes
    /// bytes through
    pub fn program(self) -> Option<Program> {
        match self {
            Self::None => None,
            Self::Delta => Program::new(DELTA_INVERSE.to_vec()).ok(),
        }
    }

    /// Log2 sizes of the word and byte memories the inverse needs
    pub fn memory(self) -> (u8, u8) { (0, 0) }

    pub fn encoder(self) -> FilterState { FilterState { filter: self, prev: 0 } }
}

/// Running state of a filter across the segments of a block
#[derive(Debug, Clone)]
pub struct FilterState {
    filter: Filter,
    prev: u8,
}

impl FilterState {
    pub fn apply(&mut self, data: &[u8], out: &mut Vec<u8>) {
        match self.filter {
            Filter::None => out.extend_from_slice(data),
            Filter::Delta => out.extend(data.iter().map(|&x| {
                let d = x.wrapping_sub(self.prev);
                self.prev = x;
                d
            })),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Delta => f.write_str("delta"),
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "delta" => Ok(Self::Delta),
            other => Err(format!("unknown filter '{other}', expected none or delta")),
        }
    }
}
