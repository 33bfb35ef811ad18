use std::{fmt, str::FromStr};

use log::debug;

use crate::{
    error::Result,
    io::ByteRead,
    u16, u8,
    vm::Program,
    Error,
};

/// Encoded size of each component kind, type byte included
pub const COMPONENT_SIZE: [usize; 10] = [0, 2, 3, 2, 3, 4, 6, 6, 3, 5];

/// Largest allocation a model may ask for, per table
pub const MAX_TABLE_BYTES: u64 = 1 << 32;

/// One component as described by the block header. `j`, `k` name the
/// components whose predictions are used as inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentSpec {
    Const { c: u8 },
    Cm { s: u8, limit: u8 },
    Icm { s: u8 },
    Match { s: u8, b: u8 },
    Avg { j: u8, k: u8, wt: u8 },
    Mix2 { s: u8, j: u8, k: u8, rate: u8, mask: u8 },
    Mix { s: u8, j: u8, m: u8, rate: u8, mask: u8 },
    Isse { s: u8, j: u8 },
    Sse { s: u8, j: u8, start: u8, limit: u8 },
}

impl ComponentSpec {
    pub const NAMES: [&'static str; 10] = ["", "const", "cm", "icm", "match", "avg", "mix2", "mix", "isse", "sse"];

    pub fn kind(&self) -> u8 {
        match self {
            Self::Const { .. } => 1,
            Self::Cm { .. } => 2,
            Self::Icm { .. } => 3,
            Self::Match { .. } => 4,
            Self::Avg { .. } => 5,
            Self::Mix2 { .. } => 6,
            Self::Mix { .. } => 7,
            Self::Isse { .. } => 8,
            Self::Sse { .. } => 9,
        }
    }

    pub fn name(&self) -> &'static str { Self::NAMES[usize::from(self.kind())] }

    pub fn args(&self) -> Vec<u8> {
        match *self {
            Self::Const { c } => vec![c],
            Self::Cm { s, limit } => vec![s, limit],
            Self::Icm { s } => vec![s],
            Self::Match { s, b } => vec![s, b],
            Self::Avg { j, k, wt } => vec![j, k, wt],
            Self::Mix2 { s, j, k, rate, mask } => vec![s, j, k, rate, mask],
            Self::Mix { s, j, m, rate, mask } => vec![s, j, m, rate, mask],
            Self::Isse { s, j } => vec![s, j],
            Self::Sse { s, j, start, limit } => vec![s, j, start, limit],
        }
    }

    /// Builds a component from its type byte and arguments
    pub fn from_parts(kind: u8, args: &[u8]) -> Option<Self> {
        let size = *COMPONENT_SIZE.get(usize::from(kind))?;
        if size == 0 || args.len() != size - 1 {
            return None;
        }
        let spec = match (kind, args) {
            (1, &[c]) => Self::Const { c },
            (2, &[s, limit]) => Self::Cm { s, limit },
            (3, &[s]) => Self::Icm { s },
            (4, &[s, b]) => Self::Match { s, b },
            (5, &[j, k, wt]) => Self::Avg { j, k, wt },
            (6, &[s, j, k, rate, mask]) => Self::Mix2 { s, j, k, rate, mask },
            (7, &[s, j, m, rate, mask]) => Self::Mix { s, j, m, rate, mask },
            (8, &[s, j]) => Self::Isse { s, j },
            (9, &[s, j, start, limit]) => Self::Sse { s, j, start, limit },
            _ => return None,
        };
        Some(spec)
    }

    /// Checks inputs refer to earlier components and tables are allocatable
    fn validate(&self, index: usize) -> std::result::Result<(), String> {
        let earlier = |j: u8| {
            if usize::from(j) < index {
                Ok(())
            } else {
                Err(format!("component {index} reads component {j}, which is not before it"))
            }
        };
        let table = |bits: u8, entry: u64| {
            let bytes = 1u64.checked_shl(u32::from(bits)).and_then(|n| n.checked_mul(entry));
            match bytes {
                Some(bytes) if bytes <= MAX_TABLE_BYTES => Ok(()),
                _ => Err(format!("component {index} table of 2^{bits} x {entry} bytes is too large")),
            }
        };

        match *self {
            Self::Const { .. } => Ok(()),
            Self::Cm { s, .. } => table(s, 4),
            Self::Icm { s } => table(s, 64),
            Self::Match { s, b } => table(s, 4).and(table(b, 1)),
            Self::Avg { j, k, .. } => earlier(j).and(earlier(k)),
            Self::Mix2 { s, j, k, .. } => table(s, 2).and(earlier(j)).and(earlier(k)),
            Self::Mix { s, j, m, .. } => {
                if m == 0 || usize::from(j) + usize::from(m) > index {
                    return Err(format!("component {index} mixes {m} inputs from {j}, not all before it"));
                }
                table(s, 4 * u64::from(m))
            }
            Self::Isse { s, j } => table(s, 64).and(earlier(j)),
            Self::Sse { s, j, .. } => table(s, 128).and(earlier(j)),
        }
    }
}

/// Everything a block header describes: the component network, the
/// context program and the memory sizes of both programs. The
/// post-processing program itself travels at the start of the first
/// segment, it is kept here for the compressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// log2 of the context program's word (H) and byte (M) memory
    pub hh: u8,
    pub hm: u8,
    /// Same for the post-processing program
    pub ph: u8,
    pub pm: u8,
    pub components: Vec<ComponentSpec>,
    pub hcomp: Program,
    pub pcomp: Option<Program>,
}

impl Model {
    pub fn new(hh: u8, hm: u8, components: Vec<ComponentSpec>, hcomp: Program) -> Result<Self> {
        let model = Self { hh, hm, ph: 0, pm: 0, components, hcomp, pcomp: None };
        model.validate()?;
        Ok(model)
    }

    /// Components present. Without any, data is stored uncoded.
    pub fn is_modeled(&self) -> bool { !self.components.is_empty() }

    pub fn with_pcomp(mut self, pcomp: Option<Program>, ph: u8, pm: u8) -> Self {
        self.pcomp = pcomp;
        self.ph = ph;
        self.pm = pm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, bits) in [("hh", self.hh), ("hm", self.hm), ("ph", self.ph), ("pm", self.pm)] {
            if bits > 30 {
                return Err(Error::invalid_model(0, format!("{name} = {bits} exceeds 30")));
            }
        }
        if self.components.len() > 255 {
            return Err(Error::invalid_model(6, "more than 255 components"));
        }
        let mut offset = 7;
        for (i, spec) in self.components.iter().enumerate() {
            spec.validate(i).map_err(|reason| Error::invalid_model(offset, reason))?;
            offset += COMPONENT_SIZE[usize::from(spec.kind())];
        }
        if offset - 1 + self.hcomp.len() > usize::from(u16::MAX) {
            return Err(Error::invalid_model(0, "header longer than 65535 bytes"));
        }
        if self.pcomp.as_ref().is_some_and(|p| p.len() > usize::from(u16::MAX)) {
            return Err(Error::invalid_model(0, "post-processing program longer than 65535 bytes"));
        }
        Ok(())
    }

    /// Header bytes: `hsize, hh, hm, ph, pm, n, components, 0, hcomp`,
    /// where `hsize` (u16 LE) counts everything after itself.
    pub fn header(&self) -> Vec<u8> {
        let mut body = vec![self.hh, self.hm, self.ph, self.pm, u8!(self.components.len())];
        for spec in &self.components {
            body.push(spec.kind());
            body.extend(spec.args());
        }
        body.push(0);
        body.extend_from_slice(self.hcomp.code());

        let mut header = Vec::with_capacity(body.len() + 2);
        header.extend_from_slice(&u16!(body.len()).to_le_bytes());
        header.extend(body);
        header
    }

    pub fn from_header(bytes: &[u8]) -> Result<Self> {
        let mut reader = crate::io::SliceReader::new(bytes);
        Self::read(&mut reader)
    }

    /// Reads and validates a header
    pub fn read(input: &mut impl ByteRead) -> Result<Self> {
        let start = input.offset();
        let mut next = || -> Result<u8> {
            input.get()?.ok_or(Error::UnexpectedEof { offset: input.offset() })
        };

        let hsize = usize::from(u16::from_le_bytes([next()?, next()?]));
        let mut body = Vec::with_capacity(hsize);
        for _ in 0..hsize {
            body.push(next()?);
        }
        let invalid = |at: usize, reason: &str| Error::invalid_model(at + 2, reason);
        let &[hh, hm, ph, pm, n, ..] = body.as_slice() else {
            return Err(invalid(hsize, "header too short"));
        };

        let mut pos = 5;
        let mut components = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            let kind = *body.get(pos).ok_or_else(|| invalid(pos, "header ends in component list"))?;
            let size = COMPONENT_SIZE.get(usize::from(kind)).copied().unwrap_or(0);
            if size == 0 {
                return Err(invalid(pos, &format!("unknown component type {kind}")));
            }
            let args = body
                .get(pos + 1..pos + size)
                .ok_or_else(|| invalid(pos, "header ends in component list"))?;
            let spec = ComponentSpec::from_parts(kind, args).ok_or_else(|| invalid(pos, "bad component"))?;
            components.push(spec);
            pos += size;
        }
        if body.get(pos) != Some(&0) {
            return Err(invalid(pos, "missing end of component list"));
        }

        let hcomp = Program::new(body[pos + 1..].to_vec()).map_err(|err| match err {
            Error::InvalidModel { offset, reason } => Error::invalid_model(offset + pos + 3, reason),
            other => other,
        })?;
        let model = Self { hh, hm, ph, pm, components, hcomp, pcomp: None };
        model.validate()?;
        debug!(
            "model at byte {start}: {} components, hcomp {} bytes, H 2^{hh} M 2^{hm}",
            model.components.len(),
            model.hcomp.len(),
        );
        Ok(model)
    }
}

/// Builtin models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    /// order 2 ICM into an order 4 ISSE
    Fast,
    /// order 0-5 ICM/ISSE chain, match model and mixer
    #[default]
    Mid,
    /// chain up to order 6, word and sparse contexts, two mixer layers and SSE
    Max,
}

const MODEL_FAST: &[u8] = &[
    26, 0, 1, 2, 0, 0, 2, 3, 16, 8, 19, 0, 0, 96, 4, 28, 59, 10, 59, 112, 25, 10, 59, 10, 59, 112, 56, 0,
];

const MODEL_MID: &[u8] = &[
    69, 0, 3, 3, 0, 0, 8, 3, 5, 8, 13, 0, 8, 17, 1, 8, 18, 2, 8, 18, 3, 8, 19, 4, 4, 22, 24, 7, 16, 0, 7, 24,
    255, 0, 17, 104, 74, 4, 95, 1, 59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10,
    25, 59, 10, 59, 112, 25, 69, 207, 8, 112, 56, 0,
];

const MODEL_MAX: &[u8] = &[
    196, 0, 5, 9, 0, 0, 22, 1, 160, 3, 5, 8, 13, 1, 8, 16, 2, 8, 18, 3, 8, 19, 4, 8, 19, 5, 8, 20, 6, 4, 22, 24,
    3, 17, 8, 19, 9, 3, 13, 3, 13, 3, 13, 3, 14, 7, 16, 0, 15, 24, 255, 7, 8, 0, 16, 10, 255, 6, 0, 15, 16, 24, 0,
    9, 8, 17, 32, 255, 6, 8, 17, 18, 16, 255, 9, 16, 19, 32, 255, 6, 0, 19, 20, 16, 0, 0, 17, 104, 74, 4, 95, 2,
    59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10, 25, 59, 10, 59, 112, 10, 25,
    59, 112, 10, 25, 69, 183, 32, 239, 64, 47, 14, 231, 91, 47, 10, 25, 60, 26, 48, 134, 151, 20, 112, 63, 9, 70,
    223, 0, 39, 3, 25, 112, 26, 52, 25, 25, 74, 10, 4, 59, 112, 25, 10, 4, 59, 112, 25, 10, 4, 59, 112, 25, 65,
    143, 212, 72, 4, 59, 112, 8, 143, 216, 8, 68, 175, 60, 60, 25, 69, 207, 9, 112, 25, 25, 25, 25, 25, 112, 56, 0,
];

impl Level {
    pub const ALL: [Level; 3] = [Level::Fast, Level::Mid, Level::Max];

    pub fn header(self) -> &'static [u8] {
        match self {
            Self::Fast => MODEL_FAST,
            Self::Mid => MODEL_MID,
            Self::Max => MODEL_MAX,
        }
    }

    pub fn model(self) -> Model {
        match Model::from_header(self.header()) {
            Ok(model) => model,
            Err(err) => unreachable!("builtin {self} model is invalid: {err}"),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => f.write_str("fast"),
            Self::Mid => f.write_str("mid"),
            Self::Max => f.write_str("max"),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "fast" => Ok(Self::Fast),
            "2" | "mid" => Ok(Self::Mid),
            "3" | "max" => Ok(Self::Max),
            other => Err(format!("unknown level '{other}', expected 1-3 or fast, mid, max")),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Level::Fast, 2)]
    #[case(Level::Mid, 8)]
    #[case(Level::Max, 22)]
    fn presets_load_and_reencode(#[case] level: Level, #[case] n: usize) {
        let model = level.model();
        assert_eq!(model.components.len(), n);
        assert_eq!(model.header(), level.header());
    }

    #[test]
    fn fast_preset_components() {
        let model = Level::Fast.model();
        assert_eq!(
            model.components,
            [ComponentSpec::Icm { s: 16 }, ComponentSpec::Isse { s: 19, j: 0 }]
        );
        assert_eq!((model.hh, model.hm), (1, 2));
    }

    #[test]
    fn rejects_forward_inputs() {
        // avg reads component 1 from component 0
        let body = [0, 0, 0, 0, 1, 5, 1, 0, 128, 0, 56, 0];
        let mut header = vec![body.len() as u8, 0];
        header.extend(body);
        let err = Model::from_header(&header).unwrap_err();
        assert!(matches!(err, Error::InvalidModel { offset: 7, .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_component() {
        let body = [0, 0, 0, 0, 1, 12, 0, 56, 0];
        let mut header = vec![body.len() as u8, 0];
        header.extend(body);
        assert!(matches!(Model::from_header(&header), Err(Error::InvalidModel { .. })));
    }

    #[test]
    fn rejects_oversized_tables() {
        // cm with 2^40 counters
        let body = [0, 0, 0, 0, 1, 2, 40, 255, 0, 56, 0];
        let mut header = vec![body.len() as u8, 0];
        header.extend(body);
        assert!(matches!(Model::from_header(&header), Err(Error::InvalidModel { .. })));
    }

    #[test]
    fn truncated_header_is_eof() {
        let header = &Level::Mid.header()[..20];
        assert!(matches!(Model::from_header(header), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn level_names() {
        assert_eq!("2".parse::<Level>(), Ok(Level::Mid));
        assert_eq!("MAX".parse::<Level>(), Ok(Level::Max));
        assert!("4".parse::<Level>().is_err());
        assert_eq!(Level::Fast.to_string(), "fast");
    }
}
