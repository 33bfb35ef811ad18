use crate::{
    error::{ProgramKind, Result},
    io::ByteWrite,
    u16,
    vm::{ExecMode, Program, Vm},
    Error,
};

enum Stage {
    Type,
    LenLo,
    LenHi(u8),
    Code { len: usize, code: Vec<u8> },
    Pass,
    Program(Box<Vm>),
}

/// Turns decoded bytes into output. The first bytes of a block tell
/// whether they pass through or feed a program, and bring the program.
pub(crate) struct PostProcessor {
    stage: Stage,
    ph: u8,
    pm: u8,
    mode: ExecMode,
}

impl PostProcessor {
    pub fn new(ph: u8, pm: u8, mode: ExecMode) -> Self { Self { stage: Stage::Type, ph, pm, mode } }

    /// Handles one decoded byte, or the end of a segment as `None`
    pub fn write(&mut self, byte: Option<u8>, out: &mut impl ByteWrite, offset: u64) -> Result<()> {
        let corrupt = |reason| Error::Corrupt { offset, reason };
        match &mut self.stage {
            Stage::Program(vm) => {
                vm.run(byte.map_or(u32::MAX, u32::from)).map_err(|err| err.at(offset))?;
                vm.flush_output(out)?;
            }
            Stage::Pass => {
                if let Some(byte) = byte {
                    out.put(byte)?;
                }
            }
            _ if byte.is_none() => return Err(corrupt("segment ends inside the post-processing header")),
            Stage::Type => {
                self.stage = match byte {
                    Some(0) => Stage::Pass,
                    Some(1) => Stage::LenLo,
                    _ => return Err(corrupt("unknown post-processing type")),
                }
            }
            Stage::LenLo => self.stage = Stage::LenHi(byte.unwrap_or_default()),
            Stage::LenHi(lo) => {
                let len = usize::from(u16::from_le_bytes([*lo, byte.unwrap_or_default()]));
                if len == 0 {
                    return Err(corrupt("empty post-processing program"));
                }
                self.stage = Stage::Code { len, code: Vec::with_capacity(len) };
            }
            Stage::Code { len, code } => {
                code.push(byte.unwrap_or_default());
                if code.len() == *len {
                    let program = Program::new(std::mem::take(code))?;
                    let vm = Vm::new(ProgramKind::PostProcess, &program, self.ph, self.pm, self.mode)?;
                    self.stage = Stage::Program(Box::new(vm));
                }
            }
        }
        Ok(())
    }
}

/// Bytes that announce `program` at the start of a block's data
pub(crate) fn header(program: Option<&Program>) -> Vec<u8> {
    match program {
        None => vec![0],
        Some(program) => {
            let code = program.code();
            let mut header = Vec::with_capacity(code.len() + 3);
            header.push(1);
            header.extend_from_slice(&u16!(code.len()).to_le_bytes());
            header.extend_from_slice(code);
            header
        }
    }
}
