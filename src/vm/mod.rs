mod compiled;
mod interpreter;
pub mod opcode;

#[cfg(test)]
mod tests;

use std::io;

use log::{debug, warn};

use crate::{
    components::alloc,
    error::{Fault, ProgramKind, Result},
    io::ByteWrite,
    Error,
};
use compiled::Compiled;
pub use opcode::{decode, AluOp, CmpOp, Insn, Listed, Operand};

/// Max nesting of `call`
pub const STACK_DEPTH: usize = 32;

/// How programs are executed. Both strategies give identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Decode every instruction as it is reached
    Interpret,
    /// Decode once into an instruction array with resolved jump targets,
    /// falling back to `Interpret` when that is impossible
    #[default]
    Translate,
}

/// Validated program bytes, including the terminating 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    code: Vec<u8>,
}

impl Default for Program {
    fn default() -> Self { Self { code: vec![0] } }
}

impl Program {
    /// Checks that the bytes decode, front to back, into defined
    /// instructions ending with a lone 0, and that every jump stays inside.
    pub fn new(code: Vec<u8>) -> Result<Self> {
        let invalid = |at: usize, reason: &str| Error::invalid_model(at, format!("program: {reason}"));
        if code.last() != Some(&0) {
            return Err(invalid(code.len(), "missing terminating 0"));
        }

        let mut pc = 0;
        let mut last = 0;
        while pc < code.len() {
            let (insn, next) = decode(&code, pc).map_err(|fault| match fault {
                Fault::UndefinedOpcode(op) => invalid(pc, &format!("undefined opcode {op}")),
                _ => invalid(pc, "truncated instruction"),
            })?;
            if insn.target().is_some_and(|t| t >= code.len()) {
                return Err(invalid(pc, "jump target outside program"));
            }
            last = pc;
            pc = next;
        }
        if last != code.len() - 1 {
            return Err(invalid(last, "terminating 0 is an operand"));
        }
        Ok(Self { code })
    }

    pub fn code(&self) -> &[u8] { &self.code }

    /// Encoded size, terminator included
    pub fn len(&self) -> usize { self.code.len() }

    /// Nothing but the terminator. Running it does nothing.
    pub fn is_empty(&self) -> bool { self.code.len() == 1 }

    pub fn listing(&self) -> impl Iterator<Item = Listed> + '_ {
        let mut pc = 0;
        std::iter::from_fn(move || {
            let (insn, next) = decode(&self.code, pc).ok()?;
            let listed = Listed { pc, next, insn };
            pc = next;
            Some(listed)
        })
    }

    /// One instruction per line, terminator excluded
    pub fn disassemble(&self) -> String {
        let lines: Vec<String> = self
            .listing()
            .filter(|l| l.next < self.code.len() || l.insn != Insn::Error)
            .map(|l| format!("({:4}) {l}", l.pc))
            .collect();
        lines.join("\n")
    }
}

/// Control transfer requested by an instruction
pub(crate) enum Flow {
    Next,
    Jump(usize),
    Call(usize),
    Ret,
    Halt,
}

/// Registers and memory. All of it persists between runs of a program.
pub struct Machine {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
    pub f: bool,
    pub r: [u32; 256],
    pub m: Vec<u8>,
    pub h: Vec<u32>,
    stack: Vec<usize>,
    out: Vec<u8>,
}

impl Machine {
    pub fn new(hbits: u8, mbits: u8) -> Result<Self> {
        Ok(Self {
            a: 0,
            b: 0,
            c: 0,
            d: 0,
            f: false,
            r: [0; 256],
            m: alloc("program byte memory", 1 << mbits, 0)?,
            h: alloc("program word memory", 1 << hbits, 0)?,
            stack: Vec::with_capacity(STACK_DEPTH),
            out: Vec::new(),
        })
    }

    #[inline(always)]
    fn get(&self, x: Operand) -> u32 {
        match x {
            Operand::A => self.a,
            Operand::B => self.b,
            Operand::C => self.c,
            Operand::D => self.d,
            Operand::Mb => u32::from(self.m[self.b as usize & (self.m.len() - 1)]),
            Operand::Mc => u32::from(self.m[self.c as usize & (self.m.len() - 1)]),
            Operand::Hd => self.h[self.d as usize & (self.h.len() - 1)],
            Operand::Imm(n) => u32::from(n),
        }
    }

    #[inline(always)]
    fn set(&mut self, x: Operand, v: u32) {
        let (mmask, hmask) = (self.m.len() - 1, self.h.len() - 1);
        match x {
            Operand::A => self.a = v,
            Operand::B => self.b = v,
            Operand::C => self.c = v,
            Operand::D => self.d = v,
            Operand::Mb => self.m[self.b as usize & mmask] = v as u8,
            Operand::Mc => self.m[self.c as usize & mmask] = v as u8,
            Operand::Hd => self.h[self.d as usize & hmask] = v,
            Operand::Imm(_) => {} // never decoded as a destination
        }
    }

    #[inline]
    pub(crate) fn execute(&mut self, insn: Insn) -> std::result::Result<Flow, Fault> {
        match insn {
            Insn::Error => return Err(Fault::ErrorInstruction),
            Insn::Halt => return Ok(Flow::Halt),
            Insn::Out => self.out.push(self.a as u8),
            Insn::Hash => {
                let x = self.get(Operand::Mb);
                self.a = self.a.wrapping_add(x).wrapping_add(512).wrapping_mul(773);
            }
            Insn::HashD => {
                let x = self.get(Operand::Hd).wrapping_add(self.a).wrapping_add(512);
                self.set(Operand::Hd, x.wrapping_mul(773));
            }
            Insn::Inc(x) => self.set(x, self.get(x).wrapping_add(1)),
            Insn::Dec(x) => self.set(x, self.get(x).wrapping_sub(1)),
            Insn::Not(x) => self.set(x, !self.get(x)),
            Insn::Zero(x) => self.set(x, 0),
            Insn::Swap(x) => {
                let v = self.get(x);
                self.set(x, self.a);
                self.a = match x {
                    Operand::Mb | Operand::Mc => (self.a & !0xff) | v,
                    _ => v,
                };
            }
            Insn::LoadR(x, n) => self.set(x, self.r[usize::from(n)]),
            Insn::StoreR(n) => self.r[usize::from(n)] = self.a,
            Insn::Mov(x, y) => self.set(x, self.get(y)),
            Insn::Alu(op, y) => self.a = op.apply(self.a, self.get(y)),
            Insn::Cmp(op, y) => self.f = op.apply(self.a, self.get(y)),
            Insn::Jt(t) if self.f => return Ok(Flow::Jump(t)),
            Insn::Jf(t) if !self.f => return Ok(Flow::Jump(t)),
            Insn::Jt(_) | Insn::Jf(_) => {}
            Insn::Jmp(t) | Insn::Lj(t) => return Ok(Flow::Jump(t)),
            Insn::Call(t) => return Ok(Flow::Call(t)),
            Insn::Ret => return Ok(Flow::Ret),
        }
        Ok(Flow::Next)
    }

    pub(crate) fn push(&mut self, ret: usize) -> std::result::Result<(), Fault> {
        if self.stack.len() == STACK_DEPTH {
            return Err(Fault::StackOverflow);
        }
        self.stack.push(ret);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> std::result::Result<usize, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    /// Bytes emitted by `out` since the last call
    pub fn output(&self) -> &[u8] { &self.out }
}

enum Exec {
    Interpreted(Program),
    Translated(Compiled),
}

/// A program bound to its machine
pub struct Vm {
    kind: ProgramKind,
    machine: Machine,
    exec: Exec,
    empty: bool,
}

impl Vm {
    pub fn new(kind: ProgramKind, program: &Program, hbits: u8, mbits: u8, mode: ExecMode) -> Result<Self> {
        let exec = match mode {
            ExecMode::Interpret => Exec::Interpreted(program.clone()),
            ExecMode::Translate => match Compiled::translate(program) {
                Some(compiled) => {
                    debug!("translated {kind} program: {} instructions", compiled.len());
                    Exec::Translated(compiled)
                }
                None => {
                    warn!("{kind} program jumps into an instruction, interpreting instead");
                    Exec::Interpreted(program.clone())
                }
            },
        };
        let machine = Machine::new(hbits, mbits)?;
        Ok(Self { kind, machine, exec, empty: program.is_empty() })
    }

    pub fn is_translated(&self) -> bool { matches!(self.exec, Exec::Translated(_)) }

    /// Runs the program once from the start with `a = input`
    pub fn run(&mut self, input: u32) -> Result<()> {
        if self.empty {
            return Ok(());
        }
        self.machine.a = input;
        self.machine.stack.clear();
        let result = match &self.exec {
            Exec::Interpreted(program) => interpreter::run(program.code(), &mut self.machine),
            Exec::Translated(compiled) => compiled.run(&mut self.machine),
        };
        // `out` has no effect in a context program
        if self.kind == ProgramKind::Context {
            self.machine.out.clear();
        }
        result.map_err(|(pc, fault)| Error::Vm { program: self.kind, pc, fault, offset: 0 })
    }

    pub fn machine(&self) -> &Machine { &self.machine }

    /// Word `i` of H, wrapped to its size
    #[inline(always)]
    pub fn h(&self, i: usize) -> u32 { self.machine.h[i & (self.machine.h.len() - 1)] }

    /// Moves the bytes emitted by `out` into `sink`
    pub fn flush_output(&mut self, sink: &mut impl ByteWrite) -> io::Result<()> {
        sink.put_all(&self.machine.out)?;
        self.machine.out.clear();
        Ok(())
    }
}
