use super::{decode, Flow, Insn, Machine, Program};
use crate::error::Fault;

/// A program decoded once, with jump targets resolved to instruction
/// indices. Addresses are kept to report faults like the interpreter.
pub(super) struct Compiled {
    insns: Vec<Insn>,
    addrs: Vec<usize>,
}

impl Compiled {
    /// `None` if some jump lands inside an instruction, which only the
    /// interpreter can follow.
    pub fn translate(program: &Program) -> Option<Self> {
        let code = program.code();
        let mut insns = Vec::new();
        let mut addrs = Vec::new();
        let mut pc = 0;
        while pc < code.len() {
            let (insn, next) = decode(code, pc).ok()?;
            insns.push(insn);
            addrs.push(pc);
            pc = next;
        }

        for insn in insns.iter_mut() {
            if let Some(target) = insn.target() {
                let index = addrs.binary_search(&target).ok()?;
                *insn = insn.with_target(index);
            }
        }
        Some(Self { insns, addrs })
    }

    pub fn len(&self) -> usize { self.insns.len() }

    pub fn run(&self, m: &mut Machine) -> Result<(), (usize, Fault)> {
        let mut i = 0;
        loop {
            let (Some(&insn), Some(&pc)) = (self.insns.get(i), self.addrs.get(i)) else {
                return Err((i, Fault::OutOfProgram));
            };
            let at = move |fault| (pc, fault);
            i = match m.execute(insn).map_err(at)? {
                Flow::Next => i + 1,
                Flow::Jump(target) => target,
                Flow::Call(target) => {
                    m.push(i + 1).map_err(at)?;
                    target
                }
                Flow::Ret => m.pop().map_err(at)?,
                Flow::Halt => return Ok(()),
            };
        }
    }
}
