use super::{decode, Flow, Machine};
use crate::error::Fault;

/// Executes straight from the program bytes. Addresses are byte offsets.
pub(super) fn run(code: &[u8], m: &mut Machine) -> Result<(), (usize, Fault)> {
    let mut pc = 0;
    loop {
        let here = pc;
        let at = move |fault| (here, fault);
        let (insn, next) = decode(code, pc).map_err(at)?;
        pc = match m.execute(insn).map_err(at)? {
            Flow::Next => next,
            Flow::Jump(target) => target,
            Flow::Call(target) => {
                m.push(next).map_err(at)?;
                target
            }
            Flow::Ret => m.pop().map_err(at)?,
            Flow::Halt => return Ok(()),
        };
    }
}
