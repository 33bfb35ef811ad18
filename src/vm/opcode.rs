use std::fmt;

use crate::error::Fault;

pub const OP_ERROR: u8 = 0;
pub const OP_HALT: u8 = 56;
pub const OP_JT: u8 = 39;
pub const OP_JF: u8 = 47;
pub const OP_JMP: u8 = 63;
pub const OP_RET: u8 = 62;
pub const OP_CALL: u8 = 253;
pub const OP_LJ: u8 = 255;

/// Register or memory cell an instruction reads or writes.
/// `*b` and `*c` address the byte array M, `*d` the word array H.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
    C,
    D,
    Mb,
    Mc,
    Hd,
    Imm(u8),
}

const LOCATIONS: [Operand; 7] =
    [Operand::A, Operand::B, Operand::C, Operand::D, Operand::Mb, Operand::Mc, Operand::Hd];

impl Operand {
    fn source(bits: u8) -> Option<Self> { LOCATIONS.get(usize::from(bits)).copied() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    AndNot,
    Or,
    Xor,
    Shl,
    Shr,
}

const ALU_OPS: [AluOp; 11] = [
    AluOp::Add,
    AluOp::Sub,
    AluOp::Mul,
    AluOp::Div,
    AluOp::Mod,
    AluOp::And,
    AluOp::AndNot,
    AluOp::Or,
    AluOp::Xor,
    AluOp::Shl,
    AluOp::Shr,
];

impl AluOp {
    #[inline(always)]
    pub fn apply(self, a: u32, x: u32) -> u32 {
        match self {
            Self::Add => a.wrapping_add(x),
            Self::Sub => a.wrapping_sub(x),
            Self::Mul => a.wrapping_mul(x),
            Self::Div => a.checked_div(x).unwrap_or(0),
            Self::Mod => a.checked_rem(x).unwrap_or(0),
            Self::And => a & x,
            Self::AndNot => a & !x,
            Self::Or => a | x,
            Self::Xor => a ^ x,
            Self::Shl => a << (x & 31),
            Self::Shr => a >> (x & 31),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::Div => "/=",
            Self::Mod => "%=",
            Self::And => "&=",
            Self::AndNot => "&~",
            Self::Or => "|=",
            Self::Xor => "^=",
            Self::Shl => "<<=",
            Self::Shr => ">>=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Gt,
}

impl CmpOp {
    #[inline(always)]
    pub fn apply(self, a: u32, x: u32) -> bool {
        match self {
            Self::Eq => a == x,
            Self::Lt => a < x,
            Self::Gt => a > x,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Gt => ">",
        }
    }
}

/// A decoded instruction. Jump targets are absolute, in whatever address
/// space the executor uses (byte offsets or instruction indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    Error,
    Halt,
    Out,
    /// A = (A + *B + 512) * 773
    Hash,
    /// *D = (*D + A + 512) * 773
    HashD,
    Inc(Operand),
    Dec(Operand),
    Not(Operand),
    Zero(Operand),
    /// Exchange with A. Byte cells only exchange the low byte of A.
    Swap(Operand),
    LoadR(Operand, u8),
    StoreR(u8),
    Mov(Operand, Operand),
    Alu(AluOp, Operand),
    Cmp(CmpOp, Operand),
    Jt(usize),
    Jf(usize),
    Jmp(usize),
    Lj(usize),
    Call(usize),
    Ret,
}

impl Insn {
    pub fn target(&self) -> Option<usize> {
        match *self {
            Self::Jt(t) | Self::Jf(t) | Self::Jmp(t) | Self::Lj(t) | Self::Call(t) => Some(t),
            _ => None,
        }
    }

    pub fn with_target(self, t: usize) -> Self {
        match self {
            Self::Jt(_) => Self::Jt(t),
            Self::Jf(_) => Self::Jf(t),
            Self::Jmp(_) => Self::Jmp(t),
            Self::Lj(_) => Self::Lj(t),
            Self::Call(_) => Self::Call(t),
            other => other,
        }
    }
}

/// Encoded size of the instruction starting with `op`
pub fn insn_len(op: u8) -> usize {
    match op {
        OP_LJ | OP_CALL => 3,
        _ if op & 7 == 7 => 2,
        _ => 1,
    }
}

/// Decodes the instruction at byte `pc`, returning it with the address of
/// the next one. Relative jumps are resolved to byte addresses.
pub fn decode(code: &[u8], pc: usize) -> Result<(Insn, usize), Fault> {
    let op = *code.get(pc).ok_or(Fault::OutOfProgram)?;
    let next = pc + insn_len(op);
    let operand = |i: usize| code.get(pc + i).copied().ok_or(Fault::OutOfProgram);
    let undefined = Err(Fault::UndefinedOpcode(op));

    let relative = |n: u8| next.wrapping_add_signed(isize::from(n as i8));
    let insn = match op {
        0 => Insn::Error,
        1..=55 => {
            let loc = LOCATIONS[usize::from(op >> 3)];
            match op & 7 {
                0 => Insn::Swap(loc),
                1 => Insn::Inc(loc),
                2 => Insn::Dec(loc),
                3 => Insn::Not(loc),
                4 => Insn::Zero(loc),
                7 => {
                    let n = operand(1)?;
                    match op >> 3 {
                        0..=3 => Insn::LoadR(loc, n),
                        4 => Insn::Jt(relative(n)),
                        5 => Insn::Jf(relative(n)),
                        _ => Insn::StoreR(n),
                    }
                }
                _ => return undefined,
            }
        }
        56 => Insn::Halt,
        57 => Insn::Out,
        59 => Insn::Hash,
        60 => Insn::HashD,
        OP_RET => Insn::Ret,
        OP_JMP => Insn::Jmp(relative(operand(1)?)),
        64..=119 => Insn::Mov(LOCATIONS[usize::from((op - 64) >> 3)], source(op, operand)?),
        128..=215 => Insn::Alu(ALU_OPS[usize::from((op - 128) >> 3)], source(op, operand)?),
        216..=239 => {
            let cmp = [CmpOp::Eq, CmpOp::Lt, CmpOp::Gt][usize::from((op - 216) >> 3)];
            Insn::Cmp(cmp, source(op, operand)?)
        }
        OP_CALL | OP_LJ => {
            let target = usize::from(u16::from_le_bytes([operand(1)?, operand(2)?]));
            if op == OP_CALL { Insn::Call(target) } else { Insn::Lj(target) }
        }
        _ => return undefined,
    };
    Ok((insn, next))
}

fn source(op: u8, operand: impl Fn(usize) -> Result<u8, Fault>) -> Result<Operand, Fault> {
    match Operand::source(op & 7) {
        Some(loc) => Ok(loc),
        None => Ok(Operand::Imm(operand(1)?)),
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("a"),
            Self::B => f.write_str("b"),
            Self::C => f.write_str("c"),
            Self::D => f.write_str("d"),
            Self::Mb => f.write_str("*b"),
            Self::Mc => f.write_str("*c"),
            Self::Hd => f.write_str("*d"),
            Self::Imm(n) => write!(f, " {n}"),
        }
    }
}

/// Listing entry: an instruction together with its own address, so that
/// relative jumps print as the offsets they were written with.
pub struct Listed {
    pub pc: usize,
    pub next: usize,
    pub insn: Insn,
}

impl fmt::Display for Listed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rel = |t: usize| t as isize - self.next as isize;
        match self.insn {
            Insn::Error => f.write_str("error"),
            Insn::Halt => f.write_str("halt"),
            Insn::Out => f.write_str("out"),
            Insn::Hash => f.write_str("hash"),
            Insn::HashD => f.write_str("hashd"),
            Insn::Inc(x) => write!(f, "{x}++"),
            Insn::Dec(x) => write!(f, "{x}--"),
            Insn::Not(x) => write!(f, "{x}!"),
            Insn::Zero(x) => write!(f, "{x}=0"),
            Insn::Swap(x) => write!(f, "{x}<>a"),
            Insn::LoadR(x, n) => write!(f, "{x}=r {n}"),
            Insn::StoreR(n) => write!(f, "r=a {n}"),
            Insn::Mov(x, y) => write!(f, "{x}={y}"),
            Insn::Alu(op, y) => write!(f, "a{}{y}", op.symbol()),
            Insn::Cmp(op, y) => write!(f, "a{}{y}", op.symbol()),
            Insn::Jt(t) => write!(f, "jt {}", rel(t)),
            Insn::Jf(t) => write!(f, "jf {}", rel(t)),
            Insn::Jmp(t) => write!(f, "jmp {}", rel(t)),
            Insn::Lj(t) => write!(f, "lj {t}"),
            Insn::Call(t) => write!(f, "call {t}"),
            Insn::Ret => f.write_str("ret"),
        }
    }
}
