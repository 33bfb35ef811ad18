use std::fmt;

use thiserror::Error;

use crate::sha1::Digest;

/// Which of the two programs carried by a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// Runs after every coded byte and selects component contexts
    Context,
    /// Runs after every decoded byte and produces the output
    PostProcess,
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => f.write_str("context"),
            Self::PostProcess => f.write_str("post-processing"),
        }
    }
}

/// Fatal execution faults of the virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("executed error instruction")]
    ErrorInstruction,
    #[error("undefined opcode {0}")]
    UndefinedOpcode(u8),
    #[error("call stack overflow")]
    StackOverflow,
    #[error("return with empty call stack")]
    StackUnderflow,
    #[error("program counter left the program")]
    OutOfProgram,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The model program is malformed. Detected at load time.
    #[error("invalid model at byte {offset}: {reason}")]
    InvalidModel { offset: usize, reason: String },

    /// A program hit a fatal fault while running. `offset` is the position
    /// in the stream being read: the archive when decoding, the data when
    /// encoding.
    #[error("{program} program faulted at pc {pc}, byte {offset}: {fault}")]
    Vm { program: ProgramKind, pc: usize, fault: Fault, offset: u64 },

    /// The input ended inside a block.
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: u64 },

    /// The input is inconsistent with its own framing.
    #[error("corrupt input at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: &'static str },

    /// A model table could not be allocated.
    #[error("cannot allocate {bytes} bytes for {table}")]
    Alloc { table: &'static str, bytes: usize },

    /// Replaying a freshly compressed block did not reproduce the input.
    #[error("verification failed: expected {expected}, decoded {actual}")]
    VerificationFailed { expected: Digest, actual: Digest },

    /// The textual model description could not be compiled.
    #[error("config line {line}: {reason}")]
    Config { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_model(offset: usize, reason: impl Into<String>) -> Self {
        Self::InvalidModel { offset, reason: reason.into() }
    }

    /// Places a program fault at `offset`
    pub(crate) fn at(self, offset: u64) -> Self {
        match self {
            Self::Vm { program, pc, fault, .. } => Self::Vm { program, pc, fault, offset },
            other => other,
        }
    }
}
