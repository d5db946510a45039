//! Error types for assembly, validation and execution.

use thiserror::Error;

/// Failure raised while executing a single cycle.
///
/// A failing cycle never commits any of its effects, so the machine state
/// still reflects the last cycle that completed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("mailbox {address} is out of bounds")]
    OutOfBounds { address: u16 },

    #[error("invalid instruction word {word:03} at mailbox {address:02}")]
    InvalidInstruction { address: u8, word: u16 },

    #[error("numeric error at mailbox {address:02}: {message}")]
    Numeric { address: u8, message: String },

    #[error("instruction at mailbox {address:02} is waiting for input but the inbox is empty")]
    AwaitingInput { address: u8 },
}

/// Structural problems with a program or machine state image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("memory image must contain exactly {expected} words, found {found}")]
    MemorySize { expected: usize, found: usize },

    #[error("mailbox {address} holds {value}, outside 0..=999")]
    WordOutOfRange { address: usize, value: u16 },

    #[error("program counter {0} is outside 0..=99")]
    CounterOutOfRange(u8),

    #[error("accumulator {0} is outside -999..=999")]
    AccumulatorOutOfRange(i32),

    #[error("label `{label}` points at mailbox {address}, outside 0..=99")]
    LabelOutOfRange { label: String, address: u8 },
}

/// What went wrong on a particular source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyErrorKind {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),

    #[error("`{0}` requires an operand")]
    MissingOperand(String),

    #[error("`{0}` does not take an operand")]
    UnexpectedOperand(String),

    #[error("unexpected trailing token `{0}`")]
    TrailingToken(String),

    #[error("undefined label `{0}`")]
    UndefinedLabel(String),

    #[error("label `{0}` is defined more than once")]
    DuplicateLabel(String),

    #[error("invalid label `{0}`")]
    InvalidLabel(String),

    #[error("operand {value} is out of range (max {max})")]
    OperandOutOfRange { value: i64, max: i64 },

    #[error("program does not fit in 100 mailboxes")]
    ProgramTooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct AssemblyError {
    pub line: usize,
    pub kind: AssemblyErrorKind,
}

impl AssemblyError {
    pub fn new(line: usize, kind: AssemblyErrorKind) -> Self {
        Self { line, kind }
    }
}
