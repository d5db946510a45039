//! # lmc-engine
//!
//! The Little Man Computer: a decimal machine with 100 mailboxes, one
//! accumulator, an inbox and an outbox.
//!
//! This crate owns the machine model and the fetch-decode-execute cycle.
//! Orchestration (scheduling, persistence, breakpoint bookkeeping) lives in
//! `lmc-core`, which drives the machine one cycle at a time through [`step`].
//!
//! ## Example
//!
//! ```rust
//! use lmc_engine::{assemble, run_to_completion, Event, MachineState, Step};
//! use std::collections::BTreeSet;
//!
//! let program = assemble("INP\nOUT\nHLT").unwrap();
//! let mut state = MachineState::fresh(&program).with_inputs([42]);
//!
//! let mut seen = Vec::new();
//! let mut observer = |event: &Event| seen.push(event.clone());
//! let outcome = run_to_completion(&mut state, &BTreeSet::new(), &mut observer, None).unwrap();
//!
//! assert_eq!(outcome, Step::Halted);
//! assert_eq!(state.outbox, vec![42]);
//! ```

pub mod assembler;
pub mod error;
pub mod event;
pub mod instruction;
pub mod machine;
pub mod program;

pub use assembler::{assemble, disassemble};
pub use error::{AssemblyError, AssemblyErrorKind, EngineError, ValidationError};
pub use event::{Event, Observer};
pub use instruction::Instruction;
pub use machine::{run_to_completion, step, MachineState, Step, TraceEntry, TRACE_CAPACITY};
pub use program::{validate_image, Program, ProgramMetadata, PROGRAM_SCHEMA_VERSION};

/// A single mailbox value. Valid words are `0..=999`.
pub type Word = u16;

/// Number of mailboxes in the machine.
pub const MEMORY_SIZE: usize = 100;

/// Largest value a mailbox can hold.
pub const MAX_WORD: Word = 999;

/// Accumulator range (inclusive).
pub const MIN_VALUE: i32 = -999;
pub const MAX_VALUE: i32 = 999;
