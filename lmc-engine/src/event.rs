//! Events emitted while the machine executes.

use crate::instruction::Instruction;
use crate::Word;
use serde::{Deserialize, Serialize};

/// One observation from the fetch-decode-execute cycle.
///
/// A normal cycle produces, in order: `CycleStarted`, `InstructionDecoded`,
/// optionally `InputRequested` / `OutputProduced`, `InstructionExecuted`,
/// `CycleCompleted`, and `Halted` after a halt instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    CycleStarted {
        cycle: u64,
        counter: u8,
    },
    InstructionDecoded {
        cycle: u64,
        address: u8,
        word: Word,
        instruction: Instruction,
    },
    InstructionExecuted {
        cycle: u64,
        address: u8,
        instruction: Instruction,
        accumulator: i32,
        next_counter: u8,
    },
    CycleCompleted {
        cycle: u64,
    },
    InputRequested {
        cycle: u64,
        address: u8,
    },
    OutputProduced {
        cycle: u64,
        value: i32,
    },
    BreakpointHit {
        address: u8,
    },
    Halted {
        cycles: u64,
    },
    Error {
        cycle: u64,
        message: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CycleStarted { .. } => "cycle_started",
            Event::InstructionDecoded { .. } => "instruction_decoded",
            Event::InstructionExecuted { .. } => "instruction_executed",
            Event::CycleCompleted { .. } => "cycle_completed",
            Event::InputRequested { .. } => "input_requested",
            Event::OutputProduced { .. } => "output_produced",
            Event::BreakpointHit { .. } => "breakpoint_hit",
            Event::Halted { .. } => "halted",
            Event::Error { .. } => "error",
        }
    }
}

/// Receives every [`Event`] the machine emits.
pub trait Observer {
    fn observe(&mut self, event: &Event);
}

impl<F> Observer for F
where
    F: FnMut(&Event),
{
    fn observe(&mut self, event: &Event) {
        self(event)
    }
}
