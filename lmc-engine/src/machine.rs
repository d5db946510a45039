//! Machine state and the single-cycle executor.

use crate::error::{EngineError, ValidationError};
use crate::event::{Event, Observer};
use crate::instruction::Instruction;
use crate::program::{validate_image, Program};
use crate::{Word, MAX_VALUE, MEMORY_SIZE, MIN_VALUE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Number of recent steps kept in [`MachineState::trace`].
pub const TRACE_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub cycle: u64,
    pub address: u8,
    pub word: Word,
    pub instruction: Instruction,
    pub accumulator: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub counter: u8,
    pub accumulator: i32,
    pub halted: bool,
    pub cycles: u64,
    #[serde(default)]
    pub inbox: VecDeque<i32>,
    #[serde(default)]
    pub outbox: Vec<i32>,
    #[serde(default)]
    pub trace: VecDeque<TraceEntry>,
    pub memory: Vec<Word>,
}

impl MachineState {
    /// A reset machine whose memory is a copy of the program image.
    pub fn fresh(program: &Program) -> Self {
        Self {
            counter: 0,
            accumulator: 0,
            halted: false,
            cycles: 0,
            inbox: VecDeque::new(),
            outbox: Vec::new(),
            trace: VecDeque::new(),
            memory: program.memory_image().to_vec(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = i32>) -> Self {
        self.push_inputs(inputs);
        self
    }

    /// Append values to the back of the inbox.
    pub fn push_inputs(&mut self, inputs: impl IntoIterator<Item = i32>) {
        self.inbox.extend(inputs);
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_image(&self.memory)?;
        if self.counter as usize >= MEMORY_SIZE {
            return Err(ValidationError::CounterOutOfRange(self.counter));
        }
        if !(MIN_VALUE..=MAX_VALUE).contains(&self.accumulator) {
            return Err(ValidationError::AccumulatorOutOfRange(self.accumulator));
        }
        Ok(())
    }

    fn record(&mut self, entry: TraceEntry) {
        if self.trace.len() == TRACE_CAPACITY {
            self.trace.pop_front();
        }
        self.trace.push_back(entry);
    }
}

/// Result of a successful call to [`step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One cycle completed and the machine can keep going.
    Continued,
    /// The machine is halted (either by this cycle or already before it).
    Halted,
    /// The counter sits on a breakpoint; no cycle was executed.
    Breakpoint(u8),
}

/// Execute exactly one fetch-decode-execute cycle.
///
/// Before fetching, the counter is checked against `breakpoints`; a match
/// emits [`Event::BreakpointHit`] and returns without touching the state.
/// Errors are reported to the observer and returned, and leave `state`
/// exactly as it was before the call.
pub fn step(
    state: &mut MachineState,
    breakpoints: &BTreeSet<u8>,
    observer: &mut dyn Observer,
) -> Result<Step, EngineError> {
    if state.halted {
        return Ok(Step::Halted);
    }

    let address = state.counter;
    if breakpoints.contains(&address) {
        observer.observe(&Event::BreakpointHit { address });
        return Ok(Step::Breakpoint(address));
    }

    let cycle = state.cycles + 1;
    observer.observe(&Event::CycleStarted {
        cycle,
        counter: address,
    });

    match execute(state, cycle, address, observer) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            observer.observe(&Event::Error {
                cycle,
                message: err.to_string(),
            });
            Err(err)
        }
    }
}

fn execute(
    state: &mut MachineState,
    cycle: u64,
    address: u8,
    observer: &mut dyn Observer,
) -> Result<Step, EngineError> {
    let word = *state
        .memory
        .get(address as usize)
        .ok_or(EngineError::OutOfBounds {
            address: address as u16,
        })?;
    let instruction = Instruction::decode(address, word)?;
    observer.observe(&Event::InstructionDecoded {
        cycle,
        address,
        word,
        instruction,
    });

    let numeric = |message: String| EngineError::Numeric { address, message };
    let mut accumulator = state.accumulator;
    let mut next_counter = ((address as usize + 1) % MEMORY_SIZE) as u8;
    let mut store: Option<(u8, Word)> = None;
    let mut consumed_input = false;
    let mut output = None;
    let mut halted = false;

    match instruction {
        Instruction::Add(a) | Instruction::Sub(a) => {
            let operand = state.memory[a as usize] as i32;
            let result = if matches!(instruction, Instruction::Add(_)) {
                accumulator + operand
            } else {
                accumulator - operand
            };
            if !(MIN_VALUE..=MAX_VALUE).contains(&result) {
                return Err(numeric(format!("result {result} overflows the accumulator")));
            }
            accumulator = result;
        }
        Instruction::Sta(a) => {
            if accumulator < 0 {
                return Err(numeric(format!(
                    "cannot store negative value {accumulator} in mailbox {a:02}"
                )));
            }
            store = Some((a, accumulator as Word));
        }
        Instruction::Lda(a) => accumulator = state.memory[a as usize] as i32,
        Instruction::Bra(a) => next_counter = a,
        Instruction::Brz(a) => {
            if accumulator == 0 {
                next_counter = a;
            }
        }
        Instruction::Brp(a) => {
            if accumulator >= 0 {
                next_counter = a;
            }
        }
        Instruction::Inp => {
            observer.observe(&Event::InputRequested { cycle, address });
            let value = *state
                .inbox
                .front()
                .ok_or(EngineError::AwaitingInput { address })?;
            if !(MIN_VALUE..=MAX_VALUE).contains(&value) {
                return Err(numeric(format!("input {value} is outside -999..=999")));
            }
            accumulator = value;
            consumed_input = true;
        }
        Instruction::Out => output = Some(accumulator),
        Instruction::Hlt => {
            halted = true;
            next_counter = address;
        }
    }

    // Commit.
    if let Some((target, value)) = store {
        state.memory[target as usize] = value;
    }
    if consumed_input {
        state.inbox.pop_front();
    }
    if let Some(value) = output {
        state.outbox.push(value);
        observer.observe(&Event::OutputProduced { cycle, value });
    }
    state.accumulator = accumulator;
    state.counter = next_counter;
    state.cycles = cycle;
    state.halted = halted;
    state.record(TraceEntry {
        cycle,
        address,
        word,
        instruction,
        accumulator,
    });

    observer.observe(&Event::InstructionExecuted {
        cycle,
        address,
        instruction,
        accumulator,
        next_counter,
    });
    observer.observe(&Event::CycleCompleted { cycle });

    if halted {
        observer.observe(&Event::Halted { cycles: cycle });
        Ok(Step::Halted)
    } else {
        Ok(Step::Continued)
    }
}

/// Run until halt, breakpoint, error, or until `limit` cycles have executed.
///
/// Returns [`Step::Continued`] when the limit stopped the run.
pub fn run_to_completion(
    state: &mut MachineState,
    breakpoints: &BTreeSet<u8>,
    observer: &mut dyn Observer,
    limit: Option<u64>,
) -> Result<Step, EngineError> {
    let mut executed = 0u64;
    loop {
        if limit.is_some_and(|max| executed >= max) {
            return Ok(Step::Continued);
        }
        match step(state, breakpoints, observer)? {
            Step::Continued => executed += 1,
            other => return Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble;

    fn no_breaks() -> BTreeSet<u8> {
        BTreeSet::new()
    }

    fn run(source: &str, inputs: &[i32]) -> (MachineState, Result<Step, EngineError>, Vec<Event>) {
        let program = assemble(source).unwrap();
        let mut state = MachineState::fresh(&program).with_inputs(inputs.iter().copied());
        let mut events = Vec::new();
        let mut observer = |e: &Event| events.push(e.clone());
        let result = run_to_completion(&mut state, &no_breaks(), &mut observer, Some(1_000));
        (state, result, events)
    }

    #[test]
    fn test_echo_program() {
        let (state, result, events) = run("INP\nOUT\nHLT", &[42]);
        assert_eq!(result, Ok(Step::Halted));
        assert_eq!(state.outbox, vec![42]);
        assert!(state.halted);
        assert_eq!(state.cycles, 3);
        assert_eq!(state.counter, 2);
        assert!(matches!(events.last(), Some(Event::Halted { cycles: 3 })));
    }

    #[test]
    fn test_event_order_for_one_cycle() {
        let program = assemble("OUT\nHLT").unwrap();
        let mut state = MachineState::fresh(&program);
        let mut names = Vec::new();
        let mut observer = |e: &Event| names.push(e.name());
        step(&mut state, &no_breaks(), &mut observer).unwrap();
        assert_eq!(
            names,
            vec![
                "cycle_started",
                "instruction_decoded",
                "output_produced",
                "instruction_executed",
                "cycle_completed"
            ]
        );
    }

    #[test]
    fn test_adds_two_inputs() {
        let source = "
            INP
            STA first
            INP
            ADD first
            OUT
            HLT
    first   DAT
        ";
        let (state, result, _) = run(source, &[12, 30]);
        assert_eq!(result, Ok(Step::Halted));
        assert_eq!(state.outbox, vec![42]);
    }

    #[test]
    fn test_countdown_loop() {
        let source = "
            INP
    loop    OUT
            SUB one
            BRP loop
            HLT
    one     DAT 1
        ";
        let (state, _, _) = run(source, &[3]);
        assert_eq!(state.outbox, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_awaiting_input_preserves_state() {
        let program = assemble("INP\nHLT").unwrap();
        let mut state = MachineState::fresh(&program);
        let before = state.clone();
        let mut events = Vec::new();
        let mut observer = |e: &Event| events.push(e.clone());
        let err = step(&mut state, &no_breaks(), &mut observer).unwrap_err();
        assert_eq!(err, EngineError::AwaitingInput { address: 0 });
        assert_eq!(state, before);
        assert!(matches!(events.last(), Some(Event::Error { .. })));
    }

    #[test]
    fn test_overflow_is_numeric_error() {
        let (state, result, _) = run("INP\nADD big\nHLT\nbig DAT 999", &[5]);
        assert!(matches!(result, Err(EngineError::Numeric { address: 1, .. })));
        assert_eq!(state.accumulator, 5);
        assert_eq!(state.cycles, 1);
    }

    #[test]
    fn test_invalid_instruction() {
        let program = Program::from_words(&[400]).unwrap();
        let mut state = MachineState::fresh(&program);
        let err = step(&mut state, &no_breaks(), &mut |_: &Event| {}).unwrap_err();
        assert_eq!(err, EngineError::InvalidInstruction { address: 0, word: 400 });
    }

    #[test]
    fn test_breakpoint_stops_before_execution() {
        let program = assemble("INP\nOUT\nHLT").unwrap();
        let mut state = MachineState::fresh(&program).with_inputs([7]);
        let breaks = BTreeSet::from([1]);
        let result = run_to_completion(&mut state, &breaks, &mut |_: &Event| {}, None);
        assert_eq!(result, Ok(Step::Breakpoint(1)));
        assert_eq!(state.counter, 1);
        assert!(state.outbox.is_empty());
        assert!(!state.halted);
    }

    #[test]
    fn test_limit_stops_with_continued() {
        let program = assemble("loop BRA loop").unwrap();
        let mut state = MachineState::fresh(&program);
        let result = run_to_completion(&mut state, &no_breaks(), &mut |_: &Event| {}, Some(5));
        assert_eq!(result, Ok(Step::Continued));
        assert_eq!(state.cycles, 5);
    }

    #[test]
    fn test_trace_is_bounded() {
        let program = assemble("loop BRA loop").unwrap();
        let mut state = MachineState::fresh(&program);
        run_to_completion(&mut state, &no_breaks(), &mut |_: &Event| {}, Some(100)).unwrap();
        assert_eq!(state.trace.len(), TRACE_CAPACITY);
        assert_eq!(state.trace.back().map(|t| t.cycle), Some(100));
    }

    #[test]
    fn test_validate_rejects_bad_counter() {
        let program = Program::from_words(&[]).unwrap();
        let mut state = MachineState::fresh(&program);
        state.counter = 100;
        assert_eq!(
            state.validate(),
            Err(ValidationError::CounterOutOfRange(100))
        );
    }
}
