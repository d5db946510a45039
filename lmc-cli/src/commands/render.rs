//! Plain-text rendering of events, states and run reports.

use lmc_core::{Handler, ObserverError, RunReport, Termination};
use lmc_engine::{Event, MachineState};
use std::io::Write;

pub fn event_line(event: &Event) -> String {
    match event {
        Event::CycleStarted { cycle, counter } => format!("[{cycle:>5}] start  @{counter:02}"),
        Event::InstructionDecoded {
            cycle,
            address,
            word,
            instruction,
        } => format!("[{cycle:>5}] decode @{address:02} {word:03} {instruction}"),
        Event::InstructionExecuted {
            cycle,
            accumulator,
            next_counter,
            ..
        } => format!("[{cycle:>5}] exec   acc={accumulator} next=@{next_counter:02}"),
        Event::CycleCompleted { cycle } => format!("[{cycle:>5}] done"),
        Event::InputRequested { cycle, address } => {
            format!("[{cycle:>5}] input  requested at @{address:02}")
        }
        Event::OutputProduced { cycle, value } => format!("[{cycle:>5}] output {value}"),
        Event::BreakpointHit { address } => format!("        breakpoint @{address:02}"),
        Event::Halted { cycles } => format!("        halted after {cycles} cycles"),
        Event::Error { cycle, message } => format!("[{cycle:>5}] error  {message}"),
    }
}

/// Observer that prints every event to stdout.
pub fn trace_handler() -> Handler {
    Box::new(|event: &Event| -> Result<(), ObserverError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", event_line(event))?;
        Ok(())
    })
}

pub fn state_line(state: &MachineState) -> String {
    format!(
        "cycle {:>5}  counter {:02}  acc {:>4}  inbox {:?}  outbox {:?}{}",
        state.cycles,
        state.counter,
        state.accumulator,
        state.inbox,
        state.outbox,
        if state.halted { "  halted" } else { "" }
    )
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

pub fn summary(report: &RunReport) -> String {
    let n = report.cycles_executed;
    let headline = match &report.termination {
        Termination::Halted => format!("Halted after {n} cycle{}", plural(n)),
        Termination::LimitReached => format!("Cycle limit reached after {n} cycle{}", plural(n)),
        Termination::Breakpoint(address) => {
            format!("Stopped at breakpoint {address:02} after {n} cycle{}", plural(n))
        }
        Termination::Cancelled => format!("Interrupted after {n} cycle{}", plural(n)),
        Termination::Errored(err) => format!("Error after {n} cycle{}: {err}", plural(n)),
    };

    let state = &report.final_state;
    let outbox = state
        .outbox
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{headline}\noutbox: [{outbox}]\naccumulator: {}  counter: {:02}  total cycles: {}",
        state.accumulator, state.counter, state.cycles
    )
}
