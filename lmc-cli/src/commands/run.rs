//! `run`, `step` and `until`.

use super::{print_json, render};
use anyhow::{bail, Context, Result};
use lmc_core::{
    CancelToken, ContentAddress, JsonLinesLogger, Orchestrator, RunReport, RunRequest, Schedule,
};
use lmc_engine::MachineState;
use serde::Serialize;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// Inputs common to every way of running a program.
pub struct RunInputs {
    pub inputs: Vec<i32>,
    pub speed: Option<f64>,
    pub state: Option<String>,
    pub no_auto_breakpoints: bool,
    pub json: bool,
}

/// Extra options of `run`.
pub struct RunOptions {
    pub max_cycles: Option<u64>,
    pub breakpoints: Vec<i64>,
    pub save_state: Option<String>,
    pub log: Option<PathBuf>,
    pub trace: bool,
    pub live: bool,
}

#[derive(Serialize)]
struct ReportPayload<'a> {
    content_address: &'a ContentAddress,
    termination: &'static str,
    breakpoint: Option<u8>,
    error: Option<String>,
    cycles_executed: u64,
    breakpoints: Vec<u8>,
    state: &'a MachineState,
}

fn request(program: &str, inputs: &RunInputs) -> RunRequest {
    let mut request = RunRequest::reference(program).with_inputs(inputs.inputs.iter().copied());
    if let Some(speed) = inputs.speed {
        request = request.with_schedule(Schedule::Hertz(speed));
    }
    if let Some(state) = &inputs.state {
        request = request.from_stored_state(state.as_str());
    }
    if inputs.no_auto_breakpoints {
        request = request.without_auto_breakpoints();
    }
    request
}

/// Cancel `token` on Ctrl-C until the returned task is aborted.
fn cancel_on_interrupt(token: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping run");
            token.cancel();
        }
    })
}

fn report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        print_json(&ReportPayload {
            content_address: &report.content_address,
            termination: report.termination.as_str(),
            breakpoint: report.breakpoint_address(),
            error: report.error().map(ToString::to_string),
            cycles_executed: report.cycles_executed,
            breakpoints: report.breakpoints.iter().copied().collect(),
            state: &report.final_state,
        })?;
    } else {
        println!("{}", render::summary(report));
    }

    if let Some(err) = report.error() {
        bail!("Run failed: {}", err);
    }
    Ok(())
}

pub async fn run_program(
    workspace: &Orchestrator,
    program: &str,
    inputs: RunInputs,
    opts: RunOptions,
) -> Result<()> {
    let mut request = request(program, &inputs).with_breakpoints(opts.breakpoints);
    if let Some(max) = opts.max_cycles {
        request = request.with_cycle_limit(max);
    }

    let mut prepared = workspace.prepare(request)?;
    let logger = match &opts.log {
        Some(path) => {
            let logger = JsonLinesLogger::create(path)
                .with_context(|| format!("Failed to open event log {:?}", path))?;
            prepared.attach("log", logger.handler());
            Some(logger)
        }
        None => None,
    };
    if opts.trace {
        prepared.attach("trace", render::trace_handler());
    }

    let cancel = CancelToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let result = if opts.live {
        let mut states = prepared.live_states(true);
        let handle = prepared.spawn(cancel);
        while let Some(state) = states.next().await {
            println!("{}", render::state_line(&state));
        }
        handle.join().await?
    } else {
        prepared.execute(&cancel).await
    };
    interrupt.abort();

    if let Some(logger) = logger {
        logger.flush().context("Failed to flush event log")?;
    }
    if let Some(name) = &opts.save_state {
        let location = workspace
            .artifacts()
            .store_state(name, &result.final_state, Some(&result.program))?;
        if !inputs.json {
            println!("Saved state `{}` to {}", name, location.path.display());
        }
    }
    report(&result, inputs.json)
}

pub async fn step_program(
    workspace: &Orchestrator,
    program: &str,
    session: &str,
    count: u64,
    inputs: RunInputs,
) -> Result<()> {
    let cancel = CancelToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let result = workspace
        .step(request(program, &inputs), session, count, &cancel)
        .await;
    interrupt.abort();
    let result = result?;

    if !inputs.json {
        let recent = result.cycles_executed as usize;
        for entry in result.final_state.trace.iter().rev().take(recent).rev() {
            println!(
                "[{:>5}] @{:02} {:03} {:<7} acc={}",
                entry.cycle,
                entry.address,
                entry.word,
                entry.instruction.to_string(),
                entry.accumulator
            );
        }
    }
    report(&result, inputs.json)
}

pub async fn run_until(
    workspace: &Orchestrator,
    program: &str,
    address: i64,
    inputs: RunInputs,
) -> Result<()> {
    let cancel = CancelToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let result = workspace
        .run_until(request(program, &inputs), address, &cancel)
        .await;
    interrupt.abort();
    report(&result?, inputs.json)
}
