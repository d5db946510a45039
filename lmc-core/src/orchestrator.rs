//! Run preparation and supervision.
//!
//! A run goes through [`Orchestrator::prepare`], which resolves the program,
//! builds the initial state, merges breakpoints and wires the event bus, and
//! then [`PreparedRun::execute`] (or [`PreparedRun::spawn`]), which drives the
//! engine one cycle at a time under a [`Schedule`] until the run ends.
//!
//! Every ending is reported as a [`Termination`] inside a [`RunReport`];
//! only problems found while preparing are returned as errors.

use crate::artifacts::{validate_name, ArtifactStore};
use crate::breakpoints::{validate_addresses, BreakpointStore};
use crate::cancel::CancelToken;
use crate::config::{Settings, WorkspaceConfig};
use crate::error::RunError;
use crate::events::{EventBus, Handler, Recorder};
use crate::hash::ContentAddress;
use lmc_engine::{step, EngineError, Event, MachineState, Program, Step};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;

/// Pacing for a run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Schedule {
    /// As fast as possible, yielding to the runtime now and then.
    #[default]
    Unlimited,
    /// A fixed number of cycles per second.
    Hertz(f64),
}

impl Schedule {
    pub fn hertz(rate: f64) -> Result<Self, RunError> {
        let schedule = Schedule::Hertz(rate);
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), RunError> {
        match *self {
            Schedule::Hertz(rate)
                if !(rate.is_finite() && rate > 0.0)
                    || Duration::try_from_secs_f64(1.0 / rate).is_err() =>
            {
                Err(RunError::InvalidSpeed(rate))
            }
            _ => Ok(()),
        }
    }

    /// Time between cycles, or `None` when unpaced.
    pub fn period(&self) -> Option<Duration> {
        match *self {
            Schedule::Unlimited => None,
            Schedule::Hertz(rate) => {
                Some(Duration::try_from_secs_f64(1.0 / rate).unwrap_or(Duration::MAX))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgramSource {
    /// A stored name or a path; see [`ArtifactStore::resolve`].
    Reference(String),
    Inline(Program),
}

#[derive(Debug, Clone, Default)]
pub enum InitialState {
    /// Memory copied from the program, everything else reset.
    #[default]
    Fresh,
    /// Continue from this state; only new inputs are added.
    Resume(MachineState),
    /// Continue from a stored state.
    Stored(String),
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub program: ProgramSource,
    pub inputs: Vec<i32>,
    pub initial: InitialState,
    /// `None` falls back to the workspace `default_speed`.
    pub schedule: Option<Schedule>,
    pub cycle_limit: Option<u64>,
    pub breakpoints: Vec<i64>,
    pub auto_load_breakpoints: bool,
}

impl RunRequest {
    pub fn new(program: ProgramSource) -> Self {
        Self {
            program,
            inputs: Vec::new(),
            initial: InitialState::Fresh,
            schedule: None,
            cycle_limit: None,
            breakpoints: Vec::new(),
            auto_load_breakpoints: true,
        }
    }

    pub fn reference(reference: impl Into<String>) -> Self {
        Self::new(ProgramSource::Reference(reference.into()))
    }

    pub fn inline(program: Program) -> Self {
        Self::new(ProgramSource::Inline(program))
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = i32>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn resume(mut self, state: MachineState) -> Self {
        self.initial = InitialState::Resume(state);
        self
    }

    pub fn from_stored_state(mut self, name: impl Into<String>) -> Self {
        self.initial = InitialState::Stored(name.into());
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_cycle_limit(mut self, limit: u64) -> Self {
        self.cycle_limit = Some(limit);
        self
    }

    pub fn with_breakpoints(mut self, addresses: impl IntoIterator<Item = i64>) -> Self {
        self.breakpoints.extend(addresses);
        self
    }

    pub fn without_auto_breakpoints(mut self) -> Self {
        self.auto_load_breakpoints = false;
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The program executed a halt instruction.
    Halted,
    /// The cycle limit was reached before the program halted.
    LimitReached,
    /// The counter reached a breakpoint; that cycle was not executed.
    Breakpoint(u8),
    /// The cancel token fired.
    Cancelled,
    /// The engine rejected a cycle.
    Errored(EngineError),
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Halted => "halted",
            Termination::LimitReached => "limit_reached",
            Termination::Breakpoint(_) => "breakpoint",
            Termination::Cancelled => "cancelled",
            Termination::Errored(_) => "errored",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Halted => write!(f, "halted"),
            Termination::LimitReached => write!(f, "cycle limit reached"),
            Termination::Breakpoint(address) => write!(f, "breakpoint at mailbox {address:02}"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::Errored(err) => write!(f, "error: {err}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub program: Program,
    pub content_address: ContentAddress,
    /// State after the last cycle that completed.
    pub final_state: MachineState,
    pub events: Vec<Event>,
    pub termination: Termination,
    /// Cycles executed by this run, not counting earlier runs of a resumed state.
    pub cycles_executed: u64,
    pub breakpoints: BTreeSet<u8>,
}

impl RunReport {
    pub fn breakpoint_address(&self) -> Option<u8> {
        match self.termination {
            Termination::Breakpoint(address) => Some(address),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        match &self.termination {
            Termination::Errored(err) => Some(err),
            _ => None,
        }
    }
}

enum Publish {
    Sent,
    Detached,
    Cancelled,
}

/// Hand one snapshot to the live consumer, waiting for room if needed.
///
/// The wait ends early on cancellation. A dropped receiver detaches.
async fn publish(
    tx: &mpsc::Sender<MachineState>,
    state: MachineState,
    cancel: &CancelToken,
) -> Publish {
    let state = match tx.try_send(state) {
        Ok(()) => return Publish::Sent,
        Err(TrySendError::Closed(_)) => return Publish::Detached,
        Err(TrySendError::Full(state)) => state,
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Publish::Cancelled,
        sent = tx.send(state) => match sent {
            Ok(()) => Publish::Sent,
            Err(_) => Publish::Detached,
        },
    }
}

struct Live {
    tx: mpsc::Sender<MachineState>,
    include_initial: bool,
}

/// A run that is ready to start.
pub struct PreparedRun {
    program: Program,
    content_address: ContentAddress,
    state: MachineState,
    resumed: bool,
    breakpoints: BTreeSet<u8>,
    schedule: Schedule,
    cycle_limit: Option<u64>,
    bus: EventBus,
    recorder: Recorder,
    live: Option<Live>,
    live_buffer: usize,
    yield_every: u64,
}

impl PreparedRun {
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn content_address(&self) -> &ContentAddress {
        &self.content_address
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn breakpoints(&self) -> &BTreeSet<u8> {
        &self.breakpoints
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// A handle on the run's event buffer, readable during and after the run.
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// Add an observer after the recorder.
    pub fn attach(&mut self, name: impl Into<String>, handler: Handler) {
        self.bus.attach(name, handler);
    }

    /// Stream of states, one per completed cycle, optionally preceded by the
    /// initial state. The stream ends when the run ends.
    ///
    /// The run waits for the consumer when the buffer is full, but never past
    /// cancellation; dropping the stream detaches it.
    pub fn live_states(&mut self, include_initial: bool) -> ReceiverStream<MachineState> {
        let (tx, rx) = mpsc::channel(self.live_buffer.max(1));
        self.live = Some(Live {
            tx,
            include_initial,
        });
        ReceiverStream::new(rx)
    }

    /// Drive the engine until the run ends.
    pub async fn execute(self, cancel: &CancelToken) -> RunReport {
        let PreparedRun {
            program,
            content_address,
            mut state,
            resumed,
            breakpoints,
            schedule,
            cycle_limit,
            mut bus,
            recorder,
            mut live,
            yield_every,
            ..
        } = self;

        tracing::info!(
            content_address = %content_address.short(),
            schedule = ?schedule,
            cycle_limit = ?cycle_limit,
            breakpoints = breakpoints.len(),
            resumed,
            "run started"
        );

        let mut ticker = schedule.period().map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let yield_every = yield_every.max(1);
        let mut executed = 0u64;

        let mut cancelled_early = false;
        if let Some(stream) = live.as_ref().filter(|l| l.include_initial) {
            let published = publish(&stream.tx, state.clone(), cancel).await;
            match published {
                Publish::Sent => {}
                Publish::Detached => live = None,
                Publish::Cancelled => cancelled_early = true,
            }
        }

        let termination = loop {
            if cancelled_early || cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            if state.halted {
                break Termination::Halted;
            }
            if cycle_limit.is_some_and(|max| executed >= max) {
                break Termination::LimitReached;
            }

            if let Some(interval) = ticker.as_mut() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Termination::Cancelled,
                    _ = interval.tick() => {}
                }
            } else if executed > 0 && executed % yield_every == 0 {
                tokio::task::yield_now().await;
            }

            // A resumed run starts on the breakpoint it stopped at; step over it once.
            let outcome = if resumed && executed == 0 && breakpoints.contains(&state.counter) {
                let mut relaxed = breakpoints.clone();
                relaxed.remove(&state.counter);
                step(&mut state, &relaxed, &mut bus)
            } else {
                step(&mut state, &breakpoints, &mut bus)
            };

            match outcome {
                Ok(Step::Continued) | Ok(Step::Halted) => executed += 1,
                Ok(Step::Breakpoint(address)) => break Termination::Breakpoint(address),
                Err(err) => break Termination::Errored(err),
            }

            if let Some(stream) = live.as_ref() {
                let published = publish(&stream.tx, state.clone(), cancel).await;
                match published {
                    Publish::Sent => {}
                    Publish::Detached => {
                        tracing::debug!("live state consumer went away");
                        live = None;
                    }
                    Publish::Cancelled => break Termination::Cancelled,
                }
            }
        };
        drop(live);
        drop(bus);

        tracing::info!(
            termination = termination.as_str(),
            cycles = executed,
            counter = state.counter,
            "run finished"
        );

        RunReport {
            program,
            content_address,
            final_state: state,
            events: recorder.snapshot(),
            termination,
            cycles_executed: executed,
            breakpoints,
        }
    }

    /// Run on its own task.
    pub fn spawn(self, cancel: CancelToken) -> RunHandle {
        let token = cancel.clone();
        let handle = tokio::spawn(async move { self.execute(&cancel).await });
        RunHandle { handle, token }
    }
}

impl fmt::Debug for PreparedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRun")
            .field("content_address", &self.content_address)
            .field("schedule", &self.schedule)
            .field("cycle_limit", &self.cycle_limit)
            .field("breakpoints", &self.breakpoints)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

/// A run executing on a separate task.
#[derive(Debug)]
pub struct RunHandle {
    handle: JoinHandle<RunReport>,
    token: CancelToken,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub async fn join(self) -> Result<RunReport, RunError> {
        self.handle
            .await
            .map_err(|err| RunError::Join(err.to_string()))
    }
}

/// Entry points for running programs against a workspace.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    artifacts: ArtifactStore,
}

impl Orchestrator {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            artifacts: ArtifactStore::new(config),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn breakpoints(&self) -> &BreakpointStore {
        self.artifacts.breakpoints()
    }

    pub fn settings(&self) -> &Settings {
        &self.artifacts.config().settings
    }

    /// Resolve everything a run needs. Nothing executes yet.
    pub fn prepare(&self, request: RunRequest) -> Result<PreparedRun, RunError> {
        let settings = self.settings();
        let schedule = request
            .schedule
            .or(settings.default_speed.map(Schedule::Hertz))
            .unwrap_or_default();
        schedule.validate()?;
        let explicit = validate_addresses(&request.breakpoints)?;

        let program = match request.program {
            ProgramSource::Reference(reference) => self.artifacts.load_program(&reference)?,
            ProgramSource::Inline(program) => program,
        };

        let (mut state, resumed) = match request.initial {
            InitialState::Fresh => (MachineState::fresh(&program), false),
            InitialState::Resume(state) => {
                state.validate()?;
                (state, true)
            }
            InitialState::Stored(name) => (self.artifacts.load_state(&name)?.state, true),
        };
        state.push_inputs(request.inputs);

        let content_address = ContentAddress::of_program(&program);
        let mut breakpoints = explicit;
        if request.auto_load_breakpoints && settings.auto_load_breakpoints {
            let persisted = self.breakpoints().get(&content_address)?;
            if !persisted.is_empty() {
                tracing::debug!(
                    content_address = %content_address.short(),
                    addresses = ?persisted,
                    "loaded persisted breakpoints"
                );
            }
            breakpoints.extend(persisted);
        }

        let recorder = Recorder::new();
        let bus = EventBus::compose([("recorder".to_string(), recorder.handler())]);

        Ok(PreparedRun {
            program,
            content_address,
            state,
            resumed,
            breakpoints,
            schedule,
            cycle_limit: request.cycle_limit,
            bus,
            recorder,
            live: None,
            live_buffer: settings.live_buffer,
            yield_every: settings.yield_every,
        })
    }

    pub async fn run(&self, request: RunRequest, cancel: &CancelToken) -> Result<RunReport, RunError> {
        Ok(self.prepare(request)?.execute(cancel).await)
    }

    /// Run until the counter reaches `address` (or the run ends otherwise).
    pub async fn run_until(
        &self,
        request: RunRequest,
        address: i64,
        cancel: &CancelToken,
    ) -> Result<RunReport, RunError> {
        validate_addresses(&[address])?;
        self.run(request.with_breakpoints([address]), cancel).await
    }

    /// Execute at most `count` cycles and save the result as state `name`.
    ///
    /// A fresh request continues from `name` when that state already exists.
    pub async fn step(
        &self,
        mut request: RunRequest,
        name: &str,
        count: u64,
        cancel: &CancelToken,
    ) -> Result<RunReport, RunError> {
        if count == 0 {
            return Err(RunError::InvalidCount);
        }
        validate_name(name)?;
        if matches!(request.initial, InitialState::Fresh) && self.artifacts.state_exists(name) {
            request.initial = InitialState::Stored(name.to_string());
        }
        request.cycle_limit = Some(count);

        let report = self.run(request, cancel).await?;
        self.artifacts
            .store_state(name, &report.final_state, Some(&report.program))?;
        Ok(report)
    }
}
