//! # lmc-core
//!
//! Orchestration and persistence layer between the `lmc` command line and
//! the Little Man Computer in `lmc-engine`.
//!
//! - **Content hashing**: [`ContentAddress`] identifies a program by its memory
//!   image only, so renamed or re-assembled programs keep their identity.
//! - **Breakpoint store**: [`BreakpointStore`] persists breakpoint sets keyed by
//!   content address.
//! - **Artifact store**: [`ArtifactStore`] keeps named programs and machine
//!   states, and exports/imports portable [`ExportBundle`]s.
//! - **Event bus**: [`EventBus`] fans engine events out to a [`Recorder`], a
//!   [`JsonLinesLogger`] and any other handler.
//! - **Orchestrator**: [`Orchestrator`] prepares runs, drives the engine under a
//!   [`Schedule`], honours a [`CancelToken`], and can stream live states.
//!
//! All stores are rooted in an explicit [`WorkspaceConfig`]; there is no
//! process-wide state, so several workspaces can be open at once.

pub mod artifacts;
pub mod breakpoints;
pub mod bundle;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod orchestrator;
mod storage;

pub use artifacts::{
    validate_name, ArtifactKind, ArtifactLocation, ArtifactStore, ProgramEntry, ProgramRecord,
    StateEntry, StateRecord,
};
pub use breakpoints::{validate_addresses, BreakpointSet, BreakpointStore};
pub use bundle::{BundleMetadata, ExportBundle, ExportOptions, ImportOutcome, BUNDLE_FORMAT_VERSION};
pub use cancel::CancelToken;
pub use config::{ConfigError, Settings, WorkspaceConfig};
pub use error::{RunError, StoreError};
pub use events::{EventBus, Handler, JsonLinesLogger, ObserverError, Recorder};
pub use hash::ContentAddress;
pub use orchestrator::{
    InitialState, Orchestrator, PreparedRun, ProgramSource, RunHandle, RunReport, RunRequest,
    Schedule, Termination,
};
