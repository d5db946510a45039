//! CLI command implementations.

pub mod assemble;
pub mod breakpoint;
pub mod bundle;
pub mod render;
pub mod run;
pub mod store;

pub use assemble::{assemble_program, disassemble_program};
pub use breakpoint::{
    add_breakpoints, clear_breakpoints, list_all_breakpoints, list_breakpoints, remove_breakpoints,
};
pub use bundle::{export_bundle, import_bundle};
pub use run::{run_program, run_until, step_program, RunInputs, RunOptions};
pub use store::{list_programs, list_states, remove_programs, remove_states};

use anyhow::{Context, Result};
use lmc_core::{Orchestrator, WorkspaceConfig};
use serde::Serialize;
use std::path::Path;

/// Load the workspace settings and build an orchestrator over it.
pub fn open_workspace(root: &Path) -> Result<Orchestrator> {
    let config = WorkspaceConfig::load(root)
        .with_context(|| format!("Failed to load workspace settings from {:?}", root))?;
    tracing::debug!(workspace = ?root, settings = ?config.settings, "opened workspace");
    Ok(Orchestrator::new(config))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
