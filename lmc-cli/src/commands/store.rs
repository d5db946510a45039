//! `programs` and `states` listing and removal.

use super::print_json;
use anyhow::Result;
use lmc_core::Orchestrator;

pub fn list_programs(workspace: &Orchestrator, json: bool) -> Result<()> {
    let entries = workspace.artifacts().list_programs()?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No programs stored");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<20} {}  {}{}",
            entry.name,
            entry.content_address.short(),
            entry.metadata.created_at.format("%Y-%m-%d %H:%M"),
            if entry.has_source { "  (source)" } else { "" }
        );
    }
    Ok(())
}

pub fn list_states(workspace: &Orchestrator, json: bool) -> Result<()> {
    let entries = workspace.artifacts().list_states()?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No states stored");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<20} counter {:02}  cycles {:>6}  {}  {}",
            entry.name,
            entry.counter,
            entry.cycles,
            if entry.halted { "halted " } else { "running" },
            entry.saved_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub fn remove_programs(workspace: &Orchestrator, names: &[String]) -> Result<()> {
    workspace.artifacts().remove(names)?;
    println!("Removed {} program(s)", names.len());
    Ok(())
}

pub fn remove_states(workspace: &Orchestrator, names: &[String]) -> Result<()> {
    workspace.artifacts().remove_states(names)?;
    println!("Removed {} state(s)", names.len());
    Ok(())
}
