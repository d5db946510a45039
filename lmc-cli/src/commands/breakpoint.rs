//! `breakpoint` subcommands.
//!
//! Programs are given by name or path; the breakpoints are stored under the
//! program's content address.

use super::print_json;
use anyhow::Result;
use lmc_core::{validate_name, ContentAddress, Orchestrator};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Serialize)]
struct BreakpointPayload<'a> {
    program: &'a str,
    content_address: &'a ContentAddress,
    addresses: &'a BTreeSet<u8>,
}

/// Short name recorded next to the set: the reference itself when it is a
/// plain name, otherwise the file stem.
fn display_name(reference: &str) -> Option<String> {
    if validate_name(reference).is_ok() {
        return Some(reference.to_string());
    }
    Path::new(reference)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

fn format_addresses(addresses: &BTreeSet<u8>) -> String {
    if addresses.is_empty() {
        return "none".to_string();
    }
    addresses
        .iter()
        .map(|a| format!("{a:02}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn add_breakpoints(workspace: &Orchestrator, program: &str, addresses: &[i64]) -> Result<()> {
    let content_address = workspace.artifacts().content_address(program)?;
    let name = display_name(program);
    let all = workspace
        .breakpoints()
        .add(addresses, &content_address, name.as_deref())?;
    println!("Breakpoints for `{}`: {}", program, format_addresses(&all));
    Ok(())
}

pub fn remove_breakpoints(workspace: &Orchestrator, program: &str, addresses: &[i64]) -> Result<()> {
    let content_address = workspace.artifacts().content_address(program)?;
    let remaining = workspace.breakpoints().remove(addresses, &content_address)?;
    println!("Breakpoints for `{}`: {}", program, format_addresses(&remaining));
    Ok(())
}

pub fn clear_breakpoints(workspace: &Orchestrator, program: &str) -> Result<()> {
    let content_address = workspace.artifacts().content_address(program)?;
    workspace.breakpoints().clear(&content_address)?;
    println!("Cleared breakpoints for `{}`", program);
    Ok(())
}

pub fn list_breakpoints(workspace: &Orchestrator, program: &str, json: bool) -> Result<()> {
    let content_address = workspace.artifacts().content_address(program)?;
    let addresses = workspace.breakpoints().get(&content_address)?;
    if json {
        return print_json(&BreakpointPayload {
            program,
            content_address: &content_address,
            addresses: &addresses,
        });
    }
    println!("{}", format_addresses(&addresses));
    Ok(())
}

pub fn list_all_breakpoints(workspace: &Orchestrator, json: bool) -> Result<()> {
    let sets = workspace.breakpoints().list_all()?;
    if json {
        return print_json(&sets);
    }
    if sets.is_empty() {
        println!("No breakpoints stored");
        return Ok(());
    }
    for set in sets {
        println!(
            "{}  {:<20} {}",
            set.content_address.short(),
            set.name.as_deref().unwrap_or("-"),
            format_addresses(&set.addresses)
        );
    }
    Ok(())
}
