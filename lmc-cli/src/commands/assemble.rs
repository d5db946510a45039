//! `assemble` and `disassemble`.

use super::print_json;
use anyhow::{Context, Result};
use lmc_core::{validate_name, ContentAddress, Orchestrator};
use lmc_engine::{assemble, disassemble};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct AssembledPayload<'a> {
    name: &'a str,
    path: &'a Path,
    content_address: &'a ContentAddress,
    labels: usize,
}

pub fn assemble_program(
    workspace: &Orchestrator,
    source_path: &Path,
    name: Option<&str>,
    json: bool,
) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .with_context(|| format!("Cannot derive a program name from {:?}", source_path))?,
    };
    validate_name(&name)?;

    let source = fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read {:?}", source_path))?;
    let program = assemble(&source)
        .with_context(|| format!("Failed to assemble {:?}", source_path))?
        .with_name(name.as_str());
    let location = workspace
        .artifacts()
        .store_program(&name, &program, Some(&source))?;
    let content_address = ContentAddress::of_program(&program);

    if json {
        print_json(&AssembledPayload {
            name: &name,
            path: &location.path,
            content_address: &content_address,
            labels: program.symbol_table().len(),
        })
    } else {
        println!(
            "Stored program `{}` ({}) at {}",
            name,
            content_address.short(),
            location.path.display()
        );
        Ok(())
    }
}

pub fn disassemble_program(workspace: &Orchestrator, reference: &str) -> Result<()> {
    let program = workspace.artifacts().load_program(reference)?;
    print!("{}", disassemble(&program));
    Ok(())
}
