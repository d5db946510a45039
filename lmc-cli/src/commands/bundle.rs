//! `export` and `import`.

use super::print_json;
use anyhow::{Context, Result};
use lmc_core::{ExportOptions, Orchestrator};
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn export_bundle(
    workspace: &Orchestrator,
    name: &str,
    with_state: bool,
    description: Option<String>,
    output: Option<&Path>,
) -> Result<()> {
    let options = ExportOptions {
        include_state: with_state,
        description,
    };
    let bytes = workspace.artifacts().export(name, &options)?;

    match output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!("Exported `{}` to {}", name, path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn import_bundle(
    workspace: &Orchestrator,
    bundle: &Path,
    name: Option<&str>,
    json: bool,
) -> Result<()> {
    let bytes = fs::read(bundle).with_context(|| format!("Failed to read {:?}", bundle))?;
    let outcome = workspace.artifacts().import(&bytes, name)?;

    if json {
        return print_json(&outcome);
    }
    println!(
        "Imported `{}` ({}) to {}",
        outcome.name,
        outcome.content_address.short(),
        outcome.program.display()
    );
    if let Some(state) = &outcome.state {
        println!("  state: {}", state.display());
    }
    if !outcome.breakpoints.is_empty() {
        println!("  breakpoints: {:?}", outcome.breakpoints);
    }
    Ok(())
}
