use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const ECHO: &str = "INP\nOUT\nHLT\n";

fn lmc(workspace: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("lmc")?;
    cmd.env_remove("LMC_WORKSPACE").arg("--workspace").arg(workspace);
    Ok(cmd)
}

fn assemble_echo(dir: &Path) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
    let workspace = dir.join("ws");
    let source = dir.join("echo.lmc");
    fs::write(&source, ECHO)?;
    lmc(&workspace)?
        .arg("assemble")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored program `echo`"));
    Ok(workspace)
}

#[test]
fn run_echo_outputs_input() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;

    let assert = lmc(&workspace)?
        .args(["run", "echo", "--input", "42", "--json"])
        .assert()
        .success();
    let report: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(report["termination"], "halted");
    assert_eq!(report["state"]["outbox"], serde_json::json!([42]));
    assert_eq!(report["state"]["halted"], true);
    assert!(report["breakpoint"].is_null());
    Ok(())
}

#[test]
fn persisted_breakpoint_stops_run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;

    lmc(&workspace)?
        .args(["breakpoint", "add", "echo", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("01"));

    let assert = lmc(&workspace)?
        .args(["run", "echo", "--input", "42", "--json"])
        .assert()
        .success();
    let report: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(report["termination"], "breakpoint");
    assert_eq!(report["breakpoint"], 1);
    assert_eq!(report["state"]["halted"], false);

    lmc(&workspace)?
        .args(["run", "echo", "--input", "42", "--no-auto-breakpoints"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Halted after 3 cycles"));
    Ok(())
}

#[test]
fn breakpoint_rejects_out_of_range_address() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;

    lmc(&workspace)?
        .args(["breakpoint", "add", "echo", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid breakpoint address 100"));

    lmc(&workspace)?
        .args(["breakpoint", "list-all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No breakpoints stored"));
    Ok(())
}

#[test]
fn zero_speed_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;

    lmc(&workspace)?
        .args(["run", "echo", "--input", "1", "--speed", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid speed"));

    lmc(&workspace)?
        .args(["run", "echo", "--input", "1", "--speed", "1e-30"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid speed"));
    Ok(())
}

#[test]
fn step_saves_session_between_invocations() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;

    lmc(&workspace)?
        .args(["step", "echo", "--input", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cycle limit reached after 1 cycle"));

    lmc(&workspace)?
        .args(["step", "echo", "--count", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("outbox: [5]"));

    lmc(&workspace)?
        .args(["states", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("session"));
    Ok(())
}

#[test]
fn awaiting_input_fails_run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;

    lmc(&workspace)?
        .args(["run", "echo"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Error after 0 cycles"))
        .stderr(predicate::str::contains("waiting for input"));
    Ok(())
}

#[test]
fn export_import_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;
    lmc(&workspace)?
        .args(["breakpoint", "add", "echo", "2"])
        .assert()
        .success();

    let bundle = dir.path().join("echo.bundle.json");
    lmc(&workspace)?
        .args(["export", "echo", "--description", "demo", "--output"])
        .arg(&bundle)
        .assert()
        .success();

    let other = dir.path().join("other");
    let assert = lmc(&other)?
        .args(["import", "--name", "copy", "--json"])
        .arg(&bundle)
        .assert()
        .success();
    let outcome: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(outcome["name"], "copy");
    assert_eq!(outcome["breakpoints"], serde_json::json!([2]));

    lmc(&other)?
        .args(["breakpoint", "list", "copy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("02"));

    lmc(&other)?
        .args(["programs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("copy").and(predicate::str::contains("(source)")));
    Ok(())
}

#[test]
fn invalid_program_name_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let source = dir.path().join("echo.lmc");
    fs::write(&source, ECHO)?;

    lmc(&dir.path().join("ws"))?
        .arg("assemble")
        .arg(&source)
        .args(["--name", "bad name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid name"));
    Ok(())
}

#[test]
fn disassemble_stored_program() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let workspace = assemble_echo(dir.path())?;

    lmc(&workspace)?
        .args(["disassemble", "echo"])
        .assert()
        .success()
        .stdout("00  901  INP\n01  902  OUT\n02  000  HLT\n");
    Ok(())
}
