//! End-to-end tests across the stores and the orchestrator

use lmc_core::{
    ArtifactStore, CancelToken, ContentAddress, ExportOptions, Orchestrator, RunRequest,
    StoreError, Termination, WorkspaceConfig,
};
use lmc_engine::assemble;
use std::collections::BTreeSet;
use tempfile::tempdir;

const ECHO: &str = "\
// read one value and echo it
        INP
        OUT
        HLT
";

#[test]
fn test_identical_images_share_breakpoints_across_names() {
    let dir = tempdir().unwrap();
    let artifacts = ArtifactStore::new(WorkspaceConfig::new(dir.path()));

    let original = assemble(ECHO).unwrap().with_name("echo");
    let renamed = assemble("start INP\nOUT\nHLT").unwrap().with_name("copy");
    artifacts.store_program("echo", &original, Some(ECHO)).unwrap();
    artifacts.store_program("copy", &renamed, None).unwrap();

    let address = artifacts.content_address("echo").unwrap();
    assert_eq!(address, artifacts.content_address("copy").unwrap());

    artifacts.breakpoints().add(&[1], &address, Some("echo")).unwrap();
    let via_copy = artifacts.content_address("copy").unwrap();
    assert_eq!(artifacts.breakpoints().get(&via_copy).unwrap(), BTreeSet::from([1]));
}

#[test]
fn test_breakpoints_survive_reopening_workspace() {
    let dir = tempdir().unwrap();
    let address = ContentAddress::of_program(&assemble(ECHO).unwrap());
    {
        let artifacts = ArtifactStore::new(WorkspaceConfig::new(dir.path()));
        artifacts
            .breakpoints()
            .add(&[15, 25, 35], &address, None)
            .unwrap();
    }

    let reopened = ArtifactStore::new(WorkspaceConfig::load(dir.path()).unwrap());
    assert_eq!(
        reopened.breakpoints().get(&address).unwrap(),
        BTreeSet::from([15, 25, 35])
    );
    let all = reopened.breakpoints().list_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content_address, address);
}

#[tokio::test]
async fn test_export_import_round_trip_into_fresh_workspace() {
    let source_dir = tempdir().unwrap();
    let exporter = Orchestrator::new(WorkspaceConfig::new(source_dir.path()));
    let program = assemble(ECHO).unwrap().with_name("echo");
    exporter
        .artifacts()
        .store_program("echo", &program, Some(ECHO))
        .unwrap();
    let address = ContentAddress::of_program(&program);
    exporter.breakpoints().add(&[2, 1], &address, Some("echo")).unwrap();

    // Leave a state paused at the first breakpoint.
    let paused = exporter
        .step(
            RunRequest::reference("echo").with_inputs([42]),
            "echo",
            10,
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(paused.termination, Termination::Breakpoint(1));

    let bytes = exporter
        .artifacts()
        .export(
            "echo",
            &ExportOptions {
                include_state: true,
                description: Some("echo with a pause".into()),
            },
        )
        .unwrap();

    let target_dir = tempdir().unwrap();
    let importer = ArtifactStore::new(WorkspaceConfig::new(target_dir.path()));
    let outcome = importer.import(&bytes, Some("imported")).unwrap();

    assert_eq!(outcome.name, "imported");
    assert!(outcome.state.is_some());
    assert_eq!(outcome.content_address, address);
    assert_eq!(outcome.breakpoints, BTreeSet::from([1, 2]));

    let restored = importer.load_program("imported").unwrap();
    assert_eq!(restored.memory_image(), program.memory_image());
    assert_eq!(importer.read_source("imported").unwrap().as_deref(), Some(ECHO));

    let state = importer.load_state("imported").unwrap().state;
    assert_eq!(state.counter, paused.final_state.counter);
    assert_eq!(state.accumulator, paused.final_state.accumulator);
    assert_eq!(state.cycles, paused.final_state.cycles);

    let rekeyed = importer.content_address("imported").unwrap();
    assert_eq!(rekeyed, address);
    assert_eq!(
        importer.breakpoints().get(&rekeyed).unwrap(),
        BTreeSet::from([1, 2])
    );
}

#[test]
fn test_names_rejected_for_programs_and_states() {
    let dir = tempdir().unwrap();
    let artifacts = ArtifactStore::new(WorkspaceConfig::new(dir.path()));
    let program = assemble(ECHO).unwrap();
    let state = lmc_engine::MachineState::fresh(&program);

    for name in ["", "a/b", "with space", "tab\tname"] {
        assert!(matches!(
            artifacts.store_program(name, &program, None),
            Err(StoreError::InvalidName { .. })
        ));
        assert!(matches!(
            artifacts.store_state(name, &state, None),
            Err(StoreError::InvalidName { .. })
        ));
    }
    assert!(artifacts.list_programs().unwrap().is_empty());
    assert!(artifacts.list_states().unwrap().is_empty());
}

#[tokio::test]
async fn test_stored_program_runs_by_name_with_persisted_breakpoint() {
    let dir = tempdir().unwrap();
    let orchestrator = Orchestrator::new(WorkspaceConfig::new(dir.path()));
    let program = assemble(ECHO).unwrap();
    orchestrator
        .artifacts()
        .store_program("echo", &program, None)
        .unwrap();
    let cancel = CancelToken::new();

    let report = orchestrator
        .run(RunRequest::reference("echo").with_inputs([42]), &cancel)
        .await
        .unwrap();
    assert_eq!(report.final_state.outbox, vec![42]);
    assert!(report.final_state.halted);
    assert_eq!(report.breakpoint_address(), None);

    let address = orchestrator.artifacts().content_address("echo").unwrap();
    orchestrator.breakpoints().add(&[1], &address, None).unwrap();

    let report = orchestrator
        .run(RunRequest::reference("echo").with_inputs([42]), &cancel)
        .await
        .unwrap();
    assert_eq!(report.breakpoint_address(), Some(1));
    assert!(!report.final_state.halted);
    assert!(report.final_state.outbox.is_empty());
}
