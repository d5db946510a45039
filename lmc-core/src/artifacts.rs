//! Name-addressed storage for programs and machine states.
//!
//! Layout under the workspace root:
//!
//! ```text
//! programs/<name>.json   ProgramRecord
//! programs/<name>.lmc    optional assembly source
//! states/<name>.json     StateRecord (state + optional companion program)
//! ```

use crate::breakpoints::BreakpointStore;
use crate::config::WorkspaceConfig;
use crate::error::StoreError;
use crate::hash::ContentAddress;
use crate::storage::{io_error, list_files, read_json, remove_if_exists, write_atomic, write_json};
use chrono::{DateTime, Utc};
use lmc_engine::{assemble, validate_image, MachineState, Program, ProgramMetadata, Word};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Version written into program and state records.
pub const RECORD_VERSION: u32 = 1;

/// Extension of co-located assembly source files.
pub const SOURCE_EXTENSION: &str = "lmc";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid name regex"));

/// Reject empty names and anything outside `[A-Za-z0-9_-]`.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "name must not be empty",
        });
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "only letters, digits, '-' and '_' are allowed",
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Program,
    State,
    Source,
    Bundle,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Program => "program",
            ArtifactKind::State => "state",
            ArtifactKind::Source => "source",
            ArtifactKind::Bundle => "bundle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub program: Program,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: MachineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<Program>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramEntry {
    pub name: String,
    pub metadata: ProgramMetadata,
    pub content_address: ContentAddress,
    pub has_source: bool,
    pub location: ArtifactLocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateEntry {
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub counter: u8,
    pub cycles: u64,
    pub halted: bool,
    pub has_program: bool,
    pub location: ArtifactLocation,
}

/// Only the memory image of a program or state file, for hashing without
/// building a full [`Program`].
#[derive(Deserialize)]
struct ImageProbe {
    #[serde(default)]
    memory: Option<Vec<Word>>,
    #[serde(default)]
    program: Option<Box<ImageProbe>>,
}

impl ImageProbe {
    fn into_image(self) -> Option<Vec<Word>> {
        match self.program {
            Some(inner) => inner.into_image(),
            None => self.memory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    config: WorkspaceConfig,
    breakpoints: BreakpointStore,
}

impl ArtifactStore {
    pub fn new(config: WorkspaceConfig) -> Self {
        let breakpoints = BreakpointStore::new(&config);
        Self {
            config,
            breakpoints,
        }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn breakpoints(&self) -> &BreakpointStore {
        &self.breakpoints
    }

    pub fn program_path(&self, name: &str) -> PathBuf {
        self.config.programs_dir().join(format!("{name}.json"))
    }

    pub fn source_path(&self, name: &str) -> PathBuf {
        self.config
            .programs_dir()
            .join(format!("{name}.{SOURCE_EXTENSION}"))
    }

    pub fn state_path(&self, name: &str) -> PathBuf {
        self.config.states_dir().join(format!("{name}.json"))
    }

    pub fn store_program(
        &self,
        name: &str,
        program: &Program,
        source: Option<&str>,
    ) -> Result<ArtifactLocation, StoreError> {
        validate_name(name)?;
        let path = self.program_path(name);
        let record = ProgramRecord {
            version: RECORD_VERSION,
            saved_at: Utc::now(),
            program: program.clone(),
        };
        write_json(&path, &record)?;

        // The source file belongs to the program it was stored with.
        match source.filter(|s| !s.trim().is_empty()) {
            Some(source) => write_atomic(&self.source_path(name), source.as_bytes())?,
            None => {
                if remove_if_exists(&self.source_path(name))? {
                    tracing::debug!(name, "removed stale source");
                }
            }
        }

        tracing::info!(name, path = ?path, "stored program");
        Ok(ArtifactLocation {
            kind: ArtifactKind::Program,
            path,
        })
    }

    pub fn store_state(
        &self,
        name: &str,
        state: &MachineState,
        program: Option<&Program>,
    ) -> Result<ArtifactLocation, StoreError> {
        validate_name(name)?;
        state.validate()?;
        let path = self.state_path(name);
        let record = StateRecord {
            version: RECORD_VERSION,
            saved_at: Utc::now(),
            state: state.clone(),
            program: program.cloned(),
        };
        write_json(&path, &record)?;

        tracing::info!(name, path = ?path, cycles = state.cycles, "stored state");
        Ok(ArtifactLocation {
            kind: ArtifactKind::State,
            path,
        })
    }

    /// Resolve a reference to a file.
    ///
    /// An existing path is used as is. Anything else must be a valid name and
    /// is looked up among programs first, then states.
    pub fn resolve(&self, reference: &str) -> Result<ArtifactLocation, StoreError> {
        let direct = Path::new(reference);
        if direct.is_file() {
            return Ok(ArtifactLocation {
                kind: detect_kind(direct)?,
                path: direct.to_path_buf(),
            });
        }

        validate_name(reference)?;
        let program = self.program_path(reference);
        if program.is_file() {
            return Ok(ArtifactLocation {
                kind: ArtifactKind::Program,
                path: program,
            });
        }
        let state = self.state_path(reference);
        if state.is_file() {
            return Ok(ArtifactLocation {
                kind: ArtifactKind::State,
                path: state,
            });
        }
        Err(StoreError::not_found("program or state", reference))
    }

    /// Load a program from any kind of reference.
    ///
    /// State files yield their companion program, source files are
    /// assembled, bundles yield their program.
    pub fn load_program(&self, reference: &str) -> Result<Program, StoreError> {
        let location = self.resolve(reference)?;
        let path = &location.path;
        match location.kind {
            ArtifactKind::Program => read_program_file(path),
            ArtifactKind::State => {
                let record: StateRecord = read_json(path)?;
                record.program.ok_or_else(|| StoreError::Malformed {
                    path: path.clone(),
                    message: "state has no companion program".to_string(),
                })
            }
            ArtifactKind::Source => {
                let source = fs::read_to_string(path).map_err(io_error(path))?;
                let program = assemble(&source)?;
                Ok(match path.file_stem().and_then(|s| s.to_str()) {
                    Some(stem) => program.with_name(stem),
                    None => program,
                })
            }
            ArtifactKind::Bundle => {
                let bytes = fs::read(path).map_err(io_error(path))?;
                Ok(crate::bundle::ExportBundle::decode(&bytes)?.program)
            }
        }
    }

    /// Load a stored state by name, or from a state file path.
    pub fn load_state(&self, reference: &str) -> Result<StateRecord, StoreError> {
        let direct = Path::new(reference);
        let path = if direct.is_file() {
            direct.to_path_buf()
        } else {
            validate_name(reference)?;
            let path = self.state_path(reference);
            if !path.is_file() {
                return Err(StoreError::not_found("state", reference));
            }
            path
        };
        let record: StateRecord = read_json(&path)?;
        record.state.validate()?;
        Ok(record)
    }

    pub fn state_exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.state_path(name).is_file()
    }

    /// Co-located source text for a stored program, if one was saved.
    pub fn read_source(&self, name: &str) -> Result<Option<String>, StoreError> {
        validate_name(name)?;
        let path = self.source_path(name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    /// Content address of a referenced program.
    ///
    /// Stored program and state files are hashed straight from their
    /// serialized image; other references are loaded first.
    pub fn content_address(&self, reference: &str) -> Result<ContentAddress, StoreError> {
        let location = self.resolve(reference)?;
        match location.kind {
            ArtifactKind::Program | ArtifactKind::State => {
                let probe: ImageProbe = read_json(&location.path)?;
                let image = probe.into_image().ok_or_else(|| StoreError::Malformed {
                    path: location.path.clone(),
                    message: "no program memory image".to_string(),
                })?;
                validate_image(&image)?;
                Ok(ContentAddress::of_image(&image))
            }
            ArtifactKind::Source | ArtifactKind::Bundle => {
                Ok(ContentAddress::of_program(&self.load_program(reference)?))
            }
        }
    }

    /// Stored programs in ascending name order. Unreadable entries are skipped.
    pub fn list_programs(&self) -> Result<Vec<ProgramEntry>, StoreError> {
        let mut entries = Vec::new();
        for path in list_files(&self.config.programs_dir(), "json")? {
            let Some(name) = file_name(&path) else {
                continue;
            };
            match read_program_file(&path) {
                Ok(program) => entries.push(ProgramEntry {
                    has_source: self.source_path(&name).is_file(),
                    content_address: ContentAddress::of_program(&program),
                    metadata: program.metadata().clone(),
                    location: ArtifactLocation {
                        kind: ArtifactKind::Program,
                        path,
                    },
                    name,
                }),
                Err(err) => tracing::warn!(path = ?path, error = %err, "skipping unreadable program"),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Stored states in ascending name order. Unreadable entries are skipped.
    pub fn list_states(&self) -> Result<Vec<StateEntry>, StoreError> {
        let mut entries = Vec::new();
        for path in list_files(&self.config.states_dir(), "json")? {
            let Some(name) = file_name(&path) else {
                continue;
            };
            match read_json::<StateRecord>(&path) {
                Ok(record) => entries.push(StateEntry {
                    name,
                    saved_at: record.saved_at,
                    counter: record.state.counter,
                    cycles: record.state.cycles,
                    halted: record.state.halted,
                    has_program: record.program.is_some(),
                    location: ArtifactLocation {
                        kind: ArtifactKind::State,
                        path,
                    },
                }),
                Err(err) => tracing::warn!(path = ?path, error = %err, "skipping unreadable state"),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Remove stored programs. Every name is checked before anything is
    /// deleted; source files go best-effort.
    pub fn remove(&self, names: &[String]) -> Result<(), StoreError> {
        let paths = self.existing(names, "program", |name| self.program_path(name))?;
        for (name, path) in names.iter().zip(paths) {
            remove_if_exists(&path)?;
            if let Err(err) = remove_if_exists(&self.source_path(name)) {
                tracing::warn!(name = %name, error = %err, "could not remove program source");
            }
            tracing::info!(name = %name, "removed program");
        }
        Ok(())
    }

    /// Remove stored states, with the same all-or-nothing name check as
    /// [`ArtifactStore::remove`].
    pub fn remove_states(&self, names: &[String]) -> Result<(), StoreError> {
        let paths = self.existing(names, "state", |name| self.state_path(name))?;
        for (name, path) in names.iter().zip(paths) {
            remove_if_exists(&path)?;
            tracing::info!(name = %name, "removed state");
        }
        Ok(())
    }

    fn existing(
        &self,
        names: &[String],
        kind: &'static str,
        path_for: impl Fn(&str) -> PathBuf,
    ) -> Result<Vec<PathBuf>, StoreError> {
        names
            .iter()
            .map(|name| {
                validate_name(name)?;
                let path = path_for(name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(StoreError::not_found(kind, name.as_str()))
                }
            })
            .collect()
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| validate_name(s).is_ok())
        .map(str::to_string)
}

/// Accepts both a [`ProgramRecord`] and a bare serialized [`Program`].
pub(crate) fn read_program_file(path: &Path) -> Result<Program, StoreError> {
    let value: serde_json::Value = read_json(path)?;
    let result = if value.get("program").is_some() {
        serde_json::from_value::<ProgramRecord>(value).map(|record| record.program)
    } else {
        serde_json::from_value::<Program>(value)
    };
    result.map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

fn detect_kind(path: &Path) -> Result<ArtifactKind, StoreError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("lmc") | Some("asm") | Some("txt") => return Ok(ArtifactKind::Source),
        Some("json") => {}
        _ => {
            return Err(StoreError::Malformed {
                path: path.to_path_buf(),
                message: "expected a .json, .lmc or .asm file".to_string(),
            })
        }
    }

    let value: serde_json::Value = read_json(path)?;
    let kind = if value.get("format_version").is_some() {
        ArtifactKind::Bundle
    } else if value.get("state").is_some() {
        ArtifactKind::State
    } else if value.get("program").is_some() || value.get("memory").is_some() {
        ArtifactKind::Program
    } else {
        return Err(StoreError::Malformed {
            path: path.to_path_buf(),
            message: "not a program, state or bundle".to_string(),
        });
    };
    Ok(kind)
}
