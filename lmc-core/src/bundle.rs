//! Portable export bundles.
//!
//! A bundle is a single JSON document carrying a program plus, optionally,
//! its source text, a saved state and its breakpoints. Breakpoints travel as
//! plain addresses and are re-keyed on import under the content address of
//! the program as stored by the importing workspace.

use crate::artifacts::{read_program_file, validate_name, ArtifactStore};
use crate::breakpoints::validate_addresses;
use crate::error::StoreError;
use crate::hash::ContentAddress;
use crate::storage::remove_if_exists;
use chrono::{DateTime, Utc};
use lmc_engine::{MachineState, Program};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Newest bundle format this build reads and the one it writes.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub exported_at: DateTime<Utc>,
    pub exporter: String,
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub format_version: u32,
    pub metadata: BundleMetadata,
    pub program: Program,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MachineState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

impl ExportBundle {
    /// Parse a bundle, rejecting newer formats before looking at the rest.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let probe: VersionProbe = serde_json::from_slice(bytes).map_err(StoreError::Bundle)?;
        if probe.format_version > BUNDLE_FORMAT_VERSION {
            return Err(StoreError::Version {
                found: probe.format_version,
                supported: BUNDLE_FORMAT_VERSION,
            });
        }
        serde_json::from_slice(bytes).map_err(StoreError::Bundle)
    }

    /// Pretty JSON with a trailing newline. Field order is fixed, so equal
    /// bundles encode to equal bytes.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let mut bytes = serde_json::to_vec_pretty(self).map_err(StoreError::Bundle)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub include_state: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub name: String,
    pub program: PathBuf,
    pub state: Option<PathBuf>,
    pub content_address: ContentAddress,
    pub breakpoints: BTreeSet<u8>,
}

fn platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

impl ArtifactStore {
    pub fn export(&self, name: &str, options: &ExportOptions) -> Result<Vec<u8>, StoreError> {
        self.export_at(name, options, Utc::now())
    }

    /// Export with an explicit timestamp.
    pub fn export_at(
        &self,
        name: &str,
        options: &ExportOptions,
        exported_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, StoreError> {
        validate_name(name)?;
        let path = self.program_path(name);
        if !path.is_file() {
            return Err(StoreError::not_found("program", name));
        }
        let program = read_program_file(&path)?;
        let source = self.read_source(name)?;
        let content_address = ContentAddress::of_program(&program);
        let state = if options.include_state && self.state_exists(name) {
            let record = self.load_state(name)?;
            match record.program.as_ref().map(ContentAddress::of_program) {
                Some(companion) if companion != content_address => {
                    tracing::warn!(
                        name,
                        program = %content_address.short(),
                        state_program = %companion.short(),
                        "stored state belongs to another program; exporting without it"
                    );
                    None
                }
                _ => Some(record.state),
            }
        } else {
            None
        };
        let breakpoints = self.breakpoints().get(&content_address)?;

        let bundle = ExportBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            metadata: BundleMetadata {
                exported_at,
                exporter: self.config().settings.exporter.clone(),
                original_name: name.to_string(),
                description: options.description.clone(),
                platform: platform(),
            },
            program,
            state,
            source,
            breakpoints: (!breakpoints.is_empty()).then(|| breakpoints.into_iter().collect()),
        };
        tracing::info!(
            name,
            with_state = bundle.state.is_some(),
            breakpoints = bundle.breakpoints.as_ref().map_or(0, Vec::len),
            "exported bundle"
        );
        bundle.encode()
    }

    /// Import a bundle under `target_name` or its original name.
    ///
    /// Everything that can be checked is checked before the first write.
    pub fn import(
        &self,
        bytes: &[u8],
        target_name: Option<&str>,
    ) -> Result<ImportOutcome, StoreError> {
        let bundle = ExportBundle::decode(bytes)?;
        let name = target_name
            .unwrap_or(&bundle.metadata.original_name)
            .to_string();
        validate_name(&name)?;
        if let Some(state) = &bundle.state {
            state.validate()?;
        }
        let addresses: Vec<i64> = bundle
            .breakpoints
            .iter()
            .flatten()
            .map(|&a| i64::from(a))
            .collect();
        validate_addresses(&addresses)?;

        let program = self.store_program(&name, &bundle.program, bundle.source.as_deref())?;
        let state = match &bundle.state {
            Some(state) => Some(self.store_state(&name, state, Some(&bundle.program))?.path),
            None => {
                if remove_if_exists(&self.state_path(&name))? {
                    tracing::info!(name = %name, "removed state left by the replaced program");
                }
                None
            }
        };

        let content_address = ContentAddress::of_program(&bundle.program);
        let breakpoints = if addresses.is_empty() {
            BTreeSet::new()
        } else {
            self.breakpoints()
                .add(&addresses, &content_address, Some(&name))?
        };

        tracing::info!(
            name = %name,
            from = %bundle.metadata.original_name,
            content_address = %content_address.short(),
            "imported bundle"
        );
        Ok(ImportOutcome {
            name,
            program: program.path,
            state,
            content_address,
            breakpoints,
        })
    }
}
