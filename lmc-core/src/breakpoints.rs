//! Persistent breakpoint sets keyed by program content address.
//!
//! Each set lives in `breakpoints/<content-address>.json`. Sets are never
//! stored empty: removing the last address deletes the file.

use crate::config::WorkspaceConfig;
use crate::error::StoreError;
use crate::hash::ContentAddress;
use crate::storage::{list_files, read_json, remove_if_exists, write_json};
use chrono::{DateTime, Utc};
use lmc_engine::MEMORY_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSet {
    pub content_address: ContentAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub addresses: BTreeSet<u8>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Check every address before anything is touched.
///
/// The first out-of-range value fails the whole batch.
pub fn validate_addresses(addresses: &[i64]) -> Result<BTreeSet<u8>, StoreError> {
    addresses
        .iter()
        .map(|&address| {
            u8::try_from(address)
                .ok()
                .filter(|&a| (a as usize) < MEMORY_SIZE)
                .ok_or(StoreError::InvalidAddress(address))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BreakpointStore {
    dir: PathBuf,
}

impl BreakpointStore {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            dir: config.breakpoints_dir(),
        }
    }

    fn path_for(&self, content_address: &ContentAddress) -> PathBuf {
        self.dir.join(format!("{}.json", content_address))
    }

    /// The stored set for `content_address`, if one exists.
    pub fn load(&self, content_address: &ContentAddress) -> Result<Option<BreakpointSet>, StoreError> {
        let path = self.path_for(content_address);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Union `addresses` into the set, creating it if needed.
    ///
    /// An existing display name is kept unless a new one is given.
    /// Returns the resulting addresses.
    pub fn add(
        &self,
        addresses: &[i64],
        content_address: &ContentAddress,
        name: Option<&str>,
    ) -> Result<BTreeSet<u8>, StoreError> {
        let addresses = validate_addresses(addresses)?;
        let now = Utc::now();

        let set = match self.load(content_address)? {
            Some(mut existing) => {
                existing.addresses.extend(addresses);
                existing.modified_at = now;
                if let Some(name) = name {
                    existing.name = Some(name.to_string());
                }
                existing
            }
            None if addresses.is_empty() => return Ok(BTreeSet::new()),
            None => BreakpointSet {
                content_address: content_address.clone(),
                name: name.map(str::to_string),
                addresses,
                created_at: now,
                modified_at: now,
            },
        };

        write_json(&self.path_for(content_address), &set)?;
        tracing::debug!(
            content_address = %content_address.short(),
            count = set.addresses.len(),
            "stored breakpoints"
        );
        Ok(set.addresses)
    }

    /// Remove `addresses` from the set. An emptied set is deleted.
    pub fn remove(
        &self,
        addresses: &[i64],
        content_address: &ContentAddress,
    ) -> Result<BTreeSet<u8>, StoreError> {
        let addresses = validate_addresses(addresses)?;
        let mut set = self
            .load(content_address)?
            .ok_or_else(|| StoreError::not_found("breakpoint set", content_address.as_str()))?;

        set.addresses.retain(|a| !addresses.contains(a));
        if set.addresses.is_empty() {
            remove_if_exists(&self.path_for(content_address))?;
            tracing::debug!(content_address = %content_address.short(), "deleted empty breakpoint set");
            return Ok(BTreeSet::new());
        }

        set.modified_at = Utc::now();
        write_json(&self.path_for(content_address), &set)?;
        Ok(set.addresses)
    }

    /// Delete the set. Absent sets are not an error.
    pub fn clear(&self, content_address: &ContentAddress) -> Result<(), StoreError> {
        if remove_if_exists(&self.path_for(content_address))? {
            tracing::debug!(content_address = %content_address.short(), "cleared breakpoints");
        }
        Ok(())
    }

    /// Addresses in ascending order; empty when no set exists.
    pub fn get(&self, content_address: &ContentAddress) -> Result<BTreeSet<u8>, StoreError> {
        Ok(self
            .load(content_address)?
            .map(|set| set.addresses)
            .unwrap_or_default())
    }

    /// Every stored set, ordered by content address.
    ///
    /// Unreadable records are logged and skipped.
    pub fn list_all(&self) -> Result<Vec<BreakpointSet>, StoreError> {
        let mut sets = Vec::new();
        for path in list_files(&self.dir, "json")? {
            match read_json::<BreakpointSet>(&path) {
                Ok(set) if set.addresses.is_empty() => {
                    tracing::warn!(path = ?path, "skipping empty breakpoint record");
                }
                Ok(set) => sets.push(set),
                Err(err) => {
                    tracing::warn!(path = ?path, error = %err, "skipping corrupt breakpoint record");
                }
            }
        }
        sets.sort_by(|a, b| a.content_address.cmp(&b.content_address));
        Ok(sets)
    }
}
