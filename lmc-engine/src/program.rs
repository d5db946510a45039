//! Assembled programs.

use crate::error::ValidationError;
use crate::{Word, MAX_WORD, MEMORY_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current program schema version written by [`ProgramMetadata::new`].
pub const PROGRAM_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ProgramMetadata {
    pub fn new() -> Self {
        Self {
            schema_version: PROGRAM_SCHEMA_VERSION,
            created_at: Utc::now(),
            generator: Some(concat!("lmc-engine/", env!("CARGO_PKG_VERSION")).to_string()),
            name: None,
        }
    }
}

impl Default for ProgramMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable memory image plus its symbol table.
///
/// Deserialization goes through [`Program::new`], so a `Program` value always
/// holds exactly [`MEMORY_SIZE`] in-range words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProgram")]
pub struct Program {
    memory: Vec<Word>,
    labels: BTreeMap<String, u8>,
    metadata: ProgramMetadata,
}

#[derive(Deserialize)]
struct RawProgram {
    memory: Vec<Word>,
    #[serde(default)]
    labels: BTreeMap<String, u8>,
    metadata: ProgramMetadata,
}

impl TryFrom<RawProgram> for Program {
    type Error = ValidationError;

    fn try_from(raw: RawProgram) -> Result<Self, Self::Error> {
        Program::new(raw.memory, raw.labels, raw.metadata)
    }
}

impl Program {
    pub fn new(
        memory: Vec<Word>,
        labels: BTreeMap<String, u8>,
        metadata: ProgramMetadata,
    ) -> Result<Self, ValidationError> {
        validate_image(&memory)?;
        for (label, &address) in &labels {
            if address as usize >= MEMORY_SIZE {
                return Err(ValidationError::LabelOutOfRange {
                    label: label.clone(),
                    address,
                });
            }
        }
        Ok(Self {
            memory,
            labels,
            metadata,
        })
    }

    /// Build a program from a prefix of words; remaining mailboxes are zero.
    pub fn from_words(words: &[Word]) -> Result<Self, ValidationError> {
        if words.len() > MEMORY_SIZE {
            return Err(ValidationError::MemorySize {
                expected: MEMORY_SIZE,
                found: words.len(),
            });
        }
        let mut memory = words.to_vec();
        memory.resize(MEMORY_SIZE, 0);
        Self::new(memory, BTreeMap::new(), ProgramMetadata::new())
    }

    pub fn memory_image(&self) -> &[Word] {
        &self.memory
    }

    pub fn symbol_table(&self) -> &BTreeMap<String, u8> {
        &self.labels
    }

    pub fn metadata(&self) -> &ProgramMetadata {
        &self.metadata
    }

    /// Label attached to `address`, if any.
    pub fn label_at(&self, address: u8) -> Option<&str> {
        self.labels
            .iter()
            .find(|&(_, &a)| a == address)
            .map(|(label, _)| label.as_str())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = Some(name.into());
        self
    }
}

/// Check that `memory` is a complete, in-range memory image.
pub fn validate_image(memory: &[Word]) -> Result<(), ValidationError> {
    if memory.len() != MEMORY_SIZE {
        return Err(ValidationError::MemorySize {
            expected: MEMORY_SIZE,
            found: memory.len(),
        });
    }
    if let Some((address, &value)) = memory.iter().enumerate().find(|&(_, &w)| w > MAX_WORD) {
        return Err(ValidationError::WordOutOfRange { address, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_words_pads_image() {
        let program = Program::from_words(&[901, 902]).unwrap();
        assert_eq!(program.memory_image().len(), MEMORY_SIZE);
        assert_eq!(&program.memory_image()[..3], &[901, 902, 0]);
    }

    #[test]
    fn test_rejects_out_of_range_word() {
        let mut memory = vec![0; MEMORY_SIZE];
        memory[5] = 1000;
        let err = Program::new(memory, BTreeMap::new(), ProgramMetadata::new()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::WordOutOfRange {
                address: 5,
                value: 1000
            }
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let json = serde_json::json!({
            "memory": [901, 902],
            "labels": {},
            "metadata": { "schema_version": 1, "created_at": "2024-01-01T00:00:00Z" }
        });
        let result: Result<Program, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_preserves_program() {
        let program = Program::from_words(&[901, 902]).unwrap().with_name("echo");
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
        assert_eq!(back.metadata().name.as_deref(), Some("echo"));
    }
}
