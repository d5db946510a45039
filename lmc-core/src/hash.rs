//! Content addressing for program memory images.

use crate::error::StoreError;
use lmc_engine::{Program, Word};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a content address in hex characters.
pub const CONTENT_ADDRESS_LEN: usize = 64;

/// Blake3 digest of a memory image, as lowercase hex.
///
/// Only the words are hashed (two big-endian bytes each, in mailbox order);
/// labels, names and timestamps never contribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn of_image(words: &[Word]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for word in words {
            hasher.update(&word.to_be_bytes());
        }
        ContentAddress(hasher.finalize().to_hex().to_string())
    }

    pub fn of_program(program: &Program) -> Self {
        Self::of_image(program.memory_image())
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let valid = raw.len() == CONTENT_ADDRESS_LEN
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(ContentAddress(raw.to_string()))
        } else {
            Err(StoreError::InvalidContentAddress(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ContentAddress::parse(&value)
    }
}

impl From<ContentAddress> for String {
    fn from(value: ContentAddress) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmc_engine::assemble;

    #[test]
    fn test_same_image_same_address() {
        let a = assemble("INP\nOUT\nHLT").unwrap().with_name("first");
        let b = assemble("start INP // different labels and comments\nOUT\nHLT")
            .unwrap()
            .with_name("second");
        assert_eq!(ContentAddress::of_program(&a), ContentAddress::of_program(&b));
    }

    #[test]
    fn test_program_and_raw_image_agree() {
        let program = assemble("INP\nOUT\nHLT").unwrap();
        let image: Vec<Word> = program.memory_image().to_vec();
        assert_eq!(
            ContentAddress::of_program(&program),
            ContentAddress::of_image(&image)
        );
    }

    #[test]
    fn test_order_sensitive() {
        let a = ContentAddress::of_image(&[901, 902]);
        let b = ContentAddress::of_image(&[902, 901]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fixed_length_hex() {
        let address = ContentAddress::of_image(&[0; 100]);
        assert_eq!(address.as_str().len(), CONTENT_ADDRESS_LEN);
        assert_eq!(ContentAddress::parse(address.as_str()).unwrap(), address);
        assert_eq!(address.short().len(), 12);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ContentAddress::parse("not-hex").is_err());
        assert!(ContentAddress::parse(&"A".repeat(64)).is_err());
        assert!(ContentAddress::parse(&"a".repeat(63)).is_err());
    }

    #[test]
    fn test_serde_is_plain_string() {
        let address = ContentAddress::of_image(&[1, 2, 3]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address));
        assert!(serde_json::from_str::<ContentAddress>("\"xyz\"").is_err());
    }
}
