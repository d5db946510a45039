//! Instruction decoding and encoding.
//!
//! Words are three decimal digits. The hundreds digit selects the opcode and
//! the remaining two digits address a mailbox:
//!
//! | word  | instruction |
//! |-------|-------------|
//! | `1xx` | ADD         |
//! | `2xx` | SUB         |
//! | `3xx` | STA         |
//! | `5xx` | LDA         |
//! | `6xx` | BRA         |
//! | `7xx` | BRZ         |
//! | `8xx` | BRP         |
//! | `901` | INP         |
//! | `902` | OUT         |
//! | `0xx` | HLT         |

use crate::error::EngineError;
use crate::Word;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "address", rename_all = "UPPERCASE")]
pub enum Instruction {
    Add(u8),
    Sub(u8),
    Sta(u8),
    Lda(u8),
    Bra(u8),
    Brz(u8),
    Brp(u8),
    Inp,
    Out,
    Hlt,
}

impl Instruction {
    /// Decode the word stored at `address`.
    pub fn decode(address: u8, word: Word) -> Result<Self, EngineError> {
        let operand = (word % 100) as u8;
        let instruction = match word / 100 {
            0 => Instruction::Hlt,
            1 => Instruction::Add(operand),
            2 => Instruction::Sub(operand),
            3 => Instruction::Sta(operand),
            5 => Instruction::Lda(operand),
            6 => Instruction::Bra(operand),
            7 => Instruction::Brz(operand),
            8 => Instruction::Brp(operand),
            9 if operand == 1 => Instruction::Inp,
            9 if operand == 2 => Instruction::Out,
            _ => return Err(EngineError::InvalidInstruction { address, word }),
        };
        Ok(instruction)
    }

    pub fn encode(&self) -> Word {
        match *self {
            Instruction::Add(a) => 100 + a as Word,
            Instruction::Sub(a) => 200 + a as Word,
            Instruction::Sta(a) => 300 + a as Word,
            Instruction::Lda(a) => 500 + a as Word,
            Instruction::Bra(a) => 600 + a as Word,
            Instruction::Brz(a) => 700 + a as Word,
            Instruction::Brp(a) => 800 + a as Word,
            Instruction::Inp => 901,
            Instruction::Out => 902,
            Instruction::Hlt => 0,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Add(_) => "ADD",
            Instruction::Sub(_) => "SUB",
            Instruction::Sta(_) => "STA",
            Instruction::Lda(_) => "LDA",
            Instruction::Bra(_) => "BRA",
            Instruction::Brz(_) => "BRZ",
            Instruction::Brp(_) => "BRP",
            Instruction::Inp => "INP",
            Instruction::Out => "OUT",
            Instruction::Hlt => "HLT",
        }
    }

    pub fn operand(&self) -> Option<u8> {
        match *self {
            Instruction::Add(a)
            | Instruction::Sub(a)
            | Instruction::Sta(a)
            | Instruction::Lda(a)
            | Instruction::Bra(a)
            | Instruction::Brz(a)
            | Instruction::Brp(a) => Some(a),
            Instruction::Inp | Instruction::Out | Instruction::Hlt => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand() {
            Some(address) => write!(f, "{} {:02}", self.mnemonic(), address),
            None => f.write_str(self.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encode_agree() {
        for word in [0, 105, 299, 350, 512, 600, 799, 842, 901, 902] {
            let instruction = Instruction::decode(0, word).unwrap();
            assert_eq!(instruction.encode(), word);
        }
    }

    #[test]
    fn test_halt_ignores_operand_digits() {
        assert_eq!(Instruction::decode(0, 42).unwrap(), Instruction::Hlt);
    }

    #[test]
    fn test_invalid_words() {
        assert_eq!(
            Instruction::decode(7, 400),
            Err(EngineError::InvalidInstruction { address: 7, word: 400 })
        );
        assert!(Instruction::decode(0, 903).is_err());
        assert!(Instruction::decode(0, 1000).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Lda(7).to_string(), "LDA 07");
        assert_eq!(Instruction::Out.to_string(), "OUT");
    }
}
