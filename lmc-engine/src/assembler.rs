//! Two-pass assembler and a line-oriented disassembler.
//!
//! Source lines have the shape `[label] MNEMONIC [operand]`. Comments start
//! with `//`, `#` or `;`. Operands are either decimal numbers or labels.
//! `DAT` reserves one mailbox, optionally initialised with a value.

use crate::error::{AssemblyError, AssemblyErrorKind};
use crate::instruction::Instruction;
use crate::program::{Program, ProgramMetadata};
use crate::{Word, MAX_WORD, MEMORY_SIZE};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mnemonic {
    Add,
    Sub,
    Sta,
    Lda,
    Bra,
    Brz,
    Brp,
    Inp,
    Out,
    Hlt,
    Dat,
}

impl Mnemonic {
    fn parse(token: &str) -> Option<Self> {
        let m = match token.to_ascii_uppercase().as_str() {
            "ADD" => Mnemonic::Add,
            "SUB" => Mnemonic::Sub,
            "STA" | "STO" => Mnemonic::Sta,
            "LDA" => Mnemonic::Lda,
            "BRA" => Mnemonic::Bra,
            "BRZ" => Mnemonic::Brz,
            "BRP" => Mnemonic::Brp,
            "INP" => Mnemonic::Inp,
            "OUT" => Mnemonic::Out,
            "HLT" | "COB" => Mnemonic::Hlt,
            "DAT" => Mnemonic::Dat,
            _ => return None,
        };
        Some(m)
    }

    fn takes_address(self) -> bool {
        matches!(
            self,
            Mnemonic::Add
                | Mnemonic::Sub
                | Mnemonic::Sta
                | Mnemonic::Lda
                | Mnemonic::Bra
                | Mnemonic::Brz
                | Mnemonic::Brp
        )
    }
}

struct Line<'a> {
    number: usize,
    mnemonic: Mnemonic,
    token: &'a str,
    operand: Option<&'a str>,
}

fn strip_comment(line: &str) -> &str {
    let end = ["//", "#", ";"]
        .iter()
        .filter_map(|marker| line.find(marker))
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Assemble source text into a program.
pub fn assemble(source: &str) -> Result<Program, AssemblyError> {
    let mut lines = Vec::new();
    let mut labels: BTreeMap<String, u8> = BTreeMap::new();

    // Pass 1: tokenize and assign addresses to labels.
    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let mut tokens = strip_comment(raw).split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };

        let (label, token) = match Mnemonic::parse(first) {
            Some(_) => (None, first),
            None => {
                let token = tokens.next().ok_or_else(|| {
                    AssemblyError::new(number, AssemblyErrorKind::UnknownMnemonic(first.into()))
                })?;
                (Some(first), token)
            }
        };
        let mnemonic = Mnemonic::parse(token).ok_or_else(|| {
            AssemblyError::new(number, AssemblyErrorKind::UnknownMnemonic(token.into()))
        })?;
        let operand = tokens.next();
        if let Some(extra) = tokens.next() {
            return Err(AssemblyError::new(
                number,
                AssemblyErrorKind::TrailingToken(extra.into()),
            ));
        }

        let address = lines.len();
        if address >= MEMORY_SIZE {
            return Err(AssemblyError::new(number, AssemblyErrorKind::ProgramTooLarge));
        }
        if let Some(label) = label {
            if !valid_label(label) {
                return Err(AssemblyError::new(
                    number,
                    AssemblyErrorKind::InvalidLabel(label.into()),
                ));
            }
            if labels.insert(label.to_string(), address as u8).is_some() {
                return Err(AssemblyError::new(
                    number,
                    AssemblyErrorKind::DuplicateLabel(label.into()),
                ));
            }
        }
        lines.push(Line {
            number,
            mnemonic,
            token,
            operand,
        });
    }

    // Pass 2: encode.
    let mut memory: Vec<Word> = Vec::with_capacity(MEMORY_SIZE);
    for line in &lines {
        memory.push(encode_line(line, &labels)?);
    }
    memory.resize(MEMORY_SIZE, 0);

    // Every word was range-checked above, so validation cannot fail here.
    Program::new(memory, labels, ProgramMetadata::new())
        .map_err(|_| AssemblyError::new(0, AssemblyErrorKind::ProgramTooLarge))
}

fn encode_line(line: &Line<'_>, labels: &BTreeMap<String, u8>) -> Result<Word, AssemblyError> {
    let err = |kind| AssemblyError::new(line.number, kind);
    let resolve = |operand: &str, max: i64| -> Result<Word, AssemblyError> {
        let value = match operand.parse::<i64>() {
            Ok(value) => value,
            Err(_) => *labels
                .get(operand)
                .ok_or_else(|| err(AssemblyErrorKind::UndefinedLabel(operand.into())))?
                as i64,
        };
        if !(0..=max).contains(&value) {
            return Err(err(AssemblyErrorKind::OperandOutOfRange { value, max }));
        }
        Ok(value as Word)
    };

    if line.mnemonic == Mnemonic::Dat {
        return match line.operand {
            Some(operand) => resolve(operand, MAX_WORD as i64),
            None => Ok(0),
        };
    }

    if line.mnemonic.takes_address() {
        let operand = line
            .operand
            .ok_or_else(|| err(AssemblyErrorKind::MissingOperand(line.token.into())))?;
        let address = resolve(operand, MEMORY_SIZE as i64 - 1)? as u8;
        let instruction = match line.mnemonic {
            Mnemonic::Add => Instruction::Add(address),
            Mnemonic::Sub => Instruction::Sub(address),
            Mnemonic::Sta => Instruction::Sta(address),
            Mnemonic::Lda => Instruction::Lda(address),
            Mnemonic::Bra => Instruction::Bra(address),
            Mnemonic::Brz => Instruction::Brz(address),
            _ => Instruction::Brp(address),
        };
        return Ok(instruction.encode());
    }

    if let Some(operand) = line.operand {
        return Err(err(AssemblyErrorKind::UnexpectedOperand(operand.into())));
    }
    let instruction = match line.mnemonic {
        Mnemonic::Inp => Instruction::Inp,
        Mnemonic::Out => Instruction::Out,
        _ => Instruction::Hlt,
    };
    Ok(instruction.encode())
}

/// Render a program as one line per mailbox, up to and including the first
/// zero word after the last non-zero word (usually the closing `HLT`).
///
/// Each line reads `AA  WWW  TEXT`, followed by `  ; label` when a label
/// points at the mailbox. Words that do not decode are shown as `DAT`.
pub fn disassemble(program: &Program) -> String {
    let memory = program.memory_image();
    let last = memory
        .iter()
        .rposition(|&w| w != 0)
        .map(|i| (i + 1).min(MEMORY_SIZE - 1))
        .unwrap_or(0);
    let last_label = program
        .symbol_table()
        .values()
        .copied()
        .max()
        .map(|a| a as usize)
        .unwrap_or(0);

    let mut out = String::new();
    for (address, &word) in memory.iter().enumerate().take(last.max(last_label) + 1) {
        let text = match Instruction::decode(address as u8, word) {
            Ok(instruction) => instruction.to_string(),
            Err(_) => format!("DAT {word:03}"),
        };
        out.push_str(&format!("{address:02}  {word:03}  {text}"));
        if let Some(label) = program.label_at(address as u8) {
            out.push_str(&format!("  ; {label}"));
        }
        out.push('\n');
    }
    out
}
