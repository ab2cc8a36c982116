//! Per-format instruction encoders.
//!
//! Every source line becomes one [`Instruction`]. Field extraction happens at
//! construction; branch and jump targets written as labels stay
//! [`BranchTarget::Pending`] until the second pass calls `resolve_offset`.

use crate::bits::{field, immediate_bits, parse_immediate, parse_register, register_bits, render, uint_bits, Bits, BitsRef};
use crate::error::AsmError;
use crate::instructions::{lookup, Format, InstrDesc};
use crate::labels::LabelTable;

/// Bytes per instruction; label offsets are index deltas scaled by this.
pub const INSTRUCTION_SIZE: i64 = 4;

const SB_IMM_BITS: usize = 13;
const UJ_IMM_BITS: usize = 21;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    Pending { label: String },
    Resolved { offset: i64 },
}

impl BranchTarget {
    fn offset(&self, text: &str) -> Result<i64, AsmError> {
        match self {
            BranchTarget::Resolved { offset } => Ok(*offset),
            BranchTarget::Pending { label } => Err(AsmError::UnresolvedTarget {
                label: label.clone(),
                inst: text.to_string(),
            }),
        }
    }

    fn resolve(&mut self, self_index: usize, labels: &LabelTable, bits: usize, text: &str) -> Result<(), AsmError> {
        let BranchTarget::Pending { label } = self else {
            return Ok(());
        };
        let target = labels.get(label).ok_or_else(|| AsmError::UndefinedLabel {
            label: label.clone(),
            inst: text.to_string(),
        })?;
        let offset = (target as i64 - self_index as i64) * INSTRUCTION_SIZE;
        check_branch_offset(offset, bits, text)?;
        *self = BranchTarget::Resolved { offset };
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RInst {
    pub desc: &'static InstrDesc,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IInst {
    pub desc: &'static InstrDesc,
    pub rd: u8,
    pub rs1: u8,
    pub imm: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SInst {
    pub desc: &'static InstrDesc,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbInst {
    pub desc: &'static InstrDesc,
    pub rs1: u8,
    pub rs2: u8,
    pub target: BranchTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UInst {
    pub desc: &'static InstrDesc,
    pub rd: u8,
    pub imm: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UjInst {
    pub desc: &'static InstrDesc,
    pub rd: u8,
    pub target: BranchTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    R(RInst),
    I(IInst),
    S(SInst),
    Sb(SbInst),
    U(UInst),
    Uj(UjInst),
}

/// One parsed source instruction together with its (label-stripped) text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    text: String,
    variant: Variant,
}

impl Instruction {
    /// Parses one label-free instruction line.
    pub fn parse(text: &str) -> Result<Self, AsmError> {
        let text = text.trim();
        let mut words = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|w| !w.is_empty());
        let mnemonic = words.next().ok_or_else(|| AsmError::UnknownOpcode {
            mnemonic: String::new(),
            inst: text.to_string(),
        })?;
        let desc = lookup(mnemonic).ok_or_else(|| AsmError::UnknownOpcode {
            mnemonic: mnemonic.to_ascii_lowercase(),
            inst: text.to_string(),
        })?;
        let tokens = split_memory_operands(words, text)?;
        let mut ops = Operands { text, tokens, next: 0 };

        let variant = match desc.format {
            Format::R => Variant::R(RInst {
                desc,
                rd: ops.register()?,
                rs1: ops.register()?,
                rs2: ops.register()?,
            }),
            Format::I => {
                let rd = ops.register()?;
                let rs1 = ops.register()?;
                let imm = ops.immediate()?;
                check_signed(imm, 12, text)?;
                Variant::I(IInst { desc, rd, rs1, imm })
            }
            Format::S => {
                let rs2 = ops.register()?;
                let rs1 = ops.register()?;
                let imm = ops.immediate()?;
                check_signed(imm, 12, text)?;
                Variant::S(SInst { desc, rs1, rs2, imm })
            }
            Format::Sb => Variant::Sb(SbInst {
                desc,
                rs1: ops.register()?,
                rs2: ops.register()?,
                target: ops.target(SB_IMM_BITS)?,
            }),
            Format::U => {
                let rd = ops.register()?;
                let imm = ops.immediate()?;
                // lui takes the upper 20 bits either as a signed or an unsigned value
                if !(-(1 << 19)..(1 << 20)).contains(&imm) {
                    return Err(AsmError::ImmediateOutOfRange { value: imm, bits: 20, inst: text.to_string() });
                }
                Variant::U(UInst { desc, rd, imm })
            }
            Format::Uj => Variant::Uj(UjInst {
                desc,
                rd: ops.register()?,
                target: ops.target(UJ_IMM_BITS)?,
            }),
        };
        ops.finish()?;
        Ok(Self { text: text.to_string(), variant })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn desc(&self) -> &'static InstrDesc {
        match &self.variant {
            Variant::R(i) => i.desc,
            Variant::I(i) => i.desc,
            Variant::S(i) => i.desc,
            Variant::Sb(i) => i.desc,
            Variant::U(i) => i.desc,
            Variant::Uj(i) => i.desc,
        }
    }

    pub fn format(&self) -> Format {
        self.desc().format
    }

    /// Label still waiting for the second pass, if any.
    pub fn pending_label(&self) -> Option<&str> {
        let target = match &self.variant {
            Variant::Sb(b) => &b.target,
            Variant::Uj(j) => &j.target,
            _ => return None,
        };
        match target {
            BranchTarget::Pending { label } => Some(label),
            BranchTarget::Resolved { .. } => None,
        }
    }

    /// Completes the immediate of an SB or UJ instruction from the label table.
    ///
    /// `self_index` is this instruction's position in the program. Targets that
    /// are already resolved are left untouched, as are the other formats.
    pub fn resolve_offset(&mut self, self_index: usize, labels: &LabelTable) -> Result<(), AsmError> {
        match &mut self.variant {
            Variant::Sb(b) => b.target.resolve(self_index, labels, SB_IMM_BITS, &self.text),
            Variant::Uj(j) => j.target.resolve(self_index, labels, UJ_IMM_BITS, &self.text),
            _ => Ok(()),
        }
    }

    /// The 32-character binary word.
    pub fn encode(&self) -> Result<String, AsmError> {
        let word = match &self.variant {
            Variant::R(r) => concat(&[
                &uint_bits(r.desc.funct7 as u64, 7),
                &register_bits(r.rs2),
                &register_bits(r.rs1),
                &uint_bits(r.desc.funct3 as u64, 3),
                &register_bits(r.rd),
                &uint_bits(r.desc.opcode as u64, 7),
            ]),
            Variant::I(i) => concat(&[
                &immediate_bits(i.imm, 12),
                &register_bits(i.rs1),
                &uint_bits(i.desc.funct3 as u64, 3),
                &register_bits(i.rd),
                &uint_bits(i.desc.opcode as u64, 7),
            ]),
            Variant::S(s) => {
                let imm = immediate_bits(s.imm, 12);
                concat(&[
                    field(&imm, 11, 5),
                    &register_bits(s.rs2),
                    &register_bits(s.rs1),
                    &uint_bits(s.desc.funct3 as u64, 3),
                    field(&imm, 4, 0),
                    &uint_bits(s.desc.opcode as u64, 7),
                ])
            }
            Variant::Sb(b) => {
                let imm = immediate_bits(b.target.offset(&self.text)?, SB_IMM_BITS);
                concat(&[
                    field(&imm, 12, 12),
                    field(&imm, 10, 5),
                    &register_bits(b.rs2),
                    &register_bits(b.rs1),
                    &uint_bits(b.desc.funct3 as u64, 3),
                    field(&imm, 4, 1),
                    field(&imm, 11, 11),
                    &uint_bits(b.desc.opcode as u64, 7),
                ])
            }
            Variant::U(u) => concat(&[
                &immediate_bits(u.imm, 20),
                &register_bits(u.rd),
                &uint_bits(u.desc.opcode as u64, 7),
            ]),
            Variant::Uj(j) => {
                let imm = immediate_bits(j.target.offset(&self.text)?, UJ_IMM_BITS);
                concat(&[
                    field(&imm, 20, 20),
                    field(&imm, 10, 1),
                    field(&imm, 11, 11),
                    field(&imm, 19, 12),
                    &register_bits(j.rd),
                    &uint_bits(j.desc.opcode as u64, 7),
                ])
            }
        };
        debug_assert_eq!(word.len(), 32);
        Ok(word)
    }
}

fn concat(parts: &[&BitsRef]) -> String {
    let mut word = Bits::with_capacity(32);
    for part in parts {
        word.extend_from_bitslice(part);
    }
    render(&word)
}

fn check_signed(value: i64, bits: usize, text: &str) -> Result<(), AsmError> {
    let half = 1i64 << (bits - 1);
    if (-half..half).contains(&value) {
        Ok(())
    } else {
        Err(AsmError::ImmediateOutOfRange { value, bits, inst: text.to_string() })
    }
}

// Bit 0 of a branch offset is dropped by the encoding, so odd offsets are
// rejected rather than silently rounded.
fn check_branch_offset(offset: i64, bits: usize, text: &str) -> Result<(), AsmError> {
    check_signed(offset, bits, text)?;
    if offset % 2 != 0 {
        return Err(AsmError::ImmediateOutOfRange { value: offset, bits, inst: text.to_string() });
    }
    Ok(())
}

/// Rewrites each `offset(register)` token into `register offset`.
fn split_memory_operands<'a>(words: impl Iterator<Item = &'a str>, text: &str) -> Result<Vec<String>, AsmError> {
    let mut tokens = Vec::new();
    for word in words {
        let Some(open) = word.find('(') else {
            tokens.push(word.to_string());
            continue;
        };
        let malformed = || AsmError::MalformedMemoryOperand {
            token: word.to_string(),
            inst: text.to_string(),
        };
        let inner = word[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
        if inner.is_empty() || inner.contains(|c| c == '(' || c == ')') {
            return Err(malformed());
        }
        let offset = &word[..open];
        tokens.push(inner.to_string());
        tokens.push(if offset.is_empty() { "0".to_string() } else { offset.to_string() });
    }
    Ok(tokens)
}

struct Operands<'a> {
    text: &'a str,
    tokens: Vec<String>,
    next: usize,
}

impl Operands<'_> {
    fn take(&mut self) -> Result<&str, AsmError> {
        let position = self.next + 1;
        let token = self.tokens.get(self.next).ok_or_else(|| AsmError::MissingOperand {
            position,
            inst: self.text.to_string(),
        })?;
        self.next += 1;
        Ok(token)
    }

    fn register(&mut self) -> Result<u8, AsmError> {
        let text = self.text;
        let token = self.take()?;
        parse_register(token).map_err(|e| e.in_instruction(text))
    }

    fn immediate(&mut self) -> Result<i64, AsmError> {
        let text = self.text;
        let token = self.take()?;
        parse_immediate(token).map_err(|e| e.in_instruction(text))
    }

    /// A label, or a numeric byte offset that needs no second pass.
    fn target(&mut self, bits: usize) -> Result<BranchTarget, AsmError> {
        let text = self.text;
        let token = self.take()?;
        if token.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            let offset = parse_immediate(token).map_err(|e| e.in_instruction(text))?;
            check_branch_offset(offset, bits, text)?;
            return Ok(BranchTarget::Resolved { offset });
        }
        Ok(BranchTarget::Pending { label: token.to_string() })
    }

    fn finish(self) -> Result<(), AsmError> {
        match self.tokens.get(self.next) {
            Some(extra) => Err(AsmError::ExtraOperand {
                token: extra.clone(),
                inst: self.text.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_operand_is_split_in_place() {
        let toks = split_memory_operands(["r5", "-8(r2)"].into_iter(), "sw r5 -8(r2)").unwrap();
        assert_eq!(toks, vec!["r5", "r2", "-8"]);
        let toks = split_memory_operands(["r1", "(r3)"].into_iter(), "lw r1 (r3)").unwrap();
        assert_eq!(toks, vec!["r1", "r3", "0"]);
    }

    #[test]
    fn malformed_memory_operand() {
        let err = Instruction::parse("lw r1 4(r2").unwrap_err();
        assert!(matches!(err, AsmError::MalformedMemoryOperand { .. }));
        let err = Instruction::parse("lw r1 4()").unwrap_err();
        assert!(matches!(err, AsmError::MalformedMemoryOperand { .. }));
    }

    #[test]
    fn pending_target_refuses_to_encode() {
        let inst = Instruction::parse("jal ra end").unwrap();
        assert_eq!(inst.pending_label(), Some("end"));
        let err = inst.encode().unwrap_err();
        assert!(matches!(err, AsmError::UnresolvedTarget { ref label, .. } if label == "end"));
    }

    #[test]
    fn commas_separate_operands_too() {
        let a = Instruction::parse("addi r1, r2, -1").unwrap();
        let b = Instruction::parse("addi r1 r2 -1").unwrap();
        assert_eq!(a.encode().unwrap(), b.encode().unwrap());
    }
}
