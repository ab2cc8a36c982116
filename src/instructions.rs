use serde::{Deserialize, Serialize};

use crate::decoder::Op;

/// The six RV32I encodings this toolkit knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    R,
    I,
    S,
    Sb,
    U,
    Uj,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrDesc {
    pub op: Op,
    pub mnemonic: &'static str,
    pub format: Format,
    pub opcode: u8,
    pub funct3: u8,
    pub funct7: u8,
}

const OP_REG: u8 = 0b0110011;
const OP_IMM: u8 = 0b0010011;
const OP_LOAD: u8 = 0b0000011;
const OP_JALR: u8 = 0b1100111;
const OP_STORE: u8 = 0b0100011;
const OP_BRANCH: u8 = 0b1100011;
const OP_LUI: u8 = 0b0110111;
const OP_JAL: u8 = 0b1101111;

const fn desc(op: Op, mnemonic: &'static str, format: Format, opcode: u8, funct3: u8, funct7: u8) -> InstrDesc {
    InstrDesc { op, mnemonic, format, opcode, funct3, funct7 }
}

// Mnemonics are unique, so the first match is the only match.
pub const TABLE: &[InstrDesc] = &[
    desc(Op::Add, "add", Format::R, OP_REG, 0b000, 0b0000000),
    desc(Op::Sub, "sub", Format::R, OP_REG, 0b000, 0b0100000),
    desc(Op::And, "and", Format::R, OP_REG, 0b111, 0b0000000),
    desc(Op::Or, "or", Format::R, OP_REG, 0b110, 0b0000000),
    desc(Op::Xor, "xor", Format::R, OP_REG, 0b100, 0b0000000),
    desc(Op::Sll, "sll", Format::R, OP_REG, 0b001, 0b0000000),
    desc(Op::Sra, "sra", Format::R, OP_REG, 0b101, 0b0100000),
    desc(Op::Addi, "addi", Format::I, OP_IMM, 0b000, 0),
    desc(Op::Lw, "lw", Format::I, OP_LOAD, 0b010, 0),
    desc(Op::Jalr, "jalr", Format::I, OP_JALR, 0b000, 0),
    desc(Op::Sw, "sw", Format::S, OP_STORE, 0b010, 0),
    desc(Op::Beq, "beq", Format::Sb, OP_BRANCH, 0b000, 0),
    desc(Op::Bne, "bne", Format::Sb, OP_BRANCH, 0b001, 0),
    desc(Op::Blt, "blt", Format::Sb, OP_BRANCH, 0b100, 0),
    desc(Op::Bge, "bge", Format::Sb, OP_BRANCH, 0b101, 0),
    desc(Op::Lui, "lui", Format::U, OP_LUI, 0, 0),
    desc(Op::Jal, "jal", Format::Uj, OP_JAL, 0, 0),
];

/// Case-insensitive, exact mnemonic lookup.
pub fn lookup(mnemonic: &str) -> Option<&'static InstrDesc> {
    TABLE.iter().find(|d| d.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// Finds the row matching the fixed fields of an encoded word.
pub fn match_encoding(opcode: u8, funct3: u8, funct7: u8) -> Option<&'static InstrDesc> {
    TABLE.iter().find(|d| {
        d.opcode == opcode
            && match d.format {
                Format::R => d.funct3 == funct3 && d.funct7 == funct7,
                Format::I | Format::S | Format::Sb => d.funct3 == funct3,
                Format::U | Format::Uj => true,
            }
    })
}
