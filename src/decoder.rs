use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Sll,
    Sra,
    Addi,
    Lw,
    Jalr,
    Sw,
    Beq,
    Bne,
    Blt,
    Bge,
    Lui,
    Jal,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Sll => "sll",
            Op::Sra => "sra",
            Op::Addi => "addi",
            Op::Lw => "lw",
            Op::Jalr => "jalr",
            Op::Sw => "sw",
            Op::Beq => "beq",
            Op::Bne => "bne",
            Op::Blt => "blt",
            Op::Bge => "bge",
            Op::Lui => "lui",
            Op::Jal => "jal",
        }
    }
}

/// A decoded word. `imm` is already sign-extended (I, S, SB, UJ) or shifted
/// into place (U); fields a format does not use are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub op: Op,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: u32,
}

pub trait Decoder {
    fn decode(&self, raw32: u32) -> Option<Decoded>;
}
