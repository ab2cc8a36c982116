use crate::decoder::{Decoded, Decoder};
use crate::instructions::{match_encoding, Format};

/// RV32I decoder for the seventeen instructions the assembler emits.
pub struct Rv32iDecoder;

impl Rv32iDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Rv32iDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn bits(raw: u32, hi: u32, lo: u32) -> u32 {
    (raw >> lo) & ((1u32 << (hi - lo + 1)) - 1)
}

#[inline]
pub fn sign_ext(v: u32, width: u32) -> u32 {
    let s = 32 - width;
    ((v << s) as i32 >> s) as u32
}

impl Decoder for Rv32iDecoder {
    fn decode(&self, raw32: u32) -> Option<Decoded> {
        let opcode = bits(raw32, 6, 0) as u8;
        let funct3 = bits(raw32, 14, 12) as u8;
        let funct7 = bits(raw32, 31, 25) as u8;
        let desc = match_encoding(opcode, funct3, funct7)?;

        let rd = bits(raw32, 11, 7) as u8;
        let rs1 = bits(raw32, 19, 15) as u8;
        let rs2 = bits(raw32, 24, 20) as u8;

        let d = match desc.format {
            Format::R => Decoded { op: desc.op, rd, rs1, rs2, imm: 0 },
            Format::I => Decoded {
                op: desc.op,
                rd,
                rs1,
                rs2: 0,
                imm: sign_ext(bits(raw32, 31, 20), 12),
            },
            Format::S => {
                let imm = (bits(raw32, 31, 25) << 5) | bits(raw32, 11, 7);
                Decoded { op: desc.op, rd: 0, rs1, rs2, imm: sign_ext(imm, 12) }
            }
            Format::Sb => {
                let imm = (bits(raw32, 31, 31) << 12)
                    | (bits(raw32, 7, 7) << 11)
                    | (bits(raw32, 30, 25) << 5)
                    | (bits(raw32, 11, 8) << 1);
                Decoded { op: desc.op, rd: 0, rs1, rs2, imm: sign_ext(imm, 13) }
            }
            Format::U => Decoded {
                op: desc.op,
                rd,
                rs1: 0,
                rs2: 0,
                imm: raw32 & 0xFFFF_F000,
            },
            Format::Uj => {
                let imm = (bits(raw32, 31, 31) << 20)
                    | (bits(raw32, 19, 12) << 12)
                    | (bits(raw32, 20, 20) << 11)
                    | (bits(raw32, 30, 21) << 1);
                Decoded { op: desc.op, rd, rs1: 0, rs2: 0, imm: sign_ext(imm, 21) }
            }
        };
        Some(d)
    }
}
