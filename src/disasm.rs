use crate::decoder::{Decoded, Op};

/// Renders a decoded word in the assembler's own syntax, so the text
/// assembles back to the same word.
pub fn fmt_decoded(d: &Decoded) -> String {
    let mn = d.op.mnemonic();
    match d.op {
        Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor | Op::Sll | Op::Sra => {
            format!("{} r{} r{} r{}", mn, d.rd, d.rs1, d.rs2)
        }
        Op::Addi | Op::Jalr => format!("{} r{} r{} {}", mn, d.rd, d.rs1, d.imm as i32),
        Op::Lw => format!("{} r{} {}(r{})", mn, d.rd, d.imm as i32, d.rs1),
        Op::Sw => format!("{} r{} {}(r{})", mn, d.rs2, d.imm as i32, d.rs1),
        Op::Beq | Op::Bne | Op::Blt | Op::Bge => {
            format!("{} r{} r{} {}", mn, d.rs1, d.rs2, d.imm as i32)
        }
        Op::Lui => format!("{} r{} {:#x}", mn, d.rd, d.imm >> 12),
        Op::Jal => format!("{} r{} {}", mn, d.rd, d.imm as i32),
    }
}
