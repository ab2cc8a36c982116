use crate::cpu::{Cpu, Trap};
use crate::decoder::{Decoded, Op};
use crate::memory::{Bus, Cycle};

pub trait Executor {
    /// Executes `d`, fetched from `pc`. `cpu.pc` already points at the next
    /// word on entry. Returns the cycles spent after decode.
    fn exec<B: Bus>(&self, cpu: &mut Cpu, bus: &mut B, pc: u32, d: Decoded) -> Result<Cycle, Trap>;
}

fn load<B: Bus>(bus: &mut B, addr: u32) -> Result<(u32, Cycle), Trap> {
    if addr % 4 != 0 {
        return Err(Trap::Unaligned { addr });
    }
    bus.read_word(addr).map_err(|source| Trap::Bus { addr, source })
}

fn store<B: Bus>(bus: &mut B, addr: u32, val: u32) -> Result<Cycle, Trap> {
    if addr % 4 != 0 {
        return Err(Trap::Unaligned { addr });
    }
    bus.write_word(addr, val).map_err(|source| Trap::Bus { addr, source })
}

pub struct IntExecutor;
impl Executor for IntExecutor {
    fn exec<B: Bus>(&self, cpu: &mut Cpu, bus: &mut B, pc: u32, d: Decoded) -> Result<Cycle, Trap> {
        let rs1 = cpu.regs.get(d.rs1);
        let rs2 = cpu.regs.get(d.rs2);
        let mut t = cpu.cfg.execute_time;

        let result = match d.op {
            Op::Add => Some(rs1.wrapping_add(rs2)),
            Op::Sub => Some(rs1.wrapping_sub(rs2)),
            Op::And => Some(rs1 & rs2),
            Op::Or => Some(rs1 | rs2),
            Op::Xor => Some(rs1 ^ rs2),
            Op::Sll => Some(rs1 << (rs2 & 0x1F)),
            Op::Sra => Some(((rs1 as i32) >> (rs2 & 0x1F)) as u32),
            Op::Addi => Some(rs1.wrapping_add(d.imm)),
            Op::Lui => Some(d.imm),
            Op::Lw => {
                let (val, t_mem) = load(bus, rs1.wrapping_add(d.imm))?;
                t += t_mem;
                Some(val)
            }
            Op::Sw => {
                t += store(bus, rs1.wrapping_add(d.imm), rs2)?;
                None
            }
            Op::Beq | Op::Bne | Op::Blt | Op::Bge => {
                let taken = match d.op {
                    Op::Beq => rs1 == rs2,
                    Op::Bne => rs1 != rs2,
                    Op::Blt => (rs1 as i32) < (rs2 as i32),
                    _ => (rs1 as i32) >= (rs2 as i32),
                };
                if taken {
                    cpu.pc = pc.wrapping_add(d.imm);
                }
                None
            }
            Op::Jal => {
                cpu.pc = pc.wrapping_add(d.imm);
                Some(pc.wrapping_add(4))
            }
            Op::Jalr => {
                cpu.pc = rs1.wrapping_add(d.imm) & !1;
                Some(pc.wrapping_add(4))
            }
        };

        // writeback is paid even when rd is r0
        if let Some(val) = result {
            cpu.regs.set(d.rd, val);
            t += cpu.cfg.writeback_time;
        }
        Ok(t)
    }
}
