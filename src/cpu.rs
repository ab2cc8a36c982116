use std::fmt;

use anyhow::Error;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bits::NUM_REGS;
use crate::decoder::Decoder;
use crate::exec::Executor;
use crate::memory::{Bus, Cycle};

/// Fixed per-stage costs. Fetch and memory stages are timed by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub decode_time: Cycle,
    pub execute_time: Cycle,
    pub writeback_time: Cycle,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            decode_time: 1,
            execute_time: 1,
            writeback_time: 1,
        }
    }
}

/// General purpose registers. `r0` reads as zero and ignores writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    regs: [u32; NUM_REGS as usize],
}

impl RegisterFile {
    pub fn get(&self, idx: u8) -> u32 {
        self.regs[idx as usize]
    }

    pub fn set(&mut self, idx: u8, val: u32) {
        if idx != 0 {
            self.regs[idx as usize] = val;
        }
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.regs.iter().enumerate() {
            let name = format!("r{i}");
            write!(f, "{name:>3} : {r:08x}")?;
            if i % 4 == 3 {
                writeln!(f)?;
            } else {
                write!(f, " ")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cpu {
    pub pc: u32,
    pub regs: RegisterFile,
    pub cfg: CpuConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum Trap {
    #[error("Invalid instruction {raw:#010x} at {pc:#010x}")]
    InvalidInstruction { pc: u32, raw: u32 },
    #[error("Unaligned access at {addr:#010x}")]
    Unaligned { addr: u32 },
    #[error("Bus error at {addr:#010x}: {source}")]
    Bus { addr: u32, #[source] source: Error },
}

impl Cpu {
    pub fn new(cfg: CpuConfig) -> Self {
        Self {
            pc: 0,
            regs: RegisterFile::default(),
            cfg,
        }
    }

    pub fn reset(&mut self, reset_pc: u32) {
        self.pc = reset_pc;
        self.regs = RegisterFile::default();
    }

    /// Runs one instruction and returns the cycles it took, fetch included.
    pub fn step<B: Bus, D: Decoder, X: Executor>(
        &mut self,
        bus: &mut B,
        dec: &D,
        exec: &X,
    ) -> Result<Cycle, Trap> {
        let pc = self.pc;
        if pc % 4 != 0 {
            return Err(Trap::Unaligned { addr: pc });
        }
        let (raw, t_fetch) = bus
            .read_word(pc)
            .map_err(|source| Trap::Bus { addr: pc, source })?;
        let d = dec.decode(raw).ok_or(Trap::InvalidInstruction { pc, raw })?;
        trace!(pc, op = d.op.mnemonic(), "step");
        self.pc = pc.wrapping_add(4);
        let t_exec = exec.exec(self, bus, pc, d)?;
        Ok(t_fetch + self.cfg.decode_time + t_exec)
    }
}
