pub mod assembler;
pub mod bits;
pub mod cache;
pub mod cpu;
pub mod decoder;
pub mod disasm;
pub mod error;
pub mod exec;
pub mod instructions;
pub mod labels;
pub mod memory;
pub mod sim;
pub mod source;
pub mod variant;

pub mod isa {
    pub mod rv32i;
}

pub use assembler::{assemble, Assembler};
pub use cpu::{Cpu, CpuConfig, Trap};
pub use error::AsmError;
pub use memory::{Bus, MainMemory, Memory};
pub use sim::{SimConfig, Simulation};
