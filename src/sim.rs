//! Loads an assembled image and runs it to completion.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bits::parse_word;
use crate::cache::{Cache, CacheConfig};
use crate::cpu::{Cpu, CpuConfig, Trap};
use crate::exec::IntExecutor;
use crate::isa::rv32i::Rv32iDecoder;
use crate::memory::{Cycle, MainMemory, Memory, MemoryConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub memory: MemoryConfig,
    /// `None` connects the core straight to main memory.
    pub cache: Option<CacheConfig>,
    pub cpu: CpuConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            cache: Some(CacheConfig::default()),
            cpu: CpuConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("line {line}: expected 32 binary digits, got {text:?}")]
    Malformed { line: usize, text: String },
    #[error("cannot read {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
}

/// Parses the assembler's output, one 32-digit word per line.
pub fn load_program(text: &str) -> Result<Vec<u32>, LoadError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            let line = line.trim_end_matches('\r');
            parse_word(line).ok_or_else(|| LoadError::Malformed {
                line: i + 1,
                text: line.to_string(),
            })
        })
        .collect()
}

pub fn load_program_file(path: &Path) -> Result<Vec<u32>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_program(&text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub pc: u32,
    pub cycles: Cycle,
}

#[derive(thiserror::Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Trap(#[from] Trap),
    #[error("step limit of {0} reached before the end of the program")]
    StepLimit(u64),
}

pub struct Simulation {
    pub cpu: Cpu,
    pub memory: Memory,
    end: u32,
    total: Cycle,
    steps: u64,
    dec: Rv32iDecoder,
    exec: IntExecutor,
}

impl Simulation {
    pub fn new(cfg: &SimConfig, program: &[u32]) -> anyhow::Result<Self> {
        let cache = cfg.cache.map(Cache::new).transpose()?;
        let mut memory = Memory::new(MainMemory::new(cfg.memory), cache);
        let range = memory.load_program(program)?;
        let mut cpu = Cpu::new(cfg.cpu);
        cpu.reset(range.start);
        debug!(words = program.len(), end = range.end, "program loaded");
        Ok(Self {
            cpu,
            memory,
            end: range.end,
            total: 0,
            steps: 0,
            dec: Rv32iDecoder::new(),
            exec: IntExecutor,
        })
    }

    pub fn finished(&self) -> bool {
        self.cpu.pc == self.end
    }

    pub fn total_cycles(&self) -> Cycle {
        self.total
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Executes one instruction. Returns `None` once the PC has reached the
    /// end of the program.
    pub fn step(&mut self) -> Result<Option<StepReport>, Trap> {
        if self.finished() {
            return Ok(None);
        }
        let pc = self.cpu.pc;
        let cycles = self.cpu.step(&mut self.memory, &self.dec, &self.exec)?;
        self.total += cycles;
        self.steps += 1;
        Ok(Some(StepReport { pc, cycles }))
    }

    /// Runs to the end of the program, calling `on_step` after each
    /// instruction. Gives up after `max_steps` instructions when set.
    pub fn run<F>(&mut self, max_steps: Option<u64>, mut on_step: F) -> Result<Cycle, SimError>
    where
        F: FnMut(&Self, StepReport),
    {
        loop {
            if let Some(limit) = max_steps {
                if self.steps >= limit && !self.finished() {
                    return Err(SimError::StepLimit(limit));
                }
            }
            match self.step()? {
                Some(report) => on_step(self, report),
                None => return Ok(self.total),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_lines() {
        let err = load_program("00000000000000000000000000010011\n0101\n").unwrap_err();
        assert!(matches!(err, LoadError::Malformed { line: 2, .. }));
    }

    #[test]
    fn config_fields_default_individually() {
        let cfg = SimConfig::from_json(r#"{ "memory": { "access_time": 50 } }"#).unwrap();
        assert_eq!(cfg.memory.access_time, 50);
        assert_eq!(cfg.memory.size_words, 256);
        assert_eq!(cfg.cache, Some(CacheConfig::default()));

        let cfg = SimConfig::from_json(r#"{ "cache": null }"#).unwrap();
        assert_eq!(cfg.cache, None);
    }
}
