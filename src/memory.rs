use std::fmt;
use std::ops::Range;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::Cache;

/// Simulated clock cycles.
pub type Cycle = u64;

/// Word-granular memory port. Every access reports how long it took.
pub trait Bus {
    fn read_word(&mut self, addr: u32) -> Result<(u32, Cycle)>;
    fn write_word(&mut self, addr: u32, val: u32) -> Result<Cycle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Capacity in 32-bit words.
    pub size_words: u32,
    pub access_time: Cycle,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size_words: 256,
            access_time: 100,
        }
    }
}

/// Flat main memory. Only whole, aligned words can be accessed, so it is
/// stored as words rather than bytes.
#[derive(Clone, Serialize, Deserialize)]
pub struct MainMemory {
    pub words: Vec<u32>,
    pub access_time: Cycle,
}

impl MainMemory {
    pub fn new(cfg: MemoryConfig) -> Self {
        Self {
            words: vec![0; cfg.size_words as usize],
            access_time: cfg.access_time,
        }
    }

    fn slot(&self, addr: u32, count: usize) -> Result<usize> {
        ensure!(addr % 4 == 0, "unaligned word access at {addr:#010x}");
        let idx = (addr / 4) as usize;
        ensure!(
            idx + count <= self.words.len(),
            "access at {addr:#010x} outside memory bounds ({} words)",
            self.words.len()
        );
        Ok(idx)
    }

    pub fn read_block(&self, addr: u32, count: usize) -> Result<(Vec<u32>, Cycle)> {
        let idx = self.slot(addr, count)?;
        Ok((self.words[idx..idx + count].to_vec(), self.access_time))
    }

    pub fn write_block(&mut self, addr: u32, block: &[u32]) -> Result<Cycle> {
        let idx = self.slot(addr, block.len())?;
        self.words[idx..idx + block.len()].copy_from_slice(block);
        Ok(self.access_time)
    }
}

impl Bus for MainMemory {
    fn read_word(&mut self, addr: u32) -> Result<(u32, Cycle)> {
        let idx = self.slot(addr, 1)?;
        Ok((self.words[idx], self.access_time))
    }

    fn write_word(&mut self, addr: u32, val: u32) -> Result<Cycle> {
        let idx = self.slot(addr, 1)?;
        self.words[idx] = val;
        Ok(self.access_time)
    }
}

impl fmt::Display for MainMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Main Memory")?;
        writeln!(f, "===========")?;
        for (row, chunk) in self.words.chunks(4).enumerate() {
            write!(f, "{:#010x} :", row * 16)?;
            for w in chunk {
                write!(f, " {w:#010x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Main memory behind an optional cache.
pub struct Memory {
    pub main: MainMemory,
    pub cache: Option<Cache>,
    program: Range<u32>,
}

impl Memory {
    pub fn new(main: MainMemory, cache: Option<Cache>) -> Self {
        Self {
            main,
            cache,
            program: 0..0,
        }
    }

    /// Stores the program image starting at address 0, bypassing the cache
    /// and the clock, and remembers its extent.
    pub fn load_program(&mut self, words: &[u32]) -> Result<Range<u32>> {
        ensure!(
            words.len() <= self.main.words.len(),
            "program of {} words does not fit in {} words of memory",
            words.len(),
            self.main.words.len()
        );
        self.main.write_block(0, words)?;
        self.program = 0..(words.len() as u32) * 4;
        Ok(self.program.clone())
    }

    pub fn program(&self) -> Range<u32> {
        self.program.clone()
    }

    /// Writes dirty cache lines back to main memory.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(cache) = self.cache.as_mut() {
            cache.flush(&mut self.main)?;
        }
        Ok(())
    }
}

impl Bus for Memory {
    fn read_word(&mut self, addr: u32) -> Result<(u32, Cycle)> {
        match self.cache.as_mut() {
            Some(cache) => cache.read(addr, &mut self.main),
            None => self.main.read_word(addr),
        }
    }

    fn write_word(&mut self, addr: u32, val: u32) -> Result<Cycle> {
        if self.program.contains(&addr) {
            warn!("write to program memory at {addr:#010x}, may make program ill-formed");
        }
        match self.cache.as_mut() {
            Some(cache) => cache.write(addr, val, &mut self.main),
            None => self.main.write_word(addr, val),
        }
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cache) = &self.cache {
            writeln!(f, "{cache}")?;
        }
        write!(f, "{}", self.main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_and_alignment_are_enforced() {
        let mut mem = MainMemory::new(MemoryConfig { size_words: 4, access_time: 7 });
        assert_eq!(mem.write_word(12, 5).unwrap(), 7);
        assert_eq!(mem.read_word(12).unwrap(), (5, 7));
        assert!(mem.read_word(16).is_err());
        assert!(mem.read_word(2).is_err());
        assert!(mem.read_block(8, 3).is_err());
    }

    #[test]
    fn program_must_fit() {
        let mut mem = Memory::new(MainMemory::new(MemoryConfig { size_words: 2, access_time: 1 }), None);
        assert!(mem.load_program(&[1, 2, 3]).is_err());
        assert_eq!(mem.load_program(&[1, 2]).unwrap(), 0..8);
    }
}
