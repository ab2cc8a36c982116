//! Set-associative data cache in front of [`MainMemory`].
//!
//! Geometry is expressed in words: `size_words` total capacity, split into
//! blocks of `block_words`, grouped into sets of `associativity` ways.

use std::collections::VecDeque;
use std::fmt;

use anyhow::{ensure, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::memory::{Bus, Cycle, MainMemory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    WriteBack,
    WriteThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementPolicy {
    Lru,
    Fifo,
    /// Uniformly chosen way within the set.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub size_words: u32,
    pub block_words: u32,
    pub associativity: u32,
    pub hit_time: Cycle,
    pub miss_penalty: Cycle,
    pub write_policy: WritePolicy,
    pub replacement: ReplacementPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size_words: 32,
            block_words: 2,
            associativity: 2,
            hit_time: 10,
            miss_penalty: 4,
            write_policy: WritePolicy::WriteThrough,
            replacement: ReplacementPolicy::Lru,
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    tag: u32,
    data: Vec<u32>,
    active: bool,
    dirty: bool,
}

pub struct Cache {
    cfg: CacheConfig,
    offset_bits: u32,
    index_bits: u32,
    lines: Vec<Line>,
    // per set: way numbers, victim first
    order: Vec<VecDeque<usize>>,
    rng: StdRng,
    pub hits: u64,
    pub misses: u64,
}

fn log2_exact(x: u32, what: &str) -> Result<u32> {
    ensure!(x.is_power_of_two(), "{what} ({x}) must be a power of two");
    Ok(x.trailing_zeros())
}

impl Cache {
    pub fn new(cfg: CacheConfig) -> Result<Self> {
        ensure!(cfg.block_words > 0 && cfg.associativity > 0, "cache block size and associativity must be non-zero");
        let set_words = cfg
            .block_words
            .checked_mul(cfg.associativity)
            .context("cache geometry overflows")?;
        ensure!(
            cfg.size_words % set_words == 0,
            "cache of {} words cannot be split into {}-way sets of {}-word blocks",
            cfg.size_words,
            cfg.associativity,
            cfg.block_words
        );
        let sets = cfg.size_words / set_words;
        let block_bytes = cfg.block_words.checked_mul(4).context("cache geometry overflows")?;
        let offset_bits = log2_exact(block_bytes, "block size in bytes")?;
        let index_bits = log2_exact(sets, "number of sets")?;
        let line = Line {
            tag: 0,
            data: vec![0; cfg.block_words as usize],
            active: false,
            dirty: false,
        };
        let ways = cfg.associativity as usize;
        Ok(Self {
            cfg,
            offset_bits,
            index_bits,
            lines: vec![line; sets as usize * ways],
            order: (0..sets).map(|_| (0..ways).collect()).collect(),
            rng: StdRng::from_entropy(),
            hits: 0,
            misses: 0,
        })
    }

    fn offset_of(&self, addr: u32) -> u32 {
        addr & ((1 << self.offset_bits) - 1)
    }

    fn index_of(&self, addr: u32) -> u32 {
        (addr >> self.offset_bits) & ((1 << self.index_bits) - 1)
    }

    fn tag_of(&self, addr: u32) -> u32 {
        addr.checked_shr(self.offset_bits + self.index_bits).unwrap_or(0)
    }

    fn address(&self, tag: u32, index: u32) -> u32 {
        (tag.checked_shl(self.index_bits + self.offset_bits).unwrap_or(0)) | (index << self.offset_bits)
    }

    /// Finds or fills the line holding `addr`; returns its slot and the time taken.
    fn lookup(&mut self, addr: u32, main: &mut MainMemory) -> Result<(usize, Cycle)> {
        let index = self.index_of(addr);
        let tag = self.tag_of(addr);
        let ways = self.cfg.associativity as usize;
        let set = index as usize;

        for way in 0..ways {
            let line = &self.lines[set * ways + way];
            if line.active && line.tag == tag {
                self.hits += 1;
                if self.cfg.replacement == ReplacementPolicy::Lru {
                    let order = &mut self.order[set];
                    order.retain(|&w| w != way);
                    order.push_back(way);
                }
                trace!(addr = addr, set, way, "cache hit");
                return Ok((set * ways + way, self.cfg.hit_time));
            }
        }

        self.misses += 1;
        let (block, mut t_mem) = main.read_block(self.address(tag, index), self.cfg.block_words as usize)?;
        let way = match self.cfg.replacement {
            ReplacementPolicy::Random => self.rng.gen_range(0..ways),
            ReplacementPolicy::Lru | ReplacementPolicy::Fifo => {
                let order = &mut self.order[set];
                let way = order.pop_front().unwrap_or(0);
                order.push_back(way);
                way
            }
        };
        let slot = set * ways + way;

        if self.lines[slot].dirty {
            let victim = self.address(self.lines[slot].tag, index);
            t_mem += main.write_block(victim, &self.lines[slot].data)?;
        }
        let line = &mut self.lines[slot];
        line.tag = tag;
        line.data.copy_from_slice(&block);
        line.active = true;
        line.dirty = false;
        trace!(addr = addr, set, way, "cache miss");
        Ok((slot, self.cfg.hit_time + self.cfg.miss_penalty + t_mem))
    }

    fn word_in_line(&self, addr: u32) -> usize {
        (self.offset_of(addr) / 4) as usize
    }

    pub fn read(&mut self, addr: u32, main: &mut MainMemory) -> Result<(u32, Cycle)> {
        ensure!(addr % 4 == 0, "unaligned word access at {addr:#010x}");
        let (slot, t) = self.lookup(addr, main)?;
        Ok((self.lines[slot].data[self.word_in_line(addr)], t))
    }

    pub fn write(&mut self, addr: u32, val: u32, main: &mut MainMemory) -> Result<Cycle> {
        ensure!(addr % 4 == 0, "unaligned word access at {addr:#010x}");
        let (slot, mut t) = self.lookup(addr, main)?;
        let word = self.word_in_line(addr);
        self.lines[slot].data[word] = val;
        match self.cfg.write_policy {
            WritePolicy::WriteThrough => t += main.write_word(addr, val)?,
            WritePolicy::WriteBack => self.lines[slot].dirty = true,
        }
        Ok(t)
    }

    /// Writes every dirty line back without touching the statistics.
    pub fn flush(&mut self, main: &mut MainMemory) -> Result<()> {
        let ways = self.cfg.associativity as usize;
        for slot in 0..self.lines.len() {
            if self.lines[slot].dirty {
                let addr = self.address(self.lines[slot].tag, (slot / ways) as u32);
                main.write_block(addr, &self.lines[slot].data)?;
                self.lines[slot].dirty = false;
            }
        }
        Ok(())
    }

    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            100.0 * self.misses as f64 / total as f64
        }
    }
}

impl fmt::Display for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache")?;
        writeln!(f, "=====")?;
        writeln!(f, "Hits: {}\tMisses: {}", self.hits, self.misses)?;
        writeln!(f, "Miss Rate: {:.2}%", self.miss_rate())?;
        let ways = self.cfg.associativity as usize;
        for (slot, line) in self.lines.iter().enumerate() {
            if !line.active {
                continue;
            }
            write!(f, "{:#010x} :", self.address(line.tag, (slot / ways) as u32))?;
            for w in &line.data {
                write!(f, " {w:#010x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
