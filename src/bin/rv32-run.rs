use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rv32i_rs::cache::{ReplacementPolicy, WritePolicy};
use rv32i_rs::sim::{load_program_file, SimConfig};
use rv32i_rs::Simulation;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run an assembled RV32I program on the cycle-counting simulator"
)]
struct Opts {
    /// Assembler output: one 32-digit binary word per line
    #[arg(value_name = "BINARY")]
    input: PathBuf,
    /// JSON file with memory, cache and timing parameters
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Connect the core directly to main memory
    #[arg(long)]
    no_cache: bool,
    #[arg(long, value_enum)]
    write_policy: Option<WritePolicy>,
    #[arg(long, value_enum)]
    replacement: Option<ReplacementPolicy>,
    /// Stop with an error after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
    /// Only print the totals and the final memory dump
    #[arg(short, long)]
    quiet: bool,
    /// Write dirty cache lines back before dumping memory
    #[arg(long)]
    flush: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();

    let mut cfg = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            SimConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if opts.no_cache {
        cfg.cache = None;
    }
    if let Some(cache) = cfg.cache.as_mut() {
        if let Some(policy) = opts.write_policy {
            cache.write_policy = policy;
        }
        if let Some(policy) = opts.replacement {
            cache.replacement = policy;
        }
    }

    let program = load_program_file(&opts.input)?;
    let mut sim = Simulation::new(&cfg, &program)?;

    let quiet = opts.quiet;
    let total = sim.run(opts.max_steps, |sim, report| {
        if !quiet {
            println!("Program Counter : {:#x}", report.pc);
            print!("{}", sim.cpu.regs);
            println!("Time taken : {}\n", report.cycles);
        }
    })?;

    println!("Total simulation cycles : {total}\n");
    if opts.flush {
        sim.memory.flush()?;
    }
    print!("{}", sim.memory);
    Ok(())
}
