use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rv32i_rs::source::{LineReader, SourceLine};
use rv32i_rs::Assembler;

#[derive(Parser, Debug)]
#[command(author, version, about = "Assemble RV32I source into 32-bit binary words")]
struct Opts {
    /// Assembly source; standard input when omitted
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,
    /// Write the words here instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Print the label table to standard error after assembling
    #[arg(long)]
    labels: bool,
}

fn read_source(input: Option<&PathBuf>) -> Result<Vec<SourceLine>> {
    match input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            LineReader::new(BufReader::new(file))
                .read_program()
                .with_context(|| format!("reading {}", path.display()))
        }
        None => LineReader::new(io::stdin().lock())
            .read_program()
            .context("reading standard input"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let opts = Opts::parse();
    let lines = read_source(opts.input.as_ref())?;

    let mut asm = Assembler::pass1(&lines)?;
    let words = asm.pass2()?;

    if opts.labels {
        for (name, index) in asm.labels().sorted() {
            eprintln!("{name:<16} {index:>5} {:#010x}", index * 4);
        }
    }

    let mut text = words.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    match &opts.output {
        Some(path) => fs::write(path, text).with_context(|| format!("writing {}", path.display()))?,
        None => io::stdout().lock().write_all(text.as_bytes())?,
    }
    Ok(())
}
