use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use rv32i_rs::decoder::Decoder;
use rv32i_rs::disasm::fmt_decoded;
use rv32i_rs::isa::rv32i::Rv32iDecoder;

use rv32_disasm::analyze::is_return;
use rv32_disasm::model::{read_u8, Image};
use rv32_disasm::{analyze_entries, build_report, load_image, read_u32, Block, EdgeOut, FunctionOut, ImageKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "RV32I disassembler CLI", long_about = None)]
struct Cli {
    /// Load address for the image
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    base: u32,
    /// How to read the input file
    #[arg(long, value_enum, default_value_t = ImageKind::Auto)]
    kind: ImageKind,
    /// Skip N bytes at start of a raw file before loading
    #[arg(long, default_value_t = 0usize)]
    skip: usize,
    /// Limit bytes loaded from a raw file (default: to EOF after --skip)
    #[arg(long)]
    len: Option<usize>,
    /// Assembler output or raw little-endian binary
    #[arg(value_name = "IMAGE")]
    input: PathBuf,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List loaded segments
    Sections,
    /// Disassemble a range [start, end) in bytes
    Range {
        /// Start address (hex or dec)
        #[arg(value_parser = parse_u32)]
        start: u32,
        /// End address (hex or dec, exclusive); end of image when omitted
        #[arg(value_parser = parse_u32)]
        end: Option<u32>,
        /// Show instruction bytes
        #[arg(long)]
        show_bytes: bool,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Analyze the control-flow graph from entry points
    Analyze {
        /// Entry addresses (hex or dec). Repeat flag to add multiple entries.
        #[arg(long = "entry", value_name = "ADDR", value_parser = parse_u32)]
        entries: Vec<u32>,
        /// Maximum instructions to decode before stopping
        #[arg(long, default_value_t = 100_000usize)]
        max_instr: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Emit a linear disassembly listing of analyzed code (text format only)
        #[arg(long)]
        listing: bool,
        /// Show instruction bytes in listings
        #[arg(long)]
        show_bytes: bool,
        /// Import labels from JSON (Vec<{ addr, name }>)
        #[arg(long, value_name = "FILE")]
        labels_in: Option<PathBuf>,
        /// Export labels to JSON (Vec<{ addr, name }>)
        #[arg(long, value_name = "FILE")]
        labels_out: Option<PathBuf>,
        /// Write analysis output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn parse_u32(s: &str) -> Result<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(u32::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse::<u32>()?)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Clone, serde::Serialize)]
struct BlockOut { start: u32, end: u32, insns: Vec<String> }

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct LabelKV { addr: u32, name: String }

#[derive(Debug, Clone, serde::Serialize)]
struct ReportWithLabels {
    entries: Vec<u32>,
    blocks: Vec<BlockOut>,
    edges: Vec<EdgeOut>,
    functions: Vec<FunctionOut>,
    labels: Vec<LabelKV>,
}

/// One listing line for the word at `pc`, or `None` past the end of the image.
fn render_insn(img: &Image, dec: &Rv32iDecoder, pc: u32, show_bytes: bool) -> Option<String> {
    let raw32 = read_u32(img, pc)?;
    let mut s = format!("{pc:#010x}: ");
    if show_bytes {
        for i in 0..4 {
            let _ = write!(s, "{:02x} ", read_u8(img, pc + i).unwrap_or(0));
        }
        s.push_str("  ");
    }
    match dec.decode(raw32) {
        Some(d) if is_return(&d) => { let _ = write!(s, "{:<24}# ret", fmt_decoded(&d)); }
        Some(d) => s.push_str(&fmt_decoded(&d)),
        None => { let _ = write!(s, ".word {raw32:#010x}"); }
    }
    Some(s)
}

fn blocks_with_mnemonics(img: &Image, blocks: &[Block], show_bytes: bool) -> Vec<BlockOut> {
    let dec = Rv32iDecoder::new();
    blocks
        .iter()
        .map(|b| BlockOut {
            start: b.start,
            end: b.end,
            insns: (b.start..b.end)
                .step_by(4)
                .filter_map(|pc| render_insn(img, &dec, pc, show_bytes))
                .collect(),
        })
        .collect()
}

fn write_labels(path: &Path, labels: &BTreeMap<u32, String>) -> Result<()> {
    let arr: Vec<LabelKV> = labels.iter().map(|(k, v)| LabelKV { addr: *k, name: v.clone() }).collect();
    std::fs::write(path, serde_json::to_string_pretty(&arr)?)?;
    Ok(())
}

fn emit(out: Option<PathBuf>, text: &str) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{text}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let img = load_image(&cli.input, cli.kind, cli.base, cli.skip, cli.len)?;

    match cli.cmd {
        Command::Sections => {
            println!("{:<10} {:<10} {:<10} {:<6} {:<6}", "name", "start", "end", "perms", "kind");
            for s in &img.segments {
                let start = s.base;
                let end = s.base + (s.bytes.len() as u32);
                println!("{:<10} {start:#010x} {end:#010x} {:<6} {:<6}", s.name, s.perms, s.kind);
            }
        }
        Command::Range { start, end, show_bytes, out } => {
            let end = end.unwrap_or_else(|| img.segments.iter().map(|s| s.base + s.bytes.len() as u32).max().unwrap_or(start));
            anyhow::ensure!(end >= start, "end must be >= start");
            let dec = Rv32iDecoder::new();
            let mut buf = String::new();
            for pc in (start..end).step_by(4) {
                match render_insn(&img, &dec, pc, show_bytes) {
                    Some(line) => { let _ = writeln!(buf, "{line}"); }
                    None => { let _ = writeln!(buf, "{pc:#010x}: <oob>"); break; }
                }
            }
            emit(out, &buf)?;
        }
        Command::Analyze { entries, max_instr, format, listing, show_bytes, labels_in, labels_out, out } => {
            // default seed: start of first segment
            let mut seeds: Vec<u32> = if entries.is_empty() {
                img.segments.first().map(|s| s.base).into_iter().collect()
            } else {
                entries
            };
            seeds.sort_unstable();
            seeds.dedup();
            let analysis = analyze_entries(&img, &seeds, max_instr);
            let report = build_report(&analysis, &seeds);

            let mut labels: BTreeMap<u32, String> = BTreeMap::new();
            if let Some(path) = &labels_in {
                let txt = std::fs::read_to_string(path)?;
                for kv in serde_json::from_str::<Vec<LabelKV>>(&txt)? {
                    labels.insert(kv.addr, kv.name);
                }
            }
            for f in &report.functions { labels.entry(f.entry).or_insert_with(|| format!("sub_{:08x}", f.entry)); }
            for b in &report.blocks { labels.entry(b.start).or_insert_with(|| format!("loc_{:08x}", b.start)); }
            if let Some(path) = &labels_out {
                write_labels(path, &labels)?;
            }

            match format {
                OutputFormat::Json => {
                    let full = ReportWithLabels {
                        entries: report.entries,
                        blocks: blocks_with_mnemonics(&img, &report.blocks, show_bytes),
                        edges: report.edges,
                        functions: report.functions,
                        labels: labels.into_iter().map(|(addr, name)| LabelKV { addr, name }).collect(),
                    };
                    let mut json = serde_json::to_string_pretty(&full)?;
                    json.push('\n');
                    emit(out, &json)?;
                }
                OutputFormat::Text => {
                    let mut buf = String::new();
                    let _ = writeln!(buf, "Analysis summary:");
                    let _ = writeln!(buf, "  entries   : {:?}", seeds.iter().map(|a| format!("{a:#010x}")).collect::<Vec<_>>());
                    let _ = writeln!(buf, "  insts     : {}", analysis.visited.len());
                    let _ = writeln!(buf, "  blocks    : {}", report.blocks.len());
                    let _ = writeln!(buf, "  edges     : {}", report.edges.len());
                    let _ = writeln!(buf, "  functions : {}", report.functions.len());
                    let _ = writeln!(buf, "Edges:");
                    for e in &report.edges {
                        let _ = writeln!(buf, "  {:#010x} -> {:#010x} ({})", e.from, e.to, e.kind);
                    }
                    if listing {
                        let dec = Rv32iDecoder::new();
                        let _ = writeln!(buf, "\nListing (analyzed PCs):");
                        for &pc in &analysis.visited {
                            if let Some(lbl) = labels.get(&pc) {
                                let _ = writeln!(buf, "{pc:#010x} <{lbl}>:");
                            }
                            if let Some(line) = render_insn(&img, &dec, pc, show_bytes) {
                                let _ = writeln!(buf, "  {line}");
                            }
                        }
                    }
                    emit(out, &buf)?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv32_disasm::model::parse_text_image;

    #[test]
    fn parse_u32_hex_and_dec() {
        assert_eq!(parse_u32("0x10").unwrap(), 0x10);
        assert_eq!(parse_u32("16").unwrap(), 16);
        assert!(parse_u32("zz").is_err());
    }

    #[test]
    fn range_listing_uses_assembler_syntax() {
        let img = parse_text_image(
            "00000000001100010000000010110011\n00000000010100010010001000100011\n11111111111111111111111111111111\n",
            0,
        )
        .unwrap();
        let dec = Rv32iDecoder::new();
        assert_eq!(render_insn(&img, &dec, 0, false).unwrap(), "0x00000000: add r1 r2 r3");
        assert_eq!(render_insn(&img, &dec, 4, false).unwrap(), "0x00000004: sw r5 4(r2)");
        assert_eq!(render_insn(&img, &dec, 8, false).unwrap(), "0x00000008: .word 0xffffffff");
        assert_eq!(
            render_insn(&img, &dec, 0, true).unwrap(),
            "0x00000000: b3 00 31 00   add r1 r2 r3"
        );
        assert!(render_insn(&img, &dec, 12, false).is_none());
    }

    #[test]
    fn blocks_carry_their_instructions() {
        let img = parse_text_image("00000000001100010000000010110011\n00000000010100010010001000100011\n", 0).unwrap();
        let blocks = blocks_with_mnemonics(&img, &[Block { start: 0, end: 8 }], false);
        assert_eq!(blocks[0].insns, vec!["0x00000000: add r1 r2 r3", "0x00000004: sw r5 4(r2)"]);
    }
}
