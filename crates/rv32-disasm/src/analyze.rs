use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use rv32i_rs::decoder::{Decoder, Op};
use rv32i_rs::isa::rv32i::Rv32iDecoder;

use crate::model::{is_mapped, read_u32, Image};

const WIDTH: u32 = 4;
const RA: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind { Fallthrough, Branch, CondBranch, Call }

impl EdgeKind {
    pub fn tag(self) -> &'static str {
        match self {
            EdgeKind::Fallthrough => "ft",
            EdgeKind::Branch => "br",
            EdgeKind::CondBranch => "cbr",
            EdgeKind::Call => "call",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge { pub from: u32, pub to: u32, pub kind: EdgeKind }

/// What a breadth-first walk from the entry points found.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub visited: BTreeSet<u32>,
    pub edges: Vec<Edge>,
    /// `jalr` sites whose target is not known statically (returns included).
    pub indirect: HashSet<u32>,
}

pub fn analyze_entries(img: &Image, entries: &[u32], max_instr: usize) -> Analysis {
    let dec = Rv32iDecoder::new();
    let mut queue: VecDeque<u32> = entries.iter().copied().filter(|&e| is_mapped(img, e)).collect();
    let mut out = Analysis::default();
    let mut steps = 0usize;

    while let Some(pc) = queue.pop_front() {
        if steps >= max_instr { break; }
        if out.visited.contains(&pc) { continue; }
        let Some(raw32) = read_u32(img, pc) else { continue; };
        let Some(d) = dec.decode(raw32) else { continue; };
        out.visited.insert(pc);
        steps += 1;

        let ft = pc.wrapping_add(WIDTH);
        let tgt = pc.wrapping_add(d.imm);
        let mut succ: Vec<(u32, EdgeKind)> = Vec::with_capacity(2);
        match d.op {
            Op::Beq | Op::Bne | Op::Blt | Op::Bge => {
                succ.push((tgt, EdgeKind::CondBranch));
                succ.push((ft, EdgeKind::Fallthrough));
            }
            // jal r0 is a plain jump; any other link register makes it a call
            Op::Jal if d.rd == 0 => succ.push((tgt, EdgeKind::Branch)),
            Op::Jal => {
                succ.push((tgt, EdgeKind::Call));
                succ.push((ft, EdgeKind::Fallthrough));
            }
            Op::Jalr => {
                out.indirect.insert(pc);
                if d.rd != 0 {
                    succ.push((ft, EdgeKind::Fallthrough));
                }
            }
            _ => succ.push((ft, EdgeKind::Fallthrough)),
        }
        for (to, kind) in succ {
            // branch targets are recorded even when they leave the image
            if kind == EdgeKind::Fallthrough && !is_mapped(img, to) { continue; }
            out.edges.push(Edge { from: pc, to, kind });
            if is_mapped(img, to) { queue.push_back(to); }
        }
    }
    out
}

/// `jalr r0 ra 0`, the conventional return.
pub fn is_return(d: &rv32i_rs::decoder::Decoded) -> bool {
    d.op == Op::Jalr && d.rd == 0 && d.rs1 == RA && d.imm == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block { pub start: u32, pub end: u32 }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeOut { pub from: u32, pub to: u32, pub kind: String }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionOut { pub entry: u32, pub blocks: Vec<u32> }

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub entries: Vec<u32>,
    pub blocks: Vec<Block>,
    pub edges: Vec<EdgeOut>,
    pub functions: Vec<FunctionOut>,
}

/// Splits the visited instructions into basic blocks and lifts the edges to
/// block level. Every call target also becomes a function root.
pub fn build_report(analysis: &Analysis, seeds: &[u32]) -> Report {
    let visited = &analysis.visited;
    // a block ends after any instruction that does not simply fall through
    let mut ends_block: HashSet<u32> = analysis.indirect.clone();
    for e in &analysis.edges {
        if e.kind != EdgeKind::Fallthrough {
            ends_block.insert(e.from);
        }
    }
    let mut starts: BTreeSet<u32> = seeds.iter().copied().collect();
    starts.extend(analysis.edges.iter().filter(|e| e.kind != EdgeKind::Fallthrough).map(|e| e.to));
    starts.extend(ends_block.iter().map(|pc| pc.wrapping_add(WIDTH)));
    starts.retain(|s| visited.contains(s));

    let mut blocks = Vec::new();
    let mut addr_to_block: HashMap<u32, u32> = HashMap::new();
    for &start in &starts {
        let mut cur = start;
        loop {
            addr_to_block.insert(cur, start);
            let next = cur.wrapping_add(WIDTH);
            if ends_block.contains(&cur) || !visited.contains(&next) || starts.contains(&next) {
                blocks.push(Block { start, end: next });
                break;
            }
            cur = next;
        }
    }

    // fallthroughs inside a block are not block edges
    let edges: Vec<EdgeOut> = analysis
        .edges
        .iter()
        .filter(|e| e.kind != EdgeKind::Fallthrough || starts.contains(&e.to))
        .map(|e| EdgeOut {
            from: addr_to_block.get(&e.from).copied().unwrap_or(e.from),
            to: e.to,
            kind: e.kind.tag().to_string(),
        })
        .collect();

    let mut roots: BTreeSet<u32> = seeds.iter().copied().collect();
    roots.extend(analysis.edges.iter().filter(|e| e.kind == EdgeKind::Call).map(|e| e.to));

    // calls do not pull the callee's blocks into the caller
    let mut adj: HashMap<u32, Vec<u32>> = HashMap::new();
    for e in edges.iter().filter(|e| e.kind != EdgeKind::Call.tag()) {
        adj.entry(e.from).or_default().push(e.to);
    }
    let functions = roots
        .into_iter()
        .filter(|r| starts.contains(r))
        .map(|entry| {
            let mut seen = BTreeSet::new();
            let mut q = VecDeque::from([entry]);
            while let Some(b) = q.pop_front() {
                if !seen.insert(b) { continue; }
                if let Some(nexts) = adj.get(&b) {
                    q.extend(nexts.iter().copied());
                }
            }
            FunctionOut { entry, blocks: seen.into_iter().collect() }
        })
        .collect();

    Report { entries: seeds.to_vec(), blocks, edges, functions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_text_image;
    use pretty_assertions::assert_eq;

    fn image(src: &str) -> Image {
        let words = rv32i_rs::assemble(src).unwrap();
        parse_text_image(&words.join("\n"), 0).unwrap()
    }

    #[test]
    fn loop_has_back_edge_and_two_blocks() {
        let img = image(
            "addi r1 r0 3\n\
             loop: addi r1 r1 -1\n\
             bne r1 r0 loop\n\
             add r2 r1 r1\n",
        );
        let a = analyze_entries(&img, &[0], 100);
        assert_eq!(a.visited.len(), 4);
        assert!(a.edges.contains(&Edge { from: 8, to: 4, kind: EdgeKind::CondBranch }));

        let r = build_report(&a, &[0]);
        assert_eq!(
            r.blocks,
            vec![Block { start: 0, end: 4 }, Block { start: 4, end: 12 }, Block { start: 12, end: 16 }]
        );
        assert_eq!(r.functions, vec![FunctionOut { entry: 0, blocks: vec![0, 4, 12] }]);
    }

    #[test]
    fn call_starts_a_function_and_return_ends_a_block() {
        let img = image(
            "jal ra func\n\
             jal r0 end\n\
             func: addi r5 r0 1\n\
             jalr r0 ra 0\n\
             end: add r0 r0 r0\n",
        );
        let a = analyze_entries(&img, &[0], 100);
        assert!(a.indirect.contains(&12));
        let r = build_report(&a, &[0]);
        let entries: Vec<u32> = r.functions.iter().map(|f| f.entry).collect();
        assert_eq!(entries, vec![0, 8]);
        assert!(r.blocks.contains(&Block { start: 8, end: 16 }));
        assert_eq!(r.functions[1].blocks, vec![8]);
    }

    #[test]
    fn step_limit_stops_walk() {
        let img = image("addi r1 r0 1\naddi r1 r1 1\naddi r1 r1 1\n");
        assert_eq!(analyze_entries(&img, &[0], 2).visited.len(), 2);
    }
}
