use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use rv32i_rs::cache::{CacheConfig, WritePolicy};
use rv32i_rs::sim::{load_program, SimError};
use rv32i_rs::{assemble, SimConfig, Simulation, Trap};

fn no_cache() -> SimConfig {
    SimConfig { cache: None, ..SimConfig::default() }
}

fn build(src: &str, cfg: &SimConfig) -> Simulation {
    let words = assemble(src).unwrap();
    let program = load_program(&words.join("\n")).unwrap();
    Simulation::new(cfg, &program).unwrap()
}

fn run(src: &str, cfg: &SimConfig) -> Simulation {
    let mut sim = build(src, cfg);
    sim.run(Some(10_000), |_, _| {}).unwrap();
    sim
}

#[test]
fn counted_loop_sums() {
    let sim = run(
        "addi r1 r0 4      # counter
         addi r2 r0 0      # sum
         loop: add r2 r2 r1
         addi r1 r1 -1
         bne r1 r0 loop",
        &no_cache(),
    );
    assert_eq!(sim.cpu.regs.get(2), 10);
    assert_eq!(sim.cpu.regs.get(1), 0);
    assert_eq!(sim.steps(), 14);
    assert_eq!(sim.cpu.pc, 20);
}

#[test]
fn store_then_load_and_cycle_counts() {
    let mut sim = build("addi r1 r0 5\nsw r1 64(r0)\nlw r2 64(r0)\n", &no_cache());
    let mut per_step = Vec::new();
    let total = sim.run(None, |_, report| per_step.push(report.cycles)).unwrap();
    // fetch + decode + execute (+ memory) (+ writeback)
    assert_eq!(per_step, vec![103, 202, 203]);
    assert_eq!(total, 508);
    assert_eq!(sim.total_cycles(), total);
    assert_eq!(sim.cpu.regs.get(2), 5);
    assert_eq!(sim.memory.main.words[16], 5);
}

#[test]
fn call_and_return() {
    let sim = run(
        "jal ra func
         jal r0 end
         func: addi r5 r0 7
         jalr r0 ra 0
         end:",
        &no_cache(),
    );
    assert_eq!(sim.cpu.regs.get(5), 7);
    assert_eq!(sim.cpu.regs.get(1), 4);
    assert_eq!(sim.steps(), 4);
}

#[test]
fn r0_ignores_writes_but_still_pays_writeback() {
    let mut sim = build("addi r0 r0 5\nadd r1 r0 r0\n", &no_cache());
    let report = sim.step().unwrap().unwrap();
    assert_eq!(report.cycles, 103);
    sim.step().unwrap();
    assert_eq!(sim.cpu.regs.get(0), 0);
    assert_eq!(sim.cpu.regs.get(1), 0);
    assert!(sim.step().unwrap().is_none());
}

#[test]
fn alu_semantics() {
    let sim = run(
        "addi r1 r0 -16
         addi r2 r0 2
         sra r3 r1 r2
         addi r4 r0 33
         sll r5 r2 r4
         sub r6 r0 r2
         xor r7 r1 r2
         lui r8 0x12345",
        &no_cache(),
    );
    assert_eq!(sim.cpu.regs.get(3) as i32, -4);
    // shift amount uses the low five bits only
    assert_eq!(sim.cpu.regs.get(5), 4);
    assert_eq!(sim.cpu.regs.get(6) as i32, -2);
    assert_eq!(sim.cpu.regs.get(7) as i32, -16 ^ 2);
    assert_eq!(sim.cpu.regs.get(8), 0x1234_5000);
}

#[test]
fn signed_branches() {
    let sim = run(
        "addi r1 r0 -1
         blt r1 r0 neg
         addi r2 r0 1
         neg: bge r0 r1 pos
         addi r3 r0 1
         pos: addi r4 r0 1",
        &no_cache(),
    );
    assert_eq!(sim.cpu.regs.get(2), 0);
    assert_eq!(sim.cpu.regs.get(3), 0);
    assert_eq!(sim.cpu.regs.get(4), 1);
}

#[test]
fn cache_hit_after_block_fill() {
    let mut sim = build("addi r1 r0 1\naddi r2 r0 2\n", &SimConfig::default());
    let total = sim.run(None, |_, _| {}).unwrap();
    // miss: hit time + penalty + memory, then a hit in the same two-word block
    assert_eq!(total, (10 + 4 + 100 + 3) + (10 + 3));
    let cache = sim.memory.cache.as_ref().unwrap();
    assert_eq!((cache.hits, cache.misses), (1, 1));
}

#[test]
fn write_back_needs_flush() {
    let cfg = SimConfig {
        cache: Some(CacheConfig { write_policy: WritePolicy::WriteBack, ..CacheConfig::default() }),
        ..SimConfig::default()
    };
    let mut sim = run("addi r1 r0 9\nsw r1 64(r0)\n", &cfg);
    assert_eq!(sim.memory.main.words[16], 0);
    sim.memory.flush().unwrap();
    assert_eq!(sim.memory.main.words[16], 9);
}

#[test]
fn step_limit() {
    let mut sim = build("spin: beq r0 r0 spin\n", &no_cache());
    let err = sim.run(Some(10), |_, _| {}).unwrap_err();
    assert!(matches!(err, SimError::StepLimit(10)));
    assert_eq!(sim.steps(), 10);
}

#[test]
fn traps() {
    let mut sim = build("addi r1 r0 2\nlw r2 0(r1)\n", &no_cache());
    let err = sim.run(None, |_, _| {}).unwrap_err();
    assert!(matches!(err, SimError::Trap(Trap::Unaligned { addr: 2 })));

    let mut sim = build("lw r2 1024(r0)\n", &no_cache());
    let err = sim.run(None, |_, _| {}).unwrap_err();
    assert!(matches!(err, SimError::Trap(Trap::Bus { addr: 1024, .. })));

    let program = load_program("11111111111111111111111111111111\n").unwrap();
    let mut sim = Simulation::new(&no_cache(), &program).unwrap();
    assert!(matches!(sim.step(), Err(Trap::InvalidInstruction { pc: 0, raw: 0xffff_ffff })));
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn program_writes_warn_but_proceed() {
    let log = Captured::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let sim = tracing::subscriber::with_default(subscriber, || run("sw r0 0(r0)\nadd r1 r1 r1\n", &no_cache()));
    assert_eq!(sim.memory.main.words[0], 0);
    assert_eq!(sim.cpu.pc, 8);

    let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains("WARN"), "{text}");
    assert!(text.contains("write to program memory at 0x00000000"), "{text}");
}

#[test]
fn data_writes_do_not_warn() {
    let log = Captured::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, || run("addi r1 r0 64\nsw r1 0(r1)\n", &no_cache()));
    assert!(log.0.lock().unwrap().is_empty());
}
