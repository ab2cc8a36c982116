use pretty_assertions::assert_eq;
use rv32i_rs::source::lines_from_str;
use rv32i_rs::Assembler;

#[test]
fn labels_map_to_instruction_indices() {
    let src = "\
# prologue
start: addi r1 r0 10

loop:
    addi r1 r1 -1   # label above binds here
    bne r1 r0 loop
done: add r0 r0 r0
";
    let asm = Assembler::pass1(&lines_from_str(src)).unwrap();
    assert_eq!(asm.len(), 4);
    assert_eq!(asm.labels().sorted(), vec![("start", 0), ("loop", 1), ("done", 3)]);
}

#[test]
fn pass1_leaves_label_targets_pending() {
    let mut asm = Assembler::pass1(&lines_from_str("jal ra f\nf: add r1 r1 r1\n")).unwrap();
    let pending: Vec<_> = asm.program().map(|i| i.pending_label().map(str::to_string)).collect();
    assert_eq!(pending, vec![Some("f".to_string()), None]);

    asm.pass2().unwrap();
    assert!(asm.program().all(|i| i.pending_label().is_none()));
}

#[test]
fn pass2_is_repeatable() {
    let mut asm = Assembler::pass1(&lines_from_str("l: add r1 r1 r1\nbeq r1 r2 l\n")).unwrap();
    let first = asm.pass2().unwrap();
    let second = asm.pass2().unwrap();
    assert_eq!(first, second);
}

#[test]
fn stacked_labels_share_an_index() {
    let asm = Assembler::pass1(&lines_from_str("a:\nb:\nc: add r1 r1 r1\n")).unwrap();
    assert_eq!(asm.labels().sorted(), vec![("a", 0), ("b", 0), ("c", 0)]);
}
