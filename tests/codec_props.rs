//! Property-based tests for the bit-string codec and the assembler front end.

use proptest::prelude::*;
use rv32i_rs::assemble;
use rv32i_rs::bits::{encode_immediate, encode_register};
use rv32i_rs::variant::Instruction;

fn read_signed(bits: &str) -> i64 {
    let raw = i64::from_str_radix(bits, 2).unwrap();
    if bits.starts_with('1') {
        raw - (1i64 << bits.len())
    } else {
        raw
    }
}

fn width_and_value() -> impl Strategy<Value = (usize, i64)> {
    (2usize..=21).prop_flat_map(|w| (Just(w), -(1i64 << (w - 1))..(1i64 << (w - 1))))
}

proptest! {
    #[test]
    fn register_round_trip(r in 0u8..32) {
        let bits = encode_register(&format!("r{r}")).unwrap();
        prop_assert_eq!(bits.len(), 5);
        prop_assert_eq!(u8::from_str_radix(&bits, 2).unwrap(), r);
    }

    #[test]
    fn immediate_round_trip((w, v) in width_and_value()) {
        let bits = encode_immediate(v, w);
        prop_assert_eq!(bits.len(), w);
        prop_assert_eq!(read_signed(&bits), v);
    }

    #[test]
    fn encoding_is_idempotent(rd in 0u8..32, rs1 in 0u8..32, imm in -2048i64..2048) {
        let inst = Instruction::parse(&format!("addi r{rd} r{rs1} {imm}")).unwrap();
        prop_assert_eq!(inst.encode().unwrap(), inst.encode().unwrap());
    }

    #[test]
    fn arbitrary_text_never_panics(src in prop::collection::vec(prop::char::range(' ', '~'), 0..128)) {
        let src: String = src.into_iter().collect();
        let _ = assemble(&src);
    }
}

#[test]
fn ra_aliases_r1() {
    assert_eq!(encode_register("ra").unwrap(), encode_register("r1").unwrap());
    assert_eq!(encode_register("a").unwrap(), "00001");
}
