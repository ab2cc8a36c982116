//! Bit-string codec for register and immediate fields.
//!
//! Fields are kept as MSB-first bit vectors so that an instruction word can be
//! assembled by plain concatenation, matching the order of the format tables.

use bitvec::prelude::*;

use crate::error::AsmError;

/// MSB-first bit string; index 0 is the most significant bit.
pub type Bits = BitVec<u8, Msb0>;
pub type BitsRef = BitSlice<u8, Msb0>;

pub const REG_BITS: usize = 5;
pub const NUM_REGS: u32 = 32;

/// Parses `r0`..`r31` (either case) or the return-address alias `ra` / `a`.
pub fn parse_register(token: &str) -> Result<u8, AsmError> {
    let invalid = || AsmError::InvalidRegister {
        token: token.to_string(),
        inst: token.to_string(),
    };
    let lower = token.to_ascii_lowercase();
    if lower == "ra" || lower == "a" {
        return Ok(1);
    }
    let digits = lower.strip_prefix('r').ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match digits.parse::<u32>() {
        Ok(n) if n < NUM_REGS => Ok(n as u8),
        _ => Err(invalid()),
    }
}

/// Parses a signed integer literal: decimal, `0x` hex or `0b` binary.
pub fn parse_immediate(token: &str) -> Result<i64, AsmError> {
    let invalid = || AsmError::InvalidImmediate {
        token: token.to_string(),
        inst: token.to_string(),
    };
    let (negative, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let (radix, digits) = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        (2, bin)
    } else {
        (10, body)
    };
    if digits.is_empty() || digits.starts_with(|c| c == '+' || c == '-') {
        return Err(invalid());
    }
    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Zero-extended `width`-bit field holding the low bits of `value`.
pub fn uint_bits(value: u64, width: usize) -> Bits {
    let mut bits = bitvec![u8, Msb0; 0; width];
    for i in 0..width.min(64) {
        bits.set(width - 1 - i, (value >> i) & 1 == 1);
    }
    bits
}

/// Two's-complement field of exactly `width` bits.
///
/// The magnitude is written out zero-extended; for negative values every bit
/// above the lowest set bit is inverted. Values that do not fit are truncated
/// to their low `width` bits. Widths above 64 sign-extend.
pub fn immediate_bits(value: i64, width: usize) -> Bits {
    let mut full = uint_bits(value.unsigned_abs(), 64);
    if value < 0 {
        if let Some(lowest) = full.last_one() {
            full[..lowest].iter_mut().for_each(|mut bit| *bit = !*bit);
        }
    }
    if width <= 64 {
        return full[64 - width..].to_bitvec();
    }
    let mut wide = Bits::repeat(value < 0, width - 64);
    wide.extend_from_bitslice(&full);
    wide
}

pub fn register_bits(reg: u8) -> Bits {
    uint_bits(reg as u64, REG_BITS)
}

/// Sub-range `[hi:lo]` of a field, numbered the way the ISA manual numbers
/// bits (bit 0 is the least significant).
pub fn field(bits: &BitsRef, hi: usize, lo: usize) -> &BitsRef {
    let len = bits.len();
    &bits[len - 1 - hi..len - lo]
}

pub fn render(bits: &BitsRef) -> String {
    bits.iter().by_vals().map(|b| if b { '1' } else { '0' }).collect()
}

/// 5-character binary string for a register token.
pub fn encode_register(token: &str) -> Result<String, AsmError> {
    parse_register(token).map(|r| render(&register_bits(r)))
}

/// `width`-character two's-complement string for `value`.
pub fn encode_immediate(value: i64, width: usize) -> String {
    render(&immediate_bits(value, width))
}

/// Reads an MSB-first string of `0`/`1` back as an unsigned number.
pub fn parse_word(text: &str) -> Option<u32> {
    if text.len() != 32 || !text.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }
    u32::from_str_radix(text, 2).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_immediates_match_native_twos_complement() {
        for v in -2048i64..2048 {
            let expected = format!("{:012b}", (v as u64) & 0xFFF);
            assert_eq!(encode_immediate(v, 12), expected, "value {v}");
        }
    }

    #[test]
    fn oversized_values_are_truncated() {
        assert_eq!(encode_immediate(4096 + 5, 12), "000000000101");
        assert_eq!(encode_immediate(-4097, 12), "111111111111");
    }

    #[test]
    fn widths_past_64_sign_extend() {
        let neg = encode_immediate(-2, 70);
        assert_eq!(neg.len(), 70);
        assert_eq!(neg, format!("{}0", "1".repeat(69)));
        let pos = encode_immediate(5, 66);
        assert_eq!(pos, format!("{}101", "0".repeat(63)));
    }

    #[test]
    fn field_uses_manual_bit_numbering() {
        let imm = immediate_bits(-4, 13);
        assert_eq!(render(&imm), "1111111111100");
        assert_eq!(render(field(&imm, 12, 12)), "1");
        assert_eq!(render(field(&imm, 4, 1)), "1110");
        assert_eq!(render(field(&imm, 10, 5)), "111111");
    }

    #[test]
    fn register_aliases() {
        assert_eq!(parse_register("ra").unwrap(), 1);
        assert_eq!(parse_register("RA").unwrap(), 1);
        assert_eq!(parse_register("a").unwrap(), 1);
        assert_eq!(parse_register("R31").unwrap(), 31);
        assert!(parse_register("r").is_err());
        assert!(parse_register("r+3").is_err());
        assert!(parse_register("x3").is_err());
    }

    #[test]
    fn immediate_literals() {
        assert_eq!(parse_immediate("-12").unwrap(), -12);
        assert_eq!(parse_immediate("0x10").unwrap(), 16);
        assert_eq!(parse_immediate("-0b101").unwrap(), -5);
        assert!(parse_immediate("--1").is_err());
        assert!(parse_immediate("loop").is_err());
    }
}
