#![no_main]

//! Fuzz target for the bit writer and reader.
//!
//! Values written must read back unchanged.

use arbitrary::Arbitrary;
use hevc_encoder_core::{BitReader, BitWriter};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Symbol {
    Bit(bool),
    Bits(u32, u8),
    Ue(u32),
    Se(i32),
    ExpGolombK(u32, u8),
}

fuzz_target!(|symbols: Vec<Symbol>| {
    let symbols: Vec<Symbol> = symbols
        .into_iter()
        .take(256)
        .map(|s| match s {
            Symbol::Bits(v, n) => {
                let n = n % 32 + 1;
                Symbol::Bits(if n == 32 { v } else { v & ((1 << n) - 1) }, n)
            }
            Symbol::Ue(v) => Symbol::Ue(v.min(u32::MAX - 1)),
            Symbol::Se(v) => Symbol::Se(v.clamp(i32::MIN + 1, i32::MAX)),
            Symbol::ExpGolombK(v, k) => Symbol::ExpGolombK(v >> 1, k % 8),
            other => other,
        })
        .collect();

    let mut writer = BitWriter::new();
    for symbol in &symbols {
        let written = match *symbol {
            Symbol::Bit(b) => writer.write_bit(b),
            Symbol::Bits(v, n) => writer.write_bits(v, n),
            Symbol::Ue(v) => writer.write_ue(v),
            Symbol::Se(v) => writer.write_se(v),
            Symbol::ExpGolombK(v, k) => writer.write_exp_golomb_k(v, k),
        };
        if written.is_err() {
            return;
        }
    }
    if writer.write_rbsp_trailing_bits().is_err() {
        return;
    }
    let data = writer.into_data();

    let mut reader = BitReader::new(&data);
    for symbol in &symbols {
        match *symbol {
            Symbol::Bit(b) => assert_eq!(reader.read_bit().ok(), Some(b)),
            Symbol::Bits(v, n) => assert_eq!(reader.read_bits(n).ok(), Some(v)),
            Symbol::Ue(v) => assert_eq!(reader.read_ue().ok(), Some(v)),
            Symbol::Se(v) => assert_eq!(reader.read_se().ok(), Some(v)),
            Symbol::ExpGolombK(v, k) => assert_eq!(reader.read_exp_golomb_k(k).ok(), Some(v)),
        }
    }
});
