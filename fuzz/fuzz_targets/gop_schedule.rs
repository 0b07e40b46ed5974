#![no_main]

//! Fuzz target for GOP pattern parsing and schedule derivation.
//!
//! Every pattern that parses and derives must yield headers that can be written.

use arbitrary::Arbitrary;
use hevc_encoder::{CavlcWriter, EncoderConfig, GopEntry, HeaderWriter, Schedule};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct GopInput {
    lines: Vec<String>,
    frames: u8,
}

fuzz_target!(|input: GopInput| {
    if input.lines.is_empty() || input.lines.len() > 16 {
        return;
    }

    let Ok(pattern) = input
        .lines
        .iter()
        .map(|line| line.parse::<GopEntry>())
        .collect::<Result<Vec<_>, _>>()
    else {
        return;
    };

    let config = EncoderConfig::new(pattern).with_frames(input.frames as usize + 1);
    if config.validate().is_err() {
        return;
    }

    if let Ok(schedule) = Schedule::from_config(&config) {
        let headers = HeaderWriter::new(&config, &schedule);
        let mut backend = CavlcWriter::new();
        let _ = headers.write_sps_reference_structure(&mut backend);
        for position in 0..config.sequence_length() {
            let _ = headers.write_slice_header(&mut backend, position);
        }
    }
});
