//! Benchmark fixtures for the HEVC encoder core.
//!
//! Provides reproducible GOP patterns and coding tree units so the criterion
//! benches measure scheduling and entropy coding on the same inputs every run.

use hevc_encoder::{
    CodingQuadtree, CodingUnit, EncoderConfig, GopEntry, IntraLumaMode, MotionVector, PartSize,
    PredictionUnit, SliceType, TransformNode,
};

/// Low-delay P pattern with the first `refs` references (1..=4) per picture.
pub fn low_delay_pattern(refs: usize) -> Vec<GopEntry> {
    const REFERENCES: [[i32; 4]; 4] = [
        [-1, -5, -9, -13],
        [-1, -2, -6, -10],
        [-1, -3, -7, -11],
        [-1, -4, -8, -12],
    ];
    let refs = refs.clamp(1, 4);
    REFERENCES
        .iter()
        .zip(1..)
        .map(|(deltas, poc)| {
            GopEntry::new(SliceType::P, poc)
                .with_references(&deltas[..refs])
                .with_qp(if poc == 4 { 1 } else { 3 }, 0.4624)
        })
        .collect()
}

/// Hierarchical B pattern of eight pictures in coding order.
pub fn random_access_pattern() -> Vec<GopEntry> {
    vec![
        GopEntry::new(SliceType::B, 8).with_references(&[-8, -10, -12, -16]),
        GopEntry::new(SliceType::B, 4)
            .with_references(&[-4, -6, 4])
            .with_temporal_id(1),
        GopEntry::new(SliceType::B, 2)
            .with_references(&[-2, -4, 2, 6])
            .with_temporal_id(2),
        GopEntry::new(SliceType::B, 1)
            .with_references(&[-1, 1, 3, 7])
            .with_temporal_id(3)
            .non_reference(),
        GopEntry::new(SliceType::B, 3)
            .with_references(&[-1, -3, 1, 5])
            .with_temporal_id(3)
            .non_reference(),
        GopEntry::new(SliceType::B, 6)
            .with_references(&[-2, -4, -6, 2])
            .with_temporal_id(2),
        GopEntry::new(SliceType::B, 5)
            .with_references(&[-1, -5, 1, 3])
            .with_temporal_id(3)
            .non_reference(),
        GopEntry::new(SliceType::B, 7)
            .with_references(&[-1, -3, -7, 1])
            .with_temporal_id(3)
            .non_reference(),
    ]
}

/// Default configuration around `pattern`.
pub fn bench_config(pattern: Vec<GopEntry>, frames: usize) -> EncoderConfig {
    EncoderConfig::new(pattern).with_frames(frames)
}

/// Sparse coefficient block with roughly one nonzero value in `period`.
pub fn coefficients(size: usize, period: usize, seed: i32) -> Vec<i32> {
    let period = period.max(1);
    (0..size)
        .map(|i| {
            if i % period == 0 {
                let magnitude = ((i as i32 * 7 + seed) % 13) - 6;
                if magnitude == 0 {
                    1
                } else {
                    magnitude
                }
            } else {
                0
            }
        })
        .collect()
}

/// Square transform leaf with luma and both chroma blocks populated.
pub fn residual_leaf(size: u32, period: usize, seed: i32) -> TransformNode {
    let luma = (size * size) as usize;
    let chroma = luma / 4;
    TransformNode::leaf(
        size,
        coefficients(luma, period, seed),
        coefficients(chroma, period, seed + 1),
        coefficients(chroma, period, seed + 2),
    )
}

/// CTU of 64x64 luma samples split into four 32x32 CUs.
///
/// I slices get intra CUs only; P and B slices mix intra, inter and skipped
/// CUs. `period` controls coefficient density.
pub fn sample_ctu(slice_type: SliceType, period: usize) -> CodingQuadtree {
    let split_residual = |seed: i32| {
        TransformNode::split(std::array::from_fn(|i| {
            residual_leaf(16, period, seed + i as i32)
        }))
    };
    let intra = |seed: i32| {
        CodingQuadtree::Unit(CodingUnit::intra(
            5,
            IntraLumaMode::Remaining(seed as u32 % 32),
            4,
            split_residual(seed),
        ))
    };

    if slice_type.is_intra() {
        return CodingQuadtree::split(std::array::from_fn(|i| intra(i as i32 * 5)));
    }

    let unit = PredictionUnit {
        mvd: [MotionVector::new(3, -2), MotionVector::default()],
        ..PredictionUnit::default()
    };
    let inter = CodingQuadtree::Unit(CodingUnit::inter(
        5,
        PartSize::Size2Nx2N,
        vec![unit],
        residual_leaf(32, period, 3),
    ));
    let halves = CodingQuadtree::Unit(CodingUnit::inter(
        5,
        PartSize::Size2NxN,
        vec![unit, PredictionUnit::merged(1)],
        split_residual(9),
    ));
    CodingQuadtree::split([
        intra(0),
        inter,
        CodingQuadtree::Unit(CodingUnit::skipped(5, 0)),
        halves,
    ])
}
