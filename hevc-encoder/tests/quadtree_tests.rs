//! Integration tests for the quadtree entropy pipeline.
//!
//! The round-trip tests decode the static-table output with the decoder's
//! inference rules and expect the encoded transform tree back.

use std::io;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use hevc_encoder::entropy::scan::diagonal_scan;
use hevc_encoder::{
    CabacWriter, CavlcWriter, Cbf, CbfFront, CodingQuadtree, CodingUnit, ComponentType,
    EncoderConfig, EntropyBackend, HevcError, IntraLumaMode, PartSize, PredictionUnit,
    QuadtreeEncoder, SliceContext, SliceType, TransformNode,
};
use hevc_encoder_core::{BitReader, BitWriter};

// ============================================================================
// Test backends
// ============================================================================

/// Records coded flags and blocks by name.
#[derive(Debug, Default)]
struct Recorder {
    events: Vec<String>,
}

impl EntropyBackend for Recorder {
    fn write_fixed_length(&mut self, value: u32, bits: u8) -> hevc_encoder::Result<()> {
        self.events.push(format!("u{} {}", bits, value));
        Ok(())
    }
    fn write_unsigned_code(&mut self, value: u32) -> hevc_encoder::Result<()> {
        self.events.push(format!("ue {}", value));
        Ok(())
    }
    fn write_signed_code(&mut self, value: i32) -> hevc_encoder::Result<()> {
        self.events.push(format!("se {}", value));
        Ok(())
    }
    fn write_flag(&mut self, flag: bool) -> hevc_encoder::Result<()> {
        self.events.push(format!("flag {}", flag as u8));
        Ok(())
    }
    fn write_unary_max(&mut self, value: u32, max: u32) -> hevc_encoder::Result<()> {
        self.events.push(format!("tu {}/{}", value, max));
        Ok(())
    }
    fn write_exp_golomb(&mut self, value: u32, order: u8) -> hevc_encoder::Result<()> {
        self.events.push(format!("eg{} {}", order, value));
        Ok(())
    }
    fn write_coefficient_block(
        &mut self,
        _coeffs: &[i32],
        width: u32,
        height: u32,
        component: ComponentType,
    ) -> hevc_encoder::Result<()> {
        self.events
            .push(format!("block {:?} {}x{}", component, width, height));
        Ok(())
    }
    fn code_cbf(&mut self, cbf: bool, component: ComponentType, tr_depth: u32) -> hevc_encoder::Result<()> {
        self.events
            .push(format!("cbf {:?} d{} {}", component, tr_depth, cbf as u8));
        Ok(())
    }
    fn finish(&mut self) -> hevc_encoder::Result<()> {
        Ok(())
    }
}

/// Accepts a fixed number of writes, then reports a sink failure.
struct FailingBackend {
    remaining: usize,
}

impl FailingBackend {
    fn take(&mut self) -> hevc_encoder::Result<()> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "sink closed").into());
        }
        self.remaining -= 1;
        Ok(())
    }
}

impl EntropyBackend for FailingBackend {
    fn write_fixed_length(&mut self, _value: u32, _bits: u8) -> hevc_encoder::Result<()> {
        self.take()
    }
    fn write_unsigned_code(&mut self, _value: u32) -> hevc_encoder::Result<()> {
        self.take()
    }
    fn write_signed_code(&mut self, _value: i32) -> hevc_encoder::Result<()> {
        self.take()
    }
    fn write_flag(&mut self, _flag: bool) -> hevc_encoder::Result<()> {
        self.take()
    }
    fn write_unary_max(&mut self, _value: u32, _max: u32) -> hevc_encoder::Result<()> {
        self.take()
    }
    fn write_exp_golomb(&mut self, _value: u32, _order: u8) -> hevc_encoder::Result<()> {
        self.take()
    }
    fn write_coefficient_block(
        &mut self,
        _coeffs: &[i32],
        _width: u32,
        _height: u32,
        _component: ComponentType,
    ) -> hevc_encoder::Result<()> {
        self.take()
    }
    fn finish(&mut self) -> hevc_encoder::Result<()> {
        self.take()
    }
}

fn dc_block(size: u32, value: i32) -> Vec<i32> {
    let mut coeffs = vec![0; (size * size) as usize];
    coeffs[0] = value;
    coeffs
}

fn default_config() -> EncoderConfig {
    EncoderConfig::default()
        .with_cu(64, 4)
        .with_tu_sizes(2, 5)
        .with_tu_depths(3, 3)
}

// ============================================================================
// Scenarios
// ============================================================================

/// 64x64 intra CU whose first 32x32 quadrant splits into four 16x16 leaves;
/// only the last leaf has chroma.
fn chroma_in_last_child() -> CodingUnit {
    let quadrant = TransformNode::split([
        TransformNode::leaf(16, dc_block(16, 4), Vec::new(), Vec::new()),
        TransformNode::leaf(16, dc_block(16, -1), Vec::new(), Vec::new()),
        TransformNode::empty(16),
        TransformNode::leaf(16, dc_block(16, 2), dc_block(8, 1), dc_block(8, -3)),
    ]);
    let transform = TransformNode::split([
        quadrant,
        TransformNode::leaf(32, dc_block(32, 1), Vec::new(), Vec::new()),
        TransformNode::empty(32),
        TransformNode::empty(32),
    ]);
    CodingUnit::intra(6, IntraLumaMode::MostProbable(0), 4, transform)
}

#[test]
fn test_fourth_chroma_flag_is_not_coded() {
    let encoder = QuadtreeEncoder::new(&default_config());
    let cu = chroma_in_last_child();
    assert!(cu.transform.children_cbf_consistent());

    let mut recorder = Recorder::default();
    encoder.encode_residual_quadtree(&cu, &mut recorder).unwrap();

    let depth2: Vec<&String> = recorder
        .events
        .iter()
        .filter(|e| e.starts_with("cbf Cb d2") || e.starts_with("cbf Cr d2"))
        .collect();
    assert_eq!(depth2.len(), 6);
    assert!(depth2.iter().all(|e| e.ends_with(" 0")));

    // Root chroma of the quadrant is set and coded.
    assert!(recorder.events.contains(&"cbf Cb d1 1".to_string()));
    let blocks: Vec<&String> = recorder
        .events
        .iter()
        .filter(|e| e.starts_with("block"))
        .collect();
    assert_eq!(
        blocks,
        vec![
            "block Luma 16x16",
            "block Luma 16x16",
            "block Luma 16x16",
            "block Cb 8x8",
            "block Cr 8x8",
            "block Luma 32x32",
        ]
    );
}

#[test]
fn test_backend_failure_propagates() {
    let encoder = QuadtreeEncoder::new(&default_config());
    let cu = chroma_in_last_child();

    let mut total = Recorder::default();
    encoder.encode_residual_quadtree(&cu, &mut total).unwrap();
    let writes = total.events.len();

    for remaining in [0, 1, writes / 2, writes - 1] {
        let mut backend = FailingBackend { remaining };
        let err = encoder
            .encode_residual_quadtree(&cu, &mut backend)
            .unwrap_err();
        assert!(matches!(err, HevcError::BackendIo(_)), "{:?}", err);
        assert!(err.is_picture_local());
    }

    let mut backend = FailingBackend { remaining: writes };
    encoder.encode_residual_quadtree(&cu, &mut backend).unwrap();
}

#[test]
fn test_bit_limit_propagates() {
    let encoder = QuadtreeEncoder::new(&default_config());
    let cu = chroma_in_last_child();
    let mut backend = CavlcWriter::with_writer(BitWriter::with_limit(40));
    let err = encoder
        .encode_residual_quadtree(&cu, &mut backend)
        .unwrap_err();
    assert!(matches!(err, HevcError::BackendIo(_)));
}

#[test]
fn test_coding_tree_unit_with_both_backends() {
    let config = default_config();
    let encoder = QuadtreeEncoder::new(&config);
    let slice = SliceContext::new(SliceType::P).with_num_ref_idx(2, 0);

    let inter = CodingUnit::inter(
        5,
        PartSize::Size2NxN,
        vec![
            PredictionUnit {
                ref_idx: [1, 0],
                ..PredictionUnit::default()
            },
            PredictionUnit::merged(3),
        ],
        TransformNode::split([
            TransformNode::empty(16),
            TransformNode::leaf(16, dc_block(16, 7), dc_block(8, 1), Vec::new()),
            TransformNode::empty(16),
            TransformNode::leaf(16, dc_block(16, -2), Vec::new(), Vec::new()),
        ]),
    );
    let ctu = CodingQuadtree::split([
        CodingQuadtree::Unit(chroma_in_last_child_32()),
        CodingQuadtree::Unit(CodingUnit::skipped(5, 1)),
        CodingQuadtree::Unit(inter),
        CodingQuadtree::Unit(CodingUnit::skipped(5, 0)),
    ]);

    let mut cavlc = CavlcWriter::new();
    encoder.encode_coding_quadtree(&ctu, &slice, &mut cavlc).unwrap();
    cavlc.code_end_of_slice_segment_flag(true).unwrap();
    cavlc.finish().unwrap();
    assert!(cavlc.position() % 8 == 0);

    let encode_cabac = || {
        let mut cabac = CabacWriter::new(SliceType::P, config.qp);
        encoder.encode_coding_quadtree(&ctu, &slice, &mut cabac).unwrap();
        cabac.code_end_of_slice_segment_flag(true).unwrap();
        cabac.finish().unwrap();
        cabac.into_data()
    };
    let first = encode_cabac();
    assert!(!first.is_empty());
    assert_eq!(first, encode_cabac());
}

fn chroma_in_last_child_32() -> CodingUnit {
    CodingUnit::intra(
        5,
        IntraLumaMode::Remaining(12),
        1,
        TransformNode::split([
            TransformNode::leaf(16, dc_block(16, 1), Vec::new(), Vec::new()),
            TransformNode::empty(16),
            TransformNode::empty(16),
            TransformNode::leaf(16, Vec::new(), dc_block(8, 2), Vec::new()),
        ]),
    )
}

/// 8x8 intra CU split into four 4x4 leaves whose shared chroma sits in `holder`.
fn shared_chroma_cu(holder: usize, extra: Option<usize>) -> CodingUnit {
    let children = std::array::from_fn(|i| {
        let cb = if i == holder {
            dc_block(4, 3)
        } else if Some(i) == extra {
            dc_block(4, 9)
        } else {
            Vec::new()
        };
        TransformNode::leaf(4, dc_block(4, 1), cb, Vec::new())
    });
    CodingUnit::intra(3, IntraLumaMode::MostProbable(1), 4, TransformNode::split(children))
}

#[test]
fn test_shared_chroma_outside_first_leaf_rejected() {
    let encoder = QuadtreeEncoder::new(&default_config());

    let mut backend = CavlcWriter::new();
    encoder
        .encode_residual_quadtree(&shared_chroma_cu(0, None), &mut backend)
        .unwrap();

    for cu in [shared_chroma_cu(0, Some(1)), shared_chroma_cu(2, None)] {
        let err = encoder
            .encode_residual_quadtree(&cu, &mut CavlcWriter::new())
            .unwrap_err();
        assert!(matches!(err, HevcError::InvariantViolation(_)), "{:?}", err);
        assert!(err.to_string().contains("chroma"), "{}", err);
    }
}

#[test]
fn test_inter_cu_in_intra_slice_rejected() {
    let encoder = QuadtreeEncoder::new(&default_config());
    let cu = CodingUnit::skipped(4, 0);
    let err = encoder
        .encode_coding_unit(&cu, &SliceContext::new(SliceType::I), &mut Recorder::default())
        .unwrap_err();
    assert!(matches!(err, HevcError::InvariantViolation(_)));
}

// ============================================================================
// Round trip through the static-table backend
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Params {
    min_cu: u32,
    max_cu: u32,
    tu_min: u32,
    tu_max: u32,
    depth_inter: u32,
    depth_intra: u32,
}

impl Params {
    fn config(&self) -> EncoderConfig {
        EncoderConfig::default()
            .with_cu(1 << self.max_cu, self.max_cu + 1 - self.min_cu)
            .with_tu_sizes(self.tu_min, self.tu_max)
            .with_tu_depths(self.depth_inter, self.depth_intra)
    }
}

const PARAMS: [Params; 4] = [
    Params {
        min_cu: 3,
        max_cu: 6,
        tu_min: 2,
        tu_max: 5,
        depth_inter: 3,
        depth_intra: 3,
    },
    Params {
        min_cu: 3,
        max_cu: 5,
        tu_min: 2,
        tu_max: 4,
        depth_inter: 1,
        depth_intra: 2,
    },
    Params {
        min_cu: 3,
        max_cu: 6,
        tu_min: 2,
        tu_max: 5,
        depth_inter: 4,
        depth_intra: 1,
    },
    Params {
        min_cu: 3,
        max_cu: 4,
        tu_min: 3,
        tu_max: 4,
        depth_inter: 2,
        depth_intra: 2,
    },
];

/// Deterministic byte source driving tree generation.
struct Source<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Source<'_> {
    fn byte(&mut self) -> u8 {
        let b = self.bytes.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    fn bit(&mut self) -> bool {
        self.byte() & 1 == 1
    }

    fn block(&mut self, width: u32, height: u32) -> Vec<i32> {
        let mut coeffs: Vec<i32> = (0..width * height)
            .map(|_| match self.byte() {
                b if b < 200 => 0,
                b => (b as i32 % 9) - 4,
            })
            .collect();
        if coeffs.iter().all(|&c| c == 0) {
            let at = self.byte() as usize % coeffs.len();
            coeffs[at] = if self.bit() { 1 } else { -5 };
        }
        coeffs
    }
}

/// Shape of the CU the residual quadtree belongs to.
#[derive(Debug, Clone, Copy)]
struct CuShape {
    log2: u32,
    intra: bool,
    part: PartSize,
    merge: bool,
}

fn inferred_split(p: &Params, cu: &CuShape, min_in_cu: u32, log2: u32, depth: u32) -> Option<bool> {
    if cu.intra && cu.part == PartSize::SizeNxN && depth == 0 {
        Some(true)
    } else if !cu.intra && cu.part != PartSize::Size2Nx2N && depth == 0 && p.depth_inter == 1 {
        Some(log2 > min_in_cu)
    } else if log2 > p.tu_max {
        Some(true)
    } else if log2 == p.tu_min || log2 == min_in_cu {
        Some(false)
    } else {
        None
    }
}

fn generate_node(
    src: &mut Source,
    p: &Params,
    cu: &CuShape,
    min_in_cu: u32,
    log2: u32,
    depth: u32,
    quad: usize,
) -> TransformNode {
    let split = inferred_split(p, cu, min_in_cu, log2, depth).unwrap_or_else(|| src.bit());
    if split {
        let children: [TransformNode; 4] = std::array::from_fn(|i| {
            generate_node(src, p, cu, min_in_cu, log2 - 1, depth + 1, i)
        });
        return TransformNode::split(children);
    }

    let size = 1 << log2;
    let luma = if (!cu.intra && (quad == 3 || depth == 0)) || src.bit() {
        src.block(size, size)
    } else {
        Vec::new()
    };
    let min_quad = depth > 0 && log2 == p.tu_min;
    let (cb, cr) = if min_quad && quad != 0 {
        (Vec::new(), Vec::new())
    } else {
        let chroma = if min_quad { size } else { size / 2 };
        let cb = if src.bit() { src.block(chroma, chroma) } else { Vec::new() };
        let cr = if src.bit() { src.block(chroma, chroma) } else { Vec::new() };
        (cb, cr)
    };
    TransformNode::leaf(size, luma, cb, cr)
}

fn generate_cu(src: &mut Source, p: &Params, encoder: &QuadtreeEncoder) -> CodingUnit {
    let log2 = p.min_cu + (src.byte() as u32 % (p.max_cu - p.min_cu + 1));
    let intra = src.bit();
    let part = if intra {
        if log2 == p.min_cu && log2 > p.tu_min && src.bit() {
            PartSize::SizeNxN
        } else {
            PartSize::Size2Nx2N
        }
    } else {
        [PartSize::Size2Nx2N, PartSize::Size2NxN, PartSize::SizeNx2N][src.byte() as usize % 3]
    };
    let merge = !intra && part == PartSize::Size2Nx2N && src.bit();
    let shape = CuShape {
        log2,
        intra,
        part,
        merge,
    };

    // Placeholder transform to ask the encoder for the CU's minimum transform.
    let mut cu = if intra {
        let mut cu = CodingUnit::intra(log2, IntraLumaMode::MostProbable(0), 4, TransformNode::empty(1));
        cu.part_size = part;
        cu
    } else {
        let units = vec![
            if merge {
                PredictionUnit::merged(0)
            } else {
                PredictionUnit::default()
            };
            part.num_partitions()
        ];
        CodingUnit::inter(log2, part, units, TransformNode::empty(1))
    };
    let min_in_cu = encoder.log2_min_tu_in_cu(&cu);
    cu.transform = generate_node(src, p, &shape, min_in_cu, log2, 0, 0);
    cu
}

/// Flags decoded in the first pass.
enum Shape {
    Leaf(Cbf),
    Split(Cbf, Box<[Shape; 4]>),
}

struct Decoder<'a> {
    reader: BitReader<'a>,
    params: Params,
    cu: CuShape,
    min_in_cu: u32,
}

impl Decoder<'_> {
    fn flag(&mut self) -> bool {
        self.reader.read_bit().unwrap()
    }

    fn residual_quadtree(&mut self) -> TransformNode {
        if !self.cu.intra {
            let root = if self.cu.merge { true } else { self.flag() };
            if !root {
                return TransformNode::empty(1 << self.cu.log2);
            }
        }
        let (shape, _) = self.flags(self.cu.log2, 0, 0, Cbf::default(), CbfFront::default());
        self.coefficients(&shape, self.cu.log2)
    }

    fn flags(&mut self, log2: u32, depth: u32, quad: usize, parent: Cbf, front: CbfFront) -> (Shape, CbfFront) {
        let p = self.params;
        let split = match inferred_split(&p, &self.cu, self.min_in_cu, log2, depth) {
            Some(split) => split,
            None => self.flag(),
        };

        let mut front = front;
        let mut cbf = Cbf::default();
        if log2 <= p.tu_max {
            let first = log2 == p.tu_max || depth == 0;
            if first || log2 > p.tu_min {
                for (slot, counter, inherited) in [
                    (&mut cbf.cb, &mut front.u, parent.cb),
                    (&mut cbf.cr, &mut front.v, parent.cr),
                ] {
                    if first || inherited {
                        *slot = if quad == 3 && *counter == 0 && log2 < p.tu_max {
                            true
                        } else {
                            self.reader.read_bit().unwrap()
                        };
                        *counter += *slot as u32;
                    }
                }
            } else if log2 == p.tu_min {
                cbf.cb = parent.cb;
                cbf.cr = parent.cr;
                front.u += parent.cb as u32;
                front.v += parent.cr as u32;
            }
        }

        if split {
            let mut inner = CbfFront::default();
            let children: [Shape; 4] = std::array::from_fn(|i| {
                let (child, next) = self.flags(log2 - 1, depth + 1, i, cbf, inner);
                inner = next;
                child
            });
            return (Shape::Split(cbf, Box::new(children)), front + inner);
        }

        cbf.luma = if !self.cu.intra && depth == 0 && !cbf.cb && !cbf.cr {
            true
        } else if !self.cu.intra
            && quad == 3
            && front == CbfFront::default()
            && (self.cu.log2 <= p.tu_max + 1 || log2 < p.tu_max)
        {
            true
        } else {
            self.flag()
        };
        front.y += cbf.luma as u32;
        (Shape::Leaf(cbf), front)
    }

    fn block(&mut self, width: u32, height: u32) -> Vec<i32> {
        let order = diagonal_scan(width, height);
        let mut coeffs = vec![0; (width * height) as usize];
        let last = self.reader.read_ue().unwrap() as usize;
        for n in (0..=last).rev() {
            if n == last || self.flag() {
                let magnitude = self.reader.read_ue().unwrap() as i32 + 1;
                let (x, y) = order[n];
                coeffs[(y * width + x) as usize] = if self.flag() { -magnitude } else { magnitude };
            }
        }
        coeffs
    }

    fn leaf_luma(&mut self, cbf: &Cbf, size: u32) -> Vec<i32> {
        if cbf.luma {
            self.block(size, size)
        } else {
            Vec::new()
        }
    }

    fn coefficients(&mut self, shape: &Shape, log2: u32) -> TransformNode {
        let size = 1 << log2;
        match shape {
            Shape::Leaf(cbf) => {
                let luma = self.leaf_luma(cbf, size);
                let cb = if cbf.cb { self.block(size / 2, size / 2) } else { Vec::new() };
                let cr = if cbf.cr { self.block(size / 2, size / 2) } else { Vec::new() };
                TransformNode::leaf(size, luma, cb, cr)
            }
            Shape::Split(cbf, children) if log2 - 1 == self.params.tu_min => {
                let child_size = size / 2;
                let chroma = match &children[0] {
                    Shape::Leaf(first) if log2 - 1 == self.params.tu_max => *first,
                    _ => *cbf,
                };
                let mut lumas = Vec::with_capacity(4);
                let mut cb = Vec::new();
                let mut cr = Vec::new();
                for (i, child) in children.iter().enumerate() {
                    let Shape::Leaf(child_cbf) = child else {
                        panic!("minimum-size transform is split");
                    };
                    lumas.push(self.leaf_luma(child_cbf, child_size));
                    if i == 3 {
                        if chroma.cb {
                            cb = self.block(child_size, child_size);
                        }
                        if chroma.cr {
                            cr = self.block(child_size, child_size);
                        }
                    }
                }
                let mut lumas = lumas.into_iter();
                let mut chroma = Some((cb, cr));
                TransformNode::split(std::array::from_fn(|_| {
                    let (cb, cr) = chroma.take().unwrap_or_default();
                    TransformNode::leaf(child_size, lumas.next().unwrap(), cb, cr)
                }))
            }
            Shape::Split(_, children) => {
                let mut children = children.iter();
                TransformNode::split(std::array::from_fn(|_| {
                    self.coefficients(children.next().unwrap(), log2 - 1)
                }))
            }
        }
    }
}

fn roundtrip(params_index: usize, bytes: &[u8]) {
    let p = PARAMS[params_index];
    let config = p.config();
    config.validate().unwrap();
    let encoder = QuadtreeEncoder::new(&config);

    let mut src = Source { bytes, pos: 0 };
    let cu = generate_cu(&mut src, &p, &encoder);

    let mut backend = CavlcWriter::new();
    encoder.encode_residual_quadtree(&cu, &mut backend).unwrap();
    backend.finish().unwrap();
    let data = backend.into_data();

    let mut decoder = Decoder {
        reader: BitReader::new(&data),
        params: p,
        cu: CuShape {
            log2: cu.log2_size,
            intra: cu.is_intra(),
            part: cu.part_size,
            merge: cu.is_merge_2nx2n(),
        },
        min_in_cu: encoder.log2_min_tu_in_cu(&cu),
    };
    let decoded = decoder.residual_quadtree();
    assert_eq!(decoded, cu.transform);
    // Only the stop bit and padding remain.
    assert!(decoder.reader.read_bit().unwrap());
    assert!(decoder.reader.remaining_bits() < 8);
}

#[test]
fn test_roundtrip_fixed_inputs() {
    for (i, seed) in [0u8, 1, 77, 200, 255].iter().enumerate() {
        let bytes: Vec<u8> = (0..4096u32)
            .map(|n| (n as u8).wrapping_mul(31).wrapping_add(*seed))
            .collect();
        roundtrip(i % PARAMS.len(), &bytes);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_residual_quadtree_roundtrip(
        params_index in 0..PARAMS.len(),
        bytes in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        roundtrip(params_index, &bytes);
    }
}

trait ConsistentFlags {
    fn children_cbf_consistent(&self) -> bool;
}

impl ConsistentFlags for TransformNode {
    /// Split flags equal the union of the children's.
    fn children_cbf_consistent(&self) -> bool {
        match self.tree() {
            hevc_encoder::TransformTree::Leaf(_) => true,
            hevc_encoder::TransformTree::Split(children) => {
                let union = children.iter().fold(Cbf::default(), |acc, c| Cbf {
                    luma: acc.luma || c.cbf().luma,
                    cb: acc.cb || c.cbf().cb,
                    cr: acc.cr || c.cbf().cr,
                });
                union == self.cbf() && children.iter().all(|c| c.children_cbf_consistent())
            }
        }
    }
}
