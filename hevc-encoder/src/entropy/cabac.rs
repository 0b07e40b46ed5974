//! Context-adaptive binary arithmetic coding backend.
//!
//! [`CabacWriter`] codes every syntax element with the context models and
//! binarizations of H.265 clause 9.3. The generic primitives (fixed-length,
//! Exp-Golomb, unary) have no context of their own and are coded as bypass
//! bins.

use hevc_encoder_core::{BitWriter, BitstreamError};

use super::{check_block, part_mode_bins, scan, EntropyBackend, PartModeContext};
use crate::error::{HevcError, Result};
use crate::gop::SliceType;
use crate::tree::{ComponentType, InterDir, MotionVector, PartSize};

/// CABAC state for a single context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CabacContext {
    /// State index (0-63).
    state: u8,
    /// Most probable symbol.
    mps: bool,
}

impl CabacContext {
    /// Initialize a context from its init value at slice QP `qp`.
    pub fn new(init_value: u8, qp: i32) -> Self {
        let slope = ((init_value >> 4) as i32) * 5 - 45;
        let offset = (((init_value & 0x0F) as i32) << 3) - 16;
        let pre_ctx_state = (((slope * qp.clamp(0, 51)) >> 4) + offset).clamp(1, 126);

        if pre_ctx_state <= 63 {
            Self {
                state: (63 - pre_ctx_state) as u8,
                mps: false,
            }
        } else {
            Self {
                state: (pre_ctx_state - 64) as u8,
                mps: true,
            }
        }
    }

    /// Update context after coding a symbol.
    pub fn update(&mut self, symbol: bool) {
        if symbol == self.mps {
            self.state = NEXT_STATE_MPS[self.state as usize];
        } else {
            if self.state == 0 {
                self.mps = !self.mps;
            }
            self.state = NEXT_STATE_LPS[self.state as usize];
        }
    }

    /// Get the current state.
    pub fn state(&self) -> u8 {
        self.state
    }

    /// Get the MPS value.
    pub fn mps(&self) -> bool {
        self.mps
    }
}

// State transition tables for CABAC
const NEXT_STATE_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
    17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
    33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

const NEXT_STATE_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12,
    13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
    24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
    33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

// Range table for LPS (indexed by state and qRangeIdx)
const RANGE_TAB_LPS: [[u8; 4]; 64] = [
    [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
    [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
    [95, 116, 137, 158], [90, 110, 130, 150], [85, 104, 123, 142], [81, 99, 117, 135],
    [77, 94, 111, 128], [73, 89, 105, 122], [69, 85, 100, 116], [66, 80, 95, 110],
    [62, 76, 90, 104], [59, 72, 86, 99], [56, 69, 81, 94], [53, 65, 77, 89],
    [51, 62, 73, 85], [48, 59, 69, 80], [46, 56, 66, 76], [43, 53, 63, 72],
    [41, 50, 59, 69], [39, 48, 56, 65], [37, 45, 54, 62], [35, 43, 51, 59],
    [33, 41, 48, 56], [32, 39, 46, 53], [30, 37, 43, 50], [29, 35, 41, 48],
    [27, 33, 39, 45], [26, 31, 37, 43], [24, 30, 35, 41], [23, 28, 33, 39],
    [22, 27, 32, 37], [21, 26, 30, 35], [20, 24, 29, 33], [19, 23, 27, 31],
    [18, 22, 26, 30], [17, 21, 25, 28], [16, 20, 23, 27], [15, 19, 22, 25],
    [14, 18, 21, 24], [14, 17, 20, 23], [13, 16, 19, 22], [12, 15, 18, 21],
    [12, 14, 17, 20], [11, 14, 16, 19], [11, 13, 15, 18], [10, 12, 15, 17],
    [10, 12, 14, 16], [9, 11, 13, 15], [9, 11, 12, 14], [8, 10, 12, 14],
    [8, 9, 11, 13], [7, 9, 11, 12], [7, 9, 10, 12], [7, 8, 10, 11],
    [6, 8, 9, 11], [6, 7, 9, 10], [6, 7, 8, 9], [2, 2, 2, 2],
];

// Init values per initType (I, P, B). 154 marks contexts unused in that slice type.
const SPLIT_CU_FLAG_INIT: [[u8; 3]; 3] = [[139, 141, 157], [107, 139, 126], [107, 139, 126]];
const CU_SKIP_FLAG_INIT: [[u8; 3]; 3] = [[154, 154, 154], [197, 185, 201], [197, 185, 201]];
const PRED_MODE_INIT: [[u8; 1]; 3] = [[154], [149], [134]];
const PART_MODE_INIT: [[u8; 4]; 3] = [[184, 154, 154, 154], [154, 139, 154, 154], [154, 139, 154, 154]];
const PREV_INTRA_LUMA_PRED_INIT: [[u8; 1]; 3] = [[184], [154], [183]];
const INTRA_CHROMA_PRED_MODE_INIT: [[u8; 1]; 3] = [[63], [152], [152]];
const RQT_ROOT_CBF_INIT: [[u8; 1]; 3] = [[154], [79], [79]];
const MERGE_FLAG_INIT: [[u8; 1]; 3] = [[154], [110], [154]];
const MERGE_IDX_INIT: [[u8; 1]; 3] = [[154], [122], [137]];
const INTER_PRED_IDC_INIT: [[u8; 5]; 3] = [
    [154, 154, 154, 154, 154],
    [95, 79, 63, 31, 31],
    [95, 79, 63, 31, 31],
];
const REF_IDX_INIT: [[u8; 2]; 3] = [[154, 154], [153, 153], [153, 153]];
const MVP_FLAG_INIT: [[u8; 1]; 3] = [[154], [168], [168]];
const SPLIT_TRANSFORM_FLAG_INIT: [[u8; 3]; 3] = [[153, 138, 138], [124, 138, 94], [224, 167, 122]];
const CBF_LUMA_INIT: [[u8; 2]; 3] = [[111, 141], [153, 111], [153, 111]];
const CBF_CHROMA_INIT: [[u8; 4]; 3] = [[94, 138, 182, 154], [149, 107, 167, 154], [149, 92, 167, 154]];
const ABS_MVD_GREATER0_INIT: [[u8; 1]; 3] = [[154], [140], [169]];
const ABS_MVD_GREATER1_INIT: [[u8; 1]; 3] = [[154], [198], [198]];
const LAST_SIG_COEFF_PREFIX_INIT: [[u8; 18]; 3] = [
    [110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111, 79, 108, 123, 63],
    [125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111, 95, 94, 108, 123, 108],
    [125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111, 111, 79, 108, 123, 93],
];
const CODED_SUB_BLOCK_FLAG_INIT: [[u8; 4]; 3] = [[91, 171, 134, 141], [121, 140, 61, 154], [121, 140, 61, 154]];
const SIG_COEFF_FLAG_INIT: [[u8; 42]; 3] = [
    [
        111, 111, 125, 110, 110, 94, 124, 108, 124, 107, 125, 141, 179, 153, 125, 107, 125, 141,
        179, 153, 125, 107, 125, 141, 179, 153, 125, 140, 139, 182, 182, 152, 136, 152, 136, 153,
        136, 139, 111, 136, 139, 111,
    ],
    [
        155, 154, 139, 153, 139, 123, 123, 63, 153, 166, 183, 140, 136, 153, 154, 166, 183, 140,
        136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 123, 123, 107, 121, 107, 121, 167,
        151, 183, 140, 151, 183, 140,
    ],
    [
        170, 154, 139, 153, 139, 123, 123, 63, 124, 166, 183, 140, 136, 153, 154, 166, 183, 140,
        136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 138, 138, 122, 121, 122, 121, 167,
        151, 183, 140, 151, 183, 140,
    ],
];
const GREATER1_INIT: [[u8; 24]; 3] = [
    [
        140, 92, 137, 138, 140, 152, 138, 139, 153, 74, 149, 92, 139, 107, 122, 152, 140, 179, 166,
        182, 140, 227, 122, 197,
    ],
    [
        154, 196, 196, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 137, 169, 194,
        166, 167, 154, 167, 137, 182,
    ],
    [
        154, 196, 167, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 122, 169, 208,
        166, 167, 154, 152, 167, 182,
    ],
];
const GREATER2_INIT: [[u8; 6]; 3] = [
    [138, 153, 136, 167, 152, 152],
    [107, 167, 91, 122, 107, 167],
    [107, 167, 91, 107, 107, 167],
];

const CTX_IDX_MAP: [usize; 16] = [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];
const GROUP_IDX: [u32; 32] = [
    0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
];
const MIN_IN_GROUP: [u32; 10] = [0, 1, 2, 3, 4, 6, 8, 12, 16, 24];
const COEF_REMAIN_BIN_REDUCTION: u32 = 3;

fn init<const N: usize>(table: &[[u8; N]; 3], init_type: usize, qp: i32) -> [CabacContext; N] {
    std::array::from_fn(|i| CabacContext::new(table[init_type][i], qp))
}

/// All context models of a slice.
#[derive(Debug, Clone)]
struct ContextSet {
    split_cu_flag: [CabacContext; 3],
    cu_skip_flag: [CabacContext; 3],
    pred_mode: [CabacContext; 1],
    part_mode: [CabacContext; 4],
    prev_intra_luma_pred: [CabacContext; 1],
    intra_chroma_pred_mode: [CabacContext; 1],
    rqt_root_cbf: [CabacContext; 1],
    merge_flag: [CabacContext; 1],
    merge_idx: [CabacContext; 1],
    inter_pred_idc: [CabacContext; 5],
    ref_idx: [CabacContext; 2],
    mvp_flag: [CabacContext; 1],
    split_transform_flag: [CabacContext; 3],
    cbf_luma: [CabacContext; 2],
    cbf_chroma: [CabacContext; 4],
    abs_mvd_greater0: [CabacContext; 1],
    abs_mvd_greater1: [CabacContext; 1],
    last_x_prefix: [CabacContext; 18],
    last_y_prefix: [CabacContext; 18],
    coded_sub_block_flag: [CabacContext; 4],
    sig_coeff_flag: [CabacContext; 42],
    greater1: [CabacContext; 24],
    greater2: [CabacContext; 6],
}

impl ContextSet {
    fn new(init_type: usize, qp: i32) -> Self {
        Self {
            split_cu_flag: init(&SPLIT_CU_FLAG_INIT, init_type, qp),
            cu_skip_flag: init(&CU_SKIP_FLAG_INIT, init_type, qp),
            pred_mode: init(&PRED_MODE_INIT, init_type, qp),
            part_mode: init(&PART_MODE_INIT, init_type, qp),
            prev_intra_luma_pred: init(&PREV_INTRA_LUMA_PRED_INIT, init_type, qp),
            intra_chroma_pred_mode: init(&INTRA_CHROMA_PRED_MODE_INIT, init_type, qp),
            rqt_root_cbf: init(&RQT_ROOT_CBF_INIT, init_type, qp),
            merge_flag: init(&MERGE_FLAG_INIT, init_type, qp),
            merge_idx: init(&MERGE_IDX_INIT, init_type, qp),
            inter_pred_idc: init(&INTER_PRED_IDC_INIT, init_type, qp),
            ref_idx: init(&REF_IDX_INIT, init_type, qp),
            mvp_flag: init(&MVP_FLAG_INIT, init_type, qp),
            split_transform_flag: init(&SPLIT_TRANSFORM_FLAG_INIT, init_type, qp),
            cbf_luma: init(&CBF_LUMA_INIT, init_type, qp),
            cbf_chroma: init(&CBF_CHROMA_INIT, init_type, qp),
            abs_mvd_greater0: init(&ABS_MVD_GREATER0_INIT, init_type, qp),
            abs_mvd_greater1: init(&ABS_MVD_GREATER1_INIT, init_type, qp),
            last_x_prefix: init(&LAST_SIG_COEFF_PREFIX_INIT, init_type, qp),
            last_y_prefix: init(&LAST_SIG_COEFF_PREFIX_INIT, init_type, qp),
            coded_sub_block_flag: init(&CODED_SUB_BLOCK_FLAG_INIT, init_type, qp),
            sig_coeff_flag: init(&SIG_COEFF_FLAG_INIT, init_type, qp),
            greater1: init(&GREATER1_INIT, init_type, qp),
            greater2: init(&GREATER2_INIT, init_type, qp),
        }
    }
}

/// initType of a slice (H.265 Table 9-4).
fn init_type(slice_type: SliceType, cabac_init_flag: bool) -> usize {
    match slice_type {
        SliceType::I => 0,
        SliceType::P => {
            if cabac_init_flag {
                2
            } else {
                1
            }
        }
        SliceType::B => {
            if cabac_init_flag {
                1
            } else {
                2
            }
        }
    }
}

/// Binary arithmetic coder (H.265 9.3.4.3).
#[derive(Debug)]
struct ArithmeticEncoder {
    writer: BitWriter,
    low: u32,
    range: u32,
    bits_to_follow: u32,
    first_bit: bool,
}

impl ArithmeticEncoder {
    fn new(writer: BitWriter) -> Self {
        Self {
            writer,
            low: 0,
            range: 510,
            bits_to_follow: 0,
            first_bit: true,
        }
    }

    fn put_bit_plus_follow(&mut self, bit: bool) -> Result<()> {
        if self.first_bit {
            self.first_bit = false;
        } else {
            self.writer.write_bit(bit)?;
        }
        while self.bits_to_follow > 0 {
            self.writer.write_bit(!bit)?;
            self.bits_to_follow -= 1;
        }
        Ok(())
    }

    fn renormalize(&mut self) -> Result<()> {
        while self.range < 256 {
            if self.low < 256 {
                self.put_bit_plus_follow(false)?;
            } else if self.low >= 512 {
                self.low -= 512;
                self.put_bit_plus_follow(true)?;
            } else {
                self.low -= 256;
                self.bits_to_follow += 1;
            }
            self.range <<= 1;
            self.low <<= 1;
        }
        Ok(())
    }

    fn encode_decision(&mut self, ctx: &mut CabacContext, symbol: bool) -> Result<()> {
        let q_range_idx = ((self.range >> 6) & 3) as usize;
        let lps_range = RANGE_TAB_LPS[ctx.state() as usize][q_range_idx] as u32;

        self.range -= lps_range;
        if symbol != ctx.mps() {
            self.low += self.range;
            self.range = lps_range;
        }
        ctx.update(symbol);
        self.renormalize()
    }

    fn encode_bypass(&mut self, symbol: bool) -> Result<()> {
        self.low <<= 1;
        if symbol {
            self.low += self.range;
        }

        if self.low >= 1024 {
            self.low -= 1024;
            self.put_bit_plus_follow(true)
        } else if self.low < 512 {
            self.put_bit_plus_follow(false)
        } else {
            self.low -= 512;
            self.bits_to_follow += 1;
            Ok(())
        }
    }

    fn encode_bypass_bins(&mut self, value: u32, count: u32) -> Result<()> {
        for i in (0..count).rev() {
            self.encode_bypass((value >> i) & 1 != 0)?;
        }
        Ok(())
    }

    /// Ones-prefixed k-th order Exp-Golomb in bypass bins.
    fn encode_bypass_exp_golomb(&mut self, value: u64, k: u32) -> Result<()> {
        let mut symbol = value;
        let mut order = k;
        while symbol >= (1u64 << order) {
            symbol -= 1u64 << order;
            order += 1;
            self.encode_bypass(true)?;
        }
        self.encode_bypass(false)?;
        for i in (0..order).rev() {
            self.encode_bypass((symbol >> i) & 1 != 0)?;
        }
        Ok(())
    }

    fn encode_terminate(&mut self, symbol: bool) -> Result<()> {
        self.range -= 2;
        if symbol {
            self.low += self.range;
            self.flush()
        } else {
            self.renormalize()
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.range = 2;
        self.renormalize()?;
        self.put_bit_plus_follow((self.low >> 9) & 1 != 0)?;
        self.writer.write_bits(((self.low >> 7) & 3) | 1, 2)?;
        Ok(())
    }
}

/// Adaptive backend writing into a [`BitWriter`].
#[derive(Debug)]
pub struct CabacWriter {
    engine: ArithmeticEncoder,
    contexts: ContextSet,
    terminated: bool,
}

impl CabacWriter {
    /// Create a writer with contexts initialized for `slice_type` at `qp`.
    pub fn new(slice_type: SliceType, qp: i32) -> Self {
        Self::with_writer(BitWriter::new(), slice_type, qp, false)
    }

    /// Write into an existing bit writer.
    pub fn with_writer(writer: BitWriter, slice_type: SliceType, qp: i32, cabac_init_flag: bool) -> Self {
        Self {
            engine: ArithmeticEncoder::new(writer),
            contexts: ContextSet::new(init_type(slice_type, cabac_init_flag), qp),
            terminated: false,
        }
    }

    /// Bits written to the sink so far, not counting pending carry bits.
    pub fn position(&self) -> usize {
        self.engine.writer.position()
    }

    /// Written data.
    pub fn data(&self) -> &[u8] {
        self.engine.writer.data()
    }

    /// Consume and return the written data.
    pub fn into_data(self) -> Vec<u8> {
        self.engine.writer.into_data()
    }

    fn code_last_prefix(&mut self, prefix: u32, log2_size: u32, chroma: bool, vertical: bool) -> Result<()> {
        let (offset, shift) = last_prefix_context(log2_size, chroma);
        let max = (log2_size << 1) - 1;
        let contexts = if vertical {
            &mut self.contexts.last_y_prefix
        } else {
            &mut self.contexts.last_x_prefix
        };
        for i in 0..prefix {
            self.engine
                .encode_decision(&mut contexts[offset + (i >> shift) as usize], true)?;
        }
        if prefix < max {
            self.engine
                .encode_decision(&mut contexts[offset + (prefix >> shift) as usize], false)?;
        }
        Ok(())
    }

    fn code_last_position(&mut self, x: u32, y: u32, log2_w: u32, log2_h: u32, chroma: bool) -> Result<()> {
        let group_x = GROUP_IDX[x as usize];
        let group_y = GROUP_IDX[y as usize];
        self.code_last_prefix(group_x, log2_w, chroma, false)?;
        self.code_last_prefix(group_y, log2_h, chroma, true)?;
        if group_x > 3 {
            self.engine
                .encode_bypass_bins(x - MIN_IN_GROUP[group_x as usize], (group_x >> 1) - 1)?;
        }
        if group_y > 3 {
            self.engine
                .encode_bypass_bins(y - MIN_IN_GROUP[group_y as usize], (group_y >> 1) - 1)?;
        }
        Ok(())
    }

    fn code_level_remaining(&mut self, value: u32, rice: u32) -> Result<()> {
        let value = value as u64;
        if value < (COEF_REMAIN_BIN_REDUCTION as u64) << rice {
            let prefix = (value >> rice) as u32;
            for _ in 0..prefix {
                self.engine.encode_bypass(true)?;
            }
            self.engine.encode_bypass(false)?;
            self.engine
                .encode_bypass_bins((value & ((1 << rice) - 1)) as u32, rice)
        } else {
            let mut length = rice;
            let mut symbol = value - ((COEF_REMAIN_BIN_REDUCTION as u64) << rice);
            while symbol >= 1u64 << length {
                symbol -= 1u64 << length;
                length += 1;
            }
            for _ in 0..(COEF_REMAIN_BIN_REDUCTION + length - rice) {
                self.engine.encode_bypass(true)?;
            }
            self.engine.encode_bypass(false)?;
            for i in (0..length).rev() {
                self.engine.encode_bypass((symbol >> i) & 1 != 0)?;
            }
            Ok(())
        }
    }

    fn code_residual(&mut self, coeffs: &[i32], width: u32, height: u32, component: ComponentType) -> Result<()> {
        check_block(coeffs, width, height)?;
        if !supported_dimension(width) || !supported_dimension(height) {
            return Err(HevcError::InvariantViolation(format!(
                "{}x{} coefficient block cannot be coded",
                width, height
            )));
        }
        let chroma = component.is_chroma();
        let log2_w = width.trailing_zeros();
        let log2_h = height.trailing_zeros();
        let order = scan::subblock_scan(width, height);
        let level = |n: usize| {
            let (x, y) = order[n];
            coeffs[(y * width + x) as usize]
        };

        let Some(last) = (0..order.len()).rev().find(|&n| level(n) != 0) else {
            return Ok(());
        };
        let (last_x, last_y) = order[last];
        self.code_last_position(last_x, last_y, log2_w, log2_h, chroma)?;

        let sb_width = width / 4;
        let sb_order = scan::diagonal_scan(sb_width, height / 4);
        let mut coded = vec![false; sb_order.len()];
        let last_sb = last / 16;
        let mut c1 = 1;

        for i in (0..=last_sb).rev() {
            let (xs, ys) = sb_order[i];
            let right = xs + 1 < sb_width && coded[(ys * sb_width + xs + 1) as usize];
            let below = (ys + 1) * 4 < height && coded[((ys + 1) * sb_width + xs) as usize];
            let base = i * 16;

            let csbf = if i > 0 && i < last_sb {
                let nonzero = (0..16).any(|n| level(base + n) != 0);
                let ctx = (right || below) as usize + if chroma { 2 } else { 0 };
                self.engine
                    .encode_decision(&mut self.contexts.coded_sub_block_flag[ctx], nonzero)?;
                nonzero
            } else {
                true
            };
            coded[(ys * sb_width + xs) as usize] = csbf;
            if !csbf {
                continue;
            }
            let prev_csbf = right as u32 + 2 * below as u32;

            // Significant levels in reverse scan order.
            let mut levels: Vec<i32> = Vec::with_capacity(16);
            let top = if i == last_sb {
                levels.push(level(last));
                last - base
            } else {
                16
            };
            let mut infer_dc = i > 0 && i < last_sb;
            for n in (0..top).rev() {
                let value = level(base + n);
                if n == 0 && infer_dc {
                    levels.push(value);
                    break;
                }
                let (x, y) = order[base + n];
                let ctx = sig_ctx(x, y, log2_w, log2_h, prev_csbf, chroma);
                self.engine
                    .encode_decision(&mut self.contexts.sig_coeff_flag[ctx], value != 0)?;
                if value != 0 {
                    levels.push(value);
                    infer_dc = false;
                }
            }
            if levels.is_empty() {
                continue;
            }

            let mut ctx_set = if i == 0 || chroma { 0 } else { 2 };
            if c1 == 0 {
                ctx_set += 1;
            }
            c1 = 1;
            let mut first_greater1 = None;
            for (k, value) in levels.iter().take(8).enumerate() {
                let greater1 = value.unsigned_abs() > 1;
                let ctx = ctx_set * 4 + c1 + if chroma { 16 } else { 0 };
                self.engine
                    .encode_decision(&mut self.contexts.greater1[ctx], greater1)?;
                if greater1 {
                    c1 = 0;
                    first_greater1.get_or_insert(k);
                } else if c1 > 0 && c1 < 3 {
                    c1 += 1;
                }
            }
            if let Some(k) = first_greater1 {
                let ctx = ctx_set + if chroma { 4 } else { 0 };
                self.engine
                    .encode_decision(&mut self.contexts.greater2[ctx], levels[k].unsigned_abs() > 2)?;
            }

            for value in &levels {
                self.engine.encode_bypass(*value < 0)?;
            }

            let mut rice = 0;
            for (k, value) in levels.iter().enumerate() {
                let abs = value.unsigned_abs();
                let threshold = level_threshold(k, first_greater1);
                if abs >= threshold {
                    self.code_level_remaining(abs - threshold, rice)?;
                    if abs > 3 * (1 << rice) {
                        rice = (rice + 1).min(4);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Smallest level that needs `coeff_abs_level_remaining` at reverse scan index `k`.
fn level_threshold(k: usize, first_greater1: Option<usize>) -> u32 {
    if k >= 8 {
        1
    } else if Some(k) == first_greater1 {
        3
    } else {
        2
    }
}

fn supported_dimension(size: u32) -> bool {
    size.is_power_of_two() && (4..=32).contains(&size)
}

/// Context offset and shift of the last position prefix.
fn last_prefix_context(log2_size: u32, chroma: bool) -> (usize, u32) {
    if chroma {
        (15, log2_size - 2)
    } else {
        ((3 * (log2_size - 2) + ((log2_size - 1) >> 2)) as usize, (log2_size + 1) >> 2)
    }
}

/// `sig_coeff_flag` context index (H.265 9.3.4.2.5, diagonal scan).
fn sig_ctx(x: u32, y: u32, log2_w: u32, log2_h: u32, prev_csbf: u32, chroma: bool) -> usize {
    let sig = if log2_w == 2 && log2_h == 2 {
        CTX_IDX_MAP[((y << 2) + x) as usize]
    } else if x + y == 0 {
        0
    } else {
        let (xp, yp) = (x & 3, y & 3);
        let base = match prev_csbf {
            0 => match xp + yp {
                0 => 2,
                1 | 2 => 1,
                _ => 0,
            },
            1 => match yp {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            2 => match xp {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            _ => 2,
        };
        let eight = log2_w == 3 && log2_h == 3;
        if chroma {
            base + if eight { 9 } else { 12 }
        } else {
            let subblock = if (x >> 2) + (y >> 2) > 0 { 3 } else { 0 };
            base + subblock + if eight { 9 } else { 21 }
        }
    };
    if chroma {
        27 + sig
    } else {
        sig
    }
}

impl EntropyBackend for CabacWriter {
    fn write_fixed_length(&mut self, value: u32, bits: u8) -> Result<()> {
        if bits > 32 || (bits < 32 && (value as u64) >> bits != 0) {
            return Err(hevc_encoder_core::Error::from(BitstreamError::ValueOverflow {
                value: value as u64,
                bits,
            })
            .into());
        }
        self.engine.encode_bypass_bins(value, bits as u32)
    }

    fn write_unsigned_code(&mut self, value: u32) -> Result<()> {
        self.engine.encode_bypass_exp_golomb(value as u64, 0)
    }

    fn write_signed_code(&mut self, value: i32) -> Result<()> {
        let mapped = if value > 0 {
            (value as u64) * 2 - 1
        } else {
            (value.unsigned_abs() as u64) * 2
        };
        self.engine.encode_bypass_exp_golomb(mapped, 0)
    }

    fn write_flag(&mut self, flag: bool) -> Result<()> {
        self.engine.encode_bypass(flag)
    }

    fn write_unary_max(&mut self, value: u32, max: u32) -> Result<()> {
        if value > max {
            return Err(HevcError::InvariantViolation(format!(
                "unary value {} exceeds maximum {}",
                value, max
            )));
        }
        for _ in 0..value {
            self.engine.encode_bypass(true)?;
        }
        if value < max {
            self.engine.encode_bypass(false)?;
        }
        Ok(())
    }

    fn write_exp_golomb(&mut self, value: u32, order: u8) -> Result<()> {
        self.engine.encode_bypass_exp_golomb(value as u64, order as u32)
    }

    fn write_coefficient_block(
        &mut self,
        coeffs: &[i32],
        width: u32,
        height: u32,
        component: ComponentType,
    ) -> Result<()> {
        self.code_residual(coeffs, width, height, component)
    }

    fn code_split_cu_flag(&mut self, split: bool, ctx_inc: usize) -> Result<()> {
        self.engine
            .encode_decision(&mut self.contexts.split_cu_flag[ctx_inc.min(2)], split)
    }

    fn code_skip_flag(&mut self, skip: bool, ctx_inc: usize) -> Result<()> {
        self.engine
            .encode_decision(&mut self.contexts.cu_skip_flag[ctx_inc.min(2)], skip)
    }

    fn code_merge_flag(&mut self, merge: bool) -> Result<()> {
        self.engine
            .encode_decision(&mut self.contexts.merge_flag[0], merge)
    }

    fn code_merge_index(&mut self, index: u32, max_candidates: u32) -> Result<()> {
        let max = max_candidates.saturating_sub(1);
        if index > max {
            return Err(HevcError::InvariantViolation(format!(
                "merge index {} with {} candidates",
                index, max_candidates
            )));
        }
        for i in 0..max {
            let bin = i < index;
            if i == 0 {
                self.engine
                    .encode_decision(&mut self.contexts.merge_idx[0], bin)?;
            } else {
                self.engine.encode_bypass(bin)?;
            }
            if !bin {
                break;
            }
        }
        Ok(())
    }

    fn code_pred_mode(&mut self, intra: bool) -> Result<()> {
        self.engine
            .encode_decision(&mut self.contexts.pred_mode[0], intra)
    }

    fn code_part_size(&mut self, part: PartSize, mode: PartModeContext) -> Result<()> {
        let at_min = mode.log2_size == mode.min_cu_log2_size;
        for (i, bin) in part_mode_bins(part, mode)?.into_iter().enumerate() {
            let ctx = match i {
                0 => Some(0),
                1 => Some(1),
                2 if at_min => Some(2),
                2 => Some(3),
                _ => None,
            };
            match ctx {
                Some(ctx) => self
                    .engine
                    .encode_decision(&mut self.contexts.part_mode[ctx], bin)?,
                None => self.engine.encode_bypass(bin)?,
            }
        }
        Ok(())
    }

    fn code_prev_intra_luma_pred_flag(&mut self, flag: bool) -> Result<()> {
        self.engine
            .encode_decision(&mut self.contexts.prev_intra_luma_pred[0], flag)
    }

    fn code_mpm_idx(&mut self, index: u32) -> Result<()> {
        self.write_unary_max(index, 2)
    }

    fn code_rem_intra_luma_pred_mode(&mut self, mode: u32) -> Result<()> {
        self.write_fixed_length(mode, 5)
    }

    fn code_intra_chroma_pred_mode(&mut self, mode: u32) -> Result<()> {
        if mode == 4 {
            self.engine
                .encode_decision(&mut self.contexts.intra_chroma_pred_mode[0], false)
        } else {
            self.engine
                .encode_decision(&mut self.contexts.intra_chroma_pred_mode[0], true)?;
            self.write_fixed_length(mode, 2)
        }
    }

    fn code_inter_dir(&mut self, dir: InterDir, depth: u32, bi_allowed: bool) -> Result<()> {
        if bi_allowed {
            let ctx = depth.min(3) as usize;
            self.engine
                .encode_decision(&mut self.contexts.inter_pred_idc[ctx], dir == InterDir::Bi)?;
        }
        if dir != InterDir::Bi {
            self.engine
                .encode_decision(&mut self.contexts.inter_pred_idc[4], dir == InterDir::List1)?;
        }
        Ok(())
    }

    fn code_ref_idx(&mut self, index: u32, num_ref: u32) -> Result<()> {
        let max = num_ref.saturating_sub(1);
        if index > max {
            return Err(HevcError::InvariantViolation(format!(
                "reference index {} with {} references",
                index, num_ref
            )));
        }
        for i in 0..max {
            let bin = i < index;
            if i < 2 {
                self.engine
                    .encode_decision(&mut self.contexts.ref_idx[i as usize], bin)?;
            } else {
                self.engine.encode_bypass(bin)?;
            }
            if !bin {
                break;
            }
        }
        Ok(())
    }

    fn code_mvd(&mut self, mvd: MotionVector) -> Result<()> {
        let (abs_x, abs_y) = (mvd.x.unsigned_abs(), mvd.y.unsigned_abs());
        self.engine
            .encode_decision(&mut self.contexts.abs_mvd_greater0[0], abs_x > 0)?;
        self.engine
            .encode_decision(&mut self.contexts.abs_mvd_greater0[0], abs_y > 0)?;
        if abs_x > 0 {
            self.engine
                .encode_decision(&mut self.contexts.abs_mvd_greater1[0], abs_x > 1)?;
        }
        if abs_y > 0 {
            self.engine
                .encode_decision(&mut self.contexts.abs_mvd_greater1[0], abs_y > 1)?;
        }
        for (abs, negative) in [(abs_x, mvd.x < 0), (abs_y, mvd.y < 0)] {
            if abs > 0 {
                if abs > 1 {
                    self.engine.encode_bypass_exp_golomb((abs - 2) as u64, 1)?;
                }
                self.engine.encode_bypass(negative)?;
            }
        }
        Ok(())
    }

    fn code_mvp_idx(&mut self, index: u32) -> Result<()> {
        self.engine
            .encode_decision(&mut self.contexts.mvp_flag[0], index != 0)
    }

    fn code_rqt_root_cbf(&mut self, cbf: bool) -> Result<()> {
        self.engine
            .encode_decision(&mut self.contexts.rqt_root_cbf[0], cbf)
    }

    fn code_split_transform_flag(&mut self, split: bool, log2_size: u32) -> Result<()> {
        let ctx = 5u32.saturating_sub(log2_size).min(2) as usize;
        self.engine
            .encode_decision(&mut self.contexts.split_transform_flag[ctx], split)
    }

    fn code_cbf(&mut self, cbf: bool, component: ComponentType, tr_depth: u32) -> Result<()> {
        let ctx = match component {
            ComponentType::Luma => &mut self.contexts.cbf_luma[if tr_depth == 0 { 1 } else { 0 }],
            _ => &mut self.contexts.cbf_chroma[tr_depth.min(3) as usize],
        };
        self.engine.encode_decision(ctx, cbf)
    }

    fn code_end_of_slice_segment_flag(&mut self, end: bool) -> Result<()> {
        self.engine.encode_terminate(end)?;
        if end {
            self.terminated = true;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.terminated {
            self.code_end_of_slice_segment_flag(true)?;
        }
        self.engine.writer.align_to_byte()?;
        Ok(())
    }
}
