//! Encoder configuration.
//!
//! [`EncoderConfig`] is built once, validated once and then only borrowed.
//! The scheduler reads the GOP pattern from it and the quadtree pipeline
//! reads the block-size limits.

use serde::{Deserialize, Serialize};

use crate::error::{HevcError, Result};
use crate::gop::{GopEntry, SliceType};

/// Lowest slice QP for 8-bit video (`-QpBdOffsetY` is 0).
pub const MIN_QP: i32 = 0;

/// Highest slice QP.
pub const MAX_QP: i32 = 51;

/// Entropy coding variant, chosen per sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntropyMode {
    /// Static-table variable length coding.
    Cavlc,
    /// Context-adaptive binary arithmetic coding.
    #[default]
    Cabac,
}

/// Encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// GOP pattern in coding order.
    pub gop: Vec<GopEntry>,
    /// Number of pictures to encode, including the leading intra picture.
    pub frames_to_encode: usize,
    /// Largest CU width/height in luma samples.
    pub max_cu_size: u32,
    /// Partition depth, counting the NxN level.
    pub max_cu_depth: u32,
    /// log2 of the smallest transform.
    pub tu_log2_min_size: u32,
    /// log2 of the largest transform.
    pub tu_log2_max_size: u32,
    /// Transform hierarchy depth for inter CUs.
    pub tu_max_depth_inter: u32,
    /// Transform hierarchy depth for intra CUs.
    pub tu_max_depth_intra: u32,
    /// Asymmetric motion partitions.
    pub amp_enabled: bool,
    /// Merge mode.
    pub merge_enabled: bool,
    /// Number of merge candidates.
    pub max_num_merge_cand: u32,
    /// log2 of the POC LSB wrap.
    pub log2_max_poc_lsb: u32,
    /// Sequence QP.
    pub qp: i32,
    /// Entropy coder.
    pub entropy: EntropyMode,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            gop: vec![GopEntry::new(SliceType::P, 1).with_references(&[-1])],
            frames_to_encode: 2,
            max_cu_size: 64,
            max_cu_depth: 4,
            tu_log2_min_size: 2,
            tu_log2_max_size: 5,
            tu_max_depth_inter: 3,
            tu_max_depth_intra: 3,
            amp_enabled: false,
            merge_enabled: true,
            max_num_merge_cand: 5,
            log2_max_poc_lsb: 8,
            qp: 32,
            entropy: EntropyMode::Cabac,
        }
    }
}

impl EncoderConfig {
    /// Create a configuration with the given GOP pattern.
    pub fn new(gop: Vec<GopEntry>) -> Self {
        Self {
            gop,
            ..Self::default()
        }
    }

    /// Set the number of pictures.
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames_to_encode = frames;
        self
    }

    /// Set the CU size and partition depth.
    pub fn with_cu(mut self, max_cu_size: u32, max_cu_depth: u32) -> Self {
        self.max_cu_size = max_cu_size;
        self.max_cu_depth = max_cu_depth;
        self
    }

    /// Set the transform size range (log2).
    pub fn with_tu_sizes(mut self, log2_min: u32, log2_max: u32) -> Self {
        self.tu_log2_min_size = log2_min;
        self.tu_log2_max_size = log2_max;
        self
    }

    /// Set the transform hierarchy depths.
    pub fn with_tu_depths(mut self, inter: u32, intra: u32) -> Self {
        self.tu_max_depth_inter = inter;
        self.tu_max_depth_intra = intra;
        self
    }

    /// Enable or disable AMP.
    pub fn with_amp(mut self, enabled: bool) -> Self {
        self.amp_enabled = enabled;
        self
    }

    /// Select the entropy coder.
    pub fn with_entropy(mut self, entropy: EntropyMode) -> Self {
        self.entropy = entropy;
        self
    }

    /// Check every parameter range.
    pub fn validate(&self) -> Result<()> {
        fn confirm(failed: bool, message: &str) -> Result<()> {
            if failed {
                Err(HevcError::Config(message.to_string()))
            } else {
                Ok(())
            }
        }

        confirm(
            self.frames_to_encode == 0,
            "Total number of frames to be encoded must be at least 1",
        )?;
        confirm(
            !self.max_cu_size.is_power_of_two(),
            "Maximum CU size should be 2^n",
        )?;
        confirm(
            self.max_cu_size < 16 || self.max_cu_size > 64,
            "Maximum CU size should be between 16 and 64",
        )?;
        confirm(
            self.max_cu_depth == 0 || (self.max_cu_size >> self.max_cu_depth) < 4,
            "Minimum partition size should be larger than or equal to 4",
        )?;
        confirm(
            self.tu_log2_min_size < 2 || self.tu_log2_min_size > 5,
            "QuadtreeTULog2MinSize must be between 2 and 5",
        )?;
        confirm(
            self.tu_log2_max_size < 2 || self.tu_log2_max_size > 5,
            "QuadtreeTULog2MaxSize must be between 2 and 5",
        )?;
        confirm(
            self.tu_log2_max_size < self.tu_log2_min_size,
            "QuadtreeTULog2MaxSize must be greater than or equal to QuadtreeTULog2MinSize",
        )?;
        confirm(
            (1 << self.tu_log2_min_size) > (self.max_cu_size >> self.max_cu_depth),
            "Minimum CU size must be greater than minimum transform size",
        )?;
        let depth_range = self.tu_log2_max_size - self.tu_log2_min_size + 1;
        confirm(
            self.tu_max_depth_inter < 1 || self.tu_max_depth_inter > depth_range,
            "QuadtreeTUMaxDepthInter must be between 1 and QuadtreeTULog2MaxSize - QuadtreeTULog2MinSize + 1",
        )?;
        confirm(
            self.tu_max_depth_intra < 1 || self.tu_max_depth_intra > depth_range,
            "QuadtreeTUMaxDepthIntra must be between 1 and QuadtreeTULog2MaxSize - QuadtreeTULog2MinSize + 1",
        )?;
        confirm(
            self.merge_enabled && !(1..=5).contains(&self.max_num_merge_cand),
            "Number of merge candidates must be between 1 and 5",
        )?;
        confirm(
            !(4..=16).contains(&self.log2_max_poc_lsb),
            "log2 of the maximum POC LSB must be between 4 and 16",
        )?;
        confirm(
            !(MIN_QP..=MAX_QP).contains(&self.qp),
            "QP must be between 0 and 51",
        )?;
        confirm(self.gop.is_empty(), "GOP pattern must not be empty")?;
        for entry in &self.gop {
            self.slice_qp(entry.qp_offset)?;
        }
        Ok(())
    }

    /// QP of a slice whose GOP entry carries `qp_offset`.
    pub fn slice_qp(&self, qp_offset: i32) -> Result<i32> {
        self.qp
            .checked_add(qp_offset)
            .filter(|qp| (MIN_QP..=MAX_QP).contains(qp))
            .ok_or_else(|| {
                HevcError::Config(format!(
                    "QP offset {} moves the slice QP of base QP {} outside {}..={}",
                    qp_offset, self.qp, MIN_QP, MAX_QP
                ))
            })
    }

    /// log2 of the largest CU.
    pub fn max_cu_log2_size(&self) -> u32 {
        self.max_cu_size.trailing_zeros()
    }

    /// log2 of the smallest CU.
    pub fn min_cu_log2_size(&self) -> u32 {
        self.max_cu_log2_size() + 1 - self.max_cu_depth
    }

    /// Extra depth levels below the smallest partition that only transforms reach.
    pub fn add_cu_depth(&self) -> u32 {
        let mut add = 0;
        while (self.max_cu_size >> self.max_cu_depth) > (1 << (self.tu_log2_min_size + add)) {
            add += 1;
        }
        add
    }

    /// Depth of the finest addressable block grid.
    pub fn total_cu_depth(&self) -> u32 {
        self.max_cu_depth + self.add_cu_depth()
    }

    /// Number of positions the scheduler walks after the leading intra picture.
    pub fn sequence_length(&self) -> usize {
        self.frames_to_encode.saturating_sub(1)
    }
}
