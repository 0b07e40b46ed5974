//! Entropy coding backends.
//!
//! [`EntropyBackend`] is the only way syntax reaches the bitstream. The
//! primitive writers are required; the syntax-element methods have default
//! binarizations built on the primitives, which is exactly what the
//! static-table backend uses. The adaptive backend overrides them with
//! context-coded bins.

pub mod cabac;
pub mod cavlc;
pub mod scan;

pub use cabac::CabacWriter;
pub use cavlc::CavlcWriter;

use crate::error::{HevcError, Result};
use crate::tree::{ComponentType, InterDir, MotionVector, PartSize};

/// Sink for header and coding-tree syntax.
pub trait EntropyBackend {
    /// Write `value` in `bits` bits, MSB first.
    fn write_fixed_length(&mut self, value: u32, bits: u8) -> Result<()>;

    /// Write an unsigned Exp-Golomb code.
    fn write_unsigned_code(&mut self, value: u32) -> Result<()>;

    /// Write a signed Exp-Golomb code.
    fn write_signed_code(&mut self, value: i32) -> Result<()>;

    /// Write a single flag.
    fn write_flag(&mut self, flag: bool) -> Result<()>;

    /// Write `value` as ones terminated by a zero, omitting the zero at `max`.
    fn write_unary_max(&mut self, value: u32, max: u32) -> Result<()>;

    /// Write a k-th order Exp-Golomb code.
    fn write_exp_golomb(&mut self, value: u32, order: u8) -> Result<()>;

    /// Write one block of transform coefficients in raster order.
    fn write_coefficient_block(
        &mut self,
        coeffs: &[i32],
        width: u32,
        height: u32,
        component: ComponentType,
    ) -> Result<()>;

    /// `split_cu_flag`; `ctx_inc` counts neighbours coded deeper.
    fn code_split_cu_flag(&mut self, split: bool, ctx_inc: usize) -> Result<()> {
        let _ = ctx_inc;
        self.write_flag(split)
    }

    /// `cu_skip_flag`; `ctx_inc` counts skipped neighbours.
    fn code_skip_flag(&mut self, skip: bool, ctx_inc: usize) -> Result<()> {
        let _ = ctx_inc;
        self.write_flag(skip)
    }

    /// `merge_flag`.
    fn code_merge_flag(&mut self, merge: bool) -> Result<()> {
        self.write_flag(merge)
    }

    /// `merge_idx` with `max_candidates` candidates.
    fn code_merge_index(&mut self, index: u32, max_candidates: u32) -> Result<()> {
        self.write_unary_max(index, max_candidates.saturating_sub(1))
    }

    /// `pred_mode_flag`.
    fn code_pred_mode(&mut self, intra: bool) -> Result<()> {
        self.write_flag(intra)
    }

    /// `part_mode`.
    fn code_part_size(&mut self, part: PartSize, mode: PartModeContext) -> Result<()> {
        for bin in part_mode_bins(part, mode)? {
            self.write_flag(bin)?;
        }
        Ok(())
    }

    /// `prev_intra_luma_pred_flag`.
    fn code_prev_intra_luma_pred_flag(&mut self, flag: bool) -> Result<()> {
        self.write_flag(flag)
    }

    /// `mpm_idx`.
    fn code_mpm_idx(&mut self, index: u32) -> Result<()> {
        self.write_unary_max(index, 2)
    }

    /// `rem_intra_luma_pred_mode`.
    fn code_rem_intra_luma_pred_mode(&mut self, mode: u32) -> Result<()> {
        self.write_fixed_length(mode, 5)
    }

    /// `intra_chroma_pred_mode` (4 = derived).
    fn code_intra_chroma_pred_mode(&mut self, mode: u32) -> Result<()> {
        if mode == 4 {
            self.write_flag(false)
        } else {
            self.write_flag(true)?;
            self.write_fixed_length(mode, 2)
        }
    }

    /// `inter_pred_idc`; `bi_allowed` is false for 8x4 and 4x8 units.
    fn code_inter_dir(&mut self, dir: InterDir, depth: u32, bi_allowed: bool) -> Result<()> {
        let _ = depth;
        if bi_allowed {
            self.write_flag(dir == InterDir::Bi)?;
        }
        if dir != InterDir::Bi {
            self.write_flag(dir == InterDir::List1)?;
        }
        Ok(())
    }

    /// `ref_idx_lX` with `num_ref` active references.
    fn code_ref_idx(&mut self, index: u32, num_ref: u32) -> Result<()> {
        self.write_unary_max(index, num_ref.saturating_sub(1))
    }

    /// `mvd_coding`.
    fn code_mvd(&mut self, mvd: MotionVector) -> Result<()> {
        self.write_signed_code(mvd.x)?;
        self.write_signed_code(mvd.y)
    }

    /// `mvp_lX_flag`.
    fn code_mvp_idx(&mut self, index: u32) -> Result<()> {
        self.write_flag(index != 0)
    }

    /// `rqt_root_cbf`.
    fn code_rqt_root_cbf(&mut self, cbf: bool) -> Result<()> {
        self.write_flag(cbf)
    }

    /// `split_transform_flag` at a node of `log2_size`.
    fn code_split_transform_flag(&mut self, split: bool, log2_size: u32) -> Result<()> {
        let _ = log2_size;
        self.write_flag(split)
    }

    /// `cbf_luma`, `cbf_cb` or `cbf_cr` at transform depth `tr_depth`.
    fn code_cbf(&mut self, cbf: bool, component: ComponentType, tr_depth: u32) -> Result<()> {
        let _ = (component, tr_depth);
        self.write_flag(cbf)
    }

    /// `end_of_slice_segment_flag` between coding tree units.
    fn code_end_of_slice_segment_flag(&mut self, end: bool) -> Result<()> {
        self.write_flag(end)
    }

    /// Terminate the payload and pad it to a byte boundary.
    fn finish(&mut self) -> Result<()>;
}

/// Inputs that select the `part_mode` binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartModeContext {
    /// CU is intra coded.
    pub intra: bool,
    /// log2 of the CU size.
    pub log2_size: u32,
    /// log2 of the smallest CU.
    pub min_cu_log2_size: u32,
    /// Asymmetric partitions enabled.
    pub amp_enabled: bool,
}

/// Bin string of `part_mode`.
pub(crate) fn part_mode_bins(part: PartSize, mode: PartModeContext) -> Result<Vec<bool>> {
    let at_min = mode.log2_size == mode.min_cu_log2_size;
    let bins: &[bool] = if mode.intra {
        match part {
            PartSize::Size2Nx2N => &[true],
            PartSize::SizeNxN if at_min => &[false],
            _ => return Err(unsupported_part(part, mode)),
        }
    } else if at_min {
        match part {
            PartSize::Size2Nx2N => &[true],
            PartSize::Size2NxN => &[false, true],
            PartSize::SizeNx2N if mode.log2_size == 3 => &[false, false],
            PartSize::SizeNx2N => &[false, false, true],
            PartSize::SizeNxN if mode.log2_size > 3 => &[false, false, false],
            _ => return Err(unsupported_part(part, mode)),
        }
    } else if mode.amp_enabled {
        match part {
            PartSize::Size2Nx2N => &[true],
            PartSize::Size2NxN => &[false, true, true],
            PartSize::Size2NxnU => &[false, true, false, false],
            PartSize::Size2NxnD => &[false, true, false, true],
            PartSize::SizeNx2N => &[false, false, true],
            PartSize::SizenLx2N => &[false, false, false, false],
            PartSize::SizenRx2N => &[false, false, false, true],
            PartSize::SizeNxN => return Err(unsupported_part(part, mode)),
        }
    } else {
        match part {
            PartSize::Size2Nx2N => &[true],
            PartSize::Size2NxN => &[false, true],
            PartSize::SizeNx2N => &[false, false],
            _ => return Err(unsupported_part(part, mode)),
        }
    };
    Ok(bins.to_vec())
}

fn unsupported_part(part: PartSize, mode: PartModeContext) -> HevcError {
    HevcError::InvariantViolation(format!(
        "{:?} is not codable for {} CU of log2 size {} (min {}, amp {})",
        part,
        if mode.intra { "an intra" } else { "an inter" },
        mode.log2_size,
        mode.min_cu_log2_size,
        mode.amp_enabled
    ))
}

/// Check a coefficient block before coding it.
pub(crate) fn check_block(coeffs: &[i32], width: u32, height: u32) -> Result<()> {
    if coeffs.len() != (width * height) as usize {
        return Err(HevcError::InvariantViolation(format!(
            "coefficient block of {}x{} holds {} values",
            width,
            height,
            coeffs.len()
        )));
    }
    if coeffs.iter().all(|&c| c == 0) {
        return Err(HevcError::InvariantViolation(format!(
            "coded {}x{} block has no nonzero coefficient",
            width, height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inter(log2_size: u32, amp_enabled: bool) -> PartModeContext {
        PartModeContext {
            intra: false,
            log2_size,
            min_cu_log2_size: 3,
            amp_enabled,
        }
    }

    #[test]
    fn test_part_mode_bins() {
        assert_eq!(
            part_mode_bins(PartSize::Size2NxnD, inter(5, true)).unwrap(),
            vec![false, true, false, true]
        );
        assert_eq!(
            part_mode_bins(PartSize::SizeNx2N, inter(5, false)).unwrap(),
            vec![false, false]
        );
        assert_eq!(
            part_mode_bins(PartSize::SizeNx2N, inter(3, false)).unwrap(),
            vec![false, false]
        );
    }

    #[test]
    fn test_part_mode_rejects_uncodable() {
        // AMP disabled.
        assert!(part_mode_bins(PartSize::SizenLx2N, inter(5, false)).is_err());
        // Inter NxN at 8x8.
        assert!(part_mode_bins(PartSize::SizeNxN, inter(3, false)).is_err());
        // Intra NxN above the minimum CU size.
        let intra = PartModeContext {
            intra: true,
            log2_size: 4,
            min_cu_log2_size: 3,
            amp_enabled: false,
        };
        assert!(part_mode_bins(PartSize::SizeNxN, intra).is_err());
    }

    #[test]
    fn test_check_block() {
        assert!(check_block(&[0, 0, 0, 1], 2, 2).is_ok());
        assert!(check_block(&[0; 4], 2, 2).is_err());
        assert!(check_block(&[1; 3], 2, 2).is_err());
    }
}
