//! Sequence and slice header RPS syntax.
//!
//! Everything here is field-by-field delegation to an [`EntropyBackend`]:
//! the SPS carries every set of the [`Schedule`], and each slice header
//! either points into that table or carries its own set.

use tracing::debug;

use crate::config::EncoderConfig;
use crate::entropy::EntropyBackend;
use crate::error::{HevcError, Result};
use crate::gop::SliceType;
use crate::rps::{InterRpsPrediction, ReferencePictureSet, MAX_DELTA_POC};
use crate::schedule::Schedule;

/// Largest number of sets an SPS can carry.
pub const MAX_SHORT_TERM_REF_PIC_SETS: usize = 64;

/// Number of bits of `short_term_ref_pic_set_idx` for `num_sets` sets.
pub fn rps_index_bits(num_sets: usize) -> u8 {
    if num_sets <= 1 {
        0
    } else {
        (usize::BITS - (num_sets - 1).leading_zeros()) as u8
    }
}

/// Write `st_ref_pic_set(idx)`.
///
/// `sets` is the SPS table; `idx == num_sets` denotes a set carried in a
/// slice header. A prediction that the position cannot signal falls back
/// to explicit coding.
pub fn write_st_ref_pic_set<B: EntropyBackend + ?Sized>(
    backend: &mut B,
    rps: &ReferencePictureSet,
    idx: usize,
    num_sets: usize,
    sets: &[ReferencePictureSet],
) -> Result<()> {
    if idx > num_sets || num_sets > sets.len() {
        return Err(HevcError::InvalidRps(format!(
            "set index {} outside a table of {} (holding {})",
            idx,
            num_sets,
            sets.len()
        )));
    }

    let prediction = match &rps.inter {
        Some(inter) if idx > 0 => signalled_prediction(inter, idx, num_sets, sets)?,
        _ => None,
    };

    if idx > 0 {
        backend.write_flag(prediction.is_some())?;
    }

    match prediction {
        Some(inter) => {
            if idx == num_sets {
                backend.write_unsigned_code(inter.delta_ridx_minus1 as u32)?;
            }
            if inter.delta_rps.unsigned_abs() > MAX_DELTA_POC as u32 {
                return Err(HevcError::InvalidRps(format!(
                    "deltaRPS {} of set {} is out of range",
                    inter.delta_rps, idx
                )));
            }
            backend.write_flag(inter.delta_rps < 0)?;
            backend.write_unsigned_code(inter.delta_rps.unsigned_abs() - 1)?;
            for idc in &inter.ref_idc {
                backend.write_flag(idc.used_by_current())?;
                if !idc.used_by_current() {
                    backend.write_flag(idc.kept())?;
                }
            }
        }
        None => {
            backend.write_unsigned_code(rps.num_negative() as u32)?;
            backend.write_unsigned_code(rps.num_positive() as u32)?;
            let mut previous = 0;
            for (delta, used) in rps.negative() {
                backend.write_unsigned_code(delta_poc_minus1(previous, delta, rps)?)?;
                backend.write_flag(used)?;
                previous = delta;
            }
            previous = 0;
            for (delta, used) in rps.positive() {
                backend.write_unsigned_code(delta_poc_minus1(delta, previous, rps)?)?;
                backend.write_flag(used)?;
                previous = delta;
            }
        }
    }
    Ok(())
}

/// `delta_poc_s0_minus1`/`delta_poc_s1_minus1` for the step from `lower` to `upper`.
fn delta_poc_minus1(upper: i32, lower: i32, rps: &ReferencePictureSet) -> Result<u32> {
    upper
        .checked_sub(lower)
        .and_then(|step| step.checked_sub(1))
        .and_then(|code| u32::try_from(code).ok())
        .filter(|&code| code < MAX_DELTA_POC as u32)
        .ok_or_else(|| {
            HevcError::InvalidRps(format!(
                "set for POC {} has deltas {:?} that are not strictly ordered within range",
                rps.poc, rps.deltas
            ))
        })
}

/// Validate a prediction for table position `idx`, or decide to code explicitly.
fn signalled_prediction<'a>(
    inter: &'a InterRpsPrediction,
    idx: usize,
    num_sets: usize,
    sets: &[ReferencePictureSet],
) -> Result<Option<&'a InterRpsPrediction>> {
    if idx < num_sets && inter.delta_ridx_minus1 != 0 {
        debug!(
            idx,
            delta_ridx_minus1 = inter.delta_ridx_minus1,
            "prediction distance not signallable in the SPS, coding set explicitly"
        );
        return Ok(None);
    }
    let predictor = idx
        .checked_sub(inter.delta_ridx_minus1 + 1)
        .and_then(|i| sets.get(i))
        .ok_or_else(|| {
            HevcError::InvalidRps(format!(
                "set {} predicts from before the start of the table",
                idx
            ))
        })?;
    if inter.delta_rps == 0 {
        return Err(HevcError::InvalidRps("deltaRPS must not be 0".into()));
    }
    if inter.ref_idc.len() != predictor.num_pictures() + 1 {
        return Err(HevcError::InvalidRps(format!(
            "set {} carries {} refIdc values for a predictor of {} pictures",
            idx,
            inter.ref_idc.len(),
            predictor.num_pictures()
        )));
    }
    Ok(Some(inter))
}

/// Writes the RPS-related parts of the SPS and slice headers.
#[derive(Debug, Clone, Copy)]
pub struct HeaderWriter<'a> {
    config: &'a EncoderConfig,
    schedule: &'a Schedule,
}

impl<'a> HeaderWriter<'a> {
    /// Create a writer over a validated configuration and its schedule.
    pub fn new(config: &'a EncoderConfig, schedule: &'a Schedule) -> Self {
        Self { config, schedule }
    }

    /// `sps_max_dec_pic_buffering_minus1`.
    pub fn max_dec_pic_buffering_minus1(&self) -> u32 {
        self.schedule
            .max_reference_pictures()
            .max(self.schedule.max_reorder_pictures()) as u32
    }

    /// Write the SPS fields from `log2_max_pic_order_cnt_lsb_minus4` through
    /// `long_term_ref_pics_present_flag`.
    pub fn write_sps_reference_structure<B: EntropyBackend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<()> {
        let config = self.config;
        let sets = self.schedule.sets();
        if sets.len() > MAX_SHORT_TERM_REF_PIC_SETS {
            return Err(HevcError::InvalidRps(format!(
                "{} reference picture sets exceed the SPS limit of {}",
                sets.len(),
                MAX_SHORT_TERM_REF_PIC_SETS
            )));
        }

        backend.write_unsigned_code(config.log2_max_poc_lsb - 4)?;
        backend.write_flag(false)?; // sps_sub_layer_ordering_info_present_flag
        backend.write_unsigned_code(self.max_dec_pic_buffering_minus1())?;
        backend.write_unsigned_code(self.schedule.max_reorder_pictures() as u32)?;
        backend.write_unsigned_code(0)?; // sps_max_latency_increase_plus1

        let min_cu = config.min_cu_log2_size();
        backend.write_unsigned_code(min_cu - 3)?;
        backend.write_unsigned_code(config.max_cu_log2_size() - min_cu)?;
        backend.write_unsigned_code(config.tu_log2_min_size - 2)?;
        backend.write_unsigned_code(config.tu_log2_max_size - config.tu_log2_min_size)?;
        backend.write_unsigned_code(config.tu_max_depth_inter - 1)?;
        backend.write_unsigned_code(config.tu_max_depth_intra - 1)?;
        backend.write_flag(config.amp_enabled)?;

        backend.write_unsigned_code(sets.len() as u32)?;
        for (idx, rps) in sets.iter().enumerate() {
            write_st_ref_pic_set(backend, rps, idx, sets.len(), sets)?;
        }
        backend.write_flag(false)?; // long_term_ref_pics_present_flag

        debug!(
            num_sets = sets.len(),
            max_dec_pic_buffering_minus1 = self.max_dec_pic_buffering_minus1(),
            num_reorder = self.schedule.max_reorder_pictures(),
            "wrote SPS reference structure"
        );
        Ok(())
    }

    fn write_poc_lsb<B: EntropyBackend + ?Sized>(&self, backend: &mut B, poc: i32) -> Result<()> {
        let bits = self.config.log2_max_poc_lsb;
        let lsb = (poc as u32) & ((1 << bits) - 1);
        backend.write_fixed_length(lsb, bits as u8)
    }

    /// Write the slice RPS segment for a coding position, pointing into the SPS.
    pub fn write_slice_rps<B: EntropyBackend + ?Sized>(
        &self,
        backend: &mut B,
        position: usize,
    ) -> Result<()> {
        let picture = self.schedule.schedule_for(position).ok_or_else(|| {
            HevcError::InvalidRps(format!("no reference picture set for position {}", position))
        })?;
        self.write_poc_lsb(backend, picture.poc)?;
        backend.write_flag(true)?; // short_term_ref_pic_set_sps_flag

        let num_sets = self.schedule.sets().len();
        let bits = rps_index_bits(num_sets);
        if bits > 0 {
            backend.write_fixed_length(picture.rps_index as u32, bits)?;
        }
        Ok(())
    }

    /// Write a slice RPS segment carrying `rps` in the slice header itself.
    pub fn write_slice_rps_explicit<B: EntropyBackend + ?Sized>(
        &self,
        backend: &mut B,
        poc: i32,
        rps: &ReferencePictureSet,
    ) -> Result<()> {
        self.write_poc_lsb(backend, poc)?;
        backend.write_flag(false)?; // short_term_ref_pic_set_sps_flag
        let sets = self.schedule.sets();
        write_st_ref_pic_set(backend, rps, sets.len(), sets.len(), sets)
    }

    /// Write the slice header fields this encoder controls.
    ///
    /// Position 0 is the leading IDR picture, which carries no RPS.
    pub fn write_slice_header<B: EntropyBackend + ?Sized>(
        &self,
        backend: &mut B,
        position: usize,
    ) -> Result<()> {
        backend.write_flag(true)?; // first_slice_segment_in_pic_flag
        backend.write_unsigned_code(0)?; // slice_pic_parameter_set_id

        let qp_offset = if position == 0 {
            backend.write_unsigned_code(SliceType::I.raw())?;
            0
        } else {
            let picture = self.schedule.schedule_for(position).ok_or_else(|| {
                HevcError::InvalidRps(format!(
                    "no reference picture set for position {}",
                    position
                ))
            })?;
            backend.write_unsigned_code(picture.entry.slice_type.raw())?;
            self.write_slice_rps(backend, position)?;
            picture.entry.qp_offset
        };

        let slice_qp = self.config.slice_qp(qp_offset)?;
        backend.write_signed_code(slice_qp - self.config.qp)
    }
}
