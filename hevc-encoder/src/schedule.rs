//! Reference picture set scheduling.
//!
//! [`derive_schedule`] walks a repeating GOP pattern in coding order starting
//! right after the leading intra picture (POC 0). Whenever a pattern entry
//! refers to a picture before the start of the sequence, a replacement set is
//! synthesized from what has actually been coded so far. The walk also
//! measures how deep output reordering goes and how many references any
//! picture needs at once.

use std::collections::BTreeSet;

use crate::config::EncoderConfig;
use crate::error::{HevcError, Result};
use crate::gop::{GopEntry, SliceType};
use crate::rps::{InterRpsPrediction, ReferencePictureSet, MAX_DELTA_POC};

/// One coded position of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPosition {
    /// Absolute POC.
    pub poc: i32,
    /// Index of the pattern entry.
    pub entry_index: usize,
    /// Index of the effective set in [`Schedule::sets`].
    pub rps_index: usize,
}

/// Reference information for one picture.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledPicture<'a> {
    /// Absolute POC.
    pub poc: i32,
    /// Pattern entry the picture is coded with.
    pub entry: &'a GopEntry,
    /// Index of the effective set in [`Schedule::sets`].
    pub rps_index: usize,
    /// Effective reference set.
    pub rps: &'a ReferencePictureSet,
}

/// Immutable result of [`derive_schedule`].
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pattern: Vec<GopEntry>,
    sets: Vec<ReferencePictureSet>,
    walked: Vec<ScheduledPosition>,
    steady_state: bool,
    max_reorder_pictures: usize,
    max_reference_pictures: usize,
}

impl Schedule {
    /// Derive the schedule for a validated configuration.
    pub fn from_config(config: &EncoderConfig) -> Result<Self> {
        derive_schedule(&config.gop, config.sequence_length())
    }

    /// All sets: one per pattern entry, then the synthesized ones.
    pub fn sets(&self) -> &[ReferencePictureSet] {
        &self.sets
    }

    /// Number of pattern entries.
    pub fn pattern_len(&self) -> usize {
        self.pattern.len()
    }

    /// Sets synthesized for the sequence start.
    pub fn extra_sets(&self) -> &[ReferencePictureSet] {
        &self.sets[self.pattern.len()..]
    }

    /// Positions visited by the walk.
    pub fn walked(&self) -> &[ScheduledPosition] {
        &self.walked
    }

    /// Whether the pattern repeats unchanged after the walked prefix.
    pub fn reached_steady_state(&self) -> bool {
        self.steady_state
    }

    /// Largest number of pictures decoded ahead of their output.
    pub fn max_reorder_pictures(&self) -> usize {
        self.max_reorder_pictures
    }

    /// Largest number of references any picture keeps.
    pub fn max_reference_pictures(&self) -> usize {
        self.max_reference_pictures
    }

    /// Reference information for a 1-based coding position.
    ///
    /// Position 0 is the leading intra picture and has no set.
    pub fn schedule_for(&self, position: usize) -> Option<ScheduledPicture<'_>> {
        if position == 0 {
            return None;
        }
        if let Some(walked) = self.walked.get(position - 1) {
            return Some(ScheduledPicture {
                poc: walked.poc,
                entry: &self.pattern[walked.entry_index],
                rps_index: walked.rps_index,
                rps: &self.sets[walked.rps_index],
            });
        }
        if !self.steady_state {
            return None;
        }
        let len = self.pattern.len();
        let index = (position - 1) % len;
        Some(ScheduledPicture {
            poc: pattern_poc(position, len, self.pattern[index].poc_offset),
            entry: &self.pattern[index],
            rps_index: index,
            rps: &self.sets[index],
        })
    }
}

fn pattern_poc(position: usize, len: usize, poc_offset: i32) -> i32 {
    (((position - 1) / len) * len) as i32 + poc_offset
}

fn absolute_poc(cur_poc: i32, delta: i32) -> Result<i32> {
    cur_poc.checked_add(delta).ok_or_else(|| {
        invalid(format!(
            "reference delta {} from POC {} leaves the POC range",
            delta, cur_poc
        ))
    })
}

fn invalid(message: String) -> HevcError {
    tracing::error!(%message, "GOP structure rejected");
    HevcError::InvalidGopStructure(message)
}

fn validate_pattern(pattern: &[GopEntry]) -> Result<Vec<ReferencePictureSet>> {
    if pattern.is_empty() {
        return Err(invalid("GOP pattern is empty".into()));
    }
    let len = pattern.len() as i32;

    let mut seen = BTreeSet::new();
    for (i, entry) in pattern.iter().enumerate() {
        if entry.poc_offset < 0 {
            return Err(invalid(format!(
                "found fewer Reference Picture Sets than GOP size (entry {})",
                i + 1
            )));
        }
        if let Some(delta) = entry
            .reference_offsets
            .iter()
            .find(|d| **d == 0 || d.unsigned_abs() > MAX_DELTA_POC as u32)
        {
            return Err(invalid(format!(
                "GOP entry {} has reference delta {} outside 1..={} in magnitude",
                i + 1,
                delta,
                MAX_DELTA_POC
            )));
        }
        if !matches!(entry.slice_type, SliceType::P | SliceType::B) {
            return Err(invalid(format!(
                "slice type of GOP entry {} must be B or P",
                i + 1
            )));
        }
        if entry.poc_offset < 1 || entry.poc_offset > len || !seen.insert(entry.poc_offset) {
            return Err(invalid(format!(
                "GOP entry {} has POC {} outside of 1..={} or repeated",
                i + 1,
                entry.poc_offset,
                len
            )));
        }
    }

    let mut sets = Vec::with_capacity(pattern.len());
    for (i, entry) in pattern.iter().enumerate() {
        let mut set = ReferencePictureSet::from_entry(entry).map_err(|e| match e {
            HevcError::InvalidRps(message) => invalid(message),
            other => other,
        })?;

        if let Some(params) = &entry.inter_rps {
            let predictor_index = i.checked_sub(params.delta_ridx_minus1 + 1).ok_or_else(|| {
                invalid(format!(
                    "GOP entry {} predicts from a set before the first",
                    i + 1
                ))
            })?;
            let inter = InterRpsPrediction {
                delta_ridx_minus1: params.delta_ridx_minus1,
                delta_rps: params.delta_rps,
                ref_idc: params.ref_idc.clone(),
            };
            let predicted: &ReferencePictureSet = &sets[predictor_index];
            let rebuilt = ReferencePictureSet::apply_prediction(predicted, &inter, entry.poc_offset)
                .map_err(|e| invalid(format!("GOP entry {}: {}", i + 1, e)))?;
            if !rebuilt.same_pictures(&set) {
                return Err(invalid(format!(
                    "inter RPS of GOP entry {} does not reproduce its references",
                    i + 1
                )));
            }
            set.inter = Some(inter);
        }
        sets.push(set);
    }
    Ok(sets)
}

/// Build the replacement set for a position whose pattern entry reaches
/// before the sequence start.
fn synthesize(
    pattern: &[GopEntry],
    walked: &[ScheduledPosition],
    running: &[i32],
    entry: &GopEntry,
    cur_poc: i32,
) -> Vec<(i32, bool)> {
    let mut refs: Vec<(i32, bool)> = entry
        .references()
        .filter(|&(d, _)| cur_poc.checked_add(d).is_some_and(|poc| poc >= 0))
        .collect();

    // Most recently coded first.
    for previous in walked.iter().rev() {
        let candidate = &pattern[previous.entry_index];
        let delta = previous.poc - cur_poc;
        if previous.poc >= 0
            && candidate.is_reference
            && candidate.temporal_id <= entry.temporal_id
            && running.contains(&previous.poc)
            && !refs.iter().any(|&(d, _)| d == delta)
        {
            let insert_at = refs
                .iter()
                .position(|&(d, _)| d < delta || d > 0)
                .unwrap_or(refs.len());
            refs.insert(insert_at, (delta, true));
            tracing::trace!(poc = cur_poc, delta, "admitted substitute reference");
        }
        if refs.len() >= entry.desired_ref_buffer_size {
            break;
        }
    }
    refs
}

/// Derive the reference schedule for a GOP pattern.
///
/// `sequence_length` is the number of positions after the leading intra
/// picture the caller will encode. The walk stops at the first of: every
/// pattern entry was coded once without synthesis, or `sequence_length`
/// positions were generated.
pub fn derive_schedule(pattern: &[GopEntry], sequence_length: usize) -> Result<Schedule> {
    let mut sets = validate_pattern(pattern)?;
    let len = pattern.len();

    let max_backward = pattern
        .iter()
        .flat_map(|e| e.reference_offsets.iter())
        .map(|&d| d.unsigned_abs() as usize)
        .max()
        .unwrap_or(0);
    let horizon = len * (max_backward.div_ceil(len) + 2);

    let mut running: Vec<i32> = vec![0];
    let mut walked: Vec<ScheduledPosition> = Vec::new();
    let mut verified = vec![false; len];
    let mut num_verified = 0;
    let mut max_reference_pictures = 0;
    let mut last_extra: Option<usize> = None;

    let mut position = 1;
    while num_verified < len && position <= sequence_length {
        if position > horizon {
            return Err(invalid(format!(
                "GOP pattern does not reach a steady state within {} pictures",
                horizon
            )));
        }

        let entry_index = (position - 1) % len;
        let entry = &pattern[entry_index];
        let cur_poc = pattern_poc(position, len, entry.poc_offset);

        let mut before_start = false;
        for delta in entry.reference_offsets.iter().copied() {
            let abs_poc = absolute_poc(cur_poc, delta)?;
            if abs_poc < 0 {
                before_start = true;
            } else if !running.contains(&abs_poc) {
                return Err(invalid(format!(
                    "ref pic {} is not available for GOP frame {}",
                    delta,
                    entry_index + 1
                )));
            }
        }

        let rps_index = if before_start {
            let refs = synthesize(pattern, &walked, &running, entry, cur_poc);
            let mut set = ReferencePictureSet::new(cur_poc, refs)?;
            set.synthesized = true;

            if let Some(prev) = last_extra {
                let predictor = &sets[prev];
                let delta_rps = predictor.poc - cur_poc;
                match set.prediction_from(predictor, delta_rps) {
                    Some(ref_idc) => {
                        set.inter = Some(InterRpsPrediction {
                            delta_ridx_minus1: 0,
                            delta_rps,
                            ref_idc,
                        });
                    }
                    None => {
                        tracing::debug!(
                            poc = cur_poc,
                            "synthesized set not reachable from its predictor, coding explicitly"
                        );
                    }
                }
            }

            if set.num_pictures() > entry.desired_ref_buffer_size {
                tracing::warn!(
                    poc = cur_poc,
                    refs = set.num_pictures(),
                    desired = entry.desired_ref_buffer_size,
                    "synthesized set exceeds the preferred buffer size"
                );
            }
            tracing::debug!(
                position,
                poc = cur_poc,
                deltas = ?set.deltas,
                predicted = set.inter.is_some(),
                "synthesized reference picture set"
            );

            sets.push(set);
            last_extra = Some(sets.len() - 1);
            sets.len() - 1
        } else {
            if !verified[entry_index] {
                verified[entry_index] = true;
                num_verified += 1;
            }
            entry_index
        };

        let effective = &sets[rps_index];
        running = effective
            .deltas
            .iter()
            .map(|&d| absolute_poc(cur_poc, d))
            .filter(|poc| !matches!(poc, Ok(p) if *p < 0))
            .collect::<Result<_>>()?;
        max_reference_pictures = max_reference_pictures.max(running.len());
        if entry.is_reference {
            running.push(cur_poc);
        }

        walked.push(ScheduledPosition {
            poc: cur_poc,
            entry_index,
            rps_index,
        });
        position += 1;
    }

    let max_reorder_pictures = reorder_depth(&walked);
    let steady_state = num_verified == len;

    tracing::info!(
        pattern = len,
        extra_sets = sets.len() - len,
        walked = walked.len(),
        steady_state,
        max_reorder_pictures,
        max_reference_pictures,
        "derived reference picture schedule"
    );

    Ok(Schedule {
        pattern: pattern.to_vec(),
        sets,
        walked,
        steady_state,
        max_reorder_pictures,
        max_reference_pictures,
    })
}

/// Largest number of pictures held for output at once.
///
/// Output runs in POC order; a picture leaves as soon as every smaller POC
/// has been output. The leading intra picture is output immediately.
fn reorder_depth(walked: &[ScheduledPosition]) -> usize {
    let mut pending = BTreeSet::new();
    let mut next_output = 1;
    let mut depth = 0;
    for position in walked {
        pending.insert(position.poc);
        while pending.remove(&next_output) {
            next_output += 1;
        }
        depth = depth.max(pending.len());
    }
    depth
}
