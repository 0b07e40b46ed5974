//! Short-term reference picture sets.
//!
//! A [`ReferencePictureSet`] keeps its deltas in canonical order: negative
//! deltas closest first, then positive deltas closest first. This is the
//! order in which they are signalled and the order inter-RPS prediction
//! indexes into.

use crate::error::{HevcError, Result};
use crate::gop::{GopEntry, RefIdc};

/// Largest distance a short-term reference may have from the current picture.
///
/// `delta_poc_s0_minus1`, `delta_poc_s1_minus1` and `abs_delta_rps_minus1`
/// are all limited to `0..=2^15 - 1`.
pub const MAX_DELTA_POC: i32 = 1 << 15;

fn delta_in_range(delta: i32) -> bool {
    delta.unsigned_abs() <= MAX_DELTA_POC as u32
}

/// Inter-RPS prediction of a set from an earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterRpsPrediction {
    /// Distance to the predictor set minus one.
    pub delta_ridx_minus1: usize,
    /// POC of the predictor minus POC of the current picture.
    pub delta_rps: i32,
    /// One entry per predictor delta in canonical order, then the predictor.
    pub ref_idc: Vec<RefIdc>,
}

/// Short-term reference picture set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePictureSet {
    /// POC offset of the pattern entry, or absolute POC for synthesized sets.
    pub poc: i32,
    /// Deltas in canonical order.
    pub deltas: Vec<i32>,
    /// Parallel to `deltas`.
    pub used: Vec<bool>,
    /// Prediction used when signalling the set.
    pub inter: Option<InterRpsPrediction>,
    /// Set was created to cover a sequence start.
    pub synthesized: bool,
}

impl ReferencePictureSet {
    /// Create a set from `(delta, used)` pairs in any order.
    pub fn new(poc: i32, refs: impl IntoIterator<Item = (i32, bool)>) -> Result<Self> {
        let mut refs: Vec<(i32, bool)> = refs.into_iter().collect();
        refs.sort_by_key(|&(d, _)| canonical_key(d));

        for pair in refs.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(HevcError::InvalidRps(format!(
                    "duplicate delta {} in set for POC {}",
                    pair[0].0, poc
                )));
            }
        }
        if refs.iter().any(|&(d, _)| d == 0) {
            return Err(HevcError::InvalidRps(format!(
                "set for POC {} references itself",
                poc
            )));
        }
        if let Some(&(d, _)) = refs.iter().find(|&&(d, _)| !delta_in_range(d)) {
            return Err(HevcError::InvalidRps(format!(
                "delta {} in set for POC {} is outside -{max}..={max}",
                d,
                poc,
                max = MAX_DELTA_POC
            )));
        }

        Ok(Self {
            poc,
            deltas: refs.iter().map(|&(d, _)| d).collect(),
            used: refs.iter().map(|&(_, u)| u).collect(),
            inter: None,
            synthesized: false,
        })
    }

    /// Create the set described by a pattern entry.
    pub fn from_entry(entry: &GopEntry) -> Result<Self> {
        if entry.reference_offsets.len() != entry.used_by_current.len() {
            return Err(HevcError::InvalidGopStructure(format!(
                "POC {} has {} references but {} usage flags",
                entry.poc_offset,
                entry.reference_offsets.len(),
                entry.used_by_current.len()
            )));
        }
        Self::new(entry.poc_offset, entry.references())
    }

    /// Total number of references.
    pub fn num_pictures(&self) -> usize {
        self.deltas.len()
    }

    /// Number of negative deltas.
    pub fn num_negative(&self) -> usize {
        self.deltas.iter().take_while(|&&d| d < 0).count()
    }

    /// Number of positive deltas.
    pub fn num_positive(&self) -> usize {
        self.deltas.len() - self.num_negative()
    }

    /// Negative `(delta, used)` pairs, closest first.
    pub fn negative(&self) -> impl Iterator<Item = (i32, bool)> + '_ {
        self.pairs().take(self.num_negative())
    }

    /// Positive `(delta, used)` pairs, closest first.
    pub fn positive(&self) -> impl Iterator<Item = (i32, bool)> + '_ {
        self.pairs().skip(self.num_negative())
    }

    /// All `(delta, used)` pairs in canonical order.
    pub fn pairs(&self) -> impl Iterator<Item = (i32, bool)> + '_ {
        self.deltas.iter().copied().zip(self.used.iter().copied())
    }

    /// Whether `delta` is part of the set.
    pub fn contains(&self, delta: i32) -> bool {
        self.deltas.contains(&delta)
    }

    /// Compute the `RefIdc` vector predicting `self` from `predictor`.
    ///
    /// Returns `None` when some delta of `self` cannot be reached from the
    /// predictor, in which case the set has to be coded explicitly.
    pub fn prediction_from(
        &self,
        predictor: &ReferencePictureSet,
        delta_rps: i32,
    ) -> Option<Vec<RefIdc>> {
        let candidates = predictor
            .deltas
            .iter()
            .map(|&d| d.saturating_add(delta_rps))
            .chain(std::iter::once(delta_rps));

        let mut covered = 0;
        let ref_idc: Vec<RefIdc> = candidates
            .map(|candidate| match self.deltas.iter().position(|&d| d == candidate) {
                Some(i) => {
                    covered += 1;
                    if self.used[i] {
                        RefIdc::UsedByCurrent
                    } else {
                        RefIdc::KeptForPrediction
                    }
                }
                None => RefIdc::Unused,
            })
            .collect();

        (covered == self.deltas.len()).then_some(ref_idc)
    }

    /// Reconstruct the set signalled by `inter` relative to `predictor`.
    ///
    /// Mirrors the decoder derivation so signalled predictions can be
    /// checked against the explicit deltas.
    pub fn apply_prediction(
        predictor: &ReferencePictureSet,
        inter: &InterRpsPrediction,
        poc: i32,
    ) -> Result<Self> {
        let num_delta = predictor.num_pictures();
        if inter.ref_idc.len() != num_delta + 1 {
            return Err(HevcError::InvalidRps(format!(
                "predictor has {} pictures but {} refIdc values were given",
                num_delta,
                inter.ref_idc.len()
            )));
        }
        if inter.delta_rps == 0 {
            return Err(HevcError::InvalidRps("deltaRPS must not be 0".into()));
        }
        if !delta_in_range(inter.delta_rps) {
            return Err(HevcError::InvalidRps(format!(
                "deltaRPS {} is outside -{max}..={max}",
                inter.delta_rps,
                max = MAX_DELTA_POC
            )));
        }

        let num_neg = predictor.num_negative();
        let delta_rps = inter.delta_rps;
        let idc = &inter.ref_idc;
        let mut negative = Vec::new();
        let mut positive = Vec::new();

        for j in (0..predictor.num_positive()).rev() {
            let d = predictor.deltas[num_neg + j] + delta_rps;
            if d < 0 && idc[num_neg + j].kept() {
                negative.push((d, idc[num_neg + j].used_by_current()));
            }
        }
        if delta_rps < 0 && idc[num_delta].kept() {
            negative.push((delta_rps, idc[num_delta].used_by_current()));
        }
        for j in 0..num_neg {
            let d = predictor.deltas[j] + delta_rps;
            if d < 0 && idc[j].kept() {
                negative.push((d, idc[j].used_by_current()));
            }
        }

        for j in (0..num_neg).rev() {
            let d = predictor.deltas[j] + delta_rps;
            if d > 0 && idc[j].kept() {
                positive.push((d, idc[j].used_by_current()));
            }
        }
        if delta_rps > 0 && idc[num_delta].kept() {
            positive.push((delta_rps, idc[num_delta].used_by_current()));
        }
        for j in 0..predictor.num_positive() {
            let d = predictor.deltas[num_neg + j] + delta_rps;
            if d > 0 && idc[num_neg + j].kept() {
                positive.push((d, idc[num_neg + j].used_by_current()));
            }
        }

        let mut set = Self::new(poc, negative.into_iter().chain(positive))?;
        set.inter = Some(inter.clone());
        Ok(set)
    }

    /// Whether two sets signal the same pictures with the same usage.
    pub fn same_pictures(&self, other: &ReferencePictureSet) -> bool {
        self.deltas == other.deltas && self.used == other.used
    }
}

fn canonical_key(delta: i32) -> (bool, u32) {
    (delta > 0, delta.unsigned_abs())
}
