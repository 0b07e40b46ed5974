//! GOP pattern description.
//!
//! A GOP pattern is an ordered list of [`GopEntry`] values in coding order.
//! Entries can be built programmatically or parsed from the classic
//! `FrameN:` configuration line format.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HevcError, Result};

/// Slice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SliceType {
    /// B-slice (bidirectional prediction).
    B = 0,
    /// P-slice (forward prediction).
    P = 1,
    /// I-slice (intra only).
    I = 2,
}

impl SliceType {
    /// Check if this is an intra slice.
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I)
    }

    /// Check if this uses backward prediction.
    pub fn uses_list1(&self) -> bool {
        matches!(self, Self::B)
    }

    /// Value written as `slice_type`.
    pub fn raw(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for SliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::B => write!(f, "B"),
            Self::P => write!(f, "P"),
            Self::I => write!(f, "I"),
        }
    }
}

impl FromStr for SliceType {
    type Err = HevcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "B" | "b" => Ok(Self::B),
            "P" | "p" => Ok(Self::P),
            "I" | "i" => Ok(Self::I),
            _ => Err(HevcError::Config(format!("Invalid slice type: {}", s))),
        }
    }
}

/// Role of one predictor picture in an inter-predicted reference set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RefIdc {
    /// Not carried over.
    #[default]
    Unused = 0,
    /// Carried over and used by the current picture.
    UsedByCurrent = 1,
    /// Carried over for later pictures only.
    KeptForPrediction = 2,
}

impl RefIdc {
    /// Create from the numeric configuration value.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Unused),
            1 => Ok(Self::UsedByCurrent),
            2 => Ok(Self::KeptForPrediction),
            _ => Err(HevcError::Config(format!("Invalid refIdc value: {}", value))),
        }
    }

    /// `used_by_curr_pic_flag`.
    pub fn used_by_current(&self) -> bool {
        matches!(self, Self::UsedByCurrent)
    }

    /// `use_delta_flag`.
    pub fn kept(&self) -> bool {
        !matches!(self, Self::Unused)
    }
}

/// Inter-RPS prediction request attached to a pattern entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterRpsParams {
    /// Distance to the predictor set minus one.
    pub delta_ridx_minus1: usize,
    /// POC of the predictor minus POC of the current picture.
    pub delta_rps: i32,
    /// One entry per predictor delta, then one for the predictor itself.
    pub ref_idc: Vec<RefIdc>,
}

/// One position of a repeating GOP pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GopEntry {
    /// Slice type, P or B.
    pub slice_type: SliceType,
    /// POC relative to the start of the GOP.
    pub poc_offset: i32,
    /// QP offset applied on top of the sequence QP.
    pub qp_offset: i32,
    /// Lagrangian scale factor.
    pub qp_factor: f64,
    /// Temporal layer.
    pub temporal_id: u8,
    /// Preferred number of references to retain.
    pub desired_ref_buffer_size: usize,
    /// Whether later pictures may reference this one.
    pub is_reference: bool,
    /// Deltas from this picture's POC to its references.
    pub reference_offsets: Vec<i32>,
    /// Parallel to `reference_offsets`.
    pub used_by_current: Vec<bool>,
    /// Optional inter-RPS prediction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_rps: Option<InterRpsParams>,
}

impl GopEntry {
    /// Create a reference entry without references.
    pub fn new(slice_type: SliceType, poc_offset: i32) -> Self {
        Self {
            slice_type,
            poc_offset,
            qp_offset: 0,
            qp_factor: 1.0,
            temporal_id: 0,
            desired_ref_buffer_size: 0,
            is_reference: true,
            reference_offsets: Vec::new(),
            used_by_current: Vec::new(),
            inter_rps: None,
        }
    }

    /// Set references, all used by the current picture.
    pub fn with_references(mut self, deltas: &[i32]) -> Self {
        self.reference_offsets = deltas.to_vec();
        self.used_by_current = vec![true; deltas.len()];
        self.desired_ref_buffer_size = self.desired_ref_buffer_size.max(deltas.len());
        self
    }

    /// Set references with explicit usage flags.
    pub fn with_reference_usage(mut self, refs: &[(i32, bool)]) -> Self {
        self.reference_offsets = refs.iter().map(|&(d, _)| d).collect();
        self.used_by_current = refs.iter().map(|&(_, u)| u).collect();
        self.desired_ref_buffer_size = self.desired_ref_buffer_size.max(refs.len());
        self
    }

    /// Set the preferred buffer size.
    pub fn with_ref_buffer_size(mut self, size: usize) -> Self {
        self.desired_ref_buffer_size = size;
        self
    }

    /// Set the temporal layer.
    pub fn with_temporal_id(mut self, temporal_id: u8) -> Self {
        self.temporal_id = temporal_id;
        self
    }

    /// Set QP offset and factor.
    pub fn with_qp(mut self, offset: i32, factor: f64) -> Self {
        self.qp_offset = offset;
        self.qp_factor = factor;
        self
    }

    /// Mark the picture as not referenced by later pictures.
    pub fn non_reference(mut self) -> Self {
        self.is_reference = false;
        self
    }

    /// Attach an inter-RPS prediction request.
    pub fn with_inter_rps(mut self, inter: InterRpsParams) -> Self {
        self.inter_rps = Some(inter);
        self
    }

    /// Iterate over `(delta, used)` pairs.
    pub fn references(&self) -> impl Iterator<Item = (i32, bool)> + '_ {
        self.reference_offsets
            .iter()
            .copied()
            .zip(self.used_by_current.iter().copied())
    }
}

fn next_token<'a, T: FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
    field: &str,
) -> Result<T> {
    let token = tokens
        .next()
        .ok_or_else(|| HevcError::Config(format!("GOP entry is missing {}", field)))?;
    token
        .parse()
        .map_err(|_| HevcError::Config(format!("Invalid {} in GOP entry: {}", field, token)))
}

fn parse_flag<'a>(tokens: &mut impl Iterator<Item = &'a str>, field: &str) -> Result<bool> {
    match next_token::<u8>(tokens, field)? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(HevcError::Config(format!("Invalid {} in GOP entry: {}", field, v))),
    }
}

impl FromStr for GopEntry {
    type Err = HevcError;

    /// Parse `Type POC QPOffset QPFactor tId RefBufSize isRef numRefs refs...
    /// interRPS [deltaRIdx-1 deltaRPS numIdc idc...]`, optionally prefixed by
    /// `FrameN:`.
    fn from_str(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace().peekable();
        if tokens.peek().is_some_and(|t| t.ends_with(':')) {
            tokens.next();
        }

        let slice_type: SliceType = next_token(&mut tokens, "slice type")?;
        let poc_offset = next_token(&mut tokens, "POC")?;
        let qp_offset = next_token(&mut tokens, "QP offset")?;
        let qp_factor = next_token(&mut tokens, "QP factor")?;
        let temporal_id = next_token(&mut tokens, "temporal id")?;
        let desired_ref_buffer_size = next_token(&mut tokens, "reference buffer size")?;
        let is_reference = parse_flag(&mut tokens, "reference flag")?;
        let num_refs: usize = next_token(&mut tokens, "reference count")?;

        let mut reference_offsets = Vec::with_capacity(num_refs);
        for _ in 0..num_refs {
            reference_offsets.push(next_token(&mut tokens, "reference delta")?);
        }

        // Older lines end after the reference list.
        let inter_rps = if tokens.peek().is_none() || !parse_flag(&mut tokens, "inter RPS flag")? {
            None
        } else {
            let delta_ridx_minus1 = next_token(&mut tokens, "delta RIdx")?;
            let delta_rps = next_token(&mut tokens, "delta RPS")?;
            let num_idc: usize = next_token(&mut tokens, "refIdc count")?;
            let mut ref_idc = Vec::with_capacity(num_idc);
            for _ in 0..num_idc {
                ref_idc.push(RefIdc::from_raw(next_token(&mut tokens, "refIdc")?)?);
            }
            Some(InterRpsParams {
                delta_ridx_minus1,
                delta_rps,
                ref_idc,
            })
        };

        if let Some(extra) = tokens.next() {
            return Err(HevcError::Config(format!(
                "Unexpected trailing token in GOP entry: {}",
                extra
            )));
        }

        Ok(Self {
            slice_type,
            poc_offset,
            qp_offset,
            qp_factor,
            temporal_id,
            desired_ref_buffer_size,
            is_reference,
            used_by_current: vec![true; reference_offsets.len()],
            reference_offsets,
            inter_rps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_low_delay_line() {
        let entry: GopEntry = "Frame1: P 1 3 0.4624 0 4 1 4 -1 -5 -9 -13 0".parse().unwrap();
        assert_eq!(entry.slice_type, SliceType::P);
        assert_eq!(entry.poc_offset, 1);
        assert_eq!(entry.qp_offset, 3);
        assert!((entry.qp_factor - 0.4624).abs() < 1e-9);
        assert_eq!(entry.desired_ref_buffer_size, 4);
        assert!(entry.is_reference);
        assert_eq!(entry.reference_offsets, vec![-1, -5, -9, -13]);
        assert_eq!(entry.used_by_current, vec![true; 4]);
        assert_eq!(entry.inter_rps, None);
    }

    #[test]
    fn test_parse_inter_rps_line() {
        let entry: GopEntry = "B 2 2 0.3 1 2 1 2 -2 2 1 0 -2 3 1 2 0".parse().unwrap();
        assert_eq!(entry.temporal_id, 1);
        assert_eq!(
            entry.inter_rps,
            Some(InterRpsParams {
                delta_ridx_minus1: 0,
                delta_rps: -2,
                ref_idc: vec![RefIdc::UsedByCurrent, RefIdc::KeptForPrediction, RefIdc::Unused],
            })
        );
    }

    #[test]
    fn test_parse_without_inter_rps_column() {
        let entry: GopEntry = "P 1 0 1.0 0 1 1 1 -1".parse().unwrap();
        assert_eq!(entry.reference_offsets, vec![-1]);
        assert!(entry.inter_rps.is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!("X 1 0 1.0 0 1 1 1 -1 0".parse::<GopEntry>().is_err());
        assert!("P 1 0 1.0 0 1 1 2 -1".parse::<GopEntry>().is_err());
        assert!("P 1 0 1.0 0 1 3 1 -1 0".parse::<GopEntry>().is_err());
        assert!("P 1 0 1.0 0 1 1 1 -1 0 7".parse::<GopEntry>().is_err());
        assert!("B 2 2 0.3 1 2 1 2 -2 2 1 0 -2 1 5".parse::<GopEntry>().is_err());
    }

    #[test]
    fn test_builder() {
        let entry = GopEntry::new(SliceType::B, 2)
            .with_reference_usage(&[(-2, true), (2, false)])
            .with_temporal_id(1)
            .non_reference();
        assert_eq!(entry.desired_ref_buffer_size, 2);
        assert!(!entry.is_reference);
        assert_eq!(entry.references().collect::<Vec<_>>(), vec![(-2, true), (2, false)]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let entry = GopEntry::new(SliceType::P, 1)
            .with_references(&[-1, -2])
            .with_inter_rps(InterRpsParams {
                delta_ridx_minus1: 0,
                delta_rps: -1,
                ref_idc: vec![RefIdc::UsedByCurrent; 3],
            });
        let json = serde_json::to_string(&entry).unwrap();
        let back: GopEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
