//! Quadtree entropy pipeline.
//!
//! Serializes coding quadtrees, coding units and residual quadtrees through an
//! [`EntropyBackend`]. Every flag a decoder can infer is left out of the
//! stream; the tree is checked against each inferred value, and a mismatch
//! is reported as [`HevcError::InvariantViolation`] instead of silently
//! producing an undecodable stream.
//!
//! The residual quadtree is written in two passes: split flags and coded
//! block flags first, then the coefficient blocks.

use tracing::{error, trace};

use crate::config::EncoderConfig;
use crate::entropy::{EntropyBackend, PartModeContext};
use crate::error::{HevcError, Result};
use crate::gop::SliceType;
use crate::tree::{
    Cbf, CbfFront, CodingQuadtree, CodingUnit, ComponentType, InterDir, IntraLumaMode, PartSize,
    PredictionData, TransformNode, TransformTree,
};

/// Slice-level state the coding-unit syntax depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceContext {
    /// Slice type.
    pub slice_type: SliceType,
    /// Active references per list.
    pub num_ref_idx: [u32; 2],
}

impl SliceContext {
    /// Create a context with one active reference per list.
    pub fn new(slice_type: SliceType) -> Self {
        Self {
            slice_type,
            num_ref_idx: [1, 1],
        }
    }

    /// Set the number of active references per list.
    pub fn with_num_ref_idx(mut self, l0: u32, l1: u32) -> Self {
        self.num_ref_idx = [l0, l1];
        self
    }
}

fn violation(message: String) -> HevcError {
    error!(%message, "coding tree contradicts inferred syntax");
    HevcError::InvariantViolation(message)
}

/// Four minimum-size leaves share the chroma block held by the first one.
fn check_shared_chroma(node: &TransformNode, children: &[TransformNode; 4]) -> Result<()> {
    for (index, child) in children.iter().enumerate().skip(1) {
        let stored = match &child.tree {
            TransformTree::Leaf(tu) => !tu.cb.is_empty() || !tu.cr.is_empty(),
            TransformTree::Split(_) => false,
        };
        if stored || child.cbf.cb || child.cbf.cr {
            return Err(violation(format!(
                "minimum-size transform {} carries chroma that only the first of four may hold",
                index
            )));
        }
    }
    for component in [ComponentType::Cb, ComponentType::Cr] {
        if children[0].cbf.get(component) != node.cbf.get(component) {
            return Err(violation(format!(
                "{:?} flag of the shared chroma block disagrees with its parent",
                component
            )));
        }
    }
    Ok(())
}

/// Coding-tree serializer configured from an [`EncoderConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadtreeEncoder {
    max_cu_log2_size: u32,
    min_cu_log2_size: u32,
    tu_log2_min_size: u32,
    tu_log2_max_size: u32,
    tu_max_depth_inter: u32,
    tu_max_depth_intra: u32,
    amp_enabled: bool,
    merge_enabled: bool,
    max_num_merge_cand: u32,
}

impl QuadtreeEncoder {
    /// Create an encoder for a validated configuration.
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            max_cu_log2_size: config.max_cu_log2_size(),
            min_cu_log2_size: config.min_cu_log2_size(),
            tu_log2_min_size: config.tu_log2_min_size,
            tu_log2_max_size: config.tu_log2_max_size,
            tu_max_depth_inter: config.tu_max_depth_inter,
            tu_max_depth_intra: config.tu_max_depth_intra,
            amp_enabled: config.amp_enabled,
            merge_enabled: config.merge_enabled,
            max_num_merge_cand: config.max_num_merge_cand,
        }
    }

    /// log2 of the smallest transform a CU may be split into.
    pub fn log2_min_tu_in_cu(&self, cu: &CodingUnit) -> u32 {
        let intra = cu.is_intra();
        let max_depth = if intra {
            self.tu_max_depth_intra
        } else {
            self.tu_max_depth_inter
        };
        let intra_split = (intra && cu.part_size == PartSize::SizeNxN) as u32;
        let inter_split =
            (!intra && max_depth == 1 && cu.part_size != PartSize::Size2Nx2N) as u32;
        let depth = (max_depth + inter_split + intra_split).saturating_sub(1);

        if cu.log2_size < self.tu_log2_min_size + depth {
            self.tu_log2_min_size
        } else {
            (cu.log2_size - depth).min(self.tu_log2_max_size)
        }
    }

    /// Serialize one coding tree unit.
    pub fn encode_coding_quadtree<B: EntropyBackend + ?Sized>(
        &self,
        node: &CodingQuadtree,
        slice: &SliceContext,
        backend: &mut B,
    ) -> Result<()> {
        self.encode_quadtree_node(node, self.max_cu_log2_size, slice, backend)
    }

    fn encode_quadtree_node<B: EntropyBackend + ?Sized>(
        &self,
        node: &CodingQuadtree,
        log2_size: u32,
        slice: &SliceContext,
        backend: &mut B,
    ) -> Result<()> {
        let depth = self.max_cu_log2_size - log2_size;
        match node {
            CodingQuadtree::Split {
                children,
                neighbors,
            } => {
                if log2_size <= self.min_cu_log2_size {
                    return Err(violation(format!(
                        "coding quadtree split below the minimum CU size at log2 {}",
                        log2_size
                    )));
                }
                backend.code_split_cu_flag(true, neighbors.deeper_than(depth))?;
                for child in children.iter() {
                    self.encode_quadtree_node(child, log2_size - 1, slice, backend)?;
                }
                Ok(())
            }
            CodingQuadtree::Unit(cu) => {
                if cu.log2_size != log2_size {
                    return Err(violation(format!(
                        "CU of log2 size {} placed at quadtree level {}",
                        cu.log2_size, log2_size
                    )));
                }
                if log2_size > self.min_cu_log2_size {
                    backend.code_split_cu_flag(false, cu.neighbors.deeper_than(depth))?;
                }
                self.encode_coding_unit(cu, slice, backend)
            }
        }
    }

    /// Serialize a coding unit: prediction syntax followed by its residual quadtree.
    pub fn encode_coding_unit<B: EntropyBackend + ?Sized>(
        &self,
        cu: &CodingUnit,
        slice: &SliceContext,
        backend: &mut B,
    ) -> Result<()> {
        if cu.log2_size < self.min_cu_log2_size || cu.log2_size > self.max_cu_log2_size {
            return Err(violation(format!(
                "CU log2 size {} outside {}..={}",
                cu.log2_size, self.min_cu_log2_size, self.max_cu_log2_size
            )));
        }
        let depth = self.max_cu_log2_size - cu.log2_size;
        trace!(log2_size = cu.log2_size, depth, skip = cu.skip, "coding unit");

        if slice.slice_type.is_intra() {
            if !cu.is_intra() {
                return Err(violation("inter CU in an intra slice".into()));
            }
        } else {
            backend.code_skip_flag(cu.skip, cu.neighbors.skipped())?;
        }

        if cu.skip {
            return self.encode_skipped(cu, backend);
        }

        if !slice.slice_type.is_intra() {
            backend.code_pred_mode(cu.is_intra())?;
        }
        if !cu.is_intra() || cu.log2_size == self.min_cu_log2_size {
            backend.code_part_size(
                cu.part_size,
                PartModeContext {
                    intra: cu.is_intra(),
                    log2_size: cu.log2_size,
                    min_cu_log2_size: self.min_cu_log2_size,
                    amp_enabled: self.amp_enabled,
                },
            )?;
        } else if cu.part_size != PartSize::Size2Nx2N {
            return Err(violation(format!(
                "intra CU of log2 size {} must be 2Nx2N",
                cu.log2_size
            )));
        }

        match &cu.prediction {
            PredictionData::Intra { luma, chroma } => {
                self.encode_intra_modes(cu, luma, *chroma, backend)?
            }
            PredictionData::Inter { .. } => self.encode_prediction_units(cu, slice, depth, backend)?,
        }

        self.encode_residual_quadtree(cu, backend)
    }

    fn encode_skipped<B: EntropyBackend + ?Sized>(&self, cu: &CodingUnit, backend: &mut B) -> Result<()> {
        let unit = match &cu.prediction {
            PredictionData::Inter { units } if units.len() == 1 && units[0].merge => units[0],
            _ => {
                return Err(violation(
                    "skipped CU must carry exactly one merge prediction unit".into(),
                ))
            }
        };
        if cu.part_size != PartSize::Size2Nx2N {
            return Err(violation("skipped CU must be 2Nx2N".into()));
        }
        if self.max_num_merge_cand > 1 {
            backend.code_merge_index(unit.merge_index, self.max_num_merge_cand)?;
        }
        Ok(())
    }

    fn encode_intra_modes<B: EntropyBackend + ?Sized>(
        &self,
        cu: &CodingUnit,
        luma: &[IntraLumaMode],
        chroma: u32,
        backend: &mut B,
    ) -> Result<()> {
        if luma.len() != cu.part_size.num_partitions() {
            return Err(violation(format!(
                "{} luma modes for {:?}",
                luma.len(),
                cu.part_size
            )));
        }
        for mode in luma {
            backend.code_prev_intra_luma_pred_flag(matches!(mode, IntraLumaMode::MostProbable(_)))?;
        }
        for mode in luma {
            match *mode {
                IntraLumaMode::MostProbable(index) if index <= 2 => backend.code_mpm_idx(index)?,
                IntraLumaMode::Remaining(mode) if mode < 32 => {
                    backend.code_rem_intra_luma_pred_mode(mode)?
                }
                other => return Err(violation(format!("invalid luma mode {:?}", other))),
            }
        }
        if chroma > 4 {
            return Err(violation(format!("invalid chroma mode {}", chroma)));
        }
        backend.code_intra_chroma_pred_mode(chroma)
    }

    fn encode_prediction_units<B: EntropyBackend + ?Sized>(
        &self,
        cu: &CodingUnit,
        slice: &SliceContext,
        depth: u32,
        backend: &mut B,
    ) -> Result<()> {
        let PredictionData::Inter { units } = &cu.prediction else {
            return Ok(());
        };
        if units.len() != cu.part_size.num_partitions() {
            return Err(violation(format!(
                "{} prediction units for {:?}",
                units.len(),
                cu.part_size
            )));
        }

        for (index, unit) in units.iter().enumerate() {
            if self.merge_enabled {
                backend.code_merge_flag(unit.merge)?;
            } else if unit.merge {
                return Err(violation("merge prediction unit with merge disabled".into()));
            }

            if unit.merge {
                if self.max_num_merge_cand > 1 {
                    backend.code_merge_index(unit.merge_index, self.max_num_merge_cand)?;
                }
                continue;
            }

            if slice.slice_type == SliceType::B {
                let (width, height) = cu.part_size.partition_size(1 << cu.log2_size, index);
                let bi_allowed = width + height != 12;
                if unit.inter_dir == InterDir::Bi && !bi_allowed {
                    return Err(violation(format!(
                        "bi-prediction in a {}x{} prediction unit",
                        width, height
                    )));
                }
                backend.code_inter_dir(unit.inter_dir, depth, bi_allowed)?;
            } else if unit.inter_dir != InterDir::List0 {
                return Err(violation("P slice prediction unit must use list 0".into()));
            }

            for list in 0..2 {
                if !unit.inter_dir.uses(list) {
                    continue;
                }
                if slice.num_ref_idx[list] > 1 {
                    backend.code_ref_idx(unit.ref_idx[list], slice.num_ref_idx[list])?;
                }
                backend.code_mvd(unit.mvd[list])?;
                backend.code_mvp_idx(unit.mvp_idx[list])?;
            }
        }
        Ok(())
    }

    /// Serialize the residual quadtree of a CU.
    ///
    /// Inter CUs first signal whether any residual exists, except merge 2Nx2N
    /// CUs, whose residual is implied (they would have been skipped otherwise).
    pub fn encode_residual_quadtree<B: EntropyBackend + ?Sized>(
        &self,
        cu: &CodingUnit,
        backend: &mut B,
    ) -> Result<()> {
        if cu.skip {
            return Ok(());
        }
        if !cu.is_intra() {
            let root = cu.transform.cbf.any();
            if cu.is_merge_2nx2n() {
                if !root {
                    return Err(violation(
                        "merge 2Nx2N CU without residual must be coded as skipped".into(),
                    ));
                }
            } else {
                backend.code_rqt_root_cbf(root)?;
            }
            if !root {
                return Ok(());
            }
        }

        let min_in_cu = self.log2_min_tu_in_cu(cu);
        self.encode_transform_flags(
            cu,
            &cu.transform,
            0,
            0,
            Cbf::default(),
            CbfFront::default(),
            min_in_cu,
            backend,
        )?;
        self.encode_transform_coefficients(&cu.transform, cu.log2_size, backend)
    }

    fn encode_split_transform<B: EntropyBackend + ?Sized>(
        &self,
        cu: &CodingUnit,
        split: bool,
        log2_size: u32,
        tr_depth: u32,
        min_in_cu: u32,
        backend: &mut B,
    ) -> Result<()> {
        let inferred = if cu.is_intra() && cu.part_size == PartSize::SizeNxN && tr_depth == 0 {
            Some(true)
        } else if !cu.is_intra()
            && cu.part_size != PartSize::Size2Nx2N
            && tr_depth == 0
            && self.tu_max_depth_inter == 1
        {
            Some(log2_size > min_in_cu)
        } else if log2_size > self.tu_log2_max_size {
            Some(true)
        } else if log2_size == self.tu_log2_min_size || log2_size == min_in_cu {
            Some(false)
        } else if log2_size < min_in_cu {
            return Err(violation(format!(
                "transform of log2 size {} below the CU minimum {}",
                log2_size, min_in_cu
            )));
        } else {
            None
        };

        match inferred {
            Some(expected) if expected != split => Err(violation(format!(
                "split_transform_flag at log2 size {} (depth {}) is inferred {} but the tree says {}",
                log2_size, tr_depth, expected, split
            ))),
            Some(_) => Ok(()),
            None => backend.code_split_transform_flag(split, log2_size),
        }
    }

    /// Flags pass: split flags and coded block flags, depth first.
    ///
    /// `front` counts set flags among the siblings coded before this node;
    /// the updated count is returned.
    fn encode_transform_flags<B: EntropyBackend + ?Sized>(
        &self,
        cu: &CodingUnit,
        node: &TransformNode,
        tr_depth: u32,
        quad_idx: usize,
        parent: Cbf,
        front: CbfFront,
        min_in_cu: u32,
        backend: &mut B,
    ) -> Result<CbfFront> {
        let log2_size = match cu.log2_size.checked_sub(tr_depth) {
            Some(size) if size >= self.tu_log2_min_size => size,
            _ => {
                return Err(violation(format!(
                    "transform depth {} too deep for a CU of log2 size {}",
                    tr_depth, cu.log2_size
                )))
            }
        };
        let split = matches!(node.tree, TransformTree::Split(_));
        self.encode_split_transform(cu, split, log2_size, tr_depth, min_in_cu, backend)?;

        let mut front = front;
        if log2_size <= self.tu_log2_max_size {
            let first_cbf = log2_size == self.tu_log2_max_size || tr_depth == 0;
            if first_cbf || log2_size > self.tu_log2_min_size {
                for component in [ComponentType::Cb, ComponentType::Cr] {
                    let actual = node.cbf.get(component);
                    if first_cbf || parent.get(component) {
                        if quad_idx == 3
                            && front.get(component) == 0
                            && log2_size < self.tu_log2_max_size
                        {
                            if !actual {
                                return Err(violation(format!(
                                    "{:?} flag of the fourth sibling is inferred set but is clear",
                                    component
                                )));
                            }
                            front.bump(component, 1);
                        } else {
                            backend.code_cbf(actual, component, tr_depth)?;
                            front.bump(component, actual as u32);
                        }
                    } else if actual {
                        return Err(violation(format!(
                            "{:?} flag set below a clear parent at depth {}",
                            component, tr_depth
                        )));
                    }
                }
            } else if log2_size == self.tu_log2_min_size {
                front.bump(ComponentType::Cb, parent.cb as u32);
                front.bump(ComponentType::Cr, parent.cr as u32);
            }
        }

        match &node.tree {
            TransformTree::Split(children) => {
                if log2_size - 1 == self.tu_log2_min_size {
                    check_shared_chroma(node, children)?;
                }
                let mut inner = CbfFront::default();
                for (index, child) in children.iter().enumerate() {
                    inner = self.encode_transform_flags(
                        cu,
                        child,
                        tr_depth + 1,
                        index,
                        node.cbf,
                        inner,
                        min_in_cu,
                        backend,
                    )?;
                }
                Ok(front + inner)
            }
            TransformTree::Leaf(_) => {
                let actual = node.cbf.luma;
                let inter = !cu.is_intra();
                if inter && tr_depth == 0 && !node.cbf.cb && !node.cbf.cr {
                    if !actual {
                        return Err(violation(
                            "residual signalled but no component has coefficients".into(),
                        ));
                    }
                } else if inter
                    && quad_idx == 3
                    && front == CbfFront::default()
                    && (cu.log2_size <= self.tu_log2_max_size + 1
                        || log2_size < self.tu_log2_max_size)
                {
                    if !actual {
                        return Err(violation(
                            "luma flag of the fourth sibling is inferred set but is clear".into(),
                        ));
                    }
                    front.y += 1;
                } else {
                    backend.code_cbf(actual, ComponentType::Luma, tr_depth)?;
                    front.y += actual as u32;
                }
                Ok(front)
            }
        }
    }

    /// Coefficient pass: luma then chroma per transform unit.
    fn encode_transform_coefficients<B: EntropyBackend + ?Sized>(
        &self,
        node: &TransformNode,
        log2_size: u32,
        backend: &mut B,
    ) -> Result<()> {
        match &node.tree {
            TransformTree::Leaf(tu) => {
                if node.cbf.luma {
                    backend.write_coefficient_block(&tu.luma, tu.width, tu.height, ComponentType::Luma)?;
                }
                for component in [ComponentType::Cb, ComponentType::Cr] {
                    if node.cbf.get(component) {
                        backend.write_coefficient_block(
                            tu.coefficients(component),
                            tu.width / 2,
                            tu.height / 2,
                            component,
                        )?;
                    }
                }
                Ok(())
            }
            TransformTree::Split(children) if log2_size - 1 == self.tu_log2_min_size => {
                // Four minimum-size leaves share one chroma block, stored in the
                // first leaf and sent after the last leaf's luma.
                let chroma_cbf = if log2_size - 1 == self.tu_log2_max_size {
                    children[0].cbf
                } else {
                    node.cbf
                };
                let TransformTree::Leaf(first) = &children[0].tree else {
                    return Err(violation("minimum-size transform is split".into()));
                };
                for (index, child) in children.iter().enumerate() {
                    let TransformTree::Leaf(tu) = &child.tree else {
                        return Err(violation("minimum-size transform is split".into()));
                    };
                    if child.cbf.luma {
                        backend.write_coefficient_block(&tu.luma, tu.width, tu.height, ComponentType::Luma)?;
                    }
                    if index == 3 {
                        for component in [ComponentType::Cb, ComponentType::Cr] {
                            if chroma_cbf.get(component) {
                                backend.write_coefficient_block(
                                    first.coefficients(component),
                                    tu.width,
                                    tu.height,
                                    component,
                                )?;
                            }
                        }
                    }
                }
                Ok(())
            }
            TransformTree::Split(children) => {
                for child in children.iter() {
                    self.encode_transform_coefficients(child, log2_size - 1, backend)?;
                }
                Ok(())
            }
        }
    }
}
