//! Coding tree input.
//!
//! These types are produced by the mode-decision stage and only read by the
//! entropy pipeline. Coded-block flags are stored per node the way the
//! decoder sees them: a node's flag is the OR of its children's flags.

use std::ops::Add;

/// Prediction mode of a CU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredMode {
    /// Inter prediction.
    Inter,
    /// Intra prediction.
    Intra,
}

/// Prediction partitioning of a CU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartSize {
    /// One 2Nx2N partition.
    Size2Nx2N,
    /// Two 2NxN partitions.
    Size2NxN,
    /// Two Nx2N partitions.
    SizeNx2N,
    /// Four NxN partitions.
    SizeNxN,
    /// 2N x N/2 over 2N x 3N/2.
    Size2NxnU,
    /// 2N x 3N/2 over 2N x N/2.
    Size2NxnD,
    /// N/2 x 2N beside 3N/2 x 2N.
    SizenLx2N,
    /// 3N/2 x 2N beside N/2 x 2N.
    SizenRx2N,
}

impl PartSize {
    /// Number of prediction units.
    pub fn num_partitions(&self) -> usize {
        match self {
            Self::Size2Nx2N => 1,
            Self::SizeNxN => 4,
            _ => 2,
        }
    }

    /// Asymmetric partition.
    pub fn is_amp(&self) -> bool {
        matches!(
            self,
            Self::Size2NxnU | Self::Size2NxnD | Self::SizenLx2N | Self::SizenRx2N
        )
    }

    /// Luma size `(width, height)` of partition `index` in a CU of `size` samples.
    pub fn partition_size(&self, size: u32, index: usize) -> (u32, u32) {
        let quarter = size / 4;
        match self {
            Self::Size2Nx2N => (size, size),
            Self::Size2NxN => (size, size / 2),
            Self::SizeNx2N => (size / 2, size),
            Self::SizeNxN => (size / 2, size / 2),
            Self::Size2NxnU => (size, if index == 0 { quarter } else { size - quarter }),
            Self::Size2NxnD => (size, if index == 0 { size - quarter } else { quarter }),
            Self::SizenLx2N => (if index == 0 { quarter } else { size - quarter }, size),
            Self::SizenRx2N => (if index == 0 { size - quarter } else { quarter }, size),
        }
    }
}

/// Colour component of a coefficient block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Luma.
    Luma,
    /// Blue-difference chroma.
    Cb,
    /// Red-difference chroma.
    Cr,
}

impl ComponentType {
    /// Check if this is a chroma component.
    pub fn is_chroma(&self) -> bool {
        !matches!(self, Self::Luma)
    }
}

/// Coded-block flags of one transform node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cbf {
    /// Luma.
    pub luma: bool,
    /// Cb.
    pub cb: bool,
    /// Cr.
    pub cr: bool,
}

impl Cbf {
    /// Flag of one component.
    pub fn get(&self, component: ComponentType) -> bool {
        match component {
            ComponentType::Luma => self.luma,
            ComponentType::Cb => self.cb,
            ComponentType::Cr => self.cr,
        }
    }

    /// Any flag set.
    pub fn any(&self) -> bool {
        self.luma || self.cb || self.cr
    }

    fn union(self, other: Cbf) -> Cbf {
        Cbf {
            luma: self.luma || other.luma,
            cb: self.cb || other.cb,
            cr: self.cr || other.cr,
        }
    }
}

/// Running count of set flags among the siblings coded so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CbfFront {
    /// Luma.
    pub y: u32,
    /// Cb.
    pub u: u32,
    /// Cr.
    pub v: u32,
}

impl CbfFront {
    pub(crate) fn bump(&mut self, component: ComponentType, amount: u32) {
        match component {
            ComponentType::Luma => self.y += amount,
            ComponentType::Cb => self.u += amount,
            ComponentType::Cr => self.v += amount,
        }
    }

    pub(crate) fn get(&self, component: ComponentType) -> u32 {
        match component {
            ComponentType::Luma => self.y,
            ComponentType::Cb => self.u,
            ComponentType::Cr => self.v,
        }
    }
}

impl Add for CbfFront {
    type Output = CbfFront;

    fn add(self, rhs: CbfFront) -> CbfFront {
        CbfFront {
            y: self.y + rhs.y,
            u: self.u + rhs.u,
            v: self.v + rhs.v,
        }
    }
}

/// Coefficients of one transform leaf.
///
/// `width`/`height` are the luma dimensions; chroma blocks are half of each.
/// When four leaves of the minimum transform size share one chroma block,
/// that block is stored in the first leaf and the other three carry none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformUnit {
    /// Luma width.
    pub width: u32,
    /// Luma height.
    pub height: u32,
    /// Luma coefficients in raster order.
    pub luma: Vec<i32>,
    /// Cb coefficients in raster order.
    pub cb: Vec<i32>,
    /// Cr coefficients in raster order.
    pub cr: Vec<i32>,
}

impl TransformUnit {
    /// Coefficients of one component.
    pub fn coefficients(&self, component: ComponentType) -> &[i32] {
        match component {
            ComponentType::Luma => &self.luma,
            ComponentType::Cb => &self.cb,
            ComponentType::Cr => &self.cr,
        }
    }
}

/// Shape of a transform node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformTree {
    /// Leaf carrying coefficients.
    Leaf(TransformUnit),
    /// Four children in z-order.
    Split(Box<[TransformNode; 4]>),
}

/// Node of the residual quadtree.
///
/// Built only through [`TransformNode::leaf`], [`TransformNode::split`] and
/// friends, so the flags always follow from the coefficients below them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformNode {
    pub(crate) cbf: Cbf,
    pub(crate) tree: TransformTree,
}

impl TransformNode {
    /// Coded-block flags at this depth.
    pub fn cbf(&self) -> Cbf {
        self.cbf
    }

    /// Leaf or split.
    pub fn tree(&self) -> &TransformTree {
        &self.tree
    }

    /// Square leaf of `size` luma samples with flags derived from the data.
    ///
    /// Empty chroma vectors mean "no chroma block at this leaf".
    pub fn leaf(size: u32, luma: Vec<i32>, cb: Vec<i32>, cr: Vec<i32>) -> Self {
        Self::rect_leaf(size, size, luma, cb, cr)
    }

    /// Leaf with explicit luma dimensions.
    pub fn rect_leaf(width: u32, height: u32, luma: Vec<i32>, cb: Vec<i32>, cr: Vec<i32>) -> Self {
        let nonzero = |c: &[i32]| c.iter().any(|&v| v != 0);
        Self {
            cbf: Cbf {
                luma: nonzero(&luma),
                cb: nonzero(&cb),
                cr: nonzero(&cr),
            },
            tree: TransformTree::Leaf(TransformUnit {
                width,
                height,
                luma,
                cb,
                cr,
            }),
        }
    }

    /// Leaf without residual.
    pub fn empty(size: u32) -> Self {
        Self::leaf(size, Vec::new(), Vec::new(), Vec::new())
    }

    /// Split node whose flags are the union of the children's.
    pub fn split(children: [TransformNode; 4]) -> Self {
        let cbf = children
            .iter()
            .fold(Cbf::default(), |acc, child| acc.union(child.cbf));
        Self {
            cbf,
            tree: TransformTree::Split(Box::new(children)),
        }
    }
}

/// Motion vector difference in quarter samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    /// Horizontal component.
    pub x: i32,
    /// Vertical component.
    pub y: i32,
}

impl MotionVector {
    /// Create a new motion vector.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Reference lists used by a prediction unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterDir {
    /// List 0 only.
    #[default]
    List0,
    /// List 1 only.
    List1,
    /// Both lists.
    Bi,
}

impl InterDir {
    /// Whether list `list` (0 or 1) is used.
    pub fn uses(&self, list: usize) -> bool {
        match self {
            Self::List0 => list == 0,
            Self::List1 => list == 1,
            Self::Bi => true,
        }
    }
}

/// Motion syntax of one prediction unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictionUnit {
    /// Motion is copied from a merge candidate.
    pub merge: bool,
    /// Merge candidate index.
    pub merge_index: u32,
    /// Reference lists.
    pub inter_dir: InterDir,
    /// Reference index per list.
    pub ref_idx: [u32; 2],
    /// Motion vector difference per list.
    pub mvd: [MotionVector; 2],
    /// Predictor index per list.
    pub mvp_idx: [u32; 2],
}

impl PredictionUnit {
    /// Merge prediction unit.
    pub fn merged(merge_index: u32) -> Self {
        Self {
            merge: true,
            merge_index,
            ..Self::default()
        }
    }
}

/// Luma intra mode as signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntraLumaMode {
    /// Index into the three most probable modes.
    MostProbable(u32),
    /// Index among the 32 remaining modes.
    Remaining(u32),
}

/// Prediction syntax of a CU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionData {
    /// Intra modes: one luma mode per partition plus the chroma mode.
    Intra {
        /// Luma modes.
        luma: Vec<IntraLumaMode>,
        /// `intra_chroma_pred_mode` (4 = derived from luma).
        chroma: u32,
    },
    /// Inter motion: one entry per partition.
    Inter {
        /// Prediction units.
        units: Vec<PredictionUnit>,
    },
}

/// Depth and skip state of an already coded neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborInfo {
    /// CU depth.
    pub depth: u32,
    /// CU was skipped.
    pub skipped: bool,
}

/// Left and above neighbours, when available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbors {
    /// Left neighbour.
    pub left: Option<NeighborInfo>,
    /// Above neighbour.
    pub above: Option<NeighborInfo>,
}

impl Neighbors {
    /// Number of neighbours coded deeper than `depth`.
    pub fn deeper_than(&self, depth: u32) -> usize {
        [self.left, self.above]
            .iter()
            .flatten()
            .filter(|n| n.depth > depth)
            .count()
    }

    /// Number of skipped neighbours.
    pub fn skipped(&self) -> usize {
        [self.left, self.above]
            .iter()
            .flatten()
            .filter(|n| n.skipped)
            .count()
    }
}

/// Coding unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingUnit {
    /// log2 of the CU size.
    pub log2_size: u32,
    /// Partitioning.
    pub part_size: PartSize,
    /// Skipped: merge 2Nx2N without residual.
    pub skip: bool,
    /// Prediction syntax.
    pub prediction: PredictionData,
    /// Residual quadtree rooted at the CU.
    pub transform: TransformNode,
    /// Neighbour state for context selection.
    pub neighbors: Neighbors,
}

impl CodingUnit {
    /// Prediction mode.
    pub fn pred_mode(&self) -> PredMode {
        match self.prediction {
            PredictionData::Intra { .. } => PredMode::Intra,
            PredictionData::Inter { .. } => PredMode::Inter,
        }
    }

    /// Whether the CU is intra coded.
    pub fn is_intra(&self) -> bool {
        self.pred_mode() == PredMode::Intra
    }

    /// First prediction unit is merged with 2Nx2N partitioning.
    pub fn is_merge_2nx2n(&self) -> bool {
        self.part_size == PartSize::Size2Nx2N
            && matches!(&self.prediction, PredictionData::Inter { units } if units.first().is_some_and(|u| u.merge))
    }

    /// Intra 2Nx2N CU.
    pub fn intra(log2_size: u32, mode: IntraLumaMode, chroma: u32, transform: TransformNode) -> Self {
        Self {
            log2_size,
            part_size: PartSize::Size2Nx2N,
            skip: false,
            prediction: PredictionData::Intra {
                luma: vec![mode],
                chroma,
            },
            transform,
            neighbors: Neighbors::default(),
        }
    }

    /// Inter CU.
    pub fn inter(
        log2_size: u32,
        part_size: PartSize,
        units: Vec<PredictionUnit>,
        transform: TransformNode,
    ) -> Self {
        Self {
            log2_size,
            part_size,
            skip: false,
            prediction: PredictionData::Inter { units },
            transform,
            neighbors: Neighbors::default(),
        }
    }

    /// Skipped CU.
    pub fn skipped(log2_size: u32, merge_index: u32) -> Self {
        Self {
            log2_size,
            part_size: PartSize::Size2Nx2N,
            skip: true,
            prediction: PredictionData::Inter {
                units: vec![PredictionUnit::merged(merge_index)],
            },
            transform: TransformNode::empty(1 << log2_size),
            neighbors: Neighbors::default(),
        }
    }
}

/// Coding quadtree of one CTU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodingQuadtree {
    /// Four quadrants in z-order.
    Split {
        /// Quadrants.
        children: Box<[CodingQuadtree; 4]>,
        /// Neighbour state at this node.
        neighbors: Neighbors,
    },
    /// Leaf CU.
    Unit(CodingUnit),
}

impl CodingQuadtree {
    /// Split node without neighbour information.
    pub fn split(children: [CodingQuadtree; 4]) -> Self {
        Self::Split {
            children: Box::new(children),
            neighbors: Neighbors::default(),
        }
    }
}
