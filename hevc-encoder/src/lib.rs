//! HEVC encoder core.
//!
//! This crate holds the two pieces of an HEVC encoder that decide what a
//! decoder is able to reconstruct, independent of any pixel processing:
//!
//! - **Reference picture scheduling**: a repeating GOP pattern is turned into
//!   a causally valid sequence of short-term reference picture sets,
//!   synthesizing replacement sets for the pictures near the sequence start
//!   and measuring reorder depth and reference buffer needs.
//! - **Quadtree entropy coding**: coding quadtrees, coding units and residual
//!   quadtrees are serialized through an [`EntropyBackend`], omitting every
//!   flag a conformant decoder infers.
//!
//! Sequence and slice header fields that carry the schedule are written by
//! [`HeaderWriter`]. Two backends are provided: [`CavlcWriter`] (static
//! tables) and [`CabacWriter`] (context-adaptive arithmetic coding).
//!
//! # Example
//!
//! ```rust
//! use hevc_encoder::{
//!     CavlcWriter, CodingQuadtree, CodingUnit, EncoderConfig, EntropyBackend, GopEntry,
//!     IntraLumaMode, QuadtreeEncoder, Schedule, SliceContext, SliceType, TransformNode,
//! };
//!
//! let config = EncoderConfig::new(vec![GopEntry::new(SliceType::P, 1)
//!     .with_references(&[-1, -2, -3, -4])])
//! .with_frames(30);
//! config.validate()?;
//!
//! let schedule = Schedule::from_config(&config)?;
//! assert_eq!(schedule.max_reference_pictures(), 4);
//!
//! let encoder = QuadtreeEncoder::new(&config);
//! let ctu = CodingQuadtree::split(std::array::from_fn(|_| {
//!     CodingQuadtree::Unit(CodingUnit::intra(
//!         5,
//!         IntraLumaMode::MostProbable(0),
//!         4,
//!         TransformNode::empty(32),
//!     ))
//! }));
//! let mut backend = CavlcWriter::new();
//! encoder.encode_coding_quadtree(&ctu, &SliceContext::new(SliceType::I), &mut backend)?;
//! backend.finish()?;
//! # Ok::<(), hevc_encoder::HevcError>(())
//! ```

#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod entropy;
pub mod error;
pub mod gop;
pub mod headers;
pub mod quadtree;
pub mod rps;
pub mod schedule;
pub mod tree;

pub use config::{EncoderConfig, EntropyMode};
pub use entropy::{CabacWriter, CavlcWriter, EntropyBackend, PartModeContext};
pub use error::{HevcError, Result};
pub use gop::{GopEntry, InterRpsParams, RefIdc, SliceType};
pub use headers::{write_st_ref_pic_set, HeaderWriter};
pub use quadtree::{QuadtreeEncoder, SliceContext};
pub use rps::{InterRpsPrediction, ReferencePictureSet};
pub use schedule::{derive_schedule, Schedule, ScheduledPicture, ScheduledPosition};
pub use tree::{
    Cbf, CbfFront, CodingQuadtree, CodingUnit, ComponentType, InterDir, IntraLumaMode,
    MotionVector, NeighborInfo, Neighbors, PartSize, PredMode, PredictionData, PredictionUnit,
    TransformNode, TransformTree, TransformUnit,
};
