//! Canonical data model, target histograms, configuration, and error types for
//! the microgen microstructure synthesis engine.
//!
//! This crate has no notion of packing, voxelization, or orientation matching —
//! it only defines the shapes those stages operate on, plus the two small
//! I/O adapters (`stats_io`, `grid_io`) that get data in and out of them.

pub mod config;
pub mod error;
pub mod grain;
pub mod grid_io;
pub mod histograms;
pub mod stats_io;
pub mod voxel;

pub use config::{CrystalStructure, Resolution, RunConfig, ShapeClass};
pub use error::{Stage, SynthesisError};
pub use grain::{EulerAngles, Grain, GrainId, Quaternion};
pub use histograms::{
    AxisOdfTable, BetaTable, MdfTable, MicrotextureTable, NeighborTable, OdfTable,
    SizeDistribution, TargetHistograms,
};
pub use voxel::{UNASSIGNED, UNLABELED, Voxel};
