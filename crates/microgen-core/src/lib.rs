//! Synthesis engine: deterministic RNG, geometry, packing, voxelization,
//! orientation assignment, and crystallography matching for the microgen
//! microstructure generator.

pub mod catalog;
pub mod error_terms;
pub mod geometry;
pub mod grid;
pub mod matcher;
pub mod mathx;
pub mod misorientation;
pub mod neighborhood;
pub mod orientation;
pub mod packing;
pub mod pipeline;
pub mod rng;
pub mod voxelize;

pub use catalog::GrainCatalog;
pub use geometry::{GridDims, InsideVoxel, Pitch, SampleBox};
pub use grid::VoxelGrid;
pub use matcher::MatchOutcome;
pub use pipeline::SynthesisOutput;
pub use rng::DeterministicRng;
