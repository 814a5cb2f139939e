//! Run configuration recognized by the pipeline (§4.9, §6).

use serde::{Deserialize, Serialize};

use crate::error::SynthesisError;

/// Grain body shape class (glossary: "Shape class").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    Ellipsoid,
    Superellipsoid,
    Cuboctahedron,
}

impl ShapeClass {
    pub fn from_code(code: i32) -> Result<Self, SynthesisError> {
        match code {
            1 => Ok(ShapeClass::Ellipsoid),
            2 => Ok(ShapeClass::Superellipsoid),
            3 => Ok(ShapeClass::Cuboctahedron),
            other => Err(SynthesisError::configuration(format!(
                "unknown shape class code {other} (expected 1, 2, or 3)"
            ))),
        }
    }
}

/// Crystal symmetry group used for disorientation and ODF/MDF binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrystalStructure {
    Hexagonal,
    Cubic,
}

impl CrystalStructure {
    pub fn from_code(code: i32) -> Result<Self, SynthesisError> {
        match code {
            1 => Ok(CrystalStructure::Hexagonal),
            2 => Ok(CrystalStructure::Cubic),
            other => Err(SynthesisError::configuration(format!(
                "unknown crystal structure code {other} (expected 1=hexagonal or 2=cubic)"
            ))),
        }
    }

    /// Number of symmetry operators in the point group (§4.5).
    pub fn symmetry_operator_count(self) -> usize {
        match self {
            CrystalStructure::Cubic => 24,
            CrystalStructure::Hexagonal => 12,
        }
    }
}

/// Target voxel pitch along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Resolution {
    pub fn uniform(pitch: f64) -> Self {
        Resolution {
            dx: pitch,
            dy: pitch,
            dz: pitch,
        }
    }

    pub fn validate(&self) -> Result<(), SynthesisError> {
        if self.dx <= 0.0 || self.dy <= 0.0 || self.dz <= 0.0 {
            return Err(SynthesisError::configuration(
                "voxel resolution must be strictly positive on every axis",
            ));
        }
        Ok(())
    }
}

/// Full run configuration accepted by the pipeline entry point (C15).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Target number of active grains, `N`.
    pub num_grains: usize,
    pub shape_class: ShapeClass,
    pub crystal_structure: CrystalStructure,
    pub resolution: Resolution,
    /// Top-level RNG seed (§4.1).
    pub seed: u64,
    /// Packing optimizer iteration count (default 1_000_000, §4.3).
    pub packing_iterations: u64,
    /// Crystallography matcher iteration count (default 100_000, §4.5).
    pub matcher_iterations: u64,
    /// Matcher early-stop patience: consecutive rejections before giving up
    /// (default 5_000, §4.5).
    pub matcher_patience: u64,
    /// Candidate pool oversampling factor (default 25, §4.3).
    pub pool_oversample: usize,
    /// Coarse-packing resolution multiplier (default 4, §4.3/§4.4).
    pub coarse_factor: u32,
}

impl RunConfig {
    pub fn new(
        num_grains: usize,
        shape_class: ShapeClass,
        crystal_structure: CrystalStructure,
        resolution: Resolution,
        seed: u64,
    ) -> Self {
        RunConfig {
            num_grains,
            shape_class,
            crystal_structure,
            resolution,
            seed,
            packing_iterations: 1_000_000,
            matcher_iterations: 100_000,
            matcher_patience: 5_000,
            pool_oversample: 25,
            coarse_factor: 4,
        }
    }

    pub fn validate(&self) -> Result<(), SynthesisError> {
        if self.num_grains == 0 {
            return Err(SynthesisError::configuration(
                "num_grains must be at least 1",
            ));
        }
        if self.pool_oversample == 0 {
            return Err(SynthesisError::configuration(
                "pool_oversample must be at least 1",
            ));
        }
        if self.coarse_factor == 0 {
            return Err(SynthesisError::configuration(
                "coarse_factor must be at least 1",
            ));
        }
        self.resolution.validate()?;
        Ok(())
    }

    /// Total candidate pool size, `25 * N` by default (§4.3).
    pub fn pool_size(&self) -> usize {
        self.num_grains * self.pool_oversample
    }
}
