//! Error taxonomy shared by every stage of the synthesis pipeline (§7).

use thiserror::Error;

/// Which pipeline stage raised an error, used to annotate fatal diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    StatsParsing,
    GrainGeneration,
    Packing,
    Voxelize,
    OrientationAssignment,
    Matcher,
    GridWrite,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::StatsParsing => "stats-parsing",
            Stage::GrainGeneration => "grain-generation",
            Stage::Packing => "packing",
            Stage::Voxelize => "voxelize",
            Stage::OrientationAssignment => "orientation-assignment",
            Stage::Matcher => "matcher",
            Stage::GridWrite => "grid-write",
        };
        f.write_str(name)
    }
}

/// Top-level error type for the synthesis pipeline.
///
/// `Numeric` variants are only ever constructed by tests or diagnostics —
/// in production code numeric degeneracies (empty bins, zero variance,
/// out-of-domain `acos` arguments) are clamped in place rather than
/// propagated, per §7.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Malformed or incomplete statistics file. Abort before any mutation.
    #[error("input error while reading {path}: {reason}")]
    Input { path: String, reason: String },

    /// Inconsistent configuration (e.g. `min_diameter > max_diameter`, unknown
    /// shape or crystal class). Abort before the RNG is seeded.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A numeric degeneracy that was *not* clamped in place and surfaced
    /// instead (should only occur on a programming error in a clamp site).
    #[error("numeric error in {stage}: {reason}")]
    Numeric { stage: Stage, reason: String },

    /// Two views of the same mutable state disagree (e.g. a voxel's coverage
    /// list and a grain's membership list). Fatal — indicates a correctness
    /// bug in the stage named.
    #[error("internal invariant violated in {stage}: {reason}")]
    InvariantViolation { stage: Stage, reason: String },

    /// Wraps a filesystem I/O failure while reading or writing pipeline data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    pub fn input(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SynthesisError::Input {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        SynthesisError::Configuration(reason.into())
    }

    pub fn invariant(stage: Stage, reason: impl Into<String>) -> Self {
        SynthesisError::InvariantViolation {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
