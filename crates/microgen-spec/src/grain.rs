//! The `Grain` record (§3) and the small value types it is built from.

use serde::{Deserialize, Serialize};

/// Index of a grain within the catalog. `0` is reserved for "unlabeled" in
/// the voxel grid, so the first real grain is always id `1`.
pub type GrainId = u32;

/// A Bunge (φ1, Φ, φ2) Euler triple, in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub phi1: f64,
    pub capital_phi: f64,
    pub phi2: f64,
}

impl EulerAngles {
    pub fn new(phi1: f64, capital_phi: f64, phi2: f64) -> Self {
        EulerAngles {
            phi1,
            capital_phi,
            phi2,
        }
    }
}

/// A unit quaternion `(x, y, z, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Quaternion { x, y, z, w }
    }

    pub fn conjugate(&self) -> Quaternion {
        Quaternion::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Hamilton product `self * other`.
    pub fn mul(&self, other: &Quaternion) -> Quaternion {
        Quaternion::new(
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        )
    }

    pub fn normalize(&self) -> Quaternion {
        let n = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if n <= f64::EPSILON {
            return Quaternion::IDENTITY;
        }
        Quaternion::new(self.x / n, self.y / n, self.z / n, self.w / n)
    }
}

/// A candidate or active grain (§3).
///
/// Intrinsic shape/orientation fields (everything up through `shape_factor`)
/// are set once at pool-generation time and never mutate. `active`,
/// `centroid`, the membership lists, and the neighbor-shell counters mutate
/// throughout packing (§4.3). `crystal_euler` / `orientation_quat` are set
/// during orientation assignment (§4.5) and mutate during matching (§4.5).
/// `neighbors`, `shared_areas`, `misorientations`, `surface`, and
/// `num_voxels` are filled in once, after gap fill and neighbor discovery
/// (§4.4, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grain {
    pub volume: f64,
    pub equivalent_diameter: f64,
    /// Aspect ratio `r2/r1`.
    pub aspect_b_over_a: f64,
    /// Aspect ratio `r3/r1`.
    pub aspect_c_over_a: f64,
    pub axis_euler: EulerAngles,
    pub shape_factor: f64,
    pub centroid: [f64; 3],
    pub active: bool,

    /// Flat voxel indices this grain currently occupies.
    #[serde(skip)]
    pub voxels: Vec<u64>,
    /// Inside-function value for each entry of `voxels`, same order.
    #[serde(skip)]
    pub inside_values: Vec<f64>,

    /// Count of neighbors at shells 0..3 (§3, §4.3).
    #[serde(skip)]
    pub neighbor_shell_counts: [u32; 4],
    /// Grain ids occupying each shell (§4.3, §4.6 "neighbor discovery").
    #[serde(skip)]
    pub neighbor_shells: [Vec<GrainId>; 4],

    pub crystal_euler: EulerAngles,
    pub orientation_quat: Quaternion,

    /// Final neighbor list after gap fill + neighbor discovery (§4.6).
    pub neighbors: Vec<GrainId>,
    /// Shared surface area per entry of `neighbors`, same order.
    pub shared_areas: Vec<f64>,
    /// Disorientation angle (degrees) per entry of `neighbors`, same order.
    pub misorientations: Vec<f64>,
    pub surface: bool,
    pub num_voxels: u64,
}

impl Grain {
    /// A zeroed candidate with the given intrinsic shape parameters; all
    /// mutable / post-processing fields start empty.
    pub fn new_candidate(
        volume: f64,
        equivalent_diameter: f64,
        aspect_b_over_a: f64,
        aspect_c_over_a: f64,
        axis_euler: EulerAngles,
        shape_factor: f64,
        centroid: [f64; 3],
    ) -> Self {
        Grain {
            volume,
            equivalent_diameter,
            aspect_b_over_a,
            aspect_c_over_a,
            axis_euler,
            shape_factor,
            centroid,
            active: false,
            voxels: Vec::new(),
            inside_values: Vec::new(),
            neighbor_shell_counts: [0; 4],
            neighbor_shells: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            crystal_euler: EulerAngles::default(),
            orientation_quat: Quaternion::IDENTITY,
            neighbors: Vec::new(),
            shared_areas: Vec::new(),
            misorientations: Vec::new(),
            surface: false,
            num_voxels: 0,
        }
    }

    /// Principal semi-axis ratios `(1, r2/r1, r3/r1)`.
    pub fn aspect_ratios(&self) -> (f64, f64, f64) {
        (1.0, self.aspect_b_over_a, self.aspect_c_over_a)
    }
}
