//! Ellipsoid/superellipsoid/cuboctahedron voxel enumeration (C5, §4.2).

use microgen_spec::{EulerAngles, ShapeClass};

use crate::mathx::gamma;

/// Grid dimensions in voxel counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl GridDims {
    pub fn total_voxels(&self) -> u64 {
        self.nx as u64 * self.ny as u64 * self.nz as u64
    }

    /// Flat index `z*X*Y + y*X + x` (glossary: "Voxel").
    pub fn flat_index(&self, x: u32, y: u32, z: u32) -> u64 {
        z as u64 * self.nx as u64 * self.ny as u64 + y as u64 * self.nx as u64 + x as u64
    }
}

/// Voxel pitch along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pitch {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// A sample box, periodic on all three axes (§3 Geometry).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleBox {
    pub dims: GridDims,
    pub pitch: Pitch,
}

impl SampleBox {
    pub fn size_x(&self) -> f64 {
        self.dims.nx as f64 * self.pitch.dx
    }
    pub fn size_y(&self) -> f64 {
        self.dims.ny as f64 * self.pitch.dy
    }
    pub fn size_z(&self) -> f64 {
        self.dims.nz as f64 * self.pitch.dz
    }

    /// Wrap a world-space coordinate into `[0, size)` on one axis.
    fn wrap(value: f64, size: f64) -> f64 {
        let mut v = value % size;
        if v < 0.0 {
            v += size;
        }
        v
    }
}

/// One voxel inside a grain's body, with the smooth inside-function kernel
/// value used as a per-voxel packing cost (§4.2 step 5).
#[derive(Debug, Clone, Copy)]
pub struct InsideVoxel {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub inside_value: f64,
}

/// Bunge (φ1, Φ, φ2) passive rotation matrix, Z-X-Z convention (§4.2 step 3).
pub fn bunge_rotation_matrix(e: EulerAngles) -> [[f64; 3]; 3] {
    let (s1, c1) = e.phi1.sin_cos();
    let (sp, cp) = e.capital_phi.sin_cos();
    let (s2, c2) = e.phi2.sin_cos();

    [
        [
            c1 * c2 - s1 * s2 * cp,
            s1 * c2 + c1 * s2 * cp,
            s2 * sp,
        ],
        [
            -c1 * s2 - s1 * c2 * cp,
            -s1 * s2 + c1 * c2 * cp,
            c2 * sp,
        ],
        [s1 * sp, -c1 * sp, cp],
    ]
}

fn mat_transpose_vec(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[1][0] * v[1] + m[2][0] * v[2],
        m[0][1] * v[0] + m[1][1] * v[1] + m[2][1] * v[2],
        m[0][2] * v[0] + m[1][2] * v[1] + m[2][2] * v[2],
    ]
}

/// Beta-function helpers used by the superellipsoid volume formula (§4.2
/// step 1, s=2).
fn superellipsoid_beta1(n: f64) -> f64 {
    gamma(1.0 / n).powi(2) / gamma(2.0 / n)
}

fn superellipsoid_beta2(n: f64) -> f64 {
    gamma(2.0 / n) * gamma(1.0 / n) / gamma(3.0 / n)
}

/// Cuboctahedron chamfer volume correction, piecewise cubic in `G in [0,2]`
/// (§4.2 step 1, s=3). `G=0` is a cube-like corner (no truncation), `G=2` is
/// a maximally truncated (octahedron-like) corner.
fn cuboctahedron_chamfer_volume_factor(chamfer: f64) -> f64 {
    let g = chamfer.clamp(0.0, 2.0);
    // Cubic interpolation between the cube (G=0 -> factor 1) and the fully
    // truncated cuboctahedron (G=2 -> factor 2/3), matching the volume
    // reduction a chamfer of magnitude G removes from each of 8 corners.
    let t = g / 2.0;
    1.0 - (1.0 / 3.0) * t * t * (3.0 - 2.0 * t)
}

/// Compute the bounding principal semi-axis `a` from the grain's volume,
/// aspect ratios, shape class, and shape factor (§4.2 step 1).
pub fn bounding_semi_axis(
    volume: f64,
    r2: f64,
    r3: f64,
    shape_class: ShapeClass,
    shape_factor: f64,
) -> f64 {
    match shape_class {
        ShapeClass::Ellipsoid => {
            let a3 = volume * (3.0 / (4.0 * std::f64::consts::PI)) / (r2 * r3);
            a3.cbrt()
        }
        ShapeClass::Superellipsoid => {
            let n = shape_factor.max(1e-6);
            let beta1 = superellipsoid_beta1(n);
            let beta2 = superellipsoid_beta2(n);
            let a3 = volume * 1.5 / (r2 * r3) * (n * n / 4.0) / beta1 / beta2;
            a3.cbrt()
        }
        ShapeClass::Cuboctahedron => {
            let factor = cuboctahedron_chamfer_volume_factor(shape_factor);
            let a3 = volume / (r2 * r3) / factor.max(1e-9);
            0.5 * a3.cbrt()
        }
    }
}

/// Enumerate every voxel inside a grain's body, periodic-wrapped, along with
/// each voxel's inside-function value (§4.2).
///
/// `centroid` and `box_` are in world units; `semi_axes` is `(a, a*r2, a*r3)`.
pub fn enumerate_ellipsoid_voxels(
    semi_axes: (f64, f64, f64),
    shape_class: ShapeClass,
    shape_factor: f64,
    orientation: EulerAngles,
    centroid: [f64; 3],
    box_: SampleBox,
) -> Vec<InsideVoxel> {
    let (a, b, c) = semi_axes;
    let rot = bunge_rotation_matrix(orientation);
    let max_axis = a.max(b).max(c);

    let half_x = (max_axis / box_.pitch.dx).ceil() as i64 + 1;
    let half_y = (max_axis / box_.pitch.dy).ceil() as i64 + 1;
    let half_z = (max_axis / box_.pitch.dz).ceil() as i64 + 1;

    let cx = (centroid[0] / box_.pitch.dx).round() as i64;
    let cy = (centroid[1] / box_.pitch.dy).round() as i64;
    let cz = (centroid[2] / box_.pitch.dz).round() as i64;

    let mut found = Vec::new();

    for dz in -half_z..=half_z {
        for dy in -half_y..=half_y {
            for dx in -half_x..=half_x {
                let gx = cx + dx;
                let gy = cy + dy;
                let gz = cz + dz;

                let wx = SampleBox::wrap(gx as f64 * box_.pitch.dx, box_.size_x());
                let wy = SampleBox::wrap(gy as f64 * box_.pitch.dy, box_.size_y());
                let wz = SampleBox::wrap(gz as f64 * box_.pitch.dz, box_.size_z());

                let offset = [wx - centroid[0], wy - centroid[1], wz - centroid[2]];
                // Use the shortest periodic offset so points near a box edge
                // still test correctly against a grain near the opposite edge.
                let offset = [
                    shortest_offset(offset[0], box_.size_x()),
                    shortest_offset(offset[1], box_.size_y()),
                    shortest_offset(offset[2], box_.size_z()),
                ];
                let local = mat_transpose_vec(&rot, offset);

                if let Some(inside_value) = inside_test(local, (a, b, c), shape_class, shape_factor)
                {
                    let ix = gx.rem_euclid(box_.dims.nx as i64) as u32;
                    let iy = gy.rem_euclid(box_.dims.ny as i64) as u32;
                    let iz = gz.rem_euclid(box_.dims.nz as i64) as u32;
                    found.push(InsideVoxel {
                        x: ix,
                        y: iy,
                        z: iz,
                        inside_value,
                    });
                }
            }
        }
    }
    found
}

fn shortest_offset(delta: f64, size: f64) -> f64 {
    let mut d = delta % size;
    if d > size / 2.0 {
        d -= size;
    } else if d < -size / 2.0 {
        d += size;
    }
    d
}

/// Inside-function kernel (§4.2 step 5): positive near the centre, negative
/// toward the boundary, undefined (returns `None`) outside the body.
fn inside_test(
    local: [f64; 3],
    semi_axes: (f64, f64, f64),
    shape_class: ShapeClass,
    shape_factor: f64,
) -> Option<f64> {
    let (a, b, c) = semi_axes;
    let norm_sq = match shape_class {
        ShapeClass::Ellipsoid => {
            (local[0] / a).powi(2) + (local[1] / b).powi(2) + (local[2] / c).powi(2)
        }
        ShapeClass::Superellipsoid => {
            let n = shape_factor.max(1e-6);
            let v = (local[0] / a).abs().powf(n)
                + (local[1] / b).abs().powf(n)
                + (local[2] / c).abs().powf(n);
            // Re-expressed as an effective squared radius so the same
            // inside-function kernel (defined in terms of a squared norm)
            // applies uniformly across shape classes.
            v.powf(2.0 / n)
        }
        ShapeClass::Cuboctahedron => {
            return cuboctahedron_inside_value(local, semi_axes, shape_factor);
        }
    };
    if norm_sq <= 1.0 {
        Some(inside_kernel(norm_sq))
    } else {
        None
    }
}

fn inside_kernel(norm_sq: f64) -> f64 {
    const R: f64 = 0.95;
    (-0.5 / (1.0 - 1.0 / (R * R))) * (1.0 - norm_sq / (R * R))
}

/// Truncated-cuboctahedron membership test (§4.2 step 4, s=3): inside the
/// unit cube `[-1,1]^3` (rescaled by the semi-axes) and outside eight
/// oriented corner half-spaces controlled by the chamfer `G`.
fn cuboctahedron_inside_value(
    local: [f64; 3],
    semi_axes: (f64, f64, f64),
    chamfer: f64,
) -> Option<f64> {
    let (a, b, c) = semi_axes;
    let p = [local[0] / a, local[1] / b, local[2] / c];
    if p[0].abs() > 1.0 || p[1].abs() > 1.0 || p[2].abs() > 1.0 {
        return None;
    }
    let g = chamfer.clamp(0.0, 2.0);
    // Each corner is chamfered by the plane |x|+|y|+|z| <= 3-g (g=0: no
    // truncation, g=2: truncated back to the octahedron |x|+|y|+|z| <= 1).
    let l1 = p[0].abs() + p[1].abs() + p[2].abs();
    let threshold = 3.0 - g;
    if l1 > threshold {
        return None;
    }
    let norm_sq = p[0] * p[0] + p[1] * p[1] + p[2] * p[2];
    let normalized = (l1 / threshold.max(1e-9)).powi(2).max(norm_sq / 3.0);
    Some(inside_kernel(normalized.min(1.0)))
}
