//! Disorientation angle between two crystallographic orientations under
//! cubic or hexagonal crystal symmetry (C11, §4.5).

use microgen_spec::{CrystalStructure, Quaternion};

fn misorientation_quaternion(from: Quaternion, to: Quaternion) -> Quaternion {
    to.mul(&from.conjugate()).normalize()
}

/// Unit rotation axis of a quaternion (undefined, returned as `[0,0,1]`, at
/// the identity).
pub fn axis_from_quaternion(q: Quaternion) -> [f64; 3] {
    let sin_half = (1.0 - q.w * q.w).max(0.0).sqrt();
    if sin_half < 1e-9 {
        [0.0, 0.0, 1.0]
    } else {
        [q.x / sin_half, q.y / sin_half, q.z / sin_half]
    }
}

/// Cubic (m-3m, 24 proper rotations) disorientation angle, in degrees.
///
/// Uses the standard shortcut for cubic-cubic disorientation: sort the
/// misorientation quaternion's `|components|` descending into `(a, b, c, d)`
/// and take `cos(theta/2) = max(a, (a+b+c+d)/2, (a+b)/sqrt(2))`. This
/// reaches the same fundamental-zone angle as looping over all 24 symmetry
/// quaternions, without the loop.
fn cubic_disorientation_angle(m: Quaternion) -> f64 {
    let mut comps = [m.x.abs(), m.y.abs(), m.z.abs(), m.w.abs()];
    comps.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let (a, b, c, d) = (comps[0], comps[1], comps[2], comps[3]);
    let candidates = [a, (a + b + c + d) / 2.0, (a + b) / std::f64::consts::SQRT_2];
    let cos_half = candidates.iter().cloned().fold(f64::MIN, f64::max).min(1.0);
    2.0 * cos_half.acos().to_degrees()
}

/// The 12 proper rotations of the hexagonal (622) point group: six rotations
/// about the c-axis at 60-degree steps, and six 2-fold rotations about the
/// in-plane axes spaced 30 degrees apart (0, 30, 60, 90, 120, 150 degrees
/// from the x-axis — a 2-fold axis and its antiparallel twin give the same
/// rotation, so 60-degree spacing here would collapse to only 3 distinct
/// operators).
fn hexagonal_symmetry_operators() -> [Quaternion; 12] {
    let mut ops = [Quaternion::IDENTITY; 12];
    for k in 0..6 {
        let half = (k as f64 * 30.0).to_radians();
        ops[k] = Quaternion::new(0.0, 0.0, half.sin(), half.cos());
    }
    for k in 0..6 {
        let angle = (k as f64 * 30.0).to_radians();
        ops[6 + k] = Quaternion::new(angle.cos(), angle.sin(), 0.0, 0.0);
    }
    ops
}

fn hexagonal_disorientation_angle(m: Quaternion) -> f64 {
    let ops = hexagonal_symmetry_operators();
    let mut best_cos_half = 0.0f64;
    for si in &ops {
        for sj in &ops {
            let candidate = si.mul(&m).mul(sj);
            best_cos_half = best_cos_half.max(candidate.w.abs());
        }
    }
    2.0 * best_cos_half.min(1.0).acos().to_degrees()
}

/// Disorientation angle between two orientations under the given crystal
/// symmetry, in degrees, within `[0, 180]` (§3 Misorientation).
pub fn disorientation_degrees(from: Quaternion, to: Quaternion, crystal_structure: CrystalStructure) -> f64 {
    let m = misorientation_quaternion(from, to);
    match crystal_structure {
        CrystalStructure::Cubic => cubic_disorientation_angle(m),
        CrystalStructure::Hexagonal => hexagonal_disorientation_angle(m),
    }
}
