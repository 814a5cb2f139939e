//! Crystallographic orientation assignment (C10, §4.5): sample each grain's
//! orientation from the target ODF, convert to a quaternion, and accumulate
//! a running simulated ODF over the non-surface grains for the matcher.

use microgen_spec::histograms::sample_prefix_sum;
use microgen_spec::{EulerAngles, Grain, Quaternion, TargetHistograms};

use crate::rng::DeterministicRng;

/// Bunge Euler triple -> unit quaternion `(x, y, z, w)`, using the same
/// half-angle convention as the Z-X-Z rotation matrix in `geometry`
/// (Rowenhorst et al. convention).
pub fn euler_to_quaternion(e: EulerAngles) -> Quaternion {
    let (s_sum, c_sum) = ((e.phi1 + e.phi2) / 2.0).sin_cos();
    let (s_diff, c_diff) = ((e.phi1 - e.phi2) / 2.0).sin_cos();
    let (s_big, c_big) = (e.capital_phi / 2.0).sin_cos();

    Quaternion::new(s_big * c_diff, s_big * s_diff, c_big * s_sum, c_big * c_sum).normalize()
}

/// Running histogram over the ODF's bins, accumulated one grain at a time
/// (§4.5 "simODF").
#[derive(Debug, Clone)]
pub struct SimOdf {
    dims: (usize, usize, usize),
    counts: Vec<f64>,
    total: f64,
}

impl SimOdf {
    pub fn new(dims: (usize, usize, usize)) -> Self {
        SimOdf {
            dims,
            counts: vec![0.0; dims.0 * dims.1 * dims.2],
            total: 0.0,
        }
    }

    pub fn accumulate(&mut self, bin: usize, weight: f64) {
        self.counts[bin] += weight;
        self.total += weight;
    }

    pub fn remove(&mut self, bin: usize, weight: f64) {
        self.counts[bin] -= weight;
        self.total -= weight;
    }

    /// Normalized density, comparable to [`microgen_spec::OdfTable::density`].
    pub fn density(&self) -> Vec<f64> {
        if self.total <= 0.0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts.iter().map(|c| c / self.total).collect()
    }

    pub fn bin_count(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }
}

/// Running histogram over the 36-bin MDF (§4.5 "simMDF").
#[derive(Debug, Clone, Copy)]
pub struct SimMdf {
    pub bins: [f64; 36],
    pub total: f64,
}

impl SimMdf {
    pub fn new() -> Self {
        SimMdf {
            bins: [0.0; 36],
            total: 0.0,
        }
    }

    pub fn accumulate(&mut self, angle_degrees: f64, weight: f64) {
        let bin = microgen_spec::histograms::MdfTable::bin_for_angle(angle_degrees);
        self.bins[bin] += weight;
        self.total += weight;
    }

    pub fn remove(&mut self, angle_degrees: f64, weight: f64) {
        let bin = microgen_spec::histograms::MdfTable::bin_for_angle(angle_degrees);
        self.bins[bin] -= weight;
        self.total -= weight;
    }

    pub fn density(&self) -> [f64; 36] {
        if self.total <= 0.0 {
            return [0.0; 36];
        }
        let mut out = [0.0; 36];
        for (o, b) in out.iter_mut().zip(self.bins.iter()) {
            *o = b / self.total;
        }
        out
    }
}

impl Default for SimMdf {
    fn default() -> Self {
        SimMdf::new()
    }
}

/// Sample a crystallographic Euler triple from the target ODF, jittered
/// uniformly within the sampled bin cell (§4.5, mirrors the axis-ODF
/// sampling used for shape orientation in `catalog`).
fn sample_crystal_euler(hist: &TargetHistograms, rng: &mut DeterministicRng) -> (EulerAngles, usize) {
    let prefix = hist.odf.prefix_sum();
    let total = *prefix.last().unwrap_or(&1.0);
    let u = rng.uniform() * total;
    let bin = sample_prefix_sum(&prefix, u);
    let (i, j, k) = hist.odf.flat_to_ijk(bin);

    let (d0, d1, d2) = hist.odf.dims;
    let cell_phi1 = 2.0 * std::f64::consts::PI / d0 as f64;
    let cell_capital_phi = std::f64::consts::PI / d1 as f64;
    let cell_phi2 = 2.0 * std::f64::consts::PI / d2 as f64;

    let euler = EulerAngles::new(
        (i as f64 + rng.uniform()) * cell_phi1,
        (j as f64 + rng.uniform()) * cell_capital_phi,
        (k as f64 + rng.uniform()) * cell_phi2,
    );
    (euler, bin)
}

/// A grain's weight in the simulated ODF/MDF: the fraction of the periodic
/// box's voxels it owns (§4.5, `numVoxels*dx*dy*dz/totalVolume`). Every
/// voxel in the fine grid shares the same pitch, so the volume ratio
/// reduces to a voxel-count ratio.
pub(crate) fn voxel_fraction(grain: &Grain, total_voxels: u64) -> f64 {
    if total_voxels == 0 {
        0.0
    } else {
        grain.num_voxels as f64 / total_voxels as f64
    }
}

/// Assign every grain a crystallographic orientation sampled from the
/// target ODF, accumulating a running simulated ODF over the non-surface
/// grains (§4.5: surface grains are excluded from the texture target since
/// their neighborhood is incomplete at the box boundary). Each grain's
/// contribution is weighted by its share of the fine grid's voxels, not
/// counted flatly -- a grain spanning 10x the voxels of its neighbor should
/// move the simulated ODF 10x as much.
pub fn assign_orientations(
    grains: &mut [Grain],
    hist: &TargetHistograms,
    total_voxels: u64,
    rng: &mut DeterministicRng,
) -> SimOdf {
    let mut sim_odf = SimOdf::new(hist.odf.dims);
    for grain in grains.iter_mut() {
        let (euler, bin) = sample_crystal_euler(hist, rng);
        grain.crystal_euler = euler;
        grain.orientation_quat = euler_to_quaternion(euler);
        if !grain.surface {
            sim_odf.accumulate(bin, voxel_fraction(grain, total_voxels));
        }
    }
    sim_odf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_from_identity_euler_is_identity() {
        let q = euler_to_quaternion(EulerAngles::default());
        assert!((q.w - 1.0).abs() < 1e-9);
        assert!(q.x.abs() < 1e-9 && q.y.abs() < 1e-9 && q.z.abs() < 1e-9);
    }

    #[test]
    fn quaternion_is_always_unit_length() {
        let q = euler_to_quaternion(EulerAngles::new(0.4, 1.1, 2.7));
        let n = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
        assert!((n - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sim_odf_accumulates_only_interior_grains() {
        use microgen_spec::histograms::{OdfTable, SizeDistribution, BetaTable, NeighborTable, AxisOdfTable, MdfTable, MicrotextureTable};
        let hist = TargetHistograms {
            size_distribution: SizeDistribution { mean_log_diameter: 0.0, stdev_log_diameter: 1.0, target_count: 1.0 },
            b_over_a: BetaTable::default(),
            c_over_a: BetaTable::default(),
            neighbors: NeighborTable::default(),
            omega3: BetaTable::default(),
            axis_odf: AxisOdfTable::uniform(4),
            odf: OdfTable::uniform((4, 4, 4)),
            mdf: MdfTable::zeroed(),
            microtexture: MicrotextureTable { bins: [0.0; 10] },
        };
        let mut rng = DeterministicRng::new(9);
        let mut grains = vec![
            Grain::new_candidate(1.0, 1.0, 1.0, 1.0, EulerAngles::default(), 1.0, [0.0; 3]),
            Grain::new_candidate(1.0, 1.0, 1.0, 1.0, EulerAngles::default(), 1.0, [0.0; 3]),
        ];
        grains[0].num_voxels = 30;
        grains[1].num_voxels = 70;
        grains[1].surface = true;
        let sim = assign_orientations(&mut grains, &hist, 100, &mut rng);
        assert!((sim.total - 0.3).abs() < 1e-9, "expected only grain 0's voxel fraction, got {}", sim.total);
    }

    #[test]
    fn voxel_fraction_of_empty_box_is_zero() {
        let grain = Grain::new_candidate(1.0, 1.0, 1.0, 1.0, EulerAngles::default(), 1.0, [0.0; 3]);
        assert_eq!(voxel_fraction(&grain, 0), 0.0);
    }
}
