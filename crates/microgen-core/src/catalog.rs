//! Grain catalog and candidate pool generation (C3, §4.3 setup).

use microgen_spec::{EulerAngles, Grain, ShapeClass, TargetHistograms};
use rayon::prelude::*;

use crate::geometry::{self, GridDims, Pitch, SampleBox};
use crate::rng::DeterministicRng;

/// Owns the full candidate array and its mutable packing state (C3).
pub struct GrainCatalog {
    pub grains: Vec<Grain>,
}

impl GrainCatalog {
    pub fn active_count(&self) -> usize {
        self.grains.iter().filter(|g| g.active).count()
    }
}

/// Sample one candidate's diameter from the target log-normal distribution,
/// clamped at +/-2 standard deviations (§4.3 setup).
fn sample_diameter(hist: &TargetHistograms, rng: &mut DeterministicRng) -> f64 {
    let mu = hist.size_distribution.mean_log_diameter;
    let sigma = hist.size_distribution.stdev_log_diameter;
    let log_d = rng.normal(mu, sigma).clamp(mu - 2.0 * sigma, mu + 2.0 * sigma);
    log_d.exp()
}

fn nearest_diameter_bin(diameter: f64) -> i32 {
    diameter.round() as i32
}

/// Sample `(b/a, c/a, omega3)` conditioned on the candidate's integer
/// diameter bin, falling back to `(1.0, 1.0, 1.0)` when the target tables
/// have no row for that bin (an empty-bin degeneracy, guarded per §7).
fn sample_shape_params(
    hist: &TargetHistograms,
    diameter: f64,
    rng: &mut DeterministicRng,
) -> (f64, f64, f64) {
    let bin = nearest_diameter_bin(diameter);
    let b_over_a = hist
        .b_over_a
        .row_for_diameter(bin)
        .map(|row| rng.beta(row.alpha, row.beta))
        .unwrap_or(1.0);
    let c_over_a = hist
        .c_over_a
        .row_for_diameter(bin)
        .map(|row| rng.beta(row.alpha, row.beta))
        .unwrap_or(b_over_a);
    let omega3 = hist
        .omega3
        .row_for_diameter(bin)
        .map(|row| rng.beta(row.alpha, row.beta))
        .unwrap_or(1.0);
    (b_over_a, c_over_a.min(b_over_a), omega3)
}

/// Sample an axis-Euler triple from the axis-ODF prefix sum, jittered
/// uniformly within one 5-degree-scale bin cell (§4.3 setup).
fn sample_axis_euler(hist: &TargetHistograms, rng: &mut DeterministicRng) -> EulerAngles {
    let total = *hist.axis_odf.prefix_sum.last().unwrap_or(&1.0);
    let u = rng.uniform() * total;
    let bin = hist.axis_odf.sample_bin(u);
    let (i, j, k) = hist.axis_odf.bin_to_ijk(bin);

    let cell = 2.0 * std::f64::consts::PI / hist.axis_odf.bins_per_axis as f64;
    let jitter = |base: usize| (base as f64 + rng.uniform()) * cell;
    EulerAngles::new(jitter(i), jitter(j), jitter(k))
}

/// Generate the oversampled candidate pool (§4.3 setup: `25*N` candidates by
/// default). Centroids are not yet assigned — call [`place_candidates`]
/// after the sample box is known.
pub fn generate_candidate_pool(
    hist: &TargetHistograms,
    pool_size: usize,
    rng: &mut DeterministicRng,
) -> Vec<Grain> {
    let mut grains = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        let diameter = sample_diameter(hist, rng);
        let volume = (4.0 / 3.0) * std::f64::consts::PI * (diameter / 2.0).powi(3);
        let (b_over_a, c_over_a, omega3) = sample_shape_params(hist, diameter, rng);
        let axis_euler = sample_axis_euler(hist, rng);
        grains.push(Grain::new_candidate(
            volume, diameter, b_over_a, c_over_a, axis_euler, omega3, [0.0, 0.0, 0.0],
        ));
    }
    grains
}

/// Nominal total volume: the candidate pool's total volume scaled down to
/// the target grain count (§4.3 setup: `N / (25*N)`).
pub fn nominal_total_volume(grains: &[Grain], num_grains: usize) -> f64 {
    let pool_total: f64 = grains.iter().map(|g| g.volume).sum();
    pool_total * num_grains as f64 / grains.len().max(1) as f64
}

/// Derive the coarse-resolution sample box (§4.3 setup: `4x` the final voxel
/// pitch, sized so the box volume equals the nominal total volume). The box
/// is kept cubic; callers needing a non-cubic aspect ratio can post-process.
pub fn coarse_sample_box(nominal_volume: f64, fine_pitch: Pitch, coarse_factor: u32) -> SampleBox {
    let coarse_pitch = Pitch {
        dx: fine_pitch.dx * coarse_factor as f64,
        dy: fine_pitch.dy * coarse_factor as f64,
        dz: fine_pitch.dz * coarse_factor as f64,
    };
    let side = nominal_volume.cbrt();
    let nx = (side / coarse_pitch.dx).round().max(1.0) as u32;
    let ny = (side / coarse_pitch.dy).round().max(1.0) as u32;
    let nz = (side / coarse_pitch.dz).round().max(1.0) as u32;
    SampleBox {
        dims: GridDims { nx, ny, nz },
        pitch: coarse_pitch,
    }
}

/// The corresponding fine-resolution box (§4.4: "restore the true
/// resolution (divide by 4)").
pub fn fine_sample_box(coarse: SampleBox, coarse_factor: u32) -> SampleBox {
    SampleBox {
        dims: GridDims {
            nx: coarse.dims.nx * coarse_factor,
            ny: coarse.dims.ny * coarse_factor,
            nz: coarse.dims.nz * coarse_factor,
        },
        pitch: Pitch {
            dx: coarse.pitch.dx / coarse_factor as f64,
            dy: coarse.pitch.dy / coarse_factor as f64,
            dz: coarse.pitch.dz / coarse_factor as f64,
        },
    }
}

/// Assign each candidate a uniformly random centroid inside the box (§4.3
/// setup).
pub fn place_candidates(grains: &mut [Grain], box_: SampleBox, rng: &mut DeterministicRng) {
    for g in grains.iter_mut() {
        g.centroid = [
            rng.uniform() * box_.size_x(),
            rng.uniform() * box_.size_y(),
            rng.uniform() * box_.size_z(),
        ];
    }
}

/// Compute every candidate's ellipsoid voxel list at the given resolution
/// (§4.2). Independent per grain, so it runs opportunistically in parallel
/// (§5) — each candidate only reads its own fields, no RNG draws occur in
/// this step, so there is no shared-stream hazard.
pub fn compute_candidate_voxel_lists(
    grains: &mut [Grain],
    shape_class: ShapeClass,
    box_: SampleBox,
) {
    let voxel_lists: Vec<(Vec<u64>, Vec<f64>)> = grains
        .par_iter()
        .map(|g| {
            let (_, r2, r3) = g.aspect_ratios();
            let a = geometry::bounding_semi_axis(g.volume, r2, r3, shape_class, g.shape_factor);
            let semi_axes = (a, a * r2, a * r3);
            let inside = geometry::enumerate_ellipsoid_voxels(
                semi_axes,
                shape_class,
                g.shape_factor,
                g.axis_euler,
                g.centroid,
                box_,
            );
            let voxels = inside
                .iter()
                .map(|v| box_.dims.flat_index(v.x, v.y, v.z))
                .collect();
            let values = inside.iter().map(|v| v.inside_value).collect();
            (voxels, values)
        })
        .collect();

    for (grain, (voxels, values)) in grains.iter_mut().zip(voxel_lists) {
        grain.voxels = voxels;
        grain.inside_values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microgen_spec::histograms::{AxisOdfTable, BetaTable, MdfTable, MicrotextureTable, NeighborTable, OdfTable, SizeDistribution};

    fn trivial_histograms() -> TargetHistograms {
        TargetHistograms {
            size_distribution: SizeDistribution {
                mean_log_diameter: 10.0f64.ln(),
                stdev_log_diameter: 0.01,
                target_count: 1.0,
            },
            b_over_a: BetaTable::default(),
            c_over_a: BetaTable::default(),
            neighbors: NeighborTable::default(),
            omega3: BetaTable::default(),
            axis_odf: AxisOdfTable::uniform(18),
            odf: OdfTable::uniform((18, 18, 18)),
            mdf: MdfTable::zeroed(),
            microtexture: MicrotextureTable { bins: [0.0; 10] },
        }
    }

    #[test]
    fn candidate_pool_has_requested_size() {
        let hist = trivial_histograms();
        let mut rng = DeterministicRng::new(1);
        let pool = generate_candidate_pool(&hist, 25, &mut rng);
        assert_eq!(pool.len(), 25);
        for g in &pool {
            assert!(g.volume > 0.0);
            assert!(g.equivalent_diameter > 0.0);
        }
    }

    #[test]
    fn nominal_total_volume_scales_down_from_pool() {
        let hist = trivial_histograms();
        let mut rng = DeterministicRng::new(2);
        let pool = generate_candidate_pool(&hist, 250, &mut rng);
        let nominal = nominal_total_volume(&pool, 10);
        let pool_total: f64 = pool.iter().map(|g| g.volume).sum();
        assert!((nominal - pool_total / 25.0).abs() < 1e-6);
    }

    #[test]
    fn fine_and_coarse_boxes_are_mutually_consistent() {
        let coarse = coarse_sample_box(1_000_000.0, Pitch { dx: 1.0, dy: 1.0, dz: 1.0 }, 4);
        let fine = fine_sample_box(coarse, 4);
        assert_eq!(fine.dims.nx, coarse.dims.nx * 4);
        assert!((fine.pitch.dx - 1.0).abs() < 1e-9);
    }

    #[test]
    fn candidate_voxel_lists_are_nonempty_for_reasonable_box() {
        let hist = trivial_histograms();
        let mut rng = DeterministicRng::new(3);
        let mut pool = generate_candidate_pool(&hist, 5, &mut rng);
        let box_ = SampleBox {
            dims: GridDims { nx: 50, ny: 50, nz: 50 },
            pitch: Pitch { dx: 1.0, dy: 1.0, dz: 1.0 },
        };
        place_candidates(&mut pool, box_, &mut rng);
        compute_candidate_voxel_lists(&mut pool, ShapeClass::Ellipsoid, box_);
        assert!(pool.iter().all(|g| !g.voxels.is_empty()));
    }
}
