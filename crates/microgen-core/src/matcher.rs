//! Crystallography matcher (C12, §4.5): a second stochastic optimizer that
//! reassigns per-grain crystallographic orientation to match the target ODF
//! and MDF, without touching position or shape.

use microgen_spec::{CrystalStructure, EulerAngles, Grain, RunConfig, TargetHistograms};
use tracing::debug;

use crate::misorientation::disorientation_degrees;
use crate::orientation::{euler_to_quaternion, voxel_fraction, SimMdf, SimOdf};
use crate::rng::DeterministicRng;

/// A neighbor pair's weight in the simulated MDF: its shared area as a
/// fraction of the total surface area across every grain pair (§4.5).
fn pair_weight(shared_area: f64, total_surface_area: f64) -> f64 {
    if total_surface_area <= 0.0 {
        0.0
    } else {
        shared_area / total_surface_area
    }
}

fn odf_bin_for(hist: &TargetHistograms, euler: EulerAngles) -> usize {
    let (d0, d1, d2) = hist.odf.dims;
    let wrap = |v: f64, period: f64| v.rem_euclid(period);
    let i = (wrap(euler.phi1, 2.0 * std::f64::consts::PI) / (2.0 * std::f64::consts::PI) * d0 as f64)
        .floor()
        .min(d0 as f64 - 1.0) as usize;
    let j = (wrap(euler.capital_phi, std::f64::consts::PI) / std::f64::consts::PI * d1 as f64)
        .floor()
        .min(d1 as f64 - 1.0) as usize;
    let k = (wrap(euler.phi2, 2.0 * std::f64::consts::PI) / (2.0 * std::f64::consts::PI) * d2 as f64)
        .floor()
        .min(d2 as f64 - 1.0) as usize;
    hist.odf.ijk_to_flat(i, j, k)
}

fn sample_new_euler(hist: &TargetHistograms, rng: &mut DeterministicRng) -> (EulerAngles, usize) {
    let prefix = hist.odf.prefix_sum();
    let total = *prefix.last().unwrap_or(&1.0);
    let u = rng.uniform() * total;
    let bin = microgen_spec::histograms::sample_prefix_sum(&prefix, u);
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

fn odf_error(sim: &SimOdf, target_density: &[f64]) -> f64 {
    sim.density()
        .iter()
        .zip(target_density)
        .map(|(s, t)| (s - t).powi(2))
        .sum()
}

fn mdf_error(sim: &SimMdf, target_density: &[f64; 36]) -> f64 {
    sim.density()
        .iter()
        .zip(target_density)
        .map(|(s, t)| (s - t).powi(2))
        .sum()
}

/// Replace grain `idx`'s crystallographic orientation with `(new_euler,
/// new_bin)`, updating the running ODF/MDF histograms in lockstep. Calling
/// this function again with the grain's *previous* `(euler, bin)` exactly
/// undoes the change — the trial loop uses this to roll back a rejected
/// move instead of maintaining separate undo bookkeeping.
fn apply_new_orientation(
    grains: &mut [Grain],
    sim_odf: &mut SimOdf,
    sim_mdf: &mut SimMdf,
    odf_bin_of: &mut [usize],
    idx: usize,
    new_euler: EulerAngles,
    new_bin: usize,
    crystal_structure: CrystalStructure,
    total_voxels: u64,
    total_surface_area: f64,
) {
    let old_quat = grains[idx].orientation_quat;
    let old_bin = odf_bin_of[idx];
    let new_quat = euler_to_quaternion(new_euler);
    let odf_weight = voxel_fraction(&grains[idx], total_voxels);

    if !grains[idx].surface {
        sim_odf.remove(old_bin, odf_weight);
        sim_odf.accumulate(new_bin, odf_weight);
    }

    let neighbors = grains[idx].neighbors.clone();
    let areas = grains[idx].shared_areas.clone();
    for (&neighbor_id, &area) in neighbors.iter().zip(areas.iter()) {
        let n_idx = neighbor_id as usize - 1;
        let neighbor_quat = grains[n_idx].orientation_quat;
        let old_angle = disorientation_degrees(old_quat, neighbor_quat, crystal_structure);
        let new_angle = disorientation_degrees(new_quat, neighbor_quat, crystal_structure);
        let weight = pair_weight(area, total_surface_area);
        sim_mdf.remove(old_angle, weight);
        sim_mdf.accumulate(new_angle, weight);
    }

    grains[idx].crystal_euler = new_euler;
    grains[idx].orientation_quat = new_quat;
    odf_bin_of[idx] = new_bin;
}

/// Swap the crystallographic orientations of grains `i` and `j`. Self-
/// inverse: applying it twice with the same `(i, j)` restores the original
/// state, including the MDF contributions of every pair touching either
/// grain except the `(i, j)` pair itself, whose disorientation is symmetric
/// under the swap and so never changes.
///
/// Position, shape, and neighbor bookkeeping stay with their original
/// grain -- only the orientation-carrying fields change hands. But each
/// grain keeps its own voxel-fraction weight, so when the two grains differ
/// in size this does move weight between ODF bins: bin `i`'s old occupant
/// leaves with its own weight and `j`'s orientation arrives carrying `j`'s
/// weight, and vice versa.
fn apply_exchange(
    grains: &mut [Grain],
    sim_odf: &mut SimOdf,
    sim_mdf: &mut SimMdf,
    odf_bin_of: &mut [usize],
    i: usize,
    j: usize,
    crystal_structure: CrystalStructure,
    total_voxels: u64,
    total_surface_area: f64,
) {
    let quat_i = grains[i].orientation_quat;
    let quat_j = grains[j].orientation_quat;
    let bin_i = odf_bin_of[i];
    let bin_j = odf_bin_of[j];
    let weight_i = voxel_fraction(&grains[i], total_voxels);
    let weight_j = voxel_fraction(&grains[j], total_voxels);

    if !grains[i].surface {
        sim_odf.remove(bin_i, weight_i);
        sim_odf.accumulate(bin_j, weight_i);
    }
    if !grains[j].surface {
        sim_odf.remove(bin_j, weight_j);
        sim_odf.accumulate(bin_i, weight_j);
    }

    let neighbors_i = grains[i].neighbors.clone();
    let areas_i = grains[i].shared_areas.clone();
    for (&neighbor_id, &area) in neighbors_i.iter().zip(areas_i.iter()) {
        let n_idx = neighbor_id as usize - 1;
        if n_idx == j {
            continue;
        }
        let neighbor_quat = grains[n_idx].orientation_quat;
        let old_angle = disorientation_degrees(quat_i, neighbor_quat, crystal_structure);
        let new_angle = disorientation_degrees(quat_j, neighbor_quat, crystal_structure);
        let weight = pair_weight(area, total_surface_area);
        sim_mdf.remove(old_angle, weight);
        sim_mdf.accumulate(new_angle, weight);
    }
    let neighbors_j = grains[j].neighbors.clone();
    let areas_j = grains[j].shared_areas.clone();
    for (&neighbor_id, &area) in neighbors_j.iter().zip(areas_j.iter()) {
        let n_idx = neighbor_id as usize - 1;
        if n_idx == i {
            continue;
        }
        let neighbor_quat = grains[n_idx].orientation_quat;
        let old_angle = disorientation_degrees(quat_j, neighbor_quat, crystal_structure);
        let new_angle = disorientation_degrees(quat_i, neighbor_quat, crystal_structure);
        let weight = pair_weight(area, total_surface_area);
        sim_mdf.remove(old_angle, weight);
        sim_mdf.accumulate(new_angle, weight);
    }

    let euler_i = grains[i].crystal_euler;
    let euler_j = grains[j].crystal_euler;
    grains[i].crystal_euler = euler_j;
    grains[i].orientation_quat = quat_j;
    grains[j].crystal_euler = euler_i;
    grains[j].orientation_quat = quat_i;
    odf_bin_of.swap(i, j);
}

/// Result of a matcher run (§8: scenario tests check the acceptance count
/// and whether the patience-based early stop fired).
#[derive(Debug, Clone, Copy)]
pub struct MatchOutcome {
    pub iterations_run: u64,
    pub accepted: u64,
    pub stopped_early: bool,
}

/// Run the crystallography matcher, mutating `grains`' orientations in
/// place (§4.5). `sim_odf` is the running histogram produced by
/// [`crate::orientation::assign_orientations`]. `total_voxels` is the fine
/// grid's voxel count, used for the same per-grain ODF weight as
/// `assign_orientations`.
pub fn match_crystallography(
    grains: &mut [Grain],
    hist: &TargetHistograms,
    crystal_structure: CrystalStructure,
    config: &RunConfig,
    mut sim_odf: SimOdf,
    total_voxels: u64,
    rng: &mut DeterministicRng,
) -> MatchOutcome {
    let mut sim_mdf = SimMdf::new();
    let mut odf_bin_of: Vec<usize> = grains
        .iter()
        .map(|g| odf_bin_for(hist, g.crystal_euler))
        .collect();

    // Every pair's shared area is stored symmetrically in both grains'
    // `shared_areas`, so summing every grain's list double-counts each pair.
    let total_surface_area: f64 =
        grains.iter().flat_map(|g| g.shared_areas.iter()).sum::<f64>() / 2.0;

    for (i, grain) in grains.iter().enumerate() {
        for (&neighbor_id, &area) in grain.neighbors.iter().zip(grain.shared_areas.iter()) {
            let j = neighbor_id as usize - 1;
            if j <= i {
                continue;
            }
            let angle = disorientation_degrees(grain.orientation_quat, grains[j].orientation_quat, crystal_structure);
            sim_mdf.accumulate(angle, pair_weight(area, total_surface_area));
        }
    }

    let target_odf_density = hist.odf.density.clone();
    let target_mdf_density = hist.mdf.bins;

    let mut accepted = 0u64;
    let mut rejections_in_a_row = 0u64;
    let mut iterations_run = 0u64;
    let mut stopped_early = false;

    for iter in 0..config.matcher_iterations {
        iterations_run = iter + 1;
        if rejections_in_a_row >= config.matcher_patience {
            stopped_early = true;
            break;
        }

        let old_odf_error = odf_error(&sim_odf, &target_odf_density);
        let old_mdf_error = mdf_error(&sim_mdf, &target_mdf_density);

        let use_exchange = grains.len() >= 2 && rng.uniform() < 0.5;

        if use_exchange {
            let i = rng.uniform_index(grains.len());
            let mut j = rng.uniform_index(grains.len());
            if j == i {
                j = (j + 1) % grains.len();
            }
            apply_exchange(
                grains,
                &mut sim_odf,
                &mut sim_mdf,
                &mut odf_bin_of,
                i,
                j,
                crystal_structure,
                total_voxels,
                total_surface_area,
            );

            let new_odf_error = odf_error(&sim_odf, &target_odf_density);
            let new_mdf_error = mdf_error(&sim_mdf, &target_mdf_density);
            let delta_odf = old_odf_error - new_odf_error;
            let delta_mdf = old_mdf_error - new_mdf_error;

            if 4.0 * delta_odf + 0.25 * delta_mdf > 0.0 {
                accepted += 1;
                rejections_in_a_row = 0;
            } else {
                apply_exchange(
                    grains,
                    &mut sim_odf,
                    &mut sim_mdf,
                    &mut odf_bin_of,
                    i,
                    j,
                    crystal_structure,
                    total_voxels,
                    total_surface_area,
                );
                rejections_in_a_row += 1;
            }
        } else {
            let idx = rng.uniform_index(grains.len());
            let old_euler = grains[idx].crystal_euler;
            let old_bin = odf_bin_of[idx];
            let (new_euler, new_bin) = sample_new_euler(hist, rng);

            apply_new_orientation(
                grains,
                &mut sim_odf,
                &mut sim_mdf,
                &mut odf_bin_of,
                idx,
                new_euler,
                new_bin,
                crystal_structure,
                total_voxels,
                total_surface_area,
            );

            let new_odf_error = odf_error(&sim_odf, &target_odf_density);
            let new_mdf_error = mdf_error(&sim_mdf, &target_mdf_density);
            let delta_odf = old_odf_error - new_odf_error;
            let delta_mdf = old_mdf_error - new_mdf_error;

            if 4.0 * delta_odf + 0.25 * delta_mdf > 0.0 {
                accepted += 1;
                rejections_in_a_row = 0;
            } else {
                apply_new_orientation(
                    grains,
                    &mut sim_odf,
                    &mut sim_mdf,
                    &mut odf_bin_of,
                    idx,
                    old_euler,
                    old_bin,
                    crystal_structure,
                    total_voxels,
                    total_surface_area,
                );
                rejections_in_a_row += 1;
            }
        }
    }

    debug!(iterations_run, accepted, stopped_early, "matcher finished");
    MatchOutcome {
        iterations_run,
        accepted,
        stopped_early,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microgen_spec::histograms::{AxisOdfTable, BetaTable, MdfTable, MicrotextureTable, NeighborTable, OdfTable, SizeDistribution};
    use microgen_spec::ShapeClass;

    fn hist_with_skewed_mdf() -> TargetHistograms {
        let mut mdf = MdfTable::zeroed();
        mdf.bins[0] = 1.0;
        TargetHistograms {
            size_distribution: SizeDistribution { mean_log_diameter: 0.0, stdev_log_diameter: 1.0, target_count: 1.0 },
            b_over_a: BetaTable::default(),
            c_over_a: BetaTable::default(),
            neighbors: NeighborTable::default(),
            omega3: BetaTable::default(),
            axis_odf: AxisOdfTable::uniform(4),
            odf: OdfTable::uniform((4, 4, 4)),
            mdf,
            microtexture: MicrotextureTable { bins: [0.0; 10] },
        }
    }

    fn two_neighboring_grains() -> Vec<Grain> {
        let mut a = Grain::new_candidate(1.0, 1.0, 1.0, 1.0, EulerAngles::default(), 1.0, [0.0; 3]);
        let mut b = Grain::new_candidate(1.0, 1.0, 1.0, 1.0, EulerAngles::default(), 1.0, [1.0; 3]);
        a.neighbors = vec![2];
        a.shared_areas = vec![1.0];
        a.num_voxels = 12;
        b.neighbors = vec![1];
        b.shared_areas = vec![1.0];
        b.num_voxels = 8;
        a.orientation_quat = microgen_spec::Quaternion::IDENTITY;
        b.orientation_quat = microgen_spec::Quaternion::IDENTITY;
        vec![a, b]
    }

    const TOTAL_VOXELS: u64 = 100;
    const TOTAL_SURFACE_AREA: f64 = 1.0;

    #[test]
    fn matcher_runs_within_iteration_budget_and_reports_outcome() {
        let hist = hist_with_skewed_mdf();
        let mut grains = two_neighboring_grains();
        let mut config = RunConfig::new(
            2,
            ShapeClass::Ellipsoid,
            CrystalStructure::Cubic,
            microgen_spec::Resolution::uniform(1.0),
            3,
        );
        config.matcher_iterations = 200;
        config.matcher_patience = 50;
        let sim_odf = SimOdf::new(hist.odf.dims);
        let mut rng = DeterministicRng::new(11);

        let outcome = match_crystallography(
            &mut grains,
            &hist,
            CrystalStructure::Cubic,
            &config,
            sim_odf,
            TOTAL_VOXELS,
            &mut rng,
        );
        assert!(outcome.iterations_run <= 200);
        assert!(outcome.iterations_run > 0);
    }

    #[test]
    fn apply_and_revert_new_orientation_round_trips() {
        let hist = hist_with_skewed_mdf();
        let mut grains = two_neighboring_grains();
        let mut sim_odf = SimOdf::new(hist.odf.dims);
        sim_odf.accumulate(0, 1.0);
        sim_odf.accumulate(0, 1.0);
        let mut sim_mdf = SimMdf::new();
        let mut odf_bin_of = vec![0, 0];

        let before = grains[0].crystal_euler;
        let before_mdf = sim_mdf.bins;
        apply_new_orientation(
            &mut grains,
            &mut sim_odf,
            &mut sim_mdf,
            &mut odf_bin_of,
            0,
            EulerAngles::new(1.0, 1.0, 1.0),
            5,
            CrystalStructure::Cubic,
            TOTAL_VOXELS,
            TOTAL_SURFACE_AREA,
        );
        assert_ne!(grains[0].crystal_euler.phi1, before.phi1);
        apply_new_orientation(
            &mut grains,
            &mut sim_odf,
            &mut sim_mdf,
            &mut odf_bin_of,
            0,
            before,
            0,
            CrystalStructure::Cubic,
            TOTAL_VOXELS,
            TOTAL_SURFACE_AREA,
        );
        assert_eq!(grains[0].crystal_euler, before);
        assert_eq!(sim_mdf.bins, before_mdf);
    }

    #[test]
    fn weighted_combined_error_never_increases_across_the_run() {
        let hist = hist_with_skewed_mdf();
        let mut grains = two_neighboring_grains();
        let mut config = RunConfig::new(
            2,
            ShapeClass::Ellipsoid,
            CrystalStructure::Cubic,
            microgen_spec::Resolution::uniform(1.0),
            21,
        );
        config.matcher_iterations = 150;
        config.matcher_patience = 150;
        let sim_odf = SimOdf::new(hist.odf.dims);
        let target_odf = hist.odf.density.clone();
        let target_mdf = hist.mdf.bins;
        let combined_before = odf_error(&sim_odf, &target_odf) * 4.0;
        let mut rng = DeterministicRng::new(22);

        match_crystallography(
            &mut grains,
            &hist,
            CrystalStructure::Cubic,
            &config,
            sim_odf,
            TOTAL_VOXELS,
            &mut rng,
        );

        let total_surface_area: f64 = grains.iter().flat_map(|g| g.shared_areas.iter()).sum::<f64>() / 2.0;
        let mut final_mdf = SimMdf::new();
        for (i, grain) in grains.iter().enumerate() {
            for (&neighbor_id, &area) in grain.neighbors.iter().zip(grain.shared_areas.iter()) {
                let j = neighbor_id as usize - 1;
                if j <= i {
                    continue;
                }
                let angle = disorientation_degrees(grain.orientation_quat, grains[j].orientation_quat, CrystalStructure::Cubic);
                final_mdf.accumulate(angle, pair_weight(area, total_surface_area));
            }
        }
        let mut final_sim_odf = SimOdf::new(hist.odf.dims);
        for grain in &grains {
            if !grain.surface {
                final_sim_odf.accumulate(odf_bin_for(&hist, grain.crystal_euler), voxel_fraction(grain, TOTAL_VOXELS));
            }
        }
        let combined_after = 4.0 * odf_error(&final_sim_odf, &target_odf) + 0.25 * mdf_error(&final_mdf, &target_mdf);
        assert!(
            combined_after <= combined_before + 1e-9,
            "weighted error grew: {combined_before} -> {combined_after}"
        );
    }

    #[test]
    fn apply_exchange_twice_is_identity() {
        let mut grains = two_neighboring_grains();
        grains[0].crystal_euler = EulerAngles::new(0.1, 0.2, 0.3);
        grains[0].orientation_quat = euler_to_quaternion(grains[0].crystal_euler);
        grains[1].crystal_euler = EulerAngles::new(0.4, 0.5, 0.6);
        grains[1].orientation_quat = euler_to_quaternion(grains[1].crystal_euler);
        let mut sim_odf = SimOdf::new((4, 4, 4));
        let mut sim_mdf = SimMdf::new();
        let mut odf_bin_of = vec![0, 0];
        let before_0 = grains[0].crystal_euler;
        let before_1 = grains[1].crystal_euler;
        let before_odf_total = sim_odf.density();

        apply_exchange(
            &mut grains,
            &mut sim_odf,
            &mut sim_mdf,
            &mut odf_bin_of,
            0,
            1,
            CrystalStructure::Cubic,
            TOTAL_VOXELS,
            TOTAL_SURFACE_AREA,
        );
        assert_eq!(grains[0].crystal_euler, before_1);
        apply_exchange(
            &mut grains,
            &mut sim_odf,
            &mut sim_mdf,
            &mut odf_bin_of,
            0,
            1,
            CrystalStructure::Cubic,
            TOTAL_VOXELS,
            TOTAL_SURFACE_AREA,
        );
        assert_eq!(grains[0].crystal_euler, before_0);
        assert_eq!(grains[1].crystal_euler, before_1);
        assert_eq!(sim_odf.density(), before_odf_total);
    }
}
