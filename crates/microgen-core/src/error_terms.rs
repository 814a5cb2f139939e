//! Error terms (C7, §4.3): filling error, size-distribution error, and
//! neighborhood error, each driving the packing optimizer's acceptance rule.

use microgen_spec::histograms::NeighborTable;
use microgen_spec::{Grain, SizeDistribution};

use crate::grid::VoxelGrid;
use crate::mathx::student_t_two_sided_p;

/// Filling error (glossary): `sum_v cost(v)`, `cost(v) = 1` for an
/// uncovered voxel, else `-sum_{g covers v} inside(g, v)` (§4.3).
///
/// Recomputed from scratch; the packing optimizer maintains this
/// incrementally and checks it against this function in tests (§8).
pub fn filling_error_from_scratch(grid: &VoxelGrid) -> f64 {
    grid.iter()
        .map(|v| {
            if v.covering_grains.is_empty() {
                1.0
            } else {
                -v.covering_inside_values.iter().sum::<f64>()
            }
        })
        .sum()
}

fn welch_t_and_dof(
    mean_a: f64,
    var_a: f64,
    n_a: f64,
    mean_b: f64,
    var_b: f64,
    n_b: f64,
) -> Option<(f64, f64)> {
    if n_a < 2.0 || n_b < 2.0 {
        return None;
    }
    let se_a = var_a / n_a;
    let se_b = var_b / n_b;
    let se_sum = se_a + se_b;
    if se_sum <= 0.0 {
        return None;
    }
    let t = (mean_a - mean_b) / se_sum.sqrt();
    let dof = se_sum * se_sum / (se_a * se_a / (n_a - 1.0) + se_b * se_b / (n_b - 1.0));
    Some((t, dof))
}

fn mean_and_variance(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = samples.iter().sum::<f64>() / n;
    if n < 2.0 {
        return (mean, 0.0);
    }
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

/// Error contribution of a single Welch t-test against target
/// `(mean, stdev, n)`, guarded per §7 NumericError: an empty or
/// single-point current sample contributes zero (`p = 0.5`).
fn t_test_error(current: &[f64], target_mean: f64, target_stdev: f64, target_n: f64) -> f64 {
    let (mean, var) = mean_and_variance(current);
    let n = current.len() as f64;
    let target_var = target_stdev * target_stdev;
    match welch_t_and_dof(target_mean, target_var, target_n, mean, var, n) {
        Some((t, dof)) => 1.0 - 2.0 * student_t_two_sided_p(t, dof),
        None => 0.0,
    }
}

/// Size-distribution error (§4.3 C7): Welch t-test on `log(diameter)`
/// between the current active set and the target.
pub fn size_distribution_error(active_grains: &[&Grain], target: &SizeDistribution) -> f64 {
    let logs: Vec<f64> = active_grains
        .iter()
        .map(|g| g.equivalent_diameter.ln())
        .collect();
    t_test_error(
        &logs,
        target.mean_log_diameter,
        target.stdev_log_diameter,
        target.target_count,
    )
}

fn nearest_diameter_bin(diameter: f64) -> i32 {
    diameter.round() as i32
}

/// Neighborhood error (§4.3 C7): sum over every target `(diameter, shell)`
/// row of a t-test between the current active set's neighbor counts at that
/// diameter/shell and the target mean/stdev.
pub fn neighborhood_error(active_grains: &[&Grain], target: &NeighborTable) -> f64 {
    let mut total = 0.0;
    for row in &target.rows {
        let current_at_bin: Vec<&Grain> = active_grains
            .iter()
            .filter(|g| nearest_diameter_bin(g.equivalent_diameter) == row.diameter)
            .copied()
            .collect();
        for (shell, (target_mean, target_stdev)) in row.shells.iter().enumerate() {
            let samples: Vec<f64> = current_at_bin
                .iter()
                .map(|g| g.neighbor_shell_counts[shell] as f64)
                .collect();
            total += t_test_error(&samples, *target_mean, *target_stdev, row.count);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GridDims, Pitch};
    use microgen_spec::EulerAngles;

    #[test]
    fn filling_error_of_empty_grid_equals_voxel_count() {
        let grid = VoxelGrid::new(
            GridDims { nx: 3, ny: 3, nz: 3 },
            Pitch { dx: 1.0, dy: 1.0, dz: 1.0 },
        );
        assert_eq!(filling_error_from_scratch(&grid), 27.0);
    }

    #[test]
    fn filling_error_drops_when_voxel_is_covered() {
        let mut grid = VoxelGrid::new(
            GridDims { nx: 2, ny: 2, nz: 2 },
            Pitch { dx: 1.0, dy: 1.0, dz: 1.0 },
        );
        let before = filling_error_from_scratch(&grid);
        grid.add_coverage(0, 1, 0.3);
        let after = filling_error_from_scratch(&grid);
        assert!((before - after - (1.0 - (-0.3))).abs() < 1e-9);
    }

    #[test]
    fn size_distribution_error_is_near_zero_for_matching_sample() {
        let target = SizeDistribution {
            mean_log_diameter: 10.0f64.ln(),
            stdev_log_diameter: 0.2,
            target_count: 500.0,
        };
        let mut rng = crate::rng::DeterministicRng::new(7);
        let grains: Vec<Grain> = (0..500)
            .map(|_| {
                let d = (target.mean_log_diameter
                    + rng.normal(0.0, target.stdev_log_diameter))
                .exp();
                Grain::new_candidate(1.0, d, 1.0, 1.0, EulerAngles::default(), 1.0, [0.0; 3])
            })
            .collect();
        let refs: Vec<&Grain> = grains.iter().collect();
        let err = size_distribution_error(&refs, &target);
        assert!(err.abs() < 0.2, "error was {err}");
    }

    #[test]
    fn size_distribution_error_is_large_for_mismatched_sample() {
        let target = SizeDistribution {
            mean_log_diameter: 10.0f64.ln(),
            stdev_log_diameter: 0.05,
            target_count: 500.0,
        };
        let grains: Vec<Grain> = (0..500)
            .map(|_| Grain::new_candidate(1.0, 50.0, 1.0, 1.0, EulerAngles::default(), 1.0, [0.0; 3]))
            .collect();
        let refs: Vec<&Grain> = grains.iter().collect();
        let err = size_distribution_error(&refs, &target);
        assert!(err > 0.9, "error was {err}");
    }

    #[test]
    fn neighborhood_error_on_empty_table_is_zero() {
        let grains: Vec<Grain> = vec![];
        let refs: Vec<&Grain> = grains.iter().collect();
        let target = NeighborTable::default();
        assert_eq!(neighborhood_error(&refs, &target), 0.0);
    }
}
