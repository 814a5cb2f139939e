//! Neighbor-shell index (C6, §4.3 setup): for every candidate grain, which
//! other grains lie within 4 radii, bucketed into distance shells 0..3.

use microgen_spec::{Grain, GrainId, ShapeClass};

use crate::geometry::{bounding_semi_axis, SampleBox};

/// Periodic centroid-to-centroid distance inside `box_`.
fn periodic_distance(a: [f64; 3], b: [f64; 3], box_: SampleBox) -> f64 {
    let sizes = [box_.size_x(), box_.size_y(), box_.size_z()];
    let mut sum_sq = 0.0;
    for axis in 0..3 {
        let mut d = (a[axis] - b[axis]).abs();
        let size = sizes[axis];
        if d > size / 2.0 {
            d = size - d;
        }
        sum_sq += d * d;
    }
    sum_sq.sqrt()
}

/// Per-grain bounding semi-axis `r1`, used as the shell unit (§4.3).
fn first_radii(grains: &[Grain], shape_class: ShapeClass) -> Vec<f64> {
    grains
        .iter()
        .map(|g| {
            let (_, r2, r3) = g.aspect_ratios();
            bounding_semi_axis(g.volume, r2, r3, shape_class, g.shape_factor)
        })
        .collect()
}

/// Build the symmetric neighbor-shell index over the full candidate pool
/// (§4.3 setup). Clears any existing shell data on every grain first.
pub fn build_neighbor_index(grains: &mut [Grain], shape_class: ShapeClass, box_: SampleBox) {
    let radii = first_radii(grains, shape_class);
    for g in grains.iter_mut() {
        g.neighbor_shells = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        g.neighbor_shell_counts = [0; 4];
    }

    let n = grains.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let d = periodic_distance(grains[i].centroid, grains[j].centroid, box_);
            let threshold = 4.0 * radii[i].max(radii[j]);
            if d < threshold {
                let shell_i = shell_for(d, radii[i]);
                let shell_j = shell_for(d, radii[j]);
                grains[i].neighbor_shells[shell_i].push((j + 1) as GrainId);
                grains[i].neighbor_shell_counts[shell_i] += 1;
                grains[j].neighbor_shells[shell_j].push((i + 1) as GrainId);
                grains[j].neighbor_shell_counts[shell_j] += 1;
            }
        }
    }
}

fn shell_for(distance: f64, r1: f64) -> usize {
    if r1 <= 0.0 {
        return 0;
    }
    ((distance / r1).floor() as usize).min(3)
}
