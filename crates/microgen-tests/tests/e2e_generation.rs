//! End-to-end: run the full synthesis pipeline on a modest target and check
//! the output satisfies the invariants a downstream consumer relies on.

use microgen_core::pipeline;
use microgen_spec::histograms::{
    AxisOdfTable, BetaTable, MdfTable, MicrotextureTable, NeighborTable, OdfTable, SizeDistribution,
    TargetHistograms,
};
use microgen_spec::{CrystalStructure, Resolution, RunConfig, ShapeClass};

fn histograms() -> TargetHistograms {
    TargetHistograms {
        size_distribution: SizeDistribution {
            mean_log_diameter: 9.0f64.ln(),
            stdev_log_diameter: 0.2,
            target_count: 12.0,
        },
        b_over_a: BetaTable::default(),
        c_over_a: BetaTable::default(),
        neighbors: NeighborTable::default(),
        omega3: BetaTable::default(),
        axis_odf: AxisOdfTable::uniform(8),
        odf: OdfTable::uniform((8, 8, 8)),
        mdf: MdfTable::zeroed(),
        microtexture: MicrotextureTable { bins: [0.0; 10] },
    }
}

fn config() -> RunConfig {
    let mut cfg = RunConfig::new(
        12,
        ShapeClass::Ellipsoid,
        CrystalStructure::Cubic,
        Resolution::uniform(1.0),
        7,
    );
    cfg.packing_iterations = 8000;
    cfg.matcher_iterations = 3000;
    cfg.matcher_patience = 800;
    cfg.pool_oversample = 15;
    cfg
}

#[test]
fn pipeline_produces_a_fully_labeled_periodic_grid() {
    let hist = histograms();
    let cfg = config();
    let output = pipeline::run(&cfg, &hist).expect("pipeline should succeed");

    assert!(!output.grains.is_empty());
    assert_eq!(output.grid.count_unlabeled_or_unassigned(), 0, "every voxel must end up labeled");

    let total_voxels_by_grid = output.grid.len() as u64;
    let total_voxels_by_grains: u64 = output.grains.iter().map(|g| g.num_voxels).sum();
    assert_eq!(total_voxels_by_grid, total_voxels_by_grains);
}

#[test]
fn neighbor_lists_are_symmetric_and_misorientations_line_up() {
    let hist = histograms();
    let cfg = config();
    let output = pipeline::run(&cfg, &hist).expect("pipeline should succeed");

    for (i, grain) in output.grains.iter().enumerate() {
        let this_id = (i + 1) as u32;
        assert_eq!(grain.neighbors.len(), grain.shared_areas.len());
        assert_eq!(grain.neighbors.len(), grain.misorientations.len());

        for (&area, &angle) in grain.shared_areas.iter().zip(grain.misorientations.iter()) {
            assert!(area > 0.0, "shared area must be positive");
            assert!((0.0..=62.8001).contains(&angle), "cubic disorientation out of range: {angle}");
        }

        for &neighbor_id in &grain.neighbors {
            let other = &output.grains[neighbor_id as usize - 1];
            assert!(
                other.neighbors.contains(&this_id),
                "neighbor relation must be symmetric: {this_id} -> {neighbor_id}"
            );
        }
    }
}

#[test]
fn grain_geometry_is_physically_sane() {
    let hist = histograms();
    let cfg = config();
    let output = pipeline::run(&cfg, &hist).expect("pipeline should succeed");

    for grain in &output.grains {
        assert!(grain.volume > 0.0);
        assert!(grain.equivalent_diameter > 0.0);
        assert!(grain.num_voxels > 0, "an active grain with zero voxels would be a dangling id");
        let q = grain.orientation_quat;
        let norm = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
        assert!((norm - 1.0).abs() < 1e-6, "orientation quaternion must stay normalized");
    }
}
