//! Pipeline orchestration: setup -> pack -> voxelize -> orient -> match
//! (§4, §5). Owns the only top-level RNG; every stage draws from its own
//! sub-stream derived from the run seed (§4.1).

use microgen_spec::histograms::TargetHistograms;
use microgen_spec::{Grain, RunConfig, Stage, SynthesisError};
use tracing::info;

use crate::catalog;
use crate::geometry::{GridDims, Pitch, SampleBox};
use crate::grid::VoxelGrid;
use crate::matcher::{self, MatchOutcome};
use crate::neighborhood;
use crate::orientation;
use crate::packing;
use crate::rng::DeterministicRng;
use crate::voxelize;

/// The full result of one synthesis run (§6 Outputs): the labeled grid, the
/// final grain table, and diagnostics from the crystallography matcher.
pub struct SynthesisOutput {
    pub grains: Vec<Grain>,
    pub grid: VoxelGrid,
    pub fine_box: SampleBox,
    pub matcher_outcome: MatchOutcome,
}

const GAP_FILL_MAX_PASSES: u32 = 64;

/// Run the full microstructure synthesis pipeline for one `RunConfig`
/// against one set of target histograms (§4).
pub fn run(config: &RunConfig, hist: &TargetHistograms) -> Result<SynthesisOutput, SynthesisError> {
    config.validate()?;

    info!(
        num_grains = config.num_grains,
        seed = config.seed,
        shape_class = ?config.shape_class,
        "starting microstructure synthesis"
    );

    // --- Setup: candidate pool, sample box, neighbor-shell index (C3, C6) ---
    let mut setup_rng = DeterministicRng::new(DeterministicRng::derive_stage_seed(config.seed, "setup"));
    let mut pool = catalog::generate_candidate_pool(hist, config.pool_size(), &mut setup_rng);
    let nominal_volume = catalog::nominal_total_volume(&pool, config.num_grains);

    let fine_pitch = Pitch {
        dx: config.resolution.dx,
        dy: config.resolution.dy,
        dz: config.resolution.dz,
    };
    let coarse_box = catalog::coarse_sample_box(nominal_volume, fine_pitch, config.coarse_factor);
    let fine_box = catalog::fine_sample_box(coarse_box, config.coarse_factor);

    catalog::place_candidates(&mut pool, coarse_box, &mut setup_rng);
    neighborhood::build_neighbor_index(&mut pool, config.shape_class, coarse_box);

    info!(
        pool_size = pool.len(),
        coarse_voxels = coarse_box.dims.total_voxels(),
        fine_voxels = fine_box.dims.total_voxels(),
        "candidate pool ready"
    );

    // --- Packing (C8) ---
    let mut pack_rng = DeterministicRng::new(DeterministicRng::derive_stage_seed(config.seed, "packing"));
    let mut active_grains = packing::pack(hist, config, pool, coarse_box, &mut pack_rng);
    if active_grains.is_empty() && config.num_grains > 0 {
        return Err(SynthesisError::invariant(
            Stage::Packing,
            "packing produced zero active grains for a nonzero grain target",
        ));
    }
    info!(active = active_grains.len(), target = config.num_grains, "packing complete");

    // --- Voxelize: fine-resolution labeling, gap fill, neighbor discovery (C9) ---
    let mut grid = voxelize::label_fine_grid(&mut active_grains, config.shape_class, fine_box);
    voxelize::gap_fill(
        &mut grid,
        &mut active_grains,
        config.shape_class,
        fine_box,
        GAP_FILL_MAX_PASSES,
    );
    voxelize::discover_neighbors(&grid, &mut active_grains, fine_box);
    info!(
        unlabeled_remaining = grid.count_unlabeled_or_unassigned(),
        "voxelization complete"
    );

    // --- Orientation assignment (C10) ---
    let total_voxels = fine_box.dims.total_voxels();
    let mut orient_rng = DeterministicRng::new(DeterministicRng::derive_stage_seed(config.seed, "orientation"));
    let sim_odf = orientation::assign_orientations(&mut active_grains, hist, total_voxels, &mut orient_rng);

    // --- Crystallography matching (C12) ---
    let mut match_rng = DeterministicRng::new(DeterministicRng::derive_stage_seed(config.seed, "matcher"));
    let matcher_outcome = matcher::match_crystallography(
        &mut active_grains,
        hist,
        config.crystal_structure,
        config,
        sim_odf,
        total_voxels,
        &mut match_rng,
    );
    info!(
        iterations_run = matcher_outcome.iterations_run,
        accepted = matcher_outcome.accepted,
        stopped_early = matcher_outcome.stopped_early,
        "crystallography matching complete"
    );

    compute_disorientations(&mut active_grains, config.crystal_structure);

    Ok(SynthesisOutput {
        grains: active_grains,
        grid,
        fine_box,
        matcher_outcome,
    })
}

/// Fill in `misorientations`, one entry per `neighbors` entry, now that
/// every grain's final orientation is settled (§3 Grain).
fn compute_disorientations(grains: &mut [Grain], crystal_structure: microgen_spec::CrystalStructure) {
    let quats: Vec<_> = grains.iter().map(|g| g.orientation_quat).collect();
    for grain in grains.iter_mut() {
        grain.misorientations = grain
            .neighbors
            .iter()
            .map(|&id| {
                let other = quats[id as usize - 1];
                crate::misorientation::disorientation_degrees(grain.orientation_quat, other, crystal_structure)
            })
            .collect();
    }
}

/// Build a `GridDims`/`Pitch` pair directly, for callers (tests, CLI) that
/// need to construct a `SampleBox` without going through [`catalog`].
pub fn sample_box(dims: GridDims, pitch: Pitch) -> SampleBox {
    SampleBox { dims, pitch }
}
