//! `VoxelGrid` (C4): owns the 3D labeling and per-voxel auxiliary lists.

use microgen_spec::{Voxel, GrainId, UNASSIGNED, UNLABELED};

use crate::geometry::{GridDims, Pitch, SampleBox};

/// The mutable 3D voxel grid, resident for the lifetime of one resolution
/// (§3 Lifecycle: "created at first resolution, recreated once at higher
/// resolution").
pub struct VoxelGrid {
    pub dims: GridDims,
    pub pitch: Pitch,
    voxels: Vec<Voxel>,
}

impl VoxelGrid {
    pub fn new(dims: GridDims, pitch: Pitch) -> Self {
        let n = dims.total_voxels() as usize;
        VoxelGrid {
            dims,
            pitch,
            voxels: (0..n).map(|_| Voxel::default()).collect(),
        }
    }

    pub fn sample_box(&self) -> SampleBox {
        SampleBox {
            dims: self.dims,
            pitch: self.pitch,
        }
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn get(&self, flat: u64) -> &Voxel {
        &self.voxels[flat as usize]
    }

    pub fn get_mut(&mut self, flat: u64) -> &mut Voxel {
        &mut self.voxels[flat as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voxel> {
        self.voxels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voxel> {
        self.voxels.iter_mut()
    }

    /// Record that `grain` covers voxel `flat` with the given inside-function
    /// value, during packing (§3 Voxel, §4.3).
    pub fn add_coverage(&mut self, flat: u64, grain: GrainId, inside_value: f64) {
        let v = self.get_mut(flat);
        v.covering_grains.push(grain);
        v.covering_inside_values.push(inside_value);
    }

    /// Undo `add_coverage` for the given grain at this voxel.
    pub fn remove_coverage(&mut self, flat: u64, grain: GrainId) {
        let v = self.get_mut(flat);
        if let Some(pos) = v.covering_grains.iter().position(|&g| g == grain) {
            v.covering_grains.remove(pos);
            v.covering_inside_values.remove(pos);
        }
    }

    /// Is this voxel currently unclaimed (no covering grains)?
    pub fn is_empty_voxel(&self, flat: u64) -> bool {
        self.get(flat).covering_grains.is_empty()
    }

    /// Total covered fraction of the grid: `1 - (empty voxels / total)`.
    pub fn covered_fraction(&self) -> f64 {
        let covered = self
            .voxels
            .iter()
            .filter(|v| !v.covering_grains.is_empty())
            .count();
        covered as f64 / self.voxels.len().max(1) as f64
    }

    /// Apply the overlap-resolution rule from §4.4 when assigning `grain` to
    /// voxel `flat` at the fine resolution.
    pub fn assign_fine_label(&mut self, flat: u64, grain: GrainId) {
        let v = self.get_mut(flat);
        if v.label == UNLABELED {
            v.label = grain as i64;
        } else if v.label > 0 {
            v.label = UNASSIGNED;
            v.unassigned = true;
        } else if v.label == UNASSIGNED && !v.unassigned {
            v.label = grain as i64;
        }
        // label == UNASSIGNED && unassigned: already in conflict, no change.
    }

    pub fn count_unlabeled_or_unassigned(&self) -> usize {
        self.voxels.iter().filter(|v| v.label <= 0).count()
    }

    pub fn reset_unassigned_flags_for_unlabeled(&mut self) {
        for v in self.voxels.iter_mut() {
            if v.label <= 0 {
                v.unassigned = false;
            }
        }
    }
}
