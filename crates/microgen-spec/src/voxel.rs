//! The `Voxel` record (§3).

use serde::{Deserialize, Serialize};

use crate::grain::GrainId;

/// Sentinel label meaning "never assigned".
pub const UNLABELED: i64 = 0;
/// Sentinel label meaning "transiently unassigned" (overlap tie-break, §4.4).
pub const UNASSIGNED: i64 = -1;

/// One cubic cell of the discretized grid (§3).
///
/// During packing, `covering_grains` / `covering_inside_values` track which
/// grains currently claim this voxel and the inside-function value each one
/// evaluated here; they are cleared once the grid is rebuilt for
/// voxelization (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voxel {
    /// `0` = unlabeled, `-1` = transiently unassigned, `>0` = a grain id.
    pub label: i64,
    /// Distinguishes an overlap tie-break (`true`) from never-assigned.
    pub unassigned: bool,
    pub surface_voxel_count: u32,
    pub nearest_neighbor_id: Option<GrainId>,
    pub nearest_neighbor_distance: f64,

    #[serde(skip)]
    pub covering_grains: Vec<GrainId>,
    #[serde(skip)]
    pub covering_inside_values: Vec<f64>,
}

impl Default for Voxel {
    fn default() -> Self {
        Voxel {
            label: UNLABELED,
            unassigned: false,
            surface_voxel_count: 0,
            nearest_neighbor_id: None,
            nearest_neighbor_distance: 0.0,
            covering_grains: Vec::new(),
            covering_inside_values: Vec::new(),
        }
    }
}

impl Voxel {
    pub fn is_labeled(&self) -> bool {
        self.label > 0
    }
}
