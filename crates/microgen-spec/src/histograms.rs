//! Target histograms (§3): immutable tables consumed by the error terms
//! (C7), orientation assignment (C10), and the crystallography matcher
//! (C12).

use serde::{Deserialize, Serialize};

/// `(μ_logD, σ_logD, N)` grain-size distribution, log-normal in diameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeDistribution {
    pub mean_log_diameter: f64,
    pub stdev_log_diameter: f64,
    pub target_count: f64,
}

/// One row of a per-diameter beta-distribution table: `(diam, α, β, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaRow {
    pub diameter: i32,
    pub alpha: f64,
    pub beta: f64,
    pub count: f64,
}

/// A per-integer-diameter table of beta-distribution parameters, used for
/// aspect ratios (b/a, c/a) and the shape factor ω3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BetaTable {
    pub rows: Vec<BetaRow>,
}

impl BetaTable {
    /// Row for the given integer diameter, if present.
    pub fn row_for_diameter(&self, diameter: i32) -> Option<&BetaRow> {
        self.rows.iter().find(|r| r.diameter == diameter)
    }
}

/// One row of the neighbor-count-vs-diameter table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborRow {
    pub diameter: i32,
    /// `(mean, stdev)` per shell 0..3.
    pub shells: [(f64, f64); 4],
    pub count: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeighborTable {
    pub rows: Vec<NeighborRow>,
}

impl NeighborTable {
    pub fn row_for_diameter(&self, diameter: i32) -> Option<&NeighborRow> {
        self.rows.iter().find(|r| r.diameter == diameter)
    }
}

/// Axis-ODF: probability density over ellipsoid orientation, stored as an
/// 18x18x18 histogram plus its prefix sum for sampling (§3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisOdfTable {
    pub bins_per_axis: usize,
    /// Flattened `bins_per_axis^3` density values, row-major `(i, j, k)`.
    pub density: Vec<f64>,
    /// Cumulative sum of `density`, same length, last entry ~= total mass.
    pub prefix_sum: Vec<f64>,
}

impl AxisOdfTable {
    pub fn uniform(bins_per_axis: usize) -> Self {
        let n = bins_per_axis.pow(3);
        let density = vec![1.0 / n as f64; n];
        let mut acc = 0.0;
        let prefix_sum = density
            .iter()
            .map(|d| {
                acc += d;
                acc
            })
            .collect();
        AxisOdfTable {
            bins_per_axis,
            density,
            prefix_sum,
        }
    }

    /// Binary-search the prefix sum for a uniform draw `u in [0, total)`,
    /// returning the flat bin index.
    pub fn sample_bin(&self, u: f64) -> usize {
        sample_prefix_sum(&self.prefix_sum, u)
    }

    /// Flat index -> `(i, j, k)` for a cubic bin grid.
    pub fn bin_to_ijk(&self, flat: usize) -> (usize, usize, usize) {
        flat_to_ijk(flat, self.bins_per_axis, self.bins_per_axis)
    }
}

/// ODF: probability density over crystallographic orientation. Either
/// 36x36x12 (hexagonal) or 18x18x18 (cubic), stored as raw density with the
/// prefix sum computed on demand (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdfTable {
    pub dims: (usize, usize, usize),
    pub density: Vec<f64>,
}

impl OdfTable {
    pub fn uniform(dims: (usize, usize, usize)) -> Self {
        let n = dims.0 * dims.1 * dims.2;
        OdfTable {
            dims,
            density: vec![1.0 / n.max(1) as f64; n],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    pub fn prefix_sum(&self) -> Vec<f64> {
        let mut acc = 0.0;
        self.density
            .iter()
            .map(|d| {
                acc += d;
                acc
            })
            .collect()
    }

    pub fn flat_to_ijk(&self, flat: usize) -> (usize, usize, usize) {
        flat_to_ijk(flat, self.dims.0, self.dims.1)
    }

    pub fn ijk_to_flat(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims.1 + j) * self.dims.0 + i
    }
}

/// MDF: probability density over pairwise misorientation angle, 36 bins of
/// 5 degrees each, spanning 0..180 degrees (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdfTable {
    pub bins: [f64; 36],
}

impl MdfTable {
    pub const BIN_WIDTH_DEGREES: f64 = 5.0;
    pub const NUM_BINS: usize = 36;

    pub fn zeroed() -> Self {
        MdfTable { bins: [0.0; 36] }
    }

    pub fn bin_for_angle(angle_degrees: f64) -> usize {
        let bin = (angle_degrees / Self::BIN_WIDTH_DEGREES).floor() as isize;
        bin.clamp(0, Self::NUM_BINS as isize - 1) as usize
    }
}

/// Microtexture: 10-bin auxiliary texture table (carried through, not
/// consumed by the core error terms covered in this spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrotextureTable {
    pub bins: [f64; 10],
}

/// The full set of immutable target histograms (§2 C2, §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetHistograms {
    pub size_distribution: SizeDistribution,
    pub b_over_a: BetaTable,
    pub c_over_a: BetaTable,
    pub neighbors: NeighborTable,
    pub omega3: BetaTable,
    pub axis_odf: AxisOdfTable,
    pub odf: OdfTable,
    pub mdf: MdfTable,
    pub microtexture: MicrotextureTable,
}

/// Binary-search a prefix-sum table for the first index whose cumulative
/// value is `>= u`. Used by every ODF/axis-ODF sampling site.
pub fn sample_prefix_sum(prefix_sum: &[f64], u: f64) -> usize {
    match prefix_sum.binary_search_by(|probe| probe.partial_cmp(&u).unwrap()) {
        Ok(idx) => idx,
        Err(idx) => idx.min(prefix_sum.len().saturating_sub(1)),
    }
}

fn flat_to_ijk(flat: usize, dim_i: usize, dim_j: usize) -> (usize, usize, usize) {
    let k = flat / (dim_i * dim_j);
    let rem = flat % (dim_i * dim_j);
    let j = rem / dim_i;
    let i = rem % dim_i;
    (i, j, k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sum_round_trip_bin_index() {
        let table = AxisOdfTable::uniform(18);
        let total = *table.prefix_sum.last().unwrap();
        for step in 0..10 {
            let u = total * (step as f64 + 0.5) / 10.0;
            let bin = table.sample_bin(u);
            let (i, j, k) = table.bin_to_ijk(bin);
            assert!(i < 18 && j < 18 && k < 18);
        }
    }

    #[test]
    fn odf_flat_ijk_round_trips() {
        let table = OdfTable::uniform((18, 18, 18));
        for flat in [0usize, 17, 18, 323, 5831] {
            let (i, j, k) = table.flat_to_ijk(flat);
            assert_eq!(table.ijk_to_flat(i, j, k), flat);
        }
    }

    #[test]
    fn mdf_bin_for_angle_clamps_to_range() {
        assert_eq!(MdfTable::bin_for_angle(0.0), 0);
        assert_eq!(MdfTable::bin_for_angle(4.9), 0);
        assert_eq!(MdfTable::bin_for_angle(5.0), 1);
        assert_eq!(MdfTable::bin_for_angle(179.9), 35);
        assert_eq!(MdfTable::bin_for_angle(1000.0), 35);
    }
}
