//! Plain-text grid/table writer (C14, §4.8): a minimal stand-in for the
//! VTK/HDF5 writers named as out-of-scope external collaborators in §1.

use std::io::Write;

use crate::error::SynthesisError;
use crate::grain::{Grain, GrainId};
use crate::histograms::MdfTable;

/// One row of the labeled-grid output: a voxel coordinate and its grain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabeledVoxel {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub label: i64,
}

/// Write the labeled grid as `x,y,z,label` CSV (§6 Outputs).
pub fn write_labeled_grid_csv<W: Write>(
    mut out: W,
    voxels: impl IntoIterator<Item = LabeledVoxel>,
) -> Result<(), SynthesisError> {
    writeln!(out, "x,y,z,label")?;
    for v in voxels {
        writeln!(out, "{},{},{},{}", v.x, v.y, v.z, v.label)?;
    }
    Ok(())
}

/// Write the per-grain table (§6 Outputs): id, equivalent diameter, neighbor
/// count, surface flag, and crystallographic Euler triple.
pub fn write_grain_table_csv<W: Write>(
    mut out: W,
    grains: &[(GrainId, &Grain)],
) -> Result<(), SynthesisError> {
    writeln!(
        out,
        "id,equivalent_diameter,num_neighbors,surface_flag,phi1,capital_phi,phi2"
    )?;
    for (id, grain) in grains {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            id,
            grain.equivalent_diameter,
            grain.neighbors.len(),
            grain.surface as u8,
            grain.crystal_euler.phi1,
            grain.crystal_euler.capital_phi,
            grain.crystal_euler.phi2,
        )?;
    }
    Ok(())
}

/// Write the 36-bin MDF table as one float per line (§6 Outputs).
pub fn write_mdf_table<W: Write>(mut out: W, mdf: &MdfTable) -> Result<(), SynthesisError> {
    for bin in mdf.bins {
        writeln!(out, "{bin}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_labeled_grid_csv() {
        let mut buf = Vec::new();
        let voxels = vec![
            LabeledVoxel { x: 0, y: 0, z: 0, label: 1 },
            LabeledVoxel { x: 1, y: 0, z: 0, label: 2 },
        ];
        write_labeled_grid_csv(&mut buf, voxels).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "x,y,z,label\n0,0,0,1\n1,0,0,2\n");
    }

    #[test]
    fn writes_mdf_table_one_value_per_line() {
        let mut buf = Vec::new();
        let mut mdf = MdfTable::zeroed();
        mdf.bins[0] = 0.5;
        write_mdf_table(&mut buf, &mdf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 36);
        assert_eq!(text.lines().next().unwrap(), "0.5");
    }
}
