//! `microgen` (C15, §4.9): command-line entry point for one synthesis run.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use microgen_core::pipeline;
use microgen_spec::histograms::{AxisOdfTable, MdfTable, MicrotextureTable, OdfTable, TargetHistograms};
use microgen_spec::{grid_io, stats_io, CrystalStructure, Resolution, RunConfig, ShapeClass};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShapeClassArg {
    Ellipsoid,
    Superellipsoid,
    Cuboctahedron,
}

impl From<ShapeClassArg> for ShapeClass {
    fn from(v: ShapeClassArg) -> Self {
        match v {
            ShapeClassArg::Ellipsoid => ShapeClass::Ellipsoid,
            ShapeClassArg::Superellipsoid => ShapeClass::Superellipsoid,
            ShapeClassArg::Cuboctahedron => ShapeClass::Cuboctahedron,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CrystalStructureArg {
    Hexagonal,
    Cubic,
}

impl From<CrystalStructureArg> for CrystalStructure {
    fn from(v: CrystalStructureArg) -> Self {
        match v {
            CrystalStructureArg::Hexagonal => CrystalStructure::Hexagonal,
            CrystalStructureArg::Cubic => CrystalStructure::Cubic,
        }
    }
}

/// Generate a periodic polycrystalline microstructure from a target
/// statistics file (§1 Overview, §4.9).
#[derive(Debug, Parser)]
#[command(name = "microgen", version, about)]
struct Cli {
    /// Keyword-driven statistics file (`Grain_Size_Distribution` etc, §4.7).
    #[arg(long)]
    stats: PathBuf,

    /// Target number of active grains.
    #[arg(long)]
    num_grains: usize,

    #[arg(long, value_enum, default_value_t = ShapeClassArg::Ellipsoid)]
    shape_class: ShapeClassArg,

    #[arg(long, value_enum, default_value_t = CrystalStructureArg::Cubic)]
    crystal_structure: CrystalStructureArg,

    /// Uniform voxel pitch on all three axes.
    #[arg(long, default_value_t = 1.0)]
    resolution: f64,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    #[arg(long)]
    packing_iterations: Option<u64>,
    #[arg(long)]
    matcher_iterations: Option<u64>,
    #[arg(long)]
    matcher_patience: Option<u64>,
    #[arg(long)]
    pool_oversample: Option<usize>,
    #[arg(long)]
    coarse_factor: Option<u32>,

    /// Flat list of axis-ODF densities, `bins^3` values (§6).
    #[arg(long)]
    axis_odf: Option<PathBuf>,
    #[arg(long, default_value_t = 18)]
    axis_odf_bins: usize,

    /// Flat list of ODF densities, `dims.0 * dims.1 * dims.2` values.
    #[arg(long)]
    odf: Option<PathBuf>,
    #[arg(long, num_args = 3, default_values_t = [18, 18, 18])]
    odf_dims: Vec<usize>,

    /// Flat list of 36 MDF densities.
    #[arg(long)]
    mdf: Option<PathBuf>,

    /// Flat list of 10 microtexture densities.
    #[arg(long)]
    microtexture: Option<PathBuf>,

    /// Directory the labeled grid, grain table, and MDF table are written
    /// to (§6 Outputs).
    #[arg(long)]
    out_dir: PathBuf,
}

fn load_axis_odf(path: &Option<PathBuf>, bins_per_axis: usize) -> Result<AxisOdfTable> {
    match path {
        None => Ok(AxisOdfTable::uniform(bins_per_axis)),
        Some(p) => {
            let density = stats_io::load_flat_floats_file(p)
                .with_context(|| format!("loading axis-ODF file {}", p.display()))?;
            let expected = bins_per_axis.pow(3);
            anyhow::ensure!(
                density.len() == expected,
                "axis-ODF file {} has {} values, expected {}",
                p.display(),
                density.len(),
                expected
            );
            let mut acc = 0.0;
            let prefix_sum = density
                .iter()
                .map(|d| {
                    acc += d;
                    acc
                })
                .collect();
            Ok(AxisOdfTable {
                bins_per_axis,
                density,
                prefix_sum,
            })
        }
    }
}

fn load_odf(path: &Option<PathBuf>, dims: (usize, usize, usize)) -> Result<OdfTable> {
    match path {
        None => Ok(OdfTable::uniform(dims)),
        Some(p) => {
            let density = stats_io::load_flat_floats_file(p)
                .with_context(|| format!("loading ODF file {}", p.display()))?;
            let expected = dims.0 * dims.1 * dims.2;
            anyhow::ensure!(
                density.len() == expected,
                "ODF file {} has {} values, expected {}",
                p.display(),
                density.len(),
                expected
            );
            Ok(OdfTable { dims, density })
        }
    }
}

fn load_mdf(path: &Option<PathBuf>) -> Result<MdfTable> {
    match path {
        None => Ok(MdfTable::zeroed()),
        Some(p) => {
            let density = stats_io::load_flat_floats_file(p)
                .with_context(|| format!("loading MDF file {}", p.display()))?;
            let bins: [f64; 36] = density
                .try_into()
                .map_err(|v: Vec<f64>| anyhow::anyhow!("MDF file must have exactly 36 values, got {}", v.len()))?;
            Ok(MdfTable { bins })
        }
    }
}

fn load_microtexture(path: &Option<PathBuf>) -> Result<MicrotextureTable> {
    match path {
        None => Ok(MicrotextureTable { bins: [0.0; 10] }),
        Some(p) => {
            let density = stats_io::load_flat_floats_file(p)
                .with_context(|| format!("loading microtexture file {}", p.display()))?;
            let bins: [f64; 10] = density.try_into().map_err(|v: Vec<f64>| {
                anyhow::anyhow!("microtexture file must have exactly 10 values, got {}", v.len())
            })?;
            Ok(MicrotextureTable { bins })
        }
    }
}

fn build_histograms(cli: &Cli) -> Result<TargetHistograms> {
    let parsed = stats_io::load_stats_file(&cli.stats)
        .with_context(|| format!("loading stats file {}", cli.stats.display()))?;

    let odf_dims = (cli.odf_dims[0], cli.odf_dims[1], cli.odf_dims[2]);

    Ok(TargetHistograms {
        size_distribution: parsed
            .size_distribution
            .context("stats file is missing a Grain_Size_Distribution block")?,
        b_over_a: parsed.b_over_a,
        c_over_a: parsed.c_over_a,
        neighbors: parsed.neighbors,
        omega3: parsed.omega3,
        axis_odf: load_axis_odf(&cli.axis_odf, cli.axis_odf_bins)?,
        odf: load_odf(&cli.odf, odf_dims)?,
        mdf: load_mdf(&cli.mdf)?,
        microtexture: load_microtexture(&cli.microtexture)?,
    })
}

fn write_outputs(cli: &Cli, output: &pipeline::SynthesisOutput) -> Result<()> {
    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating output directory {}", cli.out_dir.display()))?;

    let dims = output.fine_box.dims;
    let voxels = output.grid.iter().enumerate().map(|(flat, v)| {
        let flat = flat as u64;
        let x = (flat % dims.nx as u64) as u32;
        let y = ((flat / dims.nx as u64) % dims.ny as u64) as u32;
        let z = (flat / (dims.nx as u64 * dims.ny as u64)) as u32;
        grid_io::LabeledVoxel { x, y, z, label: v.label }
    });
    let grid_path = cli.out_dir.join("grid.csv");
    let grid_file = BufWriter::new(
        File::create(&grid_path).with_context(|| format!("creating {}", grid_path.display()))?,
    );
    grid_io::write_labeled_grid_csv(grid_file, voxels)?;

    let grain_rows: Vec<_> = output
        .grains
        .iter()
        .enumerate()
        .map(|(i, g)| ((i + 1) as u32, g))
        .collect();
    let grain_path = cli.out_dir.join("grains.csv");
    let grain_file = BufWriter::new(
        File::create(&grain_path).with_context(|| format!("creating {}", grain_path.display()))?,
    );
    grid_io::write_grain_table_csv(grain_file, &grain_rows)?;

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = RunConfig::new(
        cli.num_grains,
        cli.shape_class.into(),
        cli.crystal_structure.into(),
        Resolution::uniform(cli.resolution),
        cli.seed,
    );
    if let Some(v) = cli.packing_iterations {
        config.packing_iterations = v;
    }
    if let Some(v) = cli.matcher_iterations {
        config.matcher_iterations = v;
    }
    if let Some(v) = cli.matcher_patience {
        config.matcher_patience = v;
    }
    if let Some(v) = cli.pool_oversample {
        config.pool_oversample = v;
    }
    if let Some(v) = cli.coarse_factor {
        config.coarse_factor = v;
    }

    let hist = build_histograms(&cli)?;
    let output = pipeline::run(&config, &hist).context("synthesis pipeline failed")?;
    write_outputs(&cli, &output)?;

    tracing::info!(
        active_grains = output.grains.len(),
        matcher_accepted = output.matcher_outcome.accepted,
        "synthesis run complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
