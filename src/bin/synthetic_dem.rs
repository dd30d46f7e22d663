//! Write a synthetic DEM as an ESRI ASCII grid

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use dem_terrain::raster::ascii_grid::write_ascii_grid;
use dem_terrain::raster::BoundingBox;
use dem_terrain::synthetic::{generate_dem, SyntheticDemParams};

#[derive(Parser, Debug)]
#[command(name = "synthetic_dem")]
#[command(about = "Generate a fractal test DEM with no-data holes")]
struct Args {
    /// Output .asc path
    #[arg(default_value = "synthetic.asc")]
    output: PathBuf,

    #[arg(short = 'W', long, default_value = "257")]
    width: usize,

    #[arg(short = 'H', long, default_value = "257")]
    height: usize,

    /// Random seed (uses random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Peak-to-trough relief in metres
    #[arg(long, default_value = "2400")]
    relief: f32,

    /// Fraction of scattered no-data cells
    #[arg(long, default_value = "0.01")]
    holes: f64,

    /// Number of circular voids
    #[arg(long, default_value = "2")]
    voids: usize,

    /// Centre latitude and longitude, and radius in km, for the bounds
    #[arg(long, num_args = 3, value_names = ["LAT", "LON", "RADIUS_KM"])]
    around: Option<Vec<f64>>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut params = SyntheticDemParams {
        width: args.width,
        height: args.height,
        seed,
        relief: args.relief,
        hole_fraction: args.holes,
        void_patches: args.voids,
        ..SyntheticDemParams::default()
    };
    if let Some(around) = &args.around {
        params.bounds = Some(BoundingBox::around(around[0], around[1], around[2]));
    }

    let grid = generate_dem(&params)?;
    write_ascii_grid(&grid, &args.output)?;

    println!("Generated DEM with seed: {}", seed);
    println!("Size: {}x{}, {} no-data cells", grid.width(), grid.height(), grid.nodata_count());
    if let Some((lo, hi)) = grid.valid_range() {
        println!("Elevation: {:.1}m to {:.1}m", lo, hi);
    }
    println!("Wrote {}", args.output.display());

    Ok(())
}
