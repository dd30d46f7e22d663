//! Summarise elevation rasters without running the pipeline

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use dem_terrain::raster::{decode_raster_as, detect_format, DemInfo};
use dem_terrain::stats::HeightStats;

#[derive(Parser, Debug)]
#[command(name = "dem_info")]
#[command(about = "Print size, bounds and elevation range of DEM rasters")]
struct Args {
    /// Raster files to inspect
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Emit one JSON object per file instead of text
    #[arg(long)]
    json: bool,

    /// Also print a histogram of valid elevations
    #[arg(long)]
    histogram: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    for path in &args.inputs {
        let format = detect_format(path)?;
        let grid = decode_raster_as(path, format)?;
        let info = DemInfo::from_grid(&grid, format);

        if args.json {
            println!("{}", serde_json::to_string(&info)?);
            continue;
        }

        println!("{}", path.display());
        println!("  Format:  {}", info.format);
        println!("  Size:    {}x{} ({} cells)", info.width, info.height, info.width * info.height);
        println!(
            "  No-data: {} cells ({:.2}%)",
            info.nodata_cells,
            100.0 * info.nodata_cells as f64 / (info.width * info.height) as f64
        );
        match (info.min_elevation, info.max_elevation) {
            (Some(lo), Some(hi)) => println!("  Range:   {:.2}{} to {:.2}{}", lo, info.unit, hi, info.unit),
            _ => println!("  Range:   no valid samples"),
        }
        match info.bounds {
            Some(b) => {
                let (lat, lon) = b.center();
                println!("  Bounds:  S {:.5} N {:.5} W {:.5} E {:.5}", b.south, b.north, b.west, b.east);
                println!("  Center:  {:.5}, {:.5}", lat, lon);
            }
            None => println!("  Bounds:  not georeferenced"),
        }

        if args.histogram {
            if let Some(stats) = HeightStats::compute_valid(grid.cells(), 20) {
                print!("{}", stats.report("ELEVATION DISTRIBUTION"));
            }
        }
    }

    Ok(())
}
