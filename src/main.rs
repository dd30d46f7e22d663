use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use dem_terrain::encoding::BitDepth;
use dem_terrain::export::{export_terrain, ExportOptions};
use dem_terrain::pipeline::{process_file, CancelToken, PipelineConfig};
use dem_terrain::resample::TargetSize;
use dem_terrain::smoothing::SmoothingKernel;
use dem_terrain::stats::HeightStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KernelArg {
    Box,
    Gaussian,
}

#[derive(Parser, Debug)]
#[command(name = "dem_terrain")]
#[command(about = "Convert a DEM raster into a terrain heightmap with layer weights")]
struct Args {
    /// Elevation raster (GeoTIFF, ESRI ASCII grid or SRTM HGT)
    input: PathBuf,

    /// Directory for heightmap.png, splat maps and terrain.json
    #[arg(short, long, default_value = "terrain_out")]
    output_dir: PathBuf,

    /// JSON pipeline config; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output size, 2^k + 1 (129, 257, 513, 1025, 2049, 4097)
    #[arg(short, long)]
    resolution: Option<usize>,

    /// Smoothing kernel
    #[arg(long, value_enum)]
    kernel: Option<KernelArg>,

    /// Box kernel width (odd)
    #[arg(long)]
    kernel_size: Option<usize>,

    /// Gaussian kernel sigma in cells
    #[arg(long)]
    sigma: Option<f32>,

    /// Heightmap bit depth
    #[arg(short, long, value_parser = ["8", "16"])]
    bit_depth: Option<String>,

    /// Gap filling search radius in cells
    #[arg(long)]
    search_radius: Option<usize>,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Write row 0 as the south edge
    #[arg(long)]
    flip: bool,

    /// Also write a headerless RAW heightmap
    #[arg(long)]
    raw: bool,

    /// Print an elevation histogram of the smoothed grid
    #[arg(long)]
    stats: bool,
}

fn build_config(args: &Args) -> Result<PipelineConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(n) = args.resolution {
        config.resolution = TargetSize::new(n)?;
    }
    if let Some(bits) = &args.bit_depth {
        config.bit_depth = if bits == "8" { BitDepth::Eight } else { BitDepth::Sixteen };
    }
    if let Some(radius) = args.search_radius {
        config.gap_fill.search_radius = radius;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }

    let kernel = args.kernel.or(match config.smoothing.kernel {
        SmoothingKernel::Box { .. } if args.kernel_size.is_some() => Some(KernelArg::Box),
        SmoothingKernel::Gaussian { .. } if args.sigma.is_some() => Some(KernelArg::Gaussian),
        _ => None,
    });
    match kernel {
        Some(KernelArg::Box) => {
            config.smoothing.kernel = SmoothingKernel::Box { size: args.kernel_size.unwrap_or(3) };
        }
        Some(KernelArg::Gaussian) => {
            config.smoothing.kernel = SmoothingKernel::Gaussian { sigma: args.sigma.unwrap_or(1.0) };
        }
        None => {}
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = build_config(&args)?;

    println!("Processing {}", args.input.display());
    println!(
        "Output: {} heightmap at {}, {} smoothing, {} layer bands",
        config.resolution,
        config.bit_depth,
        config.smoothing.kernel,
        config.layers.bands.len()
    );

    let output = process_file(&args.input, &config, &CancelToken::new())?;

    let heightmap = &output.heightmap;
    println!(
        "Elevation range: {:.1}{} to {:.1}{} (range {:.1}, quantum {:.4})",
        heightmap.min_elevation(),
        output.unit,
        heightmap.max_elevation(),
        output.unit,
        heightmap.elevation_range(),
        heightmap.quantum()
    );
    let gaps = output.report.gap_fill;
    if gaps.total() > 0 {
        println!(
            "Filled {} no-data cells ({} local, {} nearest)",
            gaps.total(),
            gaps.filled_local,
            gaps.filled_nearest
        );
    }
    if let Some(b) = output.bounds {
        println!("Bounds: S {:.5} N {:.5} W {:.5} E {:.5}", b.south, b.north, b.west, b.east);
    }

    if args.stats {
        if let Some(stats) = HeightStats::compute(output.smoothed.heights(), 20) {
            print!("{}", stats.report("SMOOTHED ELEVATION DISTRIBUTION"));
        }
    }

    let options = ExportOptions {
        flip_vertical: args.flip,
        write_raw: args.raw,
    };
    let files = export_terrain(&output, &args.output_dir, Some(&args.input), &options)?;

    println!("\nWrote:");
    println!("  {}", files.heightmap_png.display());
    if let Some(raw) = &files.heightmap_raw {
        println!("  {}", raw.display());
    }
    for splat in &files.splat_maps {
        println!("  {}", splat.display());
    }
    println!("  {}", files.metadata.display());
    println!("Total time: {:.1} ms", output.report.total_millis());

    Ok(())
}
