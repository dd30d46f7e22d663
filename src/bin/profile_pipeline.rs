//! Profiling tool to find which pipeline stage dominates

use std::error::Error;

use clap::Parser;

use dem_terrain::error::Stage;
use dem_terrain::pipeline::{run_pipeline, CancelToken, PipelineConfig};
use dem_terrain::resample::TargetSize;
use dem_terrain::synthetic::{generate_dem, SyntheticDemParams};

#[derive(Parser, Debug)]
#[command(name = "profile_pipeline")]
#[command(about = "Time each pipeline stage on a synthetic DEM")]
struct Args {
    /// Synthetic source width and height
    #[arg(short, long, default_value = "1201")]
    size: usize,

    /// Output resolution
    #[arg(short, long, default_value = "1025")]
    resolution: usize,

    /// Fraction of scattered no-data cells
    #[arg(long, default_value = "0.02")]
    holes: f64,

    /// Runs to average over
    #[arg(short = 'n', long, default_value = "3")]
    runs: usize,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    #[arg(long, default_value = "1337")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let params = SyntheticDemParams {
        width: args.size,
        height: args.size,
        seed: args.seed,
        hole_fraction: args.holes,
        void_patches: 4,
        void_radius: args.size / 40,
        ..SyntheticDemParams::default()
    };
    let config = PipelineConfig {
        resolution: TargetSize::new(args.resolution)?,
        threads: args.threads,
        ..PipelineConfig::default()
    };

    println!("=== Pipeline Profiling ===");
    println!("Source: {}x{} ({} cells)", args.size, args.size, args.size * args.size);
    println!("Output: {}", config.resolution);

    let grid = generate_dem(&params)?;
    println!("No-data cells: {}", grid.nodata_count());
    println!();

    let stages = [Stage::GapFill, Stage::Resample, Stage::Smooth, Stage::Encode, Stage::PaintLayers];
    let mut totals = [0.0f64; 5];
    let runs = args.runs.max(1);

    for run in 0..runs {
        let output = run_pipeline(&grid, &config, &CancelToken::new())?;
        println!("Run {}: {:.1} ms", run + 1, output.report.total_millis());
        for (total, stage) in totals.iter_mut().zip(stages) {
            *total += output.report.millis_for(stage).unwrap_or(0.0);
        }
    }

    let sum: f64 = totals.iter().sum();
    println!("\n=== Summary (mean of {} runs) ===", runs);
    for (total, stage) in totals.iter().zip(stages) {
        let mean = total / runs as f64;
        let share = if sum > 0.0 { 100.0 * total / sum } else { 0.0 };
        println!("{:<20} {:>6.2}% ({:.2} ms)", stage.to_string(), share, mean);
    }
    println!("─────────────────────────────────");
    println!("{:<20} {:>6.2} ms", "Total", sum / runs as f64);

    Ok(())
}
