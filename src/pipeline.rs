//! Raster-to-heightmap pipeline.
//!
//! A strict linear sequence of pure transforms:
//!
//! ```text
//! decode -> gap fill -> resample -> smooth -> encode
//!                                         \-> paint layers
//! ```
//!
//! Every parameter is validated before the first stage runs. Any failure
//! aborts the run and nothing partial is returned. Cancellation is
//! cooperative and checked between stages.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::encoding::{encode, BitDepth, EncodedHeightmap};
use crate::error::{ConfigError, PipelineError, Stage};
use crate::gap_fill::{fill_gaps, GapFillParams, GapFillReport};
use crate::layers::{paint_layers, ElevationRange, LayerConfig, LayerWeights};
use crate::raster::{decode_raster, BoundingBox, ElevationGrid, LinearUnit};
use crate::resample::{resample, ResampledGrid, TargetSize};
use crate::smoothing::{smooth, SmoothingParams};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Everything a pipeline run needs besides the input raster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output side length, `2^k + 1` (default: 513)
    pub resolution: TargetSize,
    pub gap_fill: GapFillParams,
    pub smoothing: SmoothingParams,
    pub bit_depth: BitDepth,
    pub layers: LayerConfig,
    /// Worker threads. `None` uses the global rayon pool
    pub threads: Option<usize>,
}

impl PipelineConfig {
    /// Check every stage's parameters.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.gap_fill.validate()?;
        self.smoothing.validate()?;
        self.layers.validate()?;
        Ok(())
    }

    /// Read a JSON config. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Shared flag for stopping a run between stages. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            log::info!("Pipeline cancelled before {}", stage);
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub millis: f64,
}

/// Timings and counters collected during a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub source_width: usize,
    pub source_height: usize,
    pub gap_fill: GapFillReport,
    pub timings: Vec<StageTiming>,
}

impl PipelineReport {
    pub fn total_millis(&self) -> f64 {
        self.timings.iter().map(|t| t.millis).sum()
    }

    pub fn millis_for(&self, stage: Stage) -> Option<f64> {
        self.timings.iter().find(|t| t.stage == stage).map(|t| t.millis)
    }

    fn record(&mut self, stage: Stage, start: Instant) {
        let millis = start.elapsed().as_secs_f64() * 1000.0;
        log::info!("Finished {} in {:.1} ms", stage, millis);
        self.timings.push(StageTiming { stage, millis });
    }
}

/// Everything the rendering side consumes from one run.
#[derive(Clone, Debug)]
pub struct TerrainOutput {
    pub heightmap: EncodedHeightmap,
    pub layers: LayerWeights,
    /// Smoothed elevations the heightmap and layers were derived from
    pub smoothed: ResampledGrid,
    pub bounds: Option<BoundingBox>,
    /// Unit of `smoothed` and of the heightmap's min/max (always metres)
    pub unit: LinearUnit,
    pub report: PipelineReport,
}

// =============================================================================
// ORCHESTRATION
// =============================================================================

/// Run every stage after decoding on an in-memory grid.
pub fn run_pipeline(
    grid: &ElevationGrid,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<TerrainOutput, PipelineError> {
    config.validate()?;

    match config.threads {
        Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => {
                log::debug!("Running pipeline on {} worker threads", pool.current_num_threads());
                pool.install(|| run_stages(grid, config, cancel))
            }
            Err(e) => {
                log::warn!("Could not build a {}-thread pool ({}), using the global pool", threads, e);
                run_stages(grid, config, cancel)
            }
        },
        None => run_stages(grid, config, cancel),
    }
}

fn run_stages(
    grid: &ElevationGrid,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<TerrainOutput, PipelineError> {
    let mut report = PipelineReport {
        source_width: grid.width(),
        source_height: grid.height(),
        ..PipelineReport::default()
    };

    let converted;
    let grid = if grid.unit() == LinearUnit::Metre {
        grid
    } else {
        log::info!("Converting elevations from {} to metres", grid.unit());
        converted = grid.to_metres();
        &converted
    };

    cancel.check(Stage::GapFill)?;
    log::info!(
        "Filling gaps in {}x{} grid ({} no-data cells)",
        grid.width(),
        grid.height(),
        grid.nodata_count()
    );
    let start = Instant::now();
    let (filled, gap_report) = fill_gaps(grid, &config.gap_fill)?;
    report.gap_fill = gap_report;
    report.record(Stage::GapFill, start);

    cancel.check(Stage::Resample)?;
    log::info!("Resampling to {}", config.resolution);
    let start = Instant::now();
    let resampled = resample(&filled, config.resolution);
    drop(filled);
    report.record(Stage::Resample, start);

    cancel.check(Stage::Smooth)?;
    log::info!("Smoothing with {} kernel", config.smoothing.kernel);
    let start = Instant::now();
    let smoothed = smooth(&resampled, &config.smoothing)?;
    drop(resampled);
    report.record(Stage::Smooth, start);

    cancel.check(Stage::Encode)?;
    log::info!("Encoding heightmap at {}", config.bit_depth);
    let start = Instant::now();
    let heightmap = encode(&smoothed, config.bit_depth);
    report.record(Stage::Encode, start);

    cancel.check(Stage::PaintLayers)?;
    log::info!("Painting {} layer bands", config.layers.bands.len());
    let start = Instant::now();
    let layers = paint_layers(&smoothed, ElevationRange::of_heightmap(&heightmap), &config.layers)?;
    report.record(Stage::PaintLayers, start);

    Ok(TerrainOutput {
        heightmap,
        layers,
        smoothed,
        bounds: grid.bounds(),
        unit: LinearUnit::Metre,
        report,
    })
}

/// Decode a raster file and run the pipeline on it.
pub fn process_file(
    path: &Path,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<TerrainOutput, PipelineError> {
    config.validate()?;
    cancel.check(Stage::Decode)?;

    log::info!("Decoding {}", path.display());
    let start = Instant::now();
    let grid = decode_raster(path)?;
    let decode_ms = start.elapsed().as_secs_f64() * 1000.0;
    log::info!("Finished {} in {:.1} ms", Stage::Decode, decode_ms);

    let mut output = run_pipeline(&grid, config, cancel)?;
    output.report.timings.insert(
        0,
        StageTiming {
            stage: Stage::Decode,
            millis: decode_ms,
        },
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ascii_grid::write_ascii_grid;
    use crate::smoothing::SmoothingKernel;
    use crate::tilemap::Tilemap;

    fn grid_from(width: usize, height: usize, cells: Vec<Option<f32>>) -> ElevationGrid {
        ElevationGrid::new(Tilemap::from_vec(width, height, cells).unwrap(), None, LinearUnit::Metre).unwrap()
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            resolution: TargetSize::new(9).unwrap(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_flat_grid_end_to_end() {
        let grid = grid_from(4, 3, vec![Some(100.0); 12]);
        let output = run_pipeline(&grid, &small_config(), &CancelToken::new()).unwrap();

        let n = output.heightmap.size().get();
        assert_eq!(n, 9);
        for y in 0..n {
            for x in 0..n {
                assert_eq!(output.heightmap.decode_at(x, y), 100.0);
                assert_eq!(output.layers.weights_at(x, y)[0], 1.0);
            }
        }
    }

    #[test]
    fn test_spike_scenario() {
        let mut cells = vec![Some(0.0f32); 9];
        cells[4] = Some(10.0);
        let config = PipelineConfig {
            resolution: TargetSize::new(5).unwrap(),
            ..PipelineConfig::default()
        };
        let output = run_pipeline(&grid_from(3, 3, cells), &config, &CancelToken::new()).unwrap();

        let smoothed = &output.smoothed;
        assert!(smoothed.get(2, 2) < 10.0);
        for (x, y) in [(1, 2), (3, 2), (2, 1), (2, 3)] {
            assert!(smoothed.get(x, y) > 0.0);
        }
        // Decoding stays within a quantum of the smoothed surface
        let quantum = output.heightmap.quantum();
        for (x, y, &v) in smoothed.heights().iter() {
            assert!((output.heightmap.decode_at(x, y) - v).abs() <= quantum);
        }
    }

    #[test]
    fn test_gaps_are_reported() {
        let mut cells = vec![Some(50.0f32); 25];
        cells[12] = None;
        let output = run_pipeline(&grid_from(5, 5, cells), &small_config(), &CancelToken::new()).unwrap();
        assert_eq!(output.report.gap_fill.filled_local, 1);
        assert_eq!(output.report.source_width, 5);
        assert!(output.report.millis_for(Stage::Smooth).is_some());
    }

    #[test]
    fn test_all_invalid_aborts() {
        let err = run_pipeline(&grid_from(2, 2, vec![None; 4]), &small_config(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::AllCellsInvalid { .. }));
        assert!(err.to_string().contains("gap filling"));
    }

    #[test]
    fn test_invalid_config_rejected_before_any_stage() {
        let config = PipelineConfig {
            smoothing: SmoothingParams { kernel: SmoothingKernel::Box { size: 2 } },
            ..small_config()
        };
        // All-invalid input would fail in gap filling; validation must win
        let err = run_pipeline(&grid_from(2, 2, vec![None; 4]), &config, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { stage: Stage::Smooth, .. }));
    }

    #[test]
    fn test_cancelled_run_returns_no_output() {
        let cancel = CancelToken::new();
        let clone = cancel.clone();
        clone.cancel();
        let err = run_pipeline(&grid_from(2, 2, vec![Some(1.0); 4]), &small_config(), &cancel).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: Stage::GapFill }));
    }

    #[test]
    fn test_fixed_thread_pool() {
        let config = PipelineConfig {
            threads: Some(2),
            ..small_config()
        };
        let grid = grid_from(3, 3, (0..9).map(|i| Some(i as f32)).collect());
        let pooled = run_pipeline(&grid, &config, &CancelToken::new()).unwrap();
        let global = run_pipeline(&grid, &small_config(), &CancelToken::new()).unwrap();
        assert_eq!(pooled.heightmap, global.heightmap);
    }

    #[test]
    fn test_feet_are_converted() {
        let cells = Tilemap::from_vec(2, 1, vec![Some(0.0), Some(1000.0)]).unwrap();
        let grid = ElevationGrid::new(cells, None, LinearUnit::Foot).unwrap();
        let config = PipelineConfig {
            smoothing: SmoothingParams { kernel: SmoothingKernel::Box { size: 1 } },
            ..small_config()
        };
        let output = run_pipeline(&grid, &config, &CancelToken::new()).unwrap();
        assert_eq!(output.unit, LinearUnit::Metre);
        assert!((output.heightmap.max_elevation() - 304.8).abs() < 0.5);
    }

    #[test]
    fn test_process_file_and_config_load() {
        let dir = tempfile::tempdir().unwrap();
        let raster = dir.path().join("dem.asc");
        let grid = grid_from(4, 4, (0..16).map(|i| if i == 5 { None } else { Some(i as f32 * 10.0) }).collect());
        write_ascii_grid(&grid, &raster).unwrap();

        let config_path = dir.path().join("config.json");
        fs::write(&config_path, r#"{"resolution": 17, "bit_depth": 8, "threads": 1}"#).unwrap();
        let config = PipelineConfig::load(&config_path).unwrap();
        assert_eq!(config.resolution.get(), 17);
        assert_eq!(config.gap_fill, GapFillParams::default());

        let output = process_file(&raster, &config, &CancelToken::new()).unwrap();
        assert_eq!(output.heightmap.size().get(), 17);
        assert_eq!(output.heightmap.bit_depth(), BitDepth::Eight);
        assert_eq!(output.report.timings[0].stage, Stage::Decode);
        assert_eq!(output.report.gap_fill.total(), 1);
    }

    #[test]
    fn test_out_of_range_sample_is_filled_not_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let raster = dir.path().join("overflow.asc");
        fs::write(&raster, "ncols 2\nnrows 2\n100 200\n1e39 150\n").unwrap();

        let output = process_file(&raster, &small_config(), &CancelToken::new()).unwrap();
        assert_eq!(output.report.gap_fill.total(), 1);
        let heightmap = &output.heightmap;
        assert!(heightmap.elevation_range().is_finite());
        assert!(heightmap.min_elevation() >= 100.0 && heightmap.max_elevation() <= 200.0);
        assert!(output.smoothed.heights().as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_bad_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"resolution": 500}"#).unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(ConfigError::Parse(_))));
        fs::write(&path, r#"{"layers": {"bands": []}}"#).unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = process_file(Path::new("/nonexistent/dem.asc"), &small_config(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.stage(), Stage::Decode);
    }
}
