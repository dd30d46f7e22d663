//! DEM to terrain heightmap library
//!
//! Decodes elevation rasters, fills no-data gaps, resamples to a `2^k + 1`
//! grid, smooths, encodes a fixed-precision heightmap and paints
//! elevation-banded layer weights. Re-exports modules for use by binaries
//! and tools.

pub mod encoding;
pub mod error;
pub mod export;
pub mod gap_fill;
pub mod layers;
pub mod pipeline;
pub mod raster;
pub mod resample;
pub mod smoothing;
pub mod stats;
pub mod synthetic;
pub mod tilemap;

pub use error::{ConfigError, DecodeError, ExportError, PipelineError, Stage};
pub use pipeline::{process_file, run_pipeline, CancelToken, PipelineConfig, TerrainOutput};
