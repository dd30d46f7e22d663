//! Elevation-banded layer weights for surface material painting.
//!
//! Each band scores a texel from its normalized height `h` in `[0, 1]`;
//! scores are then normalized so that every texel's weights sum to 1.
//! Painting reads the un-quantized smoothed grid, never the encoded one.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::encoding::EncodedHeightmap;
use crate::error::{PipelineError, Stage};
use crate::resample::{ResampledGrid, TargetSize};
use crate::tilemap::Tilemap;

/// Score of a band as a function of normalized height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BandRamp {
    /// 1 at or below `start`, falling linearly to 0 at `end`
    Falling { start: f32, end: f32 },
    /// 0 at or below `start`, rising linearly to 1 at `end`
    Rising { start: f32, end: f32 },
    /// 0 outside `(low, high)`, 1 at `peak`
    Triangle { low: f32, peak: f32, high: f32 },
}

impl BandRamp {
    pub fn score(&self, h: f32) -> f32 {
        match *self {
            BandRamp::Falling { start, end } => {
                if h <= start {
                    1.0
                } else if h >= end {
                    0.0
                } else {
                    (end - h) / (end - start)
                }
            }
            BandRamp::Rising { start, end } => {
                if h <= start {
                    0.0
                } else if h >= end {
                    1.0
                } else {
                    (h - start) / (end - start)
                }
            }
            BandRamp::Triangle { low, peak, high } => {
                if h == peak {
                    1.0
                } else if h <= low || h >= high {
                    0.0
                } else if h < peak {
                    (h - low) / (peak - low)
                } else {
                    (high - h) / (high - peak)
                }
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        let ok = match *self {
            BandRamp::Falling { start, end } | BandRamp::Rising { start, end } => {
                start.is_finite() && end.is_finite() && start < end
            }
            BandRamp::Triangle { low, peak, high } => {
                low.is_finite() && peak.is_finite() && high.is_finite() && low <= peak && peak <= high && low < high
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!("degenerate ramp {:?}", self))
        }
    }
}

/// A named material band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElevationBand {
    pub name: String,
    pub ramp: BandRamp,
}

impl ElevationBand {
    pub fn new(name: impl Into<String>, ramp: BandRamp) -> Self {
        Self { name: name.into(), ramp }
    }
}

/// Band set used by the painter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Bands ordered from lowest to highest
    pub bands: Vec<ElevationBand>,
    /// Band that takes the whole texel when every score is zero.
    /// `None` spreads the weight evenly instead.
    pub default_band: Option<usize>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            bands: vec![
                ElevationBand::new("base", BandRamp::Falling { start: 0.0, end: 0.5 }),
                ElevationBand::new("transition", BandRamp::Triangle { low: 0.2, peak: 0.5, high: 0.8 }),
                ElevationBand::new("snow", BandRamp::Rising { start: 0.6, end: 1.0 }),
            ],
            default_band: Some(0),
        }
    }
}

impl LayerConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.bands.is_empty() {
            return Err(PipelineError::parameter(Stage::PaintLayers, "at least one band is required"));
        }
        if let Some(idx) = self.default_band {
            if idx >= self.bands.len() {
                return Err(PipelineError::parameter(
                    Stage::PaintLayers,
                    format!("default_band {} out of range for {} bands", idx, self.bands.len()),
                ));
            }
        }
        for band in &self.bands {
            band.ramp
                .validate()
                .map_err(|e| PipelineError::parameter(Stage::PaintLayers, format!("band {}: {}", band.name, e)))?;
        }
        Ok(())
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }
}

/// Elevation interval that normalized heights are measured against.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElevationRange {
    pub min: f32,
    pub max: f32,
}

impl ElevationRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Range recomputed from the grid itself.
    pub fn of_grid(grid: &ResampledGrid) -> Self {
        let (min, max) = grid.min_max();
        Self { min, max }
    }

    /// Range reported by the encoder.
    pub fn of_heightmap(heightmap: &EncodedHeightmap) -> Self {
        Self {
            min: heightmap.min_elevation(),
            max: heightmap.max_elevation(),
        }
    }

    /// `(elevation - min) / range` clamped to `[0, 1]`. A non-positive
    /// range puts everything at 0.
    pub fn normalize(&self, elevation: f32) -> f32 {
        let range = self.max - self.min;
        if !(range > 0.0) {
            return 0.0;
        }
        ((elevation - self.min) / range).clamp(0.0, 1.0)
    }
}

/// Per-texel band weights, stored texel-major: the `B` weights of texel
/// `(x, y)` are contiguous.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerWeights {
    size: TargetSize,
    band_names: Vec<String>,
    weights: Vec<f32>,
}

impl LayerWeights {
    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn band_count(&self) -> usize {
        self.band_names.len()
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn weights_at(&self, x: usize, y: usize) -> &[f32] {
        let b = self.band_count();
        let start = (y * self.size.get() + x) * b;
        &self.weights[start..start + b]
    }

    /// Index of the heaviest band at a texel. Ties go to the lower band.
    pub fn dominant_band_at(&self, x: usize, y: usize) -> usize {
        let weights = self.weights_at(x, y);
        let mut best = 0;
        for (i, &w) in weights.iter().enumerate() {
            if w > weights[best] {
                best = i;
            }
        }
        best
    }

    /// One band's weights as a grid.
    pub fn band_plane(&self, band: usize) -> Tilemap<f32> {
        let n = self.size.get();
        let b = self.band_count();
        let data: Vec<f32> = self.weights.iter().skip(band).step_by(b).copied().collect();
        Tilemap::from_vec(n, n, data).unwrap_or_else(|| Tilemap::new_with(n, n, 0.0))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }
}

/// Compute band weights for every texel of a smoothed grid.
pub fn paint_layers(
    grid: &ResampledGrid,
    range: ElevationRange,
    config: &LayerConfig,
) -> Result<LayerWeights, PipelineError> {
    config.validate()?;

    let n = grid.size().get();
    let b = config.bands.len();
    let heights = grid.heights();
    let mut weights = vec![0.0f32; n * n * b];

    weights.par_chunks_mut(n * b).enumerate().for_each(|(y, row)| {
        for (x, texel) in row.chunks_mut(b).enumerate() {
            let h = range.normalize(*heights.get(x, y));
            let mut total = 0.0f64;
            for (slot, band) in texel.iter_mut().zip(&config.bands) {
                let score = band.ramp.score(h).max(0.0);
                *slot = score;
                total += score as f64;
            }

            if total > 0.0 {
                for slot in texel.iter_mut() {
                    *slot = (*slot as f64 / total) as f32;
                }
            } else {
                match config.default_band {
                    Some(idx) => {
                        texel.fill(0.0);
                        texel[idx] = 1.0;
                    }
                    None => texel.fill(1.0 / b as f32),
                }
            }
        }
    });

    log::debug!("Painted {} bands over {} texels", b, n * n);
    Ok(LayerWeights {
        size: grid.size(),
        band_names: config.band_names(),
        weights,
    })
}
