//! Local averaging over the resampled grid.
//!
//! Both kernels are separable, so the filter runs as a horizontal pass
//! followed by a vertical pass. Taps that fall outside the grid repeat the
//! edge cell; zero padding would drag edge elevations toward sea level.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Stage};
use crate::resample::ResampledGrid;
use crate::tilemap::Tilemap;

/// Largest accepted box width and Gaussian sigma
const MAX_BOX_SIZE: usize = 255;
const MAX_SIGMA: f32 = 64.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SmoothingKernel {
    /// Unweighted mean over a `size x size` window. `size` must be odd;
    /// 1 leaves the grid unchanged.
    Box { size: usize },
    /// Gaussian blur with radius `ceil(3 * sigma)`
    Gaussian { sigma: f32 },
}

impl Default for SmoothingKernel {
    fn default() -> Self {
        SmoothingKernel::Box { size: 3 }
    }
}

impl std::fmt::Display for SmoothingKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmoothingKernel::Box { size } => write!(f, "box {}x{}", size, size),
            SmoothingKernel::Gaussian { sigma } => write!(f, "gaussian sigma={}", sigma),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    pub kernel: SmoothingKernel,
}

impl SmoothingParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self.kernel {
            SmoothingKernel::Box { size } => {
                if size == 0 || size % 2 == 0 {
                    return Err(PipelineError::parameter(
                        Stage::Smooth,
                        format!("box kernel size must be odd and positive, got {}", size),
                    ));
                }
                if size > MAX_BOX_SIZE {
                    return Err(PipelineError::parameter(
                        Stage::Smooth,
                        format!("box kernel size {} exceeds {}", size, MAX_BOX_SIZE),
                    ));
                }
            }
            SmoothingKernel::Gaussian { sigma } => {
                if !sigma.is_finite() || sigma <= 0.0 || sigma > MAX_SIGMA {
                    return Err(PipelineError::parameter(
                        Stage::Smooth,
                        format!("gaussian sigma must be in (0, {}], got {}", MAX_SIGMA, sigma),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Normalised 1-D tap weights, centre tap in the middle.
    fn taps(&self) -> Vec<f64> {
        let raw: Vec<f64> = match self.kernel {
            SmoothingKernel::Box { size } => vec![1.0; size],
            SmoothingKernel::Gaussian { sigma } => {
                let sigma = sigma as f64;
                let radius = (3.0 * sigma).ceil() as isize;
                (-radius..=radius)
                    .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
                    .collect()
            }
        };
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}

/// Smooth a resampled grid. Dimensions are preserved exactly.
pub fn smooth(grid: &ResampledGrid, params: &SmoothingParams) -> Result<ResampledGrid, PipelineError> {
    params.validate()?;

    let taps = params.taps();
    if taps.len() == 1 {
        return Ok(grid.clone());
    }
    let radius = (taps.len() / 2) as isize;
    let source = grid.heights();
    let n = source.width;

    // Horizontal pass
    let mut horizontal = Tilemap::new_with(n, source.height, 0.0f32);
    horizontal.par_fill_rows(|y, row| {
        for (x, cell) in row.iter_mut().enumerate() {
            let mut sum = 0.0f64;
            for (i, w) in taps.iter().enumerate() {
                let dx = i as isize - radius;
                sum += *source.get_clamped(x as isize + dx, y as isize) as f64 * w;
            }
            *cell = sum as f32;
        }
    });

    // Vertical pass
    let mut result = Tilemap::new_with(n, source.height, 0.0f32);
    result.par_fill_rows(|y, row| {
        for (x, cell) in row.iter_mut().enumerate() {
            let mut sum = 0.0f64;
            for (i, w) in taps.iter().enumerate() {
                let dy = i as isize - radius;
                sum += *horizontal.get_clamped(x as isize, y as isize + dy) as f64 * w;
            }
            *cell = sum as f32;
        }
    });

    log::debug!("Smoothed {} grid with {} kernel", grid.size(), params.kernel);
    Ok(ResampledGrid::with_heights(grid.size(), result))
}
