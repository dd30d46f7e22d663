//! No-data gap filling
//!
//! Replaces every no-data cell of an [`ElevationGrid`] with an estimate from
//! nearby valid samples:
//! 1. Inverse-distance weighting over the ORIGINAL valid cells in a window
//!    that grows ring by ring up to `search_radius`, stopping at the first
//!    ring holding any valid sample. Only source cells are read, so the
//!    result does not depend on visiting order and rows run in parallel.
//! 2. Cells with nothing inside `search_radius` copy their nearest valid
//!    cell, found by a multi-source breadth-first sweep (8-connectivity).
//!
//! Both passes are deterministic and bounded by the raster size.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Stage};
use crate::raster::{BoundingBox, ElevationGrid, LinearUnit};
use crate::tilemap::Tilemap;

/// Largest accepted `search_radius`. Holes wider than this go to the
/// nearest-cell pass.
pub const MAX_SEARCH_RADIUS: usize = 1024;

/// Gap filling parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapFillParams {
    /// Largest ring (in cells) searched for valid neighbours (default: 4)
    pub search_radius: usize,
    /// Inverse-distance exponent. 0 = plain average, 2 = classic IDW
    pub power: f32,
}

impl Default for GapFillParams {
    fn default() -> Self {
        Self {
            search_radius: 4,
            power: 2.0,
        }
    }
}

impl GapFillParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.search_radius == 0 || self.search_radius > MAX_SEARCH_RADIUS {
            return Err(PipelineError::parameter(
                Stage::GapFill,
                format!("search_radius must be in 1..={}, got {}", MAX_SEARCH_RADIUS, self.search_radius),
            ));
        }
        if !self.power.is_finite() || self.power < 0.0 {
            return Err(PipelineError::parameter(
                Stage::GapFill,
                format!("power must be a non-negative number, got {}", self.power),
            ));
        }
        Ok(())
    }
}

/// Elevation grid in which every cell holds a finite elevation.
#[derive(Clone, Debug, PartialEq)]
pub struct FilledGrid {
    heights: Tilemap<f32>,
    bounds: Option<BoundingBox>,
    unit: LinearUnit,
}

impl FilledGrid {
    /// Wrap a complete height grid. Fails if it is empty or holds a
    /// non-finite value.
    pub fn from_heights(
        heights: Tilemap<f32>,
        bounds: Option<BoundingBox>,
        unit: LinearUnit,
    ) -> Result<Self, PipelineError> {
        if heights.is_empty() {
            return Err(PipelineError::dimension(Stage::GapFill, "height grid is empty"));
        }
        if let Some((x, y, v)) = heights.iter().find(|(_, _, v)| !v.is_finite()) {
            return Err(PipelineError::parameter(
                Stage::GapFill,
                format!("cell ({}, {}) holds non-finite elevation {}", x, y, v),
            ));
        }
        Ok(Self { heights, bounds, unit })
    }

    pub fn width(&self) -> usize {
        self.heights.width
    }

    pub fn height(&self) -> usize {
        self.heights.height
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        *self.heights.get(x, y)
    }

    pub fn heights(&self) -> &Tilemap<f32> {
        &self.heights
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    pub fn unit(&self) -> LinearUnit {
        self.unit
    }
}

/// How many cells each pass filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFillReport {
    pub filled_local: usize,
    pub filled_nearest: usize,
}

impl GapFillReport {
    pub fn total(&self) -> usize {
        self.filled_local + self.filled_nearest
    }
}

/// Fill every no-data cell. Fails with `AllCellsInvalid` when there is no
/// valid sample anywhere.
pub fn fill_gaps(grid: &ElevationGrid, params: &GapFillParams) -> Result<(FilledGrid, GapFillReport), PipelineError> {
    params.validate()?;

    let width = grid.width();
    let height = grid.height();
    let source = grid.cells();

    let valid = grid.valid_count();
    if valid == 0 {
        return Err(PipelineError::AllCellsInvalid { width, height });
    }

    let missing = source.len() - valid;
    let mut report = GapFillReport::default();

    if missing == 0 {
        let heights = source.map(|c| c.unwrap_or_default());
        return Ok((FilledGrid::from_heights(heights, grid.bounds(), grid.unit())?, report));
    }

    // Pass 1: local inverse-distance weighting
    let mut local: Tilemap<Option<f32>> = Tilemap::new_with(width, height, None);
    local.par_fill_rows(|y, row| {
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = match *source.get(x, y) {
                Some(v) => Some(v),
                None => idw_estimate(source, x, y, params),
            };
        }
    });

    let unresolved = local.as_slice().iter().filter(|c| c.is_none()).count();
    report.filled_local = missing - unresolved;

    // Pass 2: nearest valid cell for whatever the window could not reach
    if unresolved > 0 {
        let nearest = nearest_valid(source);
        for (x, y, cell) in local.iter_mut() {
            if cell.is_none() {
                *cell = *nearest.get(x, y);
            }
        }
        report.filled_nearest = unresolved;
    }

    log::debug!(
        "Gap fill: {} cells by IDW, {} by nearest valid cell",
        report.filled_local,
        report.filled_nearest
    );

    // The BFS reaches every cell of a grid with at least one valid sample
    let heights = local.map(|c| c.unwrap_or_default());
    Ok((FilledGrid::from_heights(heights, grid.bounds(), grid.unit())?, report))
}

/// Inverse-distance weighted mean over the first non-empty ring around
/// `(x, y)`, or `None` if nothing valid lies within `search_radius`.
fn idw_estimate(source: &Tilemap<Option<f32>>, x: usize, y: usize, params: &GapFillParams) -> Option<f32> {
    let width = source.width as isize;
    let height = source.height as isize;
    // Rings past the far edge hold nothing
    let max_r = params.search_radius.min(source.width.max(source.height)) as isize;

    for r in 1..=max_r {
        let mut weighted = 0.0f64;
        let mut total_weight = 0.0f64;
        let mut visit = |dx: isize, dy: isize| {
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                return;
            }
            if let Some(v) = *source.get(nx as usize, ny as usize) {
                let dist = ((dx * dx + dy * dy) as f64).sqrt();
                let weight = 1.0 / dist.powf(params.power as f64);
                weighted += v as f64 * weight;
                total_weight += weight;
            }
        };

        // Only ring cells can be valid here: inner rings were empty
        for dx in -r..=r {
            visit(dx, -r);
            visit(dx, r);
        }
        for dy in (1 - r)..r {
            visit(-r, dy);
            visit(r, dy);
        }

        if total_weight > 0.0 {
            return Some((weighted / total_weight) as f32);
        }
    }

    None
}

/// For every cell, the value of the closest valid source cell in
/// 8-connected steps. Seeds are queued in row-major order, which fixes how
/// ties resolve.
fn nearest_valid(source: &Tilemap<Option<f32>>) -> Tilemap<Option<f32>> {
    let mut nearest = source.clone();
    let mut queue: VecDeque<(usize, usize)> = source
        .iter()
        .filter(|(_, _, c)| c.is_some())
        .map(|(x, y, _)| (x, y))
        .collect();

    while let Some((x, y)) = queue.pop_front() {
        let value = *nearest.get(x, y);
        for (nx, ny) in nearest.neighbors_8(x, y) {
            if nearest.get(nx, ny).is_none() {
                nearest.set(nx, ny, value);
                queue.push_back((nx, ny));
            }
        }
    }

    nearest
}
