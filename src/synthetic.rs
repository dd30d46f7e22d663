//! Deterministic synthetic DEMs for fixtures and profiling.
//!
//! Terrain is fractal Perlin noise; no-data is knocked out as scattered
//! single cells plus a few circular voids, the way SRTM tiles lose data
//! over water and steep shadowed slopes.

use noise::{NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::DecodeError;
use crate::raster::{BoundingBox, ElevationGrid, LinearUnit};
use crate::tilemap::Tilemap;

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticDemParams {
    pub width: usize,
    pub height: usize,
    pub seed: u64,
    /// Elevation of the noise midpoint in metres
    pub base_elevation: f32,
    /// Peak-to-trough amplitude in metres
    pub relief: f32,
    /// Noise cycles across the grid's longer side
    pub frequency: f64,
    pub octaves: u32,
    pub persistence: f64,
    pub lacunarity: f64,
    /// Probability that any single cell is no-data
    pub hole_fraction: f64,
    /// Number of circular voids
    pub void_patches: usize,
    pub void_radius: usize,
    pub bounds: Option<BoundingBox>,
}

impl Default for SyntheticDemParams {
    fn default() -> Self {
        Self {
            width: 257,
            height: 257,
            seed: 42,
            base_elevation: 1200.0,
            relief: 2400.0,
            frequency: 4.0,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
            hole_fraction: 0.01,
            void_patches: 2,
            void_radius: 6,
            bounds: Some(BoundingBox::around(46.5, 8.0, 20.0)),
        }
    }
}

fn fbm(noise: &Perlin, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for _ in 0..octaves {
        total += amplitude * noise.get([x * frequency, y * frequency]);
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    if max_value > 0.0 {
        total / max_value
    } else {
        0.0
    }
}

/// Build a synthetic elevation grid. The same parameters always give the
/// same grid. At least one cell is kept valid.
pub fn generate_dem(params: &SyntheticDemParams) -> Result<ElevationGrid, DecodeError> {
    let (width, height) = (params.width, params.height);
    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyRaster);
    }

    let noise = Perlin::new(params.seed as u32);
    let scale = params.frequency / width.max(height) as f64;

    let mut heights = Tilemap::new_with(width, height, 0.0f32);
    heights.par_fill_rows(|y, row| {
        for (x, cell) in row.iter_mut().enumerate() {
            let n = fbm(
                &noise,
                x as f64 * scale,
                y as f64 * scale,
                params.octaves,
                params.persistence,
                params.lacunarity,
            );
            *cell = params.base_elevation + (n as f32) * params.relief * 0.5;
        }
    });

    let mut cells = heights.map(|&h| Some(h));
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

    let hole_fraction = params.hole_fraction.clamp(0.0, 1.0);
    if hole_fraction > 0.0 {
        for (_, _, cell) in cells.iter_mut() {
            if rng.gen_bool(hole_fraction) {
                *cell = None;
            }
        }
    }

    let r = params.void_radius as isize;
    for _ in 0..params.void_patches {
        let cx = rng.gen_range(0..width) as isize;
        let cy = rng.gen_range(0..height) as isize;
        for dy in -r..=r {
            for dx in -r..=r {
                let (x, y) = (cx + dx, cy + dy);
                if dx * dx + dy * dy <= r * r && x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
                    cells.set(x as usize, y as usize, None);
                }
            }
        }
    }

    if cells.as_slice().iter().all(|c| c.is_none()) {
        cells.set(0, 0, Some(*heights.get(0, 0)));
    }

    ElevationGrid::new(cells, params.bounds, LinearUnit::Metre)
}
