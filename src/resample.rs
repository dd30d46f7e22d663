//! Bilinear resampling onto a square `2^k + 1` output grid.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Stage};
use crate::gap_fill::FilledGrid;
use crate::tilemap::Tilemap;

/// Side length of the output heightmap. Always `2^k + 1`, `k` in `1..=12`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct TargetSize(usize);

impl TargetSize {
    pub const MAX_EXPONENT: u32 = 12;

    /// Sizes terrain engines commonly accept.
    pub const PRESETS: [TargetSize; 6] = [
        TargetSize(129),
        TargetSize(257),
        TargetSize(513),
        TargetSize(1025),
        TargetSize(2049),
        TargetSize(4097),
    ];

    pub fn new(n: usize) -> Result<Self, PipelineError> {
        let valid = n >= 3 && (n - 1).is_power_of_two() && (n - 1).trailing_zeros() <= Self::MAX_EXPONENT;
        if !valid {
            return Err(PipelineError::dimension(
                Stage::Resample,
                format!("target size {} is not 2^k + 1 with k in 1..={}", n, Self::MAX_EXPONENT),
            ));
        }
        Ok(Self(n))
    }

    /// Build from the exponent: `from_exponent(9)` is 513.
    pub fn from_exponent(k: u32) -> Result<Self, PipelineError> {
        if k == 0 || k > Self::MAX_EXPONENT {
            return Err(PipelineError::dimension(
                Stage::Resample,
                format!("size exponent {} outside 1..={}", k, Self::MAX_EXPONENT),
            ));
        }
        Ok(Self((1usize << k) + 1))
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn exponent(self) -> u32 {
        (self.0 - 1).trailing_zeros()
    }
}

impl Default for TargetSize {
    fn default() -> Self {
        TargetSize(513)
    }
}

impl TryFrom<usize> for TargetSize {
    type Error = PipelineError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        TargetSize::new(n)
    }
}

impl From<TargetSize> for usize {
    fn from(size: TargetSize) -> usize {
        size.0
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.0, self.0)
    }
}

/// Square elevation grid of `TargetSize` cells per side. Every cell is a
/// finite elevation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResampledGrid {
    size: TargetSize,
    heights: Tilemap<f32>,
}

impl ResampledGrid {
    /// Wrap an existing square grid whose side is a valid target size.
    pub fn from_heights(heights: Tilemap<f32>) -> Result<Self, PipelineError> {
        if heights.width != heights.height {
            return Err(PipelineError::dimension(
                Stage::Resample,
                format!("grid is {}x{}, expected a square", heights.width, heights.height),
            ));
        }
        let size = TargetSize::new(heights.width)?;
        Ok(Self { size, heights })
    }

    pub(crate) fn with_heights(size: TargetSize, heights: Tilemap<f32>) -> Self {
        debug_assert!(heights.width == size.get() && heights.height == size.get());
        Self { size, heights }
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        *self.heights.get(x, y)
    }

    pub fn heights(&self) -> &Tilemap<f32> {
        &self.heights
    }

    /// Smallest and largest elevation. The grid is never empty.
    pub fn min_max(&self) -> (f32, f32) {
        self.heights.min_max().unwrap_or((0.0, 0.0))
    }
}

/// Map output index `i` of an `n`-wide axis onto a `len`-wide source axis.
/// The integer product keeps `n == len` exact.
fn source_coord(i: usize, len: usize, n: usize) -> f64 {
    (i * (len - 1)) as f64 / (n - 1) as f64
}

/// Resample a filled grid to `size x size` by bilinear interpolation. Works
/// for both up- and downsampling; the output corners coincide with the
/// source corners.
pub fn resample(grid: &FilledGrid, size: TargetSize) -> ResampledGrid {
    let n = size.get();
    let source = grid.heights();
    let (src_w, src_h) = (source.width, source.height);

    let mut heights = Tilemap::new_with(n, n, 0.0f32);
    heights.par_fill_rows(|y, row| {
        let sy = source_coord(y, src_h, n);
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = source.sample_bilinear(source_coord(x, src_w, n), sy);
        }
    });

    log::debug!("Resampled {}x{} -> {}", src_w, src_h, size);
    ResampledGrid::with_heights(size, heights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::LinearUnit;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn filled(width: usize, height: usize, values: Vec<f32>) -> FilledGrid {
        FilledGrid::from_heights(Tilemap::from_vec(width, height, values).unwrap(), None, LinearUnit::Metre).unwrap()
    }

    #[test]
    fn test_target_size_validation() {
        for n in [3, 5, 9, 129, 513, 4097] {
            assert_eq!(TargetSize::new(n).unwrap().get(), n);
        }
        for n in [0, 1, 2, 4, 512, 514, 1000, 8193] {
            assert!(
                matches!(TargetSize::new(n), Err(PipelineError::DimensionMismatch { stage: Stage::Resample, .. })),
                "{} accepted",
                n
            );
        }
        assert_eq!(TargetSize::default().get(), 513);
        assert_eq!(TargetSize::from_exponent(10).unwrap().get(), 1025);
        assert_eq!(TargetSize::new(257).unwrap().exponent(), 8);
        assert!(TargetSize::PRESETS.iter().all(|p| TargetSize::new(p.get()).is_ok()));
    }

    #[test]
    fn test_target_size_deserializes_with_validation() {
        let ok: TargetSize = serde_json::from_str("1025").unwrap();
        assert_eq!(ok.get(), 1025);
        assert!(serde_json::from_str::<TargetSize>("1000").is_err());
    }

    #[test]
    fn test_identity_resampling_is_exact() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for n in [3usize, 5, 17, 65] {
            let values: Vec<f32> = (0..n * n).map(|_| rng.gen_range(-500.0..4000.0)).collect();
            let grid = filled(n, n, values.clone());
            let out = resample(&grid, TargetSize::new(n).unwrap());
            assert_eq!(out.heights().as_slice(), values.as_slice());
        }
    }

    #[test]
    fn test_upsampling_interpolates_linearly() {
        let grid = filled(2, 2, vec![0.0, 10.0, 20.0, 30.0]);
        let out = resample(&grid, TargetSize::new(3).unwrap());
        assert_eq!(out.get(0, 0), 0.0);
        assert_eq!(out.get(2, 0), 10.0);
        assert_eq!(out.get(0, 2), 20.0);
        assert_eq!(out.get(2, 2), 30.0);
        assert!((out.get(1, 0) - 5.0).abs() < 1e-5);
        assert!((out.get(1, 1) - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_downsampling_keeps_corners_and_range() {
        let (w, h) = (40, 23);
        let values: Vec<f32> = (0..w * h).map(|i| ((i % w) + (i / w) * 2) as f32).collect();
        let grid = filled(w, h, values);
        let out = resample(&grid, TargetSize::new(9).unwrap());

        assert_eq!(out.get(0, 0), grid.get(0, 0));
        assert_eq!(out.get(8, 8), grid.get(w - 1, h - 1));
        let (lo, hi) = out.min_max();
        let (src_lo, src_hi) = grid.heights().min_max().unwrap();
        assert!(lo >= src_lo && hi <= src_hi);
    }

    #[test]
    fn test_single_cell_source() {
        let grid = filled(1, 1, vec![42.0]);
        let out = resample(&grid, TargetSize::new(5).unwrap());
        assert!(out.heights().as_slice().iter().all(|&v| v == 42.0));
    }

    #[test]
    fn test_from_heights_requires_square_valid_size() {
        assert!(ResampledGrid::from_heights(Tilemap::new_with(5, 3, 0.0)).is_err());
        assert!(ResampledGrid::from_heights(Tilemap::new_with(4, 4, 0.0)).is_err());
        assert!(ResampledGrid::from_heights(Tilemap::new_with(5, 5, 0.0)).is_ok());
    }
}
