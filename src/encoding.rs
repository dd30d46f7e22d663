//! Fixed-precision heightmap encoding.
//!
//! Elevations are mapped linearly onto `[0, max_value]` over the observed
//! `[min, max]` of the grid. The min, max and range travel with the encoded
//! values; without them real elevations cannot be reconstructed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resample::{ResampledGrid, TargetSize};
use crate::tilemap::Tilemap;

/// Range substituted for a perfectly flat grid
pub const FLAT_EPSILON: f32 = 1e-6;

/// Precision of the encoded heightmap. Values are stored as `u16` either
/// way; `Eight` only uses the low 256 levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    Eight,
    #[default]
    Sixteen,
}

impl BitDepth {
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }

    /// Largest encodable value.
    pub fn max_value(self) -> u16 {
        match self {
            BitDepth::Eight => u8::MAX as u16,
            BitDepth::Sixteen => u16::MAX,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(BitDepth::Eight),
            16 => Some(BitDepth::Sixteen),
            _ => None,
        }
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        BitDepth::from_bits(bits).ok_or_else(|| format!("unsupported bit depth {}, expected 8 or 16", bits))
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> u8 {
        depth.bits()
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Encoded heightmap plus the parameters needed to decode it.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedHeightmap {
    size: TargetSize,
    bit_depth: BitDepth,
    values: Tilemap<u16>,
    min_elevation: f32,
    max_elevation: f32,
    elevation_range: f32,
}

impl EncodedHeightmap {
    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn values(&self) -> &Tilemap<u16> {
        &self.values
    }

    pub fn min_elevation(&self) -> f32 {
        self.min_elevation
    }

    pub fn max_elevation(&self) -> f32 {
        self.max_elevation
    }

    /// `max - min`, or [`FLAT_EPSILON`] for a flat grid
    pub fn elevation_range(&self) -> f32 {
        self.elevation_range
    }

    pub fn get(&self, x: usize, y: usize) -> u16 {
        *self.values.get(x, y)
    }

    /// Real elevation for an encoded value: `min + v / max_value * range`.
    pub fn decode(&self, value: u16) -> f32 {
        let t = value as f64 / self.bit_depth.max_value() as f64;
        (self.min_elevation as f64 + t * self.elevation_range as f64) as f32
    }

    pub fn decode_at(&self, x: usize, y: usize) -> f32 {
        self.decode(self.get(x, y))
    }

    /// Encoded value scaled to `[0, 1]`.
    pub fn normalized_at(&self, x: usize, y: usize) -> f32 {
        self.get(x, y) as f32 / self.bit_depth.max_value() as f32
    }

    /// Elevation step between adjacent encoded values.
    pub fn quantum(&self) -> f32 {
        self.elevation_range / self.bit_depth.max_value() as f32
    }
}

/// Encode a smoothed grid at the given bit depth.
///
/// A flat grid gets range [`FLAT_EPSILON`] and every cell sits at the
/// midpoint of the encodable range.
pub fn encode(grid: &ResampledGrid, bit_depth: BitDepth) -> EncodedHeightmap {
    let (min, max) = grid.min_max();
    let source = grid.heights();
    let max_value = bit_depth.max_value();
    let n = source.width;

    let flat = max - min <= 0.0;
    let mut values = Tilemap::new_with(n, n, 0u16);

    let range = if flat {
        values.fill((max_value as u32 + 1).div_ceil(2) as u16);
        FLAT_EPSILON
    } else {
        let range = max - min;
        let scale = max_value as f64 / range as f64;
        values.par_fill_rows(|y, row| {
            for (x, cell) in row.iter_mut().enumerate() {
                let t = (*source.get(x, y) as f64 - min as f64) * scale;
                *cell = t.round().clamp(0.0, max_value as f64) as u16;
            }
        });
        range
    };

    log::debug!(
        "Encoded {} heightmap at {}: min {:.2}, max {:.2}, range {:.2}{}",
        grid.size(),
        bit_depth,
        min,
        max,
        range,
        if flat { " (flat)" } else { "" }
    );

    EncodedHeightmap {
        size: grid.size(),
        bit_depth,
        values,
        min_elevation: min,
        max_elevation: max,
        elevation_range: range,
    }
}
