//! SRTM HGT tiles: square grids of big-endian i16 samples covering one
//! degree, named after their south-west corner (e.g. `N47W122.hgt`).

use std::fs;
use std::path::Path;

use super::{BoundingBox, ElevationGrid, LinearUnit};
use crate::error::DecodeError;

/// Void marker used by SRTM.
pub const HGT_VOID: i16 = -32768;

/// Samples per side for a given file length (1 and 3 arc-second tiles).
pub fn dimension_for_len(len: u64) -> Option<usize> {
    match len {
        25_934_402 => Some(3601),
        2_884_802 => Some(1201),
        _ => None,
    }
}

/// Parse the south-west corner `(latitude, longitude)` from a tile name.
pub fn parse_tile_name(path: &Path) -> Option<(f64, f64)> {
    let stem = path.file_stem()?.to_str()?.to_uppercase();
    if stem.len() < 7 || !stem.is_ascii() {
        return None;
    }

    let lat: f64 = stem[1..3].parse().ok()?;
    let lon: f64 = stem[4..7].parse().ok()?;
    let lat = match &stem[0..1] {
        "N" => lat,
        "S" => -lat,
        _ => return None,
    };
    let lon = match &stem[3..4] {
        "E" => lon,
        "W" => -lon,
        _ => return None,
    };
    Some((lat, lon))
}

/// Outer cell edges of a tile whose corner samples sit on whole degrees.
/// Edge samples are shared with the neighbouring tiles, so the extent
/// reaches half a cell past the named degree square on every side.
pub fn tile_bounds(latitude: f64, longitude: f64, side: usize) -> BoundingBox {
    let half = 0.5 / (side.max(2) - 1) as f64;
    BoundingBox::new(latitude - half, latitude + 1.0 + half, longitude - half, longitude + 1.0 + half)
}

pub fn decode(path: &Path) -> Result<ElevationGrid, DecodeError> {
    let bytes = fs::read(path)?;
    let bounds = dimension_for_len(bytes.len() as u64)
        .zip(parse_tile_name(path))
        .map(|(side, (lat, lon))| tile_bounds(lat, lon, side));
    decode_bytes(&bytes, bounds)
}

/// Decode raw tile bytes. The tile must be one of the standard sizes.
pub fn decode_bytes(bytes: &[u8], bounds: Option<BoundingBox>) -> Result<ElevationGrid, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyRaster);
    }
    let side = dimension_for_len(bytes.len() as u64).ok_or_else(|| {
        DecodeError::Malformed(format!("{} bytes is not a 1201x1201 or 3601x3601 HGT tile", bytes.len()))
    })?;

    let samples: Vec<f64> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]) as f64)
        .collect();

    ElevationGrid::from_samples(side, side, &samples, Some(HGT_VOID as f64), bounds, LinearUnit::Metre)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_tile_names() {
        assert_eq!(parse_tile_name(&PathBuf::from("N47W122.hgt")), Some((47.0, -122.0)));
        assert_eq!(parse_tile_name(&PathBuf::from("dir/s33e151.hgt")), Some((-33.0, 151.0)));
        assert_eq!(parse_tile_name(&PathBuf::from("X47W122.hgt")), None);
        assert_eq!(parse_tile_name(&PathBuf::from("N4.hgt")), None);
    }

    #[test]
    fn test_decode_three_arcsecond_tile() {
        let side = 1201;
        let mut bytes = Vec::with_capacity(side * side * 2);
        for i in 0..side * side {
            let v: i16 = if i == 1 { HGT_VOID } else { (i % 500) as i16 - 100 };
            bytes.extend_from_slice(&v.to_be_bytes());
        }

        let grid = decode_bytes(&bytes, Some(BoundingBox::new(47.0, 48.0, -122.0, -121.0))).unwrap();
        assert_eq!(grid.width(), 1201);
        assert_eq!(grid.get(0, 0), Some(-100.0));
        assert_eq!(grid.get(1, 0), None);
        assert_eq!(grid.get(2, 0), Some(-98.0));
        assert_eq!(grid.nodata_count(), 1);
    }

    #[test]
    fn test_tile_bounds_are_outer_cell_edges() {
        let b = tile_bounds(47.0, -122.0, 1201);
        let half = 0.5 / 1200.0;
        assert!((b.south - (47.0 - half)).abs() < 1e-12);
        assert!((b.north - (48.0 + half)).abs() < 1e-12);
        assert!((b.west - (-122.0 - half)).abs() < 1e-12);
        assert!((b.east - (-121.0 + half)).abs() < 1e-12);
        // One cell per sample, like the other formats
        assert!((b.height() / 1201.0 - 1.0 / 1200.0).abs() < 1e-12);
    }

    #[test]
    fn test_decode_file_uses_tile_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S33E151.hgt");
        std::fs::write(&path, vec![0u8; 2_884_802]).unwrap();
        let grid = decode(&path).unwrap();
        assert_eq!(grid.bounds(), Some(tile_bounds(-33.0, 151.0, 1201)));
        assert_eq!(grid.valid_count(), 1201 * 1201);
    }

    #[test]
    fn test_wrong_size_is_malformed() {
        let err = decode_bytes(&[0u8; 10], None).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
