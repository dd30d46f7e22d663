//! Elevation raster decoding
//!
//! Reads a geo-referenced elevation raster into an [`ElevationGrid`]: per-cell
//! elevations with no-data cells made explicit (`None`), the bounding box and
//! the vertical unit. Supported formats:
//! - GeoTIFF (band 1, any integer or float sample type)
//! - ESRI ASCII grid (`.asc`, `.grd`)
//! - SRTM HGT tiles (`.hgt`)

pub mod ascii_grid;
pub mod geotiff;
pub mod hgt;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::tilemap::Tilemap;

/// Approximate length of one degree of latitude in kilometres.
const KM_PER_DEGREE: f64 = 111.0;

// =============================================================================
// GEOREFERENCING
// =============================================================================

/// Real-world extent of a raster, in the raster's model coordinates
/// (geographic degrees for the DEMs this crate is built for).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self { south, north, west, east }
    }

    /// Square-ish box of `radius_km` around a point, the way DEM tiles are
    /// requested from a download service.
    pub fn around(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        let lat_offset = radius_km / KM_PER_DEGREE;
        let lon_offset = radius_km / (KM_PER_DEGREE * latitude.to_radians().cos());
        Self {
            south: latitude - lat_offset,
            north: latitude + lat_offset,
            west: longitude - lon_offset,
            east: longitude + lon_offset,
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south && latitude <= self.north && longitude >= self.west && longitude <= self.east
    }
}

/// Vertical unit of the elevation samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinearUnit {
    #[default]
    Metre,
    Foot,
}

impl LinearUnit {
    pub fn to_metres(&self) -> f32 {
        match self {
            LinearUnit::Metre => 1.0,
            LinearUnit::Foot => 0.3048,
        }
    }
}

impl std::fmt::Display for LinearUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinearUnit::Metre => write!(f, "m"),
            LinearUnit::Foot => write!(f, "ft"),
        }
    }
}

// =============================================================================
// ELEVATION GRID
// =============================================================================

/// Decoded elevation raster. `None` marks a no-data cell; every `Some` is a
/// finite elevation, including negative ones below sea level.
#[derive(Clone, Debug, PartialEq)]
pub struct ElevationGrid {
    cells: Tilemap<Option<f32>>,
    bounds: Option<BoundingBox>,
    unit: LinearUnit,
}

/// True if `value` should be treated as a no-data marker.
///
/// Non-finite values are always no-data, and so are values beyond the f32
/// range (undeclared f64 fill values such as -1.79e308). A declared sentinel
/// matches with a small relative tolerance so that f32 round-off of large
/// magic numbers (e.g. -3.4028235e38) still compares equal.
pub fn is_nodata(value: f64, sentinel: Option<f64>) -> bool {
    if !value.is_finite() || value.abs() > f32::MAX as f64 {
        return true;
    }
    match sentinel {
        Some(s) if s.is_finite() => (value - s).abs() <= (s.abs() * 1e-7).max(1e-6),
        _ => false,
    }
}

impl ElevationGrid {
    /// Build from explicit cells. Fails on an empty raster or a `Some` cell
    /// that is not a finite elevation.
    pub fn new(
        cells: Tilemap<Option<f32>>,
        bounds: Option<BoundingBox>,
        unit: LinearUnit,
    ) -> Result<Self, DecodeError> {
        if cells.width == 0 || cells.height == 0 {
            return Err(DecodeError::EmptyRaster);
        }
        if let Some((x, y, Some(v))) = cells.iter().find(|(_, _, c)| c.is_some_and(|v| !v.is_finite())) {
            return Err(DecodeError::Malformed(format!("cell ({}, {}) holds non-finite elevation {}", x, y, v)));
        }
        Ok(Self { cells, bounds, unit })
    }

    /// Build from raw row-major samples, converting anything matching
    /// `nodata` (or non-finite) into an explicit no-data cell.
    pub fn from_samples(
        width: usize,
        height: usize,
        samples: &[f64],
        nodata: Option<f64>,
        bounds: Option<BoundingBox>,
        unit: LinearUnit,
    ) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 || samples.is_empty() {
            return Err(DecodeError::EmptyRaster);
        }
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| DecodeError::Malformed(format!("raster dimensions {}x{} overflow", width, height)))?;
        if samples.len() != expected {
            return Err(DecodeError::Malformed(format!(
                "expected {} samples for {}x{}, found {}",
                expected,
                width,
                height,
                samples.len()
            )));
        }

        let values = samples
            .iter()
            .map(|&v| if is_nodata(v, nodata) { None } else { Some(v as f32) })
            .collect();
        let cells = Tilemap::from_vec(width, height, values)
            .ok_or_else(|| DecodeError::Malformed("sample count does not match dimensions".to_string()))?;
        Self::new(cells, bounds, unit)
    }

    pub fn width(&self) -> usize {
        self.cells.width
    }

    pub fn height(&self) -> usize {
        self.cells.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        *self.cells.get(x, y)
    }

    pub fn cells(&self) -> &Tilemap<Option<f32>> {
        &self.cells
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    pub fn unit(&self) -> LinearUnit {
        self.unit
    }

    pub fn valid_count(&self) -> usize {
        self.cells.as_slice().iter().filter(|c| c.is_some()).count()
    }

    pub fn nodata_count(&self) -> usize {
        self.cells.len() - self.valid_count()
    }

    /// Min and max over valid cells, `None` if every cell is no-data.
    pub fn valid_range(&self) -> Option<(f32, f32)> {
        self.cells
            .as_slice()
            .iter()
            .flatten()
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f32::min(lo, v), f32::max(hi, v))),
            })
    }

    /// Same grid with elevations converted to metres.
    pub fn to_metres(&self) -> Self {
        let factor = self.unit.to_metres();
        Self {
            cells: self.cells.map(|c| c.map(|v| v * factor)),
            bounds: self.bounds,
            unit: LinearUnit::Metre,
        }
    }
}

// =============================================================================
// FORMAT DISPATCH
// =============================================================================

/// Raster container formats the decoder understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterFormat {
    GeoTiff,
    AsciiGrid,
    Hgt,
}

impl RasterFormat {
    /// Guess from the file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "tif" | "tiff" | "geotiff" => Some(Self::GeoTiff),
            "asc" | "grd" => Some(Self::AsciiGrid),
            "hgt" => Some(Self::Hgt),
            _ => None,
        }
    }

    /// Guess from the first bytes of the file and its length.
    pub fn sniff(head: &[u8], file_len: u64) -> Option<Self> {
        if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") || head.starts_with(b"II+\0") || head.starts_with(b"MM\0+") {
            return Some(Self::GeoTiff);
        }
        let text = String::from_utf8_lossy(head);
        if text.trim_start().to_lowercase().starts_with("ncols") {
            return Some(Self::AsciiGrid);
        }
        if hgt::dimension_for_len(file_len).is_some() {
            return Some(Self::Hgt);
        }
        None
    }
}

impl std::fmt::Display for RasterFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GeoTiff => write!(f, "GeoTIFF"),
            Self::AsciiGrid => write!(f, "ESRI ASCII grid"),
            Self::Hgt => write!(f, "SRTM HGT"),
        }
    }
}

/// Work out which decoder to use: extension first, magic bytes second.
pub fn detect_format(path: &Path) -> Result<RasterFormat, DecodeError> {
    if let Some(format) = RasterFormat::from_extension(path) {
        return Ok(format);
    }

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut head = [0u8; 64];
    let n = file.read(&mut head)?;

    RasterFormat::sniff(&head[..n], file_len).ok_or_else(|| {
        DecodeError::UnsupportedFormat(format!("cannot identify raster format of {}", path.display()))
    })
}

/// Decode any supported raster into an [`ElevationGrid`].
pub fn decode_raster(path: &Path) -> Result<ElevationGrid, DecodeError> {
    let format = detect_format(path)?;
    decode_raster_as(path, format)
}

/// Decode with an explicit format.
pub fn decode_raster_as(path: &Path, format: RasterFormat) -> Result<ElevationGrid, DecodeError> {
    log::debug!("Decoding {} as {}", path.display(), format);
    let grid = match format {
        RasterFormat::GeoTiff => geotiff::decode(path)?,
        RasterFormat::AsciiGrid => ascii_grid::decode(path)?,
        RasterFormat::Hgt => hgt::decode(path)?,
    };

    if grid.bounds().is_none() {
        log::warn!("{} carries no georeferencing; bounds unknown", path.display());
    }
    log::info!(
        "Decoded {}x{} {} raster ({} no-data cells)",
        grid.width(),
        grid.height(),
        format,
        grid.nodata_count()
    );
    Ok(grid)
}

// =============================================================================
// DEM INFO
// =============================================================================

/// Summary of a raster, available without running the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemInfo {
    pub format: RasterFormat,
    pub width: usize,
    pub height: usize,
    pub valid_cells: usize,
    pub nodata_cells: usize,
    pub min_elevation: Option<f32>,
    pub max_elevation: Option<f32>,
    pub bounds: Option<BoundingBox>,
    pub unit: LinearUnit,
}

impl DemInfo {
    pub fn from_grid(grid: &ElevationGrid, format: RasterFormat) -> Self {
        let range = grid.valid_range();
        Self {
            format,
            width: grid.width(),
            height: grid.height(),
            valid_cells: grid.valid_count(),
            nodata_cells: grid.nodata_count(),
            min_elevation: range.map(|r| r.0),
            max_elevation: range.map(|r| r.1),
            bounds: grid.bounds(),
            unit: grid.unit(),
        }
    }
}

/// Read a raster and summarise it.
pub fn dem_info(path: &Path) -> Result<DemInfo, DecodeError> {
    let format = detect_format(path)?;
    let grid = decode_raster_as(path, format)?;
    Ok(DemInfo::from_grid(&grid, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_nodata_detection() {
        assert!(is_nodata(-9999.0, Some(-9999.0)));
        assert!(is_nodata(f64::NAN, None));
        assert!(is_nodata(f64::INFINITY, Some(-9999.0)));
        assert!(!is_nodata(-9998.0, Some(-9999.0)));
        // Below sea level is a legitimate elevation
        assert!(!is_nodata(-86.0, Some(-9999.0)));
        assert!(!is_nodata(0.0, None));
        // GDAL's float32 default sentinel after f32 round-off
        let sentinel = -3.4028234663852886e38;
        assert!(is_nodata(f32::MIN as f64, Some(sentinel)));
        // Finite in f64 but not representable as an f32 elevation
        assert!(is_nodata(1e39, None));
        assert!(is_nodata(-1.79e308, Some(-9999.0)));
        assert!(!is_nodata(f32::MAX as f64, None));
    }

    #[test]
    fn test_out_of_range_samples_become_nodata() {
        let samples = [100.0, 200.0, 1e39, 150.0];
        let grid = ElevationGrid::from_samples(2, 2, &samples, None, None, LinearUnit::Metre).unwrap();
        assert_eq!(grid.get(0, 1), None);
        assert_eq!(grid.valid_count(), 3);
        assert_eq!(grid.valid_range(), Some((100.0, 200.0)));
    }

    #[test]
    fn test_new_rejects_non_finite_cells() {
        for bad in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN] {
            let cells = Tilemap::from_vec(2, 1, vec![Some(1.0), Some(bad)]).unwrap();
            let err = ElevationGrid::new(cells, None, LinearUnit::Metre).unwrap_err();
            assert!(matches!(err, DecodeError::Malformed(_)));
        }
        let cells = Tilemap::from_vec(2, 1, vec![Some(1.0), None]).unwrap();
        assert!(ElevationGrid::new(cells, None, LinearUnit::Metre).is_ok());
    }

    #[test]
    fn test_overflowing_dimensions_are_malformed() {
        let err = ElevationGrid::from_samples(3, usize::MAX / 3 + 1, &[1.0], None, None, LinearUnit::Metre).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_from_samples_marks_nodata() {
        let samples = [1.0, -9999.0, -20.0, f64::NAN];
        let grid = ElevationGrid::from_samples(2, 2, &samples, Some(-9999.0), None, LinearUnit::Metre).unwrap();
        assert_eq!(grid.get(0, 0), Some(1.0));
        assert_eq!(grid.get(1, 0), None);
        assert_eq!(grid.get(0, 1), Some(-20.0));
        assert_eq!(grid.get(1, 1), None);
        assert_eq!(grid.valid_count(), 2);
        assert_eq!(grid.valid_range(), Some((-20.0, 1.0)));
    }

    #[test]
    fn test_from_samples_rejects_bad_shapes() {
        let err = ElevationGrid::from_samples(0, 3, &[], None, None, LinearUnit::Metre).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyRaster));
        let err = ElevationGrid::from_samples(2, 2, &[1.0, 2.0, 3.0], None, None, LinearUnit::Metre).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_feet_conversion() {
        let grid = ElevationGrid::from_samples(1, 2, &[100.0, -9999.0], Some(-9999.0), None, LinearUnit::Foot).unwrap();
        let metres = grid.to_metres();
        assert_eq!(metres.unit(), LinearUnit::Metre);
        assert!((metres.get(0, 0).unwrap() - 30.48).abs() < 1e-4);
        assert_eq!(metres.get(0, 1), None);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(RasterFormat::from_extension(&PathBuf::from("a/dem.TIF")), Some(RasterFormat::GeoTiff));
        assert_eq!(RasterFormat::from_extension(&PathBuf::from("N47W122.hgt")), Some(RasterFormat::Hgt));
        assert_eq!(RasterFormat::from_extension(&PathBuf::from("dem.bin")), None);
        assert_eq!(RasterFormat::sniff(b"II*\0\x08\0\0\0", 1000), Some(RasterFormat::GeoTiff));
        assert_eq!(RasterFormat::sniff(b"  NCOLS 4\nnrows 4", 100), Some(RasterFormat::AsciiGrid));
        assert_eq!(RasterFormat::sniff(&[0u8; 8], 2_884_802), Some(RasterFormat::Hgt));
        assert_eq!(RasterFormat::sniff(b"garbage", 7), None);
    }

    #[test]
    fn test_bounding_box_around_point() {
        let bbox = BoundingBox::around(0.0, 10.0, 11.1);
        assert!((bbox.height() - 0.2).abs() < 1e-9);
        assert!((bbox.width() - 0.2).abs() < 1e-9);
        assert!(bbox.contains(0.05, 10.05));
        assert!(!bbox.contains(1.0, 10.0));
    }

    #[test]
    fn test_dem_info_from_ascii_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.asc");
        std::fs::write(
            &path,
            "ncols 2\nnrows 2\nxllcorner 10\nyllcorner 40\ncellsize 0.5\nNODATA_value -9999\n5 -9999\n-3 12\n",
        )
        .unwrap();

        let info = dem_info(&path).unwrap();
        assert_eq!(info.format, RasterFormat::AsciiGrid);
        assert_eq!((info.width, info.height), (2, 2));
        assert_eq!(info.nodata_cells, 1);
        assert_eq!(info.min_elevation, Some(-3.0));
        assert_eq!(info.max_elevation, Some(12.0));
        assert_eq!(info.bounds, Some(BoundingBox::new(40.0, 41.0, 10.0, 11.0)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = decode_raster(Path::new("/definitely/not/here.asc")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
