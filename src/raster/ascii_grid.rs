//! ESRI ASCII grid reader and writer.
//!
//! Header keys (case-insensitive): `ncols`, `nrows`, `xllcorner|xllcenter`,
//! `yllcorner|yllcenter`, `cellsize` (or GDAL's `dx`/`dy` for non-square
//! cells), optional `nodata_value`. Samples follow row by row starting with
//! the northernmost row.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::{BoundingBox, ElevationGrid, LinearUnit};
use crate::error::DecodeError;

/// Sentinel assumed when the header declares none.
pub const DEFAULT_NODATA: f64 = -9999.0;

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: Option<f64>,
    yll: Option<f64>,
    centered: bool,
    cellsize: Option<f64>,
    dx: Option<f64>,
    dy: Option<f64>,
    nodata: Option<f64>,
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, DecodeError> {
    raw.parse()
        .map_err(|_| DecodeError::Malformed(format!("bad value {:?} for header key {}", raw, key)))
}

pub fn decode(path: &Path) -> Result<ElevationGrid, DecodeError> {
    let file = File::open(path)?;
    decode_reader(BufReader::new(file))
}

/// Parse an ASCII grid from any buffered reader.
pub fn decode_reader<R: BufRead>(reader: R) -> Result<ElevationGrid, DecodeError> {
    let mut header = Header::default();
    let mut samples: Vec<f64> = Vec::new();
    let mut in_body = false;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if !in_body {
            let mut parts = trimmed.split_whitespace();
            let key = parts.next().unwrap_or_default().to_lowercase();
            let starts_numeric = key.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
            if !starts_numeric {
                let raw = parts
                    .next()
                    .ok_or_else(|| DecodeError::Malformed(format!("header key {} has no value", key)))?;
                match key.as_str() {
                    "ncols" => header.ncols = Some(parse_value(&key, raw)?),
                    "nrows" => header.nrows = Some(parse_value(&key, raw)?),
                    "xllcorner" => header.xll = Some(parse_value(&key, raw)?),
                    "yllcorner" => header.yll = Some(parse_value(&key, raw)?),
                    "xllcenter" => {
                        header.xll = Some(parse_value(&key, raw)?);
                        header.centered = true;
                    }
                    "yllcenter" => {
                        header.yll = Some(parse_value(&key, raw)?);
                        header.centered = true;
                    }
                    "cellsize" => header.cellsize = Some(parse_value(&key, raw)?),
                    "dx" => header.dx = Some(parse_value(&key, raw)?),
                    "dy" => header.dy = Some(parse_value(&key, raw)?),
                    "nodata_value" => header.nodata = Some(parse_value(&key, raw)?),
                    other => log::debug!("Ignoring ASCII grid header key {}", other),
                }
                continue;
            }
            in_body = true;
        }

        for token in trimmed.split_whitespace() {
            let value: f64 = token
                .parse()
                .map_err(|_| DecodeError::Malformed(format!("bad sample {:?}", token)))?;
            samples.push(value);
        }
    }

    let ncols = header.ncols.ok_or_else(|| DecodeError::Malformed("missing ncols".to_string()))?;
    let nrows = header.nrows.ok_or_else(|| DecodeError::Malformed("missing nrows".to_string()))?;
    if ncols == 0 || nrows == 0 {
        return Err(DecodeError::EmptyRaster);
    }

    let cell_x = header.dx.or(header.cellsize);
    let cell_y = header.dy.or(header.cellsize);
    let bounds = match (header.xll, header.yll, cell_x, cell_y) {
        (Some(x), Some(y), Some(dx), Some(dy)) => {
            // Centre-registered origins sit half a cell inside the outer edge
            let (west, south) = if header.centered { (x - dx / 2.0, y - dy / 2.0) } else { (x, y) };
            Some(BoundingBox {
                south,
                north: south + nrows as f64 * dy,
                west,
                east: west + ncols as f64 * dx,
            })
        }
        _ => None,
    };

    let nodata = Some(header.nodata.unwrap_or(DEFAULT_NODATA));
    ElevationGrid::from_samples(ncols, nrows, &samples, nodata, bounds, LinearUnit::Metre)
}

/// Write a grid as an ESRI ASCII grid. No-data cells use [`DEFAULT_NODATA`].
///
/// Cell sizes come from the bounds. Square cells are written as `cellsize`,
/// anything else as `dx`/`dy`. Without bounds the grid is written in unit
/// cells anchored at the origin.
pub fn write_ascii_grid(grid: &ElevationGrid, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let (west, south, dx, dy) = match grid.bounds() {
        Some(b) => (b.west, b.south, b.width() / grid.width() as f64, b.height() / grid.height() as f64),
        None => (0.0, 0.0, 1.0, 1.0),
    };

    writeln!(out, "ncols {}", grid.width())?;
    writeln!(out, "nrows {}", grid.height())?;
    writeln!(out, "xllcorner {}", west)?;
    writeln!(out, "yllcorner {}", south)?;
    if (dx - dy).abs() <= 1e-12 * dx.abs().max(dy.abs()) {
        writeln!(out, "cellsize {}", dx)?;
    } else {
        writeln!(out, "dx {}", dx)?;
        writeln!(out, "dy {}", dy)?;
    }
    writeln!(out, "NODATA_value {}", DEFAULT_NODATA)?;

    for y in 0..grid.height() {
        let row: Vec<String> = (0..grid.width())
            .map(|x| match grid.get(x, y) {
                Some(v) => v.to_string(),
                None => DEFAULT_NODATA.to_string(),
            })
            .collect();
        writeln!(out, "{}", row.join(" "))?;
    }

    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_with_corner_origin() {
        let text = "ncols 3\nnrows 2\nxllcorner -112.5\nyllcorner 36.0\ncellsize 0.25\nNODATA_value -32768\n\
                    10 20 30\n-32768 -5.5 60\n";
        let grid = decode_reader(Cursor::new(text)).unwrap();
        assert_eq!((grid.width(), grid.height()), (3, 2));
        assert_eq!(grid.get(0, 0), Some(10.0));
        assert_eq!(grid.get(0, 1), None);
        assert_eq!(grid.get(1, 1), Some(-5.5));

        let bounds = grid.bounds().unwrap();
        assert_eq!(bounds.west, -112.5);
        assert_eq!(bounds.east, -111.75);
        assert_eq!(bounds.south, 36.0);
        assert_eq!(bounds.north, 36.5);
    }

    #[test]
    fn test_decode_with_center_origin_and_default_nodata() {
        let text = "NCOLS 2\nNROWS 2\nXLLCENTER 0.5\nYLLCENTER 0.5\nCELLSIZE 1\n1 -9999\n3 4\n";
        let grid = decode_reader(Cursor::new(text)).unwrap();
        assert_eq!(grid.get(1, 0), None);
        let bounds = grid.bounds().unwrap();
        assert_eq!((bounds.west, bounds.south, bounds.east, bounds.north), (0.0, 0.0, 2.0, 2.0));
    }

    #[test]
    fn test_sample_count_mismatch_is_malformed() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
        let err = decode_reader(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_missing_dimensions() {
        let err = decode_reader(Cursor::new("xllcorner 0\n1 2\n")).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        let err = decode_reader(Cursor::new("ncols 0\nnrows 4\n")).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyRaster));
    }

    #[test]
    fn test_write_then_read_back() {
        let text = "ncols 2\nnrows 2\nxllcorner 5\nyllcorner 45\ncellsize 0.5\nNODATA_value -9999\n1.5 -9999\n-2 8\n";
        let grid = decode_reader(Cursor::new(text)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.asc");
        write_ascii_grid(&grid, &path).unwrap();
        let again = decode(&path).unwrap();

        assert_eq!(again, grid);
    }

    #[test]
    fn test_non_square_cells_survive_write_and_read() {
        let text = "ncols 4\nnrows 2\nxllcorner 8\nyllcorner 46\ndx 0.5\ndy 0.25\n1 2 3 4\n5 6 7 8\n";
        let grid = decode_reader(Cursor::new(text)).unwrap();
        assert_eq!(grid.bounds(), Some(BoundingBox::new(46.0, 46.5, 8.0, 10.0)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.asc");
        write_ascii_grid(&grid, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("dx 0.5"));
        assert!(written.contains("dy 0.25"));

        let again = decode(&path).unwrap();
        let b = again.bounds().unwrap();
        assert_eq!((b.south, b.north, b.west, b.east), (46.0, 46.5, 8.0, 10.0));
        assert_eq!(again.get(3, 1), Some(8.0));
    }

    #[test]
    fn test_overflowing_header_is_malformed() {
        let err = decode_reader(Cursor::new("ncols 3\nnrows 12297829382473034411\n1\n")).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_sample_beyond_f32_range_is_nodata() {
        let grid = decode_reader(Cursor::new("ncols 2\nnrows 2\n100 200\n1e39 150\n")).unwrap();
        assert_eq!(grid.get(0, 1), None);
        assert_eq!(grid.valid_range(), Some((100.0, 200.0)));
    }
}
