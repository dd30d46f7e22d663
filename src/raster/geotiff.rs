//! GeoTIFF elevation reader.
//!
//! Reads band 1 of a single-image GeoTIFF. Georeferencing comes from
//! `ModelPixelScaleTag` + `ModelTiepointTag` or, failing that, a
//! rotation-free `ModelTransformationTag`. The no-data sentinel comes from
//! GDAL's `GDAL_NODATA` ASCII tag and the vertical unit from the GeoKey
//! directory.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;

use super::{BoundingBox, ElevationGrid, LinearUnit};
use crate::error::DecodeError;

/// GeoKey ids and EPSG unit codes we care about
const VERTICAL_UNITS_GEO_KEY: u16 = 4099;
const UNIT_FOOT: u16 = 9002;
const UNIT_US_SURVEY_FOOT: u16 = 9003;

pub fn decode(path: &Path) -> Result<ElevationGrid, DecodeError> {
    let file = File::open(path)?;
    decode_reader(BufReader::new(file))
}

/// Decode a GeoTIFF from any seekable reader.
pub fn decode_reader<R: Read + Seek>(reader: R) -> Result<ElevationGrid, DecodeError> {
    let mut decoder = Decoder::new(reader)?;

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyRaster);
    }

    let channels = match decoder.colortype()? {
        ColorType::Gray(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) => 4,
        other => {
            return Err(DecodeError::UnsupportedSampleType(format!("{:?}", other)));
        }
    };

    let nodata = read_nodata(&mut decoder)?;
    let bounds = read_bounds(&mut decoder, width, height)?;
    let unit = read_vertical_unit(&mut decoder)?;

    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| DecodeError::Malformed(format!("image dimensions {}x{} overflow", width, height)))?;
    let samples = widen(decoder.read_image()?)?;
    if samples.len() != expected {
        return Err(DecodeError::Malformed(format!(
            "expected {} samples, image holds {}",
            expected,
            samples.len()
        )));
    }

    // Interleaved samples: band 1 is every `channels`-th value
    let band: Vec<f64> = if channels == 1 {
        samples
    } else {
        samples.into_iter().step_by(channels).collect()
    };

    ElevationGrid::from_samples(width, height, &band, nodata, bounds, unit)
}

fn widen(result: DecodingResult) -> Result<Vec<f64>, DecodeError> {
    #[allow(unreachable_patterns)]
    let values = match result {
        DecodingResult::U8(d) => d.into_iter().map(f64::from).collect(),
        DecodingResult::U16(d) => d.into_iter().map(f64::from).collect(),
        DecodingResult::U32(d) => d.into_iter().map(f64::from).collect(),
        DecodingResult::U64(d) => d.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(d) => d.into_iter().map(f64::from).collect(),
        DecodingResult::I16(d) => d.into_iter().map(f64::from).collect(),
        DecodingResult::I32(d) => d.into_iter().map(f64::from).collect(),
        DecodingResult::I64(d) => d.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(d) => d.into_iter().map(f64::from).collect(),
        DecodingResult::F64(d) => d,
        _ => return Err(DecodeError::UnsupportedSampleType("unrecognised TIFF sample buffer".to_string())),
    };
    Ok(values)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>, DecodeError> {
    let Some(value) = decoder.find_tag(Tag::GdalNodata)? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    match text.parse::<f64>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => {
            log::warn!("Ignoring unparseable GDAL_NODATA value {:?}", text);
            Ok(None)
        }
    }
}

fn read_f64_vec<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<f64>>, DecodeError> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

/// Outer edges of a north-up raster, assuming pixel-is-area registration.
fn read_bounds<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> Result<Option<BoundingBox>, DecodeError> {
    let scale = read_f64_vec(decoder, Tag::ModelPixelScaleTag)?;
    let tiepoint = read_f64_vec(decoder, Tag::ModelTiepointTag)?;

    let origin = match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            let (sx, sy) = (s[0], s[1]);
            let (i, j, model_x, model_y) = (t[0], t[1], t[3], t[4]);
            Some((model_x - i * sx, model_y + j * sy, sx, sy))
        }
        _ => match read_f64_vec(decoder, Tag::ModelTransformationTag)? {
            Some(m) if m.len() >= 16 => {
                if m[1] != 0.0 || m[4] != 0.0 {
                    log::warn!("Rotated GeoTIFF transforms are not supported; bounds unknown");
                    None
                } else {
                    Some((m[3], m[7], m[0], -m[5]))
                }
            }
            _ => None,
        },
    };

    Ok(origin.map(|(west, north, sx, sy)| BoundingBox {
        south: north - height as f64 * sy,
        north,
        west,
        east: west + width as f64 * sx,
    }))
}

fn read_vertical_unit<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<LinearUnit, DecodeError> {
    let Some(value) = decoder.find_tag(Tag::GeoKeyDirectoryTag)? else {
        return Ok(LinearUnit::Metre);
    };
    let keys = value.into_u16_vec()?;

    // Header is 4 shorts, then (key, location, count, value) entries
    for entry in keys.get(4..).unwrap_or_default().chunks_exact(4) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if key == VERTICAL_UNITS_GEO_KEY && location == 0 {
            return Ok(match value {
                UNIT_FOOT | UNIT_US_SURVEY_FOOT => LinearUnit::Foot,
                _ => LinearUnit::Metre,
            });
        }
    }
    Ok(LinearUnit::Metre)
}
