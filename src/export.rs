//! Writers for the artefacts a terrain renderer imports: the heightmap as
//! PNG and RAW, RGBA splat maps, and a JSON metadata sidecar carrying the
//! values needed to turn encoded heights back into metres.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::encoding::{BitDepth, EncodedHeightmap};
use crate::error::{ExportError, PipelineError};
use crate::layers::LayerWeights;
use crate::pipeline::{PipelineReport, TerrainOutput};
use crate::raster::{BoundingBox, LinearUnit};

/// Bands packed into one RGBA splat image
const BANDS_PER_SPLAT: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Write row 0 as the SOUTH edge (Unity terrain convention)
    pub flip_vertical: bool,
    /// Also write `heightmap.r16` / `heightmap.r8`
    pub write_raw: bool,
}

/// Sidecar describing an exported heightmap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainMetadata {
    pub size: usize,
    pub bit_depth: BitDepth,
    pub min_elevation: f32,
    pub max_elevation: f32,
    pub elevation_range: f32,
    pub unit: LinearUnit,
    pub bounds: Option<BoundingBox>,
    pub band_names: Vec<String>,
    pub flipped_vertical: bool,
    /// RFC 3339 timestamp
    pub generated_at: String,
    pub source: Option<String>,
    pub report: PipelineReport,
}

impl TerrainMetadata {
    pub fn from_output(output: &TerrainOutput, source: Option<&Path>, flipped_vertical: bool) -> Self {
        let heightmap = &output.heightmap;
        Self {
            size: heightmap.size().get(),
            bit_depth: heightmap.bit_depth(),
            min_elevation: heightmap.min_elevation(),
            max_elevation: heightmap.max_elevation(),
            elevation_range: heightmap.elevation_range(),
            unit: output.unit,
            bounds: output.bounds,
            band_names: output.layers.band_names().to_vec(),
            flipped_vertical,
            generated_at: chrono::Utc::now().to_rfc3339(),
            source: source
                .and_then(|p| p.file_name())
                .map(|name| name.to_string_lossy().into_owned()),
            report: output.report.clone(),
        }
    }

    /// Real elevation for an encoded value, as `EncodedHeightmap::decode`.
    pub fn decode(&self, value: u16) -> f32 {
        let t = value as f64 / self.bit_depth.max_value() as f64;
        (self.min_elevation as f64 + t * self.elevation_range as f64) as f32
    }
}

/// Paths written by [`export_terrain`].
#[derive(Clone, Debug, Default)]
pub struct ExportedFiles {
    pub heightmap_png: PathBuf,
    pub heightmap_raw: Option<PathBuf>,
    pub splat_maps: Vec<PathBuf>,
    pub metadata: PathBuf,
}

fn source_row(y: usize, n: usize, flip: bool) -> usize {
    if flip {
        n - 1 - y
    } else {
        y
    }
}

/// Save the heightmap as grayscale PNG at its own bit depth.
pub fn write_heightmap_png(heightmap: &EncodedHeightmap, path: &Path, flip: bool) -> Result<(), ExportError> {
    let n = heightmap.size().get();
    let values = heightmap.values();

    match heightmap.bit_depth() {
        BitDepth::Sixteen => {
            let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(n as u32, n as u32, |x, y| {
                Luma([*values.get(x as usize, source_row(y as usize, n, flip))])
            });
            img.save(path)?;
        }
        BitDepth::Eight => {
            let img: GrayImage = ImageBuffer::from_fn(n as u32, n as u32, |x, y| {
                Luma([*values.get(x as usize, source_row(y as usize, n, flip)) as u8])
            });
            img.save(path)?;
        }
    }
    Ok(())
}

/// Headerless RAW heightmap: little-endian `u16` for 16-bit, bytes for 8-bit.
pub fn write_heightmap_raw(heightmap: &EncodedHeightmap, path: &Path, flip: bool) -> Result<(), ExportError> {
    let n = heightmap.size().get();
    let values = heightmap.values();
    let mut out = BufWriter::new(File::create(path)?);

    for y in 0..n {
        let row = values.row(source_row(y, n, flip));
        match heightmap.bit_depth() {
            BitDepth::Sixteen => {
                for v in row {
                    out.write_all(&v.to_le_bytes())?;
                }
            }
            BitDepth::Eight => {
                let bytes: Vec<u8> = row.iter().map(|&v| v as u8).collect();
                out.write_all(&bytes)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// File extension matching a RAW heightmap's bit depth.
pub fn raw_extension(bit_depth: BitDepth) -> &'static str {
    match bit_depth {
        BitDepth::Eight => "r8",
        BitDepth::Sixteen => "r16",
    }
}

/// Pack layer weights into RGBA8 images, four bands each
/// (`splat_0.png`, `splat_1.png`, ...). Unused channels are zero.
pub fn write_splat_maps(layers: &LayerWeights, dir: &Path, flip: bool) -> Result<Vec<PathBuf>, ExportError> {
    let n = layers.size().get();
    let image_count = layers.band_count().div_ceil(BANDS_PER_SPLAT);
    let mut paths = Vec::with_capacity(image_count);

    for i in 0..image_count {
        let first = i * BANDS_PER_SPLAT;
        let img: RgbaImage = ImageBuffer::from_fn(n as u32, n as u32, |x, y| {
            let weights = layers.weights_at(x as usize, source_row(y as usize, n, flip));
            let mut px = [0u8; 4];
            for (c, channel) in px.iter_mut().enumerate() {
                if let Some(w) = weights.get(first + c) {
                    *channel = (w.clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
            Rgba(px)
        });

        let path = dir.join(format!("splat_{}.png", i));
        img.save(&path)?;
        paths.push(path);
    }
    Ok(paths)
}

pub fn write_metadata(metadata: &TerrainMetadata, path: &Path) -> Result<(), ExportError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, metadata)?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> Result<TerrainMetadata, ExportError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write every artefact of a run into `dir`, creating it if needed.
pub fn export_terrain(
    output: &TerrainOutput,
    dir: &Path,
    source: Option<&Path>,
    options: &ExportOptions,
) -> Result<ExportedFiles, PipelineError> {
    fs::create_dir_all(dir).map_err(ExportError::from)?;
    let flip = options.flip_vertical;

    let heightmap_png = dir.join("heightmap.png");
    write_heightmap_png(&output.heightmap, &heightmap_png, flip)?;
    log::info!("Wrote {}", heightmap_png.display());

    let heightmap_raw = if options.write_raw {
        let path = dir.join(format!("heightmap.{}", raw_extension(output.heightmap.bit_depth())));
        write_heightmap_raw(&output.heightmap, &path, flip)?;
        log::info!("Wrote {}", path.display());
        Some(path)
    } else {
        None
    };

    let splat_maps = write_splat_maps(&output.layers, dir, flip)?;
    log::info!("Wrote {} splat map(s)", splat_maps.len());

    let metadata = dir.join("terrain.json");
    write_metadata(&TerrainMetadata::from_output(output, source, flip), &metadata)?;
    log::info!("Wrote {}", metadata.display());

    Ok(ExportedFiles {
        heightmap_png,
        heightmap_raw,
        splat_maps,
        metadata,
    })
}
