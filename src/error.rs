//! Error types for raster decoding, the heightmap pipeline and export.

use std::fmt;

/// Pipeline stage, used to name where a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    Decode,
    GapFill,
    Resample,
    Smooth,
    Encode,
    PaintLayers,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode => write!(f, "raster decoding"),
            Self::GapFill => write!(f, "gap filling"),
            Self::Resample => write!(f, "resampling"),
            Self::Smooth => write!(f, "smoothing"),
            Self::Encode => write!(f, "heightmap encoding"),
            Self::PaintLayers => write!(f, "layer painting"),
            Self::Export => write!(f, "export"),
        }
    }
}

/// Errors that can occur while reading an elevation raster.
#[derive(Debug)]
pub enum DecodeError {
    /// IO error (file not found, permissions, truncated read)
    Io(std::io::Error),
    /// Extension and magic bytes match no known raster format
    UnsupportedFormat(String),
    /// Sample type the decoder cannot turn into elevations
    UnsupportedSampleType(String),
    /// Header or payload is inconsistent
    Malformed(String),
    /// Raster has zero rows or columns
    EmptyRaster,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Io(e) => write!(f, "IO error: {}", e),
            DecodeError::UnsupportedFormat(e) => write!(f, "Unsupported raster format: {}", e),
            DecodeError::UnsupportedSampleType(e) => write!(f, "Unsupported sample type: {}", e),
            DecodeError::Malformed(e) => write!(f, "Malformed raster: {}", e),
            DecodeError::EmptyRaster => write!(f, "Raster contains no samples"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Io(e)
    }
}

impl From<tiff::TiffError> for DecodeError {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => DecodeError::Io(io),
            tiff::TiffError::UnsupportedError(u) => DecodeError::UnsupportedFormat(u.to_string()),
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

/// Errors that can occur while writing pipeline artefacts.
#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Image(image::ImageError),
    Json(serde_json::Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "IO error: {}", e),
            ExportError::Image(e) => write!(f, "Image error: {}", e),
            ExportError::Json(e) => write!(f, "Metadata error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Image(e) => Some(e),
            ExportError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<image::ImageError> for ExportError {
    fn from(e: image::ImageError) -> Self {
        ExportError::Image(e)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Json(e)
    }
}

/// Errors that can occur while loading a pipeline configuration file.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    /// File parsed but a value is out of range
    Invalid(PipelineError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Config parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<PipelineError> for ConfigError {
    fn from(e: PipelineError) -> Self {
        ConfigError::Invalid(e)
    }
}

/// Errors that abort a pipeline run. Every variant names the failing stage.
#[derive(Debug)]
pub enum PipelineError {
    /// The raster could not be read
    Decode(DecodeError),
    /// Not a single valid elevation sample to interpolate from
    AllCellsInvalid { width: usize, height: usize },
    /// Requested size is not `2^k + 1`, or an input grid is empty
    DimensionMismatch { stage: Stage, message: String },
    /// A configuration value is out of range
    InvalidParameter { stage: Stage, message: String },
    /// The caller cancelled the run before `stage` started
    Cancelled { stage: Stage },
    /// Writing an artefact failed
    Export(ExportError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Decode(_) => Stage::Decode,
            PipelineError::AllCellsInvalid { .. } => Stage::GapFill,
            PipelineError::DimensionMismatch { stage, .. } => *stage,
            PipelineError::InvalidParameter { stage, .. } => *stage,
            PipelineError::Cancelled { stage } => *stage,
            PipelineError::Export(_) => Stage::Export,
        }
    }

    pub(crate) fn dimension(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::DimensionMismatch { stage, message: message.into() }
    }

    pub(crate) fn parameter(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::InvalidParameter { stage, message: message.into() }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = self.stage();
        match self {
            PipelineError::Decode(e) => write!(f, "{} failed: {}", stage, e),
            PipelineError::AllCellsInvalid { width, height } => write!(
                f,
                "{} failed: all {}x{} cells are no-data, nothing to interpolate from",
                stage, width, height
            ),
            PipelineError::DimensionMismatch { message, .. } => {
                write!(f, "{} failed: dimension mismatch: {}", stage, message)
            }
            PipelineError::InvalidParameter { message, .. } => {
                write!(f, "{} failed: invalid parameter: {}", stage, message)
            }
            PipelineError::Cancelled { .. } => write!(f, "cancelled before {}", stage),
            PipelineError::Export(e) => write!(f, "{} failed: {}", stage, e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Decode(e) => Some(e),
            PipelineError::Export(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for PipelineError {
    fn from(e: DecodeError) -> Self {
        PipelineError::Decode(e)
    }
}

impl From<ExportError> for PipelineError {
    fn from(e: ExportError) -> Self {
        PipelineError::Export(e)
    }
}
