use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the detection library.
///
/// Candidates whose windows run off the image edge are not errors; the
/// filters reject them silently. Stages that leave nothing behind return an
/// empty `CandidateSet` rather than failing.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Problems with the images, headers or catalogs handed to the tool.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to open FITS file '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("FITS file '{path}' has no primary HDU")]
    MissingHdu { path: PathBuf },

    #[error("Unsupported data layout in '{path}': {reason}")]
    UnsupportedLayout { path: PathBuf, reason: String },

    #[error("Missing header keyword '{keyword}' in '{path}'")]
    MissingKeyword { path: PathBuf, keyword: String },

    #[error("Image has no negative pixels, noise cannot be estimated")]
    NoNegativePixels,

    #[error("PSF footprint rounds to zero pixels (BMAJ={bmaj} deg, pixel scale={pixel_scale} deg)")]
    DegeneratePsf { bmaj: f64, pixel_scale: f64 },

    #[error(
        "PSF reference window of half-width {half_width} around ({x}, {y}) does not fit in the {width}x{height} PSF image"
    )]
    PsfWindowOutOfBounds {
        half_width: usize,
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },

    #[error("Failed to read catalog '{path}': {source}")]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed sky model '{path}' at line {line}: {reason}")]
    MalformedCatalog {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Invalid detection thresholds or window sizes.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a finite, non-negative multiplier, got {value}")]
    InvalidMultiplier { name: &'static str, value: f64 },

    #[error("{name} must be at least one PSF wide")]
    ZeroWindow { name: &'static str },

    #[error("group_window must be positive, got {0}")]
    InvalidGroupWindow(f64),

    #[error("correlation_threshold must be finite, got {0}")]
    InvalidCorrelationThreshold(f64),

    #[error("tag_name must not be empty")]
    EmptyTagName,
}

pub type Result<T, E = DetectionError> = std::result::Result<T, E>;
