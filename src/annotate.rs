//! PNG preview of an image with the detected directions circled.

use std::path::Path;

use anyhow::{Context, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut};

use crate::fits_image::FitsImage;
use crate::models::CandidateSet;

pub const MARKER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Percentiles used for the linear display stretch
const LOW_PERCENTILE: f64 = 0.5;
const HIGH_PERCENTILE: f64 = 99.5;

/// Render the image as 8-bit grey with a percentile stretch.
///
/// FITS rows run bottom to top, so row 0 of the data becomes the last row
/// of the picture. NaN pixels are drawn black.
pub fn stretched_rgb(image: &FitsImage) -> RgbImage {
    let data = image.data();
    let (width, height) = (image.width(), image.height());

    let mut finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    let (low, high) = match (
        percentile(&finite, LOW_PERCENTILE),
        percentile(&finite, HIGH_PERCENTILE),
    ) {
        (Some(low), Some(high)) => (low, high),
        _ => (0.0, 1.0),
    };
    let range = if high > low { high - low } else { 1.0 };

    RgbImage::from_fn(width as u32, height as u32, |px, py| {
        let y = height - 1 - py as usize;
        let v = data[(y, px as usize)];
        if !v.is_finite() {
            return Rgb([0, 0, 0]);
        }
        let grey = (((v - low) / range).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb([grey, grey, grey])
    })
}

fn percentile(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(rank.min(sorted.len() - 1)).copied()
}

/// Circle every detection with a radius of `radius_px` pixels.
pub fn create_annotated_image(
    image: &FitsImage,
    detections: &CandidateSet,
    radius_px: u32,
) -> RgbImage {
    let mut rgb = stretched_rgb(image);
    let height = image.height() as i64;

    for candidate in detections {
        let (x, y) = image.wcs().sky_to_pixel_rounded(candidate.ra, candidate.dec);
        let cx = x as i32;
        let cy = (height - 1 - y) as i32;
        draw_hollow_circle_mut(&mut rgb, (cx, cy), radius_px.max(2) as i32, MARKER_COLOR);
        draw_cross_mut(&mut rgb, MARKER_COLOR, cx, cy);
    }
    rgb
}

pub fn write_annotated_png<P: AsRef<Path>>(
    image: &FitsImage,
    detections: &CandidateSet,
    radius_px: u32,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let rgb = create_annotated_image(image, detections, radius_px);

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create annotated image: {}", path.display()))?;
    let writer = std::io::BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    encoder
        .write_image(&rgb, rgb.width(), rgb.height(), ColorType::Rgb8.into())
        .with_context(|| format!("Failed to encode PNG: {}", path.display()))?;

    tracing::info!(
        "🖼️  Wrote annotated image with {} markers to {:?}",
        detections.len(),
        path
    );
    Ok(())
}
