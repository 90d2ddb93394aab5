use crate::fits_image::FitsImage;
use crate::models::{Candidate, CandidateSet};

/// Every pixel brighter than `pixel_sigma * noise`, as sky positions.
///
/// Pixels are visited row by row (y outer, x inner). Neighbouring pixels of
/// one source all come through; grouping merges them later.
pub fn select_bright_pixels(image: &FitsImage, noise: f64, pixel_sigma: f64) -> CandidateSet {
    let threshold = pixel_sigma * noise;
    let data = image.data();
    let wcs = image.wcs();

    let mut candidates = CandidateSet::new();
    for y in 0..image.height() {
        for x in 0..image.width() {
            let value = data[(y, x)];
            if value > threshold {
                let (ra, dec) = wcs.pixel_to_sky(x as f64, y as f64);
                candidates.push(Candidate {
                    ra,
                    dec,
                    peak_flux: value,
                });
            }
        }
    }

    tracing::info!(
        "✨ {} pixels above {:.6e} ({} x noise)",
        candidates.len(),
        threshold,
        pixel_sigma
    );
    candidates
}
