use nalgebra::{DMatrix, Matrix2};

use crate::error::{InputError, Result};
use crate::fits_image::FitsImage;
use crate::models::{Candidate, CandidateSet};

/// Compares the image around each candidate with a reference PSF patch.
#[derive(Debug, Clone)]
pub struct PsfCorrelator {
    reference: DMatrix<f64>,
    half_width: usize,
    threshold: f64,
}

impl PsfCorrelator {
    /// Cut the reference patch out of a PSF image, centred on its declared
    /// reference pixel (CRPIX1, CRPIX2).
    ///
    /// The patch half-width is `window_in_psfs * psf_pixels`, using the
    /// science image's PSF footprint so both patches have the same shape.
    pub fn from_image(
        psf_image: &FitsImage,
        psf_pixels: usize,
        window_in_psfs: usize,
        threshold: f64,
    ) -> Result<Self> {
        let half_width = window_in_psfs * psf_pixels;
        let (x, y) = psf_image.reference_pixel();
        let reference = psf_image.window(x, y, half_width).ok_or_else(|| {
            InputError::PsfWindowOutOfBounds {
                half_width,
                x,
                y,
                width: psf_image.width(),
                height: psf_image.height(),
            }
        })?;

        tracing::info!(
            "🎯 PSF reference patch {}x{} around pixel ({}, {}) of {:?}",
            reference.ncols(),
            reference.nrows(),
            x,
            y,
            psf_image.path().file_name().unwrap_or_default()
        );
        Ok(Self::from_reference(reference, threshold))
    }

    /// Use an already extracted square reference patch.
    pub fn from_reference(reference: DMatrix<f64>, threshold: f64) -> Self {
        let half_width = reference.nrows() / 2;
        Self {
            reference,
            half_width,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Correlation factor for one candidate, `None` when its patch runs off
    /// the image.
    pub fn candidate_factor(&self, image: &FitsImage, candidate: &Candidate) -> Option<f64> {
        let (x, y) = image.wcs().sky_to_pixel_rounded(candidate.ra, candidate.dec);
        let patch = image.window(x, y, self.half_width)?;
        if patch.shape() != self.reference.shape() {
            return None;
        }
        Some(correlation_factor(&patch, &self.reference))
    }

    /// Keep candidates whose correlation factor exceeds the threshold.
    /// Off-image patches are always rejected.
    pub fn apply(&self, candidates: &CandidateSet, image: &FitsImage) -> CandidateSet {
        let kept = candidates.filtered(|candidate| {
            let Some(factor) = self.candidate_factor(image, candidate) else {
                tracing::debug!(
                    "🎯 ({:.5}, {:.5}) patch off image edge, rejected",
                    candidate.ra,
                    candidate.dec
                );
                return false;
            };
            let keep = factor > self.threshold;
            tracing::debug!(
                "🎯 ({:.5}, {:.5}) correlation {:.4} vs {:.4}: {}",
                candidate.ra,
                candidate.dec,
                factor,
                self.threshold,
                if keep { "kept" } else { "rejected" }
            );
            keep
        });

        tracing::info!(
            "🎯 PSF correlation kept {} of {} candidates",
            kept.len(),
            candidates.len()
        );
        kept
    }
}

/// Symmetrised alignment score between a data patch and a PSF patch.
///
/// The data patch is min-max normalised, the 2x2 Pearson correlation matrix
/// of the two flattened patches is formed, and the score is the root sum of
/// squares of its anti-diagonal divided by sqrt(2). Identical patches score
/// 1.0. Flat patches have no defined correlation and score 0.
pub fn correlation_factor(patch: &DMatrix<f64>, reference: &DMatrix<f64>) -> f64 {
    let Some(normalized) = min_max_normalize(patch) else {
        return 0.0;
    };
    let Some(corr) = correlation_matrix(normalized.as_slice(), reference.as_slice()) else {
        return 0.0;
    };
    let anti_diagonal = corr[(0, 1)].powi(2) + corr[(1, 0)].powi(2);
    let factor = anti_diagonal.sqrt() / std::f64::consts::SQRT_2;
    if factor.is_finite() {
        factor
    } else {
        0.0
    }
}

fn min_max_normalize(patch: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let min = patch.iter().copied().fold(f64::INFINITY, f64::min);
    let max = patch.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return None;
    }
    Some(patch.map(|v| (v - min) / range))
}

/// Pearson correlation matrix of two equally long samples.
fn correlation_matrix(a: &[f64], b: &[f64]) -> Option<Matrix2<f64>> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = Matrix2::zeros();
    for (&va, &vb) in a.iter().zip(b) {
        let d = nalgebra::Vector2::new(va - mean_a, vb - mean_b);
        cov += d * d.transpose();
    }

    let (var_a, var_b) = (cov[(0, 0)], cov[(1, 1)]);
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    let scale = nalgebra::Vector2::new(var_a.sqrt().recip(), var_b.sqrt().recip());
    Some(Matrix2::from_diagonal(&scale) * cov * Matrix2::from_diagonal(&scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits_image::test_support::test_image;

    fn gaussian_patch(side: usize, cx: f64, cy: f64, peak: f64) -> DMatrix<f64> {
        DMatrix::from_fn(side, side, |y, x| {
            let r2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
            peak * (-r2 / 8.0).exp()
        })
    }

    #[test]
    fn test_identical_patches_score_one() {
        let psf = gaussian_patch(12, 6.0, 6.0, 1.0);
        let factor = correlation_factor(&psf, &psf);
        assert!((factor - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scaled_and_offset_patch_scores_one() {
        let psf = gaussian_patch(12, 6.0, 6.0, 1.0);
        let data = psf.map(|v| 250.0 * v - 3.0);
        assert!((correlation_factor(&data, &psf) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_anti_correlated_patch_also_scores_one() {
        let psf = gaussian_patch(12, 6.0, 6.0, 1.0);
        let inverted = psf.map(|v| -v);
        assert!((correlation_factor(&inverted, &psf) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_misaligned_patch_scores_low() {
        let psf = gaussian_patch(12, 6.0, 6.0, 1.0);
        let shifted = gaussian_patch(12, 1.0, 10.0, 1.0);
        assert!(correlation_factor(&shifted, &psf) < 0.5);
    }

    #[test]
    fn test_flat_patch_scores_zero() {
        let psf = gaussian_patch(8, 4.0, 4.0, 1.0);
        let flat = DMatrix::from_element(8, 8, 3.0);
        assert_eq!(correlation_factor(&flat, &psf), 0.0);
        assert_eq!(correlation_factor(&psf, &flat), 0.0);
    }

    #[test]
    fn test_apply_keeps_matching_source_and_rejects_edge() {
        // Source at (20, 20) shaped exactly like the reference
        let image = test_image(40, 40, |y, x| {
            let r2 = (x as f64 - 20.0).powi(2) + (y as f64 - 20.0).powi(2);
            10.0 * (-r2 / 8.0).exp()
        });
        let reference = gaussian_patch(12, 6.0, 6.0, 1.0);
        let correlator = PsfCorrelator::from_reference(reference, 0.99);

        let at = |x: f64, y: f64| {
            let (ra, dec) = image.wcs().pixel_to_sky(x, y);
            Candidate {
                ra,
                dec,
                peak_flux: 10.0,
            }
        };
        let set: CandidateSet = vec![at(20.0, 20.0), at(2.0, 20.0)].into_iter().collect();

        let factor = correlator
            .candidate_factor(&image, &set.as_slice()[0])
            .unwrap();
        assert!((factor - 1.0).abs() < 1e-9);
        assert_eq!(correlator.candidate_factor(&image, &set.as_slice()[1]), None);

        let kept = correlator.apply(&set, &image);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.as_slice()[0], set.as_slice()[0]);

        // Edge candidate is rejected even with a negative threshold
        let lenient = PsfCorrelator::from_reference(gaussian_patch(12, 6.0, 6.0, 1.0), -1.0);
        let edge_only: CandidateSet = vec![at(2.0, 20.0)].into_iter().collect();
        assert!(lenient.apply(&edge_only, &image).is_empty());
    }

    #[test]
    fn test_from_image_uses_reference_pixel() {
        // test_image puts CRPIX at (width/2, height/2) = (16, 16)
        let psf_image = test_image(32, 32, |y, x| {
            let r2 = (x as f64 - 16.0).powi(2) + (y as f64 - 16.0).powi(2);
            (-r2 / 8.0).exp()
        });
        let correlator = PsfCorrelator::from_image(&psf_image, 3, 2, 0.5).unwrap();
        assert_eq!(correlator.reference.shape(), (12, 12));
        assert_eq!(correlator.reference[(6, 6)], 1.0);
        assert_eq!(correlator.threshold(), 0.5);

        let err = PsfCorrelator::from_image(&psf_image, 3, 6, 0.5).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }
}
