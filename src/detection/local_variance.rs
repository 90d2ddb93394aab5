use super::population_std;
use crate::fits_image::FitsImage;
use crate::models::{Candidate, CandidateSet};

/// Rejects candidates sitting in quiet patches of the image.
///
/// The statistic is the standard deviation of a square window around the
/// candidate (historically called "local variance"). A candidate passes when
/// it exceeds `variance_sigma * noise`.
#[derive(Debug, Clone)]
pub struct LocalVarianceFilter {
    pub variance_sigma: f64,
    /// Window half-width in units of the PSF footprint
    pub window_in_psfs: usize,
    /// PSF footprint in pixels
    pub psf_pixels: usize,
    /// Blank the peak's own PSF footprint before measuring
    pub mask_peak: bool,
}

impl LocalVarianceFilter {
    fn half_width(&self) -> usize {
        self.window_in_psfs * self.psf_pixels
    }

    /// Local standard deviation around a candidate, or `None` when the window
    /// runs off the image.
    ///
    /// Masking happens on a copy of the window, so each candidate sees the
    /// untouched image.
    pub fn local_std(&self, image: &FitsImage, candidate: &Candidate) -> Option<f64> {
        let (x, y) = image.wcs().sky_to_pixel_rounded(candidate.ra, candidate.dec);
        let half = self.half_width();
        let mut window = image.window(x, y, half)?;

        if self.mask_peak && self.psf_pixels > 0 {
            let psf = self.psf_pixels.min(half);
            window
                .view_mut((half - psf, half - psf), (2 * psf, 2 * psf))
                .fill(f64::NAN);
        }

        Some(population_std(
            window.iter().copied().filter(|v| !v.is_nan()),
        ))
    }

    /// Keep the candidates whose local standard deviation exceeds
    /// `variance_sigma * noise`. Off-image windows are always rejected.
    pub fn apply(&self, candidates: &CandidateSet, image: &FitsImage, noise: f64) -> CandidateSet {
        let threshold = self.variance_sigma * noise;

        let kept = candidates.filtered(|candidate| match self.local_std(image, candidate) {
            Some(local) => {
                let keep = local.abs() > threshold;
                tracing::debug!(
                    "📊 ({:.5}, {:.5}) local std {:.6e} vs {:.6e}: {}",
                    candidate.ra,
                    candidate.dec,
                    local,
                    threshold,
                    if keep { "kept" } else { "rejected" }
                );
                keep
            }
            None => {
                tracing::debug!(
                    "📊 ({:.5}, {:.5}) window off image edge, rejected",
                    candidate.ra,
                    candidate.dec
                );
                false
            }
        });

        tracing::info!(
            "📊 Local variance kept {} of {} candidates",
            kept.len(),
            candidates.len()
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits_image::test_support::test_image;

    fn candidate_at(image: &FitsImage, x: f64, y: f64) -> Candidate {
        let (ra, dec) = image.wcs().pixel_to_sky(x, y);
        Candidate {
            ra,
            dec,
            peak_flux: 0.0,
        }
    }

    /// Checkerboard of +/-amplitude: std is exactly `amplitude` on any even window.
    fn checkerboard(amplitude: f64) -> FitsImage {
        test_image(40, 40, move |y, x| {
            if (x + y) % 2 == 0 {
                amplitude
            } else {
                -amplitude
            }
        })
    }

    fn filter(variance_sigma: f64, mask_peak: bool) -> LocalVarianceFilter {
        LocalVarianceFilter {
            variance_sigma,
            window_in_psfs: 2,
            psf_pixels: 3,
            mask_peak,
        }
    }

    #[test]
    fn test_local_std_of_known_patch() {
        let image = checkerboard(2.0);
        let c = candidate_at(&image, 20.0, 20.0);
        let local = filter(1.0, false).local_std(&image, &c).unwrap();
        assert!((local - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_accepts_exactly_when_threshold_below_std() {
        let image = checkerboard(2.0);
        let set: CandidateSet = vec![candidate_at(&image, 20.0, 20.0)].into_iter().collect();

        // threshold 1.9 < 2.0
        assert_eq!(filter(1.9, false).apply(&set, &image, 1.0).len(), 1);
        // threshold 2.0 is not strictly exceeded
        assert_eq!(filter(2.0, false).apply(&set, &image, 1.0).len(), 0);
        assert_eq!(filter(1.0, false).apply(&set, &image, 2.5).len(), 0);
    }

    #[test]
    fn test_edge_candidates_rejected_for_any_threshold() {
        let image = checkerboard(2.0);
        let set: CandidateSet = vec![
            candidate_at(&image, 3.0, 20.0),
            candidate_at(&image, 20.0, 36.0),
        ]
        .into_iter()
        .collect();

        assert!(filter(0.0, false).apply(&set, &image, 1.0).is_empty());
        assert!(filter(-5.0, false).apply(&set, &image, 1.0).is_empty());
    }

    #[test]
    fn test_mask_peak_removes_source_flux() {
        // Flat zero field with a bright 2x2 peak at the candidate
        let image = test_image(40, 40, |y, x| {
            if (19..21).contains(&y) && (19..21).contains(&x) {
                100.0
            } else {
                0.0
            }
        });
        let c = candidate_at(&image, 20.0, 20.0);

        let unmasked = filter(1.0, false).local_std(&image, &c).unwrap();
        let masked = filter(1.0, true).local_std(&image, &c).unwrap();
        assert!(unmasked > 10.0);
        assert_eq!(masked, 0.0);
    }

    #[test]
    fn test_masking_does_not_leak_between_candidates() {
        let image = checkerboard(1.0);
        let a = candidate_at(&image, 18.0, 20.0);
        let b = candidate_at(&image, 21.0, 20.0);
        let f = filter(0.5, true);

        let b_alone = f.local_std(&image, &b).unwrap();
        let _ = f.local_std(&image, &a).unwrap();
        assert_eq!(f.local_std(&image, &b).unwrap(), b_alone);
        assert!(image.data().iter().all(|v| !v.is_nan()));
    }
}
