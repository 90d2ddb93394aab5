use serde::{Deserialize, Serialize};

use super::{estimate_noise, group_sources, select_bright_pixels, LocalVarianceFilter, PsfCorrelator};
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::fits_image::FitsImage;
use crate::models::{CandidateSet, PsfFootprint};

/// Number of candidates left after each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub bright_pixels: usize,
    pub grouped: usize,
    pub after_variance: usize,
    /// `None` when no PSF image was supplied
    pub after_correlation: Option<usize>,
}

/// Outcome of a full detection run on one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub noise: f64,
    pub psf: PsfFootprint,
    pub tolerance_deg: f64,
    pub stage_counts: StageCounts,
    pub detections: CandidateSet,
}

/// Runs noise estimation, selection, grouping, local variance and (with a
/// PSF image) correlation filtering in that order.
pub struct DetectionPipeline {
    config: DetectionConfig,
}

impl DetectionPipeline {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, image: &FitsImage, psf_image: Option<&FitsImage>) -> Result<DetectionReport> {
        self.config.validate()?;

        let psf = PsfFootprint::from_image(image)?;
        let tolerance_deg = psf.tolerance_deg(self.config.group_window);
        tracing::info!(
            "🔭 PSF {:.3}\" = {} px, grouping tolerance {:.6} deg",
            psf.bmaj_deg * 3600.0,
            psf.pixels,
            tolerance_deg
        );

        // Computed once on the untouched image and reused by every threshold
        let noise = estimate_noise(image.data())?;
        tracing::info!("📉 Noise estimate {:.6e}", noise);

        let bright = select_bright_pixels(image, noise, self.config.pixel_sigma);
        let grouped = group_sources(&bright, image, tolerance_deg);

        let variance_filter = LocalVarianceFilter {
            variance_sigma: self.config.variance_sigma,
            window_in_psfs: self.config.variance_window,
            psf_pixels: psf.pixels,
            mask_peak: self.config.mask_peak,
        };
        let after_variance = variance_filter.apply(&grouped, image, noise);

        let (detections, after_correlation) = match psf_image {
            Some(psf_image) => {
                let correlator = PsfCorrelator::from_image(
                    psf_image,
                    psf.pixels,
                    self.config.correlation_window,
                    self.config.correlation_threshold,
                )?;
                let correlated = correlator.apply(&after_variance, image);
                let count = correlated.len();
                (correlated, Some(count))
            }
            None => (after_variance.clone(), None),
        };

        if detections.is_empty() {
            tracing::warn!("⚠️  No candidate survived the detection pipeline");
        }

        Ok(DetectionReport {
            noise,
            psf,
            tolerance_deg,
            stage_counts: StageCounts {
                bright_pixels: bright.len(),
                grouped: grouped.len(),
                after_variance: after_variance.len(),
                after_correlation,
            },
            detections,
        })
    }
}
