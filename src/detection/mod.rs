//! The detection pipeline: noise estimate, bright-pixel selection, grouping,
//! local-variance filtering and PSF correlation filtering.
//!
//! Every stage takes a `CandidateSet` and the full image and returns a new
//! `CandidateSet`; nothing is shared between stages except the noise value.

pub mod bright_pixels;
pub mod grouping;
pub mod local_variance;
pub mod noise;
pub mod pipeline;
pub mod psf_correlation;

pub use bright_pixels::select_bright_pixels;
pub use grouping::group_sources;
pub use local_variance::LocalVarianceFilter;
pub use noise::estimate_noise;
pub use pipeline::{DetectionPipeline, DetectionReport, StageCounts};
pub use psf_correlation::{correlation_factor, PsfCorrelator};

/// Population standard deviation (ddof = 0). Empty input gives 0.
pub(crate) fn population_std<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
