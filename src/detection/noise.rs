use nalgebra::DMatrix;

use super::population_std;
use crate::error::{InputError, Result};

/// Estimate the image noise from its negative-flux tail.
///
/// Real sources only add positive flux, so the negative pixels are taken as
/// pure noise. Reflecting them about zero gives a symmetric sample whose
/// standard deviation is the noise estimate. NaN pixels are ignored.
pub fn estimate_noise(data: &DMatrix<f64>) -> Result<f64> {
    let negatives: Vec<f64> = data.iter().copied().filter(|v| *v < 0.0).collect();
    if negatives.is_empty() {
        return Err(InputError::NoNegativePixels.into());
    }

    let sample = negatives.iter().copied().chain(negatives.iter().map(|v| -v));
    let noise = population_std(sample);

    tracing::debug!(
        "📉 Noise {:.6e} from {} negative pixels of {}",
        noise,
        negatives.len(),
        data.len()
    );
    Ok(noise)
}
