use serde::{Deserialize, Serialize};

use crate::error::{InputError, Result};
use crate::fits_image::FitsImage;

/// A detected source position with the image value at its peak pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Right ascension in degrees
    pub ra: f64,
    /// Declination in degrees
    pub dec: f64,
    /// Image intensity at the candidate pixel
    pub peak_flux: f64,
}

/// Candidates in the order the producing stage emitted them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn ras(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.ra).collect()
    }

    pub fn decs(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.dec).collect()
    }

    pub fn fluxes(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.peak_flux).collect()
    }

    /// Keep the candidates for which `keep` returns true, preserving order.
    pub fn filtered<F>(&self, mut keep: F) -> CandidateSet
    where
        F: FnMut(&Candidate) -> bool,
    {
        self.candidates.iter().copied().filter(|c| keep(c)).collect()
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Beam size of an image, in degrees and in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsfFootprint {
    /// Beam major axis (BMAJ) in degrees
    pub bmaj_deg: f64,
    /// Pixel scale along declination in degrees per pixel
    pub pixel_scale_deg: f64,
    /// `round(bmaj / pixel_scale)`, at least 1
    pub pixels: usize,
}

impl PsfFootprint {
    pub fn new(bmaj_deg: f64, pixel_scale_deg: f64) -> Result<Self> {
        let pixel_scale_deg = pixel_scale_deg.abs();
        let ratio = (bmaj_deg / pixel_scale_deg).round();
        if !ratio.is_finite() || ratio < 1.0 {
            return Err(InputError::DegeneratePsf {
                bmaj: bmaj_deg,
                pixel_scale: pixel_scale_deg,
            }
            .into());
        }
        Ok(Self {
            bmaj_deg,
            pixel_scale_deg,
            pixels: ratio as usize,
        })
    }

    /// Read BMAJ and the declination pixel scale from the header. CDELT2 is
    /// used when present, otherwise the scale of the image's WCS (CD matrix).
    pub fn from_image(image: &FitsImage) -> Result<Self> {
        let bmaj = image.require_keyword("BMAJ")?;
        let scale = image
            .keyword("CDELT2")
            .unwrap_or_else(|| image.wcs().pixel_scale_deg());
        Self::new(bmaj, scale)
    }

    /// Angular grouping tolerance in degrees for a window of `psfs` beams.
    pub fn tolerance_deg(&self, psfs: f64) -> f64 {
        self.bmaj_deg * psfs
    }
}
