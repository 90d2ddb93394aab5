use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fitrs::{Fits, FitsData, FitsDataArray, HeaderValue};
use nalgebra::DMatrix;

use crate::error::{InputError, Result};
use crate::wcs::Wcs;

/// Numeric header keywords kept after loading.
const NUMERIC_KEYWORDS: &[&str] = &[
    "BMAJ", "BMIN", "BPA", "BSCALE", "BZERO", "CRPIX1", "CRPIX2", "CRVAL1", "CRVAL2", "CDELT1",
    "CDELT2", "CROTA2", "CD1_1", "CD1_2", "CD2_1", "CD2_2",
];

/// A single celestial image plane with its header and coordinate system.
///
/// Pixel data is stored with rows along the declination axis (y) and
/// columns along the right-ascension axis (x), so `data[(y, x)]` is the
/// value at FITS pixel (x + 1, y + 1).
#[derive(Debug, Clone)]
pub struct FitsImage {
    path: PathBuf,
    data: DMatrix<f64>,
    keywords: HashMap<String, f64>,
    wcs: Wcs,
}

impl FitsImage {
    /// Load the primary HDU of a FITS file.
    ///
    /// Cubes are reduced to their first plane: index 0 along every axis
    /// beyond NAXIS2 (frequency, Stokes, ...). Integer data has BSCALE/BZERO
    /// applied and BLANK pixels become NaN.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tracing::debug!("📂 Opening FITS image {:?}", path);

        let fits = Fits::open(&path).map_err(|source| InputError::Open {
            path: path.clone(),
            source,
        })?;
        let hdu = fits
            .get(0)
            .ok_or_else(|| InputError::MissingHdu { path: path.clone() })?;

        let mut keywords = HashMap::new();
        for &key in NUMERIC_KEYWORDS {
            if let Some(value) = hdu.value(key).and_then(header_f64) {
                keywords.insert(key.to_string(), value);
            }
        }
        let ctype1 = match hdu.value("CTYPE1") {
            Some(HeaderValue::CharacterString(s)) => Some(s.clone()),
            _ => None,
        };

        let bscale = keywords.get("BSCALE").copied().unwrap_or(1.0);
        let bzero = keywords.get("BZERO").copied().unwrap_or(0.0);
        let scale_int = |v: Option<f64>| v.map_or(f64::NAN, |v| v * bscale + bzero);

        let (shape, values): (Vec<usize>, Vec<f64>) = match hdu.read_data() {
            FitsData::FloatingPoint64(FitsDataArray { shape, data }) => {
                (shape.clone(), data.clone())
            }
            FitsData::FloatingPoint32(FitsDataArray { shape, data }) => {
                (shape.clone(), data.iter().map(|&v| v as f64).collect())
            }
            FitsData::IntegersI32(FitsDataArray { shape, data }) => (
                shape.clone(),
                data.iter().map(|v| scale_int(v.map(|v| v as f64))).collect(),
            ),
            FitsData::IntegersU32(FitsDataArray { shape, data }) => (
                shape.clone(),
                data.iter().map(|v| scale_int(v.map(|v| v as f64))).collect(),
            ),
            FitsData::Characters(_) => {
                return Err(InputError::UnsupportedLayout {
                    path,
                    reason: "character data is not an image".to_string(),
                }
                .into())
            }
        };

        let data = first_plane(&path, &shape, &values)?;

        let wcs = Wcs::from_header(|key| keywords.get(key).copied(), ctype1.as_deref())
            .ok_or_else(|| InputError::MissingKeyword {
                path: path.clone(),
                keyword: "CRPIX1/CRPIX2, CRVAL1/CRVAL2 and CDELT1/CDELT2 (or CD matrix)"
                    .to_string(),
            })?;

        tracing::info!(
            "📂 Loaded {:?}: {}x{} plane (shape {:?})",
            path.file_name().unwrap_or_default(),
            data.ncols(),
            data.nrows(),
            shape
        );

        Ok(Self {
            path,
            data,
            keywords,
            wcs,
        })
    }

    /// Build an image from an in-memory plane. `data` is indexed `(y, x)`.
    pub fn from_parts(
        path: impl Into<PathBuf>,
        data: DMatrix<f64>,
        keywords: HashMap<String, f64>,
        wcs: Wcs,
    ) -> Self {
        Self {
            path: path.into(),
            data,
            keywords,
            wcs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn wcs(&self) -> &Wcs {
        &self.wcs
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn keyword(&self, key: &str) -> Option<f64> {
        self.keywords.get(key).copied()
    }

    /// Numeric keyword that must be present.
    pub fn require_keyword(&self, key: &str) -> Result<f64> {
        self.keyword(key).ok_or_else(|| {
            InputError::MissingKeyword {
                path: self.path.clone(),
                keyword: key.to_string(),
            }
            .into()
        })
    }

    /// Pixel value at integer coordinates, `None` outside the image.
    pub fn value_at(&self, x: i64, y: i64) -> Option<f64> {
        if x < 0 || y < 0 {
            return None;
        }
        self.data.get((y as usize, x as usize)).copied()
    }

    /// Copy of the square window with rows `[y - half, y + half)` and
    /// columns `[x - half, x + half)`. `None` unless the whole window lies
    /// inside the image on both axes.
    pub fn window(&self, x: i64, y: i64, half_width: usize) -> Option<DMatrix<f64>> {
        let half = half_width as i64;
        let fits = |c: i64, len: usize| c - half >= 0 && c + half <= len as i64;
        if half_width == 0 || !fits(x, self.width()) || !fits(y, self.height()) {
            return None;
        }
        let side = 2 * half_width;
        let start = ((y - half) as usize, (x - half) as usize);
        Some(self.data.view(start, (side, side)).into_owned())
    }

    /// The WCS reference pixel rounded to integer 0-indexed (x, y).
    pub fn reference_pixel(&self) -> (i64, i64) {
        (
            self.wcs.crpix1.round() as i64,
            self.wcs.crpix2.round() as i64,
        )
    }
}

fn header_f64(value: &HeaderValue) -> Option<f64> {
    match value {
        HeaderValue::RealFloatingNumber(v) => Some(*v),
        HeaderValue::IntegerNumber(v) => Some(*v as f64),
        _ => None,
    }
}

/// Extract the leading 2-D plane. FITS axes run fastest-first, so the plane
/// is the first `NAXIS1 * NAXIS2` values in row-major (y, x) order.
fn first_plane(path: &Path, shape: &[usize], values: &[f64]) -> Result<DMatrix<f64>> {
    if shape.len() < 2 {
        return Err(InputError::UnsupportedLayout {
            path: path.to_path_buf(),
            reason: format!("expected at least 2 axes, found {}", shape.len()),
        }
        .into());
    }
    let (width, height) = (shape[0], shape[1]);
    if width == 0 || height == 0 || values.len() < width * height {
        return Err(InputError::UnsupportedLayout {
            path: path.to_path_buf(),
            reason: format!(
                "plane of {}x{} does not match {} data values",
                width,
                height,
                values.len()
            ),
        }
        .into());
    }
    if shape[2..].iter().any(|&n| n > 1) {
        tracing::debug!("🧊 Cube {:?} reduced to its first plane", shape);
    }
    Ok(DMatrix::from_row_slice(
        height,
        width,
        &values[..width * height],
    ))
}


#[cfg(test)]
mod tests {
    use super::test_support::test_image;
    use super::*;
    use fitrs::Hdu;
    use tempfile::TempDir;

    #[test]
    fn test_window_inside_and_outside() {
        let image = test_image(20, 10, |y, x| (y * 100 + x) as f64);

        let win = image.window(10, 5, 3).expect("window fits");
        assert_eq!(win.shape(), (6, 6));
        assert_eq!(win[(0, 0)], 207.0); // y=2, x=7
        assert_eq!(win[(5, 5)], 712.0); // y=7, x=12

        // Exactly touching both edges is still a full window
        assert!(image.window(3, 3, 3).is_some());
        assert!(image.window(17, 7, 3).is_some());

        assert!(image.window(2, 5, 3).is_none());
        assert!(image.window(18, 5, 3).is_none());
        assert!(image.window(10, 8, 3).is_none());
        assert!(image.window(10, 5, 0).is_none());
    }

    #[test]
    fn test_value_at() {
        let image = test_image(4, 3, |y, x| (y * 10 + x) as f64);
        assert_eq!(image.value_at(3, 2), Some(23.0));
        assert_eq!(image.value_at(4, 0), None);
        assert_eq!(image.value_at(0, -1), None);
    }

    #[test]
    fn test_require_keyword() {
        let image = test_image(4, 4, |_, _| 0.0);
        assert!((image.require_keyword("BMAJ").unwrap() - 3.0 / 3600.0).abs() < 1e-15);
        let err = image.require_keyword("BMIN").unwrap_err();
        assert!(err.to_string().contains("BMIN"));
    }

    #[test]
    fn test_open_cube_takes_first_plane() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cube.fits");

        // 4 x 3 spatial, 2 channels: the second channel is all 99
        let mut data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        data.extend(std::iter::repeat(99.0).take(12));
        let mut hdu = Hdu::new(&[4, 3, 2], data);
        hdu.insert("CTYPE1", "RA---SIN");
        hdu.insert("CRPIX1", 3.0);
        hdu.insert("CRPIX2", 2.0);
        hdu.insert("CRVAL1", 10.0);
        hdu.insert("CRVAL2", -20.0);
        hdu.insert("CDELT1", -0.001);
        hdu.insert("CDELT2", 0.001);
        hdu.insert("BMAJ", 0.003);
        Fits::create(&path, hdu).unwrap();

        let image = FitsImage::open(&path).unwrap();
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 3);
        assert_eq!(image.value_at(0, 0), Some(0.0));
        assert_eq!(image.value_at(3, 0), Some(3.0));
        assert_eq!(image.value_at(0, 2), Some(8.0));
        assert_eq!(image.reference_pixel(), (2, 1));
        assert_eq!(image.wcs().projection, crate::wcs::Projection::Sin);
        assert!((image.keyword("BMAJ").unwrap() - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_open_applies_bscale_and_bzero_to_integers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scaled.fits");

        let mut hdu = Hdu::new(&[2, 2], vec![1i32, 2, 3, 4]);
        hdu.insert("BSCALE", 0.5);
        hdu.insert("BZERO", -1.0);
        hdu.insert("CRPIX1", 1.0);
        hdu.insert("CRPIX2", 1.0);
        hdu.insert("CRVAL1", 10.0);
        hdu.insert("CRVAL2", -20.0);
        hdu.insert("CDELT1", -0.001);
        hdu.insert("CDELT2", 0.001);
        Fits::create(&path, hdu).unwrap();

        let image = FitsImage::open(&path).unwrap();
        let values: Vec<f64> = (0..2)
            .flat_map(|y| (0..2).map(move |x| (x, y)))
            .map(|(x, y)| image.value_at(x, y).unwrap())
            .collect();
        assert_eq!(values, vec![-0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_open_missing_file() {
        let err = FitsImage::open("/nonexistent/image.fits").unwrap_err();
        assert!(matches!(
            err,
            crate::error::DetectionError::Input(InputError::Open { .. })
        ));
    }

    #[test]
    fn test_open_without_wcs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nowcs.fits");
        let hdu = Hdu::new(&[2, 2], vec![1.0f32, 2.0, 3.0, 4.0]);
        Fits::create(&path, hdu).unwrap();

        let err = FitsImage::open(&path).unwrap_err();
        assert!(err.to_string().contains("Missing header keyword"));
    }
}
