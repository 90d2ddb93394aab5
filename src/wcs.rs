//! World Coordinate System support for celestial image planes.
//!
//! Converts between 0-indexed pixel coordinates and sky coordinates (RA/Dec
//! in degrees) for the two projections found on radio and optical images:
//! SIN (orthographic, the usual radio interferometer projection) and TAN
//! (gnomonic).

/// Celestial projection named by the CTYPE keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Sin,
    Tan,
}

impl Projection {
    /// Parse the projection code from a CTYPE value such as `RA---SIN`.
    /// Unknown or missing codes fall back to TAN.
    pub fn from_ctype(ctype: Option<&str>) -> Self {
        match ctype.map(|c| c.trim().to_ascii_uppercase()) {
            Some(c) if c.ends_with("-SIN") => Projection::Sin,
            _ => Projection::Tan,
        }
    }
}

/// Linear pixel transform plus celestial projection.
#[derive(Debug, Clone)]
#[allow(clippy::upper_case_acronyms)]
pub struct Wcs {
    /// Reference pixel X (stored 0-indexed)
    pub crpix1: f64,
    /// Reference pixel Y (stored 0-indexed)
    pub crpix2: f64,
    /// RA at the reference pixel (degrees)
    pub crval1: f64,
    /// Dec at the reference pixel (degrees)
    pub crval2: f64,
    pub cd1_1: f64,
    pub cd1_2: f64,
    pub cd2_1: f64,
    pub cd2_2: f64,
    pub projection: Projection,
}

impl Wcs {
    /// Build a WCS from header keywords.
    ///
    /// Requires CRPIX1/2 and CRVAL1/2. Uses the CD matrix when all four
    /// elements are present, otherwise CDELT1/2 with an optional CROTA2.
    /// Returns `None` when a required keyword is missing or the pixel
    /// transform is singular.
    pub fn from_header<F>(mut get_keyword: F, ctype1: Option<&str>) -> Option<Self>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let crpix1 = get_keyword("CRPIX1")? - 1.0;
        let crpix2 = get_keyword("CRPIX2")? - 1.0;
        let crval1 = get_keyword("CRVAL1")?;
        let crval2 = get_keyword("CRVAL2")?;

        let (cd1_1, cd1_2, cd2_1, cd2_2) =
            if let (Some(cd1_1), Some(cd1_2), Some(cd2_1), Some(cd2_2)) = (
                get_keyword("CD1_1"),
                get_keyword("CD1_2"),
                get_keyword("CD2_1"),
                get_keyword("CD2_2"),
            ) {
                (cd1_1, cd1_2, cd2_1, cd2_2)
            } else {
                let cdelt1 = get_keyword("CDELT1")?;
                let cdelt2 = get_keyword("CDELT2")?;
                let crota2 = get_keyword("CROTA2").unwrap_or(0.0).to_radians();
                let (sin_r, cos_r) = crota2.sin_cos();
                (
                    cdelt1 * cos_r,
                    -cdelt2 * sin_r,
                    cdelt1 * sin_r,
                    cdelt2 * cos_r,
                )
            };

        let wcs = Self {
            crpix1,
            crpix2,
            crval1,
            crval2,
            cd1_1,
            cd1_2,
            cd2_1,
            cd2_2,
            projection: Projection::from_ctype(ctype1),
        };

        if wcs.determinant().abs() < 1e-30 {
            return None;
        }
        Some(wcs)
    }

    fn determinant(&self) -> f64 {
        self.cd1_1 * self.cd2_2 - self.cd1_2 * self.cd2_1
    }

    /// Convert pixel coordinates to (RA, Dec) in degrees. RA is wrapped to [0, 360).
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix1;
        let dy = y - self.crpix2;

        let xi = (self.cd1_1 * dx + self.cd1_2 * dy).to_radians();
        let eta = (self.cd2_1 * dx + self.cd2_2 * dy).to_radians();
        let ra0 = self.crval1.to_radians();
        let (sin_dec0, cos_dec0) = self.crval2.to_radians().sin_cos();

        let (ra, dec) = match self.projection {
            Projection::Tan => {
                let rho = (xi * xi + eta * eta).sqrt();
                if rho < 1e-15 {
                    (self.crval1, self.crval2)
                } else {
                    let c = rho.atan();
                    let (sin_c, cos_c) = c.sin_cos();
                    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
                    let ra = ra0
                        + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
                    (ra.to_degrees(), dec.to_degrees())
                }
            }
            Projection::Sin => {
                let n = (1.0 - xi * xi - eta * eta).max(0.0).sqrt();
                let dec = (eta * cos_dec0 + n * sin_dec0).asin();
                let ra = ra0 + xi.atan2(n * cos_dec0 - eta * sin_dec0);
                (ra.to_degrees(), dec.to_degrees())
            }
        };

        (ra.rem_euclid(360.0), dec)
    }

    /// Convert (RA, Dec) in degrees to fractional pixel coordinates.
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> (f64, f64) {
        let ra0 = self.crval1.to_radians();
        let (sin_dec0, cos_dec0) = self.crval2.to_radians().sin_cos();
        let (sin_dec, cos_dec) = dec.to_radians().sin_cos();
        let (sin_dra, cos_dra) = (ra.to_radians() - ra0).sin_cos();

        let l = cos_dec * sin_dra;
        let m = sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra;

        let (xi, eta) = match self.projection {
            Projection::Tan => {
                let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
                (l / denom, m / denom)
            }
            Projection::Sin => (l, m),
        };

        let xi = xi.to_degrees();
        let eta = eta.to_degrees();

        let det = self.determinant();
        let dx = (self.cd2_2 * xi - self.cd1_2 * eta) / det;
        let dy = (-self.cd2_1 * xi + self.cd1_1 * eta) / det;

        (self.crpix1 + dx, self.crpix2 + dy)
    }

    /// Sky position to the nearest integer pixel (x, y). May lie outside the image.
    pub fn sky_to_pixel_rounded(&self, ra: f64, dec: f64) -> (i64, i64) {
        let (x, y) = self.sky_to_pixel(ra, dec);
        (x.round() as i64, y.round() as i64)
    }

    /// Pixel scale along the declination axis in degrees per pixel.
    pub fn pixel_scale_deg(&self) -> f64 {
        (self.cd1_2 * self.cd1_2 + self.cd2_2 * self.cd2_2).sqrt()
    }
}

/// Great-circle separation between two sky positions, all in degrees.
pub fn angular_separation_deg(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (ra1, dec1, ra2, dec2) = (
        ra1.to_radians(),
        dec1.to_radians(),
        ra2.to_radians(),
        dec2.to_radians(),
    );
    let sin_ddec = ((dec2 - dec1) / 2.0).sin();
    let sin_dra = ((ra2 - ra1) / 2.0).sin();
    let h = sin_ddec * sin_ddec + dec1.cos() * dec2.cos() * sin_dra * sin_dra;
    (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
}
