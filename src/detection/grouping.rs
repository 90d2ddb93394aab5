use std::collections::HashSet;

use crate::fits_image::FitsImage;
use crate::models::{Candidate, CandidateSet};
use crate::wcs::angular_separation_deg;

/// Merge nearby candidates into one peak per group.
///
/// Every candidate independently looks at all candidates within
/// `tolerance_deg` of itself (itself included) and picks the brightest image
/// pixel among them; ties keep the first one in input order. Each peak pixel
/// is emitted once, the first time any candidate discovers it. Candidates
/// that land outside the image or on a NaN pixel never win a group.
pub fn group_sources(
    candidates: &CandidateSet,
    image: &FitsImage,
    tolerance_deg: f64,
) -> CandidateSet {
    let wcs = image.wcs();
    let members = candidates.as_slice();

    // Pixel and image value of every candidate, looked up once
    let pixels: Vec<Option<((i64, i64), f64)>> = members
        .iter()
        .map(|c| {
            let (x, y) = wcs.sky_to_pixel_rounded(c.ra, c.dec);
            image
                .value_at(x, y)
                .filter(|v| !v.is_nan())
                .map(|v| ((x, y), v))
        })
        .collect();

    let mut emitted: HashSet<(i64, i64)> = HashSet::new();
    let mut groups = CandidateSet::new();

    for anchor in members {
        let mut peak: Option<(usize, f64)> = None;
        for (j, other) in members.iter().enumerate() {
            if angular_separation_deg(anchor.ra, anchor.dec, other.ra, other.dec) > tolerance_deg {
                continue;
            }
            let Some((_, flux)) = pixels[j] else {
                continue;
            };
            if peak.is_none_or(|(_, best)| flux > best) {
                peak = Some((j, flux));
            }
        }

        let Some((j, flux)) = peak else {
            tracing::debug!(
                "Candidate ({:.5}, {:.5}) has no in-image neighbours",
                anchor.ra,
                anchor.dec
            );
            continue;
        };
        let Some((pixel, _)) = pixels[j] else {
            continue;
        };
        if emitted.insert(pixel) {
            groups.push(Candidate {
                ra: members[j].ra,
                dec: members[j].dec,
                peak_flux: flux,
            });
        }
    }

    tracing::info!(
        "🔗 Grouped {} candidates into {} peaks (tolerance {:.6} deg)",
        candidates.len(),
        groups.len(),
        tolerance_deg
    );
    groups
}
