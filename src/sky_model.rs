//! Plain-text sky models: reading, writing and tagging.
//!
//! The format is one source per line, whitespace separated, described by a
//! `#format:` header naming the columns. The four columns `name ra_d dec_d i`
//! are required; a trailing `tags...` column holds boolean tags. Other
//! columns are carried through untouched when a model is saved again, and
//! so are `#` comment lines, which are written back above the header.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{DetectionError, InputError, Result};
use crate::models::CandidateSet;
use crate::wcs::angular_separation_deg;

/// Header line written in front of detection lists.
pub const FORMAT_HEADER: &str = "#format:name ra_d dec_d i";

const REQUIRED_COLUMNS: [&str; 4] = ["name", "ra_d", "dec_d", "i"];
const TAGS_COLUMN: &str = "tags...";

#[derive(Debug, Clone, PartialEq)]
pub struct SkySource {
    pub name: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub flux: f64,
    /// Values of the model's extra columns, in header order
    pub extra: Vec<String>,
    pub tags: Vec<String>,
}

impl SkySource {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn set_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkyModel {
    comments: Vec<String>,
    extra_columns: Vec<String>,
    sources: Vec<SkySource>,
}

/// Where each known column sits on a source line.
struct ColumnLayout {
    positions: [usize; 4],
    extra: Vec<(String, usize)>,
    width: usize,
    has_tags: bool,
}

impl ColumnLayout {
    fn standard() -> Self {
        Self {
            positions: [0, 1, 2, 3],
            extra: Vec::new(),
            width: 4,
            has_tags: false,
        }
    }

    fn from_header(declaration: &str) -> std::result::Result<Self, String> {
        let names: Vec<&str> = declaration
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect();

        let mut has_tags = false;
        let mut columns = Vec::new();
        for (i, name) in names.iter().enumerate() {
            if *name == TAGS_COLUMN {
                if i != names.len() - 1 {
                    return Err("'tags...' must be the last column".to_string());
                }
                has_tags = true;
            } else {
                columns.push(*name);
            }
        }

        let mut positions = [0usize; 4];
        for (slot, required) in REQUIRED_COLUMNS.iter().enumerate() {
            positions[slot] = columns
                .iter()
                .position(|c| c == required)
                .ok_or_else(|| format!("format header lacks the '{}' column", required))?;
        }
        let extra = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !REQUIRED_COLUMNS.contains(c))
            .map(|(i, c)| (c.to_string(), i))
            .collect();

        Ok(Self {
            positions,
            extra,
            width: columns.len(),
            has_tags,
        })
    }
}

impl SkyModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detections named `S0`, `S1`, ... in candidate order.
    pub fn from_detections(detections: &CandidateSet) -> Self {
        let sources = detections
            .iter()
            .enumerate()
            .map(|(i, c)| SkySource {
                name: format!("S{}", i),
                ra_deg: c.ra,
                dec_deg: c.dec,
                flux: c.peak_flux,
                extra: Vec::new(),
                tags: Vec::new(),
            })
            .collect();
        Self {
            comments: Vec::new(),
            extra_columns: Vec::new(),
            sources,
        }
    }

    pub fn sources(&self) -> &[SkySource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| InputError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse sky model text. `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let malformed = |line: usize, reason: String| -> DetectionError {
            InputError::MalformedCatalog {
                path: path.to_path_buf(),
                line,
                reason,
            }
            .into()
        };

        let mut layout = ColumnLayout::standard();
        let mut model = SkyModel::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(declaration) = line.strip_prefix("#format:") {
                layout = ColumnLayout::from_header(declaration).map_err(|r| malformed(line_no, r))?;
                model.extra_columns = layout.extra.iter().map(|(name, _)| name.clone()).collect();
                continue;
            }
            if line.starts_with('#') {
                model.comments.push(line.to_string());
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < layout.width {
                return Err(malformed(
                    line_no,
                    format!("expected {} columns, found {}", layout.width, tokens.len()),
                ));
            }
            if tokens.len() > layout.width && !layout.has_tags {
                return Err(malformed(
                    line_no,
                    format!("{} trailing values without a tags column", tokens.len() - layout.width),
                ));
            }

            let number = |slot: usize| -> Result<f64> {
                let token = tokens[layout.positions[slot]];
                token.parse::<f64>().map_err(|_| {
                    malformed(
                        line_no,
                        format!("'{}' is not a valid {}", token, REQUIRED_COLUMNS[slot]),
                    )
                })
            };

            model.sources.push(SkySource {
                name: tokens[layout.positions[0]].to_string(),
                ra_deg: number(1)?,
                dec_deg: number(2)?,
                flux: number(3)?,
                extra: layout.extra.iter().map(|(_, i)| tokens[*i].to_string()).collect(),
                tags: tokens[layout.width..].iter().filter_map(|t| parse_tag(t)).collect(),
            });
        }

        Ok(model)
    }

    /// Render the model in the text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for comment in &self.comments {
            out.push_str(comment);
            out.push('\n');
        }
        out.push_str(FORMAT_HEADER);
        for column in &self.extra_columns {
            out.push(' ');
            out.push_str(column);
        }
        if self.sources.iter().any(|s| !s.tags.is_empty()) {
            out.push(' ');
            out.push_str(TAGS_COLUMN);
        }
        out.push('\n');

        for source in &self.sources {
            let _ = write!(
                out,
                "{} {} {} {}",
                source.name, source.ra_deg, source.dec_deg, source.flux
            );
            for value in source.extra.iter().chain(&source.tags) {
                out.push(' ');
                out.push_str(value);
            }
            out.push('\n');
        }
        out
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.render()).map_err(|source| DetectionError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Sources within `radius_rad` radians (great circle) of a position in degrees.
    pub fn sources_near(&self, ra_deg: f64, dec_deg: f64, radius_rad: f64) -> Vec<&SkySource> {
        self.sources
            .iter()
            .filter(|s| {
                angular_separation_deg(ra_deg, dec_deg, s.ra_deg, s.dec_deg).to_radians()
                    <= radius_rad
            })
            .collect()
    }

    /// Set `tag` on every source that has at least one of `directions` within
    /// `radius_rad`. Returns the number of sources tagged.
    pub fn tag_sources_near(&mut self, directions: &SkyModel, radius_rad: f64, tag: &str) -> usize {
        let mut tagged = 0;
        for source in &mut self.sources {
            let near = directions.sources_near(source.ra_deg, source.dec_deg, radius_rad);
            if !near.is_empty() {
                tracing::debug!(
                    "🏷️  {} tagged '{}' ({} detections nearby)",
                    source.name,
                    tag,
                    near.len()
                );
                source.set_tag(tag);
                tagged += 1;
            }
        }
        tagged
    }
}

/// Accepts `tag`, `+tag` and `tag=True`; drops tags explicitly set false.
fn parse_tag(token: &str) -> Option<String> {
    let token = token.trim_start_matches('+');
    match token.split_once('=') {
        Some((name, value)) => {
            let value = value.to_ascii_lowercase();
            (value == "true" || value == "1").then(|| name.to_string())
        }
        None => Some(token.to_string()),
    }
}

/// Detection list text: header, then `S<i> ra dec flux` with 3/3/6 decimals.
pub fn render_detections(detections: &CandidateSet) -> String {
    let mut out = String::from(FORMAT_HEADER);
    out.push('\n');
    for (i, c) in detections.iter().enumerate() {
        let _ = writeln!(out, "S{} {:.3} {:.3} {:.6}", i, c.ra, c.dec, c.peak_flux);
    }
    out
}

pub fn write_detections<P: AsRef<Path>>(path: P, detections: &CandidateSet) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, render_detections(detections)).map_err(|source| {
        DetectionError::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::info!("💾 Wrote {} detections to {:?}", detections.len(), path);
    Ok(())
}

/// Output prefix derived from the image argument: the base name of its first
/// comma-separated entry without the final extension.
pub fn default_output_prefix(image_arg: &str) -> String {
    let first = image_arg.split(',').next().unwrap_or(image_arg);
    Path::new(first)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| first.to_string())
}
