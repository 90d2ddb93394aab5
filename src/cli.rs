use clap::{Parser, ValueEnum};

use crate::config::DetectionOverrides;

#[derive(Parser, Debug)]
#[command(name = "dd-finder")]
#[command(about = "Find directions that need direction-dependent calibration and tag them in a sky model", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Restored image (FITS). Only the first of a comma-separated list is used
    #[arg(short = 'i', long = "img")]
    pub image: String,

    /// PSF image (FITS); enables the PSF correlation filter
    #[arg(short = 'p', long = "psf")]
    pub psf: Option<String>,

    /// Sky model catalog to tag with the detected directions
    #[arg(short = 'c', long = "cat")]
    pub catalog: Option<String>,

    /// Pixel flux threshold in units of the noise
    #[arg(long = "fth", visible_alias = "flux-thresh")]
    pub flux_threshold: Option<f64>,

    /// Local variance threshold in units of the noise
    #[arg(long = "vth", visible_alias = "variance-thresh")]
    pub variance_threshold: Option<f64>,

    /// Local variance window half-width, in PSFs
    #[arg(long = "vsize", visible_alias = "var-size")]
    pub variance_size: Option<usize>,

    /// PSF correlation threshold
    #[arg(long = "cth", visible_alias = "correlation-thresh")]
    pub correlation_threshold: Option<f64>,

    /// PSF correlation window half-width, in PSFs
    #[arg(long = "csize", visible_alias = "corr-size")]
    pub correlation_size: Option<usize>,

    /// Grouping radius, in beam major axes
    #[arg(long = "gpix", visible_alias = "group-pix")]
    pub group_window: Option<f64>,

    /// Output file prefix (default: image base name)
    #[arg(short = 'o', long = "outpref")]
    pub output_prefix: Option<String>,

    /// TOML configuration file; command line values take precedence
    #[arg(long)]
    pub config: Option<String>,

    /// Blank the peak's own PSF before measuring local variance
    #[arg(long)]
    pub mask_peak: bool,

    /// Write a PNG preview with the detections circled
    #[arg(long)]
    pub annotate: Option<String>,

    /// Format of the summary printed on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Show per-candidate decisions
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    pub fn detection_overrides(&self) -> DetectionOverrides {
        DetectionOverrides {
            pixel_sigma: self.flux_threshold,
            variance_sigma: self.variance_threshold,
            variance_window: self.variance_size,
            correlation_threshold: self.correlation_threshold,
            correlation_window: self.correlation_size,
            group_window: self.group_window,
            mask_peak: self.mask_peak,
        }
    }

    /// First entry of the comma-separated image argument.
    pub fn image_path(&self) -> &str {
        self.image.split(',').next().unwrap_or(&self.image)
    }
}
