use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use crate::annotate::write_annotated_png;
use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::detection::{DetectionPipeline, DetectionReport};
use crate::fits_image::FitsImage;
use crate::sky_model::{default_output_prefix, write_detections, SkyModel};

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load configuration from file or use defaults
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config file: {}", config_path))?
    } else {
        Config::default()
    };

    config.merge_with_cli(
        cli.detection_overrides(),
        cli.output_prefix.clone(),
        cli.annotate.clone(),
    );
    config
        .validate()
        .context("Configuration validation failed")?;

    let inputs = RunInputs {
        image: PathBuf::from(cli.image_path()),
        psf: cli.psf.as_ref().map(PathBuf::from),
        catalog: cli.catalog.as_ref().map(PathBuf::from),
    };
    let outcome = find_dd_directions(&inputs, &config)?;
    print_summary(&outcome, cli.format)?;

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Files a run reads (and, for the catalog, rewrites).
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub image: PathBuf,
    pub psf: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub image: PathBuf,
    pub output: PathBuf,
    /// Catalog sources tagged, when a catalog was given
    pub tagged: Option<usize>,
    #[serde(flatten)]
    pub report: DetectionReport,
}

/// Detect the bright, PSF-like directions of an image, write them out and
/// tag the neighbouring catalog sources.
pub fn find_dd_directions(inputs: &RunInputs, config: &Config) -> Result<RunOutcome> {
    tracing::info!("🚀 Searching {:?} for DD directions", inputs.image);

    let image = FitsImage::open(&inputs.image)
        .with_context(|| format!("Failed to load image: {}", inputs.image.display()))?;
    let psf_image = inputs
        .psf
        .as_ref()
        .map(|path| {
            FitsImage::open(path)
                .with_context(|| format!("Failed to load PSF image: {}", path.display()))
        })
        .transpose()?;

    let pipeline = DetectionPipeline::new(config.detection.clone());
    let report = pipeline
        .run(&image, psf_image.as_ref())
        .with_context(|| format!("Detection failed on {}", inputs.image.display()))?;

    let output = output_path(&inputs.image, config.output.prefix.as_deref());
    write_detections(&output, &report.detections)?;

    let tagged = match &inputs.catalog {
        Some(catalog_path) => Some(tag_catalog(
            catalog_path,
            &output,
            report.tolerance_deg.to_radians(),
            &config.detection.tag_name,
        )?),
        None => None,
    };

    if let Some(png) = &config.output.annotate {
        write_annotated_png(&image, &report.detections, report.psf.pixels as u32, png)?;
    }

    Ok(RunOutcome {
        image: inputs.image.clone(),
        output,
        tagged,
        report,
    })
}

/// `<prefix>.txt`, with the prefix defaulting to the image's base name.
pub fn output_path(image: &Path, prefix: Option<&str>) -> PathBuf {
    let prefix = match prefix {
        Some(prefix) => prefix.to_string(),
        None => default_output_prefix(&image.to_string_lossy()),
    };
    PathBuf::from(format!("{}.txt", prefix))
}

/// Tag catalog sources near the written directions and save the catalog in place.
pub fn tag_catalog(
    catalog_path: &Path,
    directions_path: &Path,
    radius_rad: f64,
    tag: &str,
) -> Result<usize> {
    let directions = SkyModel::load(directions_path).with_context(|| {
        format!("Failed to reload directions: {}", directions_path.display())
    })?;
    let mut catalog = SkyModel::load(catalog_path)
        .with_context(|| format!("Failed to load catalog: {}", catalog_path.display()))?;

    let tagged = catalog.tag_sources_near(&directions, radius_rad, tag);
    if tagged == 0 {
        tracing::warn!("⚠️  No catalog source lies near a detected direction");
    }
    catalog.save(catalog_path)?;

    tracing::info!(
        "🏷️  Tagged {} of {} catalog sources '{}' in {:?}",
        tagged,
        catalog.len(),
        tag,
        catalog_path
    );
    Ok(tagged)
}

fn print_summary(outcome: &RunOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(outcome)
                .context("Failed to serialize run summary")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let report = &outcome.report;
            let counts = &report.stage_counts;
            println!("Image: {}", outcome.image.display());
            println!("Noise: {:.6e}", report.noise);
            println!(
                "PSF: {:.3}\" ({} px), grouping radius {:.6} deg",
                report.psf.bmaj_deg * 3600.0,
                report.psf.pixels,
                report.tolerance_deg
            );
            println!(
                "Candidates: {} bright, {} grouped, {} after variance{}",
                counts.bright_pixels,
                counts.grouped,
                counts.after_variance,
                counts
                    .after_correlation
                    .map(|n| format!(", {} after correlation", n))
                    .unwrap_or_default()
            );
            println!();
            println!("{:<6} {:>12} {:>12} {:>14}", "Name", "RA (deg)", "Dec (deg)", "Peak");
            println!("{}", "-".repeat(47));
            for (i, c) in report.detections.iter().enumerate() {
                println!(
                    "{:<6} {:>12.5} {:>12.5} {:>14.6e}",
                    format!("S{}", i),
                    c.ra,
                    c.dec,
                    c.peak_flux
                );
            }
            println!();
            println!("Directions written to {}", outcome.output.display());
            if let Some(tagged) = outcome.tagged {
                println!("Catalog sources tagged: {}", tagged);
            }
        }
    }
    Ok(())
}
