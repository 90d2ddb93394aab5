pub mod annotate;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod fits_image;
pub mod models;
pub mod sky_model;
pub mod wcs;

// Main entry point
pub mod cli_main;

// Re-export commonly used items
pub use config::{Config, DetectionConfig};
pub use detection::{DetectionPipeline, DetectionReport};
pub use error::{ConfigError, DetectionError, InputError};
pub use fits_image::FitsImage;
pub use models::{Candidate, CandidateSet, PsfFootprint};
pub use sky_model::SkyModel;
