use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Main configuration structure for dd-finder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detection thresholds and window sizes
    pub detection: DetectionConfig,
    /// Output naming and extra products
    pub output: OutputConfig,
}

/// Thresholds and window sizes for the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Pixels brighter than `pixel_sigma * noise` are candidates (default: 5)
    pub pixel_sigma: f64,
    /// Local std-dev must exceed `variance_sigma * noise` (default: 5)
    pub variance_sigma: f64,
    /// Local variance window half-width, in PSFs (default: 10)
    pub variance_window: usize,
    /// Minimum PSF correlation factor (default: 0.5)
    pub correlation_threshold: f64,
    /// Correlation window half-width, in PSFs (default: 5)
    pub correlation_window: usize,
    /// Grouping radius, in beam major axes (default: 20)
    pub group_window: f64,
    /// Blank the peak before measuring local variance (default: false)
    pub mask_peak: bool,
    /// Tag set on catalog sources near a detection (default: "dE")
    pub tag_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output file prefix; defaults to the image base name
    pub prefix: Option<String>,
    /// Optional PNG preview with detections circled
    pub annotate: Option<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            pixel_sigma: 5.0,
            variance_sigma: 5.0,
            variance_window: 10,
            correlation_threshold: 0.5,
            correlation_window: 5,
            group_window: 20.0,
            mask_peak: false,
            tag_name: "dE".to_string(),
        }
    }
}

impl DetectionConfig {
    /// Validate thresholds and window sizes
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("pixel_sigma", self.pixel_sigma),
            ("variance_sigma", self.variance_sigma),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidMultiplier { name, value });
            }
        }

        if self.variance_window == 0 {
            return Err(ConfigError::ZeroWindow {
                name: "variance_window",
            });
        }
        if self.correlation_window == 0 {
            return Err(ConfigError::ZeroWindow {
                name: "correlation_window",
            });
        }
        if !self.group_window.is_finite() || self.group_window <= 0.0 {
            return Err(ConfigError::InvalidGroupWindow(self.group_window));
        }
        if !self.correlation_threshold.is_finite() {
            return Err(ConfigError::InvalidCorrelationThreshold(
                self.correlation_threshold,
            ));
        }
        if self.tag_name.trim().is_empty() {
            return Err(ConfigError::EmptyTagName);
        }

        Ok(())
    }
}

/// Detection settings given on the command line; `None` keeps the config value.
#[derive(Debug, Clone, Default)]
pub struct DetectionOverrides {
    pub pixel_sigma: Option<f64>,
    pub variance_sigma: Option<f64>,
    pub variance_window: Option<usize>,
    pub correlation_threshold: Option<f64>,
    pub correlation_window: Option<usize>,
    pub group_window: Option<f64>,
    pub mask_peak: bool,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml_edit::de::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml_edit::ser::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML")?;

        std::fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Merge configuration with command line arguments, prioritizing CLI values
    pub fn merge_with_cli(
        &mut self,
        overrides: DetectionOverrides,
        output_prefix: Option<String>,
        annotate: Option<String>,
    ) {
        let detection = &mut self.detection;
        if let Some(v) = overrides.pixel_sigma {
            detection.pixel_sigma = v;
        }
        if let Some(v) = overrides.variance_sigma {
            detection.variance_sigma = v;
        }
        if let Some(v) = overrides.variance_window {
            detection.variance_window = v;
        }
        if let Some(v) = overrides.correlation_threshold {
            detection.correlation_threshold = v;
        }
        if let Some(v) = overrides.correlation_window {
            detection.correlation_window = v;
        }
        if let Some(v) = overrides.group_window {
            detection.group_window = v;
        }
        // A flag can only switch masking on
        if overrides.mask_peak {
            detection.mask_peak = true;
        }

        if output_prefix.is_some() {
            self.output.prefix = output_prefix;
        }
        if annotate.is_some() {
            self.output.annotate = annotate;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;

        if let Some(prefix) = &self.output.prefix {
            if prefix.trim().is_empty() {
                return Err(anyhow::anyhow!("Output prefix must not be empty"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        let detection = &config.detection;
        assert_eq!(detection.pixel_sigma, 5.0);
        assert_eq!(detection.variance_sigma, 5.0);
        assert_eq!(detection.variance_window, 10);
        assert_eq!(detection.correlation_threshold, 0.5);
        assert_eq!(detection.correlation_window, 5);
        assert_eq!(detection.group_window, 20.0);
        assert!(!detection.mask_peak);
        assert_eq!(detection.tag_name, "dE");
        assert!(config.output.prefix.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml_edit::ser::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[detection]"));
        assert!(toml_string.contains("pixel_sigma = 5.0"));

        let parsed: Config = toml_edit::de::from_str(&toml_string).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml_edit::de::from_str(
            "[detection]\npixel_sigma = 7.5\nmask_peak = true\n\n[output]\nprefix = \"run1\"\n",
        )
        .unwrap();
        assert_eq!(parsed.detection.pixel_sigma, 7.5);
        assert!(parsed.detection.mask_peak);
        assert_eq!(parsed.detection.variance_window, 10);
        assert_eq!(parsed.output.prefix.as_deref(), Some("run1"));
    }

    #[test]
    fn test_config_merge_with_cli() {
        let mut config = Config::default();
        config.output.prefix = Some("from_file".to_string());

        config.merge_with_cli(
            DetectionOverrides {
                pixel_sigma: Some(3.0),
                correlation_threshold: Some(0.8),
                group_window: Some(10.0),
                mask_peak: true,
                ..Default::default()
            },
            None,
            Some("preview.png".to_string()),
        );

        assert_eq!(config.detection.pixel_sigma, 3.0);
        assert_eq!(config.detection.correlation_threshold, 0.8);
        assert_eq!(config.detection.group_window, 10.0);
        assert!(config.detection.mask_peak);
        // Untouched values keep their config value
        assert_eq!(config.detection.variance_sigma, 5.0);
        assert_eq!(config.output.prefix.as_deref(), Some("from_file"));
        assert_eq!(config.output.annotate.as_deref(), Some("preview.png"));
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.detection.variance_window = 4;
        let temp_file = NamedTempFile::new().unwrap();

        config.to_file(temp_file.path()).unwrap();

        let loaded_config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config, config);
    }

    #[test]
    fn test_validation_errors() {
        let mut detection = DetectionConfig {
            pixel_sigma: -1.0,
            ..Default::default()
        };
        assert_eq!(
            detection.validate(),
            Err(ConfigError::InvalidMultiplier {
                name: "pixel_sigma",
                value: -1.0
            })
        );

        detection.pixel_sigma = 5.0;
        detection.correlation_window = 0;
        assert_eq!(
            detection.validate(),
            Err(ConfigError::ZeroWindow {
                name: "correlation_window"
            })
        );

        detection.correlation_window = 5;
        detection.group_window = 0.0;
        assert_eq!(
            detection.validate(),
            Err(ConfigError::InvalidGroupWindow(0.0))
        );

        detection.group_window = 20.0;
        detection.variance_sigma = f64::INFINITY;
        assert!(detection.validate().is_err());

        detection.variance_sigma = 5.0;
        detection.tag_name = "  ".to_string();
        assert_eq!(detection.validate(), Err(ConfigError::EmptyTagName));
    }

    #[test]
    fn test_config_validation_empty_prefix() {
        let mut config = Config::default();
        config.output.prefix = Some(String::new());

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Output prefix must not be empty"));
    }
}
