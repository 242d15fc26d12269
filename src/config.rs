use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::compression::QualityFactor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub compression: CompressionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub default_quality: u8,
    pub quality_step: u8,
    pub png_dithering: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub log_compression_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            default_quality: QualityFactor::DEFAULT,
            quality_step: QualityFactor::STEP,
            png_dithering: 1.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_compression_stats: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if file doesn't exist
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration from environment variables and file
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("IMG_COMPRESSOR_CONFIG")
            .unwrap_or_else(|_| "config.toml".to_string());

        let mut config = Self::load_from_file(&config_path)?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(quality) = std::env::var("IMG_COMPRESSOR_DEFAULT_QUALITY") {
            if let Ok(q) = quality.parse::<u8>() {
                if (QualityFactor::MIN..=QualityFactor::MAX).contains(&q) {
                    self.compression.default_quality = q;
                }
            }
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if !(QualityFactor::MIN..=QualityFactor::MAX).contains(&self.compression.default_quality) {
            return Err(ConfigError::ValidationError(format!(
                "Default quality must be between {} and {}",
                QualityFactor::MIN,
                QualityFactor::MAX
            )));
        }

        if self.compression.quality_step == 0 {
            return Err(ConfigError::ValidationError(
                "Quality step cannot be 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.compression.png_dithering) {
            return Err(ConfigError::ValidationError(
                "PNG dithering must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Self::default();
        let toml_content = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::SerializeError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_content)
            .map_err(|e| ConfigError::IoError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

/// Initializes env_logger at the configured level. Intended for the
/// embedding application; a no-op if a logger is already installed.
pub fn init_logging(config: &LoggingConfig) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.level),
    )
    .try_init();
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializeError(String),
}
