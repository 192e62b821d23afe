//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::PipelineConfig;
use std::path::Path;

/// File name of the pipeline configuration.
pub const CONFIG_FILE_NAME: &str = "plinth.toml";

/// Loads and validates a `plinth.toml` configuration from a pipeline directory.
///
/// Reads `<pipeline_dir>/plinth.toml`, parses it, and validates it.
pub fn load_config(pipeline_dir: &Path) -> Result<PipelineConfig, ConfigError> {
    let config_path = pipeline_dir.join(CONFIG_FILE_NAME);
    let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::IoError {
        path: config_path.clone(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Like [`load_config`], but a missing file yields the default configuration.
pub fn load_config_or_default(pipeline_dir: &Path) -> Result<PipelineConfig, ConfigError> {
    if !pipeline_dir.join(CONFIG_FILE_NAME).is_file() {
        return Ok(PipelineConfig::default());
    }
    load_config(pipeline_dir)
}

/// Parses and validates a `plinth.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable.
fn validate_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    let ignore_file = &config.pipeline.ignore_file;
    if ignore_file.is_empty() {
        return Err(ConfigError::MissingField("pipeline.ignore_file".to_string()));
    }
    if ignore_file.contains(['/', '\\']) || ignore_file == "." || ignore_file == ".." {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.ignore_file must be a plain file name, got '{ignore_file}'"
        )));
    }
    if let Some(space) = &config.pipeline.source_space {
        if space.is_empty() {
            return Err(ConfigError::MissingField("pipeline.source_space".to_string()));
        }
    }
    Ok(())
}
