//! Error types for configuration loading and validation.

use std::path::PathBuf;

/// Errors that can occur when loading or validating a `plinth.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    IoError {
        /// The `plinth.toml` path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The resolved source space cannot be searched for module descriptions.
    #[error("source space {path} {reason}")]
    SourceSpace {
        /// The resolved source space directory.
        path: PathBuf,
        /// What is wrong with it.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let cases = [
            (
                ConfigError::MissingField("pipeline.ignore_file".to_string()),
                "missing required field: pipeline.ignore_file",
            ),
            (
                ConfigError::ValidationError("ignore_file must be a file name".to_string()),
                "validation error: ignore_file must be a file name",
            ),
            (
                ConfigError::SourceSpace {
                    path: PathBuf::from("/pipe/modules"),
                    reason: "does not exist",
                },
                "source space /pipe/modules does not exist",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn read_error_names_the_file() {
        let err = ConfigError::IoError {
            path: PathBuf::from("/pipe/plinth.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to read /pipe/plinth.toml: denied");
    }
}
