//! Settings resolution: merging the configuration file with CLI overrides.

use crate::error::ConfigError;
use crate::types::PipelineConfig;
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over `plinth.toml`.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    /// Source space given on the command line (already relative to the
    /// working directory, not to the configuration file).
    pub source_space: Option<PathBuf>,
    /// Force verbose module resolution output.
    pub verbose: Option<bool>,
    /// Run makers regardless of staleness.
    pub force: Option<bool>,
    /// Make dependencies first.
    pub recurse: Option<bool>,
}

/// The effective settings of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Absolute or working-directory-relative source space, if any.
    pub source_space: Option<PathBuf>,
    /// Persist values whenever a target is set.
    pub auto_save: bool,
    /// Ignore-list file name written into module directories.
    pub ignore_file: String,
    /// Make declared targets depend on their module description file.
    pub track_module_source: bool,
    /// Report module resolution at info level.
    pub verbose: bool,
    /// Make dependencies first.
    pub recurse: bool,
    /// Run makers regardless of staleness.
    pub force: bool,
}

/// Resolves the effective settings of a run.
///
/// `config_dir` is the directory holding `plinth.toml`; a configured source
/// space is interpreted relative to it. Every `Some` override replaces the
/// corresponding configured value.
pub fn resolve_settings(config: &PipelineConfig, config_dir: &Path, overrides: &Overrides) -> Settings {
    let source_space = overrides.source_space.clone().or_else(|| {
        config
            .pipeline
            .source_space
            .as_ref()
            .map(|space| config_dir.join(space))
    });

    Settings {
        source_space,
        auto_save: config.pipeline.auto_save,
        ignore_file: config.pipeline.ignore_file.clone(),
        track_module_source: config.pipeline.track_module_source,
        verbose: overrides.verbose.unwrap_or(config.pipeline.verbose),
        recurse: overrides.recurse.unwrap_or(config.make.recurse),
        force: overrides.force.unwrap_or(config.make.force),
    }
}

impl Settings {
    /// Checks the parts of the settings that depend on the filesystem.
    ///
    /// A configured source space must be an existing directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(space) = &self.source_space else {
            return Ok(());
        };
        let reason = match std::fs::metadata(space) {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => "is not a directory",
            Err(_) => "does not exist",
        };
        Err(ConfigError::SourceSpace {
            path: space.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn source_space_relative_to_config_dir() {
        let config = load_config_from_str("[pipeline]\nsource_space = \"modules\"\n").unwrap();
        let settings = resolve_settings(&config, Path::new("/work/pipe"), &Overrides::default());
        assert_eq!(settings.source_space, Some(PathBuf::from("/work/pipe/modules")));
    }

    #[test]
    fn overrides_take_precedence() {
        let toml = r#"
[pipeline]
source_space = "modules"
verbose = false

[make]
force = false
recurse = true
"#;
        let config = load_config_from_str(toml).unwrap();
        let overrides = Overrides {
            source_space: Some(PathBuf::from("/other")),
            verbose: Some(true),
            force: Some(true),
            recurse: Some(false),
        };
        let settings = resolve_settings(&config, Path::new("/work"), &overrides);
        assert_eq!(settings.source_space, Some(PathBuf::from("/other")));
        assert!(settings.verbose);
        assert!(settings.force);
        assert!(!settings.recurse);
    }

    #[test]
    fn defaults_pass_through() {
        let config = PipelineConfig::default();
        let settings = resolve_settings(&config, Path::new("."), &Overrides::default());
        assert_eq!(settings.source_space, None);
        assert!(settings.auto_save);
        assert_eq!(settings.ignore_file, ".gitignore");
        assert!(settings.recurse);
        assert!(!settings.force);
    }

    #[test]
    fn source_space_must_be_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config_from_str("[pipeline]\nsource_space = \"modules\"\n").unwrap();
        let settings = resolve_settings(&config, tmp.path(), &Overrides::default());
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::SourceSpace { reason: "does not exist", .. }));

        std::fs::write(tmp.path().join("modules"), "").unwrap();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::SourceSpace { reason: "is not a directory", .. }));

        std::fs::remove_file(tmp.path().join("modules")).unwrap();
        std::fs::create_dir(tmp.path().join("modules")).unwrap();
        assert!(settings.validate().is_ok());
        assert!(resolve_settings(&PipelineConfig::default(), tmp.path(), &Overrides::default())
            .validate()
            .is_ok());
    }
}
