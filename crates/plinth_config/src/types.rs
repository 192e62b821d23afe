//! Configuration types deserialized from `plinth.toml`.

use serde::Deserialize;

/// The top-level pipeline configuration parsed from `plinth.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineConfig {
    /// Module loading and persistence settings.
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Defaults for `make` invocations.
    #[serde(default)]
    pub make: MakeSection,
}

/// The `[pipeline]` table.
#[derive(Debug, Deserialize)]
pub struct PipelineSection {
    /// Directory tree searched for module descriptions, relative to the
    /// directory holding `plinth.toml`.
    #[serde(default)]
    pub source_space: Option<String>,
    /// Persist values to disk whenever a target is set.
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Name of the ignore-list file written into every module directory.
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,
    /// Make every declared target depend on its module's description file.
    #[serde(default)]
    pub track_module_source: bool,
    /// Report module resolution at info level.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            source_space: None,
            auto_save: true,
            ignore_file: default_ignore_file(),
            track_module_source: false,
            verbose: false,
        }
    }
}

/// The `[make]` table.
#[derive(Debug, Deserialize)]
pub struct MakeSection {
    /// Make dependencies before the requested targets.
    #[serde(default = "default_true")]
    pub recurse: bool,
    /// Run makers regardless of staleness.
    #[serde(default)]
    pub force: bool,
}

impl Default for MakeSection {
    fn default() -> Self {
        Self {
            recurse: true,
            force: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ignore_file() -> String {
    ".gitignore".to_string()
}
