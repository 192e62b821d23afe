//! Shared pipeline helpers for CLI commands.
//!
//! Finds the `plinth.toml` governing a module directory, merges it with the
//! command-line overrides and opens a build session on it.

use std::path::{Path, PathBuf};

use plinth_config::{
    load_config, load_config_or_default, resolve_settings, Overrides, Settings, CONFIG_FILE_NAME,
};
use plinth_engine::{ModuleId, Session, SessionOptions};
use tracing::debug;

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `plinth.toml`.
pub fn find_config_dir(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE_NAME).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Loads the settings that apply to `module_dir`.
///
/// `--config` names the file explicitly (file → its directory, directory →
/// itself) and must exist. Otherwise the nearest `plinth.toml` above the
/// module directory is used, or defaults when there is none.
pub fn load_settings(
    global: &GlobalArgs,
    module_dir: &Path,
    overrides: &Overrides,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let (config, config_dir) = match &global.config {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = if path.is_dir() {
                path
            } else {
                path.parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."))
            };
            (load_config(&dir)?, dir)
        }
        None => {
            let start = std::path::absolute(module_dir)?;
            match find_config_dir(&start) {
                Some(dir) => (load_config(&dir)?, dir),
                None => (load_config_or_default(&start)?, start),
            }
        }
    };
    debug!(config_dir = %config_dir.display(), "loaded pipeline configuration");
    let settings = resolve_settings(&config, &config_dir, overrides);
    settings.validate()?;
    Ok(settings)
}

/// The session options derived from resolved settings.
pub fn session_options(settings: &Settings) -> SessionOptions {
    SessionOptions {
        source_space: settings.source_space.clone(),
        auto_save: settings.auto_save,
        ignore_file: settings.ignore_file.clone(),
        track_module_source: settings.track_module_source,
        verbose: settings.verbose,
    }
}

/// The overrides every command derives from the global flags.
pub fn global_overrides(global: &GlobalArgs) -> Overrides {
    Overrides {
        source_space: global.source_space.as_ref().map(PathBuf::from),
        verbose: global.verbose.then_some(true),
        ..Overrides::default()
    }
}

/// Opens a session and resolves the module at `module_dir`.
pub fn open_module(
    global: &GlobalArgs,
    module_dir: &str,
    overrides: &Overrides,
) -> Result<(Session, ModuleId, Settings), Box<dyn std::error::Error>> {
    let module_dir = Path::new(module_dir);
    let settings = load_settings(global, module_dir, overrides)?;
    let mut session = Session::new(session_options(&settings));
    let module = session.resolve(module_dir)?;
    Ok((session, module, settings))
}

/// A location relative to the module directory when it lies inside it.
pub fn display_location(location: &Path, module_dir: &Path) -> String {
    plinth_common::relative_to(location, module_dir)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(location)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: false,
            verbose: false,
            config: None,
            source_space: None,
        }
    }

    #[test]
    fn find_config_in_parent() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE_NAME), "").unwrap();
        let nested = tmp.path().join("Root").join("Data");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_config_dir(&nested), Some(tmp.path().to_path_buf()));
    }

    #[test]
    fn settings_default_without_config() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = load_settings(&global(), tmp.path(), &Overrides::default()).unwrap();
        assert!(settings.auto_save);
        assert_eq!(settings.ignore_file, ".gitignore");
        assert!(settings.source_space.is_none());
    }

    #[test]
    fn source_space_is_relative_to_config() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "[pipeline]\nsource_space = \"modules\"\n",
        )
        .unwrap();
        let module = tmp.path().join("Root");
        fs::create_dir_all(&module).unwrap();
        let err = load_settings(&global(), &module, &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        fs::create_dir(tmp.path().join("modules")).unwrap();
        let settings = load_settings(&global(), &module, &Overrides::default()).unwrap();
        assert_eq!(settings.source_space, Some(tmp.path().join("modules")));
    }

    #[test]
    fn explicit_config_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let args = GlobalArgs {
            config: Some(tmp.path().join("missing").display().to_string()),
            ..global()
        };
        assert!(load_settings(&args, tmp.path(), &Overrides::default()).is_err());
    }

    #[test]
    fn global_flags_become_overrides() {
        let args = GlobalArgs {
            verbose: true,
            source_space: Some("/p/modules".to_string()),
            ..global()
        };
        let overrides = global_overrides(&args);
        assert_eq!(overrides.verbose, Some(true));
        assert_eq!(overrides.source_space, Some(PathBuf::from("/p/modules")));
        assert_eq!(overrides.force, None);
    }

    #[test]
    fn options_follow_settings() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "[pipeline]\nauto_save = false\ntrack_module_source = true\n",
        )
        .unwrap();
        let settings = load_settings(&global(), tmp.path(), &Overrides::default()).unwrap();
        let options = session_options(&settings);
        assert!(!options.auto_save);
        assert!(options.track_module_source);
    }

    #[test]
    fn display_location_inside_and_outside() {
        let dir = Path::new("/p/M");
        assert_eq!(display_location(Path::new("/p/M/a.json"), dir), "a.json");
        assert_eq!(display_location(Path::new("/q/b.json"), dir), "/q/b.json");
    }
}
