//! The built-in catalog of module implementations.

use std::collections::BTreeMap;
use std::fs;
use std::rc::Rc;

use glob::Pattern;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::module::{DeclareContext, ModuleImpl, CONFIG_FILE};
use crate::target::TargetSpec;

/// Constructor of a catalog entry.
pub type ModuleConstructor = Box<dyn Fn() -> Rc<dyn ModuleImpl>>;

/// Module implementations available without a description file, by name.
pub struct Catalog {
    entries: BTreeMap<String, ModuleConstructor>,
}

impl Catalog {
    /// A catalog without entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// A catalog holding [`RootModule`] and [`LocalData`].
    pub fn with_builtins() -> Self {
        let mut catalog = Self::empty();
        catalog.register(RootModule::NAME, || Rc::new(RootModule));
        catalog.register(LocalData::NAME, || Rc::new(LocalData));
        catalog
    }

    /// Adds or replaces the entry `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Rc<dyn ModuleImpl> + 'static,
    {
        self.entries.insert(name.into(), Box::new(constructor));
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Constructs the implementation registered under `name`.
    pub fn create(&self, name: &str) -> Option<Rc<dyn ModuleImpl>> {
        self.entries.get(name).map(|constructor| constructor())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// A root module without targets; the usual top of a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootModule;

impl RootModule {
    /// Catalog name.
    pub const NAME: &'static str = "Root";
}

impl ModuleImpl for RootModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_root(&self) -> bool {
        true
    }

    fn declare_targets(&self, _cx: &mut DeclareContext<'_>) -> EngineResult<()> {
        Ok(())
    }
}

/// A root module exposing existing data files.
///
/// `config.toml` holds a `pattern` glob relative to the module directory;
/// every matching file becomes an expect-made target named by its stem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalData;

impl LocalData {
    /// Catalog name.
    pub const NAME: &'static str = "LocalData";
}

impl ModuleImpl for LocalData {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_root(&self) -> bool {
        true
    }

    fn declare_targets(&self, cx: &mut DeclareContext<'_>) -> EngineResult<()> {
        let directory = cx.directory().to_path_buf();
        let config = cx.config_target()?;
        let pattern = cx
            .get(config)?
            .get("pattern")
            .and_then(|p| p.as_str())
            .map(str::to_owned)
            .ok_or_else(|| EngineError::Declaration {
                directory: directory.clone(),
                reason: format!("{CONFIG_FILE} has no string 'pattern'"),
            })?;

        let full = format!(
            "{}/{}",
            Pattern::escape(&directory.to_string_lossy()),
            pattern
        );
        let paths = glob::glob(&full).map_err(|e| EngineError::Declaration {
            directory: directory.clone(),
            reason: format!("invalid pattern '{pattern}': {e}"),
        })?;
        let ignore_file = cx.session().options().ignore_file.clone();

        let mut matches: Vec<_> = paths.filter_map(Result::ok).collect();
        matches.sort();
        for path in matches {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_file = fs::metadata(&path).is_ok_and(|m| m.is_file());
            if name == CONFIG_FILE || name == ignore_file || !is_file {
                continue;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if cx.session().module(cx.module_id()).targets.contains_key(&stem) {
                warn!(file = %path.display(), name = %stem, "several data files share a stem; keeping the last");
            }
            let id = cx.declare(TargetSpec::new(&path))?;
            debug!(file = %path.display(), name = %stem, "declared data file");
            cx.export(stem, id);
        }
        Ok(())
    }
}
