//! Locating and loading module implementations.
//!
//! For a module directory named `<Name>` (or `<Name>.<label>`) the loader
//! probes, first match wins:
//!
//! 1. `<dir>/<Name>.toml`
//! 2. `<dir>/source.toml`, then `<dir>/src.toml`
//! 3. `<source space>/**/<Name>.toml`, lexicographically first match
//! 4. the built-in [`Catalog`]
//!
//! Description files are turned into implementations by a [`SourceLoader`];
//! the default one builds [`ScriptedModule`](crate::scripted::ScriptedModule)s.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glob::Pattern;

use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult};
use crate::module::ModuleImpl;
use crate::scripted::ScriptedLoader;

/// Extension of module description files.
pub const SOURCE_EXTENSION: &str = "toml";

/// Generic description file names probed after `<Name>.toml`.
pub const FALLBACK_SOURCE_NAMES: [&str; 2] = ["source", "src"];

/// Identifiers probed inside a description after the module name itself.
pub const FALLBACK_IDENTIFIERS: [&str; 2] = ["Module", "Main"];

macro_rules! probe {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Where a module implementation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// `<Name>.toml` inside the module directory.
    Local(PathBuf),
    /// `source.toml` or `src.toml` inside the module directory.
    Fallback(PathBuf),
    /// A description found under the source space.
    SourceSpace(PathBuf),
    /// A catalog entry.
    Builtin(String),
    /// Handed to [`Session::instantiate`](crate::Session::instantiate).
    Provided,
}

impl ModuleSource {
    /// The description file, for file-backed sources.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ModuleSource::Local(p) | ModuleSource::Fallback(p) | ModuleSource::SourceSpace(p) => {
                Some(p)
            }
            ModuleSource::Builtin(_) | ModuleSource::Provided => None,
        }
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Local(p) => write!(f, "local {}", p.display()),
            ModuleSource::Fallback(p) => write!(f, "fallback {}", p.display()),
            ModuleSource::SourceSpace(p) => write!(f, "source space {}", p.display()),
            ModuleSource::Builtin(name) => write!(f, "builtin {name}"),
            ModuleSource::Provided => f.write_str("provided"),
        }
    }
}

/// Turns a description file into a module implementation.
pub trait SourceLoader {
    /// Loads the implementation of `module_name` from `path`.
    fn load(&self, path: &Path, module_name: &str) -> EngineResult<Rc<dyn ModuleImpl>>;
}

/// Locates and loads module implementations.
pub struct ModuleLoader {
    catalog: Catalog,
    source_loader: Box<dyn SourceLoader>,
    source_space: Option<PathBuf>,
    verbose: bool,
}

impl ModuleLoader {
    /// A loader with the built-in catalog and scripted descriptions.
    pub fn new(source_space: Option<PathBuf>, verbose: bool) -> Self {
        Self {
            catalog: Catalog::with_builtins(),
            source_loader: Box::new(ScriptedLoader),
            source_space,
            verbose,
        }
    }

    /// Replaces the description loader.
    pub fn with_source_loader(mut self, loader: Box<dyn SourceLoader>) -> Self {
        self.source_loader = loader;
        self
    }

    /// Replaces the catalog.
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Mutable access to the catalog.
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// The source space, if configured.
    pub fn source_space(&self) -> Option<&Path> {
        self.source_space.as_deref()
    }

    /// Finds the implementation source for the module `name` at `directory`.
    pub fn locate(&self, directory: &Path, name: &str) -> EngineResult<ModuleSource> {
        let local = directory.join(format!("{name}.{SOURCE_EXTENSION}"));
        probe!(self.verbose, path = %local.display(), "probing local module source");
        if local.is_file() {
            return Ok(ModuleSource::Local(local));
        }

        for fallback in FALLBACK_SOURCE_NAMES {
            let path = directory.join(format!("{fallback}.{SOURCE_EXTENSION}"));
            probe!(self.verbose, path = %path.display(), "probing fallback module source");
            if path.is_file() {
                return Ok(ModuleSource::Fallback(path));
            }
        }

        if let Some(space) = &self.source_space {
            probe!(self.verbose, space = %space.display(), module = name, "searching source space");
            if let Some(path) = self.search_source_space(space, name) {
                return Ok(ModuleSource::SourceSpace(path));
            }
        }

        probe!(self.verbose, module = name, "probing builtin catalog");
        if self.catalog.contains(name) {
            return Ok(ModuleSource::Builtin(name.to_string()));
        }

        Err(EngineError::ModuleResolution {
            directory: directory.to_path_buf(),
        })
    }

    fn search_source_space(&self, space: &Path, name: &str) -> Option<PathBuf> {
        let pattern = format!(
            "{}/**/{}.{SOURCE_EXTENSION}",
            Pattern::escape(&space.to_string_lossy()),
            Pattern::escape(name)
        );
        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .ok()?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        matches.sort();
        if matches.len() > 1 {
            probe!(self.verbose, module = name, candidates = matches.len(), "several sources in source space; taking the first");
        }
        matches.into_iter().next()
    }

    /// Loads the implementation from a located source.
    pub fn load(&self, source: &ModuleSource, name: &str) -> EngineResult<Rc<dyn ModuleImpl>> {
        match source {
            ModuleSource::Local(path)
            | ModuleSource::Fallback(path)
            | ModuleSource::SourceSpace(path) => {
                probe!(self.verbose, path = %path.display(), module = name, "loading module description");
                self.source_loader.load(path, name)
            }
            ModuleSource::Builtin(entry) => {
                self.catalog
                    .create(entry)
                    .ok_or_else(|| EngineError::ImplementationNotFound {
                        module: name.to_string(),
                        origin: "builtin catalog".to_string(),
                        candidates: vec![entry.clone()],
                    })
            }
            ModuleSource::Provided => Err(EngineError::ImplementationNotFound {
                module: name.to_string(),
                origin: source.to_string(),
                candidates: Vec::new(),
            }),
        }
    }
}
