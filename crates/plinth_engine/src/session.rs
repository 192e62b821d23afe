//! The build session: target registry, module cache and module construction.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use plinth_common::{module_name, normalize_location};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult};
use crate::format::FormatKind;
use crate::ignore;
use crate::loader::{ModuleLoader, ModuleSource};
use crate::module::{DeclareContext, Module, ModuleId, ModuleImpl};
use crate::target::{Target, TargetId, TargetSpec};

/// Options shared by every operation of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Directory tree searched for module descriptions.
    pub source_space: Option<PathBuf>,
    /// Whether `set` persists values unless told otherwise.
    pub auto_save: bool,
    /// Name of the ignore list written into each module directory.
    pub ignore_file: String,
    /// Make module description files a dependency of the targets they declare.
    pub track_module_source: bool,
    /// Report module resolution at `info` level instead of `debug`.
    pub verbose: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            source_space: None,
            auto_save: true,
            ignore_file: ".gitignore".to_string(),
            track_module_source: false,
            verbose: false,
        }
    }
}

/// A build session.
///
/// The session owns every target and module it creates. Locations are unique
/// among its targets and directories are unique among its modules; two
/// sessions never share state.
pub struct Session {
    pub(crate) options: SessionOptions,
    pub(crate) targets: Vec<Target>,
    pub(crate) locations: HashMap<PathBuf, TargetId>,
    pub(crate) modules: Vec<Module>,
    pub(crate) directories: HashMap<PathBuf, ModuleId>,
    pub(crate) loader: ModuleLoader,
}

impl Session {
    /// Creates a session with the built-in catalog and the default
    /// description loader.
    pub fn new(options: SessionOptions) -> Self {
        let loader = ModuleLoader::new(options.source_space.clone(), options.verbose);
        Self::with_loader(options, loader)
    }

    /// Creates a session resolving modules through `loader`.
    pub fn with_loader(options: SessionOptions, loader: ModuleLoader) -> Self {
        Self {
            options,
            targets: Vec::new(),
            locations: HashMap::new(),
            modules: Vec::new(),
            directories: HashMap::new(),
            loader,
        }
    }

    /// The session options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The module loader.
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// The built-in catalog, for registering additional modules.
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        self.loader.catalog_mut()
    }

    // -- targets ------------------------------------------------------------

    /// The target `id`.
    ///
    /// # Panics
    ///
    /// If `id` was issued by another session.
    pub fn target(&self, id: TargetId) -> &Target {
        &self.targets[id.index()]
    }

    pub(crate) fn target_mut(&mut self, id: TargetId) -> &mut Target {
        &mut self.targets[id.index()]
    }

    /// Number of registered targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// All registered targets, in registration order.
    pub fn target_ids(&self) -> impl Iterator<Item = TargetId> + '_ {
        (0..self.targets.len()).map(TargetId::new)
    }

    /// The target registered at `location`.
    pub fn lookup(&self, location: impl AsRef<Path>) -> Option<TargetId> {
        let location = normalize_location(location.as_ref()).ok()?;
        self.locations.get(&location).copied()
    }

    /// Registers a new target.
    ///
    /// Fails with [`EngineError::DuplicateTarget`] when a target already
    /// exists at the normalized location. Dependencies must already be
    /// registered, which keeps the target graph acyclic.
    pub fn declare_target(&mut self, spec: TargetSpec) -> EngineResult<TargetId> {
        self.register(spec, None)
    }

    pub(crate) fn register(
        &mut self,
        spec: TargetSpec,
        owner: Option<ModuleId>,
    ) -> EngineResult<TargetId> {
        let location = normalize_location(&spec.location).map_err(|source| EngineError::Io {
            path: spec.location.clone(),
            source,
        })?;
        if self.locations.contains_key(&location) {
            return Err(EngineError::DuplicateTarget { location });
        }

        let mut depth = 0;
        for (name, dep) in &spec.dependencies {
            let Some(dependency) = self.targets.get(dep.index()) else {
                return Err(EngineError::UnknownDependency {
                    location,
                    name: name.clone(),
                });
            };
            depth = depth.max(dependency.depth + 1);
        }

        let id = TargetId::new(self.targets.len());
        debug!(target_location = %location.display(), depth, "registering target");
        self.targets.push(Target {
            location: location.clone(),
            dependencies: spec.dependencies,
            maker: spec.maker,
            format: spec.format,
            value: None,
            touched: false,
            depth,
            parallelism_hint: spec.parallelism_hint,
            params: spec.params,
            owner,
        });
        self.locations.insert(location, id);
        Ok(id)
    }

    /// The target at `location`, or a new expect-made placeholder for it.
    pub fn placeholder(&mut self, location: impl AsRef<Path>) -> EngineResult<TargetId> {
        self.placeholder_as(location.as_ref(), FormatKind::Opaque)
    }

    pub(crate) fn placeholder_as(
        &mut self,
        location: &Path,
        kind: FormatKind,
    ) -> EngineResult<TargetId> {
        match self.lookup(location) {
            Some(id) => Ok(id),
            None => self.register(TargetSpec::new(location).format(kind), None),
        }
    }

    /// Forces the target to be rebuilt by the next `make`.
    pub fn mark_as_touched(&mut self, id: TargetId) {
        self.target_mut(id).touched = true;
    }

    /// One line description of a target.
    pub fn describe(&self, id: TargetId) -> String {
        self.target(id).describe()
    }

    // -- modules ------------------------------------------------------------

    /// The module `id`.
    ///
    /// # Panics
    ///
    /// If `id` was issued by another session.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    /// All constructed modules, in construction order.
    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        (0..self.modules.len()).map(ModuleId::new)
    }

    /// The module constructed for `directory`.
    pub fn module_at(&self, directory: impl AsRef<Path>) -> Option<ModuleId> {
        let directory = fs::canonicalize(directory).ok()?;
        self.directories.get(&directory).copied()
    }

    /// Resolves `directory` into a module, constructing it and its ancestors
    /// on first use.
    ///
    /// Resolving the same directory again returns the same module.
    pub fn resolve(&mut self, directory: impl AsRef<Path>) -> EngineResult<ModuleId> {
        let directory = canonical_directory(directory.as_ref())?;
        if let Some(&id) = self.directories.get(&directory) {
            debug!(directory = %directory.display(), "module already resolved");
            return Ok(id);
        }

        let name = module_name(&directory).ok_or_else(|| EngineError::ModuleResolution {
            directory: directory.clone(),
        })?;
        let source = self.loader.locate(&directory, name)?;
        let implementation = self.loader.load(&source, name)?;
        self.construct(directory, implementation, source)
    }

    /// Constructs a module for `directory` from an explicit implementation.
    pub fn instantiate(
        &mut self,
        directory: impl AsRef<Path>,
        implementation: Rc<dyn ModuleImpl>,
    ) -> EngineResult<ModuleId> {
        let directory = canonical_directory(directory.as_ref())?;
        self.construct(directory, implementation, ModuleSource::Provided)
    }

    fn construct(
        &mut self,
        directory: PathBuf,
        implementation: Rc<dyn ModuleImpl>,
        source: ModuleSource,
    ) -> EngineResult<ModuleId> {
        if self.directories.contains_key(&directory) {
            return Err(EngineError::DuplicateModule { directory });
        }
        let expected = module_name(&directory).unwrap_or_default();
        if expected != implementation.name() {
            return Err(EngineError::IdentityMismatch {
                expected: expected.to_string(),
                implementation: implementation.name().to_string(),
                directory,
            });
        }

        let parent = if implementation.is_root() {
            None
        } else {
            let parent_directory = directory.parent().ok_or_else(|| EngineError::ModuleResolution {
                directory: directory.clone(),
            })?;
            Some(self.resolve(parent_directory)?)
        };

        let start = Instant::now();
        info!(
            module = implementation.name(),
            directory = %directory.display(),
            %source,
            "constructing module"
        );
        let id = ModuleId::new(self.modules.len());
        let target_mark = self.targets.len();
        self.modules.push(Module {
            directory: directory.clone(),
            parent,
            targets: Default::default(),
            implementation: Rc::clone(&implementation),
            source,
        });

        match self.declare_module(id, &*implementation) {
            Ok(()) => {
                self.directories.insert(directory, id);
                debug!(
                    module = implementation.name(),
                    targets = self.module(id).targets.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "module constructed"
                );
                Ok(id)
            }
            Err(e) => {
                self.rollback(id, target_mark);
                Err(e)
            }
        }
    }

    fn declare_module(&mut self, id: ModuleId, implementation: &dyn ModuleImpl) -> EngineResult<()> {
        let source_dependency = match self.module(id).source.path() {
            Some(path) if self.options.track_module_source => {
                let path = path.to_path_buf();
                Some(self.placeholder(path)?)
            }
            _ => None,
        };
        let mut cx = DeclareContext {
            session: self,
            module: id,
            source_dependency,
        };
        implementation.declare_targets(&mut cx)?;

        let module = self.module(id);
        let locations: Vec<&Path> = module
            .targets
            .values()
            .map(|t| self.target(*t).location())
            .collect();
        ignore::write_ignore_list(
            &module.directory,
            &self.options.ignore_file,
            &locations,
            &module.extra_ignore(),
        )?;
        Ok(())
    }

    /// Drops a module that failed to construct together with the targets
    /// it registered.
    fn rollback(&mut self, id: ModuleId, target_mark: usize) {
        for target in self.targets.drain(target_mark..) {
            self.locations.remove(&target.location);
        }
        self.modules.truncate(id.index());
    }
}

fn canonical_directory(path: &Path) -> EngineResult<PathBuf> {
    let canonical = fs::canonicalize(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => EngineError::NotADirectory {
            path: path.to_path_buf(),
        },
        _ => EngineError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(EngineError::NotADirectory { path: canonical })
    }
}
