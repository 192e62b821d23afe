//! Modules: directory-bound namespaces of named targets.
//!
//! A module is created by [`Session::resolve`] (or [`Session::instantiate`])
//! for exactly one directory. Construction first resolves the parent
//! directory's module, unless the implementation declares itself a root,
//! then lets the implementation declare its targets through a
//! [`DeclareContext`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use plinth_common::module_suffix;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::format::FormatKind;
use crate::loader::ModuleSource;
use crate::session::Session;
use crate::target::{Maker, TargetId, TargetSpec};

/// File name of the conventional per-module configuration target.
pub const CONFIG_FILE: &str = "config.toml";

/// Dependency name under which module source tracking records the
/// module description file.
pub const MODULE_SOURCE_DEPENDENCY: &str = "__module_source__";

/// Separator of [`Session::codename_pipeline`].
pub const CODENAME_SEPARATOR: &str = "-";

/// Handle to a module registered in a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the module in construction order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A module implementation.
pub trait ModuleImpl {
    /// The module name; must match the directory's conventional name.
    fn name(&self) -> &str;

    /// Root modules stop upward resolution.
    fn is_root(&self) -> bool {
        false
    }

    /// Declares and exports the module's targets.
    fn declare_targets(&self, cx: &mut DeclareContext<'_>) -> EngineResult<()>;

    /// Extra patterns appended to the module's ignore list.
    fn extra_ignore(&self) -> Vec<String> {
        Vec::new()
    }

    /// Codename used in the pipeline codename; defaults to the directory name.
    fn codename(&self, _directory: &Path) -> Option<String> {
        None
    }
}

/// A constructed module.
pub struct Module {
    pub(crate) directory: PathBuf,
    pub(crate) parent: Option<ModuleId>,
    pub(crate) targets: IndexMap<String, TargetId>,
    pub(crate) implementation: Rc<dyn ModuleImpl>,
    pub(crate) source: ModuleSource,
}

impl Module {
    /// The canonical module directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The parent module; `None` for roots.
    pub fn parent(&self) -> Option<ModuleId> {
        self.parent
    }

    /// Implementation name.
    pub fn name(&self) -> &str {
        self.implementation.name()
    }

    /// Whether the module is a root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Where the implementation came from.
    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    /// Exported targets by name, in declaration order.
    pub fn targets(&self) -> &IndexMap<String, TargetId> {
        &self.targets
    }

    /// The exported target `name`.
    pub fn target(&self, name: &str) -> EngineResult<TargetId> {
        self.targets
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownTarget {
                directory: self.directory.clone(),
                name: name.to_string(),
            })
    }

    /// The codename of this module alone.
    pub fn codename(&self) -> String {
        self.implementation
            .codename(&self.directory)
            .unwrap_or_else(|| base_name(&self.directory))
    }

    /// Distinct primary names, in first-seen order.
    ///
    /// `x`, `x:trn` and `x:val` all project to `x`.
    pub fn primary_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.targets
            .keys()
            .map(|name| primary_name(name))
            .filter(|primary| seen.insert(*primary))
            .collect()
    }

    pub(crate) fn extra_ignore(&self) -> Vec<String> {
        self.implementation.extra_ignore()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name())
            .field("directory", &self.directory)
            .field("parent", &self.parent)
            .field("targets", &self.targets)
            .field("source", &self.source)
            .finish()
    }
}

/// The part of a target name before the first colon.
pub fn primary_name(name: &str) -> &str {
    name.split_once(':').map_or(name, |(primary, _)| primary)
}

fn base_name(directory: &Path) -> String {
    directory
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Access handed to [`ModuleImpl::declare_targets`].
pub struct DeclareContext<'s> {
    pub(crate) session: &'s mut Session,
    pub(crate) module: ModuleId,
    pub(crate) source_dependency: Option<TargetId>,
}

impl DeclareContext<'_> {
    /// The module being constructed.
    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    /// The module directory.
    pub fn directory(&self) -> &Path {
        &self.session.modules[self.module.index()].directory
    }

    /// Read access to the session.
    pub fn session(&self) -> &Session {
        self.session
    }

    /// The parent module.
    pub fn parent(&self) -> EngineResult<ModuleId> {
        self.session.get_parent(self.module)
    }

    /// The parent module's exported targets.
    pub fn parent_targets(&self) -> EngineResult<Vec<(String, TargetId)>> {
        let parent = self.parent()?;
        Ok(self
            .session
            .module(parent)
            .targets
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }

    /// Declares a target owned by this module without exporting it.
    ///
    /// Relative locations are taken relative to the module directory.
    pub fn declare(&mut self, mut spec: TargetSpec) -> EngineResult<TargetId> {
        if spec.location.is_relative() {
            spec.location = self.directory().join(&spec.location);
        }
        if let (Some(source), Maker::Run(_)) = (self.source_dependency, &spec.maker) {
            spec.dependencies
                .entry(MODULE_SOURCE_DEPENDENCY.to_string())
                .or_insert(source);
        }
        self.session.register(spec, Some(self.module))
    }

    /// Exports `target` under `name`. Re-exporting a name replaces it.
    pub fn export(&mut self, name: impl Into<String>, target: TargetId) {
        self.session.modules[self.module.index()]
            .targets
            .insert(name.into(), target);
    }

    /// Declares and exports a target.
    pub fn declare_exported(
        &mut self,
        name: impl Into<String>,
        spec: TargetSpec,
    ) -> EngineResult<TargetId> {
        let id = self.declare(spec)?;
        self.export(name, id);
        Ok(id)
    }

    /// The module's `config.toml` target, declared on first use.
    pub fn config_target(&mut self) -> EngineResult<TargetId> {
        let location = self.directory().join(CONFIG_FILE);
        if let Some(id) = self.session.lookup(&location) {
            return Ok(id);
        }
        self.declare(TargetSpec::new(location).format(FormatKind::Toml))
    }

    /// An expect-made placeholder for a file, relative to the module directory.
    pub fn placeholder(&mut self, path: impl AsRef<Path>) -> EngineResult<TargetId> {
        self.placeholder_as(path, FormatKind::Opaque)
    }

    /// Like [`placeholder`](Self::placeholder) with a specific format.
    pub fn placeholder_as(
        &mut self,
        path: impl AsRef<Path>,
        kind: FormatKind,
    ) -> EngineResult<TargetId> {
        let location = self.directory().join(path.as_ref());
        self.session.placeholder_as(&location, kind)
    }

    /// Loads the value of `target`.
    pub fn get(&mut self, target: TargetId) -> EngineResult<&Value> {
        self.session.get(target)
    }
}

impl Session {
    /// The parent of `module`.
    pub fn get_parent(&self, module: ModuleId) -> EngineResult<ModuleId> {
        let m = self.module(module);
        m.parent.ok_or_else(|| EngineError::NoParent {
            directory: m.directory.clone(),
        })
    }

    /// The root at the end of `module`'s parent chain.
    pub fn root_of(&self, module: ModuleId) -> ModuleId {
        let mut current = module;
        while let Some(parent) = self.module(current).parent {
            current = parent;
        }
        current
    }

    /// The nearest module, starting with `module` itself, whose directory
    /// base name or suffix equals `name`.
    ///
    /// The suffix keeps its dot: `Split.v2` is found by `Split.v2` and `.v2`,
    /// but not by `Split` or `v2`.
    pub fn find_ancestor(&self, module: ModuleId, name: &str) -> Option<ModuleId> {
        let mut current = Some(module);
        while let Some(id) = current {
            let directory = &self.module(id).directory;
            let base = directory.file_name().and_then(|n| n.to_str());
            if base == Some(name) || module_suffix(directory) == Some(name) {
                return Some(id);
            }
            current = self.module(id).parent;
        }
        None
    }

    /// Modules from the root down to `module`.
    pub fn enumerate_pipeline(&self, module: ModuleId) -> Vec<ModuleId> {
        let mut chain = vec![module];
        let mut current = module;
        while let Some(parent) = self.module(current).parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Codenames of the pipeline joined with `-`.
    pub fn codename_pipeline(&self, module: ModuleId) -> String {
        self.enumerate_pipeline(module)
            .into_iter()
            .map(|id| self.module(id).codename())
            .collect::<Vec<_>>()
            .join(CODENAME_SEPARATOR)
    }

    /// Exported targets of `module` whose format kind is `kind`.
    pub fn targets_by_kind(&self, module: ModuleId, kind: &str) -> Vec<(&str, TargetId)> {
        self.module(module)
            .targets
            .iter()
            .filter(|(_, id)| self.target(**id).kind() == kind)
            .map(|(name, id)| (name.as_str(), *id))
            .collect()
    }

    /// Expands names to exported targets of `module`.
    ///
    /// A name containing a colon selects exactly that target. A primary
    /// name selects the target of that name along with its secondary
    /// targets (`x` selects `x`, `x:trn` and `x:val`). An empty selection
    /// means every exported target.
    pub fn select_targets(&self, module: ModuleId, names: &[String]) -> EngineResult<Vec<TargetId>> {
        let m = self.module(module);
        if names.is_empty() {
            return Ok(m.targets.values().copied().collect());
        }
        let mut selected = Vec::new();
        for name in names {
            let matching: Vec<TargetId> = m
                .targets
                .iter()
                .filter(|(n, _)| {
                    n.as_str() == name.as_str()
                        || (!name.contains(':') && primary_name(n.as_str()) == name.as_str())
                })
                .map(|(_, id)| *id)
                .collect();
            if matching.is_empty() {
                return Err(EngineError::UnknownTarget {
                    directory: m.directory.clone(),
                    name: name.clone(),
                });
            }
            for id in matching {
                if !selected.contains(&id) {
                    selected.push(id);
                }
            }
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_name_projection() {
        assert_eq!(primary_name("x"), "x");
        assert_eq!(primary_name("x:trn"), "x");
        assert_eq!(primary_name("x:a:b"), "x");
        assert_eq!(primary_name(":odd"), "");
    }

    #[test]
    fn base_name_of_directory() {
        assert_eq!(base_name(Path::new("/p/Split.v2")), "Split.v2");
        assert_eq!(base_name(Path::new("/")), "");
    }

    #[test]
    fn module_id_index() {
        assert_eq!(ModuleId::new(3).index(), 3);
    }
}
