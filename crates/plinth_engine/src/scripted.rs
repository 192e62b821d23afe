//! Modules declared in TOML description files.
//!
//! A description file holds one table per module implementation. The table
//! named after the module is used, else `Module`, else `Main`:
//!
//! ```toml
//! [Features]
//! codename = "feat"
//! ignore = ["*.log"]
//!
//! [Features.targets.table]
//! path = "table.json"
//! format = "json"
//! command = "extract --in {raw} --out {out}"
//! depends = { raw = { parent = "raw" }, cfg = { file = "config.toml", format = "toml" } }
//!
//! [Features.targets.summary]
//! path = "summary.txt"
//! command = "wc -l {table} > {out}"
//! hint = "1"
//! depends = { table = "table" }
//!
//! [Features.each_parent]
//! kind = "json"
//! path = "{stem}.checked"
//! command = "validate {src} > {out}"
//! ```
//!
//! Dependency references are a bare local target name, `{ parent = .. }`,
//! `{ ancestor = .., target = .. }` or `{ file = .., format = .. }`.
//! Commands run through `sh -c` in the module directory; `{out}`, `{dir}`
//! and `{<dependency>}` are replaced by shell-quoted paths and any other
//! braces are left for the shell.

use std::collections::HashMap;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::format::FormatKind;
use crate::graph::order_named;
use crate::loader::{SourceLoader, FALLBACK_IDENTIFIERS};
use crate::make::MakeContext;
use crate::module::{DeclareContext, ModuleImpl};
use crate::target::{Maker, TargetId, TargetSpec};

/// Dependency name bound to the parent target by `each_parent`.
pub const EACH_PARENT_SOURCE: &str = "src";

/// A module description table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleDescription {
    /// Stop upward resolution at this module.
    #[serde(default)]
    pub root: bool,
    /// Codename used in the pipeline codename.
    pub codename: Option<String>,
    /// Extra ignore-list patterns.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Named targets, in document order.
    #[serde(default)]
    pub targets: IndexMap<String, TargetDescription>,
    /// Template declaring one target per parent target.
    pub each_parent: Option<EachParent>,
}

/// One declared target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDescription {
    /// Location relative to the module directory.
    pub path: String,
    /// Value format.
    #[serde(default)]
    pub format: FormatKind,
    /// Shell command producing the target; none means expect-made.
    pub command: Option<String>,
    /// Parallelism hint.
    pub hint: Option<String>,
    /// Maker parameters.
    pub params: Option<toml::Value>,
    /// Named dependencies.
    #[serde(default)]
    pub depends: IndexMap<String, DependencyRef>,
}

/// Template instantiated once per parent target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EachParent {
    /// Location template; `{name}` is the parent target name, `{stem}` the
    /// file stem of its location.
    pub path: String,
    /// Only parent targets of this format kind.
    pub kind: Option<String>,
    /// Value format.
    #[serde(default)]
    pub format: FormatKind,
    /// Shell command; `{src}` is the parent target.
    pub command: Option<String>,
    /// Parallelism hint.
    pub hint: Option<String>,
    /// Maker parameters.
    pub params: Option<toml::Value>,
    /// Further dependencies; local names refer to `targets`.
    #[serde(default)]
    pub depends: IndexMap<String, DependencyRef>,
}

/// Reference to a dependency.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
    /// A target of the same module.
    Local(String),
    /// A target exported by the parent module.
    Parent {
        /// Target name.
        parent: String,
    },
    /// A target exported by the nearest ancestor with the given name.
    Ancestor {
        /// Directory base name of the ancestor, or its suffix such as `.v2`.
        ancestor: String,
        /// Target name.
        target: String,
    },
    /// A file relative to the module directory.
    File {
        /// Relative path.
        file: String,
        /// Value format.
        #[serde(default)]
        format: FormatKind,
    },
}

/// Errors of command makers.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The shell could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// The expanded command.
        command: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", exit_description(.code))]
    Failed {
        /// The expanded command.
        command: String,
        /// Exit code; `None` when killed by a signal.
        code: Option<i32>,
        /// Trailing standard error output.
        stderr: String,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Loads [`ScriptedModule`]s from description files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedLoader;

impl SourceLoader for ScriptedLoader {
    fn load(&self, path: &Path, module_name: &str) -> EngineResult<Rc<dyn ModuleImpl>> {
        let content = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let module = ScriptedModule::parse(module_name, &content, path)?;
        Ok(Rc::new(module))
    }
}

/// A module implemented by a description table.
#[derive(Debug, Clone)]
pub struct ScriptedModule {
    name: String,
    description: ModuleDescription,
}

impl ScriptedModule {
    /// A module named `name` from an already parsed description.
    pub fn new(name: impl Into<String>, description: ModuleDescription) -> Self {
        Self {
            name: name.into(),
            description,
        }
    }

    /// Parses the description of `module_name` out of a description file.
    ///
    /// `origin` is only used in error messages.
    pub fn parse(module_name: &str, content: &str, origin: &Path) -> EngineResult<Self> {
        let parse_error = |reason: String| EngineError::SourceParse {
            path: origin.to_path_buf(),
            reason,
        };
        let document: toml::Table = toml::from_str(content).map_err(|e| parse_error(e.to_string()))?;
        let candidates: Vec<String> = iter::once(module_name)
            .chain(FALLBACK_IDENTIFIERS)
            .map(String::from)
            .collect();
        for candidate in &candidates {
            if let Some(table @ toml::Value::Table(_)) = document.get(candidate) {
                let description: ModuleDescription = table
                    .clone()
                    .try_into()
                    .map_err(|e: toml::de::Error| parse_error(format!("[{candidate}]: {e}")))?;
                debug!(module = module_name, table = %candidate, "parsed module description");
                return Ok(Self::new(module_name, description));
            }
        }
        Err(EngineError::ImplementationNotFound {
            module: module_name.to_string(),
            origin: origin.display().to_string(),
            candidates,
        })
    }

    /// The parsed description.
    pub fn description(&self) -> &ModuleDescription {
        &self.description
    }

    fn resolve_dependency(
        cx: &mut DeclareContext<'_>,
        name: &str,
        reference: &DependencyRef,
        local: &HashMap<&str, TargetId>,
    ) -> EngineResult<TargetId> {
        let directory = cx.directory().to_path_buf();
        match reference {
            DependencyRef::Local(target) => {
                local
                    .get(target.as_str())
                    .copied()
                    .ok_or_else(|| EngineError::UnknownTarget {
                        directory,
                        name: target.clone(),
                    })
            }
            DependencyRef::Parent { parent } => {
                let p = cx.parent()?;
                cx.session().module(p).target(parent)
            }
            DependencyRef::Ancestor { ancestor, target } => {
                let start = cx.parent()?;
                let found = cx
                    .session()
                    .find_ancestor(start, ancestor)
                    .ok_or_else(|| EngineError::Declaration {
                        directory,
                        reason: format!("dependency '{name}': no ancestor module named '{ancestor}'"),
                    })?;
                cx.session().module(found).target(target)
            }
            DependencyRef::File { file, format } => cx.placeholder_as(file, *format),
        }
    }

    fn spec(
        directory: &Path,
        path: &str,
        format: FormatKind,
        command: Option<&str>,
        hint: Option<&str>,
        params: Option<&toml::Value>,
        dependencies: IndexMap<String, TargetId>,
    ) -> EngineResult<TargetSpec> {
        let mut spec = TargetSpec::new(directory.join(path)).format(format);
        spec.dependencies = dependencies;
        if let Some(command) = command {
            spec = spec.maker(command_maker(command.to_string(), directory.to_path_buf()));
        }
        if let Some(hint) = hint {
            spec = spec.hint(hint);
        }
        if let Some(params) = params {
            let value = serde_json::to_value(params).map_err(|e| EngineError::Declaration {
                directory: directory.to_path_buf(),
                reason: format!("params of '{path}': {e}"),
            })?;
            spec = spec.params(value);
        }
        Ok(spec)
    }

    fn declare_each_parent(
        &self,
        cx: &mut DeclareContext<'_>,
        each: &EachParent,
        local: &HashMap<&str, TargetId>,
    ) -> EngineResult<()> {
        let directory = cx.directory().to_path_buf();
        for (parent_name, parent_id) in cx.parent_targets()? {
            let parent = cx.session().target(parent_id);
            if each.kind.as_deref().is_some_and(|kind| parent.kind() != kind) {
                continue;
            }
            let stem = parent
                .location()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let path = each.path.replace("{name}", &parent_name).replace("{stem}", &stem);

            let mut dependencies = IndexMap::new();
            dependencies.insert(EACH_PARENT_SOURCE.to_string(), parent_id);
            for (name, reference) in &each.depends {
                let id = Self::resolve_dependency(cx, name, reference, local)?;
                dependencies.insert(name.clone(), id);
            }

            if local.contains_key(parent_name.as_str()) {
                return Err(EngineError::Declaration {
                    directory,
                    reason: format!("'{parent_name}' is declared both in targets and by each_parent"),
                });
            }
            let spec = Self::spec(
                &directory,
                &path,
                each.format,
                each.command.as_deref(),
                each.hint.as_deref(),
                each.params.as_ref(),
                dependencies,
            )?;
            cx.declare_exported(parent_name, spec)?;
        }
        Ok(())
    }
}

impl ModuleImpl for ScriptedModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_root(&self) -> bool {
        self.description.root
    }

    fn declare_targets(&self, cx: &mut DeclareContext<'_>) -> EngineResult<()> {
        let directory = cx.directory().to_path_buf();
        let entries: Vec<(&String, &TargetDescription)> = self.description.targets.iter().collect();
        let names: Vec<String> = entries.iter().map(|(name, _)| (*name).clone()).collect();

        let mut edges = Vec::new();
        for (index, (_, target)) in entries.iter().enumerate() {
            for reference in target.depends.values() {
                if let DependencyRef::Local(local) = reference {
                    let dep = names.iter().position(|n| n == local).ok_or_else(|| {
                        EngineError::UnknownTarget {
                            directory: directory.clone(),
                            name: local.clone(),
                        }
                    })?;
                    edges.push((dep, index));
                }
            }
        }
        let order = order_named(&names, &edges).map_err(|members| EngineError::DependencyCycle {
            directory: directory.clone(),
            members,
        })?;

        let mut declared: HashMap<&str, TargetId> = HashMap::new();
        for index in order {
            let (name, target) = entries[index];
            let mut dependencies = IndexMap::new();
            for (dep_name, reference) in &target.depends {
                let id = Self::resolve_dependency(cx, dep_name, reference, &declared)?;
                dependencies.insert(dep_name.clone(), id);
            }
            let spec = Self::spec(
                &directory,
                &target.path,
                target.format,
                target.command.as_deref(),
                target.hint.as_deref(),
                target.params.as_ref(),
                dependencies,
            )?;
            declared.insert(name.as_str(), cx.declare(spec)?);
        }
        for name in &names {
            if let Some(&id) = declared.get(name.as_str()) {
                cx.export(name.clone(), id);
            }
        }

        if let Some(each) = &self.description.each_parent {
            self.declare_each_parent(cx, each, &declared)?;
        }
        Ok(())
    }

    fn extra_ignore(&self) -> Vec<String> {
        self.description.ignore.clone()
    }

    fn codename(&self, _directory: &Path) -> Option<String> {
        self.description.codename.clone()
    }
}

/// A maker running `command` through `sh -c` in `directory`.
pub fn command_maker(command: String, directory: PathBuf) -> Maker {
    Maker::new(move |cx| {
        let cx: &MakeContext<'_> = cx;
        let script = expand_command(&command, |key| placeholder_path(cx, &directory, key));
        run_command(&script, &directory)?;
        Ok(())
    })
}

fn placeholder_path(cx: &MakeContext<'_>, directory: &Path, key: &str) -> Option<PathBuf> {
    match key {
        "out" => Some(cx.location().to_path_buf()),
        "dir" => Some(directory.to_path_buf()),
        name => cx.dependency_location(name).ok().map(Path::to_path_buf),
    }
}

/// Replaces `{key}` with the shell-quoted path `lookup(key)`.
///
/// Braces whose content `lookup` does not know stay as written.
pub fn expand_command(template: &str, lookup: impl Fn(&str) -> Option<PathBuf>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(path) => result.push_str(&shell_quote(&path.to_string_lossy())),
                    None => {
                        result.push('{');
                        result.push_str(key);
                        result.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                result.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// Quotes `text` for `sh`.
pub fn shell_quote(text: &str) -> String {
    if !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
    {
        return text.to_string();
    }
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Runs `script` with `sh -c` in `directory`.
pub fn run_command(script: &str, directory: &Path) -> Result<(), CommandError> {
    debug!(command = script, directory = %directory.display(), "running command");
    let output = Command::new("sh")
        .arg("-c")
        .arg(script)
        .current_dir(directory)
        .output()
        .map_err(|source| CommandError::Spawn {
            command: script.to_string(),
            source,
        })?;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!(command = script, "{line}");
    }
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    Err(CommandError::Failed {
        command: script.to_string(),
        code: output.status.code(),
        stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
    })
}
