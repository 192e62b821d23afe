//! Targets: the build artifacts the engine tracks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use plinth_common::BoxError;
use serde_json::Value;

use crate::format::{Format, FormatKind};
use crate::make::MakeContext;
use crate::module::ModuleId;

/// Default parallelism hint for makers that do not declare one.
pub const DEFAULT_PARALLELISM_HINT: &str = "100%";

/// Handle to a target registered in a [`Session`](crate::Session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u32);

impl TargetId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the target in registration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Signature of a maker procedure.
pub type MakerFn = dyn Fn(&mut MakeContext<'_>) -> Result<(), BoxError>;

/// How a target is produced.
#[derive(Clone)]
pub enum Maker {
    /// The file is produced outside the engine; making it does nothing.
    ExpectMade,
    /// A procedure that produces the target's file or value.
    Run(Rc<MakerFn>),
}

impl Maker {
    /// A maker that runs `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut MakeContext<'_>) -> Result<(), BoxError> + 'static,
    {
        Maker::Run(Rc::new(f))
    }

    /// Whether this is the no-op maker for externally produced files.
    pub fn is_expect_made(&self) -> bool {
        matches!(self, Maker::ExpectMade)
    }
}

impl fmt::Debug for Maker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Maker::ExpectMade => f.write_str("Maker::ExpectMade"),
            Maker::Run(_) => f.write_str("Maker::Run(..)"),
        }
    }
}

/// A file-backed build artifact.
///
/// Targets are created through [`Session::declare_target`](crate::Session::declare_target)
/// and addressed by [`TargetId`]. The session owns them; its registry
/// guarantees that no two targets share a location.
pub struct Target {
    pub(crate) location: PathBuf,
    pub(crate) dependencies: IndexMap<String, TargetId>,
    pub(crate) maker: Maker,
    pub(crate) format: Rc<dyn Format>,
    pub(crate) value: Option<Value>,
    pub(crate) touched: bool,
    pub(crate) depth: usize,
    pub(crate) parallelism_hint: String,
    pub(crate) params: Option<Value>,
    pub(crate) owner: Option<ModuleId>,
}

impl Target {
    /// The normalized absolute location.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Named dependencies, in declaration order.
    pub fn dependencies(&self) -> &IndexMap<String, TargetId> {
        &self.dependencies
    }

    /// The dependency registered under `name`.
    pub fn dependency(&self, name: &str) -> Option<TargetId> {
        self.dependencies.get(name).copied()
    }

    /// The maker.
    pub fn maker(&self) -> &Maker {
        &self.maker
    }

    /// The format kind.
    pub fn kind(&self) -> &'static str {
        self.format.kind()
    }

    /// The cached in-memory value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether the target was explicitly marked for rebuilding.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Longest dependency chain below this target; 0 for a leaf.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Resource hint for schedulers, e.g. `"100%"` or `"4"`.
    pub fn parallelism_hint(&self) -> &str {
        &self.parallelism_hint
    }

    /// Free-form parameters handed to the maker.
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    /// The module that declared the target, if any.
    pub fn owner(&self) -> Option<ModuleId> {
        self.owner
    }

    /// A one line description.
    pub fn describe(&self) -> String {
        format!(
            "{} [{}@{}] ({})",
            self.location.display(),
            self.depth,
            self.parallelism_hint,
            self.kind()
        )
    }

    /// A longer description supplied by the format.
    pub fn detailed_description(&self) -> String {
        self.format
            .detailed_description(&self.location, self.value.as_ref())
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("location", &self.location)
            .field("kind", &self.kind())
            .field("dependencies", &self.dependencies)
            .field("maker", &self.maker)
            .field("touched", &self.touched)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

/// Builder describing a target to declare.
///
/// ```ignore
/// let spec = TargetSpec::new(dir.join("summary.json"))
///     .format(FormatKind::Json)
///     .depends("src", input)
///     .make_with(|cx| {
///         let rows = cx.get("src")?.clone();
///         cx.set(rows)?;
///         Ok(())
///     });
/// ```
pub struct TargetSpec {
    pub(crate) location: PathBuf,
    pub(crate) format: Rc<dyn Format>,
    pub(crate) maker: Maker,
    pub(crate) dependencies: IndexMap<String, TargetId>,
    pub(crate) parallelism_hint: String,
    pub(crate) params: Option<Value>,
}

impl TargetSpec {
    /// An opaque, externally produced target at `location`.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            format: FormatKind::Opaque.instantiate(),
            maker: Maker::ExpectMade,
            dependencies: IndexMap::new(),
            parallelism_hint: DEFAULT_PARALLELISM_HINT.to_string(),
            params: None,
        }
    }

    /// Uses one of the built-in formats.
    pub fn format(mut self, kind: FormatKind) -> Self {
        self.format = kind.instantiate();
        self
    }

    /// Uses a custom format.
    pub fn with_format(mut self, format: Rc<dyn Format>) -> Self {
        self.format = format;
        self
    }

    /// Sets the maker.
    pub fn maker(mut self, maker: Maker) -> Self {
        self.maker = maker;
        self
    }

    /// Sets the maker to the procedure `f`.
    pub fn make_with<F>(self, f: F) -> Self
    where
        F: Fn(&mut MakeContext<'_>) -> Result<(), BoxError> + 'static,
    {
        self.maker(Maker::new(f))
    }

    /// Adds a named dependency. Re-using a name replaces the earlier entry.
    pub fn depends(mut self, name: impl Into<String>, target: TargetId) -> Self {
        self.dependencies.insert(name.into(), target);
        self
    }

    /// Sets the parallelism hint.
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.parallelism_hint = hint.into();
        self
    }

    /// Sets the maker parameters.
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// The location as given.
    pub fn location(&self) -> &Path {
        &self.location
    }
}
