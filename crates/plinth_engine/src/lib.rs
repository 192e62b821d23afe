//! Incremental build engine of file-backed targets grouped into
//! directory-bound modules.
//!
//! A [`Session`] owns everything: targets are registered through
//! [`Session::declare_target`] (one per location), modules are built by
//! [`Session::resolve`], which locates an implementation for a directory,
//! resolves the parent directory's module first and lets the
//! implementation declare its targets. [`Session::make`] then brings a
//! target up to date, rebuilding dependencies first and running makers only
//! where modification times say so.
//!
//! ```ignore
//! let mut session = Session::new(SessionOptions::default());
//! let module = session.resolve("pipeline/Data/Features.v2")?;
//! let table = session.module(module).target("table")?;
//! session.make(table, MakeOptions::default())?;
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod error;
pub mod format;
pub mod graph;
pub mod ignore;
pub mod loader;
pub mod make;
pub mod module;
pub mod scripted;
pub mod session;
pub mod staleness;
pub mod target;

pub use catalog::{Catalog, LocalData, RootModule};
pub use error::{EngineError, EngineResult};
pub use format::{Format, FormatError, FormatKind};
pub use graph::{PlanStage, PlannedJob};
pub use loader::{ModuleLoader, ModuleSource, SourceLoader};
pub use make::{MakeContext, MakeOptions, MakeReport};
pub use module::{DeclareContext, Module, ModuleId, ModuleImpl};
pub use scripted::{ScriptedLoader, ScriptedModule};
pub use serde_json::Value;
pub use session::{Session, SessionOptions};
pub use staleness::Staleness;
pub use target::{Maker, Target, TargetId, TargetSpec};
