//! Error types for target and module operations.

use std::path::PathBuf;

use plinth_common::BoxError;

use crate::format::FormatError;

/// Errors raised by the build engine.
///
/// Every error is fatal to the enclosing `make`/`resolve` call chain. Errors
/// coming out of a dependency's `make` are handed to the caller unchanged;
/// only a failing maker's own error is wrapped once, in [`EngineError::Maker`],
/// to record which target it was making.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A target is already registered at this location.
    #[error("a target is already registered at {location}")]
    DuplicateTarget {
        /// The normalized location.
        location: PathBuf,
    },

    /// A module is already registered for this directory.
    #[error("a module is already registered for {directory}")]
    DuplicateModule {
        /// The module directory.
        directory: PathBuf,
    },

    /// No implementation source could be found for a module directory.
    #[error("no module implementation found for {directory}")]
    ModuleResolution {
        /// The module directory.
        directory: PathBuf,
    },

    /// An implementation source was found but holds no usable module.
    #[error("none of {candidates:?} names a usable module implementation in {origin}")]
    ImplementationNotFound {
        /// The conventional module name derived from the directory.
        module: String,
        /// Where the loader looked.
        origin: String,
        /// The identifiers that were probed, in order.
        candidates: Vec<String>,
    },

    /// The directory name does not match the implementation constructing it.
    #[error("module directory {directory} implies '{expected}' but the implementation is '{implementation}'")]
    IdentityMismatch {
        /// The module directory.
        directory: PathBuf,
        /// The module name implied by the directory name.
        expected: String,
        /// The name declared by the implementation.
        implementation: String,
    },

    /// Loading a target completed without producing a value.
    #[error("target {location} produced no value when loaded")]
    NotLoaded {
        /// The target location.
        location: PathBuf,
    },

    /// A value was rejected by the target's sanity check.
    #[error("invalid value for target {location}: {reason}")]
    InvalidValue {
        /// The target location.
        location: PathBuf,
        /// Why the value was rejected.
        reason: String,
    },

    /// A maker failed.
    #[error("maker for {location} failed: {source}")]
    Maker {
        /// The location of the target being made.
        location: PathBuf,
        /// The error returned by the maker.
        #[source]
        source: BoxError,
    },

    /// The parent of a root module was requested.
    #[error("module at {directory} is a root module and has no parent")]
    NoParent {
        /// The module directory.
        directory: PathBuf,
    },

    /// Declared targets depend on each other in a cycle.
    #[error("dependency cycle among targets of {directory}: {}", .members.join(", "))]
    DependencyCycle {
        /// The module directory.
        directory: PathBuf,
        /// Names of the targets taking part in the cycle.
        members: Vec<String>,
    },

    /// A module has no target with the requested name.
    #[error("module at {directory} has no target named '{name}'")]
    UnknownTarget {
        /// The module directory.
        directory: PathBuf,
        /// The requested target name.
        name: String,
    },

    /// A target has no dependency with the requested name.
    #[error("target {location} has no dependency named '{name}'")]
    UnknownDependency {
        /// The target location.
        location: PathBuf,
        /// The requested dependency name.
        name: String,
    },

    /// A module path is not a directory.
    #[error("{path} is not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A module could not declare its targets.
    #[error("cannot declare targets of {directory}: {reason}")]
    Declaration {
        /// The module directory.
        directory: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A format collaborator failed to load or save a value.
    #[error("cannot access {location}: {source}")]
    Format {
        /// The target location.
        location: PathBuf,
        /// The underlying format error.
        #[source]
        source: FormatError,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A module description file could not be parsed.
    #[error("failed to parse module description {path}: {reason}")]
    SourceParse {
        /// The description file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },
}

/// Result type of engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_target_display() {
        let err = EngineError::DuplicateTarget {
            location: PathBuf::from("/p/M/out.json"),
        };
        assert_eq!(
            err.to_string(),
            "a target is already registered at /p/M/out.json"
        );
    }

    #[test]
    fn implementation_not_found_display() {
        let err = EngineError::ImplementationNotFound {
            module: "Filter".to_string(),
            origin: "/p/Filter/Filter.toml".to_string(),
            candidates: vec!["Filter".into(), "Module".into(), "Main".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"Module\""));
        assert!(msg.contains("Filter.toml"));
    }

    #[test]
    fn cycle_lists_members() {
        let err = EngineError::DependencyCycle {
            directory: PathBuf::from("/p/M"),
            members: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().ends_with("a, b"));
    }

    #[test]
    fn maker_error_keeps_source() {
        use std::error::Error as _;
        let err = EngineError::Maker {
            location: PathBuf::from("/p/M/x"),
            source: "exit status 2".into(),
        };
        assert!(err.to_string().contains("exit status 2"));
        assert_eq!(err.source().unwrap().to_string(), "exit status 2");
    }

    #[test]
    fn io_error_display() {
        let err = EngineError::Io {
            path: PathBuf::from("/p/M"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("denied"));
    }
}
