//! Directory naming conventions and location normalization.
//!
//! A module directory is named `<module>` or `<module>.<label>`: the part
//! before the first dot selects the implementation, the optional label tells
//! sibling instances of the same implementation apart. The suffix, from the
//! last dot on, is what ancestor lookups match besides the full base name.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Returns the conventional module name of a directory: its base name up to
/// the first label-separating dot.
///
/// Returns `None` for paths without a UTF-8 base name (e.g. `/` or `..`).
pub fn module_name(directory: &Path) -> Option<&str> {
    let base = directory.file_name()?.to_str()?;
    Some(base.split_once('.').map_or(base, |(name, _)| name))
}

/// Returns the suffix of a module directory: its base name from the last dot
/// on, dot included (`X.b.c` has suffix `.c`).
///
/// A leading dot does not start a suffix, so `.hidden` has none.
pub fn module_suffix(directory: &Path) -> Option<&str> {
    let base = directory.file_name()?.to_str()?;
    base.rfind('.').filter(|&dot| dot > 0).map(|dot| &base[dot..])
}

/// Resolves a location into the absolute form used as a registry key.
///
/// Existing paths are canonicalized (symlinks resolved). For paths that do not
/// exist yet, the longest existing ancestor is canonicalized and the remaining
/// components are appended lexically, so a location keeps the same key before
/// and after it is first written.
pub fn normalize_location(path: &Path) -> io::Result<PathBuf> {
    let absolute = lexical_clean(&std::path::absolute(path)?);
    if let Ok(canonical) = absolute.canonicalize() {
        return Ok(canonical);
    }

    let mut tail: Vec<OsString> = Vec::new();
    let mut current = absolute.as_path();
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            tail.push(name.to_os_string());
        }
        if let Ok(mut resolved) = parent.canonicalize() {
            for name in tail.iter().rev() {
                resolved.push(name);
            }
            return Ok(resolved);
        }
        current = parent;
    }
    Ok(absolute)
}

/// Returns `path` relative to `base`, or `None` if it lies outside of `base`.
pub fn relative_to<'a>(path: &'a Path, base: &Path) -> Option<&'a Path> {
    path.strip_prefix(base).ok()
}

/// Removes `.` components and folds `..` into the preceding component.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
