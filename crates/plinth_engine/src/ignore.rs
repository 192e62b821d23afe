//! The ignore list each module writes into its directory.

use std::fs;
use std::path::Path;

use plinth_common::{relative_to, write_atomic};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Renders the ignore list: one relative target location per line, then
/// the extra patterns.
///
/// Locations outside `directory` cannot be expressed and are skipped.
pub fn render_ignore_list(directory: &Path, locations: &[&Path], extra: &[String]) -> String {
    let mut content = String::new();
    for location in locations {
        match relative_to(location, directory) {
            Some(relative) if !relative.as_os_str().is_empty() => {
                content.push_str(&relative.to_string_lossy());
                content.push('\n');
            }
            _ => {
                warn!(
                    target_location = %location.display(),
                    directory = %directory.display(),
                    "target lies outside its module directory; not ignored"
                );
            }
        }
    }
    for pattern in extra {
        content.push_str(pattern);
        content.push('\n');
    }
    content
}

/// Writes the ignore list `file_name` into `directory`.
///
/// The file is left alone when it already holds the same content.
pub fn write_ignore_list(
    directory: &Path,
    file_name: &str,
    locations: &[&Path],
    extra: &[String],
) -> EngineResult<()> {
    let path = directory.join(file_name);
    let content = render_ignore_list(directory, locations, extra);
    if fs::read_to_string(&path).is_ok_and(|existing| existing == content) {
        debug!(path = %path.display(), "ignore list unchanged");
        return Ok(());
    }
    debug!(path = %path.display(), entries = content.lines().count(), "writing ignore list");
    write_atomic(&path, content.as_bytes()).map_err(|source| EngineError::Io { path, source })
}
