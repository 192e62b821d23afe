//! Filesystem helpers.

use std::io;
use std::path::{Path, PathBuf};

/// Writes `data` to `path` atomically: the bytes go to a sibling temporary
/// file which is then renamed over the destination.
///
/// Missing parent directories are created. Readers never observe a partially
/// written file, and a crash mid-write leaves the previous content intact.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_sibling(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.plinth-tmp"))
}
