//! Staleness evaluation: modification times and the up-to-date check.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use plinth_common::Mtime;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};
use crate::session::Session;
use crate::target::TargetId;

/// Modification time of a location.
///
/// A missing location is [`Mtime::Missing`]. A directory is only as fresh as
/// its stalest entry: the result is the minimum over the directory itself and
/// everything beneath it. Symbolic links are followed.
pub fn probe_mtime(location: &Path) -> io::Result<Mtime> {
    let metadata = match fs::metadata(location) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Mtime::Missing),
        Err(e) => return Err(e),
    };
    let mut oldest = metadata.modified()?;
    if metadata.is_dir() {
        for entry in WalkDir::new(location).min_depth(1).follow_links(true) {
            let entry = entry?;
            let modified = fs::metadata(entry.path())?.modified()?;
            oldest = oldest.min(modified);
        }
    }
    Ok(Mtime::At(oldest))
}

/// Why a target is, or is not, up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Nothing to do.
    UpToDate,
    /// The target was marked as touched.
    Touched,
    /// The named dependency is itself out of date.
    DependencyStale(String),
    /// The named dependency is newer than the target.
    OlderThan(String),
    /// The target's location does not exist.
    Missing,
}

impl Staleness {
    /// Whether the target needs no rebuild.
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Staleness::UpToDate)
    }
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Staleness::UpToDate => f.write_str("up to date"),
            Staleness::Touched => f.write_str("touched"),
            Staleness::DependencyStale(name) => write!(f, "dependency '{name}' is stale"),
            Staleness::OlderThan(name) => write!(f, "older than '{name}'"),
            Staleness::Missing => f.write_str("missing"),
        }
    }
}

impl Session {
    /// Modification time of the target's location.
    pub fn mtime(&self, id: TargetId) -> EngineResult<Mtime> {
        let location = self.target(id).location();
        probe_mtime(location).map_err(|source| EngineError::Io {
            path: location.to_path_buf(),
            source,
        })
    }

    /// Whether making the target would run its maker (without `force`).
    pub fn is_up_to_date(&self, id: TargetId) -> EngineResult<bool> {
        Ok(self.staleness(id)?.is_up_to_date())
    }

    /// The up-to-date check with its reason.
    ///
    /// A touched target is stale. Otherwise each dependency, in order, makes
    /// the target stale when it is stale itself or strictly newer than the
    /// target. Equal times count as up to date. When every dependency passes,
    /// the target is up to date exactly when its location exists.
    pub fn staleness(&self, id: TargetId) -> EngineResult<Staleness> {
        self.staleness_memo(id, &mut HashMap::new())
    }

    /// [`staleness`](Self::staleness) with the verdicts of dependencies
    /// cached in `memo`. Entries stay valid as long as no file they depend
    /// on changes.
    pub(crate) fn staleness_memo(
        &self,
        id: TargetId,
        memo: &mut HashMap<TargetId, bool>,
    ) -> EngineResult<Staleness> {
        let target = self.target(id);
        if target.touched {
            return Ok(Staleness::Touched);
        }

        let mut own: Option<Mtime> = None;
        for (name, &dep) in &target.dependencies {
            let fresh = match memo.get(&dep) {
                Some(&fresh) => fresh,
                None => {
                    let fresh = self.staleness_memo(dep, memo)?.is_up_to_date();
                    memo.insert(dep, fresh);
                    fresh
                }
            };
            if !fresh {
                debug!(target_location = %target.location.display(), dependency = %name, "dependency is stale");
                return Ok(Staleness::DependencyStale(name.clone()));
            }
            let mine = match own {
                Some(mtime) => mtime,
                None => *own.insert(self.mtime(id)?),
            };
            if mine < self.mtime(dep)? {
                debug!(target_location = %target.location.display(), dependency = %name, "dependency is newer");
                return Ok(Staleness::OlderThan(name.clone()));
            }
        }

        if target.location.exists() {
            Ok(Staleness::UpToDate)
        } else {
            Ok(Staleness::Missing)
        }
    }
}
