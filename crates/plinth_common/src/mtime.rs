//! Modification timestamps with an explicit "does not exist" bottom value.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// The modification time of a target's filesystem counterpart.
///
/// `Missing` plays the role of negative infinity: it orders strictly before
/// every real timestamp, so a missing dependency never makes its dependent
/// look older, while a missing target is older than anything that exists.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mtime {
    /// The location does not exist.
    Missing,
    /// The location exists and was last modified at this instant.
    At(SystemTime),
}

impl Mtime {
    /// Returns `true` if the location does not exist.
    pub fn is_missing(self) -> bool {
        matches!(self, Mtime::Missing)
    }

    /// Returns the underlying timestamp, if any.
    pub fn as_system_time(self) -> Option<SystemTime> {
        match self {
            Mtime::Missing => None,
            Mtime::At(t) => Some(t),
        }
    }

    /// Seconds since the Unix epoch, negative infinity when missing.
    pub fn as_secs_f64(self) -> f64 {
        match self {
            Mtime::Missing => f64::NEG_INFINITY,
            Mtime::At(t) => match t.duration_since(UNIX_EPOCH) {
                Ok(d) => d.as_secs_f64(),
                Err(e) => -e.duration().as_secs_f64(),
            },
        }
    }
}

impl From<SystemTime> for Mtime {
    fn from(t: SystemTime) -> Self {
        Mtime::At(t)
    }
}

impl fmt::Display for Mtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mtime::Missing => f.write_str("-inf"),
            Mtime::At(_) => write!(f, "{:.3}", self.as_secs_f64()),
        }
    }
}

impl fmt::Debug for Mtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mtime({self})")
    }
}
