//! Shared foundational types used across the plinth build engine.
//!
//! This crate provides the negative-infinity aware modification timestamp,
//! the directory naming conventions that tie a module directory to its
//! implementation, atomic file writes, and common result types.

#![warn(missing_docs)]

pub mod fsutil;
pub mod mtime;
pub mod paths;
pub mod result;

pub use fsutil::write_atomic;
pub use mtime::Mtime;
pub use paths::{module_name, module_suffix, normalize_location, relative_to};
pub use result::BoxError;
