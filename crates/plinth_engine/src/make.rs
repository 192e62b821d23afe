//! Making targets, and the get/set discipline makers work through.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::session::Session;
use crate::target::{Maker, TargetId};

/// Options of a [`Session::make`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakeOptions {
    /// Make dependencies first.
    pub recurse: bool,
    /// Run the maker even when the target is up to date.
    pub force: bool,
}

impl Default for MakeOptions {
    fn default() -> Self {
        Self {
            recurse: true,
            force: false,
        }
    }
}

/// What a [`Session::make`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakeReport {
    /// Targets whose maker ran, in order. Expect-made targets never appear.
    pub made: Vec<TargetId>,
    /// Number of visits that found the target up to date.
    pub up_to_date: usize,
}

impl MakeReport {
    /// Combines the report of another call into this one.
    pub fn absorb(&mut self, other: MakeReport) {
        self.made.extend(other.made);
        self.up_to_date += other.up_to_date;
    }
}

/// State of one [`Session::make`] call.
#[derive(Default)]
struct MakeRun {
    report: MakeReport,
    visited: HashSet<TargetId>,
    /// Up-to-date verdicts of targets already settled in this call.
    fresh: HashMap<TargetId, bool>,
}

impl Session {
    /// Makes a target.
    ///
    /// With `recurse`, every dependency is made first, depth first and in
    /// declaration order. The maker then runs if `force` is set or the target
    /// is not up to date. A maker's error is wrapped in
    /// [`EngineError::Maker`]; errors from dependencies pass through as they
    /// are. Files written before a failure stay on disk.
    ///
    /// A target shared by several dependents is visited once per call.
    pub fn make(&mut self, id: TargetId, options: MakeOptions) -> EngineResult<MakeReport> {
        let mut run = MakeRun::default();
        self.make_into(id, options, &mut run)?;
        Ok(run.report)
    }

    fn make_into(&mut self, id: TargetId, options: MakeOptions, run: &mut MakeRun) -> EngineResult<()> {
        if !run.visited.insert(id) {
            return Ok(());
        }
        if options.recurse {
            let dependencies: Vec<TargetId> =
                self.target(id).dependencies.values().copied().collect();
            for dep in dependencies {
                self.make_into(dep, options, run)?;
            }
        }

        if !options.force && self.staleness_memo(id, &mut run.fresh)?.is_up_to_date() {
            debug!(target_location = %self.target(id).location.display(), "already made");
            run.report.up_to_date += 1;
            return Ok(());
        }

        let maker = self.target(id).maker.clone();
        let start = Instant::now();
        match maker {
            Maker::ExpectMade => {
                let location = &self.target(id).location;
                if !location.exists() {
                    warn!(target_location = %location.display(), "expected to be made externally but missing");
                }
                self.target_mut(id).touched = false;
                return Ok(());
            }
            Maker::Run(f) => {
                info!(target_location = %self.target(id).location.display(), "launching maker");
                let mut cx = MakeContext {
                    session: self,
                    target: id,
                };
                f(&mut cx).map_err(|source| EngineError::Maker {
                    location: self.target(id).location.clone(),
                    source,
                })?;
                info!(
                    target_location = %self.target(id).location.display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "maker done"
                );
            }
        }
        self.target_mut(id).touched = false;
        run.fresh.remove(&id);
        run.report.made.push(id);
        Ok(())
    }

    /// The target's value, loaded from its file on first access.
    pub fn get(&mut self, id: TargetId) -> EngineResult<&Value> {
        if self.target(id).value.is_none() {
            let target = self.target(id);
            debug!(target_location = %target.location.display(), "loading value");
            let loaded = target
                .format
                .load(&target.location)
                .map_err(|source| EngineError::Format {
                    location: target.location.clone(),
                    source,
                })?;
            self.target_mut(id).value = loaded;
        }
        let target = self.target(id);
        target.value.as_ref().ok_or_else(|| EngineError::NotLoaded {
            location: target.location.clone(),
        })
    }

    /// Assigns a value, persisting it when `persist` (or, if unset, the
    /// session's `auto_save`) says so.
    ///
    /// A value rejected by the format's sanity check leaves the target and
    /// its file untouched.
    pub fn set(&mut self, id: TargetId, value: Value, persist: Option<bool>) -> EngineResult<()> {
        let persist = persist.unwrap_or(self.options.auto_save);
        let target = self.target_mut(id);
        target
            .format
            .sanity_check(&value)
            .map_err(|reason| EngineError::InvalidValue {
                location: target.location.clone(),
                reason,
            })?;
        let value = target.value.insert(value);
        if persist {
            debug!(target_location = %target.location.display(), "saving value");
            target
                .format
                .save(&target.location, value)
                .map_err(|source| EngineError::Format {
                    location: target.location.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// The view of the session a maker gets while making one target.
pub struct MakeContext<'s> {
    session: &'s mut Session,
    target: TargetId,
}

impl MakeContext<'_> {
    /// The target being made.
    pub fn target_id(&self) -> TargetId {
        self.target
    }

    /// Location of the target being made.
    pub fn location(&self) -> &Path {
        self.session.target(self.target).location()
    }

    /// Maker parameters of the target being made.
    pub fn params(&self) -> Option<&Value> {
        self.session.target(self.target).params()
    }

    /// The dependency registered under `name`.
    pub fn dependency(&self, name: &str) -> EngineResult<TargetId> {
        let target = self.session.target(self.target);
        target
            .dependency(name)
            .ok_or_else(|| EngineError::UnknownDependency {
                location: target.location.clone(),
                name: name.to_string(),
            })
    }

    /// Location of the dependency `name`.
    pub fn dependency_location(&self, name: &str) -> EngineResult<&Path> {
        let dep = self.dependency(name)?;
        Ok(self.session.target(dep).location())
    }

    /// Names of the dependencies, in declaration order.
    pub fn dependency_names(&self) -> Vec<String> {
        self.session
            .target(self.target)
            .dependencies
            .keys()
            .cloned()
            .collect()
    }

    /// Value of the dependency `name`.
    pub fn get(&mut self, name: &str) -> EngineResult<&Value> {
        let dep = self.dependency(name)?;
        self.session.get(dep)
    }

    /// Sets the value of the target being made, persisting per `auto_save`.
    pub fn set(&mut self, value: Value) -> EngineResult<()> {
        self.session.set(self.target, value, None)
    }

    /// Sets the value, persisting it only if `persist`.
    pub fn set_with(&mut self, value: Value, persist: bool) -> EngineResult<()> {
        self.session.set(self.target, value, Some(persist))
    }
}
