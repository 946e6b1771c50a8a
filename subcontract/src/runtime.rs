//! The contract runtime
//!
//! A [`ContractRuntime`] owns everything checking needs at run time: the
//! configuration, the failure handler table, the reentrancy state, the
//! registry of override bindings and evaluation counters. Contract specs
//! either name a runtime explicitly with `.on(&runtime)` or use the process
//! global one from [`global`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::{
    config::ContractConfig,
    contract::{ContractKind, FailureContext},
    errors::{ContractError, ContractResult, ContractViolation},
    handler::{FailureHandler, FailureHandlers, Resolution},
    level::{AssertionLevel, LevelFilter},
    old::OldValue,
    reentrancy::{ReentrancyKey, ReentrancyState},
    subcontract::BindingKey,
};

/// Outcome of evaluating a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No clause was declared
    Absent,

    /// The clause's level is filtered out
    Skipped,

    Held,
    Failed,
}

impl Verdict {
    /// Absent and skipped clauses count as satisfied
    pub fn is_satisfied(self) -> bool {
        !matches!(self, Verdict::Failed)
    }
}

/// State behind the runtime's lock
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub(crate) handlers: FailureHandlers,
    pub(crate) reentrancy: ReentrancyState,
}

/// Per-category counters
#[derive(Debug, Default)]
pub(crate) struct CheckStats {
    evaluated: [AtomicU64; 6],
    failed: [AtomicU64; 6],
    reentrant_skips: AtomicU64,
}

impl CheckStats {
    pub(crate) fn record_evaluation(&self, kind: ContractKind) {
        self.evaluated[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, kind: ContractKind) {
        self.failed[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reentrant_skip(&self) {
        self.reentrant_skips.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        let counts = |table: &[AtomicU64; 6]| {
            let load = |kind: ContractKind| table[kind.index()].load(Ordering::Relaxed);
            KindCounts {
                precondition: load(ContractKind::Precondition),
                postcondition: load(ContractKind::Postcondition),
                invariant: load(ContractKind::Invariant),
                old_value: load(ContractKind::OldValue),
                except: load(ContractKind::Except),
                check: load(ContractKind::Check),
            }
        };
        StatsSnapshot {
            evaluated: counts(&self.evaluated),
            failed: counts(&self.failed),
            reentrant_skips: self.reentrant_skips.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in self.evaluated.iter().chain(&self.failed) {
            counter.store(0, Ordering::Relaxed);
        }
        self.reentrant_skips.store(0, Ordering::Relaxed);
    }
}

/// Counter values per contract category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub precondition: u64,
    pub postcondition: u64,
    pub invariant: u64,
    pub old_value: u64,
    pub except: u64,
    pub check: u64,
}

impl KindCounts {
    pub fn get(&self, kind: ContractKind) -> u64 {
        match kind {
            ContractKind::Precondition => self.precondition,
            ContractKind::Postcondition => self.postcondition,
            ContractKind::Invariant => self.invariant,
            ContractKind::OldValue => self.old_value,
            ContractKind::Except => self.except,
            ContractKind::Check => self.check,
        }
    }

    pub fn total(&self) -> u64 {
        ContractKind::ALL.iter().map(|&kind| self.get(kind)).sum()
    }
}

/// Point-in-time copy of the runtime's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Predicates actually invoked
    pub evaluated: KindCounts,

    /// Violations reported to a handler
    pub failed: KindCounts,

    /// Invariant checks skipped because the scope was already being checked
    pub reentrant_skips: u64,
}

/// Holds configuration, handlers and bookkeeping for contract checking
pub struct ContractRuntime {
    config: ContractConfig,
    filter: LevelFilter,
    pub(crate) shared: Mutex<SharedState>,
    pub(crate) bindings: RwLock<FxHashMap<BindingKey, Arc<dyn Any + Send + Sync>>>,
    pub(crate) stats: CheckStats,
}

impl ContractRuntime {
    /// A runtime whose handlers all terminate
    pub fn new(config: ContractConfig) -> Self {
        Self::with_handlers(config, FailureHandlers::new())
    }

    pub fn with_handlers(config: ContractConfig, handlers: FailureHandlers) -> Self {
        debug!(enabled = config.enabled, audit = config.audit_enabled, "contract runtime created");
        Self {
            filter: config.level_filter(),
            config,
            shared: Mutex::new(SharedState { handlers, reentrancy: ReentrancyState::default() }),
            bindings: RwLock::new(FxHashMap::default()),
            stats: CheckStats::default(),
        }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    pub fn level_filter(&self) -> LevelFilter {
        self.filter
    }

    /// Replace the whole handler table
    pub fn set_handlers(&self, handlers: FailureHandlers) {
        self.shared.lock().handlers = handlers;
    }

    /// Edit the handler table in place
    ///
    /// ```
    /// use subcontract::{handler, ContractConfig, ContractRuntime};
    ///
    /// let runtime = ContractRuntime::new(ContractConfig::default());
    /// runtime.update_handlers(|h| {
    ///     h.set_precondition_failure(handler::propagate);
    /// });
    /// ```
    pub fn update_handlers<F: FnOnce(&mut FailureHandlers)>(&self, f: F) {
        f(&mut self.shared.lock().handlers);
    }

    pub fn handler(&self, kind: ContractKind) -> FailureHandler {
        self.shared.lock().handlers.get(kind)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Number of override bindings built so far
    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Whether this thread is inside an assertion and nested checks are off
    pub(crate) fn assertions_suspended(&self) -> bool {
        !self.config.check_within_assertions && self.is_checking(&ReentrancyKey::assertion())
    }

    /// Run `pred` unless `level` is filtered out
    pub(crate) fn evaluate<F: FnOnce() -> bool>(
        &self,
        kind: ContractKind,
        level: AssertionLevel,
        pred: F,
    ) -> Verdict {
        if !self.filter.permits(level) {
            trace!(%kind, %level, "clause filtered out");
            return Verdict::Skipped;
        }
        self.stats.record_evaluation(kind);
        let _assertion = self.mark_assertion();
        if pred() {
            Verdict::Held
        } else {
            Verdict::Failed
        }
    }

    /// Run an old-value expression unless old values are off or `level` is
    /// filtered out
    pub(crate) fn capture<T, F: FnOnce() -> T>(&self, level: AssertionLevel, f: F) -> Option<T> {
        if !self.config.kind_enabled(ContractKind::OldValue) || !self.filter.permits(level) {
            return None;
        }
        self.stats.record_evaluation(ContractKind::OldValue);
        let _assertion = self.mark_assertion();
        Some(f())
    }

    fn mark_assertion(&self) -> Option<crate::reentrancy::ReentrancyToken<'_>> {
        if self.config.check_within_assertions {
            None
        } else {
            self.claim(ReentrancyKey::assertion())
        }
    }

    /// Snapshot an old value from inside an operation body
    ///
    /// Yields an empty slot when old values are disabled or `level` is
    /// filtered out; `f` is not called in that case.
    pub fn old_value<T, F: FnOnce() -> T>(&self, level: AssertionLevel, f: F) -> OldValue<T> {
        match self.capture(level, f) {
            Some(value) => OldValue::from_value(value),
            None => OldValue::empty(),
        }
    }

    /// Ad-hoc check of a default-level condition
    pub fn check(&self, condition: bool, message: impl Into<String>) -> ContractResult<()> {
        self.check_at(AssertionLevel::Default, || condition, message)
    }

    /// Ad-hoc check; `condition` is not called when `level` is filtered out
    pub fn check_at<F: FnOnce() -> bool>(
        &self,
        level: AssertionLevel,
        condition: F,
        message: impl Into<String>,
    ) -> ContractResult<()> {
        if !self.config.kind_enabled(ContractKind::Check) {
            return Ok(());
        }
        match self.evaluate(ContractKind::Check, level, condition) {
            Verdict::Failed => self.report(
                ContractViolation::new(
                    ContractKind::Check,
                    None,
                    message.into(),
                    FailureContext::FromFunction,
                ),
                false,
            ),
            _ => Ok(()),
        }
    }

    /// Hand a violation to the registered handler and act on its resolution
    ///
    /// `unwinding` is set when a panic from the operation body is in flight.
    /// A handler may not propagate or panic then: there is no caller to
    /// receive the error, so the process aborts.
    pub fn report(&self, violation: ContractViolation, unwinding: bool) -> ContractResult<()> {
        self.stats.record_failure(violation.kind());
        let handler = self.handler(violation.kind());
        let resolution = if unwinding {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&violation))) {
                Ok(resolution) => resolution,
                Err(_) => {
                    error!("failure handler panicked while unwinding: {violation}");
                    std::process::abort();
                }
            }
        } else {
            handler(&violation)
        };

        match resolution {
            Resolution::Continue => {
                debug!(kind = %violation.kind(), "violation resolved by continuing");
                Ok(())
            }
            Resolution::Propagate if unwinding => {
                error!("cannot propagate while unwinding: {violation}");
                std::process::abort();
            }
            Resolution::Propagate => Err(ContractError::Violation(violation)),
            Resolution::Terminate => {
                error!("terminating on contract violation: {violation}");
                std::process::abort();
            }
        }
    }
}

impl Default for ContractRuntime {
    fn default() -> Self {
        Self::new(ContractConfig::default())
    }
}

impl fmt::Debug for ContractRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRuntime")
            .field("config", &self.config)
            .field("handlers", &self.shared.lock().handlers)
            .field("bindings", &self.binding_count())
            .finish()
    }
}

static GLOBAL: Lazy<RwLock<Option<Arc<ContractRuntime>>>> = Lazy::new(|| RwLock::new(None));

/// Make `runtime` the process global runtime, replacing any previous one
///
/// Specs already running keep the runtime they started with.
pub fn install(runtime: ContractRuntime) -> Arc<ContractRuntime> {
    let runtime = Arc::new(runtime);
    if GLOBAL.write().replace(Arc::clone(&runtime)).is_some() {
        warn!("replaced the global contract runtime");
    }
    runtime
}

/// The process global runtime, created with default settings on first use
pub fn global() -> Arc<ContractRuntime> {
    if let Some(runtime) = GLOBAL.read().as_ref() {
        return Arc::clone(runtime);
    }
    let mut slot = GLOBAL.write();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(ContractRuntime::default())))
}

/// Remove the global runtime; the next [`global`] call creates a fresh one
pub fn shutdown() -> Option<Arc<ContractRuntime>> {
    GLOBAL.write().take()
}

#[cfg(test)]
#[path = "runtime/runtime_tests.rs"]
mod tests;
