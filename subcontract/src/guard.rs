//! Per-call check sequencing
//!
//! A [`CheckGuard`] lives for one checked call and runs the contract at the
//! right moments:
//!
//! 1. entry: invariants, then preconditions (OR'ed over levels), then old
//!    values
//! 2. normal exit: invariants, then postconditions (AND'ed)
//! 3. failed exit, on `Err` or panic: invariants, then exception guarantees
//!    (AND'ed)
//!
//! Which invariants run at each moment depends on the operation kind; see
//! [`OperationKind::invariants_at`].

use std::borrow::Borrow;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace, warn};

use crate::{
    contract::{ContractKind, Moment, OperationKind},
    errors::{ContractError, ContractResult, ContractViolation},
    invariant::{InvariantChecker, InvariantHooks, Site},
    runtime::{ContractRuntime, Verdict},
    subcontract::{self, ArmedLevel, Level, LevelFailure},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Entering,
    BodyRunning,
    ExitedNormally,
    ExitedByException,
}

struct ArmedEntry<'g, S, A, R> {
    class: Option<&'g str>,
    clauses: Box<dyn ArmedLevel<S, A, R> + 'g>,
}

pub(crate) struct CheckGuard<'g, S, A, R> {
    runtime: &'g ContractRuntime,
    operation: &'g str,
    kind: OperationKind,
    levels: Vec<&'g (dyn Level<S, A, R> + 'g)>,
    armed: Vec<ArmedEntry<'g, S, A, R>>,
    hooks: InvariantHooks<S, R>,
    active: bool,
    phase: Phase,
}

impl<'g, S, A, R> CheckGuard<'g, S, A, R> {
    pub(crate) fn new(
        runtime: &'g ContractRuntime,
        operation: &'g str,
        kind: OperationKind,
        levels: Vec<&'g (dyn Level<S, A, R> + 'g)>,
        hooks: InvariantHooks<S, R>,
    ) -> Self {
        let active = runtime.config().operation_enabled(kind) && !runtime.assertions_suspended();
        if !active {
            trace!(operation, %kind, "contract checking off for this call");
        }
        Self {
            runtime,
            operation,
            kind,
            levels,
            armed: Vec::new(),
            hooks,
            active,
            phase: Phase::Entering,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn enter(&mut self, subject: &S, args: &A) -> ContractResult<()> {
        if !self.active {
            self.phase = Phase::BodyRunning;
            return Ok(());
        }
        debug!(operation = self.operation, kind = %self.kind, "entering");

        self.check_invariants(Moment::Entry, subject, None, false)?;

        if self.runtime.config().kind_enabled(ContractKind::Precondition) {
            if let Some(failure) =
                subcontract::precondition_any(self.runtime, &self.levels, subject, args)
            {
                self.report(ContractKind::Precondition, failure, false)?;
            }
        }

        for i in 0..self.levels.len() {
            let level = self.levels[i];
            let armed = level.arm(self.runtime, subject, args);
            self.armed.push(ArmedEntry { class: level.class(), clauses: armed.clauses });
            if let Some(message) = armed.old_failure {
                let class = level.class().map(str::to_string);
                self.report(ContractKind::OldValue, LevelFailure { class, message }, false)?;
            }
        }

        self.phase = Phase::BodyRunning;
        Ok(())
    }

    pub(crate) fn exit_normally(&mut self, subject: &S, args: &A, result: &R) -> ContractResult<()> {
        self.phase = Phase::ExitedNormally;
        if !self.active {
            return Ok(());
        }

        self.check_invariants(Moment::Exit, subject, Some(result), false)?;

        if self.runtime.config().kind_enabled(ContractKind::Postcondition) {
            for entry in &self.armed {
                if entry.clauses.postcondition(self.runtime, subject, args, result) == Verdict::Failed {
                    let failure = LevelFailure {
                        class: entry.class.map(str::to_string),
                        message: "postcondition failed".to_string(),
                    };
                    self.report(ContractKind::Postcondition, failure, false)?;
                }
            }
        }
        debug!(operation = self.operation, "exited normally");
        Ok(())
    }

    /// Run the failed-exit checks
    ///
    /// With `unwinding` set a violation can only be continued past or abort
    /// the process, so the result is always `Ok`.
    pub(crate) fn exit_by_exception(&mut self, subject: &S, args: &A, unwinding: bool) -> ContractResult<()> {
        self.phase = Phase::ExitedByException;
        if !self.active {
            return Ok(());
        }

        self.check_invariants(Moment::FailedExit, subject, None, unwinding)?;

        if self.runtime.config().kind_enabled(ContractKind::Except) {
            for entry in &self.armed {
                if entry.clauses.except(self.runtime, subject, args) == Verdict::Failed {
                    let failure = LevelFailure {
                        class: entry.class.map(str::to_string),
                        message: "exception guarantee failed".to_string(),
                    };
                    self.report(ContractKind::Except, failure, unwinding)?;
                }
            }
        }
        debug!(operation = self.operation, unwinding, "exited by failure");
        Ok(())
    }

    fn check_invariants(
        &self,
        moment: Moment,
        subject: &S,
        result: Option<&R>,
        unwinding: bool,
    ) -> ContractResult<()> {
        let demand = self.kind.invariants_at(moment);
        if demand.is_empty() || !self.runtime.config().invariants_enabled_at(moment) {
            return Ok(());
        }
        let site = Site { operation: self.operation, context: self.kind.context(), moment, unwinding };
        let checker = InvariantChecker::new(self.runtime, site);
        if demand.statics {
            self.hooks.check_statics(&checker)?;
        }
        if demand.instance {
            self.hooks.check_instance(&checker, subject, result)?;
        }
        Ok(())
    }

    fn report(&self, kind: ContractKind, failure: LevelFailure, unwinding: bool) -> ContractResult<()> {
        let mut violation = ContractViolation::new(
            kind,
            Some(self.operation.to_string()),
            failure.message,
            self.kind.context(),
        );
        if let Some(class) = failure.class {
            violation = violation.with_class(class);
        }
        self.runtime.report(violation, unwinding)
    }
}

impl<S, A, R> Drop for CheckGuard<'_, S, A, R> {
    fn drop(&mut self) {
        if self.phase == Phase::BodyRunning && !std::thread::panicking() {
            warn!(operation = self.operation, "contract guard dropped before the operation exited");
        }
    }
}

/// Run `body` under `guard`
///
/// A panic in `body` is caught long enough to run the failed-exit checks and
/// then resumed.
///
/// `subject` is the object itself for mutating operations, or a shared
/// reference to it for `&self` operations.
pub(crate) fn drive<S, P, A, R, E, F>(
    mut guard: CheckGuard<'_, S, A, R>,
    subject: &mut P,
    mut args: A,
    body: F,
) -> Result<R, E>
where
    P: Borrow<S>,
    F: FnOnce(&mut P, &mut A) -> Result<R, E>,
    E: From<ContractError>,
{
    guard.enter(Borrow::<S>::borrow(&*subject), &args)?;
    debug_assert_eq!(guard.phase(), Phase::BodyRunning);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *subject, &mut args)));
    let subject = Borrow::<S>::borrow(&*subject);
    match outcome {
        Ok(Ok(result)) => {
            guard.exit_normally(subject, &args, &result)?;
            Ok(result)
        }
        Ok(Err(error)) => match guard.exit_by_exception(subject, &args, false) {
            Ok(()) => Err(error),
            Err(violation) => {
                warn!(
                    operation = guard.operation,
                    "contract violation on the failure path replaces the operation's error"
                );
                Err(violation.into())
            }
        },
        Err(payload) => {
            let checked = guard.exit_by_exception(subject, &args, true);
            debug_assert!(checked.is_ok(), "failed-exit checks returned an error while unwinding");
            panic::resume_unwind(payload)
        }
    }
}
