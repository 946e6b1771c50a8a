//! Failure handler registry
//!
//! One handler per [`ContractKind`]. A handler inspects the violation and
//! returns a [`Resolution`]: carry on as if the clause held, propagate the
//! violation to the caller as an error, or terminate the process. Kinds
//! without a registered handler terminate, since a violated contract is a
//! bug rather than a recoverable condition.

use std::fmt;
use std::sync::Arc;

use tracing::{error, warn};

use crate::{
    contract::{ContractKind, FailureContext},
    errors::ContractViolation,
};

/// What the runtime does after a handler has seen a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Treat the violation as logged and ignored
    Continue,

    /// Return the violation to the caller as `ContractError::Violation`
    Propagate,

    /// Abort the process
    Terminate,
}

/// Shared handler callback
pub type FailureHandler = Arc<dyn Fn(&ContractViolation) -> Resolution + Send + Sync>;

/// Handler table keyed by violation category
#[derive(Clone, Default)]
pub struct FailureHandlers {
    table: [Option<FailureHandler>; 6],
}

impl FailureHandlers {
    /// A table where every category terminates
    pub fn new() -> Self {
        Self::default()
    }

    /// A table where every category propagates
    pub fn propagating() -> Self {
        let mut handlers = Self::new();
        handlers.set_all(propagate);
        handlers
    }

    /// Register `handler` for `kind`, replacing any previous one
    pub fn set<F>(&mut self, kind: ContractKind, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        self.table[kind.index()] = Some(Arc::new(handler));
        self
    }

    /// Register one shared handler for every category
    pub fn set_all<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        let shared: FailureHandler = Arc::new(handler);
        for slot in &mut self.table {
            *slot = Some(Arc::clone(&shared));
        }
        self
    }

    pub fn set_precondition_failure<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        self.set(ContractKind::Precondition, handler)
    }

    pub fn set_postcondition_failure<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        self.set(ContractKind::Postcondition, handler)
    }

    pub fn set_invariant_failure<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        self.set(ContractKind::Invariant, handler)
    }

    pub fn set_old_value_failure<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        self.set(ContractKind::OldValue, handler)
    }

    pub fn set_except_failure<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        self.set(ContractKind::Except, handler)
    }

    pub fn set_check_failure<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ContractViolation) -> Resolution + Send + Sync + 'static,
    {
        self.set(ContractKind::Check, handler)
    }

    /// Restore the terminating default for `kind`
    pub fn reset(&mut self, kind: ContractKind) -> &mut Self {
        self.table[kind.index()] = None;
        self
    }

    pub fn is_default(&self, kind: ContractKind) -> bool {
        self.table[kind.index()].is_none()
    }

    /// The handler for `kind`, falling back to [`terminate`]
    pub fn get(&self, kind: ContractKind) -> FailureHandler {
        match &self.table[kind.index()] {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(terminate),
        }
    }

    /// Run the handler registered for the violation's category
    pub fn resolve(&self, violation: &ContractViolation) -> Resolution {
        (self.get(violation.kind()))(violation)
    }
}

impl fmt::Debug for FailureHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in ContractKind::ALL {
            map.entry(
                &kind.name(),
                &if self.is_default(kind) { "terminate" } else { "custom" },
            );
        }
        map.finish()
    }
}

/// Default handler: log and terminate
pub fn terminate(violation: &ContractViolation) -> Resolution {
    error!("{violation}; terminating");
    Resolution::Terminate
}

/// Hand every violation back to the caller
pub fn propagate(_violation: &ContractViolation) -> Resolution {
    Resolution::Propagate
}

/// Log the violation and keep running
pub fn log_and_continue(violation: &ContractViolation) -> Resolution {
    warn!("{violation}");
    Resolution::Continue
}

/// Propagate, except from destructors where the violation is only logged
pub fn propagate_unless_destructor(violation: &ContractViolation) -> Resolution {
    if violation.context() == FailureContext::FromDestructor {
        warn!("{violation}");
        Resolution::Continue
    } else {
        Resolution::Propagate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn violation(kind: ContractKind, context: FailureContext) -> ContractViolation {
        ContractViolation::new(kind, Some("f".to_string()), "x > 0".to_string(), context)
    }

    #[test]
    fn test_defaults_terminate() {
        let handlers = FailureHandlers::new();
        for kind in ContractKind::ALL {
            assert!(handlers.is_default(kind));
            assert_eq!(
                handlers.resolve(&violation(kind, FailureContext::FromFunction)),
                Resolution::Terminate
            );
        }
    }

    #[test]
    fn test_last_registration_wins() {
        let mut handlers = FailureHandlers::new();
        handlers.set_precondition_failure(|_| Resolution::Propagate);
        handlers.set_precondition_failure(|_| Resolution::Continue);
        let v = violation(ContractKind::Precondition, FailureContext::FromFunction);
        assert_eq!(handlers.resolve(&v), Resolution::Continue);
    }

    #[test]
    fn test_handlers_are_per_category() {
        let mut handlers = FailureHandlers::new();
        handlers.set_postcondition_failure(log_and_continue);
        assert!(!handlers.is_default(ContractKind::Postcondition));
        assert!(handlers.is_default(ContractKind::Precondition));
    }

    #[test]
    fn test_named_setters_cover_all_kinds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handlers = FailureHandlers::new();
        for kind in ContractKind::ALL {
            let calls = Arc::clone(&calls);
            let handler = move |_: &ContractViolation| {
                calls.fetch_add(1, Ordering::SeqCst);
                Resolution::Continue
            };
            match kind {
                ContractKind::Precondition => handlers.set_precondition_failure(handler),
                ContractKind::Postcondition => handlers.set_postcondition_failure(handler),
                ContractKind::Invariant => handlers.set_invariant_failure(handler),
                ContractKind::OldValue => handlers.set_old_value_failure(handler),
                ContractKind::Except => handlers.set_except_failure(handler),
                ContractKind::Check => handlers.set_check_failure(handler),
            };
        }
        for kind in ContractKind::ALL {
            handlers.resolve(&violation(kind, FailureContext::FromFunction));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_reset_restores_default() {
        let mut handlers = FailureHandlers::propagating();
        handlers.reset(ContractKind::Invariant);
        assert!(handlers.is_default(ContractKind::Invariant));
        assert!(!handlers.is_default(ContractKind::Except));
    }

    #[test]
    fn test_propagate_unless_destructor() {
        let from_fn = violation(ContractKind::Invariant, FailureContext::FromFunction);
        let from_dtor = violation(ContractKind::Invariant, FailureContext::FromDestructor);
        assert_eq!(propagate_unless_destructor(&from_fn), Resolution::Propagate);
        assert_eq!(propagate_unless_destructor(&from_dtor), Resolution::Continue);
    }

    #[test]
    fn test_debug_lists_categories() {
        let mut handlers = FailureHandlers::new();
        handlers.set_check_failure(propagate);
        let text = format!("{handlers:?}");
        assert!(text.contains("\"check\": \"custom\""));
        assert!(text.contains("\"precondition\": \"terminate\""));
    }
}
