//! Runtime configuration
//!
//! A [`ContractConfig`] is fixed when a [`ContractRuntime`](crate::ContractRuntime)
//! is built. Every gated code path consults it before any predicate is
//! touched, so a disabled category costs a boolean test per call.

use serde::{Deserialize, Serialize};

use crate::{
    contract::{ContractKind, Moment, OperationKind},
    errors::{ContractError, ContractResult},
    level::LevelFilter,
};

/// Switches controlling which contracts are checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Master switch for every check
    pub enabled: bool,

    pub preconditions: bool,
    pub postconditions: bool,
    pub entry_invariants: bool,
    pub exit_invariants: bool,
    pub except: bool,
    pub old_values: bool,

    /// Ad-hoc checks placed in operation bodies
    pub checks: bool,

    pub constructors: bool,
    pub destructors: bool,
    pub public_functions: bool,

    /// Free, private and protected functions
    pub other_functions: bool,

    /// Evaluate audit-level clauses
    pub audit_enabled: bool,

    /// Track in-progress invariant checks so nested calls do not re-check
    ///
    /// Turning this off removes the bookkeeping lock from every call, at the
    /// price of unbounded recursion when an invariant calls a public
    /// operation of its own object.
    pub reentrancy_guard: bool,

    /// Check the contracts of operations called while an assertion is
    /// being evaluated on the same thread
    pub check_within_assertions: bool,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preconditions: true,
            postconditions: true,
            entry_invariants: true,
            exit_invariants: true,
            except: true,
            old_values: true,
            checks: true,
            constructors: true,
            destructors: true,
            public_functions: true,
            other_functions: true,
            audit_enabled: false,
            reentrancy_guard: true,
            check_within_assertions: true,
        }
    }
}

impl ContractConfig {
    /// Everything off
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> ContractResult<Self> {
        serde_json::from_str(json).map_err(|e| ContractError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> ContractResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ContractError::Config(e.to_string()))
    }

    /// Set the audit switch (builder pattern)
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    /// Enable or disable one category (builder pattern)
    pub fn with_kind(mut self, kind: ContractKind, enabled: bool) -> Self {
        match kind {
            ContractKind::Precondition => self.preconditions = enabled,
            ContractKind::Postcondition => self.postconditions = enabled,
            ContractKind::Invariant => {
                self.entry_invariants = enabled;
                self.exit_invariants = enabled;
            }
            ContractKind::OldValue => self.old_values = enabled,
            ContractKind::Except => self.except = enabled,
            ContractKind::Check => self.checks = enabled,
        }
        self
    }

    /// Enable or disable checking for one operation kind (builder pattern)
    pub fn with_operation(mut self, kind: OperationKind, enabled: bool) -> Self {
        match kind {
            OperationKind::Constructor => self.constructors = enabled,
            OperationKind::Destructor => self.destructors = enabled,
            OperationKind::PublicInstance | OperationKind::PublicStatic => {
                self.public_functions = enabled
            }
            OperationKind::FreeOrPrivate => self.other_functions = enabled,
        }
        self
    }

    pub fn with_reentrancy_guard(mut self, enabled: bool) -> Self {
        self.reentrancy_guard = enabled;
        self
    }

    pub fn with_checks_within_assertions(mut self, enabled: bool) -> Self {
        self.check_within_assertions = enabled;
        self
    }

    /// Whether contracts of this operation kind are checked at all
    pub fn operation_enabled(&self, kind: OperationKind) -> bool {
        self.enabled
            && match kind {
                OperationKind::Constructor => self.constructors,
                OperationKind::Destructor => self.destructors,
                OperationKind::PublicInstance | OperationKind::PublicStatic => {
                    self.public_functions
                }
                OperationKind::FreeOrPrivate => self.other_functions,
            }
    }

    /// Whether clauses of this category are evaluated
    pub fn kind_enabled(&self, kind: ContractKind) -> bool {
        self.enabled
            && match kind {
                ContractKind::Precondition => self.preconditions,
                ContractKind::Postcondition => self.postconditions,
                ContractKind::Invariant => self.entry_invariants || self.exit_invariants,
                ContractKind::OldValue => self.old_values,
                ContractKind::Except => self.except,
                ContractKind::Check => self.checks,
            }
    }

    /// Whether invariants are evaluated at `moment`
    pub fn invariants_enabled_at(&self, moment: Moment) -> bool {
        self.enabled
            && match moment {
                Moment::Entry => self.entry_invariants,
                Moment::Exit | Moment::FailedExit => self.exit_invariants,
            }
    }

    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::new(self.audit_enabled)
    }
}
