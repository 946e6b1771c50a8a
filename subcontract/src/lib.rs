//! Runtime contract checking for Rust
//!
//! This crate checks design-by-contract clauses around operation calls:
//! preconditions, postconditions with old values, exception guarantees and
//! class invariants, with subcontracting across override chains.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use subcontract::{handler::FailureHandlers, ContractConfig, ContractError, ContractRuntime,
//!                   ContractSpec, Invariant};
//!
//! struct Stack {
//!     items: Vec<i32>,
//!     capacity: usize,
//! }
//!
//! impl Invariant for Stack {
//!     type Base = ();
//!
//!     fn invariant(&self) -> bool {
//!         self.items.len() <= self.capacity
//!     }
//! }
//!
//! let runtime = Arc::new(ContractRuntime::with_handlers(
//!     ContractConfig::default(),
//!     FailureHandlers::propagating(),
//! ));
//!
//! let push = ContractSpec::<Stack, i32, ()>::public_function("Stack::push")
//!     .precondition(|s, _| s.items.len() < s.capacity)
//!     .old(|s, _| s.items.len())
//!     .postcondition(|s, _, old, _| old.holds(|n| s.items.len() == n + 1))
//!     .on(&runtime);
//!
//! let mut stack = Stack { items: Vec::new(), capacity: 1 };
//! push.call(&mut stack, 7, |s, x| {
//!     s.items.push(*x);
//!     Ok::<_, ContractError>(())
//! })
//! .unwrap();
//!
//! let err = push.call(&mut stack, 8, |s, x| {
//!     s.items.push(*x);
//!     Ok::<_, ContractError>(())
//! });
//! assert!(err.is_err());
//! assert_eq!(stack.items, vec![7]);
//! ```
//!
//! # Failure handling
//!
//! A violation is handed to the handler registered for its category. By
//! default every category terminates the process; see [`handler`] for the
//! alternatives.

pub mod config;
pub mod contract;
pub mod errors;
mod guard;
pub mod handler;
pub mod invariant;
pub mod level;
pub mod old;
pub mod reentrancy;
pub mod runtime;
pub mod spec;
pub mod subcontract;

pub use config::ContractConfig;
pub use contract::{ContractKind, FailureContext, Moment, OperationKind};
pub use errors::{ContractError, ContractResult, ContractViolation};
pub use handler::{FailureHandler, FailureHandlers, Resolution};
pub use invariant::{Invariant, InvariantChecker, Static};
pub use level::{AssertionLevel, LevelFilter};
pub use old::{OldCopyable, OldValue};
pub use runtime::{ContractRuntime, StatsSnapshot, Verdict};
pub use spec::ContractSpec;
pub use subcontract::{OverrideBinding, OverrideBindingBuilder};

/// Ad-hoc check inside an operation body
///
/// Evaluates to a [`ContractResult`]; the message defaults to the condition's
/// source text.
///
/// ```
/// use subcontract::{check, handler::FailureHandlers, ContractConfig, ContractRuntime};
///
/// let runtime = ContractRuntime::with_handlers(
///     ContractConfig::default(),
///     FailureHandlers::propagating(),
/// );
/// let total = 3;
/// assert!(check!(runtime, total > 0).is_ok());
/// assert!(check!(runtime, total > 5, "total too small: {}", total).is_err());
/// ```
#[macro_export]
macro_rules! check {
    ($runtime:expr, $cond:expr) => {
        $runtime.check_at($crate::AssertionLevel::Default, || $cond, stringify!($cond))
    };
    ($runtime:expr, $cond:expr, $($msg:tt)+) => {
        $runtime.check_at($crate::AssertionLevel::Default, || $cond, format!($($msg)+))
    };
}

/// Audit-level [`check!`]; the condition runs only when audit checking is on
#[macro_export]
macro_rules! check_audit {
    ($runtime:expr, $cond:expr) => {
        $runtime.check_at($crate::AssertionLevel::Audit, || $cond, stringify!($cond))
    };
    ($runtime:expr, $cond:expr, $($msg:tt)+) => {
        $runtime.check_at($crate::AssertionLevel::Audit, || $cond, format!($($msg)+))
    };
}
