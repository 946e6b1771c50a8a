//! Core classification types shared by every part of the runtime
//!
//! # Contract Semantics
//!
//! ## Preconditions
//! - Evaluated when a checked operation is entered, after entry invariants
//! - Caller's responsibility; a failure blames the calling code
//! - For overrides, the preconditions of the whole chain are OR'ed
//!
//! ## Postconditions
//! - Evaluated when the body returns `Ok`, after exit invariants
//! - Receive the result and the old values captured before the body ran
//! - For overrides, the postconditions of the whole chain are AND'ed
//!
//! ## Exception guarantees (`except`)
//! - Evaluated instead of postconditions when the body returns `Err` or panics
//! - AND'ed across an override chain, like postconditions
//!
//! ## Invariants
//! - Instance invariants: checked around public instance operations, after
//!   constructors and before destructors
//! - Static invariants: checked with every instance invariant and around
//!   public static operations
//! - AND'ed along the base chain of the checked type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a contract clause, and of the violation it raises
///
/// Failure handlers are registered per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    /// Precondition, checked at operation entry.
    Precondition,

    /// Postcondition, checked at normal operation exit.
    Postcondition,

    /// Class invariant, instance or static.
    Invariant,

    /// Failure while capturing an old value.
    OldValue,

    /// Exception guarantee, checked when the body fails.
    Except,

    /// Ad-hoc check placed inside an operation body.
    Check,
}

impl ContractKind {
    /// Every category, in handler-table order
    pub const ALL: [ContractKind; 6] = [
        ContractKind::Precondition,
        ContractKind::Postcondition,
        ContractKind::Invariant,
        ContractKind::OldValue,
        ContractKind::Except,
        ContractKind::Check,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            ContractKind::Precondition => 0,
            ContractKind::Postcondition => 1,
            ContractKind::Invariant => 2,
            ContractKind::OldValue => 3,
            ContractKind::Except => 4,
            ContractKind::Check => 5,
        }
    }

    /// Lowercase name used in logs and stats
    pub fn name(self) -> &'static str {
        match self {
            ContractKind::Precondition => "precondition",
            ContractKind::Postcondition => "postcondition",
            ContractKind::Invariant => "invariant",
            ContractKind::OldValue => "old value",
            ContractKind::Except => "except",
            ContractKind::Check => "check",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a violation was detected
///
/// Handlers receive this through the violation so they can avoid unwinding
/// out of a destructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureContext {
    FromConstructor,
    FromDestructor,
    FromFunction,
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureContext::FromConstructor => "constructor",
            FailureContext::FromDestructor => "destructor",
            FailureContext::FromFunction => "function",
        })
    }
}

/// The kind of operation a contract is attached to
///
/// The kind decides which invariants run and at which point of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Free function, or a private/protected member. Never checks invariants.
    FreeOrPrivate,

    /// Constructor. Invariants of the new object on exit only.
    Constructor,

    /// Destructor. Invariants on entry only.
    Destructor,

    /// Public instance operation, virtual or not.
    PublicInstance,

    /// Public static operation. Static invariants only.
    PublicStatic,
}

/// The point of a call at which invariants are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Moment {
    Entry,
    Exit,
    FailedExit,
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Moment::Entry => "entry",
            Moment::Exit => "exit",
            Moment::FailedExit => "failed exit",
        })
    }
}

/// Which invariants an operation kind requires at one moment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvariantDemand {
    pub statics: bool,
    pub instance: bool,
}

impl InvariantDemand {
    const NONE: Self = Self { statics: false, instance: false };
    const STATIC: Self = Self { statics: true, instance: false };
    const BOTH: Self = Self { statics: true, instance: true };

    pub fn is_empty(self) -> bool {
        !self.statics && !self.instance
    }
}

impl OperationKind {
    /// Context tag reported with violations raised by this kind
    pub fn context(self) -> FailureContext {
        match self {
            OperationKind::Constructor => FailureContext::FromConstructor,
            OperationKind::Destructor => FailureContext::FromDestructor,
            _ => FailureContext::FromFunction,
        }
    }

    /// Invariants this kind checks at `moment`
    ///
    /// A constructor that fails never produced an object, so only the
    /// static invariant is left to check. A destructor that fails leaves
    /// the object alive, so its invariants are checked again.
    pub fn invariants_at(self, moment: Moment) -> InvariantDemand {
        use OperationKind::*;
        match (self, moment) {
            (FreeOrPrivate, _) => InvariantDemand::NONE,
            (Constructor, Moment::Entry) => InvariantDemand::NONE,
            (Constructor, Moment::Exit) => InvariantDemand::BOTH,
            (Constructor, Moment::FailedExit) => InvariantDemand::STATIC,
            (Destructor, Moment::Exit) => InvariantDemand::NONE,
            (Destructor, _) => InvariantDemand::BOTH,
            (PublicInstance, _) => InvariantDemand::BOTH,
            (PublicStatic, _) => InvariantDemand::STATIC,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::FreeOrPrivate => "function",
            OperationKind::Constructor => "constructor",
            OperationKind::Destructor => "destructor",
            OperationKind::PublicInstance => "public function",
            OperationKind::PublicStatic => "public static function",
        })
    }
}
