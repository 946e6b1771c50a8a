//! Class invariants
//!
//! A type states its invariants by implementing [`Invariant`]. Inheritance
//! is modelled by composition: a derived type names its base type and hands
//! out a reference to the base part, and the checker walks that chain from
//! the most-base class down to the checked type, AND'ing every level.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use crate::{
    contract::{ContractKind, FailureContext, Moment},
    errors::{ContractResult, ContractViolation},
    level::AssertionLevel,
    reentrancy::ReentrancyKey,
    runtime::{ContractRuntime, Verdict},
};

/// Invariants of a type
///
/// Every method has a default, so a type without invariants only names its
/// base:
///
/// ```
/// use subcontract::Invariant;
///
/// struct Plain;
/// impl Invariant for Plain {
///     type Base = ();
/// }
/// ```
///
/// Invariants take `&self` and must not mutate the object observably.
pub trait Invariant: Sized + 'static {
    /// The base type, or `()` for a root type
    type Base: Invariant;

    /// Level of both invariants of this type
    const LEVEL: AssertionLevel = AssertionLevel::Default;

    /// Name used in violation reports
    fn class_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    fn invariant(&self) -> bool {
        true
    }

    fn static_invariant() -> bool {
        true
    }

    /// The base part of this object; must be `Some` whenever `Base` is not `()`
    fn base(&self) -> Option<&Self::Base> {
        None
    }
}

impl Invariant for () {
    type Base = ();

    fn class_name() -> &'static str {
        "()"
    }
}

/// Type identity of `T`, the subject of static functions and constructors
pub struct Static<T>(PhantomData<fn() -> T>);

impl<T> Static<T> {
    pub fn new() -> Self {
        Static(PhantomData)
    }
}

impl<T> Default for Static<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Static<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Static<T> {}

impl<T> fmt::Debug for Static<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Static<{}>", std::any::type_name::<T>())
    }
}

/// Where an invariant check happens
#[derive(Debug, Clone, Copy)]
pub struct Site<'s> {
    pub operation: &'s str,
    pub context: FailureContext,
    pub moment: Moment,

    /// A panic from the operation body is in flight
    pub unwinding: bool,
}

/// Evaluates instance and static invariants for one call site
pub struct InvariantChecker<'r> {
    runtime: &'r ContractRuntime,
    site: Site<'r>,
}

fn is_root<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<()>()
}

impl<'r> InvariantChecker<'r> {
    pub fn new(runtime: &'r ContractRuntime, site: Site<'r>) -> Self {
        Self { runtime, site }
    }

    /// Check the instance invariants of `object` and of all its bases
    ///
    /// Skipped when this thread is already checking `object`.
    pub fn check_instance<T: Invariant>(&self, object: &T) -> ContractResult<()> {
        if is_root::<T>() {
            return Ok(());
        }
        let Some(_token) = self.runtime.enter(ReentrancyKey::object(object)) else {
            trace!(class = T::class_name(), "instance invariant already in progress");
            return Ok(());
        };
        self.instance_chain(object)
    }

    /// Check the static invariants of `T` and of all its bases
    pub fn check_static<T: Invariant>(&self) -> ContractResult<()> {
        if is_root::<T>() {
            return Ok(());
        }
        let Some(_token) = self.runtime.enter(ReentrancyKey::static_of::<T>()) else {
            trace!(class = T::class_name(), "static invariant already in progress");
            return Ok(());
        };
        self.static_chain::<T>()
    }

    fn instance_chain<T: Invariant>(&self, object: &T) -> ContractResult<()> {
        if is_root::<T>() {
            return Ok(());
        }
        if let Some(base) = object.base() {
            self.instance_chain(base)?;
        }
        match self.runtime.evaluate(ContractKind::Invariant, T::LEVEL, || object.invariant()) {
            Verdict::Failed => self.report::<T>("instance"),
            _ => Ok(()),
        }
    }

    fn static_chain<T: Invariant>(&self) -> ContractResult<()> {
        if is_root::<T>() {
            return Ok(());
        }
        self.static_chain::<T::Base>()?;
        match self.runtime.evaluate(ContractKind::Invariant, T::LEVEL, T::static_invariant) {
            Verdict::Failed => self.report::<T>("static"),
            _ => Ok(()),
        }
    }

    fn report<T: Invariant>(&self, which: &str) -> ContractResult<()> {
        let violation = ContractViolation::new(
            ContractKind::Invariant,
            Some(self.site.operation.to_string()),
            format!("{} invariant failed at {}", which, self.site.moment),
            self.site.context,
        )
        .with_class(T::class_name());
        self.runtime.report(violation, self.site.unwinding)
    }
}

/// Invariant checks a guard performs, resolved per subject type
pub(crate) struct InvariantHooks<S, R> {
    statics: Option<fn(&InvariantChecker<'_>) -> ContractResult<()>>,
    subject: Option<fn(&InvariantChecker<'_>, &S) -> ContractResult<()>>,
    result: Option<fn(&InvariantChecker<'_>, &R) -> ContractResult<()>>,
}

fn statics_of<T: Invariant>(checker: &InvariantChecker<'_>) -> ContractResult<()> {
    checker.check_static::<T>()
}

fn instance_of<T: Invariant>(checker: &InvariantChecker<'_>, object: &T) -> ContractResult<()> {
    checker.check_instance(object)
}

impl<S, R> InvariantHooks<S, R> {
    /// Invariants of the subject object itself
    pub(crate) fn for_subject() -> Self
    where
        S: Invariant,
    {
        Self { statics: Some(statics_of::<S>), subject: Some(instance_of::<S>), result: None }
    }

    /// Static invariants of `T` only
    pub(crate) fn for_type<T: Invariant>() -> Self {
        Self { statics: Some(statics_of::<T>), subject: None, result: None }
    }

    /// Invariants of the object a constructor returns
    pub(crate) fn for_constructed() -> Self
    where
        R: Invariant,
    {
        Self { statics: Some(statics_of::<R>), subject: None, result: Some(instance_of::<R>) }
    }

    pub(crate) fn check_statics(&self, checker: &InvariantChecker<'_>) -> ContractResult<()> {
        match self.statics {
            Some(check) => check(checker),
            None => Ok(()),
        }
    }

    pub(crate) fn check_instance(
        &self,
        checker: &InvariantChecker<'_>,
        subject: &S,
        result: Option<&R>,
    ) -> ContractResult<()> {
        if let Some(check) = self.subject {
            check(checker, subject)?;
        }
        if let (Some(check), Some(result)) = (self.result, result) {
            check(checker, result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "invariant/invariant_tests.rs"]
mod tests;
