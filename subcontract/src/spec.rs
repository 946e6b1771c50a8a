//! Contract specifications
//!
//! A [`ContractSpec`] collects the clauses of one operation: precondition,
//! old-value capture, postcondition and exception guarantee, in that order.
//! The order is enforced by the type system; each clause method moves the
//! builder to the next stage and only accepts calls that may still follow.
//!
//! ```
//! use subcontract::{ContractError, ContractSpec};
//!
//! let sqrt = ContractSpec::<(), f64, f64>::function("sqrt")
//!     .precondition(|_, x| *x >= 0.0)
//!     .postcondition(|_, x, _, root| (root * root - x).abs() < 1e-9);
//!
//! let root = sqrt.invoke(16.0, |x| Ok::<_, ContractError>(x.sqrt())).unwrap();
//! assert_eq!(root, 4.0);
//! ```
//!
//! Clauses can only be added in order:
//!
//! ```compile_fail
//! use subcontract::ContractSpec;
//!
//! let spec = ContractSpec::<(), i32, i32>::function("f")
//!     .postcondition(|_, _, _, r| *r > 0)
//!     .precondition(|_, x| *x > 0);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{
    contract::{ContractKind, OperationKind},
    errors::{ContractError, ContractResult},
    guard::{self, CheckGuard},
    invariant::{Invariant, InvariantHooks, Static},
    level::AssertionLevel,
    old::OldValue,
    runtime::{self, ContractRuntime, Verdict},
    subcontract::{Armed, ArmedLevel, Level},
};

/// Builder stages
pub mod stage {
    mod sealed {
        pub trait Sealed {}
    }

    /// Nothing declared yet
    #[derive(Debug)]
    pub struct Unspecified;

    #[derive(Debug)]
    pub struct Preconditioned;

    #[derive(Debug)]
    pub struct WithOld;

    #[derive(Debug)]
    pub struct Postconditioned;

    /// Every clause declared
    #[derive(Debug)]
    pub struct Complete;

    impl sealed::Sealed for Unspecified {}
    impl sealed::Sealed for Preconditioned {}
    impl sealed::Sealed for WithOld {}
    impl sealed::Sealed for Postconditioned {}
    impl sealed::Sealed for Complete {}

    pub trait AcceptsPrecondition: sealed::Sealed {}
    pub trait AcceptsOld: sealed::Sealed {}
    pub trait AcceptsPostcondition: sealed::Sealed {}
    pub trait AcceptsExcept: sealed::Sealed {}

    impl AcceptsPrecondition for Unspecified {}

    impl AcceptsOld for Unspecified {}
    impl AcceptsOld for Preconditioned {}

    impl AcceptsPostcondition for Unspecified {}
    impl AcceptsPostcondition for Preconditioned {}
    impl AcceptsPostcondition for WithOld {}

    impl AcceptsExcept for Unspecified {}
    impl AcceptsExcept for Preconditioned {}
    impl AcceptsExcept for WithOld {}
    impl AcceptsExcept for Postconditioned {}
}

use stage::{AcceptsExcept, AcceptsOld, AcceptsPostcondition, AcceptsPrecondition};

type Predicate<'a, S, A> = Box<dyn Fn(&S, &A) -> bool + Send + Sync + 'a>;
type OldFn<'a, S, A, O> = Box<dyn Fn(&S, &A) -> Result<O, String> + Send + Sync + 'a>;
type PostFn<'a, S, A, O, R> = Box<dyn Fn(&S, &A, &OldValue<O>, &R) -> bool + Send + Sync + 'a>;
type ExceptFn<'a, S, A, O> = Box<dyn Fn(&S, &A, &OldValue<O>) -> bool + Send + Sync + 'a>;

struct Clause<F> {
    level: AssertionLevel,
    check: F,
}

/// The contract of one operation
///
/// - `S`: the subject, the object the operation runs on (`()` for free
///   functions, [`Static<T>`] for static functions and constructors)
/// - `A`: the arguments, passed to the body by value
/// - `R`: the result
/// - `O`: the old-value snapshot
/// - `St`: the builder stage
pub struct ContractSpec<'a, S, A, R, O = (), St = stage::Unspecified> {
    kind: OperationKind,
    name: Cow<'static, str>,
    runtime: Option<Arc<ContractRuntime>>,
    precondition: Option<Clause<Predicate<'a, S, A>>>,
    old: Option<Clause<OldFn<'a, S, A, O>>>,
    postcondition: Option<Clause<PostFn<'a, S, A, O, R>>>,
    except: Option<Clause<ExceptFn<'a, S, A, O>>>,
    _stage: PhantomData<fn() -> St>,
}

impl<'a, S, A, R> ContractSpec<'a, S, A, R> {
    fn of_kind(kind: OperationKind, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            name: name.into(),
            runtime: None,
            precondition: None,
            old: None,
            postcondition: None,
            except: None,
            _stage: PhantomData,
        }
    }

    /// A free function, or a private or protected member; never checks
    /// invariants
    pub fn function(name: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(OperationKind::FreeOrPrivate, name)
    }

    /// A public member of `S`; checks invariants of `S` around the body
    pub fn public_function(name: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(OperationKind::PublicInstance, name)
    }
}

impl<'a, S> ContractSpec<'a, S, (), ()> {
    /// A destructor of `S`
    ///
    /// Destructors take no arguments, so the builder starts past the
    /// precondition stage.
    pub fn destructor(
        name: impl Into<Cow<'static, str>>,
    ) -> ContractSpec<'a, S, (), (), (), stage::Preconditioned> {
        Self::of_kind(OperationKind::Destructor, name).into_stage()
    }
}

impl<'a, A, R> ContractSpec<'a, (), A, R> {
    /// A public static function of `T`; checks the static invariants of `T`
    pub fn public_static<T: Invariant>(
        name: impl Into<Cow<'static, str>>,
    ) -> ContractSpec<'a, Static<T>, A, R> {
        ContractSpec::of_kind(OperationKind::PublicStatic, name)
    }
}

impl<'a, A> ContractSpec<'a, (), A, ()> {
    /// A constructor of `T`
    ///
    /// The precondition runs before the object exists, so its subject is
    /// [`Static<T>`]. Postconditions see the constructed object as result.
    pub fn constructor<T: Invariant>(
        name: impl Into<Cow<'static, str>>,
    ) -> ContractSpec<'a, Static<T>, A, T> {
        ContractSpec::of_kind(OperationKind::Constructor, name)
    }
}

impl<'a, S, A, R, O, St> ContractSpec<'a, S, A, R, O, St> {
    fn into_stage<Next>(self) -> ContractSpec<'a, S, A, R, O, Next> {
        ContractSpec {
            kind: self.kind,
            name: self.name,
            runtime: self.runtime,
            precondition: self.precondition,
            old: self.old,
            postcondition: self.postcondition,
            except: self.except,
            _stage: PhantomData,
        }
    }

    /// Check this contract on `runtime` instead of the global one
    pub fn on(mut self, runtime: &Arc<ContractRuntime>) -> Self {
        self.runtime = Some(Arc::clone(runtime));
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_precondition(&self) -> bool {
        self.precondition.is_some()
    }

    pub fn has_old(&self) -> bool {
        self.old.is_some()
    }

    pub fn has_postcondition(&self) -> bool {
        self.postcondition.is_some()
    }

    pub fn has_except(&self) -> bool {
        self.except.is_some()
    }

    fn resolve_runtime(&self) -> Arc<ContractRuntime> {
        match &self.runtime {
            Some(runtime) => Arc::clone(runtime),
            None => runtime::global(),
        }
    }

    fn expect_kind(&self, expected: OperationKind) -> ContractResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ContractError::Usage(format!(
                "'{}' is declared as a {}, not a {}",
                self.name, self.kind, expected
            )))
        }
    }
}

impl<'a, S, A, R, O, St: AcceptsPrecondition> ContractSpec<'a, S, A, R, O, St> {
    pub fn precondition<F>(self, check: F) -> ContractSpec<'a, S, A, R, O, stage::Preconditioned>
    where
        F: Fn(&S, &A) -> bool + Send + Sync + 'a,
    {
        self.precondition_at(AssertionLevel::Default, check)
    }

    pub fn precondition_at<F>(
        self,
        level: AssertionLevel,
        check: F,
    ) -> ContractSpec<'a, S, A, R, O, stage::Preconditioned>
    where
        F: Fn(&S, &A) -> bool + Send + Sync + 'a,
    {
        let mut next = self.into_stage();
        next.precondition = Some(Clause { level, check: Box::new(check) });
        next
    }
}

impl<'a, S, A, R, St: AcceptsOld> ContractSpec<'a, S, A, R, (), St> {
    /// Snapshot state before the body runs
    pub fn old<O, F>(self, capture: F) -> ContractSpec<'a, S, A, R, O, stage::WithOld>
    where
        F: Fn(&S, &A) -> O + Send + Sync + 'a,
    {
        self.old_at(AssertionLevel::Default, capture)
    }

    pub fn old_at<O, F>(
        self,
        level: AssertionLevel,
        capture: F,
    ) -> ContractSpec<'a, S, A, R, O, stage::WithOld>
    where
        F: Fn(&S, &A) -> O + Send + Sync + 'a,
    {
        self.try_old_at(level, move |s: &S, a: &A| Ok::<O, String>(capture(s, a)))
    }

    /// Snapshot state with a capture that may fail; a failure is reported
    /// as an old-value violation
    pub fn try_old<O, E, F>(self, capture: F) -> ContractSpec<'a, S, A, R, O, stage::WithOld>
    where
        F: Fn(&S, &A) -> Result<O, E> + Send + Sync + 'a,
        E: fmt::Display,
    {
        self.try_old_at(AssertionLevel::Default, capture)
    }

    pub fn try_old_at<O, E, F>(
        self,
        level: AssertionLevel,
        capture: F,
    ) -> ContractSpec<'a, S, A, R, O, stage::WithOld>
    where
        F: Fn(&S, &A) -> Result<O, E> + Send + Sync + 'a,
        E: fmt::Display,
    {
        let check: OldFn<'a, S, A, O> =
            Box::new(move |s: &S, a: &A| capture(s, a).map_err(|e| e.to_string()));
        ContractSpec {
            kind: self.kind,
            name: self.name,
            runtime: self.runtime,
            precondition: self.precondition,
            old: Some(Clause { level, check }),
            postcondition: None,
            except: None,
            _stage: PhantomData,
        }
    }
}

impl<'a, S, A, R, O, St: AcceptsPostcondition> ContractSpec<'a, S, A, R, O, St> {
    /// Condition on the result, checked when the body returns `Ok`
    pub fn postcondition<F>(self, check: F) -> ContractSpec<'a, S, A, R, O, stage::Postconditioned>
    where
        F: Fn(&S, &A, &OldValue<O>, &R) -> bool + Send + Sync + 'a,
    {
        self.postcondition_at(AssertionLevel::Default, check)
    }

    pub fn postcondition_at<F>(
        self,
        level: AssertionLevel,
        check: F,
    ) -> ContractSpec<'a, S, A, R, O, stage::Postconditioned>
    where
        F: Fn(&S, &A, &OldValue<O>, &R) -> bool + Send + Sync + 'a,
    {
        let mut next = self.into_stage();
        next.postcondition = Some(Clause { level, check: Box::new(check) });
        next
    }
}

impl<'a, S, A, R, O, St: AcceptsExcept> ContractSpec<'a, S, A, R, O, St> {
    /// Guarantee checked when the body returns `Err` or panics
    pub fn except<F>(self, check: F) -> ContractSpec<'a, S, A, R, O, stage::Complete>
    where
        F: Fn(&S, &A, &OldValue<O>) -> bool + Send + Sync + 'a,
    {
        self.except_at(AssertionLevel::Default, check)
    }

    pub fn except_at<F>(
        self,
        level: AssertionLevel,
        check: F,
    ) -> ContractSpec<'a, S, A, R, O, stage::Complete>
    where
        F: Fn(&S, &A, &OldValue<O>) -> bool + Send + Sync + 'a,
    {
        let mut next = self.into_stage();
        next.except = Some(Clause { level, check: Box::new(check) });
        next
    }
}

impl<'a, S: Invariant, A, R, O, St> ContractSpec<'a, S, A, R, O, St> {
    /// Run `body` on `subject` under this contract
    ///
    /// Contract violations that a handler propagates come back as `E`. When
    /// the body fails and the exception guarantee is then violated too, the
    /// violation replaces the body's error.
    pub fn call<E, F>(&self, subject: &mut S, args: A, body: F) -> Result<R, E>
    where
        F: FnOnce(&mut S, &mut A) -> Result<R, E>,
        E: From<ContractError>,
    {
        let runtime = self.resolve_runtime();
        let guard = CheckGuard::new(
            &runtime,
            &self.name,
            self.kind,
            vec![self as &dyn Level<S, A, R>],
            InvariantHooks::for_subject(),
        );
        guard::drive(guard, subject, args, body)
    }

    /// Run a `&self` operation on `subject` under this contract
    pub fn call_ref<E, F>(&self, subject: &S, args: A, body: F) -> Result<R, E>
    where
        F: FnOnce(&S, &mut A) -> Result<R, E>,
        E: From<ContractError>,
    {
        let runtime = self.resolve_runtime();
        let guard = CheckGuard::new(
            &runtime,
            &self.name,
            self.kind,
            vec![self as &dyn Level<S, A, R>],
            InvariantHooks::for_subject(),
        );
        guard::drive(guard, &mut &*subject, args, |subject, args| body(*subject, args))
    }
}

impl<'a, A, R, O, St> ContractSpec<'a, (), A, R, O, St> {
    /// Run a free function under this contract
    pub fn invoke<E, F>(&self, args: A, body: F) -> Result<R, E>
    where
        F: FnOnce(&mut A) -> Result<R, E>,
        E: From<ContractError>,
    {
        self.call(&mut (), args, |_, args| body(args))
    }
}

impl<'a, S: Invariant, O, St> ContractSpec<'a, S, (), (), O, St> {
    /// Run a destructor body under this contract
    pub fn destruct<F: FnOnce(&mut S)>(&self, subject: &mut S, body: F) -> ContractResult<()> {
        self.expect_kind(OperationKind::Destructor)?;
        self.call(subject, (), |subject, _| {
            body(subject);
            Ok(())
        })
    }
}

impl<'a, T: Invariant, A, R, O, St> ContractSpec<'a, Static<T>, A, R, O, St> {
    /// Run a public static function of `T` under this contract
    pub fn call_static<E, F>(&self, args: A, body: F) -> Result<R, E>
    where
        F: FnOnce(&mut A) -> Result<R, E>,
        E: From<ContractError>,
    {
        self.expect_kind(OperationKind::PublicStatic)?;
        let runtime = self.resolve_runtime();
        let guard = CheckGuard::new(
            &runtime,
            &self.name,
            self.kind,
            vec![self as &dyn Level<Static<T>, A, R>],
            InvariantHooks::for_type::<T>(),
        );
        guard::drive(guard, &mut Static::new(), args, |_, args| body(args))
    }
}

impl<'a, T: Invariant, A, O, St> ContractSpec<'a, Static<T>, A, T, O, St> {
    /// Build a `T` under this contract
    ///
    /// The invariants of the new object are checked once `body` returns it.
    /// If `body` fails only the static invariants are checked.
    pub fn construct<E, F>(&self, args: A, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut A) -> Result<T, E>,
        E: From<ContractError>,
    {
        self.expect_kind(OperationKind::Constructor)?;
        let runtime = self.resolve_runtime();
        let guard = CheckGuard::new(
            &runtime,
            &self.name,
            self.kind,
            vec![self as &dyn Level<Static<T>, A, T>],
            InvariantHooks::for_constructed(),
        );
        guard::drive(guard, &mut Static::new(), args, |_, args| body(args))
    }
}

impl<'a, S, A, R, O, St> Level<S, A, R> for ContractSpec<'a, S, A, R, O, St> {
    fn class(&self) -> Option<&str> {
        None
    }

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn precondition(&self, runtime: &ContractRuntime, subject: &S, args: &A) -> Verdict {
        match &self.precondition {
            Some(clause) => runtime.evaluate(ContractKind::Precondition, clause.level, || {
                (clause.check)(subject, args)
            }),
            None => Verdict::Absent,
        }
    }

    fn arm<'l>(&'l self, runtime: &ContractRuntime, subject: &S, args: &A) -> Armed<'l, S, A, R> {
        let mut old_failure = None;
        let old = match &self.old {
            Some(clause) => match runtime.capture(clause.level, || (clause.check)(subject, args)) {
                Some(Ok(value)) => OldValue::from_value(value),
                Some(Err(message)) => {
                    old_failure = Some(message);
                    OldValue::empty()
                }
                None => OldValue::empty(),
            },
            None => OldValue::empty(),
        };
        Armed { clauses: Box::new(ArmedSpec { spec: self, old }), old_failure }
    }
}

/// A spec together with the old value captured for one call
struct ArmedSpec<'l, 'a, S, A, R, O, St> {
    spec: &'l ContractSpec<'a, S, A, R, O, St>,
    old: OldValue<O>,
}

impl<S, A, R, O, St> ArmedLevel<S, A, R> for ArmedSpec<'_, '_, S, A, R, O, St> {
    fn postcondition(&self, runtime: &ContractRuntime, subject: &S, args: &A, result: &R) -> Verdict {
        match &self.spec.postcondition {
            Some(clause) => runtime.evaluate(ContractKind::Postcondition, clause.level, || {
                (clause.check)(subject, args, &self.old, result)
            }),
            None => Verdict::Absent,
        }
    }

    fn except(&self, runtime: &ContractRuntime, subject: &S, args: &A) -> Verdict {
        match &self.spec.except {
            Some(clause) => runtime.evaluate(ContractKind::Except, clause.level, || {
                (clause.check)(subject, args, &self.old)
            }),
            None => Verdict::Absent,
        }
    }
}

impl<'a, S, A, R, O, St> fmt::Debug for ContractSpec<'a, S, A, R, O, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = |clause: Option<AssertionLevel>| clause.map(|l| l.to_string());
        f.debug_struct("ContractSpec")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("precondition", &level(self.precondition.as_ref().map(|c| c.level)))
            .field("old", &level(self.old.as_ref().map(|c| c.level)))
            .field("postcondition", &level(self.postcondition.as_ref().map(|c| c.level)))
            .field("except", &level(self.except.as_ref().map(|c| c.level)))
            .finish()
    }
}

#[cfg(test)]
#[path = "spec/spec_tests.rs"]
mod tests;
