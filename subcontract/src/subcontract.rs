//! Subcontracting for overridden operations
//!
//! An operation overridden along a chain of types carries one contract per
//! level of the chain. The levels are combined when the override is called:
//! preconditions are OR'ed (one level accepting is enough), postconditions
//! and exception guarantees are AND'ed. Levels are evaluated most-base
//! first.
//!
//! Levels are collected once into an [`OverrideBinding`], which the runtime
//! caches per subject type and signature:
//!
//! ```
//! use subcontract::{ContractConfig, ContractError, ContractRuntime, ContractSpec, Invariant};
//!
//! struct Shape { sides: u32 }
//! struct Square { shape: Shape }
//!
//! impl Invariant for Shape { type Base = (); }
//! impl Invariant for Square {
//!     type Base = Shape;
//!     fn base(&self) -> Option<&Shape> { Some(&self.shape) }
//! }
//!
//! fn shape_of(square: &Square) -> &Shape {
//!     &square.shape
//! }
//!
//! let runtime = ContractRuntime::new(ContractConfig::default());
//! let binding = runtime
//!     .override_binding::<Square, u32, u32, _>("scale", |b| {
//!         b.inherit(
//!             "Shape",
//!             shape_of,
//!             ContractSpec::public_function("Shape::scale").precondition(|_: &Shape, k: &u32| *k > 0),
//!         )
//!         .declare(
//!             "Square",
//!             ContractSpec::public_function("Square::scale").precondition(|_: &Square, k: &u32| *k < 10),
//!         )
//!     })
//!     .unwrap();
//!
//! let mut square = Square { shape: Shape { sides: 4 } };
//! let sides = binding
//!     .call(&runtime, &mut square, 0, |sq, _| Ok::<_, ContractError>(sq.shape.sides))
//!     .unwrap();
//! assert_eq!(sides, 4);
//! ```

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    contract::OperationKind,
    errors::{ContractError, ContractResult},
    guard::{self, CheckGuard},
    invariant::{Invariant, InvariantHooks},
    runtime::{ContractRuntime, Verdict},
    spec::ContractSpec,
};

/// One level of a contract chain
pub(crate) trait Level<S, A, R> {
    /// Class that declared this level, for violation reports
    fn class(&self) -> Option<&str>;

    fn kind(&self) -> OperationKind;

    fn precondition(&self, runtime: &ContractRuntime, subject: &S, args: &A) -> Verdict;

    /// Capture old values and return the clauses to check after the body
    fn arm<'l>(&'l self, runtime: &ContractRuntime, subject: &S, args: &A) -> Armed<'l, S, A, R>;
}

/// Exit clauses of one level, bound to the old value of the current call
pub(crate) trait ArmedLevel<S, A, R> {
    fn postcondition(&self, runtime: &ContractRuntime, subject: &S, args: &A, result: &R) -> Verdict;

    fn except(&self, runtime: &ContractRuntime, subject: &S, args: &A) -> Verdict;
}

pub(crate) struct Armed<'l, S, A, R> {
    pub(crate) clauses: Box<dyn ArmedLevel<S, A, R> + 'l>,

    /// Message of a failed old-value capture
    pub(crate) old_failure: Option<String>,
}

/// Why a combined clause failed
#[derive(Debug)]
pub(crate) struct LevelFailure {
    pub(crate) class: Option<String>,
    pub(crate) message: String,
}

/// OR the preconditions of `levels`, stopping at the first that accepts
///
/// A level without a precondition, or whose precondition is filtered out,
/// accepts.
pub(crate) fn precondition_any<S, A, R>(
    runtime: &ContractRuntime,
    levels: &[&dyn Level<S, A, R>],
    subject: &S,
    args: &A,
) -> Option<LevelFailure> {
    let mut rejected = Vec::new();
    for level in levels {
        if level.precondition(runtime, subject, args).is_satisfied() {
            trace!(class = level.class(), "precondition accepted");
            return None;
        }
        rejected.push(level.class());
    }
    let class = rejected.last().copied().flatten().map(str::to_string);
    let named: Vec<&str> = rejected.into_iter().flatten().collect();
    let message = if named.len() > 1 {
        format!("precondition rejected by every level ({})", named.join(", "))
    } else {
        "precondition failed".to_string()
    };
    Some(LevelFailure { class, message })
}

/// A level declared on a base type, reached through a projection
struct Projected<S, B, L> {
    class: Cow<'static, str>,
    project: fn(&S) -> &B,
    level: L,
}

impl<S, B, A, R, L> Level<S, A, R> for Projected<S, B, L>
where
    S: 'static,
    B: 'static,
    A: 'static,
    R: 'static,
    L: Level<B, A, R>,
{
    fn class(&self) -> Option<&str> {
        Some(&self.class)
    }

    fn kind(&self) -> OperationKind {
        self.level.kind()
    }

    fn precondition(&self, runtime: &ContractRuntime, subject: &S, args: &A) -> Verdict {
        self.level.precondition(runtime, (self.project)(subject), args)
    }

    fn arm<'l>(&'l self, runtime: &ContractRuntime, subject: &S, args: &A) -> Armed<'l, S, A, R> {
        let inner = self.level.arm(runtime, (self.project)(subject), args);
        Armed {
            clauses: Box::new(ProjectedArmed { project: self.project, inner: inner.clauses }),
            old_failure: inner.old_failure,
        }
    }
}

struct ProjectedArmed<'l, S, B, A, R> {
    project: fn(&S) -> &B,
    inner: Box<dyn ArmedLevel<B, A, R> + 'l>,
}

impl<S, B, A, R> ArmedLevel<S, A, R> for ProjectedArmed<'_, S, B, A, R> {
    fn postcondition(&self, runtime: &ContractRuntime, subject: &S, args: &A, result: &R) -> Verdict {
        self.inner.postcondition(runtime, (self.project)(subject), args, result)
    }

    fn except(&self, runtime: &ContractRuntime, subject: &S, args: &A) -> Verdict {
        self.inner.except(runtime, (self.project)(subject), args)
    }
}

fn identity<T>(value: &T) -> &T {
    value
}

type BoxedLevel<S, A, R> = Box<dyn Level<S, A, R> + Send + Sync>;

/// The combined contract of an overridden operation
pub struct OverrideBinding<S, A, R> {
    signature: Cow<'static, str>,
    levels: Vec<BoxedLevel<S, A, R>>,
}

impl<S: 'static, A: 'static, R: 'static> OverrideBinding<S, A, R> {
    pub fn builder(signature: impl Into<Cow<'static, str>>) -> OverrideBindingBuilder<S, A, R> {
        OverrideBindingBuilder { signature: signature.into(), levels: Vec::new() }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Number of levels in the chain
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Declaring classes, most-base first
    pub fn classes(&self) -> Vec<&str> {
        self.levels.iter().filter_map(|level| level.class()).collect()
    }
}

impl<S: Invariant, A: 'static, R: 'static> OverrideBinding<S, A, R> {
    /// Run `body` on `subject` under the combined contract
    pub fn call<E, F>(&self, runtime: &ContractRuntime, subject: &mut S, args: A, body: F) -> Result<R, E>
    where
        F: FnOnce(&mut S, &mut A) -> Result<R, E>,
        E: From<ContractError>,
    {
        let guard = self.guard(runtime);
        guard::drive(guard, subject, args, body)
    }

    /// Run a `&self` override on `subject` under the combined contract
    pub fn call_ref<E, F>(&self, runtime: &ContractRuntime, subject: &S, args: A, body: F) -> Result<R, E>
    where
        F: FnOnce(&S, &mut A) -> Result<R, E>,
        E: From<ContractError>,
    {
        let guard = self.guard(runtime);
        guard::drive(guard, &mut &*subject, args, |subject, args| body(*subject, args))
    }

    fn guard<'g>(&'g self, runtime: &'g ContractRuntime) -> CheckGuard<'g, S, A, R> {
        let levels = self.levels.iter().map(|level| &**level as &dyn Level<S, A, R>).collect();
        CheckGuard::new(
            runtime,
            &self.signature,
            OperationKind::PublicInstance,
            levels,
            InvariantHooks::for_subject(),
        )
    }
}

impl<S, A, R> fmt::Debug for OverrideBinding<S, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classes: Vec<&str> = self.levels.iter().filter_map(|level| level.class()).collect();
        f.debug_struct("OverrideBinding")
            .field("signature", &self.signature)
            .field("classes", &classes)
            .finish()
    }
}

/// Collects the levels of an override chain, most-base first
pub struct OverrideBindingBuilder<S, A, R> {
    signature: Cow<'static, str>,
    levels: Vec<BoxedLevel<S, A, R>>,
}

impl<S: 'static, A: 'static, R: 'static> OverrideBindingBuilder<S, A, R> {
    /// Add the contract declared by base type `B`, reached through `project`
    pub fn inherit<B, O, St>(
        mut self,
        class: impl Into<Cow<'static, str>>,
        project: fn(&S) -> &B,
        spec: ContractSpec<'static, B, A, R, O, St>,
    ) -> Self
    where
        B: 'static,
        O: 'static,
        St: 'static,
    {
        self.levels.push(Box::new(Projected { class: class.into(), project, level: spec }));
        self
    }

    /// Add the contract declared by `S` itself
    pub fn declare<O, St>(
        self,
        class: impl Into<Cow<'static, str>>,
        spec: ContractSpec<'static, S, A, R, O, St>,
    ) -> Self
    where
        O: 'static,
        St: 'static,
    {
        self.inherit(class, identity::<S>, spec)
    }

    pub fn build(self) -> ContractResult<OverrideBinding<S, A, R>> {
        if self.levels.is_empty() {
            return Err(ContractError::Usage(format!(
                "override binding '{}' has no levels",
                self.signature
            )));
        }
        for level in &self.levels {
            if level.kind() != OperationKind::PublicInstance {
                return Err(ContractError::Usage(format!(
                    "level '{}' of '{}' is a {}; only public functions can be overridden",
                    level.class().unwrap_or("?"),
                    self.signature,
                    level.kind()
                )));
            }
        }
        Ok(OverrideBinding { signature: self.signature, levels: self.levels })
    }
}

/// Registry key: subject, argument and result types plus the signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BindingKey {
    subject: TypeId,
    args: TypeId,
    result: TypeId,
    signature: Cow<'static, str>,
}

impl BindingKey {
    fn of<S: 'static, A: 'static, R: 'static>(signature: Cow<'static, str>) -> Self {
        Self {
            subject: TypeId::of::<S>(),
            args: TypeId::of::<A>(),
            result: TypeId::of::<R>(),
            signature,
        }
    }
}

fn downcast<S, A, R>(
    stored: Arc<dyn Any + Send + Sync>,
    signature: &str,
) -> ContractResult<Arc<OverrideBinding<S, A, R>>>
where
    S: 'static,
    A: 'static,
    R: 'static,
{
    stored.downcast::<OverrideBinding<S, A, R>>().map_err(|_| {
        ContractError::Usage(format!("binding '{signature}' is registered with other types"))
    })
}

impl ContractRuntime {
    /// The override binding for `signature` on `S`, built on first use
    ///
    /// `build` runs only when no binding exists yet. Two threads racing on
    /// the first call may both build; the first to register wins.
    pub fn override_binding<S, A, R, F>(
        &self,
        signature: impl Into<Cow<'static, str>>,
        build: F,
    ) -> ContractResult<Arc<OverrideBinding<S, A, R>>>
    where
        S: Invariant,
        A: 'static,
        R: 'static,
        F: FnOnce(OverrideBindingBuilder<S, A, R>) -> OverrideBindingBuilder<S, A, R>,
    {
        let signature = signature.into();
        let key = BindingKey::of::<S, A, R>(signature.clone());
        let existing = self.bindings.read().get(&key).cloned();
        if let Some(stored) = existing {
            return downcast(stored, &signature);
        }

        let binding = build(OverrideBinding::builder(signature.clone())).build()?;
        debug!(
            signature = %signature,
            class = S::class_name(),
            depth = binding.depth(),
            "override binding built"
        );
        let built: Arc<dyn Any + Send + Sync> = Arc::new(binding);
        let stored = Arc::clone(self.bindings.write().entry(key).or_insert(built));
        downcast(stored, &signature)
    }
}

#[cfg(test)]
#[path = "subcontract/subcontract_tests.rs"]
mod tests;
