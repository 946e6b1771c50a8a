//! Reentrancy guard for contract checking
//!
//! While a thread evaluates the invariant of an object, a public operation
//! called on that same object from inside the predicate must not check the
//! invariant again. The runtime keeps the set of `(thread, scope)` pairs
//! currently being checked; [`ContractRuntime::enter`] claims a pair and the
//! returned token releases it on drop.

use std::any::TypeId;
use std::thread::{self, ThreadId};

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::runtime::ContractRuntime;

/// What is being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Instance invariants of the object of this type at this address
    Object(usize, TypeId),

    /// Static invariants of a type
    Type(TypeId),

    /// Any assertion
    Assertion,
}

/// A scope claimed by one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReentrancyKey {
    thread: ThreadId,
    scope: Scope,
}

impl ReentrancyKey {
    pub fn new(scope: Scope) -> Self {
        Self { thread: thread::current().id(), scope }
    }

    /// Key for the instance invariants of `object`
    ///
    /// Keyed by address and type: a field at offset zero, or a zero-sized
    /// value, shares its address with another object but not its identity.
    pub fn object<T: ?Sized + 'static>(object: &T) -> Self {
        let address = object as *const T as *const () as usize;
        Self::new(Scope::Object(address, TypeId::of::<T>()))
    }

    /// Key for the static invariants of `T`
    pub fn static_of<T: 'static>() -> Self {
        Self::new(Scope::Type(TypeId::of::<T>()))
    }

    pub fn assertion() -> Self {
        Self::new(Scope::Assertion)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

/// Set of scopes currently being checked, across all threads
#[derive(Debug, Default)]
pub struct ReentrancyState {
    in_progress: FxHashSet<ReentrancyKey>,
}

impl ReentrancyState {
    /// Claim `key`; false if it is already claimed
    pub fn try_enter(&mut self, key: ReentrancyKey) -> bool {
        self.in_progress.insert(key)
    }

    pub fn leave(&mut self, key: ReentrancyKey) -> bool {
        self.in_progress.remove(&key)
    }

    pub fn is_active(&self, key: &ReentrancyKey) -> bool {
        self.in_progress.contains(key)
    }

    pub fn len(&self) -> usize {
        self.in_progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }
}

/// Claim on a scope, released on drop
#[must_use = "the scope is released as soon as the token is dropped"]
pub struct ReentrancyToken<'r> {
    runtime: &'r ContractRuntime,
    key: Option<ReentrancyKey>,
}

impl ReentrancyToken<'_> {
    /// Whether this token holds a claim (false when tracking is disabled)
    pub fn is_tracked(&self) -> bool {
        self.key.is_some()
    }
}

impl Drop for ReentrancyToken<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.runtime.shared.lock().reentrancy.leave(key);
        }
    }
}

impl ContractRuntime {
    /// Claim `key` for the current check
    ///
    /// Returns `None` when the scope is already being checked, in which case
    /// the caller must skip its check. With the reentrancy guard disabled
    /// every call succeeds and nothing is tracked.
    pub fn enter(&self, key: ReentrancyKey) -> Option<ReentrancyToken<'_>> {
        if !self.config().reentrancy_guard {
            return Some(ReentrancyToken { runtime: self, key: None });
        }
        let token = self.claim(key);
        if token.is_none() {
            trace!(scope = ?key.scope, "already checking, skipped");
            self.stats.record_reentrant_skip();
        }
        token
    }

    /// Claim `key` regardless of the reentrancy guard setting, without
    /// counting a skip when it is already held
    pub(crate) fn claim(&self, key: ReentrancyKey) -> Option<ReentrancyToken<'_>> {
        if self.shared.lock().reentrancy.try_enter(key) {
            Some(ReentrancyToken { runtime: self, key: Some(key) })
        } else {
            None
        }
    }

    /// Whether `key` is claimed right now
    pub fn is_checking(&self, key: &ReentrancyKey) -> bool {
        self.shared.lock().reentrancy.is_active(key)
    }
}
