//! Old-value snapshots
//!
//! An [`OldValue`] holds a copy of some state taken before an operation's
//! body runs, so postconditions can compare against it. A slot is
//! write-once and may stay empty: old-value capture can be disabled, the
//! capturing clause can be filtered out by its assertion level, or the value
//! can be of a type that cannot be duplicated. Postconditions read slots
//! through [`OldValue::holds`], which treats an empty slot as satisfied.

use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::errors::{ContractError, ContractResult};

/// Write-once container for a snapshot
pub struct OldValue<T> {
    slot: OnceCell<T>,
}

impl<T> OldValue<T> {
    /// A slot that was never captured
    pub fn empty() -> Self {
        Self { slot: OnceCell::new() }
    }

    /// Snapshot `value` now
    pub fn capture(value: &T) -> Self
    where
        T: Clone,
    {
        Self::from_value(value.clone())
    }

    /// Snapshot the result of `f` now
    pub fn capture_with<F: FnOnce() -> T>(f: F) -> Self {
        Self::from_value(f())
    }

    /// Snapshot `value` if its type can be copied, otherwise stay empty
    ///
    /// Generic code can request an old value of any `T: OldCopyable` without
    /// knowing whether `T` supports duplication.
    pub fn capture_if_copyable(value: &T) -> Self
    where
        T: OldCopyable,
    {
        match value.old_copy() {
            Some(copy) => Self::from_value(copy),
            None => Self::empty(),
        }
    }

    pub(crate) fn from_value(value: T) -> Self {
        Self { slot: OnceCell::with_value(value) }
    }

    /// Fill an empty slot
    pub fn set(&self, value: T) -> ContractResult<()> {
        self.slot
            .set(value)
            .map_err(|_| ContractError::Usage("old value already captured".to_string()))
    }

    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    pub fn is_captured(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Evaluate `pred` against the snapshot, or `true` if the slot is empty
    pub fn holds<F: FnOnce(&T) -> bool>(&self, pred: F) -> bool {
        self.slot.get().map_or(true, pred)
    }

    pub fn into_inner(self) -> Option<T> {
        self.slot.into_inner()
    }
}

impl<T> Default for OldValue<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for OldValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.get() {
            Some(value) => f.debug_tuple("OldValue").field(value).finish(),
            None => f.write_str("OldValue(<empty>)"),
        }
    }
}

/// Types that may be duplicated into an old value
///
/// The default `old_copy` returns `None`, so a type that cannot be copied
/// opts in with an empty impl and always produces an empty slot. Types that
/// can be cloned use [`old_copyable!`](crate::old_copyable).
pub trait OldCopyable {
    fn old_copy(&self) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

/// Implement [`OldCopyable`](crate::old::OldCopyable) through `Clone`
#[macro_export]
macro_rules! old_copyable {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::old::OldCopyable for $t {
                fn old_copy(&self) -> ::std::option::Option<Self> {
                    ::std::option::Option::Some(::std::clone::Clone::clone(self))
                }
            }
        )+
    };
}

crate::old_copyable!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, ()
);

impl<T: Clone> OldCopyable for Vec<T> {
    fn old_copy(&self) -> Option<Self> {
        Some(self.clone())
    }
}

impl<T: Clone> OldCopyable for VecDeque<T> {
    fn old_copy(&self) -> Option<Self> {
        Some(self.clone())
    }
}

impl<T: Clone> OldCopyable for Option<T> {
    fn old_copy(&self) -> Option<Self> {
        Some(self.clone())
    }
}

impl<T: ?Sized> OldCopyable for Arc<T> {
    fn old_copy(&self) -> Option<Self> {
        Some(Arc::clone(self))
    }
}

impl<T: ?Sized> OldCopyable for Rc<T> {
    fn old_copy(&self) -> Option<Self> {
        Some(Rc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FileHandle;
    impl OldCopyable for FileHandle {}

    #[derive(Clone, PartialEq, Debug)]
    struct Point(i32, i32);
    crate::old_copyable!(Point);

    #[test]
    fn test_capture_copies_value() {
        let mut x = 41;
        let old = OldValue::capture(&x);
        x += 1;
        assert_eq!(old.get(), Some(&41));
        assert!(old.holds(|&o| x == o + 1));
    }

    #[test]
    fn test_empty_slot_holds_vacuously() {
        let old: OldValue<i32> = OldValue::empty();
        assert!(!old.is_captured());
        assert!(old.holds(|_| false));
    }

    #[test]
    fn test_slot_is_write_once() {
        let old = OldValue::empty();
        old.set(1).unwrap();
        let err = old.set(2).unwrap_err();
        assert!(matches!(err, ContractError::Usage(_)));
        assert_eq!(old.get(), Some(&1));
    }

    #[test]
    fn test_non_copyable_degrades_to_empty() {
        let old = OldValue::capture_if_copyable(&FileHandle);
        assert!(!old.is_captured());
    }

    #[test]
    fn test_copyable_user_type() {
        let old = OldValue::capture_if_copyable(&Point(1, 2));
        assert_eq!(old.into_inner(), Some(Point(1, 2)));
    }

    #[test]
    fn test_std_containers_are_copyable() {
        let items = vec![1, 2, 3];
        let old = OldValue::capture_if_copyable(&items);
        assert_eq!(old.get().map(Vec::len), Some(3));

        let shared = Arc::new(5);
        let old = OldValue::capture_if_copyable(&shared);
        assert_eq!(old.get().map(|a| **a), Some(5));
    }

    #[test]
    fn test_debug_output() {
        assert_eq!(format!("{:?}", OldValue::capture(&3)), "OldValue(3)");
        assert_eq!(format!("{:?}", OldValue::<u8>::empty()), "OldValue(<empty>)");
    }
}
