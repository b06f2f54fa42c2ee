// SPDX-FileCopyrightText: 2022 Thomas Kramer
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide unique identifier service.
//!
//! Circuits, nets, device classes and device abstracts all draw their id from the same
//! monotonic counter, rather than each keeping a private one. This mirrors a single
//! process-wide id generator shared by every identity-stable object in the model, instead
//! of per-collection counters that would let a `Circuit` and a `Net` collide on the same
//! numeric value. `0` is reserved and never handed out by [`Id::new`]; it denotes "none".

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-wide unique identifier for some entity type `T`.
///
/// `T` is a phantom marker only, so that ids of different entity kinds (a `Circuit` and
/// a `Net`, say) are distinct types and cannot be mixed up at a call site even though both
/// wrap the same `u64`.
pub struct Id<T> {
    value: u64,
    phantom: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Allocate a fresh id, never returned by a previous call in this process.
    pub(crate) fn new() -> Self {
        let value = NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed);
        Id { value, phantom: PhantomData }
    }

    /// The reserved "no id" value.
    pub fn none() -> Self {
        Id { value: 0, phantom: PhantomData }
    }

    /// `true` if this is the reserved "none" id.
    pub fn is_none(&self) -> bool {
        self.value == 0
    }

    /// The raw numeric value.
    pub fn value(&self) -> u64 {
        self.value
    }
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Resets the global counter. Only available to tests, so that scenarios relying on
/// specific id values stay deterministic regardless of test execution order.
#[cfg(test)]
pub(crate) fn reset_for_test(seed: u64) {
    NEXT_ID.store(seed.max(1), AtomicOrdering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Foo;
    struct Bar;

    #[test]
    fn ids_are_monotonic_and_type_distinct() {
        reset_for_test(1);
        let a: Id<Foo> = Id::new();
        let b: Id<Foo> = Id::new();
        assert!(a < b);
        let c: Id<Bar> = Id::new();
        assert_eq!(c.value(), b.value() + 1);
    }

    #[test]
    fn none_is_zero() {
        let n: Id<Foo> = Id::none();
        assert!(n.is_none());
        assert_eq!(n.value(), 0);
    }
}
