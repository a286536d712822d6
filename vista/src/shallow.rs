//! Shallow structural comparison of mappings.

use std::collections::BTreeMap;
use std::rc::Rc;

/// Identity comparison for values held in a mapping.
///
/// Two values are identical if they refer to the same allocation; their
/// contents are never inspected.
pub trait Identity {
    fn is_identical(&self, other: &Self) -> bool;
}

impl<T: ?Sized> Identity for Rc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

/// A mapping that can be compared key-by-key against another mapping of the
/// same type.
pub trait ShallowEq {
    /// Returns true if both mappings hold the same set of keys and every
    /// key maps to an identical value in both.
    fn shallow_eq(&self, other: &Self) -> bool;
}

impl<K: Ord, V: Identity> ShallowEq for BTreeMap<K, V> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).map_or(false, |o| v.is_identical(o)))
    }
}

/// Compares two optional mappings. Two absent mappings are equal; an absent
/// mapping never equals a present one.
pub fn shallow_eq<M: ShallowEq>(a: Option<&M>, b: Option<&M>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.shallow_eq(b),
        _ => false,
    }
}
