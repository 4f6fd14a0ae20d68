use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fmt::{self, Display};
use std::iter::Copied;
use std::str::FromStr;

use crate::{CpuId, emit, parse};

/// An immutable set of logical processor IDs.
///
/// Set operations never modify the set they are called on; they return a new set instead.
/// Iteration is always in ascending ID order.
///
/// The [`Display`] implementation emits the canonical [CPU list][crate] form and the [`FromStr`]
/// implementation parses any valid CPU list.
///
/// # Example
///
/// ```
/// use cpuset::CpuSet;
///
/// let allocated: CpuSet = "2,6".parse().unwrap();
/// let siblings: CpuSet = "2,6".parse().unwrap();
///
/// assert!(allocated.difference(&siblings).is_empty());
/// assert_eq!(allocated.first(), Some(2));
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CpuSet {
    ids: BTreeSet<CpuId>,
}

impl CpuSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a set with the IDs present in either `self` or `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.ids.union(&other.ids).copied().collect()
    }

    /// Returns a set with the IDs present in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.ids.difference(&other.ids).copied().collect()
    }

    /// Returns a set with the IDs present in both `self` and `other`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.ids.intersection(&other.ids).copied().collect()
    }

    /// Whether every ID in `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.ids.is_subset(&other.ids)
    }

    /// The number of IDs in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set contains no IDs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether the set contains `id`.
    #[must_use]
    pub fn contains(&self, id: CpuId) -> bool {
        self.ids.contains(&id)
    }

    /// The smallest ID in the set, or `None` if the set is empty.
    #[must_use]
    pub fn first(&self) -> Option<CpuId> {
        self.ids.first().copied()
    }

    /// Iterates over the IDs in ascending order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.ids.iter().copied(),
        }
    }

    /// Returns the IDs in ascending order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<CpuId> {
        self.ids.iter().copied().collect()
    }
}

impl FromIterator<CpuId> for CpuSet {
    fn from_iter<T: IntoIterator<Item = CpuId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[CpuId; N]> for CpuSet {
    fn from(value: [CpuId; N]) -> Self {
        value.into_iter().collect()
    }
}

impl FromStr for CpuSet {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s).map(|ids| ids.into_iter().collect())
    }
}

impl Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&emit(&self.ids))
    }
}

/// Iterator over the IDs of a [`CpuSet`], in ascending order.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    inner: Copied<btree_set::Iter<'a, CpuId>>,
}

impl Iterator for Iter<'_> {
    type Item = CpuId;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a CpuSet {
    type Item = CpuId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(CpuSet: Send, Sync, Debug, Clone);

    fn set(s: &str) -> CpuSet {
        s.parse().unwrap()
    }

    #[test]
    fn parse_examples() {
        assert!(set("").is_empty());
        assert_eq!(set("0-3,8"), CpuSet::from([0, 1, 2, 3, 8]));
        "3-1".parse::<CpuSet>().unwrap_err();
    }

    #[test]
    fn set_operations_return_new_sets() {
        let a = set("0-3");
        let b = set("2-5");

        assert_eq!(a.union(&b), set("0-5"));
        assert_eq!(a.difference(&b), set("0-1"));
        assert_eq!(b.difference(&a), set("4-5"));
        assert_eq!(a.intersection(&b), set("2-3"));

        // Originals are untouched.
        assert_eq!(a, set("0-3"));
        assert_eq!(b, set("2-5"));
    }

    #[test]
    fn size_and_membership() {
        let s = set("1,5-6");

        assert_eq!(s.len(), 3);
        assert!(s.contains(5));
        assert!(!s.contains(4));
        assert_eq!(s.first(), Some(1));
        assert_eq!(CpuSet::new().first(), None);
        assert!(set("5").is_subset(&s));
        assert!(!set("4-5").is_subset(&s));
    }

    #[test]
    fn iteration_is_ascending() {
        let s = CpuSet::from([9, 3, 7, 1]);

        assert_eq!(s.iter().collect::<Vec<_>>(), vec![1, 3, 7, 9]);
        assert_eq!(s.iter().len(), 4);
        assert_eq!((&s).into_iter().next(), Some(1));
        assert_eq!(s.to_vec(), vec![1, 3, 7, 9]);
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(set(" 8, 1-3 , 2").to_string(), "1-3,8");
        assert_eq!(set("").to_string(), "");
        assert_eq!(set("4,0,5,1").to_string(), "0-1,4-5");
    }

    #[test]
    fn round_trip_preserves_membership() {
        for input in ["", "0", "0-3,8", "31,0-2,16-17", "100-103,1,2,3"] {
            let once = set(input);
            let twice = set(&once.to_string());

            assert_eq!(once, twice, "membership changed for input '{input}'");
        }
    }
}
