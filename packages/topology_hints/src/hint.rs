use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt::{self, Display};

use crate::NumaAffinity;

/// A candidate NUMA affinity for a resource allocation, plus whether the candidate is preferred.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TopologyHint {
    /// The NUMA nodes the allocation would be local to.
    pub affinity: NumaAffinity,

    /// Whether the resource manager prefers this candidate.
    pub preferred: bool,
}

impl TopologyHint {
    /// Creates a hint.
    #[must_use]
    pub const fn new(affinity: NumaAffinity, preferred: bool) -> Self {
        Self {
            affinity,
            preferred,
        }
    }
}

/// Renders as one structured-text hint group, e.g. `{10 true}`.
impl Display for TopologyHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}}}", self.affinity, self.preferred)
    }
}

/// Ordered topology hints, grouped by the name of the resource they apply to.
///
/// The order of hints within one resource is significant and is preserved exactly as produced.
/// Resources themselves are kept in ascending name order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HintsByResource {
    by_resource: BTreeMap<String, Vec<TopologyHint>>,
}

impl HintsByResource {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `hints` to the list of the given resource, creating the list if needed.
    pub fn append(
        &mut self,
        resource: impl Into<String>,
        hints: impl IntoIterator<Item = TopologyHint>,
    ) {
        self.by_resource
            .entry(resource.into())
            .or_default()
            .extend(hints);
    }

    /// The hints for `resource`, if the resource is known.
    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&[TopologyHint]> {
        self.by_resource.get(resource).map(Vec::as_slice)
    }

    /// The number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_resource.len()
    }

    /// Whether there are no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty()
    }

    /// Iterates over resource names in ascending order.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.by_resource.keys().map(String::as_str)
    }

    /// Iterates over `(resource, hints)` pairs in ascending resource order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.by_resource.iter(),
        }
    }
}

impl<R: Into<String>> FromIterator<(R, Vec<TopologyHint>)> for HintsByResource {
    fn from_iter<T: IntoIterator<Item = (R, Vec<TopologyHint>)>>(iter: T) -> Self {
        let mut result = Self::new();

        for (resource, hints) in iter {
            result.append(resource, hints);
        }

        result
    }
}

/// Iterator over the entries of a [`HintsByResource`].
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, String, Vec<TopologyHint>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a [TopologyHint]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(resource, hints)| (resource.as_str(), hints.as_slice()))
    }
}

impl<'a> IntoIterator for &'a HintsByResource {
    type Item = (&'a str, &'a [TopologyHint]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The mask width that shows every node used by any of `hints`.
pub(crate) fn common_width(hints: &[TopologyHint]) -> usize {
    hints
        .iter()
        .map(|hint| hint.affinity.width())
        .max()
        .unwrap_or(1)
}
