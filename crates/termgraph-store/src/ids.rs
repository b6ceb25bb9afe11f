//! Dense identifier sets over 64-bit component IDs.
//!
//! Concept and relationship identifiers are SNOMED-style 64-bit integers and
//! the universes the integrity checker works with reach into the millions, so
//! plain hash sets of boxed keys are the wrong shape. [`IdSet`] wraps a
//! 64-bit roaring bitmap and exposes exactly the set algebra the checker
//! composes: bulk collection, membership, union and in-place difference.

use roaring::RoaringTreemap;

/// A SNOMED CT concept identifier.
pub type ConceptId = u64;

/// A relationship identifier.
pub type RelationshipId = u64;

/// A compressed set of 64-bit component identifiers.
#[derive(Clone, Default, PartialEq)]
pub struct IdSet(RoaringTreemap);

impl IdSet {
    pub fn new() -> Self {
        Self(RoaringTreemap::new())
    }

    pub fn insert(&mut self, id: u64) -> bool {
        self.0.insert(id)
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter()
    }

    /// Add every member of `other` to this set.
    pub fn union_with(&mut self, other: &IdSet) {
        self.0 |= &other.0;
    }

    /// Remove every member of `other` from this set.
    pub fn difference_with(&mut self, other: &IdSet) {
        self.0 -= &other.0;
    }

    /// `self \ other` as a fresh set, leaving both operands untouched.
    pub fn difference(&self, other: &IdSet) -> IdSet {
        let mut out = self.clone();
        out.difference_with(other);
        out
    }
}

impl FromIterator<u64> for IdSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self(RoaringTreemap::from_iter(iter))
    }
}

impl Extend<u64> for IdSet {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl std::fmt::Debug for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdSet").field("len", &self.0.len()).finish()
    }
}
