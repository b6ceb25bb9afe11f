//! Branch criteria and entity filters.
//!
//! A [`BranchCriteria`] is the visibility predicate the store evaluates
//! server-side: a nearest-first list of `(path, cutoff)` levels, a change
//! scope, and optionally the overlay of an in-flight commit. Callers treat
//! it as opaque; the only composition offered is deriving the
//! unpromoted-change scopes from an existing criteria so an overlay carries
//! through.
//!
//! Entity filters are the per-component-type constraints a query combines
//! with the criteria. They borrow the caller's [`IdSet`]s instead of copying
//! them; with identifier universes in the millions, the filter must stay a
//! view.

use std::collections::BTreeSet;

use crate::branch::BranchPoint;
use crate::component::{Description, QueryConcept, Relationship};
use crate::ids::{ConceptId, IdSet};
use crate::store::CommitOverlay;

/// Which slice of a branch a criteria selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    /// Everything visible on the branch at its head.
    Visible,
    /// Only components created or modified on the branch itself and not yet
    /// promoted; deletions excluded.
    UnpromotedChanges,
    /// As [`ChangeScope::UnpromotedChanges`], with deletion tombstones
    /// included.
    UnpromotedChangesAndDeletions,
}

/// An opaque branch visibility predicate.
#[derive(Debug, Clone)]
pub struct BranchCriteria<'a> {
    pub(crate) levels: Vec<BranchPoint>,
    pub(crate) scope: ChangeScope,
    pub(crate) overlay: Option<&'a CommitOverlay>,
}

impl<'a> BranchCriteria<'a> {
    pub(crate) fn new(
        levels: Vec<BranchPoint>,
        scope: ChangeScope,
        overlay: Option<&'a CommitOverlay>,
    ) -> Self {
        debug_assert!(!levels.is_empty());
        Self {
            levels,
            scope,
            overlay,
        }
    }

    /// The branch path this criteria was built for.
    pub fn branch_path(&self) -> &str {
        &self.levels[0].path
    }

    /// Derive the unpromoted-changes scope (no deletions) from this
    /// criteria, preserving any open-commit overlay.
    pub fn unpromoted_changes(&self) -> BranchCriteria<'a> {
        self.rescope(ChangeScope::UnpromotedChanges)
    }

    /// Derive the unpromoted-changes-and-deletions scope from this criteria,
    /// preserving any open-commit overlay.
    pub fn unpromoted_changes_and_deletions(&self) -> BranchCriteria<'a> {
        self.rescope(ChangeScope::UnpromotedChangesAndDeletions)
    }

    fn rescope(&self, scope: ChangeScope) -> BranchCriteria<'a> {
        BranchCriteria {
            levels: vec![self.levels[0].clone()],
            scope,
            overlay: self.overlay,
        }
    }
}

// ============================================================================
// Entity filters
// ============================================================================

/// Characteristic-type constraint for relationship queries. The identifier
/// is data wired in by the caller, not a constant of this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CharacteristicFilter {
    #[default]
    Any,
    Only(ConceptId),
    Excluding(ConceptId),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConceptFilter<'a> {
    pub active: Option<bool>,
    pub id_in: Option<&'a IdSet>,
}

impl ConceptFilter<'_> {
    /// Active concepts, unrestricted by identifier.
    pub fn active() -> Self {
        Self {
            active: Some(true),
            id_in: None,
        }
    }

    pub(crate) fn matches(&self, concept: &crate::component::Concept) -> bool {
        if let Some(active) = self.active {
            if concept.active != active {
                return false;
            }
        }
        if let Some(ids) = self.id_in {
            if !ids.contains(concept.concept_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipFilter<'a> {
    pub active: Option<bool>,
    pub characteristic: CharacteristicFilter,
    pub id_in: Option<&'a IdSet>,
    /// At least one of source, type, or (non-concrete) destination is in the
    /// set.
    pub endpoint_in: Option<&'a IdSet>,
    /// At least one of source, type, or (non-concrete) destination is
    /// outside the set.
    pub endpoint_not_in: Option<&'a IdSet>,
}

impl RelationshipFilter<'_> {
    pub(crate) fn matches(&self, relationship: &Relationship) -> bool {
        if let Some(active) = self.active {
            if relationship.active != active {
                return false;
            }
        }
        match self.characteristic {
            CharacteristicFilter::Any => {}
            CharacteristicFilter::Only(id) => {
                if relationship.characteristic_type_id != id {
                    return false;
                }
            }
            CharacteristicFilter::Excluding(id) => {
                if relationship.characteristic_type_id == id {
                    return false;
                }
            }
        }
        if let Some(ids) = self.id_in {
            if !ids.contains(relationship.relationship_id) {
                return false;
            }
        }
        if let Some(ids) = self.endpoint_in {
            let hit = ids.contains(relationship.source_id)
                || ids.contains(relationship.type_id)
                || relationship
                    .destination_id
                    .map_or(false, |destination| ids.contains(destination));
            if !hit {
                return false;
            }
        }
        if let Some(ids) = self.endpoint_not_in {
            let hit = !ids.contains(relationship.source_id)
                || !ids.contains(relationship.type_id)
                || relationship
                    .destination_id
                    .map_or(false, |destination| !ids.contains(destination));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemberFilter<'a> {
    pub active: Option<bool>,
    pub refset_id: Option<ConceptId>,
    pub referenced_component_in: Option<&'a IdSet>,
    pub member_id_in: Option<&'a BTreeSet<String>>,
}

impl MemberFilter<'_> {
    pub(crate) fn matches(&self, member: &crate::component::ReferenceSetMember) -> bool {
        if let Some(active) = self.active {
            if member.active != active {
                return false;
            }
        }
        if let Some(refset_id) = self.refset_id {
            if member.refset_id != refset_id {
                return false;
            }
        }
        if let Some(ids) = self.referenced_component_in {
            if !ids.contains(member.referenced_component_id) {
                return false;
            }
        }
        if let Some(member_ids) = self.member_id_in {
            if !member_ids.contains(&member.member_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryConceptFilter<'a> {
    pub stated: Option<bool>,
    /// Some attribute value, under any attribute type, is in the set.
    pub attribute_value_in: Option<&'a IdSet>,
    /// Some attribute value, under any attribute type, is outside the set.
    pub attribute_value_not_in: Option<&'a IdSet>,
    pub concept_id_not_in: Option<&'a IdSet>,
}

impl QueryConceptFilter<'_> {
    pub(crate) fn matches(&self, entry: &QueryConcept) -> bool {
        if let Some(stated) = self.stated {
            if entry.stated != stated {
                return false;
            }
        }
        if let Some(ids) = self.attribute_value_in {
            if !entry.attribute_values().any(|value| ids.contains(value)) {
                return false;
            }
        }
        if let Some(ids) = self.attribute_value_not_in {
            if !entry.attribute_values().any(|value| !ids.contains(value)) {
                return false;
            }
        }
        if let Some(ids) = self.concept_id_not_in {
            if ids.contains(entry.concept_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptionFilter<'a> {
    pub active: Option<bool>,
    pub concept_id_in: Option<&'a IdSet>,
}

impl DescriptionFilter<'_> {
    pub(crate) fn matches(&self, description: &Description) -> bool {
        if let Some(active) = self.active {
            if description.active != active {
                return false;
            }
        }
        if let Some(ids) = self.concept_id_in {
            if !ids.contains(description.concept_id) {
                return false;
            }
        }
        true
    }
}
