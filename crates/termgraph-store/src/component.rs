//! Domain component types held by the versioned store.
//!
//! These are the four graph component kinds the integrity core reasons
//! about (concepts, relationships, OWL axiom reference-set members and
//! semantic-index entries) plus descriptions, which only the report
//! enrichment reads. Each type exposes the key its version chain is hashed
//! by through the [`Component`] trait.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::ConceptId;

/// A versionable component: anything the store keeps branch-scoped version
/// chains for.
pub trait Component: Clone {
    type Key: Eq + Hash + Ord + Clone + Debug;

    fn key(&self) -> Self::Key;
}

// ============================================================================
// Concept
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: ConceptId,
    pub active: bool,
    pub module_id: ConceptId,
    /// Release time of the last published version, absent for unreleased
    /// content.
    pub effective_time: Option<u64>,
    pub released: bool,
}

impl Concept {
    pub fn new(concept_id: ConceptId, module_id: ConceptId) -> Self {
        Self {
            concept_id,
            active: true,
            module_id,
            effective_time: None,
            released: false,
        }
    }

    pub fn inactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

impl Component for Concept {
    type Key = ConceptId;

    fn key(&self) -> ConceptId {
        self.concept_id
    }
}

// ============================================================================
// Relationship
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: u64,
    pub source_id: ConceptId,
    pub type_id: ConceptId,
    /// Absent for concrete relationships, which carry `value` instead.
    pub destination_id: Option<ConceptId>,
    pub value: Option<String>,
    pub characteristic_type_id: ConceptId,
    pub active: bool,
    pub module_id: ConceptId,
}

impl Relationship {
    pub fn new(
        relationship_id: u64,
        source_id: ConceptId,
        type_id: ConceptId,
        destination_id: ConceptId,
        characteristic_type_id: ConceptId,
    ) -> Self {
        Self {
            relationship_id,
            source_id,
            type_id,
            destination_id: Some(destination_id),
            value: None,
            characteristic_type_id,
            active: true,
            module_id: 0,
        }
    }

    /// A concrete relationship: a literal value in destination position.
    pub fn concrete(
        relationship_id: u64,
        source_id: ConceptId,
        type_id: ConceptId,
        value: impl Into<String>,
        characteristic_type_id: ConceptId,
    ) -> Self {
        Self {
            relationship_id,
            source_id,
            type_id,
            destination_id: None,
            value: Some(value.into()),
            characteristic_type_id,
            active: true,
            module_id: 0,
        }
    }

    pub fn is_concrete(&self) -> bool {
        self.destination_id.is_none()
    }

    pub fn inactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

impl Component for Relationship {
    type Key = u64;

    fn key(&self) -> u64 {
        self.relationship_id
    }
}

// ============================================================================
// Reference-set member
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSetMember {
    pub member_id: String,
    pub refset_id: ConceptId,
    /// The component the member annotates; for OWL axiom members this is the
    /// subject concept.
    pub referenced_component_id: ConceptId,
    pub active: bool,
    /// The `owlExpression` additional field, present on axiom members only.
    pub owl_expression: Option<String>,
    pub module_id: ConceptId,
}

impl ReferenceSetMember {
    /// A fresh OWL axiom member with a generated member ID.
    pub fn new_axiom(
        refset_id: ConceptId,
        referenced_component_id: ConceptId,
        owl_expression: impl Into<String>,
    ) -> Self {
        Self {
            member_id: Uuid::new_v4().to_string(),
            refset_id,
            referenced_component_id,
            active: true,
            owl_expression: Some(owl_expression.into()),
            module_id: 0,
        }
    }

    pub fn inactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

impl Component for ReferenceSetMember {
    type Key = String;

    fn key(&self) -> String {
        self.member_id.clone()
    }
}

// ============================================================================
// Semantic-index entry
// ============================================================================

/// One row of the semantic index: the precomputed attribute projection of a
/// concept in either the stated or the inferred form.
///
/// The index is maintained by the semantic-index updater, not by this crate,
/// and must be treated as potentially stale; the checker only ever uses it as
/// a coarse prefilter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConcept {
    pub concept_id: ConceptId,
    pub stated: bool,
    /// Attribute type → attribute values, the transitive/attribute closure
    /// of the concept's definition.
    pub attributes: BTreeMap<ConceptId, Vec<ConceptId>>,
}

impl QueryConcept {
    pub fn new(concept_id: ConceptId, stated: bool) -> Self {
        Self {
            concept_id,
            stated,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, type_id: ConceptId, value: ConceptId) -> Self {
        self.attributes.entry(type_id).or_default().push(value);
        self
    }

    /// Every attribute value across every attribute type: the wildcard view
    /// the prefilter queries match against.
    pub fn attribute_values(&self) -> impl Iterator<Item = ConceptId> + '_ {
        self.attributes.values().flatten().copied()
    }
}

impl Component for QueryConcept {
    type Key = (ConceptId, bool);

    fn key(&self) -> (ConceptId, bool) {
        (self.concept_id, self.stated)
    }
}

// ============================================================================
// Description
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptionType {
    FullySpecifiedName,
    Synonym,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub description_id: u64,
    pub concept_id: ConceptId,
    pub term: String,
    pub type_id: DescriptionType,
    pub active: bool,
}

impl Description {
    pub fn new(
        description_id: u64,
        concept_id: ConceptId,
        type_id: DescriptionType,
        term: impl Into<String>,
    ) -> Self {
        Self {
            description_id,
            concept_id,
            term: term.into(),
            type_id,
            active: true,
        }
    }
}

impl Component for Description {
    type Key = u64;

    fn key(&self) -> u64 {
        self.description_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_relationships_have_no_destination() {
        let rel = Relationship::concrete(1, 100, 200, "#5", 900);
        assert!(rel.is_concrete());
        assert_eq!(rel.destination_id, None);
        assert_eq!(rel.value.as_deref(), Some("#5"));
    }

    #[test]
    fn query_concept_wildcard_spans_attribute_types() {
        let qc = QueryConcept::new(10, true)
            .with_attribute(116680003, 20)
            .with_attribute(363698007, 30)
            .with_attribute(363698007, 40);
        let mut values: Vec<_> = qc.attribute_values().collect();
        values.sort_unstable();
        assert_eq!(values, vec![20, 30, 40]);
    }

    #[test]
    fn axiom_members_get_distinct_ids() {
        let a = ReferenceSetMember::new_axiom(733073007, 10, "SubClassOf(:10 :20)");
        let b = ReferenceSetMember::new_axiom(733073007, 10, "SubClassOf(:10 :20)");
        assert_ne!(a.member_id, b.member_id);
    }
}
