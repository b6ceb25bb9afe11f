//! The integrity issue report.
//!
//! Four keyed maps, every one omitted when empty so that "absent" and
//! "empty" are indistinguishable to consumers of the serialized form.
//! Relationship maps go from relationship ID to the offending concept;
//! the axiom map goes from member ID to a descriptor of the subject concept
//! carrying the offending referenced concepts.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use termgraph_store::{ConceptId, RelationshipId};

/// Subject-concept descriptor attached to a flagged axiom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSummary {
    pub concept_id: ConceptId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fsn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pt: Option<String>,
    pub missing_or_inactive_concepts: BTreeSet<ConceptId>,
}

impl ConceptSummary {
    pub fn new(concept_id: ConceptId) -> Self {
        Self {
            concept_id,
            fsn: None,
            pt: None,
            missing_or_inactive_concepts: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axioms_with_missing_or_inactive_referenced_concept:
        Option<BTreeMap<String, ConceptSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships_with_missing_or_inactive_source:
        Option<BTreeMap<RelationshipId, ConceptId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships_with_missing_or_inactive_type: Option<BTreeMap<RelationshipId, ConceptId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships_with_missing_or_inactive_destination:
        Option<BTreeMap<RelationshipId, ConceptId>>,
}

impl IntegrityReport {
    /// Assemble a report, dropping every empty map.
    pub fn from_parts(
        axioms: BTreeMap<String, ConceptSummary>,
        source: BTreeMap<RelationshipId, ConceptId>,
        type_: BTreeMap<RelationshipId, ConceptId>,
        destination: BTreeMap<RelationshipId, ConceptId>,
    ) -> Self {
        fn keep<K: Ord, V>(map: BTreeMap<K, V>) -> Option<BTreeMap<K, V>> {
            (!map.is_empty()).then_some(map)
        }
        Self {
            axioms_with_missing_or_inactive_referenced_concept: keep(axioms),
            relationships_with_missing_or_inactive_source: keep(source),
            relationships_with_missing_or_inactive_type: keep(type_),
            relationships_with_missing_or_inactive_destination: keep(destination),
        }
    }

    /// No issues of any kind.
    pub fn is_empty(&self) -> bool {
        self.axioms_with_missing_or_inactive_referenced_concept
            .is_none()
            && self.relationships_with_missing_or_inactive_source.is_none()
            && self.relationships_with_missing_or_inactive_type.is_none()
            && self
                .relationships_with_missing_or_inactive_destination
                .is_none()
    }
}

/// Semantic-index orphan probe result, split by relationship form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptsInForm {
    pub stated_concept_ids: Vec<ConceptId>,
    pub inferred_concept_ids: Vec<ConceptId>,
}

impl ConceptsInForm {
    pub fn is_empty(&self) -> bool {
        self.stated_concept_ids.is_empty() && self.inferred_concept_ids.is_empty()
    }
}
