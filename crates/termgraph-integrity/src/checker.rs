//! The integrity checker.
//!
//! Three check algorithms over one store:
//!
//! - **Full** ([`IntegrityChecker::find_all_components_with_bad_integrity`]):
//!   compare every active relationship and axiom on a branch against the
//!   branch's active-concept universe. Works on any branch, root included.
//! - **Changed-only**
//!   ([`IntegrityChecker::find_changed_components_with_bad_integrity`]):
//!   restrict the work to what the branch itself touched: references *to*
//!   concepts the branch deleted or inactivated, and references *from*
//!   relationships and axioms the branch added or changed. Refuses the root
//!   branch.
//! - **Fix-task differential**
//!   ([`IntegrityChecker::find_changed_components_on_fix_task`]): on a task
//!   branch under an extension, re-resolve the issues flagged on the
//!   extension main and report only those still unresolved; a clean result
//!   writes the `integrityIssue` flag down to `"false"`.
//!
//! Axioms are never scanned wholesale. The semantic index acts as a coarse
//! prefilter: only concepts whose indexed attribute closure intersects the
//! offending set have their axioms fetched and parsed. That two-stage layout
//! is load-bearing at real ontology sizes.
//!
//! Between store streams the checker holds identifier sets only; component
//! bodies are dropped as they are consumed. A check either returns a
//! complete report or an error, never a partial report.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::info;

use termgraph_owl::{referenced_concepts, OwlParseError};
use termgraph_store::{
    parent_path, Branch, BranchCriteria, CharacteristicFilter, ConceptFilter, ConceptId, IdSet,
    MemberFilter, QueryConceptFilter, ReferenceSetMember, RelationshipFilter, RelationshipId,
    StoreError, TermStore,
};

use crate::descriptions::DescriptionService;
use crate::identifiers::Identifiers;
use crate::report::{ConceptSummary, IntegrityReport};
use crate::timer::Timer;

/// Branch metadata key flagging unresolved integrity issues, under the
/// `internal` submap.
pub const INTEGRITY_ISSUE_METADATA_KEY: &str = "integrityIssue";

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("the changed-component integrity check cannot run on the root branch; run the full check instead")]
    RootBranch,
    #[error("branch {branch} is not a descendant of {expected_ancestor}")]
    BranchTopology {
        branch: String,
        expected_ancestor: String,
    },
    #[error("branch {branch} must be rebased before the integrity check can run")]
    NotRebased { branch: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to parse the OWL expression of axiom member {member_id}")]
    AxiomConversion {
        member_id: String,
        #[source]
        source: OwlParseError,
    },
}

/// The checker borrows its collaborators; it owns nothing but the wired
/// identifiers and the transient sets of one invocation.
pub struct IntegrityChecker<'a> {
    pub(crate) store: &'a TermStore,
    pub(crate) descriptions: &'a dyn DescriptionService,
    pub(crate) identifiers: Identifiers,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(
        store: &'a TermStore,
        descriptions: &'a dyn DescriptionService,
        identifiers: Identifiers,
    ) -> Self {
        Self {
            store,
            descriptions,
            identifiers,
        }
    }

    // ========================================================================
    // Full check
    // ========================================================================

    /// Check every active relationship and axiom on the branch against the
    /// branch's active-concept set. `stated` selects the authored view;
    /// otherwise only classifier-produced relationships are checked and the
    /// inferred semantic-index slice drives the axiom prefilter.
    pub fn find_all_components_with_bad_integrity(
        &self,
        branch: &Branch,
        stated: bool,
    ) -> Result<IntegrityReport, IntegrityError> {
        let criteria = self.store.branch_criteria(branch);
        let mut timer = Timer::new(format!("full integrity check on {}", branch.path));

        // The authoritative universe for this invocation.
        let active = self.store.concept_id_set(&criteria, &ConceptFilter::active())?;
        timer.checkpoint(&format!("fetch active concepts: {}", active.len()));

        let mut source_map: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let mut type_map: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let mut destination_map: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();

        let characteristic = if stated {
            CharacteristicFilter::Excluding(self.identifiers.inferred_characteristic_type)
        } else {
            CharacteristicFilter::Only(self.identifiers.inferred_characteristic_type)
        };
        let relationship_filter = RelationshipFilter {
            active: Some(true),
            characteristic,
            endpoint_not_in: Some(&active),
            ..Default::default()
        };
        for relationship in self
            .store
            .stream_relationships(&criteria, &relationship_filter)?
        {
            if !active.contains(relationship.source_id) {
                source_map.insert(relationship.relationship_id, relationship.source_id);
            }
            if !active.contains(relationship.type_id) {
                type_map.insert(relationship.relationship_id, relationship.type_id);
            }
            if let Some(destination) = relationship.destination_id {
                if !active.contains(destination) {
                    destination_map.insert(relationship.relationship_id, destination);
                }
            }
        }
        timer.checkpoint(&format!(
            "collect relationships referencing concepts outside the active set: {}",
            source_map.len() + type_map.len() + destination_map.len()
        ));

        // Axioms, semantic index first: candidates are concepts whose indexed
        // attribute closure leaves the active set.
        let candidate_filter = QueryConceptFilter {
            stated: Some(stated),
            attribute_value_not_in: Some(&active),
            ..Default::default()
        };
        let mut candidates = IdSet::new();
        for entry in self
            .store
            .stream_query_concepts(&criteria, &candidate_filter)?
        {
            candidates.insert(entry.concept_id);
        }
        timer.checkpoint(&format!(
            "collect semantic index candidates: {}",
            candidates.len()
        ));

        let mut axiom_bad: BTreeMap<String, BTreeSet<ConceptId>> = BTreeMap::new();
        let mut axiom_subject: BTreeMap<String, ConceptId> = BTreeMap::new();
        if !candidates.is_empty() {
            let member_filter = MemberFilter {
                active: Some(true),
                refset_id: Some(self.identifiers.owl_axiom_refset),
                referenced_component_in: Some(&candidates),
                ..Default::default()
            };
            for member in self.store.stream_members(&criteria, &member_filter)? {
                let referenced = self.parse_axiom(&member)?;
                let bad: BTreeSet<ConceptId> = referenced
                    .into_iter()
                    .filter(|id| !active.contains(*id))
                    .collect();
                if !bad.is_empty() {
                    axiom_subject.insert(member.member_id.clone(), member.referenced_component_id);
                    axiom_bad.entry(member.member_id).or_default().extend(bad);
                }
            }
        }
        timer.checkpoint(&format!("parse candidate axioms: {}", axiom_bad.len()));

        let axioms = self.axiom_summaries(&branch.path, axiom_bad, &axiom_subject)?;
        timer.finish();
        Ok(IntegrityReport::from_parts(
            axioms,
            source_map,
            type_map,
            destination_map,
        ))
    }

    // ========================================================================
    // Changed-only check
    // ========================================================================

    /// Check only what the branch itself changed, against the branch head.
    pub fn find_changed_components_with_bad_integrity(
        &self,
        branch: &Branch,
    ) -> Result<IntegrityReport, IntegrityError> {
        let criteria = self.store.branch_criteria(branch);
        self.find_changed_components_with_criteria(&criteria, branch)
    }

    /// Criteria-parameterized variant; the commit hook passes the view that
    /// includes its open commit.
    pub fn find_changed_components_with_criteria(
        &self,
        criteria: &BranchCriteria<'_>,
        branch: &Branch,
    ) -> Result<IntegrityReport, IntegrityError> {
        if branch.is_root() {
            return Err(IntegrityError::RootBranch);
        }
        let mut timer = Timer::new(format!(
            "changed component integrity check on {}",
            branch.path
        ));

        let mut source_map: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let mut type_map: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let mut destination_map: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let mut axiom_bad: BTreeMap<String, BTreeSet<ConceptId>> = BTreeMap::new();
        let mut axiom_subject: BTreeMap<String, ConceptId> = BTreeMap::new();

        // (a) did this branch invalidate references to concepts it deleted
        // or inactivated?
        let deleted_or_inactive = self.find_deleted_or_inactivated_concepts(criteria)?;
        timer.checkpoint(&format!(
            "collect deleted or inactive concepts: {}",
            deleted_or_inactive.len()
        ));

        if !deleted_or_inactive.is_empty() {
            let relationship_filter = RelationshipFilter {
                active: Some(true),
                characteristic: CharacteristicFilter::Excluding(
                    self.identifiers.inferred_characteristic_type,
                ),
                endpoint_in: Some(&deleted_or_inactive),
                ..Default::default()
            };
            for relationship in self
                .store
                .stream_relationships(criteria, &relationship_filter)?
            {
                if deleted_or_inactive.contains(relationship.source_id) {
                    source_map.insert(relationship.relationship_id, relationship.source_id);
                }
                if deleted_or_inactive.contains(relationship.type_id) {
                    type_map.insert(relationship.relationship_id, relationship.type_id);
                }
                if let Some(destination) = relationship.destination_id {
                    if deleted_or_inactive.contains(destination) {
                        destination_map.insert(relationship.relationship_id, destination);
                    }
                }
            }
            timer.checkpoint(&format!(
                "collect relationships referencing deleted or inactive concepts: {}",
                source_map.len() + type_map.len() + destination_map.len()
            ));

            // Two-stage axiom pass keyed on the deleted-or-inactive set.
            let candidate_filter = QueryConceptFilter {
                stated: Some(true),
                attribute_value_in: Some(&deleted_or_inactive),
                ..Default::default()
            };
            let mut candidates = IdSet::new();
            for entry in self
                .store
                .stream_query_concepts(criteria, &candidate_filter)?
            {
                candidates.insert(entry.concept_id);
            }
            if !candidates.is_empty() {
                let member_filter = MemberFilter {
                    active: Some(true),
                    refset_id: Some(self.identifiers.owl_axiom_refset),
                    referenced_component_in: Some(&candidates),
                    ..Default::default()
                };
                for member in self.store.stream_members(criteria, &member_filter)? {
                    let referenced = self.parse_axiom(&member)?;
                    let bad: BTreeSet<ConceptId> = referenced
                        .into_iter()
                        .filter(|id| deleted_or_inactive.contains(*id))
                        .collect();
                    if !bad.is_empty() {
                        axiom_subject
                            .insert(member.member_id.clone(), member.referenced_component_id);
                        axiom_bad.entry(member.member_id).or_default().extend(bad);
                    }
                }
            }
            timer.checkpoint(&format!(
                "collect axioms referencing deleted or inactive concepts: {}",
                axiom_bad.len()
            ));
        }

        // (b) did this branch add or change components that point at
        // inactive concepts? Gather every concept used by the branch's own
        // unpromoted relationships and axioms.
        let unpromoted = criteria.unpromoted_changes();
        let mut used_as_source: BTreeMap<ConceptId, Vec<RelationshipId>> = BTreeMap::new();
        let mut used_as_type: BTreeMap<ConceptId, Vec<RelationshipId>> = BTreeMap::new();
        let mut used_as_destination: BTreeMap<ConceptId, Vec<RelationshipId>> = BTreeMap::new();
        let mut used_in_axioms: BTreeMap<ConceptId, BTreeSet<String>> = BTreeMap::new();

        let changed_filter = RelationshipFilter {
            active: Some(true),
            characteristic: CharacteristicFilter::Excluding(
                self.identifiers.inferred_characteristic_type,
            ),
            ..Default::default()
        };
        for relationship in self.store.stream_relationships(&unpromoted, &changed_filter)? {
            used_as_source
                .entry(relationship.source_id)
                .or_default()
                .push(relationship.relationship_id);
            used_as_type
                .entry(relationship.type_id)
                .or_default()
                .push(relationship.relationship_id);
            if let Some(destination) = relationship.destination_id {
                used_as_destination
                    .entry(destination)
                    .or_default()
                    .push(relationship.relationship_id);
            }
        }
        let changed_member_filter = MemberFilter {
            active: Some(true),
            refset_id: Some(self.identifiers.owl_axiom_refset),
            ..Default::default()
        };
        for member in self.store.stream_members(&unpromoted, &changed_member_filter)? {
            axiom_subject.insert(member.member_id.clone(), member.referenced_component_id);
            let referenced = self.parse_axiom(&member)?;
            for id in referenced {
                used_in_axioms
                    .entry(id)
                    .or_default()
                    .insert(member.member_id.clone());
            }
        }

        let mut required_active = IdSet::new();
        required_active.extend(used_as_source.keys().copied());
        required_active.extend(used_as_type.keys().copied());
        required_active.extend(used_as_destination.keys().copied());
        required_active.extend(used_in_axioms.keys().copied());
        timer.checkpoint(&format!(
            "collect concepts referenced in changed relationships and axioms: {}",
            required_active.len()
        ));

        let active_filter = ConceptFilter {
            active: Some(true),
            id_in: Some(&required_active),
        };
        let currently_active = self.store.concept_id_set(criteria, &active_filter)?;
        timer.checkpoint(&format!(
            "collect active concepts referenced in changed relationships and axioms: {}",
            currently_active.len()
        ));

        let not_active = required_active.difference(&currently_active);
        for concept in not_active.iter() {
            for relationship_id in used_as_source.get(&concept).into_iter().flatten() {
                source_map.insert(*relationship_id, concept);
            }
            for relationship_id in used_as_type.get(&concept).into_iter().flatten() {
                type_map.insert(*relationship_id, concept);
            }
            for relationship_id in used_as_destination.get(&concept).into_iter().flatten() {
                destination_map.insert(*relationship_id, concept);
            }
            for member_id in used_in_axioms.get(&concept).into_iter().flatten() {
                axiom_bad
                    .entry(member_id.clone())
                    .or_default()
                    .insert(concept);
            }
        }

        let axioms = self.axiom_summaries(&branch.path, axiom_bad, &axiom_subject)?;
        timer.finish();
        Ok(IntegrityReport::from_parts(
            axioms,
            source_map,
            type_map,
            destination_map,
        ))
    }

    // ========================================================================
    // Fix-task differential check
    // ========================================================================

    /// On a fix-task branch under an extension, report only the issues from
    /// the extension main that the task has not yet resolved. An empty
    /// result writes `internal.integrityIssue = "false"` onto the task
    /// branch.
    pub fn find_changed_components_on_fix_task(
        &self,
        task_branch: &Branch,
        extension_main_path: &str,
    ) -> Result<IntegrityReport, IntegrityError> {
        let extension_main = self
            .store
            .find_branch(extension_main_path)
            .map_err(StoreError::from)?;
        let project_path =
            parent_path(&task_branch.path).ok_or_else(|| IntegrityError::BranchTopology {
                branch: task_branch.path.clone(),
                expected_ancestor: extension_main_path.to_owned(),
            })?;
        let project = self
            .store
            .find_branch(project_path)
            .map_err(StoreError::from)?;

        let project_is_extension = project.path.eq_ignore_ascii_case(&extension_main.path);
        let grandparent_is_extension = parent_path(&project.path)
            .map_or(false, |path| path.eq_ignore_ascii_case(&extension_main.path));
        if !project_is_extension && !grandparent_is_extension {
            return Err(IntegrityError::BranchTopology {
                branch: project.path.clone(),
                expected_ancestor: extension_main_path.to_owned(),
            });
        }
        if !project_is_extension && project.base_timestamp < extension_main.head_timestamp {
            return Err(IntegrityError::NotRebased {
                branch: project.path.clone(),
            });
        }
        if task_branch.base_timestamp < extension_main.head_timestamp {
            return Err(IntegrityError::NotRebased {
                branch: task_branch.path.clone(),
            });
        }

        let mut timer = Timer::new(format!(
            "changed component integrity check on {} against {}",
            task_branch.path, extension_main_path
        ));
        let baseline = self.find_changed_components_with_bad_integrity(&extension_main)?;
        if baseline.is_empty() {
            info!(branch = %extension_main_path, "no integrity issue found on the extension main branch");
            return self.find_changed_components_with_bad_integrity(task_branch);
        }

        let mut baseline_relationships = IdSet::new();
        if let Some(map) = &baseline.relationships_with_missing_or_inactive_source {
            info!(count = map.len(), branch = %extension_main_path, "relationships with inactive source on baseline");
            baseline_relationships.extend(map.keys().copied());
        }
        if let Some(map) = &baseline.relationships_with_missing_or_inactive_type {
            info!(count = map.len(), branch = %extension_main_path, "relationships with inactive type on baseline");
            baseline_relationships.extend(map.keys().copied());
        }
        if let Some(map) = &baseline.relationships_with_missing_or_inactive_destination {
            info!(count = map.len(), branch = %extension_main_path, "relationships with inactive destination on baseline");
            baseline_relationships.extend(map.keys().copied());
        }
        let baseline_axioms: BTreeSet<String> = baseline
            .axioms_with_missing_or_inactive_referenced_concept
            .as_ref()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        info!(count = baseline_axioms.len(), branch = %extension_main_path, "axioms referencing inactive concepts on baseline");
        timer.checkpoint(&format!(
            "integrity check completed on {extension_main_path}"
        ));

        // Re-resolve the flagged components on the task branch: their
        // endpoints may have been fixed there, or the offending concepts
        // reactivated.
        let criteria = self.store.branch_criteria(task_branch);
        let mut relationship_source: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let mut relationship_type: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let mut relationship_destination: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        let flagged_filter = RelationshipFilter {
            active: Some(true),
            characteristic: CharacteristicFilter::Excluding(
                self.identifiers.inferred_characteristic_type,
            ),
            id_in: Some(&baseline_relationships),
            ..Default::default()
        };
        for relationship in self.store.stream_relationships(&criteria, &flagged_filter)? {
            relationship_source.insert(relationship.relationship_id, relationship.source_id);
            relationship_type.insert(relationship.relationship_id, relationship.type_id);
            if let Some(destination) = relationship.destination_id {
                relationship_destination.insert(relationship.relationship_id, destination);
            }
        }

        let mut used_in_axioms: BTreeMap<ConceptId, BTreeSet<String>> = BTreeMap::new();
        let mut axiom_subject: BTreeMap<String, ConceptId> = BTreeMap::new();
        let flagged_member_filter = MemberFilter {
            active: Some(true),
            refset_id: Some(self.identifiers.owl_axiom_refset),
            member_id_in: Some(&baseline_axioms),
            ..Default::default()
        };
        for member in self.store.stream_members(&criteria, &flagged_member_filter)? {
            axiom_subject.insert(member.member_id.clone(), member.referenced_component_id);
            let referenced = self.parse_axiom(&member)?;
            for id in referenced {
                used_in_axioms
                    .entry(id)
                    .or_default()
                    .insert(member.member_id.clone());
            }
        }

        let mut to_check = IdSet::new();
        to_check.extend(used_in_axioms.keys().copied());
        to_check.extend(relationship_source.values().copied());
        to_check.extend(relationship_type.values().copied());
        to_check.extend(relationship_destination.values().copied());

        let active = self.store.concept_id_set(
            &criteria,
            &ConceptFilter {
                active: Some(true),
                id_in: Some(&to_check),
            },
        )?;
        timer.checkpoint(&format!(
            "collect active concepts referenced in flagged components: {} on {}",
            active.len(),
            task_branch.path
        ));

        let mut axiom_bad: BTreeMap<String, BTreeSet<ConceptId>> = BTreeMap::new();
        for (concept, members) in &used_in_axioms {
            if !active.contains(*concept) {
                for member_id in members {
                    axiom_bad
                        .entry(member_id.clone())
                        .or_default()
                        .insert(*concept);
                }
            }
        }
        info!(
            count = axiom_bad.len(),
            "axioms still referencing inactive concepts"
        );

        let mut still_source: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        for (relationship_id, concept) in &relationship_source {
            if !active.contains(*concept) {
                still_source.insert(*relationship_id, *concept);
            }
        }
        let mut still_type: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        for (relationship_id, concept) in &relationship_type {
            if !active.contains(*concept) {
                still_type.insert(*relationship_id, *concept);
            }
        }
        let mut still_destination: BTreeMap<RelationshipId, ConceptId> = BTreeMap::new();
        for (relationship_id, concept) in &relationship_destination {
            if !active.contains(*concept) {
                still_destination.insert(*relationship_id, *concept);
            }
        }

        let axioms = self.axiom_summaries(&task_branch.path, axiom_bad, &axiom_subject)?;
        timer.finish();
        let report =
            IntegrityReport::from_parts(axioms, still_source, still_type, still_destination);
        if report.is_empty() {
            let mut metadata = task_branch.metadata.clone();
            metadata.set_internal(INTEGRITY_ISSUE_METADATA_KEY, "false");
            self.store
                .update_branch_metadata(&task_branch.path, metadata)
                .map_err(StoreError::from)?;
            info!(branch = %task_branch.path, "integrity issues have been fixed on the fix task branch");
        }
        Ok(report)
    }

    // ========================================================================
    // Shared pieces
    // ========================================================================

    /// Concepts changed or deleted on the branch that are not currently
    /// visible and active there.
    fn find_deleted_or_inactivated_concepts(
        &self,
        criteria: &BranchCriteria<'_>,
    ) -> Result<IdSet, IntegrityError> {
        let with_deletions = criteria.unpromoted_changes_and_deletions();
        let changed_or_deleted = self
            .store
            .concept_id_set(&with_deletions, &ConceptFilter::default())?;
        if changed_or_deleted.is_empty() {
            return Ok(changed_or_deleted);
        }
        let still_active = self.store.concept_id_set(
            criteria,
            &ConceptFilter {
                active: Some(true),
                id_in: Some(&changed_or_deleted),
            },
        )?;
        Ok(changed_or_deleted.difference(&still_active))
    }

    fn parse_axiom(
        &self,
        member: &ReferenceSetMember,
    ) -> Result<BTreeSet<ConceptId>, IntegrityError> {
        let expression = member.owl_expression.as_deref().unwrap_or_default();
        referenced_concepts(expression).map_err(|source| IntegrityError::AxiomConversion {
            member_id: member.member_id.clone(),
            source,
        })
    }

    /// Turn the per-axiom offending sets into report descriptors, enriched
    /// with display terms for each subject concept.
    fn axiom_summaries(
        &self,
        branch_path: &str,
        axiom_bad: BTreeMap<String, BTreeSet<ConceptId>>,
        axiom_subject: &BTreeMap<String, ConceptId>,
    ) -> Result<BTreeMap<String, ConceptSummary>, IntegrityError> {
        if axiom_bad.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut minis: BTreeMap<ConceptId, ConceptSummary> = BTreeMap::new();
        for member_id in axiom_bad.keys() {
            if let Some(&subject) = axiom_subject.get(member_id) {
                minis
                    .entry(subject)
                    .or_insert_with(|| ConceptSummary::new(subject));
            }
        }
        self.descriptions
            .join_active_descriptions(branch_path, &mut minis)?;

        let mut out = BTreeMap::new();
        for (member_id, bad) in axiom_bad {
            let Some(&subject) = axiom_subject.get(&member_id) else {
                continue;
            };
            let mut summary = minis
                .get(&subject)
                .cloned()
                .unwrap_or_else(|| ConceptSummary::new(subject));
            summary.missing_or_inactive_concepts = bad;
            out.insert(member_id, summary);
        }
        Ok(out)
    }
}
