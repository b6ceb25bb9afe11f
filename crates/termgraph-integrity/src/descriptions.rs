//! Description enrichment of report concept descriptors.
//!
//! After the axiom maps are assembled, each subject-concept descriptor is
//! handed to a [`DescriptionService`] to pick up display terms. The seam is
//! a trait so deployments with a richer language model (acceptability per
//! language reference set) can plug their own resolution in.

use std::collections::BTreeMap;

use termgraph_store::{
    ConceptId, DescriptionFilter, DescriptionType, IdSet, StoreError, TermStore,
};

use crate::checker::IntegrityError;
use crate::report::ConceptSummary;

pub trait DescriptionService {
    /// Populate `fsn` and `pt` on each summary from the active descriptions
    /// visible on `branch_path`.
    fn join_active_descriptions(
        &self,
        branch_path: &str,
        summaries: &mut BTreeMap<ConceptId, ConceptSummary>,
    ) -> Result<(), IntegrityError>;
}

/// No-op service for callers without description data.
pub struct NoDescriptions;

impl DescriptionService for NoDescriptions {
    fn join_active_descriptions(
        &self,
        _branch_path: &str,
        _summaries: &mut BTreeMap<ConceptId, ConceptSummary>,
    ) -> Result<(), IntegrityError> {
        Ok(())
    }
}

/// Joins descriptions straight from the component store. The preferred term
/// is the first active synonym by description ID; the fully specified name
/// is the active FSN.
pub struct StoreDescriptionService<'a> {
    store: &'a TermStore,
}

impl<'a> StoreDescriptionService<'a> {
    pub fn new(store: &'a TermStore) -> Self {
        Self { store }
    }
}

impl DescriptionService for StoreDescriptionService<'_> {
    fn join_active_descriptions(
        &self,
        branch_path: &str,
        summaries: &mut BTreeMap<ConceptId, ConceptSummary>,
    ) -> Result<(), IntegrityError> {
        if summaries.is_empty() {
            return Ok(());
        }
        let branch = self
            .store
            .find_branch(branch_path)
            .map_err(StoreError::from)?;
        let criteria = self.store.branch_criteria(&branch);
        let concept_ids: IdSet = summaries.keys().copied().collect();
        let filter = DescriptionFilter {
            active: Some(true),
            concept_id_in: Some(&concept_ids),
        };
        let mut descriptions: Vec<_> = self
            .store
            .stream_descriptions(&criteria, &filter)?
            .collect();
        descriptions.sort_by_key(|description| description.description_id);

        for description in descriptions {
            let Some(summary) = summaries.get_mut(&description.concept_id) else {
                continue;
            };
            match description.type_id {
                DescriptionType::FullySpecifiedName => {
                    if summary.fsn.is_none() {
                        summary.fsn = Some(description.term);
                    }
                }
                DescriptionType::Synonym => {
                    if summary.pt.is_none() {
                        summary.pt = Some(description.term);
                    }
                }
            }
        }
        Ok(())
    }
}
