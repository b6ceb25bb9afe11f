//! Semantic-index consistency probe.
//!
//! The semantic index is maintained elsewhere and can drift: an entry may
//! outlive the concept it indexes. The probe surfaces those orphans without
//! touching anything.

use tracing::{error, info};

use termgraph_store::{ConceptFilter, QueryConceptFilter, StoreError};

use crate::checker::{IntegrityChecker, IntegrityError};
use crate::report::ConceptsInForm;
use crate::timer::Timer;

impl IntegrityChecker<'_> {
    /// Find semantic-index entries whose concept is not in the branch's
    /// active-concept set, split into stated and inferred lists.
    pub fn find_extra_concepts_in_semantic_index(
        &self,
        branch_path: &str,
    ) -> Result<ConceptsInForm, IntegrityError> {
        let mut timer = Timer::new(format!("semantic index orphan check on {branch_path}"));
        let branch = self
            .store
            .find_branch(branch_path)
            .map_err(StoreError::from)?;
        let criteria = self.store.branch_criteria(&branch);

        let active = self.store.concept_id_set(&criteria, &ConceptFilter::active())?;
        timer.checkpoint(&format!("fetch active concepts: {}", active.len()));

        let filter = QueryConceptFilter {
            concept_id_not_in: Some(&active),
            ..Default::default()
        };
        let mut stated_concept_ids = Vec::new();
        let mut inferred_concept_ids = Vec::new();
        for entry in self.store.stream_query_concepts(&criteria, &filter)? {
            if entry.stated {
                stated_concept_ids.push(entry.concept_id);
            } else {
                inferred_concept_ids.push(entry.concept_id);
            }
        }
        stated_concept_ids.sort_unstable();
        inferred_concept_ids.sort_unstable();
        timer.checkpoint("scan whole semantic index for branch");
        timer.finish();

        if !stated_concept_ids.is_empty() || !inferred_concept_ids.is_empty() {
            error!(
                stated = stated_concept_ids.len(),
                inferred = inferred_concept_ids.len(),
                branch = %branch_path,
                "found semantic index entries for concepts outside the active set"
            );
        } else {
            info!(
                branch = %branch_path,
                "no extra concepts in the semantic index"
            );
        }

        Ok(ConceptsInForm {
            stated_concept_ids,
            inferred_concept_ids,
        })
    }
}
