//! The pre-commit integrity hook.
//!
//! When a branch carries the `internal.integrityIssue = "true"` flag, every
//! non-rebase commit re-runs the changed-only check against the view that
//! includes the commit's own uncommitted writes. A clean result removes the
//! flag, and the removal rides along with the in-flight commit. Anything
//! that goes wrong is logged and swallowed: an integrity probe must never
//! block a legitimate commit.

use tracing::{error, info};

use termgraph_store::{Commit, CommitError, CommitListener, TermStore, ROOT_PATH};

use crate::checker::{IntegrityChecker, IntegrityError, INTEGRITY_ISSUE_METADATA_KEY};
use crate::descriptions::NoDescriptions;
use crate::identifiers::Identifiers;

pub struct IntegrityCommitHook {
    identifiers: Identifiers,
}

impl IntegrityCommitHook {
    pub fn new(identifiers: Identifiers) -> Self {
        Self { identifiers }
    }
}

impl CommitListener for IntegrityCommitHook {
    fn pre_commit_completion(
        &self,
        commit: &mut Commit,
        store: &TermStore,
    ) -> Result<(), CommitError> {
        if commit.is_rebase() {
            return Ok(());
        }
        let flagged = commit
            .metadata()
            .internal_value(INTEGRITY_ISSUE_METADATA_KEY)
            .map_or(false, |value| value == "true");
        if !flagged {
            return Ok(());
        }
        // The changed-only check has no meaning on the root branch; the flag
        // stays until a full check clears it there.
        if commit.branch_path() == ROOT_PATH {
            return Ok(());
        }

        let branch_path = commit.branch_path().to_owned();
        let timepoint = commit.timepoint();
        let outcome: Result<bool, IntegrityError> = {
            let no_descriptions = NoDescriptions;
            let checker = IntegrityChecker::new(store, &no_descriptions, self.identifiers);
            store
                .find_branch(&branch_path)
                .map_err(termgraph_store::StoreError::from)
                .map_err(IntegrityError::from)
                .and_then(|branch| {
                    let criteria = store
                        .branch_criteria_including_open_commit(commit)
                        .map_err(IntegrityError::from)?;
                    checker
                        .find_changed_components_with_criteria(&criteria, &branch)
                        .map(|report| report.is_empty())
                })
        };

        match outcome {
            Ok(true) => {
                commit
                    .metadata_mut()
                    .remove_internal(INTEGRITY_ISSUE_METADATA_KEY);
                info!(
                    branch = %branch_path,
                    timepoint,
                    "no integrity issue found on branch after commit"
                );
            }
            Ok(false) => {}
            Err(err) => {
                error!(
                    branch = %branch_path,
                    error = %err,
                    "integrity check did not complete successfully; leaving the flag in place"
                );
            }
        }
        Ok(())
    }
}
