//! The branching component store.
//!
//! [`TermStore`] holds the version chains for every component kind, the
//! branch registry, and the commit machinery. All content mutation flows
//! through commits:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     TermStore                       │
//! │                                                     │
//! │  ┌─────────────┐   ┌─────────────────────────────┐  │
//! │  │  branches   │   │  version chains             │  │
//! │  │  (registry) │   │  concepts / relationships / │  │
//! │  └──────┬──────┘   │  members / query concepts / │  │
//! │         │          │  descriptions               │  │
//! │         ▼          └──────────────▲──────────────┘  │
//! │  ┌─────────────┐                  │                 │
//! │  │ BranchCriteria ──────► streamed queries          │
//! │  └─────────────┘                  │                 │
//! │                                   │                 │
//! │  open_commit ──► buffered writes ─┘ (on completion) │
//! │        │                                            │
//! │        └──► pre-commit listeners (may mutate the    │
//! │             commit's branch metadata)               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! A commit buffers its writes in an overlay; criteria built *including the
//! open commit* resolve through that overlay first, which is how pre-commit
//! listeners observe the in-flight state. Listener errors abort the commit.
//!
//! The store is safe for concurrent queries. Queries take short read locks
//! per page; commits take one write lock while applying.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::branch::{parent_path, Branch, BranchError, BranchMetadata, BranchPoint, ROOT_PATH};
use crate::component::{
    Component, Concept, Description, QueryConcept, ReferenceSetMember, Relationship,
};
use crate::criteria::{
    BranchCriteria, ChangeScope, ConceptFilter, DescriptionFilter, MemberFilter,
    QueryConceptFilter, RelationshipFilter,
};
use crate::ids::{ConceptId, IdSet, RelationshipId};
use crate::stream::ComponentStream;
use crate::versioned::{Pending, VersionedCollection};

/// Failures surfaced by store queries. The in-memory backend can only fail
/// on branch resolution; callers should treat the kind as transient and
/// retriable at the invocation level.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Branch(#[from] BranchError),
}

/// Failures completing a commit.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Branch(#[from] BranchError),
    #[error("commit rejected by a pre-commit listener: {0}")]
    Rejected(String),
}

// ============================================================================
// Commits
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitKind {
    /// Regular content commit on a branch.
    Content,
    /// Advance the branch base to its parent's head; no content of its own.
    Rebase,
    /// Merge the source branch's unpromoted rows into this (parent) branch.
    Promotion { source_path: String },
}

/// Buffered writes of an open commit, keyed per component kind.
#[derive(Debug, Default)]
pub struct CommitOverlay {
    pub(crate) concepts: std::collections::HashMap<ConceptId, Pending<Concept>>,
    pub(crate) relationships: std::collections::HashMap<RelationshipId, Pending<Relationship>>,
    pub(crate) members: std::collections::HashMap<String, Pending<ReferenceSetMember>>,
    pub(crate) query_concepts:
        std::collections::HashMap<(ConceptId, bool), Pending<QueryConcept>>,
    pub(crate) descriptions: std::collections::HashMap<u64, Pending<Description>>,
}

impl CommitOverlay {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
            && self.relationships.is_empty()
            && self.members.is_empty()
            && self.query_concepts.is_empty()
            && self.descriptions.is_empty()
    }
}

/// An open commit: a timepoint, buffered writes, and a working copy of the
/// branch metadata that listeners may mutate before completion.
#[derive(Debug)]
pub struct Commit {
    branch_path: String,
    timepoint: u64,
    kind: CommitKind,
    pub(crate) overlay: CommitOverlay,
    metadata: BranchMetadata,
}

impl Commit {
    pub fn branch_path(&self) -> &str {
        &self.branch_path
    }

    pub fn timepoint(&self) -> u64 {
        self.timepoint
    }

    pub fn kind(&self) -> &CommitKind {
        &self.kind
    }

    pub fn is_rebase(&self) -> bool {
        matches!(self.kind, CommitKind::Rebase)
    }

    pub fn metadata(&self) -> &BranchMetadata {
        &self.metadata
    }

    /// Mutations ride along with the commit and are persisted on
    /// completion.
    pub fn metadata_mut(&mut self) -> &mut BranchMetadata {
        &mut self.metadata
    }

    pub fn save_concept(&mut self, concept: Concept) {
        self.overlay.concepts.insert(
            concept.key(),
            Pending {
                component: concept,
                tombstone: false,
            },
        );
    }

    pub fn delete_concept(&mut self, concept: Concept) {
        self.overlay.concepts.insert(
            concept.key(),
            Pending {
                component: concept,
                tombstone: true,
            },
        );
    }

    pub fn save_relationship(&mut self, relationship: Relationship) {
        self.overlay.relationships.insert(
            relationship.key(),
            Pending {
                component: relationship,
                tombstone: false,
            },
        );
    }

    pub fn delete_relationship(&mut self, relationship: Relationship) {
        self.overlay.relationships.insert(
            relationship.key(),
            Pending {
                component: relationship,
                tombstone: true,
            },
        );
    }

    pub fn save_member(&mut self, member: ReferenceSetMember) {
        self.overlay.members.insert(
            member.key(),
            Pending {
                component: member,
                tombstone: false,
            },
        );
    }

    pub fn delete_member(&mut self, member: ReferenceSetMember) {
        self.overlay.members.insert(
            member.key(),
            Pending {
                component: member,
                tombstone: true,
            },
        );
    }

    pub fn save_query_concept(&mut self, entry: QueryConcept) {
        self.overlay.query_concepts.insert(
            entry.key(),
            Pending {
                component: entry,
                tombstone: false,
            },
        );
    }

    pub fn delete_query_concept(&mut self, entry: QueryConcept) {
        self.overlay.query_concepts.insert(
            entry.key(),
            Pending {
                component: entry,
                tombstone: true,
            },
        );
    }

    pub fn save_description(&mut self, description: Description) {
        self.overlay.descriptions.insert(
            description.key(),
            Pending {
                component: description,
                tombstone: false,
            },
        );
    }

    pub fn delete_description(&mut self, description: Description) {
        self.overlay.descriptions.insert(
            description.key(),
            Pending {
                component: description,
                tombstone: true,
            },
        );
    }
}

/// A hook run synchronously before a commit completes.
///
/// Listeners may mutate the commit (metadata included). Returning an error
/// aborts the commit.
pub trait CommitListener: Send + Sync {
    fn pre_commit_completion(&self, commit: &mut Commit, store: &TermStore)
        -> Result<(), CommitError>;
}

// ============================================================================
// Store data
// ============================================================================

#[derive(Default)]
struct StoreData {
    concepts: VersionedCollection<Concept>,
    relationships: VersionedCollection<Relationship>,
    members: VersionedCollection<ReferenceSetMember>,
    query_concepts: VersionedCollection<QueryConcept>,
    descriptions: VersionedCollection<Description>,
}

impl StoreData {
    fn apply(&mut self, path: &str, timepoint: u64, overlay: CommitOverlay) {
        for (_, pending) in overlay.concepts {
            if pending.tombstone {
                self.concepts.delete(path, timepoint, pending.component);
            } else {
                self.concepts.write(path, timepoint, pending.component);
            }
        }
        for (_, pending) in overlay.relationships {
            if pending.tombstone {
                self.relationships.delete(path, timepoint, pending.component);
            } else {
                self.relationships.write(path, timepoint, pending.component);
            }
        }
        for (_, pending) in overlay.members {
            if pending.tombstone {
                self.members.delete(path, timepoint, pending.component);
            } else {
                self.members.write(path, timepoint, pending.component);
            }
        }
        for (_, pending) in overlay.query_concepts {
            if pending.tombstone {
                self.query_concepts.delete(path, timepoint, pending.component);
            } else {
                self.query_concepts.write(path, timepoint, pending.component);
            }
        }
        for (_, pending) in overlay.descriptions {
            if pending.tombstone {
                self.descriptions.delete(path, timepoint, pending.component);
            } else {
                self.descriptions.write(path, timepoint, pending.component);
            }
        }
    }

    fn promote(&mut self, source_path: &str, target_path: &str, timepoint: u64) {
        self.concepts
            .promote_open_rows(source_path, target_path, timepoint);
        self.relationships
            .promote_open_rows(source_path, target_path, timepoint);
        self.members
            .promote_open_rows(source_path, target_path, timepoint);
        self.query_concepts
            .promote_open_rows(source_path, target_path, timepoint);
        self.descriptions
            .promote_open_rows(source_path, target_path, timepoint);
    }
}

// ============================================================================
// TermStore
// ============================================================================

pub struct TermStore {
    branches: DashMap<String, Branch>,
    data: RwLock<StoreData>,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
    clock: AtomicU64,
}

impl TermStore {
    /// A fresh store with the root branch created.
    pub fn new() -> Self {
        let store = Self {
            branches: DashMap::new(),
            data: RwLock::new(StoreData::default()),
            listeners: RwLock::new(Vec::new()),
            clock: AtomicU64::new(0),
        };
        let timepoint = store.next_timepoint();
        store
            .branches
            .insert(ROOT_PATH.to_owned(), Branch::root(timepoint));
        store
    }

    /// Strictly increasing commit clock, anchored to wall-clock
    /// milliseconds.
    fn next_timepoint(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut previous = self.clock.load(Ordering::SeqCst);
        loop {
            let next = if now > previous { now } else { previous + 1 };
            match self.clock.compare_exchange(
                previous,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(observed) => previous = observed,
            }
        }
    }

    // ========================================================================
    // Branch registry
    // ========================================================================

    pub fn find_branch(&self, path: &str) -> Result<Branch, BranchError> {
        self.branches
            .get(path)
            .map(|entry| entry.clone())
            .ok_or_else(|| BranchError::NotFound(path.to_owned()))
    }

    /// Create a child branch; its base captures the parent's head.
    pub fn create_branch(&self, path: &str) -> Result<Branch, BranchError> {
        if self.branches.contains_key(path) {
            return Err(BranchError::AlreadyExists(path.to_owned()));
        }
        let parent_path =
            parent_path(path).ok_or_else(|| BranchError::NoParent(path.to_owned()))?;
        let parent = self.find_branch(parent_path)?;
        let branch = Branch {
            path: path.to_owned(),
            base_timestamp: parent.head_timestamp,
            head_timestamp: parent.head_timestamp,
            metadata: BranchMetadata::new(),
            ancestor_levels: lineage_of(&parent),
        };
        self.branches.insert(path.to_owned(), branch.clone());
        debug!(path, base = branch.base_timestamp, "branch created");
        Ok(branch)
    }

    /// Persist a replacement metadata map for a branch.
    pub fn update_branch_metadata(
        &self,
        path: &str,
        metadata: BranchMetadata,
    ) -> Result<(), BranchError> {
        let mut branch = self
            .branches
            .get_mut(path)
            .ok_or_else(|| BranchError::NotFound(path.to_owned()))?;
        branch.metadata = metadata;
        Ok(())
    }

    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.listeners.write().push(listener);
    }

    // ========================================================================
    // Criteria construction
    // ========================================================================

    /// Everything visible on the branch at its head.
    pub fn branch_criteria(&self, branch: &Branch) -> BranchCriteria<'static> {
        BranchCriteria::new(lineage_of(branch), ChangeScope::Visible, None)
    }

    /// Components created or modified on the branch and not yet promoted;
    /// deletions excluded.
    pub fn branch_criteria_unpromoted_changes(&self, branch: &Branch) -> BranchCriteria<'static> {
        self.branch_criteria(branch).unpromoted_changes()
    }

    /// As above, deletion tombstones included.
    pub fn branch_criteria_unpromoted_changes_and_deletions(
        &self,
        branch: &Branch,
    ) -> BranchCriteria<'static> {
        self.branch_criteria(branch).unpromoted_changes_and_deletions()
    }

    /// The visible view plus the open commit's uncommitted writes.
    pub fn branch_criteria_including_open_commit<'c>(
        &self,
        commit: &'c Commit,
    ) -> Result<BranchCriteria<'c>, StoreError> {
        let branch = self.find_branch(commit.branch_path())?;
        Ok(BranchCriteria::new(
            lineage_of(&branch),
            ChangeScope::Visible,
            Some(&commit.overlay),
        ))
    }

    // ========================================================================
    // Commits
    // ========================================================================

    pub fn open_commit(&self, branch_path: &str) -> Result<Commit, BranchError> {
        self.open(branch_path, CommitKind::Content)
    }

    pub fn open_rebase_commit(&self, branch_path: &str) -> Result<Commit, BranchError> {
        parent_path(branch_path)
            .ok_or_else(|| BranchError::NoParent(branch_path.to_owned()))?;
        self.open(branch_path, CommitKind::Rebase)
    }

    /// Open the commit that promotes `child_path` into its parent. The
    /// commit belongs to the parent branch, where the content lands.
    pub fn open_promotion_commit(&self, child_path: &str) -> Result<Commit, BranchError> {
        let parent = parent_path(child_path)
            .ok_or_else(|| BranchError::NoParent(child_path.to_owned()))?
            .to_owned();
        self.find_branch(child_path)?;
        self.open(
            &parent,
            CommitKind::Promotion {
                source_path: child_path.to_owned(),
            },
        )
    }

    fn open(&self, branch_path: &str, kind: CommitKind) -> Result<Commit, BranchError> {
        let branch = self.find_branch(branch_path)?;
        Ok(Commit {
            branch_path: branch.path,
            timepoint: self.next_timepoint(),
            kind,
            overlay: CommitOverlay::default(),
            metadata: branch.metadata,
        })
    }

    /// Run the pre-commit listeners, then apply the commit and advance the
    /// branch. A listener error aborts before anything is applied.
    pub fn complete_commit(&self, mut commit: Commit) -> Result<(), CommitError> {
        let listeners: Vec<Arc<dyn CommitListener>> = self.listeners.read().clone();
        for listener in &listeners {
            listener.pre_commit_completion(&mut commit, self)?;
        }

        let Commit {
            branch_path,
            timepoint,
            kind,
            overlay,
            metadata,
        } = commit;

        match kind {
            CommitKind::Content => {
                {
                    let mut data = self.data.write();
                    data.apply(&branch_path, timepoint, overlay);
                }
                let mut branch = self
                    .branches
                    .get_mut(&branch_path)
                    .ok_or_else(|| BranchError::NotFound(branch_path.clone()))?;
                branch.head_timestamp = timepoint;
                branch.metadata = metadata;
            }
            CommitKind::Rebase => {
                let parent_path = parent_path(&branch_path)
                    .ok_or_else(|| BranchError::NoParent(branch_path.clone()))?
                    .to_owned();
                let parent = self.find_branch(&parent_path)?;
                let mut branch = self
                    .branches
                    .get_mut(&branch_path)
                    .ok_or_else(|| BranchError::NotFound(branch_path.clone()))?;
                branch.base_timestamp = parent.head_timestamp;
                branch.ancestor_levels = lineage_of(&parent);
                branch.head_timestamp = timepoint;
                branch.metadata = metadata;
            }
            CommitKind::Promotion { source_path } => {
                {
                    let mut data = self.data.write();
                    data.promote(&source_path, &branch_path, timepoint);
                    data.apply(&branch_path, timepoint, overlay);
                }
                {
                    let mut parent = self
                        .branches
                        .get_mut(&branch_path)
                        .ok_or_else(|| BranchError::NotFound(branch_path.clone()))?;
                    parent.head_timestamp = timepoint;
                    parent.metadata = metadata;
                }
                let parent = self.find_branch(&branch_path)?;
                let mut child = self
                    .branches
                    .get_mut(&source_path)
                    .ok_or_else(|| BranchError::NotFound(source_path.clone()))?;
                child.base_timestamp = timepoint;
                child.head_timestamp = timepoint;
                child.ancestor_levels = lineage_of(&parent);
            }
        }
        debug!(branch = %branch_path, timepoint, "commit completed");
        Ok(())
    }

    /// Rebase a branch onto its parent's current head.
    pub fn rebase(&self, branch_path: &str) -> Result<(), CommitError> {
        let commit = self.open_rebase_commit(branch_path)?;
        self.complete_commit(commit)
    }

    /// Promote a branch's unpromoted changes into its parent.
    pub fn promote(&self, branch_path: &str) -> Result<(), CommitError> {
        let commit = self.open_promotion_commit(branch_path)?;
        self.complete_commit(commit)
    }

    // ========================================================================
    // Streamed queries
    // ========================================================================

    pub fn stream_concepts<'a>(
        &'a self,
        criteria: &'a BranchCriteria<'a>,
        filter: &'a ConceptFilter<'a>,
    ) -> Result<ComponentStream<'a, ConceptId, Concept>, StoreError> {
        let keys = {
            let data = self.data.read();
            data.concepts.matching_keys(
                &criteria.levels,
                criteria.scope,
                criteria.overlay.map(|o| &o.concepts),
                |concept| filter.matches(concept),
            )
        };
        Ok(ComponentStream::new(
            keys,
            Box::new(move |batch| {
                let data = self.data.read();
                batch
                    .iter()
                    .filter_map(|key| {
                        data.concepts
                            .current(
                                &criteria.levels,
                                criteria.scope,
                                criteria.overlay.map(|o| &o.concepts),
                                key,
                            )
                            .filter(|concept| filter.matches(concept))
                            .cloned()
                    })
                    .collect()
            }),
        ))
    }

    /// Identifier-only concept projection: collects the matching concept IDs
    /// without materializing component bodies.
    pub fn concept_id_set(
        &self,
        criteria: &BranchCriteria<'_>,
        filter: &ConceptFilter<'_>,
    ) -> Result<IdSet, StoreError> {
        let data = self.data.read();
        let keys = data.concepts.matching_keys(
            &criteria.levels,
            criteria.scope,
            criteria.overlay.map(|o| &o.concepts),
            |concept| filter.matches(concept),
        );
        Ok(keys.into_iter().collect())
    }

    pub fn stream_relationships<'a>(
        &'a self,
        criteria: &'a BranchCriteria<'a>,
        filter: &'a RelationshipFilter<'a>,
    ) -> Result<ComponentStream<'a, RelationshipId, Relationship>, StoreError> {
        let keys = {
            let data = self.data.read();
            data.relationships.matching_keys(
                &criteria.levels,
                criteria.scope,
                criteria.overlay.map(|o| &o.relationships),
                |relationship| filter.matches(relationship),
            )
        };
        Ok(ComponentStream::new(
            keys,
            Box::new(move |batch| {
                let data = self.data.read();
                batch
                    .iter()
                    .filter_map(|key| {
                        data.relationships
                            .current(
                                &criteria.levels,
                                criteria.scope,
                                criteria.overlay.map(|o| &o.relationships),
                                key,
                            )
                            .filter(|relationship| filter.matches(relationship))
                            .cloned()
                    })
                    .collect()
            }),
        ))
    }

    pub fn stream_members<'a>(
        &'a self,
        criteria: &'a BranchCriteria<'a>,
        filter: &'a MemberFilter<'a>,
    ) -> Result<ComponentStream<'a, String, ReferenceSetMember>, StoreError> {
        let keys = {
            let data = self.data.read();
            data.members.matching_keys(
                &criteria.levels,
                criteria.scope,
                criteria.overlay.map(|o| &o.members),
                |member| filter.matches(member),
            )
        };
        Ok(ComponentStream::new(
            keys,
            Box::new(move |batch| {
                let data = self.data.read();
                batch
                    .iter()
                    .filter_map(|key| {
                        data.members
                            .current(
                                &criteria.levels,
                                criteria.scope,
                                criteria.overlay.map(|o| &o.members),
                                key,
                            )
                            .filter(|member| filter.matches(member))
                            .cloned()
                    })
                    .collect()
            }),
        ))
    }

    pub fn stream_query_concepts<'a>(
        &'a self,
        criteria: &'a BranchCriteria<'a>,
        filter: &'a QueryConceptFilter<'a>,
    ) -> Result<ComponentStream<'a, (ConceptId, bool), QueryConcept>, StoreError> {
        let keys = {
            let data = self.data.read();
            data.query_concepts.matching_keys(
                &criteria.levels,
                criteria.scope,
                criteria.overlay.map(|o| &o.query_concepts),
                |entry| filter.matches(entry),
            )
        };
        Ok(ComponentStream::new(
            keys,
            Box::new(move |batch| {
                let data = self.data.read();
                batch
                    .iter()
                    .filter_map(|key| {
                        data.query_concepts
                            .current(
                                &criteria.levels,
                                criteria.scope,
                                criteria.overlay.map(|o| &o.query_concepts),
                                key,
                            )
                            .filter(|entry| filter.matches(entry))
                            .cloned()
                    })
                    .collect()
            }),
        ))
    }

    pub fn stream_descriptions<'a>(
        &'a self,
        criteria: &'a BranchCriteria<'a>,
        filter: &'a DescriptionFilter<'a>,
    ) -> Result<ComponentStream<'a, u64, Description>, StoreError> {
        let keys = {
            let data = self.data.read();
            data.descriptions.matching_keys(
                &criteria.levels,
                criteria.scope,
                criteria.overlay.map(|o| &o.descriptions),
                |description| filter.matches(description),
            )
        };
        Ok(ComponentStream::new(
            keys,
            Box::new(move |batch| {
                let data = self.data.read();
                batch
                    .iter()
                    .filter_map(|key| {
                        data.descriptions
                            .current(
                                &criteria.levels,
                                criteria.scope,
                                criteria.overlay.map(|o| &o.descriptions),
                                key,
                            )
                            .filter(|description| filter.matches(description))
                            .cloned()
                    })
                    .collect()
            }),
        ))
    }
}

impl Default for TermStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The branch's own head level followed by its ancestor snapshot. Used both
/// as criteria levels and as the lineage a child captures on create/rebase.
fn lineage_of(branch: &Branch) -> Vec<BranchPoint> {
    let mut levels = Vec::with_capacity(branch.ancestor_levels.len() + 1);
    levels.push(BranchPoint {
        path: branch.path.clone(),
        timepoint: branch.head_timestamp,
    });
    levels.extend(branch.ancestor_levels.iter().cloned());
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_concept(store: &TermStore, path: &str, concept: Concept) {
        let mut commit = store.open_commit(path).unwrap();
        commit.save_concept(concept);
        store.complete_commit(commit).unwrap();
    }

    fn visible_concept(store: &TermStore, path: &str, id: ConceptId) -> Option<Concept> {
        let branch = store.find_branch(path).unwrap();
        let criteria = store.branch_criteria(&branch);
        let filter = ConceptFilter::default();
        let result = store
            .stream_concepts(&criteria, &filter)
            .unwrap()
            .find(|c| c.concept_id == id);
        result
    }

    #[test]
    fn child_view_is_frozen_until_rebase() {
        let store = TermStore::new();
        commit_concept(&store, ROOT_PATH, Concept::new(1, 0));
        store.create_branch("MAIN/projectA").unwrap();

        // Parent moves on after the branch was created.
        commit_concept(&store, ROOT_PATH, Concept::new(1, 0).inactivated());

        assert!(visible_concept(&store, "MAIN/projectA", 1).unwrap().active);
        assert!(!visible_concept(&store, ROOT_PATH, 1).unwrap().active);

        store.rebase("MAIN/projectA").unwrap();
        assert!(!visible_concept(&store, "MAIN/projectA", 1).unwrap().active);
    }

    #[test]
    fn unpromoted_scope_tracks_branch_changes_only() {
        let store = TermStore::new();
        commit_concept(&store, ROOT_PATH, Concept::new(1, 0));
        store.create_branch("MAIN/projectA").unwrap();
        commit_concept(&store, "MAIN/projectA", Concept::new(2, 0));

        let branch = store.find_branch("MAIN/projectA").unwrap();
        let criteria = store.branch_criteria_unpromoted_changes(&branch);
        let filter = ConceptFilter::default();
        let changed: Vec<ConceptId> = store
            .stream_concepts(&criteria, &filter)
            .unwrap()
            .map(|c| c.concept_id)
            .collect();
        assert_eq!(changed, vec![2]);
    }

    #[test]
    fn deletion_appears_only_in_deletion_scope() {
        let store = TermStore::new();
        commit_concept(&store, ROOT_PATH, Concept::new(1, 0));
        store.create_branch("MAIN/projectA").unwrap();

        let mut commit = store.open_commit("MAIN/projectA").unwrap();
        commit.delete_concept(Concept::new(1, 0));
        store.complete_commit(commit).unwrap();

        let branch = store.find_branch("MAIN/projectA").unwrap();

        let changes = store.branch_criteria_unpromoted_changes(&branch);
        let filter = ConceptFilter::default();
        assert_eq!(store.stream_concepts(&changes, &filter).unwrap().count(), 0);

        let with_deletions = store.branch_criteria_unpromoted_changes_and_deletions(&branch);
        assert_eq!(
            store
                .stream_concepts(&with_deletions, &filter)
                .unwrap()
                .count(),
            1
        );

        assert!(visible_concept(&store, "MAIN/projectA", 1).is_none());
        assert!(visible_concept(&store, ROOT_PATH, 1).is_some());
    }

    #[test]
    fn promotion_publishes_and_clears_unpromoted_set() {
        let store = TermStore::new();
        store.create_branch("MAIN/projectA").unwrap();
        commit_concept(&store, "MAIN/projectA", Concept::new(5, 0));

        assert!(visible_concept(&store, ROOT_PATH, 5).is_none());
        store.promote("MAIN/projectA").unwrap();
        assert!(visible_concept(&store, ROOT_PATH, 5).is_some());
        assert!(visible_concept(&store, "MAIN/projectA", 5).is_some());

        let branch = store.find_branch("MAIN/projectA").unwrap();
        let criteria = store.branch_criteria_unpromoted_changes(&branch);
        let filter = ConceptFilter::default();
        assert_eq!(store.stream_concepts(&criteria, &filter).unwrap().count(), 0);
    }

    #[test]
    fn sibling_branches_are_isolated() {
        let store = TermStore::new();
        store.create_branch("MAIN/projectA").unwrap();
        store.create_branch("MAIN/projectB").unwrap();
        commit_concept(&store, "MAIN/projectA", Concept::new(7, 0));

        assert!(visible_concept(&store, "MAIN/projectA", 7).is_some());
        assert!(visible_concept(&store, "MAIN/projectB", 7).is_none());

        store.promote("MAIN/projectA").unwrap();
        // The sibling still does not see it until it rebases.
        assert!(visible_concept(&store, "MAIN/projectB", 7).is_none());
        store.rebase("MAIN/projectB").unwrap();
        assert!(visible_concept(&store, "MAIN/projectB", 7).is_some());
    }

    #[test]
    fn open_commit_overlay_is_visible_through_commit_criteria() {
        let store = TermStore::new();
        commit_concept(&store, ROOT_PATH, Concept::new(1, 0));
        store.create_branch("MAIN/projectA").unwrap();

        let mut commit = store.open_commit("MAIN/projectA").unwrap();
        commit.save_concept(Concept::new(1, 0).inactivated());
        commit.save_concept(Concept::new(2, 0));

        let with_commit = store.branch_criteria_including_open_commit(&commit).unwrap();
        let filter = ConceptFilter::active();
        let active: Vec<ConceptId> = store
            .stream_concepts(&with_commit, &filter)
            .unwrap()
            .map(|c| c.concept_id)
            .collect();
        assert_eq!(active, vec![2]);

        // Plain visible criteria still see the committed state.
        assert!(visible_concept(&store, "MAIN/projectA", 1).unwrap().active);
    }

    #[test]
    fn listener_error_aborts_commit() {
        struct Reject;
        impl CommitListener for Reject {
            fn pre_commit_completion(
                &self,
                _commit: &mut Commit,
                _store: &TermStore,
            ) -> Result<(), CommitError> {
                Err(CommitError::Rejected("no".to_owned()))
            }
        }

        let store = TermStore::new();
        store.add_commit_listener(Arc::new(Reject));
        let mut commit = store.open_commit(ROOT_PATH).unwrap();
        commit.save_concept(Concept::new(1, 0));
        assert!(store.complete_commit(commit).is_err());
        assert!(visible_concept(&store, ROOT_PATH, 1).is_none());
    }

    #[test]
    fn listener_metadata_mutation_is_persisted() {
        struct Flagger;
        impl CommitListener for Flagger {
            fn pre_commit_completion(
                &self,
                commit: &mut Commit,
                _store: &TermStore,
            ) -> Result<(), CommitError> {
                commit.metadata_mut().set_internal("touched", "true");
                Ok(())
            }
        }

        let store = TermStore::new();
        store.add_commit_listener(Arc::new(Flagger));
        let commit = store.open_commit(ROOT_PATH).unwrap();
        store.complete_commit(commit).unwrap();

        let branch = store.find_branch(ROOT_PATH).unwrap();
        assert_eq!(branch.metadata.internal_value("touched"), Some("true"));
    }
}
