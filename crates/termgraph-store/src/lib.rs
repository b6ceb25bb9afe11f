//! termgraph-store: branching versioned storage for a terminology graph.
//!
//! The store keeps concepts, relationships, OWL axiom reference-set members,
//! semantic-index entries and descriptions as branch-scoped version chains,
//! and answers visibility questions through opaque [`BranchCriteria`]
//! predicates:
//!
//! - `visible`: the branch at its head, resolving through its ancestor
//!   lineage snapshot
//! - `unpromoted_changes` / `unpromoted_changes_and_deletions`: only the
//!   branch's own not-yet-promoted rows
//! - `including_open_commit`: the visible view overlaid with an in-flight
//!   commit's buffered writes
//!
//! Branches form a path tree rooted at `MAIN`. Rebase advances a branch's
//! base to its parent's head; promotion republishes a branch's open rows on
//! the parent. Pre-commit listeners run synchronously inside
//! [`TermStore::complete_commit`] and may mutate the committing branch's
//! metadata.
//!
//! Identifier universes are large, so query results stream in pages and the
//! identifier-set type is a 64-bit roaring bitmap ([`IdSet`]).
//!
//! The semantic index ([`QueryConcept`]) is *stored* here but *maintained*
//! elsewhere; consumers must treat it as a potentially stale prefilter.

pub mod branch;
pub mod component;
pub mod criteria;
pub mod ids;
pub mod store;
pub mod stream;
mod versioned;

pub use branch::{
    parent_path, Branch, BranchError, BranchMetadata, BranchPoint, MetadataValue,
    INTERNAL_METADATA_KEY, ROOT_PATH,
};
pub use component::{
    Component, Concept, Description, DescriptionType, QueryConcept, ReferenceSetMember,
    Relationship,
};
pub use criteria::{
    BranchCriteria, ChangeScope, CharacteristicFilter, ConceptFilter, DescriptionFilter,
    MemberFilter, QueryConceptFilter, RelationshipFilter,
};
pub use ids::{ConceptId, IdSet, RelationshipId};
pub use store::{
    Commit, CommitError, CommitKind, CommitListener, CommitOverlay, StoreError, TermStore,
};
pub use stream::{ComponentStream, LARGE_PAGE};
