//! termgraph-integrity: referential integrity checking for the terminology
//! graph.
//!
//! An *integrity issue* is an active component whose referenced concept is
//! missing or inactive on the same branch: a relationship whose source,
//! type or destination went away, or an OWL axiom whose class expression
//! mentions a concept that did. This crate finds them:
//!
//! - [`IntegrityChecker`]: the full, changed-only and fix-task
//!   differential check algorithms, plus the semantic-index orphan probe
//! - [`IntegrityReport`]: the four-map result, empty maps omitted when
//!   serialized
//! - [`IntegrityCommitHook`]: the pre-commit listener that clears a
//!   branch's `internal.integrityIssue` flag once a commit leaves the
//!   branch clean
//! - [`DescriptionService`]: the seam through which report descriptors
//!   pick up display terms
//!
//! The checker borrows the store and its collaborators; fixed terminology
//! identifiers are wired in through [`Identifiers`]. Checks return a
//! complete report or an error, never both; the commit hook is the single
//! place where errors are logged and swallowed instead.

pub mod checker;
pub mod descriptions;
pub mod hook;
pub mod identifiers;
pub mod probe;
pub mod report;
pub mod timer;

pub use checker::{IntegrityChecker, IntegrityError, INTEGRITY_ISSUE_METADATA_KEY};
pub use descriptions::{DescriptionService, NoDescriptions, StoreDescriptionService};
pub use hook::IntegrityCommitHook;
pub use identifiers::Identifiers;
pub use report::{ConceptSummary, ConceptsInForm, IntegrityReport};
pub use timer::Timer;
