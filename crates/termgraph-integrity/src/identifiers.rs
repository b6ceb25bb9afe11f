//! Fixed concept identifiers the checker filters on.
//!
//! These are data values of the terminology, not constants of the
//! implementation: an extension or test fixture may wire in different ones.

use termgraph_store::ConceptId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identifiers {
    /// Characteristic type marking classifier-produced relationships.
    pub inferred_characteristic_type: ConceptId,
    /// The OWL axiom reference set.
    pub owl_axiom_refset: ConceptId,
    /// The hierarchy root concept, the top every fixture hangs off.
    pub root_concept: ConceptId,
}

impl Identifiers {
    /// The identifiers of the International Edition.
    pub const fn snomed() -> Self {
        Self {
            inferred_characteristic_type: 900_000_000_000_011_006,
            owl_axiom_refset: 733_073_007,
            root_concept: 138_875_005,
        }
    }
}
