//! Property tests for the check algorithms.
//!
//! Small random branch states are compared against brute-force oracles:
//!
//! 1. Soundness: every reported concept is outside the active set.
//! 2. Completeness: the full-check report equals the brute-force
//!    set-difference result (relationships exactly; axioms through the
//!    two-stage semantic-index prefilter, which is part of the contract).
//! 3. Axiom round-trip: recorded offending sets equal parsed references
//!    intersected with the inactive set.
//! 4. Concrete rule: concrete relationships never show up in the
//!    destination map.
//! 5. Changed-only monotonicity: a clean branch stays clean across a
//!    no-op rebase.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use termgraph_integrity::{Identifiers, IntegrityChecker, NoDescriptions};
use termgraph_owl::referenced_concepts;
use termgraph_store::{
    Concept, QueryConcept, ReferenceSetMember, Relationship, TermStore, ROOT_PATH,
};

const IDS: Identifiers = Identifiers::snomed();
const ISA: u64 = 116680003;
const STATED: u64 = 900000000000010007;
const CONCEPT_COUNT: usize = 8;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
struct RelSpec {
    source: u64,
    type_id: u64,
    /// `None` makes the relationship concrete.
    destination: Option<u64>,
    inferred: bool,
    active: bool,
}

#[derive(Debug, Clone)]
struct AxiomSpec {
    subject: u64,
    referenced: Vec<u64>,
    active: bool,
}

/// Concept IDs 1..=8 exist with random activity; endpoints are sampled from
/// 1..=10 so some references dangle entirely.
fn universe_strategy() -> impl Strategy<Value = (Vec<bool>, Vec<RelSpec>, Vec<AxiomSpec>)> {
    let relationships = prop::collection::vec(
        (
            1u64..=10,
            1u64..=10,
            prop_oneof![3 => (1u64..=10).prop_map(Some), 1 => Just(None)],
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(source, type_id, destination, inferred, active)| RelSpec {
                source,
                type_id,
                destination,
                inferred,
                active,
            }),
        0..12,
    );
    let axioms = prop::collection::vec(
        (
            1u64..=CONCEPT_COUNT as u64,
            prop::collection::vec(1u64..=10, 1..4),
            any::<bool>(),
        )
            .prop_map(|(subject, referenced, active)| AxiomSpec {
                subject,
                referenced,
                active,
            }),
        0..6,
    );
    (
        prop::collection::vec(any::<bool>(), CONCEPT_COUNT),
        relationships,
        axioms,
    )
}

fn expression_for(axiom: &AxiomSpec) -> String {
    let body = axiom
        .referenced
        .iter()
        .map(|id| format!(":{id}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "SubClassOf(:{} ObjectIntersectionOf({body}))",
        axiom.subject
    )
}

/// Commit the generated universe on MAIN, mirroring active axioms into the
/// stated semantic index the way the index updater would.
fn build_store(
    active_flags: &[bool],
    relationships: &[RelSpec],
    axioms: &[AxiomSpec],
) -> (TermStore, Vec<(String, AxiomSpec)>) {
    let store = TermStore::new();
    let mut commit = store.open_commit(ROOT_PATH).unwrap();

    for (index, &active) in active_flags.iter().enumerate() {
        let mut concept = Concept::new(index as u64 + 1, 0);
        concept.active = active;
        commit.save_concept(concept);
    }

    for (index, spec) in relationships.iter().enumerate() {
        let id = 500 + index as u64;
        let characteristic = if spec.inferred {
            IDS.inferred_characteristic_type
        } else {
            STATED
        };
        let mut relationship = match spec.destination {
            Some(destination) => {
                Relationship::new(id, spec.source, spec.type_id, destination, characteristic)
            }
            None => Relationship::concrete(id, spec.source, spec.type_id, "#1", characteristic),
        };
        relationship.active = spec.active;
        commit.save_relationship(relationship);
    }

    let mut members = Vec::new();
    let mut index_rows: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    for spec in axioms {
        let mut member =
            ReferenceSetMember::new_axiom(IDS.owl_axiom_refset, spec.subject, expression_for(spec));
        member.active = spec.active;
        if spec.active {
            index_rows
                .entry(spec.subject)
                .or_default()
                .extend(spec.referenced.iter().copied());
        }
        members.push((member.member_id.clone(), spec.clone()));
        commit.save_member(member);
    }
    for (subject, attribute_values) in index_rows {
        let entry = attribute_values
            .into_iter()
            .fold(QueryConcept::new(subject, true), |entry, value| {
                entry.with_attribute(ISA, value)
            });
        commit.save_query_concept(entry);
    }

    store.complete_commit(commit).unwrap();
    (store, members)
}

// ============================================================================
// Oracles
// ============================================================================

struct Oracle {
    active: BTreeSet<u64>,
    source: BTreeMap<u64, u64>,
    type_: BTreeMap<u64, u64>,
    destination: BTreeMap<u64, u64>,
    axioms: BTreeMap<String, BTreeSet<u64>>,
}

fn brute_force(
    active_flags: &[bool],
    relationships: &[RelSpec],
    members: &[(String, AxiomSpec)],
) -> Oracle {
    let active: BTreeSet<u64> = active_flags
        .iter()
        .enumerate()
        .filter(|(_, &flag)| flag)
        .map(|(index, _)| index as u64 + 1)
        .collect();

    let mut source = BTreeMap::new();
    let mut type_ = BTreeMap::new();
    let mut destination = BTreeMap::new();
    for (index, spec) in relationships.iter().enumerate() {
        if !spec.active || spec.inferred {
            continue;
        }
        let id = 500 + index as u64;
        if !active.contains(&spec.source) {
            source.insert(id, spec.source);
        }
        if !active.contains(&spec.type_id) {
            type_.insert(id, spec.type_id);
        }
        if let Some(dest) = spec.destination {
            if !active.contains(&dest) {
                destination.insert(id, dest);
            }
        }
    }

    // The semantic index only carries attribute values, so a subject is a
    // candidate when some *referenced* concept is outside the active set.
    let mut candidates: BTreeSet<u64> = BTreeSet::new();
    for (_, spec) in members {
        if spec.active && spec.referenced.iter().any(|id| !active.contains(id)) {
            candidates.insert(spec.subject);
        }
    }
    let mut axioms = BTreeMap::new();
    for (member_id, spec) in members {
        if !spec.active || !candidates.contains(&spec.subject) {
            continue;
        }
        let mut bad: BTreeSet<u64> = spec
            .referenced
            .iter()
            .copied()
            .filter(|id| !active.contains(id))
            .collect();
        if !active.contains(&spec.subject) {
            bad.insert(spec.subject);
        }
        if !bad.is_empty() {
            axioms.insert(member_id.clone(), bad);
        }
    }

    Oracle {
        active,
        source,
        type_,
        destination,
        axioms,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn full_check_matches_the_brute_force_oracle(
        (active_flags, relationships, axioms) in universe_strategy(),
    ) {
        let (store, members) = build_store(&active_flags, &relationships, &axioms);
        let oracle = brute_force(&active_flags, &relationships, &members);

        let checker = IntegrityChecker::new(&store, &NoDescriptions, IDS);
        let root = store.find_branch(ROOT_PATH).unwrap();
        let report = checker.find_all_components_with_bad_integrity(&root, true).unwrap();

        // Completeness and soundness in one: exact equality per map.
        prop_assert_eq!(
            report.relationships_with_missing_or_inactive_source.clone().unwrap_or_default(),
            oracle.source
        );
        prop_assert_eq!(
            report.relationships_with_missing_or_inactive_type.clone().unwrap_or_default(),
            oracle.type_
        );
        prop_assert_eq!(
            report.relationships_with_missing_or_inactive_destination.clone().unwrap_or_default(),
            oracle.destination
        );

        let reported_axioms = report
            .axioms_with_missing_or_inactive_referenced_concept
            .clone()
            .unwrap_or_default();
        let reported_sets: BTreeMap<String, BTreeSet<u64>> = reported_axioms
            .iter()
            .map(|(id, summary)| (id.clone(), summary.missing_or_inactive_concepts.clone()))
            .collect();
        prop_assert_eq!(reported_sets, oracle.axioms);

        // Soundness restated: nothing reported is active.
        for summary in reported_axioms.values() {
            for concept in &summary.missing_or_inactive_concepts {
                prop_assert!(!oracle.active.contains(concept));
            }
        }

        // Concrete relationships never appear in the destination map.
        if let Some(map) = &report.relationships_with_missing_or_inactive_destination {
            for id in map.keys() {
                let spec = &relationships[(*id - 500) as usize];
                prop_assert!(spec.destination.is_some());
            }
        }

        // Axiom round-trip: recorded set == parsed references minus actives.
        for (member_id, spec) in &members {
            if let Some(summary) = reported_axioms.get(member_id) {
                let parsed = referenced_concepts(&expression_for(spec)).unwrap();
                let expected: BTreeSet<u64> = parsed
                    .into_iter()
                    .filter(|id| !oracle.active.contains(id))
                    .collect();
                prop_assert_eq!(&summary.missing_or_inactive_concepts, &expected);
            }
        }
    }

    #[test]
    fn clean_branches_stay_clean_across_a_noop_rebase(
        touched in prop::collection::btree_set(1u64..=6, 1..4),
        extra_relationships in prop::collection::vec((1u64..=6, 1u64..=6, 1u64..=6), 0..4),
    ) {
        let store = TermStore::new();
        let mut commit = store.open_commit(ROOT_PATH).unwrap();
        for id in 1u64..=6 {
            commit.save_concept(Concept::new(id, 0));
        }
        store.complete_commit(commit).unwrap();
        store.create_branch("MAIN/projectA").unwrap();

        // Inactivate some concepts, then repair them again, and add
        // relationships that only reference existing active concepts: the
        // branch ends up clean.
        let mut commit = store.open_commit("MAIN/projectA").unwrap();
        for &id in &touched {
            commit.save_concept(Concept::new(id, 0).inactivated());
        }
        store.complete_commit(commit).unwrap();
        let mut commit = store.open_commit("MAIN/projectA").unwrap();
        for &id in &touched {
            commit.save_concept(Concept::new(id, 0));
        }
        for (index, &(source, type_id, destination)) in extra_relationships.iter().enumerate() {
            commit.save_relationship(Relationship::new(
                600 + index as u64,
                source,
                type_id,
                destination,
                STATED,
            ));
        }
        store.complete_commit(commit).unwrap();

        let checker = IntegrityChecker::new(&store, &NoDescriptions, IDS);
        let branch = store.find_branch("MAIN/projectA").unwrap();
        let before = checker.find_changed_components_with_bad_integrity(&branch).unwrap();
        prop_assert!(before.is_empty());

        store.rebase("MAIN/projectA").unwrap();
        let branch = store.find_branch("MAIN/projectA").unwrap();
        let after = checker.find_changed_components_with_bad_integrity(&branch).unwrap();
        prop_assert!(after.is_empty());
    }
}
