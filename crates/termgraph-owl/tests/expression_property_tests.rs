//! Property tests for the OWL expression parser.
//!
//! 1. The parser never panics, whatever bytes arrive.
//! 2. For generated well-formed expressions, extraction returns exactly the
//!    concept identifiers the generator planted.

use std::collections::BTreeSet;

use proptest::prelude::*;
use termgraph_owl::{referenced_concepts, ConceptId};

// ============================================================================
// Strategies
// ============================================================================

fn concept_id_strategy() -> impl Strategy<Value = ConceptId> {
    1u64..=900_000_000_000_000_000
}

#[derive(Debug, Clone)]
enum GeneratedNode {
    Concept(ConceptId),
    LongConcept(ConceptId),
    Literal(String),
    Constructor(String, Vec<GeneratedNode>),
}

fn leaf_strategy() -> impl Strategy<Value = GeneratedNode> {
    prop_oneof![
        concept_id_strategy().prop_map(GeneratedNode::Concept),
        concept_id_strategy().prop_map(GeneratedNode::LongConcept),
        "[A-Za-z0-9 ]{0,12}".prop_map(GeneratedNode::Literal),
    ]
}

fn node_strategy() -> impl Strategy<Value = GeneratedNode> {
    leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        (
            prop_oneof![
                Just("ObjectIntersectionOf".to_owned()),
                Just("ObjectUnionOf".to_owned()),
                Just("ObjectSomeValuesFrom".to_owned()),
            ],
            prop::collection::vec(inner, 1..4),
        )
            .prop_map(|(name, children)| GeneratedNode::Constructor(name, children))
    })
}

fn render(node: &GeneratedNode, out: &mut String, expected: &mut BTreeSet<ConceptId>) {
    match node {
        GeneratedNode::Concept(id) => {
            expected.insert(*id);
            out.push(':');
            out.push_str(&id.to_string());
        }
        GeneratedNode::LongConcept(id) => {
            expected.insert(*id);
            out.push_str("<http://snomed.info/id/");
            out.push_str(&id.to_string());
            out.push('>');
        }
        GeneratedNode::Literal(text) => {
            out.push('"');
            out.push_str(text);
            out.push_str("\"^^xsd:string");
        }
        GeneratedNode::Constructor(name, children) => {
            out.push_str(name);
            out.push('(');
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                render(child, out, expected);
            }
            out.push(')');
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn parser_never_panics(input in "\\PC{0,200}") {
        let _ = referenced_concepts(&input);
    }

    #[test]
    fn extraction_matches_generated_references(
        subject in concept_id_strategy(),
        body in node_strategy(),
    ) {
        let mut expression = String::from("SubClassOf(");
        let mut expected = BTreeSet::new();
        expected.insert(subject);
        expression.push(':');
        expression.push_str(&subject.to_string());
        expression.push(' ');
        render(&body, &mut expression, &mut expected);
        expression.push(')');

        let parsed = referenced_concepts(&expression).expect("generated expression parses");
        prop_assert_eq!(parsed, expected);
    }
}
