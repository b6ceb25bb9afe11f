//! OWL functional-syntax class-expression parsing.
//!
//! Axiom reference-set members carry their class expression as a
//! functional-style OWL string, e.g.
//!
//! ```text
//! SubClassOf(:73211009 ObjectIntersectionOf(:404684003
//!     ObjectSomeValuesFrom(:363698007 :113331007)))
//! ```
//!
//! The one question the integrity core asks of such a string is: *which
//! concepts does it reference?* [`referenced_concepts`] answers it with the
//! deduplicated set of SNOMED concept identifiers found anywhere in the
//! expression, header subject and body alike. Everything that is not a
//! concept reference contributes nothing: constructor keywords, cardinality
//! numbers, literals (`"2.5"^^xsd:decimal`), datatype names and IRIs of
//! other hosts.
//!
//! Parsing is pure and deterministic. Malformed input raises
//! [`OwlParseError`]; the caller decides how to surface it.

use std::collections::BTreeSet;

use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag, take_while1};
use nom::character::complete::{char as pchar, digit1, multispace0, one_of};
use nom::combinator::{all_consuming, map, map_res, opt, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;
use thiserror::Error;

/// A SNOMED CT concept identifier.
pub type ConceptId = u64;

/// Host prefix of long-form SNOMED concept IRIs.
const SNOMED_IRI_PREFIX: &str = "http://snomed.info/id/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwlParseError {
    #[error("empty OWL expression")]
    Empty,
    #[error("invalid OWL expression near offset {offset}: {kind}")]
    Syntax { offset: usize, kind: String },
}

/// Extract the set of concept identifiers referenced by a functional-syntax
/// OWL class expression.
pub fn referenced_concepts(expression: &str) -> Result<BTreeSet<ConceptId>, OwlParseError> {
    if expression.trim().is_empty() {
        return Err(OwlParseError::Empty);
    }
    match all_consuming(delimited(multispace0, constructor, multispace0))(expression) {
        Ok((_, ids)) => Ok(ids.into_iter().collect()),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(OwlParseError::Syntax {
            offset: expression.len() - e.input.len(),
            kind: e.code.description().to_owned(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(OwlParseError::Syntax {
            offset: expression.len(),
            kind: "incomplete input".to_owned(),
        }),
    }
}

// ============================================================================
// Grammar
// ============================================================================
//
// node        := concept-iri | long-iri | literal | constructor
//              | prefixed-name | name
// constructor := name '(' node* ')'
// concept-iri := ':' digits
// long-iri    := '<' ... '>'            (concept only when on the SNOMED host)
// literal     := '"' chars '"' ('^^' datatype | '@' langtag)?

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')(input)
}

/// A default-prefix concept reference: `:73211009`.
fn concept_iri(input: &str) -> IResult<&str, Vec<ConceptId>> {
    map_res(preceded(pchar(':'), digit1), |digits: &str| {
        digits.parse::<ConceptId>().map(|id| vec![id])
    })(input)
}

/// A full IRI. Only IRIs on the SNOMED host reference concepts; anything
/// else (annotation vocabularies, datatypes) is skipped.
fn long_iri(input: &str) -> IResult<&str, Vec<ConceptId>> {
    let (rest, body) = delimited(pchar('<'), is_not(">"), pchar('>'))(input)?;
    let ids = body
        .strip_prefix(SNOMED_IRI_PREFIX)
        .and_then(|tail| tail.parse::<ConceptId>().ok())
        .map(|id| vec![id])
        .unwrap_or_default();
    Ok((rest, ids))
}

/// A prefixed non-default name such as `xsd:decimal`. Never a concept.
fn prefixed_name(input: &str) -> IResult<&str, &str> {
    recognize(tuple((name, pchar(':'), name)))(input)
}

/// A quoted literal with optional datatype or language tag, as carried by
/// concrete-value constructs like `DataHasValue(:3264475007 "2.5"^^xsd:decimal)`.
fn literal(input: &str) -> IResult<&str, Vec<ConceptId>> {
    let (rest, _) = delimited(
        pchar('"'),
        opt(escaped(is_not("\\\""), '\\', one_of("\"\\tnr"))),
        pchar('"'),
    )(input)?;
    let (rest, _) = opt(alt((
        recognize(preceded(tag("^^"), datatype_reference)),
        recognize(pair(
            pchar('@'),
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-'),
        )),
    )))(rest)?;
    Ok((rest, Vec::new()))
}

fn datatype_reference(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((pchar('<'), is_not(">"), pchar('>')))),
        prefixed_name,
    ))(input)
}

/// A constructor call: `Name(node*)`. This is the only shape a whole axiom
/// expression may take.
fn constructor(input: &str) -> IResult<&str, Vec<ConceptId>> {
    let (rest, _name) = name(input)?;
    let (rest, children) = delimited(
        preceded(multispace0, pchar('(')),
        many0(preceded(multispace0, node)),
        preceded(multispace0, pchar(')')),
    )(rest)?;
    Ok((rest, children.into_iter().flatten().collect()))
}

fn node(input: &str) -> IResult<&str, Vec<ConceptId>> {
    alt((
        concept_iri,
        long_iri,
        literal,
        constructor,
        map(prefixed_name, |_| Vec::new()),
        // Bare names: cardinality numbers and keyword tokens.
        map(name, |_| Vec::new()),
    ))(input)
}
