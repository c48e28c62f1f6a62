//! Text writers
//!
//! Two forms of the same statements, both written by `oxttl`:
//!
//! - **Turtle** for storage: the four vocabulary prefixes, then statements
//!   grouped by subject with vocabulary IRIs shortened to prefixed names
//! - **N-Triples** for transfer to the worker: absolute IRIs only, one
//!   statement per line
//!
//! Statements are written in the order given; callers pass sorted snapshots
//! so output is deterministic. An assertion that is not valid RDF (an IRI
//! that does not parse, a malformed language tag) fails the write instead of
//! being dropped.

use crate::graph::Namespaces;
use crate::models::{Assertion, Term};
use crate::serialization::PipelineError;
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, Subject, Triple};
use oxttl::ntriples::NTriplesSerializer;
use oxttl::turtle::{LowLevelTurtleSerializer, TurtleSerializer};
use std::fmt;

fn invalid(assertion: &Assertion, error: impl fmt::Display) -> PipelineError {
    PipelineError::serialization(format!("cannot write {}: {}", assertion, error))
}

fn named_node(assertion: &Assertion, iri: &str) -> Result<NamedNode, PipelineError> {
    NamedNode::new(iri).map_err(|e| invalid(assertion, format!("<{}> {}", iri, e)))
}

/// Convert an assertion to an `oxrdf` triple, validating every IRI
pub fn to_triple(assertion: &Assertion) -> Result<Triple, PipelineError> {
    let subject = named_node(assertion, &assertion.subject)?;
    let predicate = named_node(assertion, &assertion.predicate)?;
    let object: oxrdf::Term = match &assertion.object {
        Term::Iri { value } => named_node(assertion, value)?.into(),
        Term::Literal {
            value,
            language: Some(language),
            ..
        } => Literal::new_language_tagged_literal(value.as_str(), language.as_str())
            .map_err(|e| invalid(assertion, e))?
            .into(),
        Term::Literal {
            value,
            datatype: Some(datatype),
            ..
        } => Literal::new_typed_literal(value.as_str(), named_node(assertion, datatype)?).into(),
        Term::Literal { value, .. } => Literal::new_simple_literal(value.as_str()).into(),
    };
    Ok(Triple::new(subject, predicate, object))
}

/// Convert a parsed triple back to an assertion
///
/// Blank nodes and quoted triples have no place in the model and are refused.
pub fn from_triple(triple: Triple) -> Result<Assertion, String> {
    let subject = match triple.subject {
        Subject::NamedNode(node) => node.into_string(),
        other => return Err(format!("unsupported subject {}", other)),
    };
    let object = match triple.object {
        oxrdf::Term::NamedNode(node) => Term::iri(node.into_string()),
        oxrdf::Term::Literal(literal) => from_literal(&literal),
        other => return Err(format!("unsupported object {}", other)),
    };
    Ok(Assertion::new(subject, triple.predicate.into_string(), object))
}

fn from_literal(literal: &Literal) -> Term {
    if let Some(language) = literal.language() {
        Term::Literal {
            value: literal.value().to_string(),
            datatype: None,
            language: Some(language.to_string()),
        }
    } else if literal.datatype() == xsd::STRING {
        Term::literal(literal.value())
    } else {
        Term::typed(literal.value(), literal.datatype().as_str())
    }
}

fn io_error(e: std::io::Error) -> PipelineError {
    PipelineError::serialization(format!("write failed: {}", e))
}

fn into_text(out: Vec<u8>) -> Result<String, PipelineError> {
    String::from_utf8(out).map_err(|e| PipelineError::serialization(e.to_string()))
}

/// Incremental Turtle writer
///
/// Used by the serialization job to assemble text a batch at a time.
pub struct TurtleWriter {
    writer: LowLevelTurtleSerializer,
    out: Vec<u8>,
}

impl TurtleWriter {
    pub fn new(namespaces: &Namespaces) -> Result<Self, PipelineError> {
        Self::with_capacity(namespaces, 0)
    }

    pub fn with_capacity(namespaces: &Namespaces, statements: usize) -> Result<Self, PipelineError> {
        let mut serializer = TurtleSerializer::new();
        for (prefix, namespace) in namespaces.prefixes() {
            serializer = serializer.with_prefix(*prefix, *namespace).map_err(|e| {
                PipelineError::serialization(format!("invalid namespace for '{}': {}", prefix, e))
            })?;
        }
        Ok(Self {
            writer: serializer.low_level(),
            out: Vec::with_capacity(statements * 64),
        })
    }

    pub fn write(&mut self, assertion: &Assertion) -> Result<(), PipelineError> {
        let triple = to_triple(assertion)?;
        self.writer.serialize_triple(&triple, &mut self.out).map_err(io_error)
    }

    pub fn finish(self) -> Result<String, PipelineError> {
        let Self { mut writer, mut out } = self;
        writer.finish(&mut out).map_err(io_error)?;
        into_text(out)
    }
}

/// Write a complete Turtle document
pub fn write_turtle(assertions: &[Assertion], namespaces: &Namespaces) -> Result<String, PipelineError> {
    let mut writer = TurtleWriter::with_capacity(namespaces, assertions.len())?;
    for assertion in assertions {
        writer.write(assertion)?;
    }
    writer.finish()
}

/// Write one N-Triples statement per assertion
pub fn write_ntriples(assertions: &[Assertion]) -> Result<String, PipelineError> {
    let mut writer = NTriplesSerializer::new().low_level();
    let mut out = Vec::with_capacity(assertions.len() * 128);
    for assertion in assertions {
        let triple = to_triple(assertion)?;
        writer.serialize_triple(&triple, &mut out).map_err(io_error)?;
    }
    into_text(out)
}
