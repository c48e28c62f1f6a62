//! Subject–predicate–object assertions
//!
//! Assertions are the derived, never-authoritative representation of the tree
//! kept by the graph mirror. Subjects and predicates are always absolute IRIs;
//! objects are either IRIs (references to other nodes or vocabulary terms) or
//! literals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object position of an assertion
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "termType", rename_all = "camelCase")]
pub enum Term {
    /// Reference by absolute IRI
    Iri { value: String },
    /// Literal value with optional datatype IRI or language tag
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }

    /// Plain string literal
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    /// Lexical value regardless of term type
    pub fn value(&self) -> &str {
        match self {
            Term::Iri { value } | Term::Literal { value, .. } => value,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri { value } => Some(value),
            Term::Literal { .. } => None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri { .. })
    }
}

/// One subject–predicate–object fact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assertion {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Assertion {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Term::Iri { value } => write!(f, "<{}> <{}> <{}>", self.subject, self.predicate, value),
            Term::Literal { value, .. } => {
                write!(f, "<{}> <{}> {:?}", self.subject, self.predicate, value)
            }
        }
    }
}
