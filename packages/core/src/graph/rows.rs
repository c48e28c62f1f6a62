//! Fold assertions back into flat node rows
//!
//! The inverse of the mirror: group assertions by subject and read the known
//! predicates into a `NodeRow`. Subjects without a recognised `rdf:type` are
//! not nodes and are skipped; malformed values drop just that field.

use crate::graph::namespaces::*;
use crate::models::{Assertion, NodeKind, NodeRow, Term};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Group assertions by subject and convert each node subject to a row
///
/// Rows come back ordered by subject IRI.
pub fn rows_from_assertions(assertions: &[Assertion], namespaces: &Namespaces) -> Vec<NodeRow> {
    let mut by_subject: BTreeMap<&str, Vec<&Assertion>> = BTreeMap::new();
    for assertion in assertions {
        by_subject
            .entry(assertion.subject.as_str())
            .or_default()
            .push(assertion);
    }

    let mut rows = Vec::with_capacity(by_subject.len());
    for (subject, facts) in by_subject {
        let kind = facts.iter().find_map(|a| {
            if a.predicate != RDF_TYPE {
                return None;
            }
            a.object
                .as_iri()
                .and_then(|iri| iri.strip_prefix(TS))
                .and_then(NodeKind::from_local_name)
        });
        let Some(kind) = kind else {
            tracing::debug!("Skipping non-node subject <{}>", subject);
            continue;
        };

        let mut row = NodeRow::new(namespaces.node_id(subject), kind);
        for fact in facts {
            match fact.predicate.as_str() {
                DC_TITLE => row.title = Some(fact.object.value().to_string()),
                DC_DESCRIPTION => row.description = Some(fact.object.value().to_string()),
                DC_CREATED => row.created = parse_created(subject, &fact.object),
                TS_PARENT => {
                    row.parent = fact
                        .object
                        .as_iri()
                        .map(|iri| namespaces.node_id(iri))
                }
                TS_INDEX => row.index = parse_index(subject, &fact.object),
                _ => {}
            }
        }
        rows.push(row);
    }
    rows
}

/// Id of the root row, if any
///
/// When several rows claim to be the root the first by id wins; the rest are
/// demoted when the tree is built.
pub fn find_root_id(rows: &[NodeRow]) -> Option<String> {
    rows.iter()
        .filter(|row| row.node_type == NodeKind::Root)
        .map(|row| row.id.as_str())
        .min()
        .map(str::to_string)
}

fn parse_created(subject: &str, object: &Term) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(object.value()) {
        Ok(created) => Some(created.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!("Ignoring invalid created value on <{}>: {}", subject, e);
            None
        }
    }
}

fn parse_index(subject: &str, object: &Term) -> Option<usize> {
    match object.value().trim().parse::<usize>() {
        Ok(index) => Some(index),
        Err(e) => {
            tracing::warn!("Ignoring invalid index on <{}>: {}", subject, e);
            None
        }
    }
}
