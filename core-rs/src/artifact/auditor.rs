//! Reachability Auditor
//!
//! Objects of an artifact hang off a single top object through the
//! containment predicate and its sub-properties. After an edit is staged,
//! the auditor walks containment breadth-first from the top object; any
//! object that existed before the edit (or was touched by it), still has
//! statements, and was not reached is dangling.
//!
//! Local vocabulary declarations (subjects typed only with RDF, RDFS, OWL
//! or XSD terms, such as `owl:AnnotationProperty`) are not objects and are
//! never audited.
//!
//! Policies:
//! - `Report`: fail with `DisconnectedObjects`, the caller rolls back
//! - `ForceClean`: remove every statement whose subject is a dangling object

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{NamedNode, Subject, Term};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{OntoverError, Result};
use crate::ontology::document::as_named;
use crate::store::connection::GraphConnection;
use crate::store::named;
use crate::store::vocab::is_reserved;

/// What to do with dangling objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DanglingPolicy {
    ForceClean,
    #[default]
    Report,
}

impl fmt::Display for DanglingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DanglingPolicy::ForceClean => write!(f, "FORCE_CLEAN"),
            DanglingPolicy::Report => write!(f, "REPORT"),
        }
    }
}

impl FromStr for DanglingPolicy {
    type Err = OntoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "FORCE_CLEAN" => Ok(DanglingPolicy::ForceClean),
            "REPORT" => Ok(DanglingPolicy::Report),
            _ => Err(OntoverError::Config(format!("unknown dangling policy: {}", s))),
        }
    }
}

/// Result of one audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachabilityReport {
    pub top_object: String,
    pub reachable: BTreeSet<String>,
    pub dangling: BTreeSet<String>,
    /// Statements removed under `ForceClean`
    pub removed_statements: usize,
}

impl ReachabilityReport {
    pub fn is_connected(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Graphs and object sets one audit runs over
#[derive(Debug, Clone)]
pub struct AuditScope {
    pub artifact_base: String,
    pub version_iri: String,
    /// Content graph of the post-edit version
    pub content: NamedNode,
    /// Graphs that may declare sub-properties of the containment predicate
    pub schema_graphs: Vec<NamedNode>,
    /// Objects present before the edit
    pub before: BTreeSet<String>,
    /// Objects named by the edit
    pub touched: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ReachabilityAuditor {
    top_object_predicate: NamedNode,
    contains_predicate: NamedNode,
}

impl ReachabilityAuditor {
    pub fn new(top_object_predicate: &str, contains_predicate: &str) -> Result<Self> {
        Ok(Self {
            top_object_predicate: named(top_object_predicate)?,
            contains_predicate: named(contains_predicate)?,
        })
    }

    pub fn top_object_predicate(&self) -> &NamedNode {
        &self.top_object_predicate
    }

    /// The containment predicate plus every predicate declared (directly or
    /// transitively) as its sub-property in `graphs`
    pub fn containment_predicates(&self, conn: &dyn GraphConnection, graphs: &[NamedNode]) -> Result<BTreeSet<NamedNode>> {
        let sub_property = rdfs::SUB_PROPERTY_OF.into_owned();
        let mut predicates = BTreeSet::new();
        predicates.insert(self.contains_predicate.clone());

        let mut queue = VecDeque::from([self.contains_predicate.clone()]);
        while let Some(parent) = queue.pop_front() {
            let parent_term = Term::NamedNode(parent);
            for graph in graphs {
                for quad in conn.match_pattern(None, Some(&sub_property), Some(&parent_term), Some(graph))? {
                    if let Subject::NamedNode(child) = quad.subject {
                        if predicates.insert(child.clone()) {
                            queue.push_back(child);
                        }
                    }
                }
            }
        }
        Ok(predicates)
    }

    /// The single top object of an artifact version
    pub fn top_object(&self, conn: &dyn GraphConnection, artifact_base: &str, content: &NamedNode) -> Result<NamedNode> {
        let base = named(artifact_base)?;
        let mut tops: Vec<NamedNode> = conn
            .match_pattern(Some(&base), Some(&self.top_object_predicate), None, Some(content))?
            .into_iter()
            .filter_map(|quad| as_named(&quad.object).cloned())
            .collect();
        tops.sort();
        tops.dedup();

        if tops.len() != 1 {
            return Err(OntoverError::TopObject {
                artifact: artifact_base.to_string(),
                found: tops.len(),
            });
        }
        Ok(tops.remove(0))
    }

    /// Named subjects of a content graph with at least one type outside the
    /// reserved vocabularies, minus the ontology header IRIs
    pub fn objects(&self, conn: &dyn GraphConnection, content: &NamedNode, exclude: &[&str]) -> Result<BTreeSet<String>> {
        let rdf_type = rdf::TYPE.into_owned();
        let mut typed: BTreeMap<String, bool> = BTreeMap::new();
        for quad in conn.match_pattern(None, Some(&rdf_type), None, Some(content))? {
            let Subject::NamedNode(node) = quad.subject else { continue };
            let domain_type = matches!(&quad.object, Term::NamedNode(t) if !is_reserved(t.as_str()));
            *typed.entry(node.into_string()).or_default() |= domain_type;
        }
        Ok(typed
            .into_iter()
            .filter(|(iri, domain_typed)| *domain_typed && !exclude.contains(&iri.as_str()))
            .map(|(iri, _)| iri)
            .collect())
    }

    /// True when every type of `node` is a reserved vocabulary term
    fn is_declaration(&self, conn: &dyn GraphConnection, content: &NamedNode, node: &NamedNode) -> Result<bool> {
        let rdf_type = rdf::TYPE.into_owned();
        let types = conn.match_pattern(Some(node), Some(&rdf_type), None, Some(content))?;
        Ok(!types.is_empty()
            && types
                .iter()
                .all(|quad| matches!(&quad.object, Term::NamedNode(t) if is_reserved(t.as_str()))))
    }

    /// Breadth-first walk over containment from `top`
    pub fn reachable(
        &self,
        conn: &dyn GraphConnection,
        content: &NamedNode,
        top: &NamedNode,
        predicates: &BTreeSet<NamedNode>,
    ) -> Result<BTreeSet<String>> {
        let mut reached = BTreeSet::new();
        reached.insert(top.as_str().to_string());
        let mut queue = VecDeque::from([top.clone()]);

        while let Some(node) = queue.pop_front() {
            for predicate in predicates {
                for quad in conn.match_pattern(Some(&node), Some(predicate), None, Some(content))? {
                    if let Some(child) = as_named(&quad.object) {
                        if reached.insert(child.as_str().to_string()) {
                            queue.push_back(child.clone());
                        }
                    }
                }
            }
        }
        Ok(reached)
    }

    /// Compute reachability without changing anything
    pub fn assess(&self, conn: &dyn GraphConnection, scope: &AuditScope) -> Result<ReachabilityReport> {
        let mut graphs = vec![scope.content.clone()];
        graphs.extend(scope.schema_graphs.iter().cloned());
        let predicates = self.containment_predicates(conn, &graphs)?;

        let top = self.top_object(conn, &scope.artifact_base, &scope.content)?;
        let reachable = self.reachable(conn, &scope.content, &top, &predicates)?;

        let mut dangling = BTreeSet::new();
        for candidate in scope.before.iter().chain(scope.touched.iter()) {
            if reachable.contains(candidate)
                || candidate == &scope.artifact_base
                || candidate == &scope.version_iri
            {
                continue;
            }
            let Ok(node) = named(candidate) else { continue };
            if self.is_declaration(conn, &scope.content, &node)? {
                continue;
            }
            if !conn.match_pattern(Some(&node), None, None, Some(&scope.content))?.is_empty() {
                dangling.insert(candidate.clone());
            }
        }

        debug!(
            artifact = %scope.artifact_base,
            reachable = reachable.len(),
            dangling = dangling.len(),
            "reachability assessed"
        );
        Ok(ReachabilityReport {
            top_object: top.into_string(),
            reachable,
            dangling,
            removed_statements: 0,
        })
    }

    /// Assess and apply `policy` inside the caller's transaction
    pub fn audit(
        &self,
        conn: &mut dyn GraphConnection,
        scope: &AuditScope,
        policy: DanglingPolicy,
    ) -> Result<ReachabilityReport> {
        let mut report = self.assess(&*conn, scope)?;
        if report.is_connected() {
            return Ok(report);
        }

        match policy {
            DanglingPolicy::Report => Err(OntoverError::DisconnectedObjects {
                artifact: scope.artifact_base.clone(),
                dangling: report.dangling,
            }),
            DanglingPolicy::ForceClean => {
                for object in &report.dangling {
                    let node = named(object)?;
                    report.removed_statements += conn.remove_matching(Some(&node), None, None, Some(&scope.content))?;
                }
                info!(
                    artifact = %scope.artifact_base,
                    policy = %policy,
                    dangling = report.dangling.len(),
                    removed = report.removed_statements,
                    "dangling objects removed"
                );
                Ok(report)
            }
        }
    }
}
