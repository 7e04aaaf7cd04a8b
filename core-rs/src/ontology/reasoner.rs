//! Reasoner oracle contract and the bundled subsumption reasoner
//!
//! The version manager treats the reasoner as an opaque, stateful oracle:
//! profile checks run against raw documents, consistency checks and
//! inference run against loaded ontologies (statements plus import handles).
//!
//! `SubsumptionReasoner` is a small structural reasoner:
//!
//! - profile: reserved RDF/RDFS/OWL/XSD terms may be used but never redefined,
//!   class and property axioms need IRI objects
//! - consistency: no individual may be typed by two disjoint classes or by
//!   `owl:Nothing`
//! - inference: `rdfs:subClassOf` and `rdfs:subPropertyOf` closure, with
//!   `rdf:type` and property assertions propagated upwards

use std::collections::{BTreeSet, HashMap, HashSet};

use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{NamedNode, NamedNodeRef, Subject, Term, Triple};
use serde::Serialize;

use crate::errors::Result;
use crate::ontology::cache::LoadedOntology;
use crate::ontology::document::{as_named, OntologyDocument};
use crate::store::vocab::{is_reserved, owl};

/// Outcome of a profile check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub ontology: String,
    pub profile: String,
    pub in_profile: bool,
    pub violations: Vec<String>,
}

/// Outcome of a consistency check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub ontology: String,
    pub consistent: bool,
    pub explanations: Vec<String>,
}

/// Profile checker, consistency checker and inference engine
///
/// Implementations may hold per-ontology state and are not required to be
/// thread-safe; callers serialise access through `ReasonerService`.
pub trait Reasoner: Send {
    fn name(&self) -> &str;

    fn check_profile(&mut self, document: &OntologyDocument) -> Result<ProfileReport>;

    fn check_consistency(&mut self, ontology: &LoadedOntology) -> Result<ConsistencyReport>;

    /// Statements entailed by the ontology and its imports that are not
    /// already asserted anywhere in that closure
    fn infer(&mut self, ontology: &LoadedOntology) -> Result<Vec<Triple>>;
}

const PROFILE: &str = "OWL2-DL";

#[derive(Debug, Clone, Default)]
pub struct SubsumptionReasoner;

impl SubsumptionReasoner {
    pub fn new() -> Self {
        Self
    }
}

impl Reasoner for SubsumptionReasoner {
    fn name(&self) -> &str {
        "subsumption"
    }

    fn check_profile(&mut self, document: &OntologyDocument) -> Result<ProfileReport> {
        let mut violations = BTreeSet::new();

        for statement in document.statements() {
            if let Subject::NamedNode(subject) = &statement.subject {
                if is_reserved(subject.as_str()) {
                    violations.insert(format!("redefines reserved term <{}>", subject.as_str()));
                }
            }

            let predicate = statement.predicate.as_ref();
            let needs_iri_object = predicate == rdf::TYPE
                || predicate == rdfs::SUB_CLASS_OF
                || predicate == rdfs::SUB_PROPERTY_OF
                || predicate == owl::DISJOINT_WITH;
            if needs_iri_object && matches!(statement.object, Term::Literal(_)) {
                violations.insert(format!("literal object in axiom: {}", statement));
            }
        }

        let violations: Vec<String> = violations.into_iter().collect();
        Ok(ProfileReport {
            ontology: document.base_iri().to_string(),
            profile: PROFILE.to_string(),
            in_profile: violations.is_empty(),
            violations,
        })
    }

    fn check_consistency(&mut self, ontology: &LoadedOntology) -> Result<ConsistencyReport> {
        let statements = ontology.closure_statements();
        let classes = Hierarchy::build(&statements, rdfs::SUB_CLASS_OF);

        let mut disjoint: HashMap<&NamedNode, HashSet<&NamedNode>> = HashMap::new();
        for statement in &statements {
            if statement.predicate.as_ref() != owl::DISJOINT_WITH {
                continue;
            }
            if let (Subject::NamedNode(a), Some(b)) = (&statement.subject, as_named(&statement.object)) {
                disjoint.entry(a).or_default().insert(b);
                disjoint.entry(b).or_default().insert(a);
            }
        }

        let mut types: HashMap<&Subject, BTreeSet<NamedNode>> = HashMap::new();
        for statement in &statements {
            if statement.predicate.as_ref() != rdf::TYPE {
                continue;
            }
            if let Some(class) = as_named(&statement.object) {
                let entry = types.entry(&statement.subject).or_default();
                entry.insert(class.clone());
                entry.extend(classes.ancestors(class).iter().cloned());
            }
        }

        let nothing = owl::NOTHING.into_owned();
        let mut explanations = BTreeSet::new();
        for (individual, classes) in &types {
            if classes.contains(&nothing) {
                explanations.insert(format!("{} is an instance of owl:Nothing", individual));
            }
            for a in classes {
                let Some(excluded) = disjoint.get(a) else { continue };
                for b in classes.iter().filter(|b| a < *b && excluded.contains(b)) {
                    explanations.insert(format!("{} is an instance of disjoint classes {} and {}", individual, a, b));
                }
            }
        }

        let explanations: Vec<String> = explanations.into_iter().collect();
        Ok(ConsistencyReport {
            ontology: ontology.identity().to_string(),
            consistent: explanations.is_empty(),
            explanations,
        })
    }

    fn infer(&mut self, ontology: &LoadedOntology) -> Result<Vec<Triple>> {
        let statements = ontology.closure_statements();
        let known: HashSet<&Triple> = statements.iter().collect();
        let classes = Hierarchy::build(&statements, rdfs::SUB_CLASS_OF);
        let properties = Hierarchy::build(&statements, rdfs::SUB_PROPERTY_OF);

        let mut derived = Vec::new();
        for (class, ancestors) in &classes.closure {
            for ancestor in ancestors {
                derived.push(Triple::new(class.clone(), rdfs::SUB_CLASS_OF.into_owned(), ancestor.clone()));
            }
        }
        for (property, ancestors) in &properties.closure {
            for ancestor in ancestors {
                derived.push(Triple::new(property.clone(), rdfs::SUB_PROPERTY_OF.into_owned(), ancestor.clone()));
            }
        }

        for statement in &statements {
            if statement.predicate.as_ref() == rdf::TYPE {
                if let Some(class) = as_named(&statement.object) {
                    for ancestor in classes.ancestors(class) {
                        derived.push(Triple::new(
                            statement.subject.clone(),
                            rdf::TYPE.into_owned(),
                            ancestor.clone(),
                        ));
                    }
                }
            } else {
                for ancestor in properties.ancestors(&statement.predicate) {
                    derived.push(Triple::new(
                        statement.subject.clone(),
                        ancestor.clone(),
                        statement.object.clone(),
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        derived.retain(|t| !known.contains(t) && seen.insert(t.clone()));
        derived.sort_by_cached_key(|t| t.to_string());
        Ok(derived)
    }
}

/// Transitive closure of one hierarchy predicate over named nodes
struct Hierarchy {
    closure: HashMap<NamedNode, BTreeSet<NamedNode>>,
}

impl Hierarchy {
    fn build(statements: &[Triple], predicate: NamedNodeRef<'_>) -> Self {
        let mut direct: HashMap<NamedNode, BTreeSet<NamedNode>> = HashMap::new();
        for statement in statements {
            if statement.predicate.as_ref() != predicate {
                continue;
            }
            if let (Subject::NamedNode(sub), Some(sup)) = (&statement.subject, as_named(&statement.object)) {
                if sub != sup {
                    direct.entry(sub.clone()).or_default().insert(sup.clone());
                }
            }
        }

        let mut closure = HashMap::new();
        for start in direct.keys() {
            let mut reached = BTreeSet::new();
            let mut stack: Vec<&NamedNode> = direct[start].iter().collect();
            while let Some(node) = stack.pop() {
                if node == start || !reached.insert(node.clone()) {
                    continue;
                }
                if let Some(next) = direct.get(node) {
                    stack.extend(next.iter());
                }
            }
            closure.insert(start.clone(), reached);
        }

        Self { closure }
    }

    fn ancestors(&self, node: &NamedNode) -> &BTreeSet<NamedNode> {
        static EMPTY: BTreeSet<NamedNode> = BTreeSet::new();
        self.closure.get(node).unwrap_or(&EMPTY)
    }
}
