/**
 * document.rs
 * Parsed ontology documents: header, declared imports and statements
 */

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use oxigraph::io::RdfFormat;
use oxigraph::model::vocab::rdf;
use oxigraph::model::{NamedNode, Subject, Term, Triple};
use oxigraph::store::Store;
use tracing::warn;

use crate::errors::{OntoverError, Result};
use crate::identity::{validate_iri, OntologyIdentity};
use crate::resolver::ImportDeclaring;
use crate::store::named;
use crate::store::vocab::owl;

/// An ontology document as submitted for upload or load
///
/// The base IRI is the subject typed `owl:Ontology`. The version IRI and the
/// import list are read from the header but are held separately from the
/// statements, so processors can rewrite them before the header statements
/// are synchronised.
#[derive(Debug, Clone, PartialEq)]
pub struct OntologyDocument {
    base_iri: String,
    version_iri: Option<String>,
    imports: Vec<String>,
    statements: Vec<Triple>,
}

impl OntologyDocument {
    pub fn new(base_iri: impl Into<String>, statements: Vec<Triple>) -> Result<Self> {
        let base_iri = base_iri.into();
        validate_iri(&base_iri)?;
        Ok(Self {
            base_iri,
            version_iri: None,
            imports: Vec::new(),
            statements,
        })
    }

    /// Parse Turtle (or N-Triples) text
    pub fn from_turtle(content: &str) -> Result<Self> {
        Self::from_statements(parse_statements(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_turtle(&content).map_err(|e| match e {
            OntoverError::ParseError(msg) => OntoverError::ParseError(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Build a document from statements, reading its header
    pub fn from_statements(statements: Vec<Triple>) -> Result<Self> {
        let headers: BTreeSet<String> = statements
            .iter()
            .filter(|t| t.predicate.as_ref() == rdf::TYPE && is_node(&t.object, owl::ONTOLOGY.as_str()))
            .filter_map(|t| match &t.subject {
                Subject::NamedNode(node) => Some(node.as_str().to_string()),
                _ => None,
            })
            .collect();

        let base_iri = match headers.len() {
            1 => headers.into_iter().next().unwrap_or_default(),
            0 => return Err(OntoverError::ParseError("document has no owl:Ontology header".to_string())),
            n => {
                return Err(OntoverError::ParseError(format!(
                    "document has {} owl:Ontology headers: {}",
                    n,
                    headers.into_iter().collect::<Vec<_>>().join(", ")
                )))
            }
        };

        let mut version_iris = BTreeSet::new();
        let mut imports = BTreeSet::new();
        for statement in statements.iter().filter(|t| is_subject(&t.subject, &base_iri)) {
            let predicate = statement.predicate.as_ref();
            if predicate == owl::VERSION_IRI {
                match &statement.object {
                    Term::NamedNode(node) => {
                        version_iris.insert(node.as_str().to_string());
                    }
                    other => warn!(base_iri = %base_iri, value = %other, "non-IRI owl:versionIRI ignored"),
                }
            } else if predicate == owl::IMPORTS {
                match &statement.object {
                    Term::NamedNode(node) => {
                        imports.insert(node.as_str().to_string());
                    }
                    other => warn!(base_iri = %base_iri, value = %other, "non-IRI owl:imports ignored"),
                }
            }
        }

        if version_iris.len() > 1 {
            return Err(OntoverError::ParseError(format!(
                "{} declares {} version IRIs",
                base_iri,
                version_iris.len()
            )));
        }

        Ok(Self {
            base_iri,
            version_iri: version_iris.into_iter().next(),
            imports: imports.into_iter().collect(),
            statements,
        })
    }

    pub fn base_iri(&self) -> &str {
        &self.base_iri
    }

    pub fn version_iri(&self) -> Option<&str> {
        self.version_iri.as_deref()
    }

    pub fn set_version_iri(&mut self, version_iri: impl Into<String>) {
        self.version_iri = Some(version_iri.into());
    }

    /// Declared imports, base or version IRIs of schema ontologies
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn set_imports(&mut self, imports: Vec<String>) {
        let unique: BTreeSet<String> = imports.into_iter().collect();
        self.imports = unique.into_iter().collect();
    }

    pub fn statements(&self) -> &[Triple] {
        &self.statements
    }

    pub fn statements_mut(&mut self) -> &mut Vec<Triple> {
        &mut self.statements
    }

    pub fn into_statements(self) -> Vec<Triple> {
        self.statements
    }

    pub fn identity(&self) -> Result<OntologyIdentity> {
        OntologyIdentity::new(self.base_iri.clone(), self.version_iri.clone())
    }

    /// Rewrite the header statements from the held version IRI and imports
    pub fn sync_header(&mut self) -> Result<()> {
        let base = named(&self.base_iri)?;
        self.statements.retain(|t| {
            !(is_subject(&t.subject, &self.base_iri)
                && (t.predicate.as_ref() == owl::VERSION_IRI || t.predicate.as_ref() == owl::IMPORTS))
        });

        let header = Triple::new(base.clone(), rdf::TYPE.into_owned(), owl::ONTOLOGY.into_owned());
        if !self.statements.contains(&header) {
            self.statements.push(header);
        }
        if let Some(version) = &self.version_iri {
            self.statements
                .push(Triple::new(base.clone(), owl::VERSION_IRI.into_owned(), named(version)?));
        }
        for import in &self.imports {
            self.statements
                .push(Triple::new(base.clone(), owl::IMPORTS.into_owned(), named(import)?));
        }
        Ok(())
    }

    /// N-Triples rendering, one statement per line in sorted order
    pub fn to_ntriples(&self) -> String {
        render_ntriples(&self.statements)
    }
}

impl ImportDeclaring for OntologyDocument {
    fn base_iri(&self) -> &str {
        &self.base_iri
    }

    fn declared_imports(&self) -> &[String] {
        &self.imports
    }
}

/// Parse Turtle text into statements, sorted by their N-Triples rendering
///
/// No ontology header is required.
pub fn parse_statements(content: &str) -> Result<Vec<Triple>> {
    let scratch = Store::new()?;
    scratch.load_from_reader(RdfFormat::Turtle, content.as_bytes())?;

    let mut statements = Vec::new();
    for quad in scratch.iter() {
        let quad = quad?;
        statements.push(Triple::new(quad.subject, quad.predicate, quad.object));
    }
    statements.sort_by_cached_key(|t| t.to_string());
    Ok(statements)
}

/// Sorted N-Triples lines for a set of statements
pub fn render_ntriples(statements: &[Triple]) -> String {
    let mut lines: Vec<String> = statements.iter().map(|t| format!("{} .", t)).collect();
    lines.sort();
    lines.dedup();
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

pub(crate) fn is_subject(subject: &Subject, iri: &str) -> bool {
    matches!(subject, Subject::NamedNode(node) if node.as_str() == iri)
}

pub(crate) fn is_node(term: &Term, iri: &str) -> bool {
    matches!(term, Term::NamedNode(node) if node.as_str() == iri)
}

/// Named node of a term, if it is one
pub(crate) fn as_named(term: &Term) -> Option<&NamedNode> {
    match term {
        Term::NamedNode(node) => Some(node),
        _ => None,
    }
}
