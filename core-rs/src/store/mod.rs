//! Store module
//!
//! - connection: `GraphConnection` / `Repository` traits and the oxigraph-backed implementation
//! - management: version bookkeeping in the schema and artifact management graphs
//! - vocab: IRIs of the management, artifact and OWL vocabularies

pub mod connection;
pub mod management;
pub mod vocab;

pub use connection::{GraphConnection, OxigraphConnection, OxigraphRepository, Repository};
pub use management::{ManagedOntologyRecord, ManagementGraph, ManagementGraphStore};

use oxigraph::model::NamedNode;

use crate::errors::Result;

/// Parse an IRI into a named node
pub fn named(iri: &str) -> Result<NamedNode> {
    Ok(NamedNode::new(iri)?)
}
