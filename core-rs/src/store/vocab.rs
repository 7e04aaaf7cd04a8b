//! IRIs used by the management graphs, artifact data and the built-in reasoner

use oxigraph::model::NamedNodeRef;

/// Version bookkeeping vocabulary
pub mod mgmt {
    use super::NamedNodeRef;

    pub const NAMESPACE: &str = "https://ontover.org/ns/management#";

    pub const MANAGED_ONTOLOGY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#ManagedOntology");
    pub const BASE_IRI: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#baseIRI");
    pub const INFERRED_IRI: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#inferredIRI");
    pub const IMPORTS_VERSION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#importsVersion");
    pub const IS_CURRENT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#isCurrent");
    pub const IS_CURRENT_INFERRED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#isCurrentInferred");
    pub const IS_PUBLISHED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#isPublished");
    pub const SEQUENCE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#sequence");
    pub const CREATED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#created");
    /// Highest sequence ever issued for a base IRI, kept on the base node
    pub const LAST_SEQUENCE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://ontover.org/ns/management#lastSequence");

    pub const DEFAULT_SCHEMA_GRAPH: &str = "urn:ontover:management:schema";
    pub const DEFAULT_ARTIFACT_GRAPH: &str = "urn:ontover:management:artifact";
}

/// Artifact object-graph vocabulary defaults
pub mod base {
    pub const NAMESPACE: &str = "https://ontover.org/ns/base#";

    pub const CONTAINS: &str = "https://ontover.org/ns/base#contains";
    pub const ARTIFACT_HAS_TOP_OBJECT: &str = "https://ontover.org/ns/base#artifactHasTopObject";
}

/// OWL terms not shipped with oxigraph's vocab module
pub mod owl {
    use super::NamedNodeRef;

    pub const NAMESPACE: &str = "http://www.w3.org/2002/07/owl#";

    pub const ONTOLOGY: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#Ontology");
    pub const VERSION_IRI: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#versionIRI");
    pub const IMPORTS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#imports");
    pub const CLASS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#Class");
    pub const NOTHING: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#Nothing");
    pub const DISJOINT_WITH: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#disjointWith");
}

/// Namespaces whose terms an uploaded ontology may use but never redefine
pub const RESERVED_NAMESPACES: [&str; 4] = [
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#",
    "http://www.w3.org/2000/01/rdf-schema#",
    "http://www.w3.org/2002/07/owl#",
    "http://www.w3.org/2001/XMLSchema#",
];

pub fn is_reserved(iri: &str) -> bool {
    RESERVED_NAMESPACES.iter().any(|ns| iri.starts_with(ns))
}
