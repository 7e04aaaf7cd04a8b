//! Error types for Ontover Core

use std::collections::BTreeSet;

use thiserror::Error;

use crate::ontology::reasoner::{ConsistencyReport, ProfileReport};
use crate::version::processors::Stage;

#[derive(Error, Debug)]
pub enum OntoverError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid IRI: {0}")]
    InvalidIri(String),

    #[error("IRI is not managed: {iri}")]
    UnmanagedIri { iri: String },

    #[error("Schema IRI is not managed: {0}")]
    UnmanagedSchemaIri(String),

    #[error("Artifact IRI is not managed: {0}")]
    UnmanagedArtifactIri(String),

    #[error("Version {version} is not managed for {base_iri}")]
    UnmanagedVersion { base_iri: String, version: String },

    #[error("Version {version} already exists for {base_iri}")]
    DuplicateVersion { base_iri: String, version: String },

    #[error("Cyclic imports between: {}", base_iris.join(", "))]
    CyclicImport { base_iris: Vec<String> },

    #[error("Ontology {ontology} imports {import}, which is neither in the batch nor managed")]
    UnresolvedImport { ontology: String, import: String },

    #[error("Profile violation in {}: {} issue(s)", .0.ontology, .0.violations.len())]
    ProfileViolation(ProfileReport),

    #[error("Inconsistent ontology {}: {} explanation(s)", .0.ontology, .0.explanations.len())]
    InconsistentOntology(ConsistencyReport),

    #[error("Artifact {base_iri} @ {version} is published and cannot be modified")]
    PublishedArtifactModify { base_iri: String, version: String },

    #[error("Artifact {base_iri} @ {version} is already published")]
    AlreadyPublished { base_iri: String, version: String },

    #[error("Artifact {base_iri}: requested version {requested} but current is {current}")]
    StaleArtifactVersion {
        base_iri: String,
        requested: String,
        current: String,
    },

    #[error("Artifact {artifact} has {} disconnected object(s)", dangling.len())]
    DisconnectedObjects {
        artifact: String,
        dangling: BTreeSet<String>,
    },

    #[error("Artifact {artifact} must have exactly one top object, found {found}")]
    TopObject { artifact: String, found: usize },

    #[error("Currency conflict for {base_iri}: {} versions flagged current", versions.len())]
    CurrencyConflict {
        base_iri: String,
        versions: Vec<String>,
    },

    #[error("Processor {processor} rejected document at stage {stage}: {reason}")]
    ProcessorRejected {
        stage: Stage,
        processor: String,
        reason: String,
    },

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Transaction already active")]
    TransactionAlreadyActive,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Reasoner error: {0}")]
    Reasoner(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OntoverError {
    /// Errors the caller can act on by fixing input or re-issuing with another policy
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OntoverError::DisconnectedObjects { .. }
                | OntoverError::StaleArtifactVersion { .. }
                | OntoverError::ProfileViolation(_)
                | OntoverError::InconsistentOntology(_)
        )
    }
}

impl From<oxigraph::store::StorageError> for OntoverError {
    fn from(err: oxigraph::store::StorageError) -> Self {
        OntoverError::Store(err.to_string())
    }
}

impl From<oxigraph::store::LoaderError> for OntoverError {
    fn from(err: oxigraph::store::LoaderError) -> Self {
        OntoverError::ParseError(err.to_string())
    }
}

impl From<oxigraph::model::IriParseError> for OntoverError {
    fn from(err: oxigraph::model::IriParseError) -> Self {
        OntoverError::InvalidIri(err.to_string())
    }
}

impl From<walkdir::Error> for OntoverError {
    fn from(err: walkdir::Error) -> Self {
        OntoverError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, OntoverError>;
