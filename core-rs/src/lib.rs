//! # Ontover Core - Ontology Version & Dependency Manager
//!
//! Version bookkeeping for OWL ontologies kept in an RDF store. Schema
//! ontologies are shared and append-only; artifacts are project ontologies
//! that import schemas and stay mutable until published.
//!
//! ## Core Principle
//!
//! **Exactly one current version per base IRI**: every write that can move
//! the current pointer runs under a per-base lock inside one store
//! transaction, and the management graph is checked before commit.
//!
//! ## Key Features
//!
//! - Import-ordered batch upload of schema documents with cycle detection
//! - Version lookup by base IRI, by version IRI, or by either
//! - Reasoning cache keyed by dependency set, primed in import order
//! - Artifact edits as new versions, with a containment reachability audit
//! - Publish lock: a published artifact is frozen
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        OntologyVersionManager           │
//! │   SchemaManager      ArtifactManager    │
//! └─────────────────────────────────────────┘
//!     │           │             │
//!     ▼           ▼             ▼
//! ┌────────┐ ┌──────────┐ ┌──────────────┐
//! │Resolver│ │ Reasoner │ │  Management  │
//! │        │ │ + Cache  │ │ Graph Store  │
//! └────────┘ └──────────┘ └──────────────┘
//!                               │
//!                               ▼
//!                     GraphConnection (oxigraph)
//! ```

pub mod artifact;
pub mod config;
pub mod errors;
pub mod identity;
pub mod manager;
pub mod ontology;
pub mod resolver;
pub mod store;
pub mod version;

pub use artifact::{ArtifactEdit, DanglingPolicy, PublishFilter, ReachabilityReport, UpdatePolicy};
pub use config::ManagerConfig;
pub use errors::{OntoverError, Result};
pub use identity::{DependencySet, InferredIdentity, InferredIriScheme, OntologyIdentity};
pub use manager::OntologyVersionManager;
pub use ontology::{OntologyDocument, Reasoner, SubsumptionReasoner};
pub use resolver::DependencyResolver;
pub use store::{GraphConnection, ManagedOntologyRecord, ManagementGraph, OxigraphRepository, Repository};
pub use version::processors::{OntologyProcessor, ProcessorRegistry, Stage};
pub use version::schema::SchemaUpload;

/// Version of the management graph record format
pub const VERSION: &str = "0.4.2";
