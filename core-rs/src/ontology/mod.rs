/**
 * ontology module
 *
 * - document: parsed ontology documents (header, imports, statements)
 * - reasoner: reasoner oracle contract and the built-in subsumption reasoner
 * - cache: loaded ontologies and the reasoning cache keyed by dependency set
 */

pub mod cache;
pub mod document;
pub mod reasoner;

pub use cache::{CacheContext, LoadedOntology, ReasonerService, ReasoningCache, ReasoningState};
pub use document::{parse_statements, render_ntriples, OntologyDocument};
pub use reasoner::{ConsistencyReport, ProfileReport, Reasoner, SubsumptionReasoner};
