//! Integration tests for the reasoning cache
//!
//! Tests how uploads prime, reuse and evict cached reasoning handles:
//! - Handles carry their full import closure through the two-level walk
//! - Rolled back uploads leave no cache entries behind
//! - A failing reasoner aborts the operation without committing

use std::sync::Arc;

use oxigraph::model::Triple;
use ontover_core::config::ManagerConfig;
use ontover_core::ontology::{ConsistencyReport, LoadedOntology, ProfileReport};
use ontover_core::{
    DependencySet, OntologyDocument, OntologyIdentity, OntologyVersionManager, OntoverError, OxigraphRepository,
    ProcessorRegistry, Reasoner,
};

fn schema(name: &str, import: Option<&str>, axiom: &str) -> OntologyDocument {
    let import = import
        .map(|i| format!("owl:imports <http://ex.org/{}> ;", i))
        .unwrap_or_default();
    OntologyDocument::from_turtle(&format!(
        r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <http://ex.org/{name}> a owl:Ontology ; {import} owl:versionIRI <http://ex.org/{name}/1> .
        {axiom}
        "#
    ))
    .unwrap()
}

/// a <- b <- c <- d, each adding one class under the previous one
fn chain() -> Vec<OntologyDocument> {
    vec![
        schema("d", Some("c"), "<http://ex.org/d#W> rdfs:subClassOf <http://ex.org/c#Z> ."),
        schema("c", Some("b"), "<http://ex.org/c#Z> rdfs:subClassOf <http://ex.org/b#Y> ."),
        schema("b", Some("a"), "<http://ex.org/b#Y> rdfs:subClassOf <http://ex.org/a#X> ."),
        schema("a", None, "<http://ex.org/a#X> a owl:Class ."),
    ]
}

fn identity(name: &str) -> OntologyIdentity {
    OntologyIdentity::versioned(format!("http://ex.org/{}", name), format!("http://ex.org/{}/1", name)).unwrap()
}

/// Test: the shallow import walk still yields complete reasoning input
///
/// d's two-level list is [c, b]; a is only reachable through the handles
/// of c and b. Reasoning over d must still see a's axioms.
#[test]
fn test_two_level_walk_reaches_full_closure() {
    let manager = OntologyVersionManager::in_memory().unwrap();
    manager.upload_schema_batch(chain()).unwrap();
    assert_eq!(manager.cached_ontologies().unwrap(), 4);

    let ctx = manager.context();
    let conn = ctx.connect().unwrap();
    let record = manager.get_schema_by_iri("http://ex.org/d").unwrap();

    let (imports, dependencies) = ctx.resolver.dependency_set(&*conn, &ctx.management, &record).unwrap();
    assert_eq!(imports, vec![identity("c"), identity("b")]);
    assert_eq!(dependencies.len(), 3);
    assert!(!dependencies.contains(&identity("a")));

    let cache_ctx = ctx.cache_context(&*conn);
    let handle = ctx
        .reasoner
        .with_exclusive_access(|state| state.ensure(&identity("d"), &cache_ctx))
        .unwrap();
    assert!(handle.import_closure().contains(&identity("a")));
    assert!(handle
        .closure_statements()
        .iter()
        .any(|t| t.subject.to_string() == "<http://ex.org/a#X>"));

    let exported = manager.export_schema("http://ex.org/d", true).unwrap();
    assert!(exported.contains(
        "<http://ex.org/d#W> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://ex.org/a#X> ."
    ));
}

#[test]
fn test_cache_set_loads_in_dependency_order() {
    let manager = OntologyVersionManager::in_memory().unwrap();
    manager.upload_schema_batch(chain()).unwrap();

    let ctx = manager.context();
    let conn = ctx.connect().unwrap();
    let cache_ctx = ctx.cache_context(&*conn);

    let members: DependencySet = vec![identity("d"), identity("b"), identity("c")].into_iter().collect();
    let handles = ctx
        .reasoner
        .with_exclusive_access(|state| {
            state.cache.clear();
            state.cache_set(&members, &cache_ctx)
        })
        .unwrap();

    let order: Vec<String> = handles.iter().map(|h| h.identity().base_iri.clone()).collect();
    assert_eq!(order, vec!["http://ex.org/b", "http://ex.org/c", "http://ex.org/d"]);
    // a was loaded on the way as an import of b
    assert_eq!(manager.cached_ontologies().unwrap(), 4);
}

#[test]
fn test_rolled_back_upload_leaves_no_cache_entries() {
    let manager = OntologyVersionManager::in_memory().unwrap();
    manager.upload_schema_batch(chain()).unwrap();
    let before = manager.cached_ontologies().unwrap();

    let e = schema("e", Some("d"), "<http://ex.org/e#V> rdfs:subClassOf <http://ex.org/d#W> .");
    let clash = schema(
        "f",
        Some("e"),
        "<http://ex.org/f#Q> owl:disjointWith <http://ex.org/a#X> . <http://ex.org/f#i> a <http://ex.org/f#Q>, <http://ex.org/e#V> .",
    );

    let err = manager.upload_schema_batch(vec![e, clash]).unwrap_err();
    assert!(matches!(err, OntoverError::InconsistentOntology(_)));
    assert_eq!(manager.cached_ontologies().unwrap(), before);
    assert!(manager.get_current_schema_version("http://ex.org/e").is_err());
}

#[test]
fn test_new_version_reuses_cached_imports() {
    let manager = OntologyVersionManager::in_memory().unwrap();
    manager.upload_schema_batch(chain()).unwrap();

    let d2 = OntologyDocument::from_turtle(
        r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        <http://ex.org/d> a owl:Ontology ; owl:imports <http://ex.org/c> ; owl:versionIRI <http://ex.org/d/2> .
        "#,
    )
    .unwrap();
    manager.upload_schema_batch(vec![d2]).unwrap();

    // Only d/2 itself was added; c, b and a were already cached
    assert_eq!(manager.cached_ontologies().unwrap(), 5);
}

/// Reasoner double whose inference always fails
struct BrokenReasoner;

impl Reasoner for BrokenReasoner {
    fn name(&self) -> &str {
        "broken"
    }

    fn check_profile(&mut self, document: &OntologyDocument) -> ontover_core::Result<ProfileReport> {
        Ok(ProfileReport {
            ontology: document.base_iri().to_string(),
            profile: "any".to_string(),
            in_profile: true,
            violations: Vec::new(),
        })
    }

    fn check_consistency(&mut self, ontology: &LoadedOntology) -> ontover_core::Result<ConsistencyReport> {
        Ok(ConsistencyReport {
            ontology: ontology.identity().to_string(),
            consistent: true,
            explanations: Vec::new(),
        })
    }

    fn infer(&mut self, _ontology: &LoadedOntology) -> ontover_core::Result<Vec<Triple>> {
        Err(OntoverError::Reasoner("inference engine unavailable".to_string()))
    }
}

#[test]
fn test_reasoner_failure_aborts_upload() {
    let manager = OntologyVersionManager::new(
        ManagerConfig::default(),
        Arc::new(OxigraphRepository::in_memory().unwrap()),
        Box::new(BrokenReasoner),
        ProcessorRegistry::with_defaults(),
    )
    .unwrap();

    let err = manager.upload_schema_batch(chain()).unwrap_err();
    assert!(matches!(err, OntoverError::Reasoner(_)));
    assert_eq!(manager.cached_ontologies().unwrap(), 0);
    assert!(manager.list_schemas().unwrap().is_empty());
}
