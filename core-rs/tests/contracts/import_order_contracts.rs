// Import Order Contract Tests
//
// These tests pin down how batches are ordered and how imports are recorded.
//
// **Problem**: reasoning over an ontology whose imports are not yet loaded
//              produces silently incomplete inferred graphs
// **Solution**: Contract tests on load order, pinning and the two-level list

use ontover_core::resolver::ImportNode;
use ontover_core::{DependencyResolver, OntologyDocument, OntologyIdentity, OntologyVersionManager, OntoverError};

fn node(name: &str, imports: &[&str]) -> ImportNode {
    let imports: Vec<String> = imports.iter().map(|i| format!("http://ex.org/{}", i)).collect();
    let imports: Vec<&str> = imports.iter().map(String::as_str).collect();
    ImportNode::new(format!("http://ex.org/{}", name), &imports)
}

fn names(nodes: &[ImportNode]) -> Vec<&str> {
    nodes
        .iter()
        .map(|n| n.base_iri.trim_start_matches("http://ex.org/"))
        .collect()
}

fn schema(name: &str, version: &str, imports: &[&str]) -> OntologyDocument {
    let imports: String = imports
        .iter()
        .map(|i| format!(" owl:imports <http://ex.org/{}> ;", i))
        .collect();
    OntologyDocument::from_turtle(&format!(
        r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        <http://ex.org/{name}> a owl:Ontology ;{imports} owl:versionIRI <http://ex.org/{name}/{version}> .
        <http://ex.org/{name}#C> a owl:Class .
        "#
    ))
    .unwrap()
}

fn identity(name: &str, version: &str) -> OntologyIdentity {
    OntologyIdentity::versioned(format!("http://ex.org/{}", name), format!("http://ex.org/{}/{}", name, version)).unwrap()
}

/// WHY: Every ontology loads after everything it imports
/// REASON: The reasoner resolves imports from the cache; an importer loaded
///         first would be reasoned over without its imported axioms
/// BREAKS: Inferred graphs of importers miss entailments
#[test]
fn imports_always_precede_importers() {
    let resolver = DependencyResolver::new();
    // diamond: d -> {b, c} -> a
    let batch = vec![
        node("d", &["b", "c"]),
        node("c", &["a"]),
        node("b", &["a"]),
        node("a", &[]),
    ];

    let ordered = resolver.order_batch(batch, |_| Ok(false)).unwrap();
    let order = names(&ordered);
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();

    assert!(position("a") < position("b"));
    assert!(position("a") < position("c"));
    assert!(position("b") < position("d"));
    assert!(position("c") < position("d"));
}

/// WHY: Ordering is a pure function of the batch
/// REASON: Batches are replayed from manifests; a different order on
///         replay changes which version of a shared import gets pinned
/// BREAKS: Reproducible bootstraps
#[test]
fn ordering_is_stable_for_the_same_input() {
    let resolver = DependencyResolver::new();
    let batch = || {
        vec![
            node("x", &[]),
            node("d", &["b", "c"]),
            node("c", &["a"]),
            node("b", &["a"]),
            node("a", &[]),
            node("y", &[]),
        ]
    };

    let first = resolver.order_batch(batch(), |_| Ok(false)).unwrap();
    for _ in 0..10 {
        let again = resolver.order_batch(batch(), |_| Ok(false)).unwrap();
        assert_eq!(first, again);
    }
    // Ready items are taken in input order
    assert_eq!(names(&first), vec!["x", "a", "c", "b", "d", "y"]);
}

/// WHY: A cycle error names the ontologies on the cycle, and only those
/// REASON: Operators fix cycles by editing exactly the named documents
/// BREAKS: Error messages that blame innocent importers of the cycle
#[test]
fn cycle_error_names_only_cycle_members() {
    let resolver = DependencyResolver::new();
    let batch = vec![
        node("a", &["b"]),
        node("b", &["c"]),
        node("c", &["a"]),
        node("importer", &["a"]),
        node("free", &[]),
    ];

    match resolver.order_batch(batch, |_| Ok(false)) {
        Err(OntoverError::CyclicImport { base_iris }) => {
            assert_eq!(base_iris, vec!["http://ex.org/a", "http://ex.org/b", "http://ex.org/c"]);
        }
        other => panic!("Expected CyclicImport, got {:?}", other),
    }
}

/// WHY: Imports outside the batch are checked against managed schemas
/// BREAKS: Batches that reference an ontology nobody uploaded
#[test]
fn imports_outside_batch_must_be_managed() {
    let resolver = DependencyResolver::new();
    let batch = vec![node("c", &["b", "managed"]), node("b", &[])];

    let ordered = resolver
        .order_batch(batch.clone(), |iri| Ok(iri == "http://ex.org/managed"))
        .unwrap();
    assert_eq!(names(&ordered), vec!["b", "c"]);

    let err = resolver.order_batch(batch, |_| Ok(false)).unwrap_err();
    assert!(matches!(
        err,
        OntoverError::UnresolvedImport { ref ontology, ref import }
            if ontology == "http://ex.org/c" && import == "http://ex.org/managed"
    ));
}

/// WHY: Recorded imports point at the version that was current at upload
/// REASON: A later schema release must not change what an existing
///         version was reasoned against
/// BREAKS: Historical versions drift when their imports are upgraded
#[test]
fn recorded_imports_stay_pinned_across_upgrades() {
    let manager = OntologyVersionManager::in_memory().unwrap();
    manager
        .upload_schema_batch(vec![schema("b", "1", &["a"]), schema("a", "1", &[])])
        .unwrap();
    manager.upload_schema_batch(vec![schema("a", "2", &[])]).unwrap();

    let b = manager.get_schema_by_iri("http://ex.org/b/1").unwrap();
    assert_eq!(b.imports, vec![identity("a", "1")]);

    manager.upload_schema_batch(vec![schema("b", "2", &["a"])]).unwrap();
    let b2 = manager.get_schema_by_iri("http://ex.org/b").unwrap();
    assert_eq!(b2.imports, vec![identity("a", "2")]);
}

/// WHY: The reasoner priming list is direct imports then their imports
/// SCENARIO: d imports b and c, both import a
/// REASON: Each cached import carries its own closure, so two levels are
///         enough; duplicates by base IRI are dropped, first seen wins
/// BREAKS: Double-loading a shared import into the reasoner
#[test]
fn two_level_list_is_direct_then_transitive() {
    let manager = OntologyVersionManager::in_memory().unwrap();
    manager
        .upload_schema_batch(vec![
            schema("d", "1", &["c", "b"]),
            schema("c", "1", &["a"]),
            schema("b", "1", &["a"]),
            schema("a", "1", &[]),
        ])
        .unwrap();

    let ctx = manager.context();
    let conn = ctx.connect().unwrap();
    let record = manager.get_schema_by_iri("http://ex.org/d").unwrap();
    let imports = ctx
        .resolver
        .two_level_imports(&*conn, &ctx.management, &record)
        .unwrap();

    assert_eq!(imports, vec![identity("b", "1"), identity("c", "1"), identity("a", "1")]);
}
