// Publish Lock Contract Tests
//
// These tests verify that publishing an artifact version freezes it.
//
// **Problem**: downstream consumers reference published versions by IRI;
//              editing, deleting or pruning them breaks those references
// **Solution**: Contract tests that every mutating path refuses published versions

use ontover_core::config::ManagerConfig;
use ontover_core::{ArtifactEdit, DanglingPolicy, OntologyDocument, OntologyIdentity, OntologyVersionManager, OntoverError};
use tempfile::TempDir;

const BASE: &str = "http://ex.org/artifact/cart-7";

const FOOD: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
<http://ex.org/food> a owl:Ontology ; owl:versionIRI <http://ex.org/food/1.0> .
<http://ex.org/food#Order> a owl:Class .
<http://ex.org/food#Item> a owl:Class .
"#;

const CART: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix base: <https://ontover.org/ns/base#> .
@prefix food: <http://ex.org/food#> .
<http://ex.org/artifact/cart-7> a owl:Ontology ;
    owl:imports <http://ex.org/food> ;
    base:artifactHasTopObject <http://ex.org/artifact/cart-7#top> .
<http://ex.org/artifact/cart-7#top> a food:Order ;
    base:contains <http://ex.org/artifact/cart-7#i1> .
<http://ex.org/artifact/cart-7#i1> a food:Item .
"#;

fn identity(n: u64) -> OntologyIdentity {
    OntologyIdentity::versioned(BASE, format!("{}/version/{}", BASE, n)).unwrap()
}

fn label_edit(label: &str) -> ArtifactEdit {
    ArtifactEdit::from_turtle(&format!(
        "<{}#i1> <http://www.w3.org/2000/01/rdf-schema#label> \"{}\" .",
        BASE, label
    ))
    .unwrap()
}

fn open(config: ManagerConfig) -> OntologyVersionManager {
    OntologyVersionManager::open(config).unwrap()
}

fn loaded() -> OntologyVersionManager {
    let manager = open(ManagerConfig::default());
    manager
        .upload_schema_batch(vec![OntologyDocument::from_turtle(FOOD).unwrap()])
        .unwrap();
    manager
        .load_artifact(OntologyDocument::from_turtle(CART).unwrap(), None)
        .unwrap();
    manager
}

/// WHY: A published current version cannot be edited
/// REASON: Edits create new versions from the current one; allowing them
///         would silently move consumers off the published content
/// BREAKS: Consumers resolving the base IRI get unpublished data
#[test]
fn published_current_version_rejects_edits() {
    let manager = loaded();
    manager.publish_artifact(&identity(1)).unwrap();

    let err = manager
        .update_artifact(&identity(1), label_edit("milk"), None)
        .unwrap_err();
    assert!(matches!(
        err,
        OntoverError::PublishedArtifactModify { ref version, .. } if version.ends_with("/version/1")
    ));

    let versions = manager.list_artifact_versions(BASE).unwrap();
    assert_eq!(versions.len(), 1);
    assert!(versions[0].is_published);
}

/// WHY: A published version stays frozen after a newer version becomes current
/// REASON: Editing an old version is normally reported as stale, but for a
///         published version the publish lock is the real reason it fails
/// BREAKS: Callers retrying with a fresh version when the target is frozen
#[test]
fn published_older_version_rejects_edits() {
    let manager = loaded();
    manager.update_artifact(&identity(1), label_edit("milk"), None).unwrap();
    manager.publish_artifact(&identity(1)).unwrap();

    let err = manager
        .update_artifact(&identity(1), label_edit("bread"), None)
        .unwrap_err();
    match err {
        OntoverError::PublishedArtifactModify { base_iri, version } => {
            assert_eq!(base_iri, BASE);
            assert_eq!(Some(version), identity(1).version_iri);
        }
        other => panic!("Expected PublishedArtifactModify, got {:?}", other),
    }

    // The unpublished current version is still editable
    let third = manager.update_artifact(&identity(2), label_edit("bread"), None).unwrap();
    assert_eq!(third.version_iri, format!("{}/version/3", BASE));
}

/// WHY: Published versions cannot be deleted, nor can versions next to a
///      published current version
/// REASON: Deleting around a published current version could promote
///         another version over it
/// BREAKS: Published IRIs that stop resolving
#[test]
fn published_versions_reject_delete() {
    let manager = loaded();
    manager.update_artifact(&identity(1), label_edit("milk"), None).unwrap();

    // v1 published while v2 is current: v1 is frozen, v2 is not
    manager.publish_artifact(&identity(1)).unwrap();
    let err = manager.delete_artifact_version(&identity(1)).unwrap_err();
    assert!(matches!(err, OntoverError::PublishedArtifactModify { .. }));

    // Publishing the current version freezes the whole base
    manager.publish_artifact(&identity(2)).unwrap();
    let err = manager.delete_artifact_version(&identity(2)).unwrap_err();
    assert!(matches!(err, OntoverError::PublishedArtifactModify { .. }));

    assert_eq!(manager.list_artifact_versions(BASE).unwrap().len(), 2);
}

/// WHY: Publishing is one-way and happens once
/// REASON: A second publish means the caller lost track of state
/// BREAKS: Silent double publishes hide workflow bugs
#[test]
fn republishing_fails_with_already_published() {
    let manager = loaded();
    manager
        .publish_artifact(&OntologyIdentity::unversioned(BASE).unwrap())
        .unwrap();

    let err = manager.publish_artifact(&identity(1)).unwrap_err();
    match err {
        OntoverError::AlreadyPublished { base_iri, version } => {
            assert_eq!(base_iri, BASE);
            assert_eq!(Some(version), identity(1).version_iri);
        }
        other => panic!("Expected AlreadyPublished, got {:?}", other),
    }
}

/// WHY: Dropping previous versions never touches published ones
/// SCENARIO: v1 published while v2 is current, then the store is reopened
///           with previous versions no longer retained and v2 is edited
/// BREAKS: Pruning deletes content that consumers were promised
/// SACRIFICES: If this fails, retention can never be switched off safely
#[test]
fn retention_never_removes_published_versions() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ManagerConfig::default();
    config.spec.store_path = Some(temp_dir.path().join("store"));

    {
        let manager = open(config.clone());
        manager
            .upload_schema_batch(vec![OntologyDocument::from_turtle(FOOD).unwrap()])
            .unwrap();
        manager
            .load_artifact(OntologyDocument::from_turtle(CART).unwrap(), None)
            .unwrap();
        manager.update_artifact(&identity(1), label_edit("milk"), None).unwrap();
        manager.publish_artifact(&identity(1)).unwrap();
    }

    config.spec.artifacts.retain_previous_versions = false;
    let manager = open(config);
    let third = manager
        .update_artifact(&identity(2), label_edit("bread"), Some(DanglingPolicy::Report))
        .unwrap();

    let versions: Vec<String> = manager
        .list_artifact_versions(BASE)
        .unwrap()
        .into_iter()
        .map(|r| r.version_iri)
        .collect();
    assert_eq!(versions, vec![third.version_iri.clone(), format!("{}/version/1", BASE)]);
    assert!(manager.export_artifact(&identity(1), false).unwrap().contains("cart-7#i1"));
}
