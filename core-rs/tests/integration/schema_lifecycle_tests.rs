//! Integration tests for the schema version lifecycle
//!
//! Tests the full lifecycle of schema operations including:
//! - Import-ordered batch upload
//! - Currency moves on new versions and explicit promotion
//! - Lookup by base IRI, version IRI or either
//! - Batch rollback on ordering, profile and consistency failures
//! - Persistence across reopen of an on-disk store

use std::sync::Arc;

use ontover_core::config::ManagerConfig;
use ontover_core::{
    OntologyDocument, OntologyProcessor, OntologyVersionManager, OntoverError, OxigraphRepository, ProcessorRegistry,
    SchemaUpload, Stage, SubsumptionReasoner,
};
use tempfile::TempDir;

const FOOD_V1: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
<http://ex.org/food> a owl:Ontology ; owl:versionIRI <http://ex.org/food/1.0> .
<http://ex.org/food#Food> a owl:Class .
<http://ex.org/food#Topping> a owl:Class ; rdfs:subClassOf <http://ex.org/food#Food> .
"#;

const FOOD_V2: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
<http://ex.org/food> a owl:Ontology ; owl:versionIRI <http://ex.org/food/2.0> .
<http://ex.org/food#Food> a owl:Class .
<http://ex.org/food#Topping> a owl:Class ; rdfs:subClassOf <http://ex.org/food#Food> .
<http://ex.org/food#Drink> a owl:Class ; rdfs:subClassOf <http://ex.org/food#Food> .
"#;

const PIZZA: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
<http://ex.org/pizza> a owl:Ontology ;
    owl:versionIRI <http://ex.org/pizza/1.0> ;
    owl:imports <http://ex.org/food> .
<http://ex.org/pizza#Pizza> a owl:Class ; rdfs:subClassOf <http://ex.org/food#Food> .
"#;

const MARGHERITA: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
<http://ex.org/margherita> a owl:Ontology ;
    owl:versionIRI <http://ex.org/margherita/1.0> ;
    owl:imports <http://ex.org/pizza> .
<http://ex.org/margherita#Margherita> a owl:Class ; rdfs:subClassOf <http://ex.org/pizza#Pizza> .
"#;

fn doc(turtle: &str) -> OntologyDocument {
    OntologyDocument::from_turtle(turtle).unwrap()
}

fn manager() -> OntologyVersionManager {
    OntologyVersionManager::in_memory().unwrap()
}

#[test]
fn test_batch_upload_in_import_order() {
    let manager = manager();

    // Submitted importers first
    let loaded = manager
        .upload_schema_batch(vec![doc(MARGHERITA), doc(PIZZA), doc(FOOD_V1)])
        .unwrap();

    let order: Vec<&str> = loaded.iter().map(|i| i.base_iri.as_str()).collect();
    assert_eq!(
        order,
        vec!["http://ex.org/food", "http://ex.org/pizza", "http://ex.org/margherita"]
    );

    for identity in &loaded {
        let current = manager.get_current_schema_version(&identity.base_iri).unwrap();
        assert_eq!(&current, identity);
        assert_eq!(current.inferred_iri, format!("urn:ontover:inferred:{}", current.version_iri));
    }
    assert_eq!(manager.list_schemas().unwrap().len(), 3);
}

#[test]
fn test_new_version_moves_currency_and_keeps_pinned_imports() {
    let manager = manager();
    manager.upload_schema_batch(vec![doc(FOOD_V1), doc(PIZZA)]).unwrap();

    manager.upload_schema_batch(vec![doc(FOOD_V2)]).unwrap();

    let versions = manager.list_schema_versions("http://ex.org/food").unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version_iri, "http://ex.org/food/2.0");
    assert!(versions[0].is_current);
    assert!(!versions[1].is_current);
    assert!(versions[0].sequence > versions[1].sequence);

    // pizza was recorded against food 1.0 and stays that way
    let pizza = manager.get_schema_by_iri("http://ex.org/pizza").unwrap();
    assert_eq!(pizza.imports.len(), 1);
    assert_eq!(pizza.imports[0].version_iri.as_deref(), Some("http://ex.org/food/1.0"));
}

#[test]
fn test_upload_without_promotion_and_explicit_promotion() {
    let manager = manager();
    manager.upload_schema_batch(vec![doc(FOOD_V1)]).unwrap();

    manager
        .schemas()
        .upload(SchemaUpload::new(doc(FOOD_V2)).without_promotion())
        .unwrap();
    assert_eq!(
        manager.get_current_schema_version("http://ex.org/food").unwrap().version_iri,
        "http://ex.org/food/1.0"
    );

    // Inferred pointer can lead the current pointer
    manager
        .set_current_inferred_schema_version("http://ex.org/food", "http://ex.org/food/2.0")
        .unwrap();
    let versions = manager.list_schema_versions("http://ex.org/food").unwrap();
    assert_eq!(versions[0].version_iri, "http://ex.org/food/1.0");
    assert!(versions[0].is_current && !versions[0].is_current_inferred);
    assert!(versions[1].is_current_inferred);

    manager
        .set_current_schema_version("http://ex.org/food", "http://ex.org/food/2.0")
        .unwrap();
    assert_eq!(
        manager.get_current_schema_version("http://ex.org/food").unwrap().version_iri,
        "http://ex.org/food/2.0"
    );

    let err = manager
        .set_current_schema_version("http://ex.org/food", "http://ex.org/food/9.9")
        .unwrap_err();
    assert!(matches!(err, OntoverError::UnmanagedVersion { .. }));
}

#[test]
fn test_first_version_becomes_current_even_without_promotion() {
    let manager = manager();
    manager
        .schemas()
        .upload(SchemaUpload::new(doc(FOOD_V1)).without_promotion())
        .unwrap();

    assert_eq!(
        manager.get_current_schema_version("http://ex.org/food").unwrap().version_iri,
        "http://ex.org/food/1.0"
    );
}

#[test]
fn test_generated_and_explicit_version_iris() {
    let manager = manager();
    let unversioned = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        <http://ex.org/drinks/> a owl:Ontology .
        <http://ex.org/drinks/Wine> a owl:Class .
    "#;

    let generated = manager.upload_schema_batch(vec![doc(unversioned)]).unwrap().remove(0);
    assert!(generated.version_iri.starts_with("http://ex.org/drinks/version/"));

    let explicit = manager
        .schemas()
        .upload(SchemaUpload::new(doc(unversioned)).with_version("http://ex.org/drinks/2024"))
        .unwrap();
    assert_eq!(explicit.version_iri, "http://ex.org/drinks/2024");

    // The stored header agrees with the assigned identity
    let exported = manager.export_schema("http://ex.org/drinks/2024", false).unwrap();
    assert!(exported.contains("<http://www.w3.org/2002/07/owl#versionIRI> <http://ex.org/drinks/2024>"));
    assert!(!exported.contains(&generated.version_iri));
}

#[test]
fn test_lookup_by_either_iri() {
    let manager = manager();
    manager.upload_schema_batch(vec![doc(FOOD_V1)]).unwrap();

    let by_base = manager.get_schema_by_iri("http://ex.org/food").unwrap();
    let by_version = manager.get_schema_by_iri("http://ex.org/food/1.0").unwrap();
    assert_eq!(by_base, by_version);

    let err = manager.get_schema_by_iri("http://ex.org/unknown").unwrap_err();
    assert!(matches!(err, OntoverError::UnmanagedIri { .. }));

    let err = manager.get_current_schema_version("http://ex.org/unknown").unwrap_err();
    assert!(matches!(err, OntoverError::UnmanagedSchemaIri(_)));
}

#[test]
fn test_import_by_version_iri_pins_that_version() {
    let manager = manager();
    manager.upload_schema_batch(vec![doc(FOOD_V1)]).unwrap();
    manager.upload_schema_batch(vec![doc(FOOD_V2)]).unwrap();

    let pinned = PIZZA.replace("owl:imports <http://ex.org/food>", "owl:imports <http://ex.org/food/1.0>");
    manager.upload_schema_batch(vec![doc(&pinned)]).unwrap();

    let pizza = manager.get_schema_by_iri("http://ex.org/pizza").unwrap();
    assert_eq!(pizza.imports[0].version_iri.as_deref(), Some("http://ex.org/food/1.0"));
}

#[test]
fn test_cyclic_batch_rejected_and_nothing_committed() {
    let manager = manager();
    let a = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        <http://ex.org/a> a owl:Ontology ; owl:versionIRI <http://ex.org/a/1> ; owl:imports <http://ex.org/b> .
    "#;
    let b = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        <http://ex.org/b> a owl:Ontology ; owl:versionIRI <http://ex.org/b/1> ; owl:imports <http://ex.org/a> .
    "#;

    let err = manager
        .upload_schema_batch(vec![doc(FOOD_V1), doc(a), doc(b)])
        .unwrap_err();
    match err {
        OntoverError::CyclicImport { base_iris } => {
            assert_eq!(base_iris, vec!["http://ex.org/a".to_string(), "http://ex.org/b".to_string()]);
        }
        other => panic!("Expected CyclicImport, got {:?}", other),
    }

    assert!(manager.get_current_schema_version("http://ex.org/food").is_err());
}

#[test]
fn test_unresolved_import_rejected() {
    let manager = manager();
    let err = manager.upload_schema_batch(vec![doc(PIZZA)]).unwrap_err();
    match err {
        OntoverError::UnresolvedImport { ontology, import } => {
            assert_eq!(ontology, "http://ex.org/pizza");
            assert_eq!(import, "http://ex.org/food");
        }
        other => panic!("Expected UnresolvedImport, got {:?}", other),
    }
}

#[test]
fn test_duplicate_version_rejected() {
    let manager = manager();
    manager.upload_schema_batch(vec![doc(FOOD_V1)]).unwrap();

    let err = manager.upload_schema_batch(vec![doc(FOOD_V1)]).unwrap_err();
    assert!(matches!(err, OntoverError::DuplicateVersion { .. }));
    assert_eq!(manager.list_schema_versions("http://ex.org/food").unwrap().len(), 1);
}

#[test]
fn test_profile_violation_rolls_back_batch() {
    let manager = manager();
    let redefines = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <http://ex.org/bad> a owl:Ontology ; owl:versionIRI <http://ex.org/bad/1> .
        owl:Thing rdfs:subClassOf <http://ex.org/bad#Root> .
    "#;

    let err = manager
        .upload_schema_batch(vec![doc(FOOD_V1), doc(redefines)])
        .unwrap_err();
    match err {
        OntoverError::ProfileViolation(report) => {
            assert_eq!(report.ontology, "http://ex.org/bad");
            assert!(!report.in_profile);
            assert!(report.violations.iter().any(|v| v.contains("owl#Thing")));
        }
        other => panic!("Expected ProfileViolation, got {:?}", other),
    }
    assert!(manager.get_current_schema_version("http://ex.org/food").is_err());
}

#[test]
fn test_inconsistent_schema_rolls_back_batch() {
    let manager = manager();
    let inconsistent = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        <http://ex.org/clash> a owl:Ontology ;
            owl:versionIRI <http://ex.org/clash/1> ;
            owl:imports <http://ex.org/food> .
        <http://ex.org/clash#Stone> a owl:Class ; owl:disjointWith <http://ex.org/food#Food> .
        <http://ex.org/clash#pebble> a <http://ex.org/clash#Stone>, <http://ex.org/food#Topping> .
    "#;

    let err = manager
        .upload_schema_batch(vec![doc(FOOD_V1), doc(inconsistent)])
        .unwrap_err();
    match err {
        OntoverError::InconsistentOntology(report) => {
            assert!(!report.consistent);
            assert!(report.explanations.iter().any(|e| e.contains("pebble")));
        }
        other => panic!("Expected InconsistentOntology, got {:?}", other),
    }

    assert!(manager.get_current_schema_version("http://ex.org/food").is_err());
    assert_eq!(manager.cached_ontologies().unwrap(), 0);
}

struct RequireLabel;

impl OntologyProcessor for RequireLabel {
    fn name(&self) -> &str {
        "require-label"
    }

    fn process(&self, stage: Stage, document: &mut OntologyDocument) -> ontover_core::Result<()> {
        let has_label = document
            .statements()
            .iter()
            .any(|t| t.predicate.as_str() == "http://www.w3.org/2000/01/rdf-schema#label");
        if has_label {
            Ok(())
        } else {
            Err(OntoverError::ProcessorRejected {
                stage,
                processor: self.name().to_string(),
                reason: format!("{} has no rdfs:label", document.base_iri()),
            })
        }
    }
}

#[test]
fn test_processor_rejection_aborts_upload() {
    let mut processors = ProcessorRegistry::with_defaults();
    processors.register(Stage::SchemaUpload, RequireLabel);
    assert_eq!(processors.names(Stage::SchemaUpload), vec!["ontology-header", "require-label"]);

    let manager = OntologyVersionManager::new(
        ManagerConfig::default(),
        Arc::new(OxigraphRepository::in_memory().unwrap()),
        Box::new(SubsumptionReasoner::new()),
        processors,
    )
    .unwrap();

    let err = manager.upload_schema_batch(vec![doc(FOOD_V1)]).unwrap_err();
    match err {
        OntoverError::ProcessorRejected { stage, processor, .. } => {
            assert_eq!(stage, Stage::SchemaUpload);
            assert_eq!(processor, "require-label");
        }
        other => panic!("Expected ProcessorRejected, got {:?}", other),
    }

    let labelled = format!(
        "{}\n<http://ex.org/food> <http://www.w3.org/2000/01/rdf-schema#label> \"Food\" .",
        FOOD_V1
    );
    assert!(manager.upload_schema_batch(vec![doc(&labelled)]).is_ok());
}

#[test]
fn test_export_includes_inferred_statements_on_request() {
    let manager = manager();
    manager.upload_schema_batch(vec![doc(FOOD_V1), doc(PIZZA), doc(MARGHERITA)]).unwrap();

    let inferred_line = "<http://ex.org/margherita#Margherita> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://ex.org/food#Food> .";
    let asserted = manager.export_schema("http://ex.org/margherita", false).unwrap();
    let with_inferred = manager.export_schema("http://ex.org/margherita", true).unwrap();

    assert!(!asserted.contains(inferred_line));
    assert!(with_inferred.contains(inferred_line));
}

#[test]
fn test_on_disk_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ManagerConfig::new("persistent");
    config.spec.store_path = Some(temp_dir.path().join("store"));

    {
        let manager = OntologyVersionManager::open(config.clone()).unwrap();
        manager.upload_schema_batch(vec![doc(FOOD_V1), doc(PIZZA)]).unwrap();
    }

    let reopened = OntologyVersionManager::open(config).unwrap();
    let pizza = reopened.get_current_schema_version("http://ex.org/pizza").unwrap();
    assert_eq!(pizza.version_iri, "http://ex.org/pizza/1.0");
    assert_eq!(reopened.list_schemas().unwrap().len(), 2);
}
