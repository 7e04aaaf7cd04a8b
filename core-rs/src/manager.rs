//! Ontology Version Manager
//!
//! Caller-facing facade over the schema and artifact managers. One manager
//! owns one repository, one reasoner service and one set of currency locks;
//! it is `Send + Sync` and meant to be shared behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use walkdir::WalkDir;

use crate::artifact::auditor::{DanglingPolicy, ReachabilityAuditor, ReachabilityReport};
use crate::artifact::manager::{ArtifactEdit, ArtifactManager, ArtifactSettings, PublishFilter};
use crate::config::ManagerConfig;
use crate::errors::{OntoverError, Result};
use crate::identity::{InferredIdentity, InferredIriScheme, OntologyIdentity};
use crate::ontology::cache::ReasonerService;
use crate::ontology::document::OntologyDocument;
use crate::ontology::reasoner::{Reasoner, SubsumptionReasoner};
use crate::store::connection::{OxigraphRepository, Repository};
use crate::store::management::{ManagedOntologyRecord, ManagementGraphStore};
use crate::version::processors::ProcessorRegistry;
use crate::version::schema::{SchemaManager, SchemaUpload};
use crate::version::ManagerContext;

/// File extensions picked up when uploading a directory
pub const ONTOLOGY_EXTENSIONS: [&str; 2] = ["ttl", "nt"];

pub struct OntologyVersionManager {
    config: ManagerConfig,
    ctx: Arc<ManagerContext>,
    schemas: SchemaManager,
    artifacts: ArtifactManager,
}

impl OntologyVersionManager {
    /// Open the store named by the configuration with the built-in reasoner
    pub fn open(config: ManagerConfig) -> Result<Self> {
        let repository: Arc<dyn Repository> = match &config.spec.store_path {
            Some(path) => Arc::new(OxigraphRepository::open(path)?),
            None => Arc::new(OxigraphRepository::in_memory()?),
        };
        Self::new(
            config,
            repository,
            Box::new(SubsumptionReasoner::new()),
            ProcessorRegistry::with_defaults(),
        )
    }

    /// Open an in-memory manager with default configuration
    pub fn in_memory() -> Result<Self> {
        Self::open(ManagerConfig::default())
    }

    pub fn new(
        config: ManagerConfig,
        repository: Arc<dyn Repository>,
        reasoner: Box<dyn Reasoner>,
        processors: ProcessorRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let spec = &config.spec;

        let management = ManagementGraphStore::new(
            &spec.management_graphs.schema,
            &spec.management_graphs.artifact,
            InferredIriScheme::new(spec.inferred_prefix.clone())?,
            spec.artifacts.retain_previous_versions,
        )?;
        let auditor = ReachabilityAuditor::new(
            &spec.artifacts.top_object_predicate,
            &spec.artifacts.contains_predicate,
        )?;
        let settings = ArtifactSettings {
            dangling_policy: spec.artifacts.dangling_policy,
            version_segment: spec.artifacts.version_segment.clone(),
        };

        let service = Arc::new(ReasonerService::new(reasoner));
        let ctx = Arc::new(ManagerContext::new(repository, management, service, processors));

        info!(
            name = %config.metadata.name,
            reasoner = %ctx.reasoner.reasoner_name().unwrap_or_default(),
            persistent = spec.store_path.is_some(),
            "version manager ready"
        );

        Ok(Self {
            schemas: SchemaManager::new(Arc::clone(&ctx)),
            artifacts: ArtifactManager::new(Arc::clone(&ctx), auditor, settings),
            config,
            ctx,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<ManagerContext> {
        &self.ctx
    }

    pub fn schemas(&self) -> &SchemaManager {
        &self.schemas
    }

    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    // ---- schemas ----

    /// Upload schema documents as one batch, returned in load order
    pub fn upload_schema_batch(&self, documents: Vec<OntologyDocument>) -> Result<Vec<InferredIdentity>> {
        self.schemas
            .upload_batch(documents.into_iter().map(SchemaUpload::new).collect())
    }

    /// Upload schema files; directories are walked for ontology files
    pub fn upload_schema_files(&self, paths: &[PathBuf]) -> Result<Vec<InferredIdentity>> {
        let mut documents = Vec::new();
        for path in paths {
            if path.is_dir() {
                for file in collect_ontology_files(path)? {
                    documents.push(OntologyDocument::from_file(&file)?);
                }
            } else {
                documents.push(OntologyDocument::from_file(path)?);
            }
        }
        self.upload_schema_batch(documents)
    }

    /// Upload every file of the configured schema manifest as one batch
    pub fn bootstrap_schemas(&self) -> Result<Vec<InferredIdentity>> {
        let manifest = &self.config.spec.schema_manifest;
        if manifest.is_empty() {
            info!("schema manifest is empty, nothing to bootstrap");
            return Ok(Vec::new());
        }
        let identities = self.upload_schema_files(manifest)?;
        info!(count = identities.len(), "schemas bootstrapped");
        Ok(identities)
    }

    pub fn get_current_schema_version(&self, base_iri: &str) -> Result<InferredIdentity> {
        self.schemas.get_current(base_iri)
    }

    pub fn set_current_schema_version(&self, base_iri: &str, version_iri: &str) -> Result<InferredIdentity> {
        self.schemas.set_current(base_iri, version_iri)
    }

    pub fn set_current_inferred_schema_version(&self, base_iri: &str, version_iri: &str) -> Result<InferredIdentity> {
        self.schemas.set_current_inferred(base_iri, version_iri)
    }

    pub fn get_schema_by_iri(&self, iri: &str) -> Result<ManagedOntologyRecord> {
        self.schemas.get_by_iri(iri)
    }

    pub fn list_schema_versions(&self, base_iri: &str) -> Result<Vec<ManagedOntologyRecord>> {
        self.schemas.list_versions(base_iri)
    }

    pub fn list_schemas(&self) -> Result<Vec<ManagedOntologyRecord>> {
        self.schemas.list_current_schemas()
    }

    pub fn export_schema(&self, iri: &str, include_inferred: bool) -> Result<String> {
        self.schemas.export(iri, include_inferred)
    }

    // ---- artifacts ----

    pub fn load_artifact(&self, document: OntologyDocument, policy: Option<DanglingPolicy>) -> Result<InferredIdentity> {
        self.artifacts.load_artifact(document, policy)
    }

    pub fn load_artifact_file(&self, path: &Path, policy: Option<DanglingPolicy>) -> Result<InferredIdentity> {
        self.load_artifact(OntologyDocument::from_file(path)?, policy)
    }

    pub fn get_current_artifact_version(&self, base_iri: &str) -> Result<InferredIdentity> {
        self.artifacts.get_current(base_iri)
    }

    pub fn get_artifact_by_iri(&self, iri: &str) -> Result<ManagedOntologyRecord> {
        self.artifacts.get_by_iri(iri)
    }

    pub fn list_artifact_versions(&self, base_iri: &str) -> Result<Vec<ManagedOntologyRecord>> {
        self.artifacts.list_versions(base_iri)
    }

    pub fn publish_artifact(&self, identity: &OntologyIdentity) -> Result<InferredIdentity> {
        self.artifacts.publish_artifact(identity)
    }

    /// Apply an edit to the current artifact version
    ///
    /// `policy` overrides the configured dangling policy for this edit.
    pub fn update_artifact(
        &self,
        identity: &OntologyIdentity,
        edit: ArtifactEdit,
        policy: Option<DanglingPolicy>,
    ) -> Result<InferredIdentity> {
        self.artifacts.update_artifact(identity, edit, policy)
    }

    pub fn delete_artifact_version(&self, identity: &OntologyIdentity) -> Result<bool> {
        self.artifacts.delete_artifact_version(identity)
    }

    pub fn list_artifacts(&self, filter: PublishFilter) -> Result<Vec<ManagedOntologyRecord>> {
        self.artifacts.list_artifacts(filter)
    }

    pub fn export_artifact(&self, identity: &OntologyIdentity, include_inferred: bool) -> Result<String> {
        self.artifacts.export_artifact(identity, include_inferred)
    }

    pub fn artifact_schema_imports(&self, identity: &OntologyIdentity) -> Result<Vec<OntologyIdentity>> {
        self.artifacts.artifact_schema_imports(identity)
    }

    pub fn check_reachability(&self, identity: &OntologyIdentity) -> Result<ReachabilityReport> {
        self.artifacts.check_reachability(identity)
    }

    /// Look an IRI up as a schema first, then as an artifact
    pub fn get_by_iri(&self, iri: &str) -> Result<ManagedOntologyRecord> {
        match self.schemas.get_by_iri(iri) {
            Err(OntoverError::UnmanagedIri { .. }) => self.artifacts.get_by_iri(iri),
            other => other,
        }
    }

    /// Number of cached reasoning handles
    pub fn cached_ontologies(&self) -> Result<usize> {
        self.ctx.reasoner.with_exclusive_access(|state| Ok(state.cache.len()))
    }
}

/// Ontology files under `dir`, sorted by path
pub fn collect_ontology_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if ONTOLOGY_EXTENSIONS.iter().any(|ext| name.ends_with(&format!(".{}", ext))) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
