//! Version management
//!
//! - locks: per-base-IRI currency locks
//! - processors: stage-keyed document processor registry
//! - schema: schema Version Manager (batch upload, currency, lookup)
//!
//! `ManagerContext` bundles the collaborators both the schema and the
//! artifact managers work against.

pub mod locks;
pub mod processors;
pub mod schema;

pub use locks::CurrencyLocks;
pub use processors::{OntologyHeaderProcessor, OntologyProcessor, ProcessorRegistry, Stage};
pub use schema::{SchemaManager, SchemaUpload};

use std::sync::Arc;

use oxigraph::model::Triple;
use tracing::{debug, warn};

use crate::errors::{OntoverError, Result};
use crate::identity::OntologyIdentity;
use crate::ontology::cache::{CacheContext, LoadedOntology, ReasonerService};
use crate::ontology::document::OntologyDocument;
use crate::resolver::DependencyResolver;
use crate::store::connection::{GraphConnection, Repository};
use crate::store::management::{ManagedOntologyRecord, ManagementGraph, ManagementGraphStore};
use crate::store::named;

/// Collaborators shared by the schema and artifact managers
pub struct ManagerContext {
    pub repository: Arc<dyn Repository>,
    pub management: ManagementGraphStore,
    pub resolver: DependencyResolver,
    pub reasoner: Arc<ReasonerService>,
    pub locks: CurrencyLocks,
    pub processors: ProcessorRegistry,
}

impl ManagerContext {
    pub fn new(
        repository: Arc<dyn Repository>,
        management: ManagementGraphStore,
        reasoner: Arc<ReasonerService>,
        processors: ProcessorRegistry,
    ) -> Self {
        Self {
            repository,
            management,
            resolver: DependencyResolver::new(),
            reasoner,
            locks: CurrencyLocks::new(),
            processors,
        }
    }

    pub fn connect(&self) -> Result<Box<dyn GraphConnection>> {
        self.repository.connect()
    }

    pub fn cache_context<'a>(&'a self, conn: &'a dyn GraphConnection) -> CacheContext<'a> {
        CacheContext {
            conn,
            resolver: &self.resolver,
            management: &self.management,
        }
    }

    /// Whether an import IRI names a managed schema, by base or by version
    pub fn import_resolves(&self, conn: &dyn GraphConnection, iri: &str) -> Result<bool> {
        Ok(self.management.is_managed(conn, ManagementGraph::Schema, iri)?
            || self
                .management
                .find_by_version(conn, ManagementGraph::Schema, iri)?
                .is_some())
    }

    /// Resolve an import IRI to a schema version
    ///
    /// A base IRI resolves to its current version, a version IRI to itself.
    pub fn resolve_import(&self, conn: &dyn GraphConnection, owner: &str, iri: &str) -> Result<OntologyIdentity> {
        if let Some(current) = self
            .management
            .get_current_version(conn, ManagementGraph::Schema, iri)?
        {
            return Ok(current);
        }
        if let Some(record) = self
            .management
            .find_by_version(conn, ManagementGraph::Schema, iri)?
        {
            return Ok(record.identity());
        }
        Err(OntoverError::UnresolvedImport {
            ontology: owner.to_string(),
            import: iri.to_string(),
        })
    }

    pub fn resolve_imports(&self, conn: &dyn GraphConnection, document: &OntologyDocument) -> Result<Vec<OntologyIdentity>> {
        let mut imports = Vec::with_capacity(document.imports().len());
        for import in document.imports() {
            let resolved = self.resolve_import(conn, document.base_iri(), import)?;
            if !imports.contains(&resolved) {
                imports.push(resolved);
            }
        }
        Ok(imports)
    }

    /// Fail with `ProfileViolation` if the reasoner rejects the document
    pub fn check_profile(&self, document: &OntologyDocument) -> Result<()> {
        let report = self
            .reasoner
            .with_exclusive_access(|state| state.reasoner.check_profile(document))?;
        if report.in_profile {
            Ok(())
        } else {
            Err(OntoverError::ProfileViolation(report))
        }
    }

    /// Load a recorded version into the reasoner and check its consistency
    pub fn reason(&self, conn: &dyn GraphConnection, identity: &OntologyIdentity) -> Result<Arc<LoadedOntology>> {
        let ctx = self.cache_context(conn);
        self.reasoner.with_exclusive_access(|state| state.ensure(identity, &ctx))
    }

    /// Replace the inferred graph of a record with the handle's inferences
    pub fn write_inferred(
        &self,
        conn: &mut dyn GraphConnection,
        record: &ManagedOntologyRecord,
        handle: &LoadedOntology,
    ) -> Result<usize> {
        let graph = named(&record.inferred_iri)?;
        conn.clear_graph(&graph)?;
        let mut written = 0;
        for statement in handle.inferred() {
            if conn.add(statement.clone(), &graph)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Write statements into a version's content graph
    pub fn write_content(&self, conn: &mut dyn GraphConnection, version_iri: &str, statements: &[Triple]) -> Result<()> {
        let graph = named(version_iri)?;
        for statement in statements {
            conn.add(statement.clone(), &graph)?;
        }
        Ok(())
    }

    /// Drop cache entries built from versions that were never committed
    pub fn evict(&self, created: &[OntologyIdentity]) {
        if created.is_empty() {
            return;
        }
        let evicted = self.reasoner.with_exclusive_access(|state| {
            Ok(created
                .iter()
                .map(|identity| state.cache.remove_identity(identity))
                .sum::<usize>())
        });
        match evicted {
            Ok(count) => debug!(count, "evicted cache entries of rolled back versions"),
            Err(err) => warn!(error = %err, "failed to evict cache entries"),
        }
    }
}

/// Run `f` inside a transaction on `conn`, committing on success and rolling
/// back on failure
pub fn in_transaction<T, F>(conn: &mut dyn GraphConnection, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn GraphConnection) -> Result<T>,
{
    conn.begin()?;
    match f(&mut *conn) {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
