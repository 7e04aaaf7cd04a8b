//! Schema Version Manager
//!
//! Schema ontologies are append-only: every upload creates a new version,
//! nothing is edited in place. A batch upload is ordered by imports, then
//! written, reasoned over and recorded inside one transaction. Any failure
//! rolls back the whole batch.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{OntoverError, Result};
use crate::identity::{validate_iri, InferredIdentity, OntologyIdentity};
use crate::ontology::document::{render_ntriples, OntologyDocument};
use crate::resolver::ImportDeclaring;
use crate::store::connection::GraphConnection;
use crate::store::management::{ManagedOntologyRecord, ManagementGraph};
use crate::store::named;
use crate::version::processors::Stage;
use crate::version::{in_transaction, ManagerContext};

/// One document of a schema batch
#[derive(Debug, Clone)]
pub struct SchemaUpload {
    pub document: OntologyDocument,
    /// Explicit version IRI, overriding any `owl:versionIRI` in the document
    pub version_iri: Option<String>,
    /// Promote the new version to current (default true)
    pub set_current: bool,
}

impl SchemaUpload {
    pub fn new(document: OntologyDocument) -> Self {
        Self {
            document,
            version_iri: None,
            set_current: true,
        }
    }

    pub fn with_version(mut self, version_iri: impl Into<String>) -> Self {
        self.version_iri = Some(version_iri.into());
        self
    }

    pub fn without_promotion(mut self) -> Self {
        self.set_current = false;
        self
    }
}

impl ImportDeclaring for SchemaUpload {
    fn base_iri(&self) -> &str {
        self.document.base_iri()
    }

    fn declared_imports(&self) -> &[String] {
        self.document.imports()
    }
}

pub struct SchemaManager {
    ctx: Arc<ManagerContext>,
}

impl SchemaManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    /// Upload a batch of schema documents
    ///
    /// Returns the inferred identities in load order (imports first).
    ///
    /// # Errors
    ///
    /// - `CyclicImport` / `UnresolvedImport` from ordering
    /// - `DuplicateVersion` if an assigned version IRI is already managed
    /// - `ProcessorRejected`, `ProfileViolation`, `InconsistentOntology`
    ///
    /// Nothing from the batch is committed or left cached on failure.
    pub fn upload_batch(&self, uploads: Vec<SchemaUpload>) -> Result<Vec<InferredIdentity>> {
        if uploads.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.ctx.connect()?;
        let ordered = self
            .ctx
            .resolver
            .order_batch(uploads, |iri| self.ctx.import_resolves(&*conn, iri))?;

        let mut prepared = Vec::with_capacity(ordered.len());
        for upload in ordered {
            prepared.push(self.prepare(&*conn, upload)?);
        }

        let bases: Vec<String> = prepared.iter().map(|p| p.document.base_iri().to_string()).collect();
        let mut created = Vec::new();

        let result = self.ctx.locks.with_locks(bases, || {
            in_transaction(&mut *conn, |conn| {
                let mut identities = Vec::with_capacity(prepared.len());
                for upload in &prepared {
                    identities.push(self.write_upload(conn, upload, &mut created)?);
                }
                Ok(identities)
            })
        });

        match result {
            Ok(identities) => {
                info!(count = identities.len(), "schema batch committed");
                Ok(identities)
            }
            Err(err) => {
                warn!(error = %err, "schema batch rolled back");
                self.ctx.evict(&created);
                Err(err)
            }
        }
    }

    /// Upload a single document
    pub fn upload(&self, upload: SchemaUpload) -> Result<InferredIdentity> {
        self.upload_batch(vec![upload])?
            .pop()
            .ok_or_else(|| OntoverError::Store("upload produced no identity".to_string()))
    }

    /// Assign the version IRI, run processors and check the profile
    fn prepare(&self, conn: &dyn GraphConnection, upload: SchemaUpload) -> Result<SchemaUpload> {
        let SchemaUpload {
            mut document,
            version_iri,
            set_current,
        } = upload;

        let base_iri = document.base_iri().to_string();
        let version_iri = version_iri
            .or_else(|| document.version_iri().map(str::to_string))
            .unwrap_or_else(|| format!("{}/version/{}", base_iri.trim_end_matches(&['/', '#'][..]), Uuid::new_v4()));
        validate_iri(&version_iri)?;
        if version_iri == base_iri {
            return Err(OntoverError::InvalidIdentity(format!(
                "version IRI of {} must differ from its base IRI",
                base_iri
            )));
        }
        self.ensure_new_version(conn, &base_iri, &version_iri)?;

        document.set_version_iri(version_iri.clone());
        self.ctx.processors.run(Stage::SchemaUpload, &mut document)?;
        self.ctx.check_profile(&document)?;

        Ok(SchemaUpload {
            document,
            version_iri: Some(version_iri),
            set_current,
        })
    }

    fn ensure_new_version(&self, conn: &dyn GraphConnection, base_iri: &str, version_iri: &str) -> Result<()> {
        if self.ctx.management.find_record(conn, version_iri)?.is_some() {
            return Err(OntoverError::DuplicateVersion {
                base_iri: base_iri.to_string(),
                version: version_iri.to_string(),
            });
        }
        Ok(())
    }

    fn write_upload(
        &self,
        conn: &mut dyn GraphConnection,
        upload: &SchemaUpload,
        created: &mut Vec<OntologyIdentity>,
    ) -> Result<InferredIdentity> {
        let document = &upload.document;
        let identity = document.identity()?;
        let version_iri = identity.require_version()?.to_string();

        // re-checked under the currency lock
        self.ensure_new_version(&*conn, document.base_iri(), &version_iri)?;

        let imports = self.ctx.resolve_imports(&*conn, document)?;
        let inferred = self.ctx.management.scheme().derive(&identity)?;

        self.ctx.write_content(conn, &version_iri, document.statements())?;
        let record = self.ctx.management.set_current_version(
            conn,
            ManagementGraph::Schema,
            &inferred,
            &imports,
            upload.set_current,
        )?;

        created.push(identity.clone());
        let handle = self.ctx.reason(&*conn, &identity)?;
        let written = self.ctx.write_inferred(conn, &record, &handle)?;
        self.ctx
            .management
            .verify_currency(&*conn, ManagementGraph::Schema, document.base_iri())?;

        info!(
            base_iri = %identity.base_iri,
            version_iri = %version_iri,
            imports = imports.len(),
            inferred = written,
            current = record.is_current,
            "schema version recorded"
        );
        Ok(inferred)
    }

    /// Promote an existing version to current
    pub fn set_current(&self, base_iri: &str, version_iri: &str) -> Result<InferredIdentity> {
        let mut conn = self.ctx.connect()?;
        self.ctx.locks.with_locks([base_iri], || {
            in_transaction(&mut *conn, |conn| {
                let record = self
                    .ctx
                    .management
                    .get_version(&*conn, ManagementGraph::Schema, base_iri, version_iri)?
                    .ok_or_else(|| OntoverError::UnmanagedVersion {
                        base_iri: base_iri.to_string(),
                        version: version_iri.to_string(),
                    })?;

                let inferred = record.inferred_identity();
                self.ctx.management.set_current_version(
                    conn,
                    ManagementGraph::Schema,
                    &inferred,
                    &record.imports,
                    true,
                )?;
                self.ctx
                    .management
                    .verify_currency(&*conn, ManagementGraph::Schema, base_iri)?;
                Ok(inferred)
            })
        })
    }

    /// Point `isCurrentInferred` at an existing version, leaving `isCurrent`
    ///
    /// Used when a recomputed inferred graph is recorded ahead of promoting
    /// its version.
    pub fn set_current_inferred(&self, base_iri: &str, version_iri: &str) -> Result<InferredIdentity> {
        let mut conn = self.ctx.connect()?;
        self.ctx.locks.with_locks([base_iri], || {
            in_transaction(&mut *conn, |conn| {
                let management = &self.ctx.management;
                let record = management
                    .get_version(&*conn, ManagementGraph::Schema, base_iri, version_iri)?
                    .ok_or_else(|| OntoverError::UnmanagedVersion {
                        base_iri: base_iri.to_string(),
                        version: version_iri.to_string(),
                    })?;
                management.set_current_inferred_version(conn, ManagementGraph::Schema, &record.identity())?;
                management.verify_currency(&*conn, ManagementGraph::Schema, base_iri)?;
                debug!(base_iri = %base_iri, version_iri = %version_iri, "current inferred version moved");
                Ok(record.inferred_identity())
            })
        })
    }

    /// Current version of a schema base IRI
    pub fn get_current(&self, base_iri: &str) -> Result<InferredIdentity> {
        let conn = self.ctx.connect()?;
        self.ctx
            .management
            .current_record(&*conn, ManagementGraph::Schema, base_iri)?
            .map(|r| r.inferred_identity())
            .ok_or_else(|| OntoverError::UnmanagedSchemaIri(base_iri.to_string()))
    }

    pub fn get_version(&self, base_iri: &str, version_iri: &str) -> Result<ManagedOntologyRecord> {
        let conn = self.ctx.connect()?;
        self.ctx
            .management
            .get_version(&*conn, ManagementGraph::Schema, base_iri, version_iri)?
            .ok_or_else(|| OntoverError::UnmanagedVersion {
                base_iri: base_iri.to_string(),
                version: version_iri.to_string(),
            })
    }

    /// Look up a base IRI (current version) or a version IRI (that version)
    pub fn get_by_iri(&self, iri: &str) -> Result<ManagedOntologyRecord> {
        let conn = self.ctx.connect()?;
        let management = &self.ctx.management;

        if let Some(record) = management.current_record(&*conn, ManagementGraph::Schema, iri)? {
            return Ok(record);
        }
        management
            .find_by_version(&*conn, ManagementGraph::Schema, iri)?
            .ok_or_else(|| OntoverError::UnmanagedIri { iri: iri.to_string() })
    }

    /// Every version of a base IRI, current first
    pub fn list_versions(&self, base_iri: &str) -> Result<Vec<ManagedOntologyRecord>> {
        let conn = self.ctx.connect()?;
        let versions = self
            .ctx
            .management
            .list_all_versions(&*conn, ManagementGraph::Schema, base_iri)?;
        if versions.is_empty() {
            return Err(OntoverError::UnmanagedSchemaIri(base_iri.to_string()));
        }
        Ok(versions)
    }

    /// Current record of every managed schema, by base IRI
    pub fn list_current_schemas(&self) -> Result<Vec<ManagedOntologyRecord>> {
        let conn = self.ctx.connect()?;
        let management = &self.ctx.management;
        let mut current = Vec::new();
        for base_iri in management.list_base_iris(&*conn, ManagementGraph::Schema)? {
            if let Some(record) = management.current_record(&*conn, ManagementGraph::Schema, &base_iri)? {
                current.push(record);
            }
        }
        Ok(current)
    }

    /// N-Triples of a schema version, optionally with its inferred statements
    pub fn export(&self, iri: &str, include_inferred: bool) -> Result<String> {
        let record = self.get_by_iri(iri)?;
        let conn = self.ctx.connect()?;
        let mut statements = conn.export_graph(&named(&record.version_iri)?)?;
        if include_inferred {
            statements.extend(conn.export_graph(&named(&record.inferred_iri)?)?);
        }
        Ok(render_ntriples(&statements))
    }
}
