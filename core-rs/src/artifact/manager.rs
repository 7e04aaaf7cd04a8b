//! Artifact Version Manager
//!
//! Artifacts are project data ontologies that import schema ontologies.
//! Every edit produces a new version `<base>/<segment>/<n>` built from a copy
//! of the current content; the edit, the reachability audit, reasoning and
//! promotion to current all happen in one transaction. Publishing freezes the
//! base IRI: once the current version is published nothing sharing its base
//! may be edited or deleted.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use oxigraph::model::{NamedNode, Subject, Term, Triple};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::auditor::{AuditScope, DanglingPolicy, ReachabilityAuditor, ReachabilityReport};
use crate::errors::{OntoverError, Result};
use crate::identity::{InferredIdentity, OntologyIdentity};
use crate::ontology::document::{parse_statements, render_ntriples, OntologyDocument};
use crate::store::connection::GraphConnection;
use crate::store::management::{ManagedOntologyRecord, ManagementGraph};
use crate::store::named;
use crate::version::processors::Stage;
use crate::version::{in_transaction, ManagerContext};

/// How incoming statements combine with the current content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdatePolicy {
    /// Statements of every subject named in the additions are replaced
    ReplaceExisting,
    /// Additions are merged into the existing statements
    #[default]
    MergeWithExisting,
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePolicy::ReplaceExisting => write!(f, "REPLACE_EXISTING"),
            UpdatePolicy::MergeWithExisting => write!(f, "MERGE_WITH_EXISTING"),
        }
    }
}

impl FromStr for UpdatePolicy {
    type Err = OntoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "REPLACE_EXISTING" | "REPLACE" => Ok(UpdatePolicy::ReplaceExisting),
            "MERGE_WITH_EXISTING" | "MERGE" => Ok(UpdatePolicy::MergeWithExisting),
            _ => Err(OntoverError::Config(format!("unknown update policy: {}", s))),
        }
    }
}

/// Which artifacts to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishFilter {
    #[default]
    All,
    Published,
    Unpublished,
}

impl PublishFilter {
    fn accepts(&self, record: &ManagedOntologyRecord) -> bool {
        match self {
            PublishFilter::All => true,
            PublishFilter::Published => record.is_published,
            PublishFilter::Unpublished => !record.is_published,
        }
    }
}

/// Statements to add to and remove from an artifact
#[derive(Debug, Clone, Default)]
pub struct ArtifactEdit {
    pub additions: Vec<Triple>,
    pub removals: Vec<Triple>,
    pub update_policy: UpdatePolicy,
}

impl ArtifactEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edit whose additions are the statements of a Turtle fragment
    pub fn from_turtle(additions: &str) -> Result<Self> {
        Ok(Self {
            additions: parse_statements(additions)?,
            ..Self::default()
        })
    }

    pub fn add(mut self, statement: Triple) -> Self {
        self.additions.push(statement);
        self
    }

    pub fn remove(mut self, statement: Triple) -> Self {
        self.removals.push(statement);
        self
    }

    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.update_policy = policy;
        self
    }

    /// Named subjects and objects mentioned by the edit
    pub fn touched_objects(&self) -> BTreeSet<String> {
        let mut touched = BTreeSet::new();
        for statement in self.additions.iter().chain(self.removals.iter()) {
            if let Subject::NamedNode(node) = &statement.subject {
                touched.insert(node.as_str().to_string());
            }
            if let Term::NamedNode(node) = &statement.object {
                touched.insert(node.as_str().to_string());
            }
        }
        touched
    }

    /// Apply to a statement list, keeping first-seen order
    fn apply(&self, mut statements: Vec<Triple>) -> Vec<Triple> {
        if self.update_policy == UpdatePolicy::ReplaceExisting {
            let replaced: HashSet<&Subject> = self.additions.iter().map(|t| &t.subject).collect();
            statements.retain(|t| !replaced.contains(&t.subject));
        }

        let removals: HashSet<&Triple> = self.removals.iter().collect();
        statements.retain(|t| !removals.contains(t));

        let mut seen: HashSet<Triple> = statements.iter().cloned().collect();
        for statement in &self.additions {
            if !removals.contains(statement) && seen.insert(statement.clone()) {
                statements.push(statement.clone());
            }
        }
        statements
    }
}

/// Artifact behaviour taken from configuration
#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub dangling_policy: DanglingPolicy,
    pub version_segment: String,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            dangling_policy: DanglingPolicy::Report,
            version_segment: "version".to_string(),
        }
    }
}

pub struct ArtifactManager {
    ctx: Arc<ManagerContext>,
    auditor: ReachabilityAuditor,
    settings: ArtifactSettings,
}

impl ArtifactManager {
    pub fn new(ctx: Arc<ManagerContext>, auditor: ReachabilityAuditor, settings: ArtifactSettings) -> Self {
        Self { ctx, auditor, settings }
    }

    pub fn settings(&self) -> &ArtifactSettings {
        &self.settings
    }

    /// Version IRI of the `sequence`-th version of an artifact
    pub fn version_iri(&self, base_iri: &str, sequence: u64) -> String {
        format!(
            "{}/{}/{}",
            base_iri.trim_end_matches(&['/', '#'][..]),
            self.settings.version_segment,
            sequence
        )
    }

    /// Create a new artifact from a document
    ///
    /// The document's base IRI must not be managed yet. Its imports must
    /// resolve to managed schemas and it must name exactly one top object.
    /// Fails with `DuplicateVersion` if the generated version IRI already
    /// names a schema or artifact version.
    pub fn load_artifact(&self, document: OntologyDocument, policy: Option<DanglingPolicy>) -> Result<InferredIdentity> {
        let policy = policy.unwrap_or(self.settings.dangling_policy);
        let base_iri = document.base_iri().to_string();
        let mut document = document;

        let mut conn = self.ctx.connect()?;
        let mut created = Vec::new();
        let result = self.ctx.locks.with_locks([base_iri.as_str()], || {
            in_transaction(&mut *conn, |conn| {
                let management = &self.ctx.management;
                for kind in [ManagementGraph::Artifact, ManagementGraph::Schema] {
                    if management.is_managed(&*conn, kind, &base_iri)? {
                        return Err(OntoverError::InvalidIdentity(format!(
                            "{} is already managed as a {} ontology",
                            base_iri, kind
                        )));
                    }
                }

                // a base reloaded after deleting every version keeps counting
                let sequence = management.next_sequence(&*conn, ManagementGraph::Artifact, &base_iri)?;
                let version_iri = self.claim_version_iri(&*conn, &base_iri, sequence)?;
                document.set_version_iri(version_iri.clone());
                self.ctx.processors.run(Stage::ArtifactLoad, &mut document)?;
                self.ctx.check_profile(&document)?;

                let imports = self.ctx.resolve_imports(&*conn, &document)?;
                let identity = document.identity()?;
                let inferred = management.scheme().derive(&identity)?;

                self.ctx.write_content(conn, &version_iri, document.statements())?;
                let record = management.set_current_version(conn, ManagementGraph::Artifact, &inferred, &imports, true)?;

                let content = named(&version_iri)?;
                let before = self.auditor.objects(&*conn, &content, &[&base_iri, &version_iri])?;
                let scope = self.scope(&*conn, &record, before, BTreeSet::new())?;
                self.auditor.audit(conn, &scope, policy)?;

                created.push(identity.clone());
                let handle = self.ctx.reason(&*conn, &identity)?;
                self.ctx.write_inferred(conn, &record, &handle)?;
                management.verify_currency(&*conn, ManagementGraph::Artifact, &base_iri)?;
                Ok(inferred)
            })
        });

        self.finish("artifact loaded", result, &created)
    }

    /// Apply an edit to the current version, producing a new version
    ///
    /// # Errors
    ///
    /// - `PublishedArtifactModify` if `identity` names a published version
    /// - `StaleArtifactVersion` if `identity` is not the current version
    /// - `DuplicateVersion` if the next version IRI is already taken
    /// - `DisconnectedObjects` under `DanglingPolicy::Report`
    /// - `InconsistentOntology`, `ProfileViolation`, `ProcessorRejected`
    pub fn update_artifact(
        &self,
        identity: &OntologyIdentity,
        edit: ArtifactEdit,
        policy: Option<DanglingPolicy>,
    ) -> Result<InferredIdentity> {
        let policy = policy.unwrap_or(self.settings.dangling_policy);
        let base_iri = identity.base_iri.clone();
        let requested = identity.require_version()?.to_string();

        let mut conn = self.ctx.connect()?;
        let mut created = Vec::new();
        let mut superseded = None;

        let result = self.ctx.locks.with_locks([base_iri.as_str()], || {
            in_transaction(&mut *conn, |conn| {
                let management = &self.ctx.management;
                // published versions are frozen whether or not they are current
                if let Some(record) = management.get_version(&*conn, ManagementGraph::Artifact, &base_iri, &requested)? {
                    if record.is_published {
                        return Err(OntoverError::PublishedArtifactModify {
                            base_iri: base_iri.clone(),
                            version: record.version_iri,
                        });
                    }
                }
                let current = self.require_current(&*conn, &base_iri, &requested)?;

                let sequence = management.next_sequence(&*conn, ManagementGraph::Artifact, &base_iri)?;
                let version_iri = self.claim_version_iri(&*conn, &base_iri, sequence)?;

                let old_content = named(&current.version_iri)?;
                let statements = edit.apply(conn.export_graph(&old_content)?);
                let mut document = OntologyDocument::from_statements(statements)?;
                if document.base_iri() != base_iri {
                    return Err(OntoverError::InvalidIdentity(format!(
                        "edit changes the ontology header of {} to {}",
                        base_iri,
                        document.base_iri()
                    )));
                }
                document.set_version_iri(version_iri.clone());
                self.ctx.processors.run(Stage::ArtifactEdit, &mut document)?;
                self.ctx.check_profile(&document)?;

                let imports = self.ctx.resolve_imports(&*conn, &document)?;
                let new_identity = document.identity()?;
                let inferred = management.scheme().derive(&new_identity)?;

                self.ctx.write_content(conn, &version_iri, document.statements())?;
                let record =
                    management.set_current_version(conn, ManagementGraph::Artifact, &inferred, &imports, false)?;

                let before = self
                    .auditor
                    .objects(&*conn, &old_content, &[&base_iri, &current.version_iri])?;
                let scope = self.scope(&*conn, &record, before, edit.touched_objects())?;
                let report = self.auditor.audit(conn, &scope, policy)?;

                created.push(new_identity.clone());
                let handle = self.ctx.reason(&*conn, &new_identity)?;
                self.ctx.write_inferred(conn, &record, &handle)?;
                management.set_current_version(conn, ManagementGraph::Artifact, &inferred, &imports, true)?;
                management.verify_currency(&*conn, ManagementGraph::Artifact, &base_iri)?;

                if !management.retains_previous_versions() {
                    superseded = Some(current.identity());
                }
                info!(
                    base_iri = %base_iri,
                    version_iri = %version_iri,
                    policy = %policy,
                    update_policy = %edit.update_policy,
                    removed = report.removed_statements,
                    "artifact edit staged"
                );
                Ok(inferred)
            })
        });

        if result.is_ok() {
            if let Some(old) = superseded {
                self.ctx.evict(&[old]);
            }
        }
        self.finish("artifact updated", result, &created)
    }

    /// Flag a version as published
    ///
    /// An unversioned identity publishes the current version. Publishing an
    /// already published version fails with `AlreadyPublished`.
    pub fn publish_artifact(&self, identity: &OntologyIdentity) -> Result<InferredIdentity> {
        let base_iri = identity.base_iri.clone();
        let mut conn = self.ctx.connect()?;

        self.ctx.locks.with_locks([base_iri.as_str()], || {
            in_transaction(&mut *conn, |conn| {
                let record = self.resolve(&*conn, identity)?;
                if record.is_published {
                    return Err(OntoverError::AlreadyPublished {
                        base_iri: record.base_iri.clone(),
                        version: record.version_iri.clone(),
                    });
                }
                self.ctx.management.set_published(conn, &record.identity())?;
                info!(base_iri = %record.base_iri, version_iri = %record.version_iri, "artifact published");
                Ok(record.inferred_identity())
            })
        })
    }

    /// Delete one version of an artifact
    ///
    /// Returns false if the version is not managed. Deleting the current
    /// version promotes the most recent remaining one; deleting the last
    /// version leaves the base IRI unmanaged.
    pub fn delete_artifact_version(&self, identity: &OntologyIdentity) -> Result<bool> {
        let base_iri = identity.base_iri.clone();
        let version_iri = identity.require_version()?.to_string();
        let mut conn = self.ctx.connect()?;

        let deleted = self.ctx.locks.with_locks([base_iri.as_str()], || {
            in_transaction(&mut *conn, |conn| {
                let management = &self.ctx.management;
                let Some(record) = management.get_version(&*conn, ManagementGraph::Artifact, &base_iri, &version_iri)?
                else {
                    return Ok(false);
                };

                // a published current version freezes every version of the base
                let current = management.current_record(&*conn, ManagementGraph::Artifact, &base_iri)?;
                let locked = match current {
                    Some(current) if current.is_published => Some(current.version_iri),
                    _ if record.is_published => Some(record.version_iri.clone()),
                    _ => None,
                };
                if let Some(version) = locked {
                    return Err(OntoverError::PublishedArtifactModify {
                        base_iri: base_iri.clone(),
                        version,
                    });
                }

                let mut targets = BTreeSet::new();
                targets.insert(record.identity());
                management.delete_versions(conn, ManagementGraph::Artifact, &targets)?;

                if record.is_current {
                    let remaining = management.list_all_versions(&*conn, ManagementGraph::Artifact, &base_iri)?;
                    if let Some(next) = remaining.first() {
                        management.set_current_version(
                            conn,
                            ManagementGraph::Artifact,
                            &next.inferred_identity(),
                            &next.imports,
                            true,
                        )?;
                        info!(base_iri = %base_iri, version_iri = %next.version_iri, "previous version promoted");
                    } else {
                        info!(base_iri = %base_iri, "last version deleted, artifact unmanaged");
                    }
                }
                management.verify_currency(&*conn, ManagementGraph::Artifact, &base_iri)?;
                Ok(true)
            })
        })?;

        if deleted {
            self.ctx.evict(&[identity.clone()]);
        }
        Ok(deleted)
    }

    pub fn get_current(&self, base_iri: &str) -> Result<InferredIdentity> {
        let conn = self.ctx.connect()?;
        self.ctx
            .management
            .current_record(&*conn, ManagementGraph::Artifact, base_iri)?
            .map(|r| r.inferred_identity())
            .ok_or_else(|| OntoverError::UnmanagedArtifactIri(base_iri.to_string()))
    }

    /// Look up a base IRI (current version) or a version IRI (that version)
    pub fn get_by_iri(&self, iri: &str) -> Result<ManagedOntologyRecord> {
        let conn = self.ctx.connect()?;
        let identity = OntologyIdentity::unversioned(iri)?;
        self.resolve(&*conn, &identity).map_err(|err| match err {
            OntoverError::UnmanagedArtifactIri(_) => OntoverError::UnmanagedIri { iri: iri.to_string() },
            other => other,
        })
    }

    pub fn list_versions(&self, base_iri: &str) -> Result<Vec<ManagedOntologyRecord>> {
        let conn = self.ctx.connect()?;
        let versions = self
            .ctx
            .management
            .list_all_versions(&*conn, ManagementGraph::Artifact, base_iri)?;
        if versions.is_empty() {
            return Err(OntoverError::UnmanagedArtifactIri(base_iri.to_string()));
        }
        Ok(versions)
    }

    /// Current record of every artifact, filtered by publication state
    pub fn list_artifacts(&self, filter: PublishFilter) -> Result<Vec<ManagedOntologyRecord>> {
        let conn = self.ctx.connect()?;
        let management = &self.ctx.management;
        let mut artifacts = Vec::new();
        for base_iri in management.list_base_iris(&*conn, ManagementGraph::Artifact)? {
            if let Some(record) = management.current_record(&*conn, ManagementGraph::Artifact, &base_iri)? {
                if filter.accepts(&record) {
                    artifacts.push(record);
                }
            }
        }
        Ok(artifacts)
    }

    /// Schema versions an artifact version was recorded against
    pub fn artifact_schema_imports(&self, identity: &OntologyIdentity) -> Result<Vec<OntologyIdentity>> {
        let conn = self.ctx.connect()?;
        Ok(self.resolve(&*conn, identity)?.imports)
    }

    /// N-Triples of an artifact version, optionally with inferred statements
    pub fn export_artifact(&self, identity: &OntologyIdentity, include_inferred: bool) -> Result<String> {
        let conn = self.ctx.connect()?;
        let record = self.resolve(&*conn, identity)?;
        let mut statements = conn.export_graph(&named(&record.version_iri)?)?;
        if include_inferred {
            statements.extend(conn.export_graph(&named(&record.inferred_iri)?)?);
        }
        Ok(render_ntriples(&statements))
    }

    /// Reachability of a committed version, without changing it
    pub fn check_reachability(&self, identity: &OntologyIdentity) -> Result<ReachabilityReport> {
        let conn = self.ctx.connect()?;
        let record = self.resolve(&*conn, identity)?;
        let content = named(&record.version_iri)?;
        let before = self
            .auditor
            .objects(&*conn, &content, &[&record.base_iri, &record.version_iri])?;
        let scope = self.scope(&*conn, &record, before, BTreeSet::new())?;
        self.auditor.assess(&*conn, &scope)
    }

    /// Record for an identity; unversioned resolves to current
    fn resolve(&self, conn: &dyn GraphConnection, identity: &OntologyIdentity) -> Result<ManagedOntologyRecord> {
        let management = &self.ctx.management;
        match &identity.version_iri {
            Some(version_iri) => management
                .get_version(conn, ManagementGraph::Artifact, &identity.base_iri, version_iri)?
                .ok_or_else(|| OntoverError::UnmanagedVersion {
                    base_iri: identity.base_iri.clone(),
                    version: version_iri.clone(),
                }),
            None => {
                if let Some(record) = management.current_record(conn, ManagementGraph::Artifact, &identity.base_iri)? {
                    return Ok(record);
                }
                management
                    .find_by_version(conn, ManagementGraph::Artifact, &identity.base_iri)?
                    .ok_or_else(|| OntoverError::UnmanagedArtifactIri(identity.base_iri.clone()))
            }
        }
    }

    /// Version IRI for `sequence`, refused if any schema or artifact record
    /// already uses it
    fn claim_version_iri(&self, conn: &dyn GraphConnection, base_iri: &str, sequence: u64) -> Result<String> {
        let version_iri = self.version_iri(base_iri, sequence);
        if self.ctx.management.find_record(conn, &version_iri)?.is_some() {
            return Err(OntoverError::DuplicateVersion {
                base_iri: base_iri.to_string(),
                version: version_iri,
            });
        }
        Ok(version_iri)
    }

    fn require_current(&self, conn: &dyn GraphConnection, base_iri: &str, requested: &str) -> Result<ManagedOntologyRecord> {
        let management = &self.ctx.management;
        let current = management
            .current_record(conn, ManagementGraph::Artifact, base_iri)?
            .ok_or_else(|| OntoverError::UnmanagedArtifactIri(base_iri.to_string()))?;

        if current.version_iri == requested {
            return Ok(current);
        }
        if management
            .get_version(conn, ManagementGraph::Artifact, base_iri, requested)?
            .is_none()
        {
            return Err(OntoverError::UnmanagedVersion {
                base_iri: base_iri.to_string(),
                version: requested.to_string(),
            });
        }
        Err(OntoverError::StaleArtifactVersion {
            base_iri: base_iri.to_string(),
            requested: requested.to_string(),
            current: current.version_iri,
        })
    }

    /// Audit scope for a recorded version: its content graph plus every
    /// schema graph in its pinned import closure
    fn scope(
        &self,
        conn: &dyn GraphConnection,
        record: &ManagedOntologyRecord,
        before: BTreeSet<String>,
        touched: BTreeSet<String>,
    ) -> Result<AuditScope> {
        Ok(AuditScope {
            artifact_base: record.base_iri.clone(),
            version_iri: record.version_iri.clone(),
            content: named(&record.version_iri)?,
            schema_graphs: self.schema_graphs(conn, &record.imports)?,
            before,
            touched,
        })
    }

    fn schema_graphs(&self, conn: &dyn GraphConnection, imports: &[OntologyIdentity]) -> Result<Vec<NamedNode>> {
        let mut graphs = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<OntologyIdentity> = imports.iter().cloned().collect();

        while let Some(import) = queue.pop_front() {
            if !seen.insert(import.clone()) {
                continue;
            }
            let version_iri = import.require_version()?;
            let Some(record) = self
                .ctx
                .management
                .get_version(conn, ManagementGraph::Schema, &import.base_iri, version_iri)?
            else {
                warn!(import = %import, "import not found while collecting schema graphs");
                continue;
            };
            graphs.push(named(&record.version_iri)?);
            graphs.push(named(&record.inferred_iri)?);
            queue.extend(record.imports.iter().cloned());
        }
        Ok(graphs)
    }

    fn finish(
        &self,
        action: &str,
        result: Result<InferredIdentity>,
        created: &[OntologyIdentity],
    ) -> Result<InferredIdentity> {
        match result {
            Ok(identity) => {
                info!(identity = %identity, "{}", action);
                Ok(identity)
            }
            Err(err) => {
                warn!(error = %err, "{} failed, rolled back", action);
                self.ctx.evict(created);
                Err(err)
            }
        }
    }
}
