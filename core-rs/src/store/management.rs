//! Management graph store
//!
//! Reads and writes the version bookkeeping statements kept in the schema
//! and artifact management graphs. One record per managed version:
//!
//! ```text
//! <version> a mgmt:ManagedOntology ;
//!     mgmt:baseIRI <base> ;
//!     mgmt:inferredIRI <inferred> ;
//!     mgmt:importsVersion <import-version> ;   # zero or more
//!     mgmt:sequence 3 ;
//!     mgmt:created "..."^^xsd:dateTime ;
//!     mgmt:isCurrent true ;                     # present only when set
//!     mgmt:isCurrentInferred true ;             # present only when set
//!     mgmt:isPublished true .                   # artifacts only
//! ```
//!
//! Each base IRI also carries `<base> mgmt:lastSequence n`, the highest
//! sequence ever issued for it. Deleting versions never lowers it, so a
//! sequence (and any version IRI derived from it) is never handed out twice.
//!
//! The version's own statements live in the named graph `<version>` and its
//! inferred statements in `<inferred>`.
//!
//! Every write goes through the caller's connection and transaction. This
//! store never begins, commits or rolls back.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Literal, NamedNode, NamedNodeRef, Subject, Term, Triple};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{OntoverError, Result};
use crate::identity::{InferredIdentity, InferredIriScheme, OntologyIdentity};
use crate::store::connection::GraphConnection;
use crate::store::named;
use crate::store::vocab::mgmt;

/// Which management graph a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagementGraph {
    Schema,
    Artifact,
}

impl fmt::Display for ManagementGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagementGraph::Schema => write!(f, "schema"),
            ManagementGraph::Artifact => write!(f, "artifact"),
        }
    }
}

/// One managed version, as persisted in a management graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedOntologyRecord {
    pub base_iri: String,
    pub version_iri: String,
    pub inferred_iri: String,
    /// Direct imports, each pinned to the version recorded at write time
    pub imports: Vec<OntologyIdentity>,
    pub is_current: bool,
    pub is_current_inferred: bool,
    pub is_published: bool,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl ManagedOntologyRecord {
    pub fn identity(&self) -> OntologyIdentity {
        OntologyIdentity {
            base_iri: self.base_iri.clone(),
            version_iri: Some(self.version_iri.clone()),
        }
    }

    pub fn inferred_identity(&self) -> InferredIdentity {
        InferredIdentity {
            base_iri: self.base_iri.clone(),
            version_iri: self.version_iri.clone(),
            inferred_iri: self.inferred_iri.clone(),
        }
    }

    /// Base IRIs of the direct imports
    pub fn import_base_iris(&self) -> BTreeSet<String> {
        self.imports.iter().map(|i| i.base_iri.clone()).collect()
    }
}

/// Version bookkeeping over the two management graphs
#[derive(Debug, Clone)]
pub struct ManagementGraphStore {
    schema_graph: NamedNode,
    artifact_graph: NamedNode,
    scheme: InferredIriScheme,
    retain_previous_versions: bool,
}

impl ManagementGraphStore {
    pub fn new(
        schema_graph: &str,
        artifact_graph: &str,
        scheme: InferredIriScheme,
        retain_previous_versions: bool,
    ) -> Result<Self> {
        if schema_graph == artifact_graph {
            return Err(OntoverError::Config(format!(
                "schema and artifact management graphs must differ (both {})",
                schema_graph
            )));
        }
        Ok(Self {
            schema_graph: named(schema_graph)?,
            artifact_graph: named(artifact_graph)?,
            scheme,
            retain_previous_versions,
        })
    }

    pub fn graph(&self, kind: ManagementGraph) -> &NamedNode {
        match kind {
            ManagementGraph::Schema => &self.schema_graph,
            ManagementGraph::Artifact => &self.artifact_graph,
        }
    }

    pub fn scheme(&self) -> &InferredIriScheme {
        &self.scheme
    }

    pub fn retains_previous_versions(&self) -> bool {
        self.retain_previous_versions
    }

    /// Current version of `base_iri`, or `None` if the base IRI is not managed
    pub fn get_current_version(
        &self,
        conn: &dyn GraphConnection,
        kind: ManagementGraph,
        base_iri: &str,
    ) -> Result<Option<OntologyIdentity>> {
        Ok(self.current_record(conn, kind, base_iri)?.map(|r| r.identity()))
    }

    /// Record flagged current for `base_iri`
    ///
    /// Fails with `CurrencyConflict` if more than one record is flagged.
    pub fn current_record(
        &self,
        conn: &dyn GraphConnection,
        kind: ManagementGraph,
        base_iri: &str,
    ) -> Result<Option<ManagedOntologyRecord>> {
        let mut current: Vec<ManagedOntologyRecord> = self
            .list_all_versions(conn, kind, base_iri)?
            .into_iter()
            .filter(|r| r.is_current)
            .collect();

        if current.len() > 1 {
            return Err(OntoverError::CurrencyConflict {
                base_iri: base_iri.to_string(),
                versions: current.into_iter().map(|r| r.version_iri).collect(),
            });
        }
        Ok(current.pop())
    }

    /// Record for an exact version of `base_iri`
    pub fn get_version(
        &self,
        conn: &dyn GraphConnection,
        kind: ManagementGraph,
        base_iri: &str,
        version_iri: &str,
    ) -> Result<Option<ManagedOntologyRecord>> {
        Ok(self
            .find_by_version(conn, kind, version_iri)?
            .filter(|r| r.base_iri == base_iri))
    }

    /// Record for a version IRI, whatever its base
    pub fn find_by_version(
        &self,
        conn: &dyn GraphConnection,
        kind: ManagementGraph,
        version_iri: &str,
    ) -> Result<Option<ManagedOntologyRecord>> {
        let version = match NamedNode::new(version_iri) {
            Ok(node) => node,
            Err(_) => return Ok(None),
        };
        self.read_record(conn, kind, &version)
    }

    /// Look a version IRI up in the schema graph, then the artifact graph
    pub fn find_record(
        &self,
        conn: &dyn GraphConnection,
        version_iri: &str,
    ) -> Result<Option<(ManagementGraph, ManagedOntologyRecord)>> {
        for kind in [ManagementGraph::Schema, ManagementGraph::Artifact] {
            if let Some(record) = self.find_by_version(conn, kind, version_iri)? {
                return Ok(Some((kind, record)));
            }
        }
        Ok(None)
    }

    pub fn is_managed(&self, conn: &dyn GraphConnection, kind: ManagementGraph, base_iri: &str) -> Result<bool> {
        Ok(!self.version_nodes(conn, kind, base_iri)?.is_empty())
    }

    /// All versions of `base_iri`, current first, then newest first
    pub fn list_all_versions(
        &self,
        conn: &dyn GraphConnection,
        kind: ManagementGraph,
        base_iri: &str,
    ) -> Result<Vec<ManagedOntologyRecord>> {
        let mut records = Vec::new();
        for version in self.version_nodes(conn, kind, base_iri)? {
            if let Some(record) = self.read_record(conn, kind, &version)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| {
            b.is_current
                .cmp(&a.is_current)
                .then(b.sequence.cmp(&a.sequence))
                .then(a.version_iri.cmp(&b.version_iri))
        });
        Ok(records)
    }

    /// Every managed base IRI in a management graph
    pub fn list_base_iris(&self, conn: &dyn GraphConnection, kind: ManagementGraph) -> Result<BTreeSet<String>> {
        let base_predicate = mgmt::BASE_IRI.into_owned();
        Ok(conn
            .match_pattern(None, Some(&base_predicate), None, Some(self.graph(kind)))?
            .into_iter()
            .filter_map(|quad| match quad.object {
                Term::NamedNode(node) => Some(node.into_string()),
                _ => None,
            })
            .collect())
    }

    /// Record a version and optionally promote it to current
    ///
    /// With `update_current = false` the record is inserted and no existing
    /// pointer moves. The one exception is a base IRI with no current version
    /// yet: the new record then becomes current so that every managed base
    /// IRI resolves.
    ///
    /// With `update_current = true` both `isCurrent` and `isCurrentInferred`
    /// move to this version. For artifacts, when previous versions are not
    /// retained, strictly older unpublished versions are removed.
    pub fn set_current_version(
        &self,
        conn: &mut dyn GraphConnection,
        kind: ManagementGraph,
        identity: &InferredIdentity,
        imports: &[OntologyIdentity],
        update_current: bool,
    ) -> Result<ManagedOntologyRecord> {
        let version = named(&identity.version_iri)?;

        let existing = self.read_record(&*conn, kind, &version)?;
        let sequence = match existing {
            Some(ref record) if record.base_iri != identity.base_iri => {
                return Err(OntoverError::DuplicateVersion {
                    base_iri: record.base_iri.clone(),
                    version: identity.version_iri.clone(),
                });
            }
            Some(ref record) => record.sequence,
            None => {
                let sequence = self.next_sequence(&*conn, kind, &identity.base_iri)?;
                self.write_record(conn, kind, &version, identity, imports, sequence)?;
                sequence
            }
        };

        let has_current = self.current_record(&*conn, kind, &identity.base_iri)?.is_some();
        if update_current || !has_current {
            self.move_flag(conn, kind, &identity.base_iri, &version, mgmt::IS_CURRENT)?;
            self.move_flag(conn, kind, &identity.base_iri, &version, mgmt::IS_CURRENT_INFERRED)?;
            info!(
                graph = %kind,
                base_iri = %identity.base_iri,
                version_iri = %identity.version_iri,
                "version promoted to current"
            );

            if kind == ManagementGraph::Artifact && !self.retain_previous_versions {
                self.remove_superseded(conn, &identity.base_iri, sequence)?;
            }
        } else {
            debug!(
                graph = %kind,
                base_iri = %identity.base_iri,
                version_iri = %identity.version_iri,
                "version recorded without promotion"
            );
        }

        self.read_record(&*conn, kind, &version)?.ok_or_else(|| OntoverError::UnmanagedVersion {
            base_iri: identity.base_iri.clone(),
            version: identity.version_iri.clone(),
        })
    }

    /// Move only the `isCurrentInferred` flag to an existing version
    pub fn set_current_inferred_version(
        &self,
        conn: &mut dyn GraphConnection,
        kind: ManagementGraph,
        identity: &OntologyIdentity,
    ) -> Result<()> {
        let version_iri = identity.require_version()?;
        if self.get_version(&*conn, kind, &identity.base_iri, version_iri)?.is_none() {
            return Err(OntoverError::UnmanagedVersion {
                base_iri: identity.base_iri.clone(),
                version: version_iri.to_string(),
            });
        }
        let version = named(version_iri)?;
        self.move_flag(conn, kind, &identity.base_iri, &version, mgmt::IS_CURRENT_INFERRED)
    }

    /// Flag an artifact version as published
    pub fn set_published(&self, conn: &mut dyn GraphConnection, identity: &OntologyIdentity) -> Result<()> {
        let version = named(identity.require_version()?)?;
        let graph = self.artifact_graph.clone();
        conn.add(
            Triple::new(version, mgmt::IS_PUBLISHED.into_owned(), Literal::from(true)),
            &graph,
        )?;
        Ok(())
    }

    /// Remove records together with their content and inferred graphs
    ///
    /// Returns how many records were removed. Currency is not repaired here.
    pub fn delete_versions(
        &self,
        conn: &mut dyn GraphConnection,
        kind: ManagementGraph,
        identities: &BTreeSet<OntologyIdentity>,
    ) -> Result<usize> {
        let graph = self.graph(kind).clone();
        let mut deleted = 0;

        for identity in identities {
            let version_iri = identity.require_version()?;
            let version = named(version_iri)?;

            if conn.remove_matching(Some(&version), None, None, Some(&graph))? > 0 {
                deleted += 1;
            }
            conn.clear_graph(&version)?;
            conn.clear_graph(&named(&self.scheme.inferred_iri(version_iri))?)?;
            debug!(graph = %kind, version_iri = %version_iri, "version deleted");
        }

        Ok(deleted)
    }

    /// Fail with `CurrencyConflict` if more than one version of `base_iri` is
    /// flagged current or current-inferred
    pub fn verify_currency(&self, conn: &dyn GraphConnection, kind: ManagementGraph, base_iri: &str) -> Result<()> {
        let records = self.list_all_versions(conn, kind, base_iri)?;
        for flagged in [
            records.iter().filter(|r| r.is_current).count(),
            records.iter().filter(|r| r.is_current_inferred).count(),
        ] {
            if flagged > 1 {
                return Err(OntoverError::CurrencyConflict {
                    base_iri: base_iri.to_string(),
                    versions: records.iter().map(|r| r.version_iri.clone()).collect(),
                });
            }
        }
        Ok(())
    }

    /// Sequence the next version of `base_iri` receives
    ///
    /// One past the highest sequence ever issued, including versions that
    /// have since been deleted.
    pub fn next_sequence(&self, conn: &dyn GraphConnection, kind: ManagementGraph, base_iri: &str) -> Result<u64> {
        let recorded = self
            .list_all_versions(conn, kind, base_iri)?
            .iter()
            .map(|r| r.sequence)
            .max()
            .unwrap_or(0);
        Ok(recorded.max(self.last_sequence(conn, kind, base_iri)?) + 1)
    }

    fn last_sequence(&self, conn: &dyn GraphConnection, kind: ManagementGraph, base_iri: &str) -> Result<u64> {
        let base = match NamedNode::new(base_iri) {
            Ok(node) => node,
            Err(_) => return Ok(0),
        };
        let predicate = mgmt::LAST_SEQUENCE.into_owned();
        Ok(conn
            .match_pattern(Some(&base), Some(&predicate), None, Some(self.graph(kind)))?
            .into_iter()
            .filter_map(|quad| match quad.object {
                Term::Literal(literal) => literal.value().parse::<u64>().ok(),
                _ => None,
            })
            .max()
            .unwrap_or(0))
    }

    fn raise_last_sequence(
        &self,
        conn: &mut dyn GraphConnection,
        kind: ManagementGraph,
        base_iri: &str,
        sequence: u64,
    ) -> Result<()> {
        if self.last_sequence(&*conn, kind, base_iri)? >= sequence {
            return Ok(());
        }
        let graph = self.graph(kind).clone();
        let base = named(base_iri)?;
        let predicate = mgmt::LAST_SEQUENCE.into_owned();
        conn.remove_matching(Some(&base), Some(&predicate), None, Some(&graph))?;
        conn.add(Triple::new(base, predicate, Literal::from(sequence as i64)), &graph)?;
        Ok(())
    }

    fn version_nodes(&self, conn: &dyn GraphConnection, kind: ManagementGraph, base_iri: &str) -> Result<Vec<NamedNode>> {
        let base = match NamedNode::new(base_iri) {
            Ok(node) => Term::NamedNode(node),
            Err(_) => return Ok(Vec::new()),
        };
        let base_predicate = mgmt::BASE_IRI.into_owned();

        Ok(conn
            .match_pattern(None, Some(&base_predicate), Some(&base), Some(self.graph(kind)))?
            .into_iter()
            .filter_map(|quad| match quad.subject {
                Subject::NamedNode(node) => Some(node),
                _ => None,
            })
            .collect())
    }

    fn write_record(
        &self,
        conn: &mut dyn GraphConnection,
        kind: ManagementGraph,
        version: &NamedNode,
        identity: &InferredIdentity,
        imports: &[OntologyIdentity],
        sequence: u64,
    ) -> Result<()> {
        let graph = self.graph(kind).clone();
        let created = Literal::new_typed_literal(Utc::now().to_rfc3339(), xsd::DATE_TIME);

        let mut statements = vec![
            Triple::new(version.clone(), rdf::TYPE.into_owned(), mgmt::MANAGED_ONTOLOGY.into_owned()),
            Triple::new(version.clone(), mgmt::BASE_IRI.into_owned(), named(&identity.base_iri)?),
            Triple::new(version.clone(), mgmt::INFERRED_IRI.into_owned(), named(&identity.inferred_iri)?),
            Triple::new(version.clone(), mgmt::SEQUENCE.into_owned(), Literal::from(sequence as i64)),
            Triple::new(version.clone(), mgmt::CREATED.into_owned(), created),
        ];
        for import in imports {
            statements.push(Triple::new(
                version.clone(),
                mgmt::IMPORTS_VERSION.into_owned(),
                named(import.require_version()?)?,
            ));
        }

        for statement in statements {
            conn.add(statement, &graph)?;
        }
        self.raise_last_sequence(conn, kind, &identity.base_iri, sequence)
    }

    fn move_flag(
        &self,
        conn: &mut dyn GraphConnection,
        kind: ManagementGraph,
        base_iri: &str,
        target: &NamedNode,
        flag: NamedNodeRef<'static>,
    ) -> Result<()> {
        let graph = self.graph(kind).clone();
        let flag = flag.into_owned();

        for version in self.version_nodes(&*conn, kind, base_iri)? {
            conn.remove_matching(Some(&version), Some(&flag), None, Some(&graph))?;
        }
        conn.add(Triple::new(target.clone(), flag, Literal::from(true)), &graph)?;
        Ok(())
    }

    fn remove_superseded(&self, conn: &mut dyn GraphConnection, base_iri: &str, sequence: u64) -> Result<()> {
        let superseded: BTreeSet<OntologyIdentity> = self
            .list_all_versions(&*conn, ManagementGraph::Artifact, base_iri)?
            .into_iter()
            .filter(|r| r.sequence < sequence && !r.is_published)
            .map(|r| r.identity())
            .collect();

        if !superseded.is_empty() {
            let removed = self.delete_versions(conn, ManagementGraph::Artifact, &superseded)?;
            info!(base_iri = %base_iri, removed, "superseded artifact versions removed");
        }
        Ok(())
    }

    fn read_record(
        &self,
        conn: &dyn GraphConnection,
        kind: ManagementGraph,
        version: &NamedNode,
    ) -> Result<Option<ManagedOntologyRecord>> {
        let quads = conn.match_pattern(Some(version), None, None, Some(self.graph(kind)))?;
        if quads.is_empty() {
            return Ok(None);
        }

        let mut base_iri = None;
        let mut inferred_iri = None;
        let mut import_versions = Vec::new();
        let mut is_current = false;
        let mut is_current_inferred = false;
        let mut is_published = false;
        let mut sequence = 0;
        let mut created = None;

        for quad in quads {
            let predicate = quad.predicate.as_ref();
            match quad.object {
                Term::NamedNode(node) if predicate == mgmt::BASE_IRI => base_iri = Some(node.into_string()),
                Term::NamedNode(node) if predicate == mgmt::INFERRED_IRI => inferred_iri = Some(node.into_string()),
                Term::NamedNode(node) if predicate == mgmt::IMPORTS_VERSION => import_versions.push(node.into_string()),
                Term::Literal(literal) if predicate == mgmt::IS_CURRENT => is_current = literal.value() == "true",
                Term::Literal(literal) if predicate == mgmt::IS_CURRENT_INFERRED => {
                    is_current_inferred = literal.value() == "true"
                }
                Term::Literal(literal) if predicate == mgmt::IS_PUBLISHED => is_published = literal.value() == "true",
                Term::Literal(literal) if predicate == mgmt::SEQUENCE => {
                    sequence = literal.value().parse().unwrap_or_else(|_| {
                        warn!(version_iri = %version.as_str(), value = %literal.value(), "unreadable sequence");
                        0
                    })
                }
                Term::Literal(literal) if predicate == mgmt::CREATED => {
                    created = DateTime::parse_from_rfc3339(literal.value())
                        .ok()
                        .map(|d| d.with_timezone(&Utc))
                }
                _ => {}
            }
        }

        let Some(base_iri) = base_iri else {
            warn!(graph = %kind, version_iri = %version.as_str(), "management record without base IRI ignored");
            return Ok(None);
        };
        let inferred_iri = inferred_iri.unwrap_or_else(|| self.scheme.inferred_iri(version.as_str()));

        let mut imports = Vec::new();
        for import_version in import_versions {
            match self.import_base(conn, &import_version)? {
                Some(import_base) => imports.push(OntologyIdentity {
                    base_iri: import_base,
                    version_iri: Some(import_version),
                }),
                None => warn!(
                    version_iri = %version.as_str(),
                    import = %import_version,
                    "import points at an unmanaged version, skipped"
                ),
            }
        }
        imports.sort();

        Ok(Some(ManagedOntologyRecord {
            base_iri,
            version_iri: version.as_str().to_string(),
            inferred_iri,
            imports,
            is_current,
            is_current_inferred,
            is_published,
            sequence,
            created,
        }))
    }

    /// Base IRI of an imported version; imports always target schema ontologies
    fn import_base(&self, conn: &dyn GraphConnection, import_version: &str) -> Result<Option<String>> {
        let version = match NamedNode::new(import_version) {
            Ok(node) => node,
            Err(_) => return Ok(None),
        };
        let base_predicate = mgmt::BASE_IRI.into_owned();
        Ok(conn
            .match_pattern(Some(&version), Some(&base_predicate), None, Some(&self.schema_graph))?
            .into_iter()
            .find_map(|quad| match quad.object {
                Term::NamedNode(node) => Some(node.into_string()),
                _ => None,
            }))
    }
}
