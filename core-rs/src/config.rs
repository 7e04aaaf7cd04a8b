/**
 * config.rs
 * Parser for .ontover.yaml manager files (YAML format)
 *
 * Format:
 * ```yaml
 * apiVersion: ontover/v1
 * kind: VersionManager
 * metadata:
 *   name: pizza-project
 * spec:
 *   storePath: .ontover/store
 *   managementGraphs:
 *     schema: urn:ontover:management:schema
 *     artifact: urn:ontover:management:artifact
 *   inferredPrefix: "urn:ontover:inferred:"
 *   artifacts:
 *     retainPreviousVersions: true
 *     danglingPolicy: REPORT
 *     topObjectPredicate: https://ontover.org/ns/base#artifactHasTopObject
 *     containsPredicate: https://ontover.org/ns/base#contains
 *     versionSegment: version
 *   schemaManifest:
 *     - schemas/food.ttl
 *     - schemas/pizza.ttl
 * ```
 */

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifact::auditor::DanglingPolicy;
use crate::errors::{OntoverError, Result};
use crate::identity::{validate_iri, DEFAULT_INFERRED_PREFIX};
use crate::store::vocab::{base, mgmt};

pub const API_VERSION: &str = "ontover/v1";
pub const KIND: &str = "VersionManager";
pub const DEFAULT_CONFIG_FILE: &str = ".ontover.yaml";

/// .ontover.yaml file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: Spec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub name: String,
}

/// IRIs of the two management graphs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagementGraphs {
    pub schema: String,
    pub artifact: String,
}

impl Default for ManagementGraphs {
    fn default() -> Self {
        Self {
            schema: mgmt::DEFAULT_SCHEMA_GRAPH.to_string(),
            artifact: mgmt::DEFAULT_ARTIFACT_GRAPH.to_string(),
        }
    }
}

/// Artifact versioning options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactOptions {
    /// Keep superseded unpublished versions when a new version becomes current
    pub retain_previous_versions: bool,
    pub dangling_policy: DanglingPolicy,
    pub top_object_predicate: String,
    pub contains_predicate: String,
    /// Path segment between the base IRI and the version number
    pub version_segment: String,
}

impl Default for ArtifactOptions {
    fn default() -> Self {
        Self {
            retain_previous_versions: true,
            dangling_policy: DanglingPolicy::Report,
            top_object_predicate: base::ARTIFACT_HAS_TOP_OBJECT.to_string(),
            contains_predicate: base::CONTAINS.to_string(),
            version_segment: "version".to_string(),
        }
    }
}

/// The `spec` section of the manager file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    /// On-disk store directory; in-memory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub management_graphs: ManagementGraphs,
    #[serde(default = "default_inferred_prefix")]
    pub inferred_prefix: String,
    #[serde(default)]
    pub artifacts: ArtifactOptions,
    /// Schema files uploaded as one batch by `bootstrap`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_manifest: Vec<PathBuf>,
}

fn default_inferred_prefix() -> String {
    DEFAULT_INFERRED_PREFIX.to_string()
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            store_path: None,
            management_graphs: ManagementGraphs::default(),
            inferred_prefix: default_inferred_prefix(),
            artifacts: ArtifactOptions::default(),
            schema_manifest: Vec::new(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new("ontover")
    }
}

impl ManagerConfig {
    /// In-memory configuration with default graphs and predicates
    pub fn new(name: impl Into<String>) -> Self {
        ManagerConfig {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: Metadata { name: name.into() },
            spec: Spec::default(),
        }
    }

    /// Load and validate a manager file
    ///
    /// Relative `storePath` and manifest entries are resolved against the
    /// directory holding the file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OntoverError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let mut config: ManagerConfig = serde_yaml::from_str(&content)
            .map_err(|e| OntoverError::Config(format!("invalid {}: {}", path.display(), e)))?;
        config.validate()?;

        if let Some(dir) = path.parent() {
            config.resolve_relative(dir);
        }
        Ok(config)
    }

    /// Load `.ontover.yaml` from a project directory
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::load(dir.as_ref().join(DEFAULT_CONFIG_FILE))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), yaml)?;
        Ok(())
    }

    /// Ensures:
    /// - apiVersion and kind are the supported values
    /// - metadata.name is non-empty
    /// - the inferred prefix is non-empty
    /// - management graph and predicate IRIs are absolute and distinct
    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            return Err(OntoverError::Config(format!(
                "Invalid apiVersion: expected '{}', got '{}'",
                API_VERSION, self.api_version
            )));
        }
        if self.kind != KIND {
            return Err(OntoverError::Config(format!(
                "Invalid kind: expected '{}', got '{}'",
                KIND, self.kind
            )));
        }
        if self.metadata.name.is_empty() {
            return Err(OntoverError::Config("metadata.name cannot be empty".to_string()));
        }

        let spec = &self.spec;
        if spec.inferred_prefix.is_empty() {
            return Err(OntoverError::Config("spec.inferredPrefix cannot be empty".to_string()));
        }
        if spec.management_graphs.schema == spec.management_graphs.artifact {
            return Err(OntoverError::Config(format!(
                "spec.managementGraphs: schema and artifact graphs must differ (both {})",
                spec.management_graphs.schema
            )));
        }
        for (field, iri) in [
            ("spec.managementGraphs.schema", &spec.management_graphs.schema),
            ("spec.managementGraphs.artifact", &spec.management_graphs.artifact),
            ("spec.artifacts.topObjectPredicate", &spec.artifacts.top_object_predicate),
            ("spec.artifacts.containsPredicate", &spec.artifacts.contains_predicate),
        ] {
            validate_iri(iri).map_err(|e| OntoverError::Config(format!("{}: {}", field, e)))?;
        }

        let segment = &spec.artifacts.version_segment;
        if segment.is_empty() || segment.contains(&['/', '#', ' '][..]) {
            return Err(OntoverError::Config(format!(
                "spec.artifacts.versionSegment must be a single path segment, got '{}'",
                segment
            )));
        }
        Ok(())
    }

    fn resolve_relative(&mut self, dir: &Path) {
        if let Some(store) = &self.spec.store_path {
            if store.is_relative() {
                self.spec.store_path = Some(dir.join(store));
            }
        }
        for entry in &mut self.spec.schema_manifest {
            if entry.is_relative() {
                *entry = dir.join(&*entry);
            }
        }
    }
}
