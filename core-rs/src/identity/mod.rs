//! Ontology identity value types
//!
//! - `OntologyIdentity`: base IRI plus optional version IRI
//! - `InferredIdentity`: a versioned identity plus the IRI of its inferred graph
//! - `InferredIriScheme`: the fixed transform from version IRI to inferred IRI
//! - `DependencySet`: the set of versioned identities needed to interpret an ontology

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{OntoverError, Result};

static ABSOLUTE_IRI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s<>\x22{}|\\^`]+$").expect("valid IRI regex"));

/// Default prefix used to derive inferred graph IRIs from version IRIs
pub const DEFAULT_INFERRED_PREFIX: &str = "urn:ontover:inferred:";

/// Check that a string is an absolute IRI (scheme followed by a non-empty body)
pub fn validate_iri(iri: &str) -> Result<()> {
    if ABSOLUTE_IRI.is_match(iri) {
        Ok(())
    } else {
        Err(OntoverError::InvalidIri(iri.to_string()))
    }
}

/// Identity of an ontology, optionally pinned to one version
///
/// Ordering is by base IRI, then version IRI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyIdentity {
    pub base_iri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_iri: Option<String>,
}

impl OntologyIdentity {
    /// Build an identity, rejecting a version IRI without a base IRI
    ///
    /// An empty version string is treated as "unversioned".
    pub fn new(base_iri: impl Into<String>, version_iri: Option<String>) -> Result<Self> {
        let base_iri = base_iri.into();
        let version_iri = version_iri.filter(|v| !v.is_empty());

        if base_iri.is_empty() {
            return Err(OntoverError::InvalidIdentity(match version_iri {
                Some(ref v) => format!("version IRI {} has no base IRI", v),
                None => "empty base IRI".to_string(),
            }));
        }

        Ok(Self { base_iri, version_iri })
    }

    /// Identity pinned to a version
    pub fn versioned(base_iri: impl Into<String>, version_iri: impl Into<String>) -> Result<Self> {
        Self::new(base_iri, Some(version_iri.into()))
    }

    /// Identity without a version (resolved to the current version before use)
    pub fn unversioned(base_iri: impl Into<String>) -> Result<Self> {
        Self::new(base_iri, None)
    }

    pub fn is_versioned(&self) -> bool {
        self.version_iri.is_some()
    }

    /// Same ontology: base IRIs match
    pub fn same_ontology(&self, other: &OntologyIdentity) -> bool {
        self.base_iri == other.base_iri
    }

    /// Same version: base and version IRIs both match
    pub fn same_version(&self, other: &OntologyIdentity) -> bool {
        self == other
    }

    /// Version IRI, or `InvalidIdentity` for an unversioned identity
    pub fn require_version(&self) -> Result<&str> {
        self.version_iri.as_deref().ok_or_else(|| {
            OntoverError::InvalidIdentity(format!("{} has no version IRI", self.base_iri))
        })
    }
}

impl fmt::Display for OntologyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_iri {
            Some(version) => write!(f, "<{}> @ <{}>", self.base_iri, version),
            None => write!(f, "<{}>", self.base_iri),
        }
    }
}

/// Fixed transform from version IRI to inferred graph IRI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredIriScheme {
    prefix: String,
}

impl InferredIriScheme {
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(OntoverError::Config("inferred IRI prefix must not be empty".to_string()));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inferred_iri(&self, version_iri: &str) -> String {
        format!("{}{}", self.prefix, version_iri)
    }

    /// Recover the version IRI from an inferred IRI produced by this scheme
    pub fn invert<'a>(&self, inferred_iri: &'a str) -> Option<&'a str> {
        inferred_iri.strip_prefix(self.prefix.as_str())
    }

    /// Derive the inferred identity of a versioned identity
    pub fn derive(&self, identity: &OntologyIdentity) -> Result<InferredIdentity> {
        let version_iri = identity.require_version()?;
        Ok(InferredIdentity {
            base_iri: identity.base_iri.clone(),
            version_iri: version_iri.to_string(),
            inferred_iri: self.inferred_iri(version_iri),
        })
    }
}

impl Default for InferredIriScheme {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_INFERRED_PREFIX.to_string(),
        }
    }
}

/// A versioned identity plus the graph holding statements inferred from it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredIdentity {
    pub base_iri: String,
    pub version_iri: String,
    pub inferred_iri: String,
}

impl InferredIdentity {
    pub fn identity(&self) -> OntologyIdentity {
        OntologyIdentity {
            base_iri: self.base_iri.clone(),
            version_iri: Some(self.version_iri.clone()),
        }
    }
}

impl fmt::Display for InferredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> @ <{}> (inferred <{}>)",
            self.base_iri, self.version_iri, self.inferred_iri
        )
    }
}

/// Versioned identities required to interpret one ontology (itself plus imports)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencySet {
    members: BTreeSet<OntologyIdentity>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a versioned identity; unversioned identities are rejected
    pub fn insert(&mut self, identity: OntologyIdentity) -> Result<bool> {
        identity.require_version()?;
        Ok(self.members.insert(identity))
    }

    pub fn contains(&self, identity: &OntologyIdentity) -> bool {
        self.members.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OntologyIdentity> {
        self.members.iter()
    }

    /// Short stable digest of the member set, for logs and diagnostics
    pub fn fingerprint(&self) -> String {
        let mut hasher = crc32fast::Hasher::new();
        for member in &self.members {
            hasher.update(member.base_iri.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(member.version_iri.as_deref().unwrap_or_default().as_bytes());
            hasher.update(b"\x1e");
        }
        hex::encode(hasher.finalize().to_be_bytes())
    }
}

impl FromIterator<OntologyIdentity> for DependencySet {
    fn from_iter<I: IntoIterator<Item = OntologyIdentity>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().filter(|i| i.is_versioned()).collect(),
        }
    }
}
