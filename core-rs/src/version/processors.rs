//! Document processors keyed by pipeline stage
//!
//! A `ProcessorRegistry` is built once and handed to the version managers.
//! Each stage has an ordered list of processors; they run in registration
//! order over the incoming document before it is profile-checked or written.
//! The first processor error aborts the operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::errors::{OntoverError, Result};
use crate::ontology::document::OntologyDocument;

/// Point in the pipeline where processors run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    SchemaUpload,
    ArtifactLoad,
    ArtifactEdit,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::SchemaUpload, Stage::ArtifactLoad, Stage::ArtifactEdit];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::SchemaUpload => write!(f, "schema-upload"),
            Stage::ArtifactLoad => write!(f, "artifact-load"),
            Stage::ArtifactEdit => write!(f, "artifact-edit"),
        }
    }
}

/// Rewrites or rejects a document at one pipeline stage
pub trait OntologyProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, stage: Stage, document: &mut OntologyDocument) -> Result<()>;
}

/// Ordered processors per stage
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    stages: HashMap<Stage, Vec<Arc<dyn OntologyProcessor>>>,
}

impl ProcessorRegistry {
    /// Registry with no processors at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the header processor installed on every stage
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let header: Arc<dyn OntologyProcessor> = Arc::new(OntologyHeaderProcessor);
        for stage in Stage::ALL {
            registry.register_shared(stage, header.clone());
        }
        registry
    }

    pub fn register<P: OntologyProcessor + 'static>(&mut self, stage: Stage, processor: P) -> &mut Self {
        self.register_shared(stage, Arc::new(processor))
    }

    pub fn register_shared(&mut self, stage: Stage, processor: Arc<dyn OntologyProcessor>) -> &mut Self {
        self.stages.entry(stage).or_default().push(processor);
        self
    }

    /// Processor names for a stage, in run order
    pub fn names(&self, stage: Stage) -> Vec<String> {
        self.stages
            .get(&stage)
            .map(|list| list.iter().map(|p| p.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Run every processor of `stage` over `document`
    ///
    /// Processor failures other than `ProcessorRejected` are wrapped into
    /// `ProcessorRejected` naming the stage and processor.
    pub fn run(&self, stage: Stage, document: &mut OntologyDocument) -> Result<()> {
        let Some(processors) = self.stages.get(&stage) else {
            return Ok(());
        };

        for processor in processors {
            debug!(stage = %stage, processor = processor.name(), base_iri = %document.base_iri(), "running processor");
            processor.process(stage, document).map_err(|err| match err {
                rejected @ OntoverError::ProcessorRejected { .. } => rejected,
                other => OntoverError::ProcessorRejected {
                    stage,
                    processor: processor.name().to_string(),
                    reason: other.to_string(),
                },
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for stage in Stage::ALL {
            map.entry(&stage, &self.names(stage));
        }
        map.finish()
    }
}

/// Makes the `owl:Ontology`, `owl:versionIRI` and `owl:imports` statements
/// agree with the identity and imports assigned to the document
pub struct OntologyHeaderProcessor;

impl OntologyProcessor for OntologyHeaderProcessor {
    fn name(&self) -> &str {
        "ontology-header"
    }

    fn process(&self, _stage: Stage, document: &mut OntologyDocument) -> Result<()> {
        if document.version_iri().is_none() {
            return Err(OntoverError::InvalidIdentity(format!(
                "{} reached processing without a version IRI",
                document.base_iri()
            )));
        }
        document.sync_header()
    }
}
