//! Artifact module
//!
//! - auditor: reachability of artifact objects from the top object
//! - manager: artifact load, edit, publish and delete

pub mod auditor;
pub mod manager;

pub use auditor::{AuditScope, DanglingPolicy, ReachabilityAuditor, ReachabilityReport};
pub use manager::{ArtifactEdit, ArtifactManager, ArtifactSettings, PublishFilter, UpdatePolicy};
