//! Reasoning cache
//!
//! Loaded ontologies are cached per `(identity, dependency set)`, so two
//! requests for the same version with different import versions never share
//! an entry. Each `LoadedOntology` holds `Arc` handles to the loaded
//! ontologies it imports, which is what lets the resolver stop its import walk
//! at two levels.
//!
//! The cache and the reasoner share one mutex inside `ReasonerService`; all
//! loading and eviction happens through `with_exclusive_access`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use oxigraph::model::Triple;
use tracing::{debug, info, warn};

use crate::errors::{OntoverError, Result};
use crate::identity::{DependencySet, OntologyIdentity};
use crate::ontology::reasoner::Reasoner;
use crate::resolver::DependencyResolver;
use crate::store::connection::GraphConnection;
use crate::store::management::ManagementGraphStore;
use crate::store::named;

/// A version loaded into the reasoner, with its imports and inferences
#[derive(Debug)]
pub struct LoadedOntology {
    identity: OntologyIdentity,
    asserted: Vec<Triple>,
    inferred: Vec<Triple>,
    imports: Vec<Arc<LoadedOntology>>,
}

impl LoadedOntology {
    pub fn new(identity: OntologyIdentity, asserted: Vec<Triple>, imports: Vec<Arc<LoadedOntology>>) -> Self {
        Self {
            identity,
            asserted,
            inferred: Vec::new(),
            imports,
        }
    }

    pub fn with_inferred(mut self, inferred: Vec<Triple>) -> Self {
        self.inferred = inferred;
        self
    }

    pub fn identity(&self) -> &OntologyIdentity {
        &self.identity
    }

    pub fn asserted(&self) -> &[Triple] {
        &self.asserted
    }

    pub fn inferred(&self) -> &[Triple] {
        &self.inferred
    }

    pub fn imports(&self) -> &[Arc<LoadedOntology>] {
        &self.imports
    }

    /// Every version reachable through import handles, first seen order
    pub fn import_closure(&self) -> Vec<OntologyIdentity> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut stack: Vec<&LoadedOntology> = self.imports.iter().rev().map(|i| i.as_ref()).collect();

        while let Some(ontology) = stack.pop() {
            if !seen.insert(ontology.identity.clone()) {
                continue;
            }
            ordered.push(ontology.identity.clone());
            stack.extend(ontology.imports.iter().rev().map(|i| i.as_ref()));
        }
        ordered
    }

    /// Asserted and inferred statements of this ontology and its import closure
    pub fn closure_statements(&self) -> Vec<Triple> {
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut statements = Vec::new();
        let mut stack: Vec<&LoadedOntology> = vec![self];

        while let Some(ontology) = stack.pop() {
            if !visited.insert(&ontology.identity) {
                continue;
            }
            for statement in ontology.asserted.iter().chain(ontology.inferred.iter()) {
                if seen.insert(statement) {
                    statements.push(statement.clone());
                }
            }
            stack.extend(ontology.imports.iter().map(|i| i.as_ref()));
        }
        statements
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    identity: OntologyIdentity,
    dependencies: DependencySet,
}

/// Read access needed to load ontologies from the store
pub struct CacheContext<'a> {
    pub conn: &'a dyn GraphConnection,
    pub resolver: &'a DependencyResolver,
    pub management: &'a ManagementGraphStore,
}

#[derive(Debug, Default)]
pub struct ReasoningCache {
    entries: HashMap<CacheKey, Arc<LoadedOntology>>,
}

impl ReasoningCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_cached(&self, identity: &OntologyIdentity, dependencies: &DependencySet) -> bool {
        self.entries.contains_key(&key(identity, dependencies))
    }

    pub fn get(&self, identity: &OntologyIdentity, dependencies: &DependencySet) -> Option<Arc<LoadedOntology>> {
        self.entries.get(&key(identity, dependencies)).cloned()
    }

    /// Every cached entry for an identity, whatever its dependency set
    pub fn dependency_sets_of(&self, identity: &OntologyIdentity) -> Vec<DependencySet> {
        self.entries
            .keys()
            .filter(|k| &k.identity == identity)
            .map(|k| k.dependencies.clone())
            .collect()
    }

    /// Evict exactly one entry; other members of the set stay cached
    pub fn remove_cache(&mut self, identity: &OntologyIdentity, dependencies: &DependencySet) -> bool {
        let removed = self.entries.remove(&key(identity, dependencies)).is_some();
        if removed {
            debug!(identity = %identity, fingerprint = %dependencies.fingerprint(), "cache entry evicted");
        }
        removed
    }

    /// Evict every entry of an identity
    pub fn remove_identity(&mut self, identity: &OntologyIdentity) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| &k.identity != identity);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Make sure every member of `dependencies` is loaded, in dependency
    /// order, and return their handles in that order
    pub fn cache(
        &mut self,
        reasoner: &mut dyn Reasoner,
        dependencies: &DependencySet,
        ctx: &CacheContext<'_>,
    ) -> Result<Vec<Arc<LoadedOntology>>> {
        let order = ctx.resolver.order_members(ctx.conn, ctx.management, dependencies)?;
        let mut handles = Vec::with_capacity(order.len());
        for member in &order {
            handles.push(self.ensure(reasoner, member, ctx)?);
        }
        Ok(handles)
    }

    /// Load one managed version with its two-level imports, reusing any
    /// cached handle keyed by the same dependency set
    ///
    /// Imports are loaded first. A failed consistency check caches nothing
    /// for the failing version and surfaces the reasoner's report.
    pub fn ensure(
        &mut self,
        reasoner: &mut dyn Reasoner,
        identity: &OntologyIdentity,
        ctx: &CacheContext<'_>,
    ) -> Result<Arc<LoadedOntology>> {
        let mut visiting = Vec::new();
        self.ensure_inner(reasoner, identity, ctx, &mut visiting)
    }

    fn ensure_inner(
        &mut self,
        reasoner: &mut dyn Reasoner,
        identity: &OntologyIdentity,
        ctx: &CacheContext<'_>,
        visiting: &mut Vec<String>,
    ) -> Result<Arc<LoadedOntology>> {
        let version_iri = identity.require_version()?;
        let (_, record) = ctx
            .management
            .find_record(ctx.conn, version_iri)?
            .ok_or_else(|| OntoverError::UnmanagedVersion {
                base_iri: identity.base_iri.clone(),
                version: version_iri.to_string(),
            })?;

        let (imports, dependencies) = ctx.resolver.dependency_set(ctx.conn, ctx.management, &record)?;
        let cache_key = key(identity, &dependencies);
        if let Some(handle) = self.entries.get(&cache_key) {
            return Ok(handle.clone());
        }

        if visiting.contains(&record.base_iri) {
            let mut base_iris = visiting.clone();
            base_iris.sort();
            base_iris.dedup();
            return Err(OntoverError::CyclicImport { base_iris });
        }
        visiting.push(record.base_iri.clone());

        let mut import_handles = Vec::with_capacity(imports.len());
        for import in &imports {
            import_handles.push(self.ensure_inner(reasoner, import, ctx, visiting)?);
        }
        visiting.pop();

        let asserted = ctx.conn.export_graph(&named(version_iri)?)?;
        let loaded = LoadedOntology::new(identity.clone(), asserted, import_handles);

        let report = reasoner.check_consistency(&loaded)?;
        if !report.consistent {
            return Err(OntoverError::InconsistentOntology(report));
        }
        let inferred = reasoner.infer(&loaded)?;
        let handle = Arc::new(loaded.with_inferred(inferred));

        info!(
            identity = %identity,
            fingerprint = %dependencies.fingerprint(),
            imports = imports.len(),
            inferred = handle.inferred().len(),
            "ontology cached"
        );
        self.entries.insert(cache_key, handle.clone());
        Ok(handle)
    }
}

fn key(identity: &OntologyIdentity, dependencies: &DependencySet) -> CacheKey {
    CacheKey {
        identity: identity.clone(),
        dependencies: dependencies.clone(),
    }
}

/// Reasoner plus its cache, the unit of exclusive access
pub struct ReasoningState {
    pub reasoner: Box<dyn Reasoner>,
    pub cache: ReasoningCache,
}

impl ReasoningState {
    pub fn ensure(&mut self, identity: &OntologyIdentity, ctx: &CacheContext<'_>) -> Result<Arc<LoadedOntology>> {
        self.cache.ensure(self.reasoner.as_mut(), identity, ctx)
    }

    pub fn cache_set(&mut self, dependencies: &DependencySet, ctx: &CacheContext<'_>) -> Result<Vec<Arc<LoadedOntology>>> {
        self.cache.cache(self.reasoner.as_mut(), dependencies, ctx)
    }
}

/// Serialises every use of one stateful reasoner and its cache
pub struct ReasonerService {
    state: Mutex<ReasoningState>,
}

impl ReasonerService {
    pub fn new(reasoner: Box<dyn Reasoner>) -> Self {
        Self {
            state: Mutex::new(ReasoningState {
                reasoner,
                cache: ReasoningCache::new(),
            }),
        }
    }

    /// Run `f` holding the reasoner lock
    ///
    /// The guard is released when `f` returns, whether it succeeds or fails.
    /// If an earlier holder panicked, the cache may be half-built and is
    /// cleared before `f` runs.
    pub fn with_exclusive_access<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ReasoningState) -> Result<T>,
    {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("reasoner lock poisoned, clearing reasoning cache");
                self.state.clear_poison();
                let mut guard = poisoned.into_inner();
                guard.cache.clear();
                guard
            }
        };
        f(&mut guard)
    }

    pub fn reasoner_name(&self) -> Result<String> {
        self.with_exclusive_access(|state| Ok(state.reasoner.name().to_string()))
    }
}
