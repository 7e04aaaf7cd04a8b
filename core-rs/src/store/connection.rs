//! Triple-store connection abstraction
//!
//! The version manager never talks to a store directly. It asks a
//! `Repository` for a connection per logical operation, stages writes inside
//! a transaction, and commits or rolls back at the end.
//!
//! `OxigraphRepository` is the bundled implementation. Its connections buffer
//! writes until commit and apply them in one oxigraph transaction. Reads made
//! inside an open transaction see the staged writes.

use std::collections::HashSet;
use std::path::Path;

use oxigraph::model::{GraphName, GraphNameRef, NamedNode, Quad, Subject, SubjectRef, Term, Triple};
use oxigraph::store::{StorageError, Store};
use tracing::{debug, warn};

use crate::errors::{OntoverError, Result};

/// Transactional access to named graphs
///
/// # Contract
///
/// - Writes (`insert_quad`, `remove_quad` and everything built on them) fail
///   with `NoActiveTransaction` outside `begin`/`commit`
/// - Within one transaction writes apply in the order issued
/// - Reads inside a transaction reflect staged writes
pub trait GraphConnection: Send {
    /// Open a transaction
    fn begin(&mut self) -> Result<()>;

    /// Apply all staged writes atomically
    fn commit(&mut self) -> Result<()>;

    /// Discard all staged writes
    fn rollback(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;

    /// Stage a quad insertion, returns false if the quad is already present
    fn insert_quad(&mut self, quad: Quad) -> Result<bool>;

    /// Stage a quad removal, returns false if the quad is absent
    fn remove_quad(&mut self, quad: &Quad) -> Result<bool>;

    /// Pattern match; `None` is a wildcard
    fn match_pattern(
        &self,
        subject: Option<&NamedNode>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&NamedNode>,
    ) -> Result<Vec<Quad>>;

    fn add(&mut self, triple: Triple, graph: &NamedNode) -> Result<bool> {
        self.insert_quad(triple.in_graph(graph.clone()))
    }

    fn remove(&mut self, triple: &Triple, graph: &NamedNode) -> Result<bool> {
        self.remove_quad(&triple.clone().in_graph(graph.clone()))
    }

    fn remove_matching(
        &mut self,
        subject: Option<&NamedNode>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&NamedNode>,
    ) -> Result<usize> {
        let quads = self.match_pattern(subject, predicate, object, graph)?;
        let mut removed = 0;
        for quad in &quads {
            if self.remove_quad(quad)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Every statement of a graph, ordered by its N-Triples rendering
    fn export_graph(&self, graph: &NamedNode) -> Result<Vec<Triple>> {
        let mut triples: Vec<Triple> = self
            .match_pattern(None, None, None, Some(graph))?
            .into_iter()
            .map(|quad| Triple::new(quad.subject, quad.predicate, quad.object))
            .collect();
        triples.sort_by_cached_key(|t| t.to_string());
        Ok(triples)
    }

    fn clear_graph(&mut self, graph: &NamedNode) -> Result<usize> {
        self.remove_matching(None, None, None, Some(graph))
    }

    fn graph_is_empty(&self, graph: &NamedNode) -> Result<bool> {
        Ok(self.match_pattern(None, None, None, Some(graph))?.is_empty())
    }
}

/// Source of per-operation connections
pub trait Repository: Send + Sync {
    fn connect(&self) -> Result<Box<dyn GraphConnection>>;
}

/// Oxigraph-backed repository
#[derive(Clone)]
pub struct OxigraphRepository {
    store: Store,
}

impl OxigraphRepository {
    /// Volatile in-memory store
    pub fn in_memory() -> Result<Self> {
        let store = Store::new()?;
        Ok(Self { store })
    }

    /// On-disk store at `path` (created if missing)
    pub fn open(path: &Path) -> Result<Self> {
        let store = Store::open(path)?;
        Ok(Self { store })
    }

    pub fn from_store(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl Repository for OxigraphRepository {
    fn connect(&self) -> Result<Box<dyn GraphConnection>> {
        Ok(Box::new(OxigraphConnection::new(self.store.clone())))
    }
}

#[derive(Default)]
struct StagedWrites {
    inserts: HashSet<Quad>,
    removals: HashSet<Quad>,
}

/// Connection with a write buffer over an oxigraph `Store`
pub struct OxigraphConnection {
    store: Store,
    staged: Option<StagedWrites>,
}

impl OxigraphConnection {
    pub fn new(store: Store) -> Self {
        Self { store, staged: None }
    }

    fn staged_mut(&mut self) -> Result<&mut StagedWrites> {
        self.staged.as_mut().ok_or(OntoverError::NoActiveTransaction)
    }
}

impl GraphConnection for OxigraphConnection {
    fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(OntoverError::TransactionAlreadyActive);
        }
        self.staged = Some(StagedWrites::default());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let staged = self.staged.take().ok_or(OntoverError::NoActiveTransaction)?;
        debug!(
            inserts = staged.inserts.len(),
            removals = staged.removals.len(),
            "committing transaction"
        );

        self.store.transaction(|mut transaction| {
            for quad in &staged.removals {
                transaction.remove(quad.as_ref())?;
            }
            for quad in &staged.inserts {
                transaction.insert(quad.as_ref())?;
            }
            Ok::<_, StorageError>(())
        })?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let staged = self.staged.take().ok_or(OntoverError::NoActiveTransaction)?;
        debug!(
            discarded = staged.inserts.len() + staged.removals.len(),
            "rolled back transaction"
        );
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.staged.is_some()
    }

    fn insert_quad(&mut self, quad: Quad) -> Result<bool> {
        self.staged_mut()?;
        let exists = self.store.contains(quad.as_ref())?;
        let staged = self.staged_mut()?;

        if staged.removals.remove(&quad) {
            return Ok(true);
        }
        if exists {
            return Ok(false);
        }
        Ok(staged.inserts.insert(quad))
    }

    fn remove_quad(&mut self, quad: &Quad) -> Result<bool> {
        self.staged_mut()?;
        let exists = self.store.contains(quad.as_ref())?;
        let staged = self.staged_mut()?;

        if staged.inserts.remove(quad) {
            return Ok(true);
        }
        if exists && !staged.removals.contains(quad) {
            staged.removals.insert(quad.clone());
            return Ok(true);
        }
        Ok(false)
    }

    fn match_pattern(
        &self,
        subject: Option<&NamedNode>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&NamedNode>,
    ) -> Result<Vec<Quad>> {
        let mut quads = Vec::new();

        for quad in self.store.quads_for_pattern(
            subject.map(|s| SubjectRef::from(s.as_ref())),
            predicate.map(|p| p.as_ref()),
            object.map(|o| o.as_ref()),
            graph.map(|g| GraphNameRef::from(g.as_ref())),
        ) {
            let quad = quad?;
            if let Some(staged) = &self.staged {
                if staged.removals.contains(&quad) {
                    continue;
                }
            }
            quads.push(quad);
        }

        if let Some(staged) = &self.staged {
            quads.extend(
                staged
                    .inserts
                    .iter()
                    .filter(|quad| quad_matches(quad, subject, predicate, object, graph))
                    .cloned(),
            );
        }

        Ok(quads)
    }
}

impl Drop for OxigraphConnection {
    fn drop(&mut self) {
        if let Some(staged) = &self.staged {
            warn!(
                discarded = staged.inserts.len() + staged.removals.len(),
                "connection dropped with an open transaction, staged writes discarded"
            );
        }
    }
}

fn quad_matches(
    quad: &Quad,
    subject: Option<&NamedNode>,
    predicate: Option<&NamedNode>,
    object: Option<&Term>,
    graph: Option<&NamedNode>,
) -> bool {
    subject.map_or(true, |s| matches!(&quad.subject, Subject::NamedNode(n) if n == s))
        && predicate.map_or(true, |p| &quad.predicate == p)
        && object.map_or(true, |o| &quad.object == o)
        && graph.map_or(true, |g| matches!(&quad.graph_name, GraphName::NamedNode(n) if n == g))
}
