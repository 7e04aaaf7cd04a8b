//! Dependency resolution over the import relation
//!
//! - `order_batch`: Kahn's topological sort of a batch by base IRI, stable
//!   with respect to input order
//! - `two_level_imports`: the ordered import list used to prime the reasoner
//!   (direct imports at their current version, then their own imports)
//! - `order_members`: load order of a dependency set

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::errors::{OntoverError, Result};
use crate::identity::{DependencySet, OntologyIdentity};
use crate::store::connection::GraphConnection;
use crate::store::management::{ManagedOntologyRecord, ManagementGraph, ManagementGraphStore};

/// Anything that declares a base IRI and the base IRIs it imports
pub trait ImportDeclaring {
    fn base_iri(&self) -> &str;
    fn declared_imports(&self) -> &[String];
}

/// Plain node of an import graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportNode {
    pub base_iri: String,
    pub imports: Vec<String>,
}

impl ImportNode {
    pub fn new(base_iri: impl Into<String>, imports: &[&str]) -> Self {
        Self {
            base_iri: base_iri.into(),
            imports: imports.iter().map(|i| i.to_string()).collect(),
        }
    }
}

impl ImportDeclaring for ImportNode {
    fn base_iri(&self) -> &str {
        &self.base_iri
    }

    fn declared_imports(&self) -> &[String] {
        &self.imports
    }
}

/// Computes load orders and reasoner priming lists
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Order a batch so every item follows everything it imports
    ///
    /// `is_managed` is consulted for imports that are not part of the batch;
    /// if it answers false the batch fails with `UnresolvedImport`. Items with
    /// no ordering constraint between them keep their input order.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentity` when two items share a base IRI
    /// - `UnresolvedImport` for an import neither in the batch nor managed
    /// - `CyclicImport` naming every base IRI that sits on an import cycle
    pub fn order_batch<T, F>(&self, items: Vec<T>, mut is_managed: F) -> Result<Vec<T>>
    where
        T: ImportDeclaring,
        F: FnMut(&str) -> Result<bool>,
    {
        let mut index_of: HashMap<String, usize> = HashMap::new();
        for (index, item) in items.iter().enumerate() {
            if index_of.insert(item.base_iri().to_string(), index).is_some() {
                return Err(OntoverError::InvalidIdentity(format!(
                    "base IRI {} appears more than once in the batch",
                    item.base_iri()
                )));
            }
        }

        // edges: import -> importer
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
        let mut in_degree = vec![0usize; items.len()];

        for (index, item) in items.iter().enumerate() {
            let mut seen = HashSet::new();
            for import in item.declared_imports() {
                if !seen.insert(import.as_str()) {
                    continue;
                }
                match index_of.get(import) {
                    Some(&target) => {
                        dependents[target].push(index);
                        in_degree[index] += 1;
                    }
                    None => {
                        if !is_managed(import)? {
                            return Err(OntoverError::UnresolvedImport {
                                ontology: item.base_iri().to_string(),
                                import: import.clone(),
                            });
                        }
                    }
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..items.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(items.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < items.len() {
            let remaining: Vec<usize> = (0..items.len()).filter(|&i| in_degree[i] > 0).collect();
            let base_iris = cycle_members(&items, &index_of, &remaining);
            return Err(OntoverError::CyclicImport { base_iris });
        }

        debug!(size = items.len(), "batch ordered");

        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect())
    }

    /// Direct imports resolved to their current schema versions, followed by
    /// the imports recorded on those versions
    ///
    /// The walk stops at two levels. Each cached import already carries its
    /// own resolved closure, so nothing deeper is needed to prime a reasoner.
    /// Duplicates are dropped by base IRI, first seen wins.
    pub fn two_level_imports(
        &self,
        conn: &dyn GraphConnection,
        management: &ManagementGraphStore,
        record: &ManagedOntologyRecord,
    ) -> Result<Vec<OntologyIdentity>> {
        let mut ordered = Vec::new();
        let mut seen_bases = HashSet::new();
        seen_bases.insert(record.base_iri.clone());

        let mut direct = Vec::new();
        for import in &record.imports {
            let current = management
                .current_record(conn, ManagementGraph::Schema, &import.base_iri)?
                .ok_or_else(|| OntoverError::UnmanagedSchemaIri(import.base_iri.clone()))?;
            if seen_bases.insert(current.base_iri.clone()) {
                ordered.push(current.identity());
                direct.push(current);
            }
        }

        for current in &direct {
            for transitive in &current.imports {
                if seen_bases.insert(transitive.base_iri.clone()) {
                    ordered.push(transitive.clone());
                }
            }
        }

        Ok(ordered)
    }

    /// Dependency set of a record: itself plus its two-level imports
    pub fn dependency_set(
        &self,
        conn: &dyn GraphConnection,
        management: &ManagementGraphStore,
        record: &ManagedOntologyRecord,
    ) -> Result<(Vec<OntologyIdentity>, DependencySet)> {
        let imports = self.two_level_imports(conn, management, record)?;
        let set = std::iter::once(record.identity())
            .chain(imports.iter().cloned())
            .collect();
        Ok((imports, set))
    }

    /// Load order of a dependency set, using each member's recorded imports
    /// restricted to the set
    pub fn order_members(
        &self,
        conn: &dyn GraphConnection,
        management: &ManagementGraphStore,
        dependencies: &DependencySet,
    ) -> Result<Vec<OntologyIdentity>> {
        let mut nodes = Vec::new();
        let mut identities: HashMap<String, OntologyIdentity> = HashMap::new();
        let members: HashSet<&str> = dependencies.iter().map(|i| i.base_iri.as_str()).collect();

        for member in dependencies.iter() {
            let version = member.require_version()?;
            let (_, record) = management.find_record(conn, version)?.ok_or_else(|| {
                OntoverError::UnmanagedVersion {
                    base_iri: member.base_iri.clone(),
                    version: version.to_string(),
                }
            })?;

            let imports: Vec<String> = record
                .import_base_iris()
                .into_iter()
                .filter(|base| members.contains(base.as_str()))
                .collect();
            nodes.push(ImportNode {
                base_iri: member.base_iri.clone(),
                imports,
            });
            identities.insert(member.base_iri.clone(), member.clone());
        }

        let ordered = self.order_batch(nodes, |_| Ok(true))?;
        Ok(ordered
            .into_iter()
            .filter_map(|node| identities.remove(&node.base_iri))
            .collect())
    }
}

/// Base IRIs that can reach themselves through imports, sorted
fn cycle_members<T: ImportDeclaring>(
    items: &[T],
    index_of: &HashMap<String, usize>,
    remaining: &[usize],
) -> Vec<String> {
    let candidates: HashSet<usize> = remaining.iter().copied().collect();
    let edges = |index: usize| -> Vec<usize> {
        items[index]
            .declared_imports()
            .iter()
            .filter_map(|import| index_of.get(import).copied())
            .filter(|target| candidates.contains(target))
            .collect()
    };

    let mut members = BTreeSet::new();
    for &start in remaining {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<usize> = edges(start).into();
        while let Some(node) = queue.pop_front() {
            if node == start {
                members.insert(items[start].base_iri().to_string());
                break;
            }
            if visited.insert(node) {
                queue.extend(edges(node));
            }
        }
    }

    members.into_iter().collect()
}
