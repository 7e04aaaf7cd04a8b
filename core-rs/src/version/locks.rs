//! Per-base-IRI currency locks
//!
//! Moving a currency flag is read-modify-write over the management graph, so
//! two writers touching the same base IRI must not interleave. Every
//! operation that may move `isCurrent` takes the locks of all base IRIs it
//! touches, in sorted order, before opening its transaction.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::errors::{OntoverError, Result};

#[derive(Debug, Default)]
pub struct CurrencyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CurrencyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, base_iri: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| OntoverError::LockPoisoned("currency lock table".to_string()))?;
        Ok(locks
            .entry(base_iri.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Run `f` while holding the lock of every base IRI in `base_iris`
    ///
    /// Locks are acquired in sorted order so overlapping callers cannot
    /// deadlock. A poisoned per-base lock is taken over: the protected data is
    /// the store itself, which rolled back with the failed transaction.
    pub fn with_locks<I, S, T, F>(&self, base_iris: I, f: F) -> Result<T>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce() -> Result<T>,
    {
        let sorted: BTreeSet<String> = base_iris.into_iter().map(Into::into).collect();
        let mutexes = sorted
            .iter()
            .map(|base| self.lock_for(base))
            .collect::<Result<Vec<_>>>()?;

        let _guards: Vec<MutexGuard<'_, ()>> = mutexes
            .iter()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect();
        debug!(count = sorted.len(), "currency locks held");

        f()
    }

    /// Number of base IRIs that have ever been locked
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
