//! Per-stream mutual exclusion for ledger mutations.
//!
//! The event store's optimistic check catches lost updates; these locks make
//! writers to the same item queue up instead of failing with a conflict.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use bakeops_core::AggregateId;

use crate::command_dispatcher::DispatchError;

/// Registry of one mutex per aggregate stream.
#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handles for `ids`, deduplicated and in ascending id order.
    ///
    /// Every caller acquires in the same global order, so overlapping sets
    /// cannot deadlock.
    pub fn set(&self, ids: impl IntoIterator<Item = AggregateId>) -> Result<LockSet, DispatchError> {
        let ordered: BTreeSet<AggregateId> = ids.into_iter().collect();
        let mut registry = self
            .locks
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("item lock registry".to_string()))?;

        let handles = ordered
            .into_iter()
            .map(|id| registry.entry(id).or_default().clone())
            .collect();
        Ok(LockSet { handles })
    }

    pub fn one(&self, id: AggregateId) -> Result<LockSet, DispatchError> {
        self.set([id])
    }
}

/// Ordered set of lock handles; [`LockSet::acquire`] blocks until all are held.
#[derive(Debug)]
pub struct LockSet {
    handles: Vec<Arc<Mutex<()>>>,
}

impl LockSet {
    pub fn acquire(&self) -> Result<Vec<MutexGuard<'_, ()>>, DispatchError> {
        self.handles
            .iter()
            .map(|h| {
                h.lock()
                    .map_err(|_| DispatchError::LockPoisoned("item lock".to_string()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
