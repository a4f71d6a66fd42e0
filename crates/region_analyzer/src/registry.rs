use crate::pipeline::RegionAnalysis;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// Bounded map from opaque id to a finished analysis.
///
/// Inserting past capacity evicts the oldest entry. Entries are shared as
/// `Arc`s, so an evicted analysis stays alive for readers still holding it.
pub struct ResultRegistry {
    entries: DashMap<Uuid, Arc<RegionAnalysis>>,
    order: Mutex<VecDeque<Uuid>>,
    capacity: usize,
}

impl ResultRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: DashMap::with_capacity(capacity),
            order: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores `analysis` under its own id. Returns the id of the evicted
    /// entry, if any.
    pub fn insert(&self, analysis: RegionAnalysis) -> (Arc<RegionAnalysis>, Option<Uuid>) {
        let id = analysis.id;
        let analysis = Arc::new(analysis);

        let mut order = self.order.lock();
        if self.entries.insert(id, analysis.clone()).is_none() {
            order.push_back(id);
        }

        let mut evicted = None;
        while order.len() > self.capacity {
            if let Some(old) = order.pop_front() {
                self.entries.remove(&old);
                tracing::debug!(id = %old, "Evicted analysis from registry");
                evicted = Some(old);
            }
        }
        (analysis, evicted)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<RegionAnalysis>> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<RegionAnalysis>> {
        let mut order = self.order.lock();
        let (_, removed) = self.entries.remove(id)?;
        order.retain(|k| k != id);
        Some(removed)
    }

    /// Ids from oldest to newest.
    pub fn ids(&self) -> Vec<Uuid> {
        self.order.lock().iter().copied().collect()
    }
}
