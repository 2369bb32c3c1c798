//! Node-local replica container.
//!
//! The store maps range IDs to replicas behind a single `RwLock`; every
//! mutation, descriptor/lease delivery, and the per-pass snapshot taken by
//! the GC queue goes through that one lock, so a scan never observes a
//! half-applied update.

use crate::gc::{self, GcHandle, GcQueue, GcState, ScanReport};
use crate::replica::Replica;
use parking_lot::RwLock;
use rangekv_common::{
    Clock, Error, GcConfig, Lease, RangeDescriptor, RangeId, Result, StoreConfig, StoreId,
    Timestamp,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-node container of locally hosted replicas
pub struct Store {
    id: StoreId,
    clock: Arc<dyn Clock>,
    replicas: RwLock<HashMap<RangeId, Replica>>,
    gc: GcQueue,
}

impl Store {
    /// Create an empty store
    #[must_use]
    pub fn new(id: StoreId, clock: Arc<dyn Clock>, config: StoreConfig) -> Self {
        Self {
            id,
            clock,
            replicas: RwLock::new(HashMap::new()),
            gc: GcQueue::new(config.gc),
        }
    }

    /// This store's identifier
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// The clock all lease and grace-period arithmetic reads
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Garbage-collection timing configuration
    #[must_use]
    pub fn gc_config(&self) -> &GcConfig {
        self.gc.config()
    }

    /// Look up a replica by range ID, returning a snapshot of its state
    pub fn get(&self, range_id: RangeId) -> Result<Replica> {
        self.replicas
            .read()
            .get(&range_id)
            .cloned()
            .ok_or(Error::RangeNotFound(range_id))
    }

    /// Install or replace a replica by range ID
    pub fn upsert(&self, replica: Replica) -> Result<()> {
        if replica.store_id() != self.id {
            return Err(Error::StoreMismatch {
                expected: self.id,
                actual: replica.store_id(),
            });
        }
        let range_id = replica.range_id();
        self.replicas.write().insert(range_id, replica);
        debug!(store = %self.id, range = %range_id, "installed replica");
        Ok(())
    }

    /// Delete a replica if present. Returns whether one was removed; a
    /// second removal of the same range is a no-op, not an error, because
    /// a scan racing with a direct removal is expected and harmless.
    pub fn remove(&self, range_id: RangeId) -> bool {
        let removed = self.replicas.write().remove(&range_id).is_some();
        if removed {
            debug!(store = %self.id, range = %range_id, "removed replica");
        }
        removed
    }

    /// Number of replicas currently hosted
    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.replicas.read().len()
    }

    /// Range IDs of all replicas currently hosted
    #[must_use]
    pub fn range_ids(&self) -> Vec<RangeId> {
        self.replicas.read().keys().copied().collect()
    }

    /// Apply a membership change delivered by the consensus layer.
    ///
    /// The descriptor must target a hosted range and carry a strictly
    /// higher generation than the replica's current snapshot.
    pub fn deliver_descriptor_update(
        &self,
        range_id: RangeId,
        descriptor: RangeDescriptor,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut replicas = self.replicas.write();
        let replica = replicas
            .get_mut(&range_id)
            .ok_or(Error::RangeNotFound(range_id))?;
        replica.apply_descriptor(descriptor, now)?;
        if replica.is_orphaned() {
            debug!(store = %self.id, range = %range_id, "replica orphaned by membership change");
        }
        Ok(())
    }

    /// Apply a lease change delivered by the consensus layer
    pub fn deliver_lease_update(&self, range_id: RangeId, lease: Lease) -> Result<()> {
        let mut replicas = self.replicas.write();
        let replica = replicas
            .get_mut(&range_id)
            .ok_or(Error::RangeNotFound(range_id))?;
        replica.apply_lease(lease)
    }

    /// Synchronously run one GC pass over this store and return its report
    pub fn force_scan(&self) -> ScanReport {
        self.gc.scan(self)
    }

    /// Start the periodic GC loop for this store
    #[must_use]
    pub fn spawn_gc(self: &Arc<Self>) -> GcHandle {
        gc::spawn(Arc::clone(self))
    }

    /// Consistent snapshot of all hosted replicas for one scan pass
    pub(crate) fn scan_snapshot(&self) -> Vec<Replica> {
        self.replicas.read().values().cloned().collect()
    }

    /// Remove a replica if it is still the one a scan judged eligible.
    ///
    /// Re-validates under the write lock that the descriptor generation
    /// matches the snapshot the decision was made against and that the
    /// replica still evaluates eligible at `now`; an update applied after
    /// the snapshot was taken defers the removal to the next pass.
    pub(crate) fn remove_if_eligible(
        &self,
        range_id: RangeId,
        expected_generation: u64,
        now: Timestamp,
        grace: Duration,
    ) -> bool {
        let mut replicas = self.replicas.write();
        let Some(replica) = replicas.get(&range_id) else {
            return false;
        };
        if replica.descriptor().generation != expected_generation {
            return false;
        }
        if !matches!(gc::evaluate(replica, now, grace), Ok(GcState::Eligible)) {
            return false;
        }
        replicas.remove(&range_id);
        debug!(store = %self.id, range = %range_id, "reclaimed orphaned replica");
        true
    }
}
