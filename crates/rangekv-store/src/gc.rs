//! Range garbage collection: the scanning/removal engine.
//!
//! A scan pass takes a consistent snapshot of the store's replica map,
//! classifies every replica against a single clock reading, and removes
//! the ones whose owning store left the membership long enough ago for any
//! lease they might hold to have provably expired. Trouble evaluating one
//! replica never aborts the pass; errors are collected in the report and
//! the remaining replicas are still scanned.
//!
//! Passes run on a periodic loop per store, and synchronously on demand
//! through [`Store::force_scan`].

use crate::replica::Replica;
use crate::store::Store;
use rangekv_common::{Error, GcConfig, RangeId, Result, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Per-replica classification within one scan pass.
///
/// Only `Active` and the terminal removal are visible outside the queue;
/// the intermediate states are scan bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GcState {
    /// The owning store is a member of the range
    Active,
    /// Orphaned, but the lease or grace period still protects the replica
    Pending,
    /// Orphaned past the grace period with no live lease; remove now
    Eligible,
}

/// Outcome of one scan pass
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Replicas inspected in this pass
    pub scanned: usize,
    /// Ranges whose replicas were removed in this pass
    pub removed: Vec<RangeId>,
    /// Replicas skipped because their local state could not be evaluated
    pub skipped: Vec<(RangeId, Error)>,
}

/// Classify one replica at `now` with the given grace period.
///
/// Errors mark replicas whose local state is unusable for a removal
/// decision, such as a descriptor with no member list.
pub(crate) fn evaluate(replica: &Replica, now: Timestamp, grace: Duration) -> Result<GcState> {
    if replica.descriptor().replicas.is_empty() {
        return Err(Error::EmptyDescriptor(replica.range_id()));
    }
    let Some(orphaned_since) = replica.orphaned_since() else {
        return Ok(GcState::Active);
    };
    // An orphaned replica that still believes it holds write authority
    // must survive; removing it would drop the authoritative copy.
    if replica.holds_live_lease(now) {
        return Ok(GcState::Pending);
    }
    if now.saturating_duration_since(orphaned_since) < grace {
        return Ok(GcState::Pending);
    }
    Ok(GcState::Eligible)
}

/// The scanning/removal engine bound to one store
pub struct GcQueue {
    config: GcConfig,
}

impl GcQueue {
    pub(crate) fn new(config: GcConfig) -> Self {
        Self { config }
    }

    /// Timing configuration this queue was built with
    #[must_use]
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Run one scan pass over the store.
    ///
    /// Eligibility is decided against one clock reading and one snapshot
    /// of the replica map; each removal then re-validates under the write
    /// lock, so a membership update racing the pass lands in either this
    /// pass or the next, never half-applied within one decision.
    pub fn scan(&self, store: &Store) -> ScanReport {
        let now = store.clock().now();
        let grace = self.config.grace_period();
        let snapshot = store.scan_snapshot();

        let mut report = ScanReport {
            scanned: snapshot.len(),
            ..ScanReport::default()
        };

        let mut candidates = Vec::new();
        for replica in &snapshot {
            match evaluate(replica, now, grace) {
                Ok(GcState::Eligible) => {
                    candidates.push((replica.range_id(), replica.descriptor().generation));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        store = %store.id(),
                        range = %replica.range_id(),
                        error = %err,
                        "skipping replica with malformed state"
                    );
                    report.skipped.push((replica.range_id(), err));
                }
            }
        }

        for (range_id, generation) in candidates {
            if store.remove_if_eligible(range_id, generation, now, grace) {
                report.removed.push(range_id);
            }
        }

        if !report.removed.is_empty() {
            info!(
                store = %store.id(),
                scanned = report.scanned,
                removed = report.removed.len(),
                "range GC pass reclaimed replicas"
            );
        }
        report
    }
}

/// Handle to a running GC loop
pub struct GcHandle {
    trigger: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GcHandle {
    /// Wake the loop for an immediate scan pass
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the loop and wait for it to exit. In-flight removals already
    /// committed remain committed; no future scans run.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the periodic scan loop for a store.
///
/// The loop scans on a fixed interval, wakes early on an explicit trigger,
/// and exits promptly on shutdown (also when the handle is dropped).
pub(crate) fn spawn(store: Arc<Store>) -> GcHandle {
    let trigger = Arc::new(Notify::new());
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let loop_trigger = Arc::clone(&trigger);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(store.gc_config().scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(store = %store.id(), "range GC loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = loop_trigger.notified() => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }
            store.force_scan();
        }

        info!(store = %store.id(), "range GC loop stopped");
    });

    GcHandle {
        trigger,
        shutdown,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangekv_common::{
        Clock, Lease, ManualClock, RangeDescriptor, StoreConfig, StoreId,
    };

    const RANGE: RangeId = RangeId::new(1);

    fn test_config() -> StoreConfig {
        StoreConfig {
            gc: GcConfig {
                lease_duration: Duration::from_secs(1),
                unleased_grace: Duration::from_secs(10),
                scan_interval: Duration::from_millis(10),
            },
        }
    }

    fn descriptor(generation: u64, members: &[u64]) -> RangeDescriptor {
        RangeDescriptor::new(
            RANGE,
            generation,
            members.iter().copied().map(StoreId::new).collect(),
        )
        .unwrap()
    }

    /// In-process stand-in for a replication group: one shared manual
    /// clock and one store per member, with descriptor updates fanned out
    /// to every store that currently hosts a replica.
    struct Cluster {
        clock: Arc<ManualClock>,
        stores: Vec<Arc<Store>>,
    }

    impl Cluster {
        fn new(store_ids: &[u64]) -> Self {
            let clock = Arc::new(ManualClock::new());
            let stores = store_ids
                .iter()
                .map(|id| Arc::new(Store::new(StoreId::new(*id), clock.clone(), test_config())))
                .collect();
            Self { clock, stores }
        }

        fn store(&self, store_id: u64) -> &Arc<Store> {
            self.stores
                .iter()
                .find(|s| s.id() == StoreId::new(store_id))
                .unwrap()
        }

        /// Install a replica of the range on every member store
        fn replicate(&self, generation: u64, members: &[u64]) {
            for id in members {
                let store = self.store(*id);
                let replica =
                    Replica::new(store.id(), descriptor(generation, members), self.clock.now())
                        .unwrap();
                store.upsert(replica).unwrap();
            }
        }

        /// Deliver a membership change to every store still hosting the range
        fn change_membership(&self, generation: u64, members: &[u64]) {
            for store in &self.stores {
                if store.get(RANGE).is_ok() {
                    store
                        .deliver_descriptor_update(RANGE, descriptor(generation, members))
                        .unwrap();
                }
            }
        }

        /// Tear a store down and rebuild it from its surviving replicas
        fn restart_store(&mut self, store_id: u64) {
            let index = self
                .stores
                .iter()
                .position(|s| s.id() == StoreId::new(store_id))
                .unwrap();
            let old = &self.stores[index];
            let survivors: Vec<Replica> = old
                .range_ids()
                .into_iter()
                .map(|range_id| old.get(range_id).unwrap())
                .collect();

            let fresh = Arc::new(Store::new(StoreId::new(store_id), self.clock.clone(), test_config()));
            for replica in survivors {
                fresh.upsert(replica).unwrap();
            }
            self.stores[index] = fresh;
        }
    }

    #[test]
    fn test_active_replica_never_removed() {
        let cluster = Cluster::new(&[1, 2, 3]);
        cluster.replicate(1, &[1, 2, 3]);
        cluster
            .clock
            .advance(Duration::from_secs(3600))
            .unwrap();

        let report = cluster.store(1).force_scan();
        assert_eq!(report.scanned, 1);
        assert!(report.removed.is_empty());
        assert!(cluster.store(1).get(RANGE).is_ok());
    }

    #[test]
    fn test_orphan_survives_grace_period() {
        let cluster = Cluster::new(&[1, 2, 3]);
        cluster.replicate(1, &[1, 2, 3]);
        cluster.change_membership(2, &[2, 3]);

        let grace = test_config().gc.grace_period();
        cluster
            .clock
            .advance(grace - Duration::from_nanos(1))
            .unwrap();

        let report = cluster.store(1).force_scan();
        assert!(report.removed.is_empty());
        assert!(cluster.store(1).get(RANGE).is_ok());
    }

    #[test]
    fn test_live_lease_blocks_removal() {
        let cluster = Cluster::new(&[1, 2, 3]);
        cluster.replicate(1, &[1, 2, 3]);

        let config = test_config().gc;
        let store = cluster.store(1);

        // The replica on store 1 holds the lease when it is orphaned, and
        // the lease is then renewed mid-grace-period.
        cluster.change_membership(2, &[2, 3]);
        cluster.clock.advance(config.grace_period()).unwrap();
        let lease = Lease::new(
            StoreId::new(1),
            cluster.clock.now(),
            cluster.clock.now() + config.lease_duration,
        )
        .unwrap();
        store.deliver_lease_update(RANGE, lease).unwrap();

        let report = store.force_scan();
        assert!(report.removed.is_empty());
        assert!(store.get(RANGE).is_ok());

        // Once that lease expires the replica is reclaimable again.
        cluster
            .clock
            .advance(config.lease_duration + Duration::from_nanos(1))
            .unwrap();
        let report = store.force_scan();
        assert_eq!(report.removed, vec![RANGE]);
    }

    #[test]
    fn test_readded_replica_returns_to_active() {
        let cluster = Cluster::new(&[1, 2, 3]);
        cluster.replicate(1, &[1, 2, 3]);
        cluster.change_membership(2, &[2, 3]);

        let grace = test_config().gc.grace_period();
        cluster.clock.advance(grace).unwrap();

        // Membership names store 1 again before any scan reclassified the
        // replica; it must never be removed for the stale reason.
        cluster.change_membership(3, &[1, 2, 3]);
        cluster.clock.advance(grace + grace).unwrap();

        let report = cluster.store(1).force_scan();
        assert!(report.removed.is_empty());
        assert!(!cluster.store(1).get(RANGE).unwrap().is_orphaned());
    }

    #[test]
    fn test_malformed_replica_skipped_scan_continues() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(Store::new(StoreId::new(1), clock.clone(), test_config()));

        // One healthy eligible orphan.
        let orphan =
            Replica::new(StoreId::new(1), descriptor(2, &[2, 3]), clock.now()).unwrap();
        // And one replica of another range with a corrupted member list.
        let bad_desc = RangeDescriptor::new(RangeId::new(2), 1, vec![StoreId::new(1)]).unwrap();
        let mut bad = Replica::new(StoreId::new(1), bad_desc, clock.now()).unwrap();
        bad.clear_members_for_test();

        store.upsert(orphan).unwrap();
        store.upsert(bad).unwrap();

        clock
            .advance(test_config().gc.grace_period() + Duration::from_nanos(1))
            .unwrap();

        let report = store.force_scan();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, vec![RANGE]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, RangeId::new(2));
        assert!(report.skipped[0].1.is_malformed_state());
        // The malformed replica is left in place for a later pass.
        assert!(store.get(RangeId::new(2)).is_ok());
    }

    /// Mirrors the reference scenario: three replicas of a range, one
    /// store dropped from membership, repeated forced scans keep the
    /// replica until the lease duration plus the unleased grace have
    /// elapsed, then a scan removes it and a restart does not bring it
    /// back.
    #[test]
    fn test_gc_drops_replica_end_to_end() {
        let mut cluster = Cluster::new(&[1, 2, 3]);
        let config = test_config().gc;
        cluster.replicate(1, &[1, 2, 3]);

        // Store 1 holds the lease at the time it is dropped.
        let lease = Lease::new(
            StoreId::new(1),
            cluster.clock.now(),
            cluster.clock.now() + config.lease_duration,
        )
        .unwrap();
        cluster.store(1).deliver_lease_update(RANGE, lease).unwrap();

        cluster.change_membership(2, &[2, 3]);

        // Expire the lease; the replica must still survive repeated scans.
        cluster
            .clock
            .advance(config.lease_duration + Duration::from_nanos(1))
            .unwrap();
        for _ in 0..3 {
            cluster.store(1).force_scan();
            assert!(cluster.store(1).get(RANGE).is_ok(), "unexpected removal");
        }

        // After the additional unleased grace the next scan reclaims it.
        cluster.clock.advance(config.unleased_grace).unwrap();
        let report = cluster.store(1).force_scan();
        assert_eq!(report.removed, vec![RANGE]);
        assert!(cluster.store(1).get(RANGE).unwrap_err().is_not_found());

        // The other members keep their replicas.
        assert!(cluster.store(2).get(RANGE).is_ok());
        assert!(cluster.store(3).get(RANGE).is_ok());

        // Restarting the node does not resurrect the removed replica.
        cluster.restart_store(1);
        assert!(cluster.store(1).get(RANGE).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_gc_loop_removes_and_stops() {
        let cluster = Cluster::new(&[1, 2, 3]);
        let config = test_config().gc;
        cluster.replicate(1, &[1, 2, 3]);
        cluster.change_membership(2, &[2, 3]);
        cluster
            .clock
            .advance(config.grace_period() + Duration::from_nanos(1))
            .unwrap();

        let handle = cluster.store(1).spawn_gc();
        handle.trigger();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while cluster.store(1).get(RANGE).is_ok() {
            assert!(std::time::Instant::now() < deadline, "replica not reclaimed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        handle.stop().await;

        // A replica becoming eligible after the stop is never reclaimed.
        cluster.replicate(3, &[1, 2, 3]);
        cluster.store(1).deliver_descriptor_update(RANGE, descriptor(4, &[2, 3])).unwrap();
        cluster
            .clock
            .advance(config.grace_period() + Duration::from_nanos(1))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cluster.store(1).get(RANGE).is_ok());
    }
}
