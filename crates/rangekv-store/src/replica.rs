//! Replica lifecycle: one store's local materialization of a range.
//!
//! A replica carries a snapshot of the range's membership descriptor and
//! leader lease, both replaced in place as the consensus layer delivers
//! updates, plus the orphan mark that drives garbage collection. A replica
//! whose owning store is absent from its own descriptor's member set is
//! orphaned; the mark is monotonic and only a newer descriptor that names
//! the store again clears it.

use rangekv_common::{Error, Lease, RangeDescriptor, RangeId, Result, StoreId, Timestamp};

/// A store's local copy of one range
#[derive(Clone, Debug)]
pub struct Replica {
    range_id: RangeId,
    store_id: StoreId,
    descriptor: RangeDescriptor,
    lease: Option<Lease>,
    orphaned_since: Option<Timestamp>,
}

impl Replica {
    /// Create a replica from its initial descriptor.
    ///
    /// If the owning store is not among the descriptor's members the
    /// replica starts out orphaned as of `now`.
    pub fn new(store_id: StoreId, descriptor: RangeDescriptor, now: Timestamp) -> Result<Self> {
        descriptor.validate()?;
        let orphaned_since = (!descriptor.contains(store_id)).then_some(now);
        Ok(Self {
            range_id: descriptor.range_id,
            store_id,
            descriptor,
            lease: None,
            orphaned_since,
        })
    }

    /// The range this replica materializes
    #[must_use]
    pub fn range_id(&self) -> RangeId {
        self.range_id
    }

    /// The store owning this replica
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// Current membership descriptor snapshot
    #[must_use]
    pub fn descriptor(&self) -> &RangeDescriptor {
        &self.descriptor
    }

    /// Current leader lease snapshot, if any has been delivered
    #[must_use]
    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    /// When the owning store dropped out of the membership, if it has
    #[must_use]
    pub fn orphaned_since(&self) -> Option<Timestamp> {
        self.orphaned_since
    }

    /// Whether the owning store is absent from the current membership
    #[must_use]
    pub fn is_orphaned(&self) -> bool {
        self.orphaned_since.is_some()
    }

    /// Whether this replica itself holds an unexpired lease at `now`.
    ///
    /// A lease held by some other store's replica does not block removal;
    /// only a replica that still believes it has write authority must be
    /// kept.
    #[must_use]
    pub fn holds_live_lease(&self, now: Timestamp) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|lease| lease.holder == self.store_id && lease.covers(now))
    }

    /// Replace the descriptor snapshot with a strictly newer one.
    ///
    /// Marks the replica orphaned as of `now` when the owning store drops
    /// out of the member set; the timestamp of an existing orphan mark is
    /// never refreshed. Re-adding the store clears the mark.
    pub fn apply_descriptor(&mut self, descriptor: RangeDescriptor, now: Timestamp) -> Result<()> {
        if descriptor.range_id != self.range_id {
            return Err(Error::RangeMismatch {
                expected: self.range_id,
                actual: descriptor.range_id,
            });
        }
        descriptor.validate()?;
        if descriptor.generation <= self.descriptor.generation {
            return Err(Error::StaleDescriptor {
                range_id: self.range_id,
                current: self.descriptor.generation,
                proposed: descriptor.generation,
            });
        }

        if descriptor.contains(self.store_id) {
            self.orphaned_since = None;
        } else if self.orphaned_since.is_none() {
            self.orphaned_since = Some(now);
        }
        self.descriptor = descriptor;
        Ok(())
    }

    /// Replace the lease snapshot.
    ///
    /// Lease renewal alone never clears orphan status; only membership
    /// changes do.
    pub fn apply_lease(&mut self, lease: Lease) -> Result<()> {
        lease.validate()?;
        self.lease = Some(lease);
        Ok(())
    }

    /// Empty the descriptor member list, bypassing delivery validation.
    #[cfg(test)]
    pub(crate) fn clear_members_for_test(&mut self) {
        self.descriptor.replicas.clear();
    }
}
