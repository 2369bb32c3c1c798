//! Core type definitions for RangeKV
//!
//! This module defines range and store identifiers, the versioned range
//! membership descriptor, and the leader lease record.

use crate::clock::Timestamp;
use crate::error::{Error, Result};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a range (a contiguous keyspace partition)
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[display("r{_0}")]
pub struct RangeId(u64);

impl RangeId {
    /// Create a new range ID
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying numeric ID
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeId({})", self.0)
    }
}

/// Unique identifier for a store (one node-local replica container)
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[display("s{_0}")]
pub struct StoreId(u64);

impl StoreId {
    /// Create a new store ID
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying numeric ID
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

/// Authoritative, versioned membership list for a range.
///
/// Descriptors are replaced wholesale on every membership change; the
/// generation strictly increases with each replacement and is the basis for
/// rejecting stale deliveries and for re-validating removal decisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    /// The range this descriptor describes
    pub range_id: RangeId,
    /// Version counter, strictly increasing across membership changes
    pub generation: u64,
    /// Stores currently holding a replica of the range, in replication order
    pub replicas: Vec<StoreId>,
}

impl RangeDescriptor {
    /// Create a new descriptor, validating the member list
    pub fn new(range_id: RangeId, generation: u64, replicas: Vec<StoreId>) -> Result<Self> {
        let desc = Self {
            range_id,
            generation,
            replicas,
        };
        desc.validate()?;
        Ok(desc)
    }

    /// Validate the member list: non-empty, no duplicate stores
    pub fn validate(&self) -> Result<()> {
        if self.replicas.is_empty() {
            return Err(Error::EmptyDescriptor(self.range_id));
        }
        for (i, store_id) in self.replicas.iter().enumerate() {
            if self.replicas[..i].contains(store_id) {
                return Err(Error::DuplicateMember {
                    range_id: self.range_id,
                    store_id: *store_id,
                });
            }
        }
        Ok(())
    }

    /// Check whether a store is a member of this descriptor
    #[must_use]
    pub fn contains(&self, store_id: StoreId) -> bool {
        self.replicas.contains(&store_id)
    }
}

/// Time-bounded exclusive write authority for a range.
///
/// A lease is expired once the clock has moved strictly past its
/// expiration; there is at most one unexpired lease per range at a time,
/// maintained by the consensus layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Store whose replica holds write authority
    pub holder: StoreId,
    /// When the lease was acquired
    pub start: Timestamp,
    /// When the lease expires
    pub expiration: Timestamp,
}

impl Lease {
    /// Create a new lease, validating that it expires after it starts
    pub fn new(holder: StoreId, start: Timestamp, expiration: Timestamp) -> Result<Self> {
        let lease = Self {
            holder,
            start,
            expiration,
        };
        lease.validate()?;
        Ok(lease)
    }

    /// Validate the lease interval
    pub fn validate(&self) -> Result<()> {
        if self.expiration <= self.start {
            return Err(Error::InvalidLease {
                start: self.start,
                expiration: self.expiration,
            });
        }
        Ok(())
    }

    /// Check whether the lease is expired at the given instant
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expiration
    }

    /// Check whether the lease still confers authority at the given instant
    #[must_use]
    pub fn covers(&self, now: Timestamp) -> bool {
        !self.is_expired_at(now)
    }
}
