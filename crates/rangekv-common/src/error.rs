//! Error types for RangeKV
//!
//! This module defines the common error types used throughout the system.

use crate::clock::Timestamp;
use crate::types::{RangeId, StoreId};
use thiserror::Error;

/// Common result type for RangeKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for RangeKV
#[derive(Debug, Error)]
pub enum Error {
    // Store errors
    #[error("range not found: {0}")]
    RangeNotFound(RangeId),

    #[error("replica owned by store {actual} installed into store {expected}")]
    StoreMismatch { expected: StoreId, actual: StoreId },

    #[error("update for range {actual} delivered to replica of range {expected}")]
    RangeMismatch { expected: RangeId, actual: RangeId },

    // Descriptor errors
    #[error("stale descriptor for range {range_id}: generation {proposed} not newer than {current}")]
    StaleDescriptor {
        range_id: RangeId,
        current: u64,
        proposed: u64,
    },

    #[error("descriptor for range {0} has no members")]
    EmptyDescriptor(RangeId),

    #[error("descriptor for range {range_id} lists store {store_id} more than once")]
    DuplicateMember {
        range_id: RangeId,
        store_id: StoreId,
    },

    // Lease errors
    #[error("invalid lease: expiration {expiration} not after start {start}")]
    InvalidLease {
        start: Timestamp,
        expiration: Timestamp,
    },

    // Clock errors
    #[error("manual clock cannot move backwards: at {current}, requested {requested}")]
    ClockRegression {
        current: Timestamp,
        requested: Timestamp,
    },

    #[error("manual clock advance must be a positive duration")]
    ZeroClockAdvance,
}

impl Error {
    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RangeNotFound(_))
    }

    /// Check if this error marks a replica whose local state is unusable
    /// for a garbage-collection decision
    #[must_use]
    pub fn is_malformed_state(&self) -> bool {
        matches!(
            self,
            Self::EmptyDescriptor(_) | Self::DuplicateMember { .. } | Self::InvalidLease { .. }
        )
    }
}
