//! RangeKV Common - Shared types and utilities
//!
//! This crate provides the identifier types, range membership and lease
//! records, clock abstraction, error definitions, and configuration used
//! across all RangeKV components.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use config::{GcConfig, StoreConfig};
pub use error::{Error, Result};
pub use types::{Lease, RangeDescriptor, RangeId, StoreId};
