//! Configuration types for RangeKV
//!
//! This module defines configuration structures supplied at store
//! construction. Durations are plain values; no ambient global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Garbage-collection timing configuration.
///
/// The grace period before an orphaned replica may be reclaimed is the sum
/// of `lease_duration` and `unleased_grace`: long enough for any in-flight
/// lease to provably expire, plus a buffer against clock skew and delayed
/// descriptor propagation on other nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    /// How long a leader lease is valid once acquired
    pub lease_duration: Duration,
    /// Additional wait after lease expiry before reclamation
    pub unleased_grace: Duration,
    /// Interval between periodic scan passes
    pub scan_interval: Duration,
}

impl GcConfig {
    /// Minimum delay between a replica becoming orphaned and its removal
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.lease_duration + self.unleased_grace
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(1),
            unleased_grace: Duration::from_secs(60),
            scan_interval: Duration::from_secs(10),
        }
    }
}

/// Per-store configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Garbage-collection timing
    pub gc: GcConfig,
}
