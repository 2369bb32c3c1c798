//! Clock abstraction for RangeKV
//!
//! All lease-expiry and grace-period arithmetic reads time through the
//! [`Clock`] trait so that tests can substitute a manually advanced source
//! and fast-forward through arbitrarily long real-world delays.

use crate::error::{Error, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A point in time, in nanoseconds since the clock's origin
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
)]
#[display("{_0}ns")]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock origin
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from nanoseconds since the origin
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get nanoseconds since the origin
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Duration elapsed since an earlier timestamp, zero if `earlier` is later
    #[must_use]
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration_nanos(rhs)))
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// A monotonic time source
pub trait Clock: Send + Sync {
    /// Current timestamp; never decreases across calls
    fn now(&self) -> Timestamp;
}

/// Real monotonic clock, anchored at construction
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is the moment of construction
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp(duration_nanos(self.origin.elapsed()))
    }
}

/// Test-controlled clock supporting explicit forward jumps.
///
/// The clock only moves when told to; [`ManualClock::advance`] and
/// [`ManualClock::set`] reject anything that would move it backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at the origin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock starting at the given timestamp
    #[must_use]
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos()),
        }
    }

    /// Move the clock strictly forward by `delta`, visible to all readers
    /// atomically. Returns the new timestamp.
    pub fn advance(&self, delta: Duration) -> Result<Timestamp> {
        if delta.is_zero() {
            return Err(Error::ZeroClockAdvance);
        }
        let previous = self
            .nanos
            .fetch_add(duration_nanos(delta), Ordering::SeqCst);
        Ok(Timestamp(previous.saturating_add(duration_nanos(delta))))
    }

    /// Set the clock to an absolute timestamp, rejecting regression
    pub fn set(&self, target: Timestamp) -> Result<()> {
        self.nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (target.as_nanos() >= current).then_some(target.as_nanos())
            })
            .map(|_| ())
            .map_err(|current| Error::ClockRegression {
                current: Timestamp(current),
                requested: target,
            })
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.nanos.load(Ordering::SeqCst))
    }
}
