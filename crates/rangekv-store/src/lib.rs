//! RangeKV Store - node-local replica container and range GC
//!
//! This crate implements the replica-lifecycle reclamation mechanism of a
//! replicated key-value store: detecting that a locally held replica is no
//! longer a member of its range's replication group and removing it from
//! the store after a bounded grace period.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Consensus layer │  (external: descriptor/lease deliveries)
//! └────────┬─────────┘
//!          │ deliver_descriptor_update / deliver_lease_update
//! ┌────────▼─────────┐
//! │      Store       │  replicas: RwLock<HashMap<RangeId, Replica>>
//! │                  │  get / upsert / remove / force_scan
//! └────────┬─────────┘
//!          │ snapshot-per-pass, re-validated removal
//! ┌────────▼─────────┐
//! │     GcQueue      │  periodic + on-demand scan passes
//! └──────────────────┘
//! ```
//!
//! A replica whose store drops out of its range descriptor is reclaimed
//! only after the lease duration plus a configured unleased grace have
//! elapsed, so no other node can still regard the local copy as
//! authoritative when its storage goes away.

pub mod gc;
pub mod replica;
pub mod store;

pub use gc::{GcHandle, GcQueue, ScanReport};
pub use replica::Replica;
pub use store::Store;
