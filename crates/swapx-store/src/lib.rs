//! swapx-store — durable broker state over sled.
//!
//! The store is the single source of truth: deals, queue items, events,
//! recovery audit rows, leases, and the escrow index counters all live here.
//! Multi-row updates that could interleave run inside sled transactions;
//! nothing caches authoritative state across ticks.

pub mod db;
pub mod lease;

pub use db::BrokerDb;
pub use lease::{deal_lease_name, Lease, ENGINE_TICK_LEASE, RECOVERY_TICK_LEASE};
