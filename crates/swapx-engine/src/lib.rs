//! swapx-engine — the deal state machine and its periodic driver.
//!
//! The engine tick enumerates open deals, serializes work per deal through
//! store leases, observes deposits and confirmations, plans settlement as
//! durable queue items, and submits them in strict (phase, seq) order per
//! chain. Everything authoritative lives in the store; a tick rebuilds its
//! world from there each time.

pub mod engine;
pub mod oracle;
pub(crate) mod observer;
pub(crate) mod planner;
pub mod service;
pub(crate) mod stages;
pub(crate) mod submitter;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::Engine;
pub use oracle::{FixedRateOracle, NativeUsdOracle};
pub use service::{CreateDealParams, CreatedDeal, DealService, SideParams};
