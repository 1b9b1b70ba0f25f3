//! swapx-core — shared types for the OTC swap broker.
//!
//! Everything the engine, store, chain plugins, and RPC surface agree on
//! lives here: identifiers, the deal and queue data model, the asset
//! grammar, exact amount conversion, configuration, and the error taxonomy.

pub mod amount;
pub mod asset;
pub mod config;
pub mod constants;
pub mod deal;
pub mod error;
pub mod event;
pub mod queue;
pub mod types;

pub use asset::{Asset, CommissionPolicy};
pub use config::{BrokerConfig, ChainConfig};
pub use constants::*;
pub use deal::{Deal, EscrowRef, Side, Stage};
pub use error::SwapxError;
pub use event::{Event, RecoveryLogEntry, RecoveryType};
pub use queue::{Phase, Purpose, QueueItem, QueueItemId, QueueStatus, SubmittedTx};
pub use types::{now_millis, now_secs, ChainFamily, ChainId, DealId, Party, Timestamp, TimestampMs, TxId};

/// Re-exported so downstream crates agree on one 256-bit integer type.
pub use alloy_primitives::U256;
