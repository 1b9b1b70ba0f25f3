//! swapx-chain — the chain-abstraction seam.
//!
//! One trait ([`ChainPlugin`]) covers everything the engine and recovery
//! manager ask of a chain: derivation, inspection, transfers, broker calls,
//! confirmation polling. Capabilities missing on a family are surfaced
//! through probes rather than stub behaviour, so a deal planned for broker
//! settlement can never silently downgrade to direct transfers.

pub mod broker;
pub mod plugin;
pub mod registry;
pub mod types;

pub use broker::broker_call_preimage;
pub use plugin::ChainPlugin;
pub use registry::ChainRegistry;
pub use types::{
    classify_transfers, BrokerRequest, ClassifiedTransfer, FeeStrategy, Submission,
    TransferKind, TransferRecord, Utxo,
};
