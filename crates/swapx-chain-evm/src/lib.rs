//! swapx-chain-evm — the EVM chain adapter.
//!
//! JSON-RPC over plain HTTP, legacy EIP-155 transactions signed with derived
//! escrow keys, ERC-20 calls through `alloy-sol-types`, and the broker
//! helper contract for atomic settlement. Receipt `Transfer` events feed the
//! settlement classification in `swapx-chain`.

pub mod contracts;
pub mod plugin;
pub mod rpc;
pub mod tx;

pub use plugin::EvmPlugin;
