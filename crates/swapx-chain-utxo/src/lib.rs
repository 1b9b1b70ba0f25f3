//! swapx-chain-utxo — the UTXO chain adapter.
//!
//! Address-indexed node RPC, raw pay-to-pubkey-hash transactions signed with
//! derived escrow keys, and integer-only value and fee arithmetic. Output
//! values survive the full u64 range bit-for-bit.

pub mod plugin;
pub mod rpc;
pub mod tx;

pub use plugin::UtxoPlugin;
