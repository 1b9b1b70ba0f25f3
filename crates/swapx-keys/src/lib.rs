//! swapx-keys — deterministic escrow key derivation.
//!
//! One master seed yields the whole escrow key tree: BLAKE3 subkey
//! derivation over (family, index) produces secp256k1 scalars, from which
//! EVM and UTXO addresses are built. Derivation is pure and offline; any
//! process holding the seed reproduces every address. Private key material
//! is materialized per signing call and zeroized on drop.

pub mod address;
pub mod escrow;
pub mod operator;
pub mod seed;

pub use address::{
    check_utxo_address, decode_utxo_address, evm_address, is_evm_shaped, keccak256, sha256d,
    utxo_address, utxo_pubkey_hash,
};
pub use escrow::EscrowKey;
pub use operator::{personal_message_hash, OperatorKey};
pub use seed::MasterSeed;
