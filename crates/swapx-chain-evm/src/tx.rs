//! Legacy (EIP-155) transaction construction and signing.
//!
//! Escrow-originated transfers are simple enough that the legacy format
//! covers every chain the broker settles on; fee urgency is expressed
//! through the gas price.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::RlpEncodable;
use k256::ecdsa::SigningKey;

use swapx_core::SwapxError;
use swapx_keys::keccak256;

/// An unsigned escrow/tank transfer.
#[derive(Clone, Debug)]
pub struct LegacyTransfer {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// EIP-155 signing payload: the six tx fields followed by
/// (chain_id, 0, 0). Zero integers RLP-encode as empty strings, which is
/// exactly what EIP-155 calls for.
#[derive(RlpEncodable)]
struct SigningPayload {
    nonce: u64,
    gas_price: U256,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    chain_id: u64,
    zero_r: u8,
    zero_s: u8,
}

#[derive(RlpEncodable)]
struct SignedPayload {
    nonce: u64,
    gas_price: U256,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    v: u64,
    r: U256,
    s: U256,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
pub struct SignedTransfer {
    pub raw: Vec<u8>,
    pub hash: B256,
}

impl LegacyTransfer {
    /// keccak256 of the EIP-155 signing payload.
    pub fn sighash(&self, chain_id: u64) -> B256 {
        let payload = SigningPayload {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            chain_id,
            zero_r: 0,
            zero_s: 0,
        };
        B256::from(keccak256(&alloy_rlp::encode(&payload)))
    }

    /// Sign with `key` under `chain_id` replay protection and produce the
    /// raw bytes plus the transaction hash.
    pub fn sign(&self, key: &SigningKey, chain_id: u64) -> Result<SignedTransfer, SwapxError> {
        let sighash = self.sighash(chain_id);
        let (sig, recid) = key
            .sign_prehash_recoverable(sighash.as_slice())
            .map_err(|e| SwapxError::Signing(e.to_string()))?;
        let sig_bytes = sig.to_bytes();

        let signed = SignedPayload {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            v: recid.to_byte() as u64 + 35 + 2 * chain_id,
            r: U256::from_be_slice(&sig_bytes[..32]),
            s: U256::from_be_slice(&sig_bytes[32..]),
        };
        let raw = alloy_rlp::encode(&signed);
        let hash = B256::from(keccak256(&raw));
        Ok(SignedTransfer { raw, hash })
    }
}
