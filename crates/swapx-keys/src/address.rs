//! Address construction and shape checks for both chain families.

use k256::ecdsa::VerifyingKey;
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use swapx_core::SwapxError;

/// keccak256 helper.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Double SHA-256, the UTXO-family checksum and txid hash.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(first));
    out
}

/// EVM address: last 20 bytes of keccak256 over the uncompressed public key
/// (without the 0x04 SEC1 prefix), hex-encoded with a `0x` prefix.
pub fn evm_address(vk: &VerifyingKey) -> String {
    let point = vk.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// UTXO pay-to-pubkey-hash address: base58check over
/// `version ‖ sha256d(compressed pubkey)[..20]`.
pub fn utxo_address(vk: &VerifyingKey, version: u8) -> String {
    let compressed = vk.to_encoded_point(true);
    let hash = sha256d(compressed.as_bytes());
    base58check(version, &hash[..20])
}

/// The 20-byte public key hash an address commits to.
pub fn utxo_pubkey_hash(vk: &VerifyingKey) -> [u8; 20] {
    let compressed = vk.to_encoded_point(true);
    let hash = sha256d(compressed.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[..20]);
    out
}

fn base58check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = sha256d(&data);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decode a base58check address, verifying version byte and checksum.
/// Returns the 20-byte payload.
pub fn decode_utxo_address(addr: &str, version: u8) -> Result<[u8; 20], SwapxError> {
    let data = bs58::decode(addr)
        .into_vec()
        .map_err(|e| SwapxError::Other(format!("address {addr}: {e}")))?;
    if data.len() != 25 {
        return Err(SwapxError::Other(format!("address {addr}: bad length")));
    }
    if data[0] != version {
        return Err(SwapxError::Other(format!(
            "address {addr}: version {} != {version}",
            data[0]
        )));
    }
    let checksum = sha256d(&data[..21]);
    if checksum[..4] != data[21..] {
        return Err(SwapxError::Other(format!("address {addr}: bad checksum")));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&data[1..21]);
    Ok(out)
}

/// Cheap shape check used by the queue-item sanity pass.
pub fn check_utxo_address(addr: &str, version: u8) -> Result<(), SwapxError> {
    decode_utxo_address(addr, version).map(|_| ())
}

/// Is `addr` a plausible 20-byte hex EVM address?
pub fn is_evm_shaped(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::EscrowKey;
    use crate::seed::MasterSeed;
    use swapx_core::ChainFamily;

    #[test]
    fn evm_shape_check() {
        assert!(is_evm_shaped("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_evm_shaped("0x123"));
        assert!(!is_evm_shaped("52908400098527886E0F7030069857D2E4169EE7ab"));
        assert!(!is_evm_shaped("0xzz08400098527886E0F7030069857D2E4169EE7a"));
    }

    #[test]
    fn utxo_address_round_trips() {
        let seed = MasterSeed::from_bytes([9u8; 32]);
        let key = EscrowKey::derive(&seed, ChainFamily::Utxo, 0).unwrap();
        let addr = key.address(30);
        let payload = decode_utxo_address(&addr, 30).unwrap();
        assert_eq!(payload, utxo_pubkey_hash(key.signing_key().verifying_key()));
    }

    #[test]
    fn utxo_address_rejects_wrong_version() {
        let seed = MasterSeed::from_bytes([9u8; 32]);
        let key = EscrowKey::derive(&seed, ChainFamily::Utxo, 0).unwrap();
        let addr = key.address(30);
        assert!(decode_utxo_address(&addr, 0).is_err());
    }

    #[test]
    fn utxo_address_rejects_corruption() {
        let seed = MasterSeed::from_bytes([9u8; 32]);
        let key = EscrowKey::derive(&seed, ChainFamily::Utxo, 0).unwrap();
        let mut addr = key.address(30);
        // Flip one character to break the checksum.
        let flipped = if addr.ends_with('2') { '3' } else { '2' };
        addr.pop();
        addr.push(flipped);
        assert!(decode_utxo_address(&addr, 30).is_err());
    }
}
