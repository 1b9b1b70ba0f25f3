use k256::ecdsa::SigningKey;
use swapx_core::{ChainFamily, SwapxError};
use zeroize::Zeroizing;

use crate::address;
use crate::seed::MasterSeed;

/// Domain-separation contexts for BLAKE3 subkey derivation. EVM and UTXO
/// escrows derive over different paths; the same (seed, family, index)
/// yields the same key on every host, forever. Tank hot wallets live on a
/// third path so they can never collide with an escrow index.
fn derivation_context(family: ChainFamily, tank: bool) -> &'static str {
    match (family, tank) {
        (ChainFamily::Evm, false) => "swapx escrow evm v1",
        (ChainFamily::Utxo, false) => "swapx escrow utxo v1",
        (ChainFamily::Evm, true) => "swapx tank evm v1",
        (ChainFamily::Utxo, true) => "swapx tank utxo v1",
    }
}

/// A derived escrow key, materialized only for the duration of one signing
/// or address-derivation call. Dropping it wipes the scalar.
pub struct EscrowKey {
    signing_key: SigningKey,
    family: ChainFamily,
}

impl EscrowKey {
    /// Derive the escrow key at `index`. Pure and offline: no RNG, no I/O.
    ///
    /// The BLAKE3 subkey is used as a secp256k1 scalar; on the (cosmically
    /// rare) out-of-range subkey the derivation re-rolls with a bumped
    /// counter so every index maps to a valid key.
    pub fn derive(seed: &MasterSeed, family: ChainFamily, index: u64) -> Result<Self, SwapxError> {
        Self::derive_in(seed, family, index, false)
    }

    /// Derive the per-chain tank hot-wallet key. Keyed by the chain tag so
    /// two chains of the same family get distinct tanks.
    pub fn derive_tank(
        seed: &MasterSeed,
        family: ChainFamily,
        chain_tag: &str,
    ) -> Result<Self, SwapxError> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(chain_tag.as_bytes());
        let tag = u64::from_be_bytes(hasher.finalize().as_bytes()[..8].try_into().expect("8 bytes"));
        Self::derive_in(seed, family, tag, true)
    }

    fn derive_in(
        seed: &MasterSeed,
        family: ChainFamily,
        index: u64,
        tank: bool,
    ) -> Result<Self, SwapxError> {
        let context = derivation_context(family, tank);
        for attempt in 0u8..=255 {
            let mut ikm = Zeroizing::new([0u8; 41]);
            ikm[..32].copy_from_slice(seed.bytes());
            ikm[32..40].copy_from_slice(&index.to_be_bytes());
            ikm[40] = attempt;
            let subkey = Zeroizing::new(blake3::derive_key(context, &*ikm));
            if let Ok(signing_key) = SigningKey::from_bytes((&*subkey).into()) {
                return Ok(Self { signing_key, family });
            }
        }
        Err(SwapxError::Derivation(format!(
            "no valid scalar for {family:?} index {index}"
        )))
    }

    pub fn family(&self) -> ChainFamily {
        self.family
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The escrow's address in the shape its chain family expects.
    pub fn address(&self, utxo_version: u8) -> String {
        match self.family {
            ChainFamily::Evm => address::evm_address(self.signing_key.verifying_key()),
            ChainFamily::Utxo => {
                address::utxo_address(self.signing_key.verifying_key(), utxo_version)
            }
        }
    }

    /// Compressed SEC1 public key bytes (33 bytes).
    pub fn public_key_compressed(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> MasterSeed {
        MasterSeed::from_bytes([7u8; 32])
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = EscrowKey::derive(&seed(), ChainFamily::Evm, 42).unwrap();
        let b = EscrowKey::derive(&seed(), ChainFamily::Evm, 42).unwrap();
        assert_eq!(a.address(0), b.address(0));
        assert_eq!(a.public_key_compressed(), b.public_key_compressed());
    }

    #[test]
    fn indices_yield_distinct_keys() {
        let a = EscrowKey::derive(&seed(), ChainFamily::Evm, 0).unwrap();
        let b = EscrowKey::derive(&seed(), ChainFamily::Evm, 1).unwrap();
        assert_ne!(a.address(0), b.address(0));
    }

    #[test]
    fn families_derive_over_different_paths() {
        let evm = EscrowKey::derive(&seed(), ChainFamily::Evm, 5).unwrap();
        let utxo = EscrowKey::derive(&seed(), ChainFamily::Utxo, 5).unwrap();
        assert_ne!(evm.public_key_compressed(), utxo.public_key_compressed());
    }

    #[test]
    fn tank_keys_are_not_escrow_keys() {
        let tank = EscrowKey::derive_tank(&seed(), ChainFamily::Evm, "SEPOLIA").unwrap();
        let tank2 = EscrowKey::derive_tank(&seed(), ChainFamily::Evm, "SEPOLIA").unwrap();
        let other = EscrowKey::derive_tank(&seed(), ChainFamily::Evm, "POLYGON").unwrap();
        assert_eq!(tank.address(0), tank2.address(0));
        assert_ne!(tank.address(0), other.address(0));
        for i in 0..16 {
            let escrow = EscrowKey::derive(&seed(), ChainFamily::Evm, i).unwrap();
            assert_ne!(tank.address(0), escrow.address(0));
        }
    }

    #[test]
    fn evm_address_shape() {
        let k = EscrowKey::derive(&seed(), ChainFamily::Evm, 3).unwrap();
        let addr = k.address(0);
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }

    #[test]
    fn utxo_address_shape() {
        let k = EscrowKey::derive(&seed(), ChainFamily::Utxo, 3).unwrap();
        let addr = k.address(30);
        assert!(!addr.starts_with("0x"));
        assert!(crate::address::check_utxo_address(&addr, 30).is_ok());
    }
}
