use k256::ecdsa::SigningKey;
use swapx_core::SwapxError;
use zeroize::Zeroizing;

use crate::address::{evm_address, keccak256};

/// The operator signing key authorizing broker-contract settlements.
///
/// Only 65-byte `(r, s, v)` signatures leave the process; the scalar itself
/// never does.
pub struct OperatorKey {
    signing_key: SigningKey,
}

impl OperatorKey {
    pub fn from_hex(s: &str) -> Result<Self, SwapxError> {
        let bytes = Zeroizing::new(
            hex::decode(s).map_err(|e| SwapxError::Signing(e.to_string()))?,
        );
        if bytes.len() != 32 {
            return Err(SwapxError::Signing("operator key must be 32 bytes".into()));
        }
        let mut arr = Zeroizing::new([0u8; 32]);
        arr.copy_from_slice(&bytes);
        let signing_key = SigningKey::from_bytes((&*arr).into())
            .map_err(|e| SwapxError::Signing(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// The operator's EVM address (recoverable from any signature it emits).
    pub fn address(&self) -> String {
        evm_address(self.signing_key.verifying_key())
    }

    /// Sign `message` under the EIP-191 personal-message prefix. Returns
    /// 65 bytes `r ‖ s ‖ v` with `v ∈ {27, 28}`, the layout the broker
    /// contract verifies on-chain.
    pub fn sign_personal(&self, message: &[u8]) -> Result<[u8; 65], SwapxError> {
        let digest = personal_message_hash(message);
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SwapxError::Signing(e.to_string()))?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = 27 + recid.to_byte();
        Ok(out)
    }
}

/// keccak256("\x19Ethereum Signed Message:\n" ‖ len ‖ message).
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut preimage = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    preimage.extend_from_slice(message);
    keccak256(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    #[test]
    fn rejects_short_key() {
        assert!(OperatorKey::from_hex("abcd").is_err());
    }

    #[test]
    fn signature_recovers_to_operator_address() {
        let key = OperatorKey::from_hex(&"22".repeat(32)).unwrap();
        let message = b"swapx broker authorization";
        let sig = key.sign_personal(message).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);

        let digest = personal_message_hash(message);
        let signature = Signature::from_slice(&sig[..64]).unwrap();
        let recid = RecoveryId::try_from(sig[64] - 27).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&digest, &signature, recid).unwrap();
        assert_eq!(crate::address::evm_address(&recovered), key.address());
    }

    #[test]
    fn personal_hash_depends_on_length_and_content() {
        assert_ne!(personal_message_hash(b"a"), personal_message_hash(b"b"));
        assert_ne!(personal_message_hash(b"ab"), personal_message_hash(b"a"));
    }
}
