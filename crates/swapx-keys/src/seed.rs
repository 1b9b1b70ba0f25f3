use swapx_core::SwapxError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The single high-entropy master seed all escrow keys derive from.
///
/// Held zeroized-on-drop; the seed itself never leaves this crate. Everything
/// downstream sees only derived per-index key material, and that only for the
/// duration of a signing call.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSeed([u8; 32]);

impl MasterSeed {
    pub fn from_hex(s: &str) -> Result<Self, SwapxError> {
        let bytes = hex::decode(s).map_err(|e| SwapxError::InvalidSeed(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(SwapxError::InvalidSeed(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub(crate) fn bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterSeed(…)")
    }
}
