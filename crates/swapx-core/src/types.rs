use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Unix timestamp (milliseconds, UTC). Used for the per-deal event log.
pub type TimestampMs = i64;

/// Current wall clock in seconds.
pub fn now_secs() -> Timestamp {
    chrono::Utc::now().timestamp()
}

/// Current wall clock in milliseconds.
pub fn now_millis() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

// ── DealId ───────────────────────────────────────────────────────────────────

/// Opaque 128-bit deal identifier, hex-encoded in every external surface.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DealId(pub [u8; 16]);

impl DealId {
    pub fn random() -> Self {
        let mut b = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut b);
        Self(b)
    }

    pub fn from_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DealId({}…)", &self.to_hex()[..8])
    }
}

// ── ChainId ──────────────────────────────────────────────────────────────────

/// Configured chain identifier, e.g. "ETH", "SEPOLIA", "DGB".
///
/// Chain ids are operator-chosen tags; everything that needs chain-specific
/// behaviour resolves the tag against the plugin registry at runtime.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self.0)
    }
}

// ── ChainFamily ──────────────────────────────────────────────────────────────

/// Derivation/address family of a chain. EVM and UTXO chains derive escrow
/// keys over different paths and carry differently-shaped addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    Evm,
    Utxo,
}

impl ChainFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Utxo => "utxo",
        }
    }
}

// ── Party ────────────────────────────────────────────────────────────────────

/// The two sides of a deal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    Alice,
    Bob,
}

impl Party {
    pub fn other(&self) -> Party {
        match self {
            Party::Alice => Party::Bob,
            Party::Bob => Party::Alice,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Alice => "alice",
            Party::Bob => "bob",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── TxId ─────────────────────────────────────────────────────────────────────

/// Chain transaction id as the chain reports it (hex for both families).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = if self.0.len() > 18 { &self.0[..18] } else { &self.0 };
        write!(f, "TxId({short}…)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deal_id_hex_round_trip() {
        let id = DealId::random();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(DealId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn deal_id_rejects_wrong_length() {
        assert!(DealId::from_hex("abcd").is_err());
    }

    #[test]
    fn party_other_flips() {
        assert_eq!(Party::Alice.other(), Party::Bob);
        assert_eq!(Party::Bob.other(), Party::Alice);
    }
}
