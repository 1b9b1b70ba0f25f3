use serde::{Deserialize, Serialize};

use crate::constants::{
    COMMISSION_BPS, ENGINE_TICK_SECS, ENGINE_WORKERS, LEASE_TTL_SECS,
    MAX_RECOVERY_ATTEMPTS, MAX_RECOVERY_ATTEMPTS_BOUND, MIN_RECOVERY_ATTEMPTS_BOUND,
    RECOVERY_TICK_SECS, RPC_TIMEOUT_SECS, STUCK_PENDING_SECS, STUCK_SUBMITTED_SECS,
    UNKNOWN_TOKEN_COMMISSION_USD_CENTS,
};
use crate::error::SwapxError;
use crate::types::{ChainFamily, ChainId};

// ── Per-chain configuration ──────────────────────────────────────────────────

/// One configured chain. Amount-like fields are exact decimal strings in the
/// chain's native coin; they are parsed against `native_decimals` at plugin
/// init.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub family: ChainFamily,
    pub rpc_url: String,
    /// Numeric EIP-155 chain reference. Required for EVM chains (replay
    /// protection in transaction signatures); ignored for UTXO chains.
    #[serde(default)]
    pub evm_chain_ref: Option<u64>,
    /// Base58check version byte for UTXO addresses. Ignored for EVM chains.
    #[serde(default)]
    pub utxo_address_version: Option<u8>,
    /// Confirmations required before a settlement item is `Confirmed`.
    pub confirmations: u32,
    /// Confirmations required on deposits before `Collection → Swap`.
    pub collect_confirmations: u32,
    /// Operator (fee recipient) address on this chain.
    pub operator_address: String,
    /// Optional on-chain broker helper (EVM only). Absent ⇒ direct transfers.
    #[serde(default)]
    pub broker_address: Option<String>,
    /// Optional block-explorer API key for enriched lookups.
    #[serde(default)]
    pub explorer_api_key: Option<String>,
    /// Native amount the tank sends per `GAS_FUNDING` item (decimal string).
    pub gas_funding_amount: String,
    /// Tank balance below this writes a LOW_TANK_BALANCE recovery row.
    pub low_tank_threshold: String,
    /// Base-unit precision of the native coin (e.g. ETH=18, UTXO chains=8).
    pub native_decimals: u8,
    /// Fallback native/USD rate in cents, consumed by the fixed-rate oracle.
    pub native_usd_rate_cents: u64,
}

// ── Process-wide configuration ───────────────────────────────────────────────

fn default_engine_tick() -> u64 { ENGINE_TICK_SECS }
fn default_recovery_tick() -> u64 { RECOVERY_TICK_SECS }
fn default_lease_ttl() -> i64 { LEASE_TTL_SECS }
fn default_stuck_pending() -> i64 { STUCK_PENDING_SECS }
fn default_stuck_submitted() -> i64 { STUCK_SUBMITTED_SECS }
fn default_max_attempts() -> u32 { MAX_RECOVERY_ATTEMPTS }
fn default_commission_bps() -> u32 { COMMISSION_BPS }
fn default_unknown_commission() -> u64 { UNKNOWN_TOKEN_COMMISSION_USD_CENTS }
fn default_workers() -> usize { ENGINE_WORKERS }
fn default_rpc_timeout() -> u64 { RPC_TIMEOUT_SECS }
fn default_rpc_listen() -> String { "127.0.0.1:8660".to_string() }

/// Full broker configuration, loaded from a JSON file at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Hex-encoded 32-byte master seed for escrow derivation.
    pub master_seed: String,
    /// Hex-encoded 32-byte operator signing key (broker-call authorization).
    pub operator_signing_key: String,

    pub chains: Vec<ChainConfig>,

    #[serde(default = "default_engine_tick")]
    pub engine_tick_secs: u64,
    #[serde(default = "default_recovery_tick")]
    pub recovery_tick_secs: u64,
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: i64,
    #[serde(default = "default_stuck_pending")]
    pub stuck_pending_secs: i64,
    #[serde(default = "default_stuck_submitted")]
    pub stuck_submitted_secs: i64,
    #[serde(default = "default_max_attempts")]
    pub max_recovery_attempts: u32,
    #[serde(default = "default_commission_bps")]
    pub commission_bps: u32,
    #[serde(default = "default_unknown_commission")]
    pub unknown_token_commission_usd_cents: u64,
    #[serde(default = "default_workers")]
    pub engine_workers: usize,
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_rpc_listen")]
    pub rpc_listen_addr: String,
}

impl BrokerConfig {
    /// Parse and validate a config document. Clamps the attempt ceiling into
    /// its supported bounds and rejects structurally unusable configs.
    pub fn from_json(doc: &str) -> Result<Self, SwapxError> {
        let mut cfg: BrokerConfig =
            serde_json::from_str(doc).map_err(|e| SwapxError::Config(e.to_string()))?;
        cfg.validate()?;
        cfg.max_recovery_attempts = cfg
            .max_recovery_attempts
            .clamp(MIN_RECOVERY_ATTEMPTS_BOUND, MAX_RECOVERY_ATTEMPTS_BOUND);
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), SwapxError> {
        if self.chains.is_empty() {
            return Err(SwapxError::Config("no chains configured".into()));
        }
        let seed = hex::decode(&self.master_seed)
            .map_err(|e| SwapxError::Config(format!("master_seed: {e}")))?;
        if seed.len() != 32 {
            return Err(SwapxError::Config("master_seed must be 32 bytes".into()));
        }
        let op = hex::decode(&self.operator_signing_key)
            .map_err(|e| SwapxError::Config(format!("operator_signing_key: {e}")))?;
        if op.len() != 32 {
            return Err(SwapxError::Config("operator_signing_key must be 32 bytes".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for c in &self.chains {
            if !seen.insert(c.chain_id.clone()) {
                return Err(SwapxError::Config(format!("duplicate chain id {}", c.chain_id)));
            }
            if c.family == ChainFamily::Utxo && c.broker_address.is_some() {
                return Err(SwapxError::Config(format!(
                    "chain {}: broker contracts are EVM-only",
                    c.chain_id
                )));
            }
            if c.family == ChainFamily::Evm && c.evm_chain_ref.is_none() {
                return Err(SwapxError::Config(format!(
                    "chain {}: evm_chain_ref is required for EVM chains",
                    c.chain_id
                )));
            }
            if c.family == ChainFamily::Utxo && c.utxo_address_version.is_none() {
                return Err(SwapxError::Config(format!(
                    "chain {}: utxo_address_version is required for UTXO chains",
                    c.chain_id
                )));
            }
            if c.engine_usable_confirmations() == 0 {
                return Err(SwapxError::Config(format!(
                    "chain {}: confirmations must be positive",
                    c.chain_id
                )));
            }
        }
        Ok(())
    }

    pub fn chain(&self, id: &ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| &c.chain_id == id)
    }
}

impl ChainConfig {
    fn engine_usable_confirmations(&self) -> u32 {
        self.confirmations.min(self.collect_confirmations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_doc(attempts: u32) -> String {
        format!(
            r#"{{
                "master_seed": "{seed}",
                "operator_signing_key": "{seed}",
                "max_recovery_attempts": {attempts},
                "chains": [{{
                    "chain_id": "SEPOLIA",
                    "family": "Evm",
                    "evm_chain_ref": 11155111,
                    "rpc_url": "http://localhost:8545",
                    "confirmations": 3,
                    "collect_confirmations": 3,
                    "operator_address": "0x1111111111111111111111111111111111111111",
                    "gas_funding_amount": "0.01",
                    "low_tank_threshold": "0.1",
                    "native_decimals": 18,
                    "native_usd_rate_cents": 250000
                }}]
            }}"#,
            seed = "11".repeat(32),
        )
    }

    #[test]
    fn loads_and_defaults() {
        let cfg = BrokerConfig::from_json(&minimal_doc(3)).unwrap();
        assert_eq!(cfg.engine_tick_secs, ENGINE_TICK_SECS);
        assert_eq!(cfg.recovery_tick_secs, RECOVERY_TICK_SECS);
        assert_eq!(cfg.commission_bps, 30);
        assert_eq!(cfg.max_recovery_attempts, 3);
    }

    #[test]
    fn clamps_attempt_ceiling() {
        assert_eq!(BrokerConfig::from_json(&minimal_doc(0)).unwrap().max_recovery_attempts, 1);
        assert_eq!(BrokerConfig::from_json(&minimal_doc(99)).unwrap().max_recovery_attempts, 10);
        assert_eq!(BrokerConfig::from_json(&minimal_doc(7)).unwrap().max_recovery_attempts, 7);
    }

    #[test]
    fn rejects_bad_seed() {
        let doc = minimal_doc(3).replace(&"11".repeat(32), "zz");
        assert!(BrokerConfig::from_json(&doc).is_err());
    }

    #[test]
    fn rejects_utxo_broker() {
        let doc = minimal_doc(3)
            .replace("\"Evm\"", "\"Utxo\"")
            .replace("\"native_decimals\": 18", "\"broker_address\": \"x\", \"native_decimals\": 8");
        assert!(BrokerConfig::from_json(&doc).is_err());
    }
}
