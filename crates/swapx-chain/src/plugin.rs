use alloy_primitives::U256;
use async_trait::async_trait;

use swapx_core::{Asset, ChainConfig, ChainFamily, ChainId, SwapxError, TxId};

use crate::types::{BrokerRequest, FeeStrategy, Submission, TransferRecord, Utxo};

/// The capability set every chain adapter implements.
///
/// Capabilities that do not exist on a chain family return
/// `SwapxError::CapabilityUnsupported` from the default implementations;
/// callers probe with [`ChainPlugin::supports_broker`] /
/// [`ChainPlugin::supports_tokens`] before relying on them. Plugins must be
/// safe to invoke concurrently from different deals on the same chain; the
/// only serialized resource is the per-escrow nonce allocation inside the
/// EVM plugin, and each escrow belongs to exactly one deal.
#[async_trait]
pub trait ChainPlugin: Send + Sync {
    fn chain_id(&self) -> &ChainId;
    fn family(&self) -> ChainFamily;
    fn config(&self) -> &ChainConfig;

    // ── Capability probes ────────────────────────────────────────────────────

    /// Broker-contract settlement is available (EVM with a configured
    /// broker address).
    fn supports_broker(&self) -> bool {
        false
    }

    /// Fungible-token (ERC-20-like) operations are available.
    fn supports_tokens(&self) -> bool {
        false
    }

    // ── Derivation (pure, offline) ───────────────────────────────────────────

    /// Deterministic escrow address at `index`.
    fn derive_escrow(&self, index: u64) -> Result<String, SwapxError>;

    /// This chain's tank hot-wallet address.
    fn tank_address(&self) -> &str;

    /// Cheap shape check: could `addr` be an address on this chain? Used to
    /// fail malformed cross-chain queue items instead of retrying them.
    fn is_address_shaped(&self, addr: &str) -> bool;

    // ── Inspection ───────────────────────────────────────────────────────────

    /// Native-coin balance at the chain tip.
    async fn native_balance(&self, addr: &str) -> Result<U256, SwapxError>;

    /// Token balance at the chain tip.
    async fn token_balance(&self, _token: &str, _addr: &str) -> Result<U256, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    /// Base-unit precision of a token contract.
    async fn token_decimals(&self, _token: &str) -> Result<u8, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    /// Unspent outputs for an address (UTXO chains).
    async fn utxos(&self, _addr: &str) -> Result<Vec<Utxo>, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    /// Balance of `asset` at `addr` counting only value buried under at
    /// least `confirmations` blocks. This is the deposit-observation
    /// primitive: a reorg that unburies a deposit lowers this number again.
    async fn confirmed_balance(
        &self,
        asset: &Asset,
        addr: &str,
        confirmations: u32,
    ) -> Result<U256, SwapxError>;

    /// Current tip height; doubles as the health probe.
    async fn tip_height(&self) -> Result<u64, SwapxError>;

    // ── Transfers ────────────────────────────────────────────────────────────

    /// Build, sign (with the derived escrow key), and submit a transfer of
    /// `amount` from escrow `index` to `to`.
    async fn send_from_escrow(
        &self,
        index: u64,
        asset: &Asset,
        to: &str,
        amount: U256,
        fee: FeeStrategy,
    ) -> Result<Submission, SwapxError>;

    /// Send native coin from the tank hot wallet (gas funding).
    async fn send_from_tank(&self, to: &str, amount: U256) -> Result<Submission, SwapxError>;

    /// Sweep the escrow's residual native balance, less the fee for the
    /// sweep itself, to `to` (the gas refund to the tank).
    async fn sweep_escrow_native(&self, index: u64, to: &str) -> Result<Submission, SwapxError>;

    /// Estimated native cost of a pending outbound transfer from `from`.
    async fn estimate_transfer_cost(
        &self,
        asset: &Asset,
        from: &str,
        to: &str,
        amount: U256,
    ) -> Result<U256, SwapxError>;

    // ── Broker operations (EVM only) ─────────────────────────────────────────

    /// Atomic settlement through the broker contract, authorized by a
    /// 65-byte operator signature over the canonical request pre-image.
    async fn swap_via_broker(
        &self,
        _req: &BrokerRequest,
        _operator_sig: &[u8; 65],
    ) -> Result<Submission, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    /// Full return to the payback address through the broker contract.
    async fn revert_via_broker(
        &self,
        _req: &BrokerRequest,
        _operator_sig: &[u8; 65],
    ) -> Result<Submission, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    /// Surplus refund through the broker contract.
    async fn refund_via_broker(
        &self,
        _req: &BrokerRequest,
        _operator_sig: &[u8; 65],
    ) -> Result<Submission, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    /// ERC-20 allowance granted by `owner` to the broker contract.
    async fn allowance(&self, _token: &str, _owner: &str) -> Result<U256, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    /// ERC-20 approval from escrow `index` to the broker contract.
    async fn approve_broker(
        &self,
        _index: u64,
        _token: &str,
        _amount: U256,
    ) -> Result<Submission, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.chain_id().to_string()))
    }

    // ── Confirmation polling / receipts ──────────────────────────────────────

    /// Confirmation count for `txid`. `0` while in the mempool, negative
    /// when the chain reports the tx dropped, reorged out, or reverted.
    async fn tx_confirmations(&self, txid: &TxId) -> Result<i64, SwapxError>;

    /// Value movements recorded in the receipt of `txid`: ERC-20 `Transfer`
    /// events plus native internal transfers (EVM), or inclusion outputs
    /// (UTXO).
    async fn receipt_transfers(&self, txid: &TxId) -> Result<Vec<TransferRecord>, SwapxError>;

    /// Orderly teardown; flush nothing, drop connections.
    async fn shutdown(&self) {}
}
