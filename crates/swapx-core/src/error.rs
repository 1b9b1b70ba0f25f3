use thiserror::Error;

/// Unified error type for the broker core.
///
/// The variants are grouped by the failure taxonomy the engine enforces:
/// transient I/O is retried without penalty, transaction failures count
/// against a queue item's recovery budget, deterministic misuse fails the
/// item immediately, invariant violations fail loudly, and resource
/// exhaustion parks the item until an operator intervenes.
#[derive(Debug, Error)]
pub enum SwapxError {
    // ── Deal errors ──────────────────────────────────────────────────────────
    #[error("unknown deal: {0}")]
    UnknownDeal(String),

    #[error("invalid stage transition: {from} → {to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("deal is terminal; no further transitions")]
    DealTerminal,

    #[error("party token mismatch")]
    Unauthorized,

    #[error("party details conflict with previously submitted details")]
    DetailsConflict,

    #[error("both sides of a deal must advertise a positive amount")]
    ZeroAmount,

    // ── Queue errors ─────────────────────────────────────────────────────────
    #[error("unknown queue item: {0}")]
    UnknownQueueItem(String),

    #[error("queue item {id} is {status}; expected {expected}")]
    QueueStatusConflict { id: String, status: String, expected: String },

    // ── Chain errors (transient) ─────────────────────────────────────────────
    #[error("chain rpc error: {0}")]
    Rpc(String),

    #[error("chain rpc timed out after {0}s")]
    RpcTimeout(u64),

    // ── Chain errors (transaction failure) ───────────────────────────────────
    #[error("transaction failed on chain: {0}")]
    TxFailed(String),

    #[error("transaction dropped or reorged: {0}")]
    TxDropped(String),

    // ── Deterministic misuse ─────────────────────────────────────────────────
    #[error("cross-chain address mismatch: {addr} is not shaped for chain {chain}")]
    AddressChainMismatch { chain: String, addr: String },

    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("malformed amount: {0}")]
    MalformedAmount(String),

    #[error("malformed asset identifier: {0}")]
    MalformedAsset(String),

    // ── Invariant violations ─────────────────────────────────────────────────
    #[error("queue item references unknown deal: {0}")]
    OrphanQueueItem(String),

    #[error("broker operations required but no broker contract configured for chain {0}")]
    BrokerNotConfigured(String),

    #[error("chain {0} is not registered")]
    UnknownChain(String),

    #[error("operation not supported by chain {0}")]
    CapabilityUnsupported(String),

    // ── Resource exhaustion ──────────────────────────────────────────────────
    #[error("tank wallet on chain {chain} cannot cover {need} base units")]
    TankEmpty { chain: String, need: String },

    #[error("insufficient escrow funds: need {need}, have {have}")]
    InsufficientFunds { need: String, have: String },

    // ── Keys ─────────────────────────────────────────────────────────────────
    #[error("invalid master seed: {0}")]
    InvalidSeed(String),

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("invalid signature material: {0}")]
    Signing(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("lease {0} is held")]
    LeaseHeld(String),

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl SwapxError {
    /// Transient failures are retried on the next tick without touching the
    /// item's recovery-attempt budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, SwapxError::Rpc(_) | SwapxError::RpcTimeout(_))
    }

    /// Deterministic misuse: the item can never succeed and must be failed
    /// out with a self-describing error instead of retried.
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            SwapxError::AddressChainMismatch { .. }
                | SwapxError::UnsupportedAsset(_)
                | SwapxError::MalformedAmount(_)
                | SwapxError::MalformedAsset(_)
        )
    }
}
