use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::Asset;
use crate::types::{ChainId, DealId, Timestamp, TxId};

// ── QueueItemId ──────────────────────────────────────────────────────────────

/// Opaque 128-bit queue item identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueItemId(pub [u8; 16]);

impl QueueItemId {
    pub fn random() -> Self {
        let mut b = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut b);
        Self(b)
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

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueItemId({}…)", &self.to_hex()[..8])
    }
}

// ── Purpose / Phase / Status ─────────────────────────────────────────────────

/// What a queue item does on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    /// Atomic broker-contract settlement pulling from escrow.
    BrokerSwap,
    /// Broker-contract full return to payback on revert.
    BrokerRevert,
    /// Broker-contract surplus refund.
    BrokerRefund,
    /// Plain transfer signed by the escrow key (UTXO, or EVM without broker).
    DirectTransfer,
    /// ERC-20 approval from escrow to the broker contract.
    Approval,
    /// Tank → escrow native top-up so the escrow can pay gas.
    GasFunding,
    /// Escrow → tank sweep of leftover native gas.
    GasRefundToTank,
    /// Operator commission payout.
    CommissionTransfer,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::BrokerSwap => "BROKER_SWAP",
            Purpose::BrokerRevert => "BROKER_REVERT",
            Purpose::BrokerRefund => "BROKER_REFUND",
            Purpose::DirectTransfer => "DIRECT_TRANSFER",
            Purpose::Approval => "APPROVAL",
            Purpose::GasFunding => "GAS_FUNDING",
            Purpose::GasRefundToTank => "GAS_REFUND_TO_TANK",
            Purpose::CommissionTransfer => "COMMISSION_TRANSFER",
        }
    }

    /// Broker purposes settle atomically through the broker contract and
    /// carry classified receipt transfers in `status` responses.
    pub fn is_broker(&self) -> bool {
        matches!(self, Purpose::BrokerSwap | Purpose::BrokerRevert | Purpose::BrokerRefund)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse ordering bucket within a deal. Ordering across phases is strict:
/// `PreSwap < Swap < PostSwap`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    PreSwap,
    Swap,
    PostSwap,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreSwap => "PRE_SWAP",
            Phase::Swap => "SWAP",
            Phase::PostSwap => "POST_SWAP",
        }
    }

    pub const ALL: [Phase; 3] = [Phase::PreSwap, Phase::Swap, Phase::PostSwap];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue item lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Submitted => "SUBMITTED",
            QueueStatus::Confirmed => "CONFIRMED",
            QueueStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Confirmed | QueueStatus::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── QueueItem ────────────────────────────────────────────────────────────────

/// Submission record, set atomically with the `Submitted` status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTx {
    pub txid: TxId,
    pub submitted_at: Timestamp,
}

/// Durable record of one scheduled chain action. `(phase, seq)` defines
/// execution order within a deal; `seq` is contiguous from 0 per
/// `(deal, phase)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub deal_id: DealId,
    pub chain_id: ChainId,
    pub purpose: Purpose,
    pub from_addr: String,
    pub to_addr: String,
    pub asset: Asset,
    pub amount: U256,
    /// Commission the broker contract routes to the fee recipient. Zero for
    /// non-broker purposes (their commission is a separate item).
    pub fee: U256,
    pub phase: Phase,
    pub seq: u32,
    pub status: QueueStatus,
    pub submitted_tx: Option<SubmittedTx>,
    pub recovery_attempts: u32,
    pub last_recovery_at: Option<Timestamp>,
    pub recovery_error: Option<String>,
    pub created_at: Timestamp,
}

impl QueueItem {
    /// Ordering key within a deal.
    pub fn order_key(&self) -> (Phase, u32) {
        (self.phase, self.seq)
    }
}
