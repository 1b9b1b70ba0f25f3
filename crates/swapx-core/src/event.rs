use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ChainId, DealId, Timestamp, TimestampMs};

// ── Deal events ──────────────────────────────────────────────────────────────

/// Append-only human-readable audit line for a deal. Never consulted for
/// correctness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub deal_id: DealId,
    pub at_ms: TimestampMs,
    pub message: String,
}

// ── Recovery log ─────────────────────────────────────────────────────────────

/// The repair pass that produced a recovery log row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryType {
    MissingApproval,
    StuckPending,
    StuckSubmitted,
    MalformedItem,
    LowTankBalance,
}

impl RecoveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryType::MissingApproval => "MISSING_APPROVAL",
            RecoveryType::StuckPending => "STUCK_PENDING",
            RecoveryType::StuckSubmitted => "STUCK_SUBMITTED",
            RecoveryType::MalformedItem => "MALFORMED_ITEM",
            RecoveryType::LowTankBalance => "LOW_TANK_BALANCE",
        }
    }
}

impl fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human audit row for one recovery action. One row per action, success or
/// failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryLogEntry {
    pub id: u64,
    /// Absent for chain-scoped rows (e.g. tank balance warnings).
    pub deal_id: Option<DealId>,
    pub recovery_type: RecoveryType,
    pub chain_id: ChainId,
    pub action: String,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}
