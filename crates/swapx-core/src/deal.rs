use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::Asset;
use crate::types::{ChainId, DealId, Party, Timestamp};

// ── Stage ────────────────────────────────────────────────────────────────────

/// Deal lifecycle state machine.
///
/// `Created → Collection → Swap → Closed` is the happy path. `Reverted` is
/// the refunded terminal (timeout with at least one side funded) and
/// `ExpiredNoDetails` the empty terminal (deadline hit before either party
/// supplied addresses, so there is nothing to refund).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Created,
    Collection,
    Swap,
    Closed,
    Reverted,
    ExpiredNoDetails,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Closed | Stage::Reverted | Stage::ExpiredNoDetails)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Created, Collection)
                | (Created, ExpiredNoDetails)
                | (Collection, Swap)
                | (Collection, Reverted)
                | (Collection, ExpiredNoDetails)
                // Reorg rollback, only before any SWAP-phase submission.
                | (Swap, Collection)
                | (Swap, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "CREATED",
            Stage::Collection => "COLLECTION",
            Stage::Swap => "SWAP",
            Stage::Closed => "CLOSED",
            Stage::Reverted => "REVERTED",
            Stage::ExpiredNoDetails => "EXPIRED_NO_DETAILS",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Side ─────────────────────────────────────────────────────────────────────

/// One counterparty's half of a deal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Side {
    pub chain_id: ChainId,
    pub asset: Asset,
    /// Advertised principal in base units of `asset`.
    pub amount: U256,
    /// Base-unit precision of `asset`, captured at deal creation so amounts
    /// render as exact decimals without a chain round-trip.
    pub decimals: u8,
    /// Where the *other* side's principal is delivered. Empty until filled.
    pub recipient_addr: Option<String>,
    /// Where this side's funds return on revert/refund. Empty until filled.
    pub payback_addr: Option<String>,
    /// Free-form contact hint supplied by the party.
    pub contact: Option<String>,
    /// Per-side bearer token authorizing detail fill-in.
    pub token: String,
}

impl Side {
    pub fn details_filled(&self) -> bool {
        self.recipient_addr.is_some() && self.payback_addr.is_some()
    }
}

// ── Escrow ───────────────────────────────────────────────────────────────────

/// A single-purpose deterministic escrow address owned by one side of one
/// deal for that deal's lifetime. The private key is never stored; it is
/// recomputed from the master seed and `index` on demand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRef {
    pub chain_id: ChainId,
    pub index: u64,
    pub address: String,
}

// ── Deal ─────────────────────────────────────────────────────────────────────

/// A two-sided OTC swap. Stage transitions are the only mutation path
/// outside deposit observation and settlement bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub alice: Side,
    pub bob: Side,
    pub stage: Stage,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Collection window length, fixed at creation.
    pub timeout_secs: i64,
    /// now + timeout_secs, fixed when the deal enters `Collection`.
    pub collect_deadline: Option<Timestamp>,
    pub escrow_alice: EscrowRef,
    pub escrow_bob: EscrowRef,
}

impl Deal {
    pub fn side(&self, party: Party) -> &Side {
        match party {
            Party::Alice => &self.alice,
            Party::Bob => &self.bob,
        }
    }

    pub fn side_mut(&mut self, party: Party) -> &mut Side {
        match party {
            Party::Alice => &mut self.alice,
            Party::Bob => &mut self.bob,
        }
    }

    pub fn escrow(&self, party: Party) -> &EscrowRef {
        match party {
            Party::Alice => &self.escrow_alice,
            Party::Bob => &self.escrow_bob,
        }
    }

    /// Match a bearer token to the party it authorizes.
    pub fn party_for_token(&self, token: &str) -> Option<Party> {
        if self.alice.token == token {
            Some(Party::Alice)
        } else if self.bob.token == token {
            Some(Party::Bob)
        } else {
            None
        }
    }

    pub fn both_details_filled(&self) -> bool {
        self.alice.details_filled() && self.bob.details_filled()
    }

    pub fn deadline_passed(&self, now: Timestamp) -> bool {
        match self.collect_deadline {
            Some(d) => now >= d,
            // Never entered Collection: measure from creation.
            None => now >= self.created_at + self.timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stages_do_not_transition() {
        for terminal in [Stage::Closed, Stage::Reverted, Stage::ExpiredNoDetails] {
            for next in [
                Stage::Created,
                Stage::Collection,
                Stage::Swap,
                Stage::Closed,
                Stage::Reverted,
                Stage::ExpiredNoDetails,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} must not move to {next}"
                );
            }
        }
    }

    #[test]
    fn happy_path_transitions_allowed() {
        assert!(Stage::Created.can_transition_to(Stage::Collection));
        assert!(Stage::Collection.can_transition_to(Stage::Swap));
        assert!(Stage::Swap.can_transition_to(Stage::Closed));
    }

    #[test]
    fn swap_never_reverts() {
        assert!(!Stage::Swap.can_transition_to(Stage::Reverted));
        // Reorg rollback to Collection is permitted (gated further upstream).
        assert!(Stage::Swap.can_transition_to(Stage::Collection));
    }
}
