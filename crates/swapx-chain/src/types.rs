use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use swapx_core::{DealId, TxId};

// ── UTXO inspection ──────────────────────────────────────────────────────────

/// One unspent output attributed to an address. `value` is exact integer
/// base units; it is never narrowed to a float anywhere in the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: TxId,
    pub vout: u32,
    pub value: U256,
    /// Block height of the containing tx; `None` while unconfirmed.
    pub height: Option<u64>,
}

// ── Transfers ────────────────────────────────────────────────────────────────

/// Fee urgency for an outbound transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStrategy {
    /// Default chain fee estimate.
    Normal,
    /// Bumped fee for retried or time-sensitive submissions.
    Priority,
}

/// A signed, submitted transaction: the chain-reported id plus the raw
/// signed bytes (kept for resubmission on drop).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub txid: TxId,
    pub raw: Vec<u8>,
}

/// One value movement extracted from a settlement receipt: an ERC-20
/// `Transfer` event or a native internal transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Token contract, or `None` for a native-value movement.
    pub token: Option<String>,
    pub from: String,
    pub to: String,
    pub value: U256,
}

// ── Broker operations ────────────────────────────────────────────────────────

/// Parameters of one broker-contract call. The operator signature over the
/// canonical pre-image of these fields authorizes the contract to pull from
/// the escrow and split the funds in a single transaction.
#[derive(Clone, Debug)]
pub struct BrokerRequest {
    pub deal_id: DealId,
    /// Escrow derivation index; the plugin rebuilds the address and key.
    pub escrow_index: u64,
    /// Token contract for ERC-20 settlements; `None` settles native value.
    pub token: Option<String>,
    pub payback: String,
    pub recipient: String,
    pub fee_recipient: String,
    /// Principal routed to `recipient`.
    pub amount: U256,
    /// Commission routed to `fee_recipient`.
    pub fee: U256,
}

// ── Receipt classification ───────────────────────────────────────────────────

/// Settlement role of one receipt transfer, assigned by ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Principal to the recipient (ordinal 0).
    Swap,
    /// Commission to the operator (ordinal 1).
    Fee,
    /// Surplus back to the payback address (ordinal ≥ 2).
    Refund,
}

/// A receipt transfer with its settlement role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifiedTransfer {
    pub kind: TransferKind,
    pub record: TransferRecord,
}

/// Classify a broker receipt's transfers by ordinal.
///
/// Filtering is by token contract (or native) and `value > 0` only. The
/// broker pulls via allowance, so the `from` of the first transfer is the
/// escrow, not the broker — filtering by `from == broker` silently drops
/// every event and must not be reintroduced.
pub fn classify_transfers(
    records: &[TransferRecord],
    token: Option<&str>,
) -> Vec<ClassifiedTransfer> {
    records
        .iter()
        .filter(|r| r.token.as_deref().map(|t| t.to_ascii_lowercase())
            == token.map(|t| t.to_ascii_lowercase()))
        .filter(|r| r.value > U256::ZERO)
        .enumerate()
        .map(|(ordinal, record)| ClassifiedTransfer {
            kind: match ordinal {
                0 => TransferKind::Swap,
                1 => TransferKind::Fee,
                _ => TransferKind::Refund,
            },
            record: record.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: Option<&str>, from: &str, value: u64) -> TransferRecord {
        TransferRecord {
            token: token.map(str::to_string),
            from: from.to_string(),
            to: "0xrecipient".to_string(),
            value: U256::from(value),
        }
    }

    #[test]
    fn classifies_by_ordinal() {
        let records = vec![
            record(Some("0xT0KE"), "0xescrow", 10),
            record(Some("0xT0KE"), "0xbroker", 1),
            record(Some("0xT0KE"), "0xbroker", 5),
        ];
        let classified = classify_transfers(&records, Some("0xt0ke"));
        assert_eq!(classified.len(), 3);
        assert_eq!(classified[0].kind, TransferKind::Swap);
        assert_eq!(classified[1].kind, TransferKind::Fee);
        assert_eq!(classified[2].kind, TransferKind::Refund);
    }

    #[test]
    fn escrow_sourced_transfers_are_kept() {
        // The broker pulls via allowance: `from` is the escrow. These must
        // not be filtered out.
        let records = vec![record(Some("0xaaaa"), "0xescrow", 100)];
        let classified = classify_transfers(&records, Some("0xaaaa"));
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].kind, TransferKind::Swap);
        assert_eq!(classified[0].record.from, "0xescrow");
    }

    #[test]
    fn filters_other_tokens_and_zero_values() {
        let records = vec![
            record(Some("0xother"), "0xescrow", 10),
            record(Some("0xaaaa"), "0xescrow", 0),
            record(Some("0xaaaa"), "0xescrow", 7),
        ];
        let classified = classify_transfers(&records, Some("0xaaaa"));
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].record.value, U256::from(7u64));
    }

    #[test]
    fn native_transfers_classified_identically() {
        let records = vec![
            record(None, "0xescrow", 10),
            record(None, "0xbroker", 1),
            record(Some("0xaaaa"), "0xescrow", 99),
        ];
        let classified = classify_transfers(&records, None);
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[0].kind, TransferKind::Swap);
        assert_eq!(classified[1].kind, TransferKind::Fee);
    }
}
