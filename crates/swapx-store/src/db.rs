use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;

use swapx_core::{
    ChainFamily, Deal, DealId, Event, Phase, QueueItem, QueueItemId, QueueStatus,
    RecoveryLogEntry, SubmittedTx, SwapxError, Timestamp, TimestampMs, TxId,
};

/// Persistent broker database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   deals        — DealId bytes                          → bincode(Deal)
///   queue_items  — deal(16) ‖ phase(1) ‖ seq(4 BE)       → bincode(QueueItem)
///   events       — deal(16) ‖ ms(8 BE) ‖ nonce(4)        → bincode(Event)
///   recovery_log — id (8 BE)                             → bincode(RecoveryLogEntry)
///   leases       — name utf8                             → bincode(Lease)
///   meta         — utf8 key                              → raw bytes
///
/// The queue key embeds the deal's (phase, seq) ordering so a prefix scan
/// yields items in execution order. All multi-row updates that must not
/// interleave (stage transition + queue emission, submission bookkeeping)
/// run inside sled transactions.
pub struct BrokerDb {
    db: sled::Db,
    pub(crate) deals: sled::Tree,
    pub(crate) queue_items: sled::Tree,
    pub(crate) events: sled::Tree,
    pub(crate) recovery_log: sled::Tree,
    pub(crate) leases: sled::Tree,
    pub(crate) meta: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> SwapxError {
    SwapxError::Storage(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> SwapxError {
    SwapxError::Serialization(e.to_string())
}

pub(crate) fn phase_tag(phase: Phase) -> u8 {
    match phase {
        Phase::PreSwap => 0,
        Phase::Swap => 1,
        Phase::PostSwap => 2,
    }
}

/// Primary key for a queue item: sorts by (deal, phase, seq).
pub(crate) fn queue_key(deal_id: &DealId, phase: Phase, seq: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.extend_from_slice(deal_id.as_bytes());
    key.push(phase_tag(phase));
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

impl BrokerDb {
    /// Open or create the database at `path` and run additive migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SwapxError> {
        let db = sled::open(path).map_err(storage_err)?;
        let deals = db.open_tree("deals").map_err(storage_err)?;
        let queue_items = db.open_tree("queue_items").map_err(storage_err)?;
        let events = db.open_tree("events").map_err(storage_err)?;
        let recovery_log = db.open_tree("recovery_log").map_err(storage_err)?;
        let leases = db.open_tree("leases").map_err(storage_err)?;
        let meta = db.open_tree("meta").map_err(storage_err)?;
        let store = Self { db, deals, queue_items, events, recovery_log, leases, meta };
        store.migrate()?;
        Ok(store)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), SwapxError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    // ── Deals ────────────────────────────────────────────────────────────────

    /// Insert a fresh deal. Fails if the id already exists.
    pub fn create_deal(&self, deal: &Deal) -> Result<(), SwapxError> {
        let bytes = bincode::serialize(deal).map_err(ser_err)?;
        let prev = self
            .deals
            .compare_and_swap(deal.id.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        if prev.is_err() {
            return Err(SwapxError::Storage(format!("deal {} already exists", deal.id)));
        }
        Ok(())
    }

    pub fn get_deal(&self, id: &DealId) -> Result<Option<Deal>, SwapxError> {
        match self.deals.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Overwrite a deal record. Use [`Self::apply_transition`] when queue
    /// items must land in the same atomic step.
    pub fn put_deal(&self, deal: &Deal) -> Result<(), SwapxError> {
        let bytes = bincode::serialize(deal).map_err(ser_err)?;
        self.deals.insert(deal.id.as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    /// Every deal in the store.
    pub fn iter_deals(&self) -> Result<Vec<Deal>, SwapxError> {
        let mut out = Vec::new();
        for item in self.deals.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    /// Deals that still need engine attention.
    pub fn iter_open_deals(&self) -> Result<Vec<Deal>, SwapxError> {
        Ok(self
            .iter_deals()?
            .into_iter()
            .filter(|d| !d.stage.is_terminal())
            .collect())
    }

    /// Atomically write the deal's new stage alongside freshly planned queue
    /// items. Either everything lands or nothing does; a failed transition
    /// leaves the deal exactly where it was.
    pub fn apply_transition(&self, deal: &Deal, new_items: &[QueueItem]) -> Result<(), SwapxError> {
        let deal_bytes = bincode::serialize(deal).map_err(ser_err)?;
        let mut item_rows = Vec::with_capacity(new_items.len());
        for item in new_items {
            let key = queue_key(&item.deal_id, item.phase, item.seq);
            let value = bincode::serialize(item).map_err(ser_err)?;
            item_rows.push((key, value));
        }

        (&self.deals, &self.queue_items)
            .transaction(|(deals_tx, queue_tx)| {
                deals_tx.insert(deal.id.as_bytes().as_slice(), deal_bytes.clone())?;
                for (key, value) in &item_rows {
                    if queue_tx.get(key.clone())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(SwapxError::Storage(
                            format!("queue slot occupied: {}", hex_key(key)),
                        )));
                    }
                    queue_tx.insert(key.clone(), value.clone())?;
                }
                Ok(())
            })
            .map_err(unwrap_tx_err)
    }

    // ── Queue items ──────────────────────────────────────────────────────────

    /// All queue items for a deal in (phase, seq) execution order.
    pub fn items_for_deal(&self, deal_id: &DealId) -> Result<Vec<QueueItem>, SwapxError> {
        let mut out = Vec::new();
        for row in self.queue_items.scan_prefix(deal_id.as_bytes()) {
            let (_, bytes) = row.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    /// Every queue item in the store (recovery sweeps use this).
    pub fn iter_queue_items(&self) -> Result<Vec<QueueItem>, SwapxError> {
        let mut out = Vec::new();
        for row in self.queue_items.iter() {
            let (_, bytes) = row.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    /// Look up one item by its opaque id.
    pub fn get_item(&self, deal_id: &DealId, id: &QueueItemId) -> Result<Option<QueueItem>, SwapxError> {
        Ok(self
            .items_for_deal(deal_id)?
            .into_iter()
            .find(|i| &i.id == id))
    }

    /// Next free seq within (deal, phase); contiguous from 0.
    pub fn next_seq(&self, deal_id: &DealId, phase: Phase) -> Result<u32, SwapxError> {
        let mut prefix = Vec::with_capacity(17);
        prefix.extend_from_slice(deal_id.as_bytes());
        prefix.push(phase_tag(phase));
        let mut count = 0u32;
        for row in self.queue_items.scan_prefix(prefix) {
            row.map_err(storage_err)?;
            count += 1;
        }
        Ok(count)
    }

    /// Overwrite a queue item in place (status, attempts, error fields).
    pub fn put_item(&self, item: &QueueItem) -> Result<(), SwapxError> {
        let key = queue_key(&item.deal_id, item.phase, item.seq);
        let bytes = bincode::serialize(item).map_err(ser_err)?;
        self.queue_items.insert(key, bytes).map_err(storage_err)?;
        Ok(())
    }

    /// Append a single freshly planned item (recovery's approval repair).
    pub fn append_item(&self, item: &QueueItem) -> Result<(), SwapxError> {
        let key = queue_key(&item.deal_id, item.phase, item.seq);
        let bytes = bincode::serialize(item).map_err(ser_err)?;
        let prev = self
            .queue_items
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        if prev.is_err() {
            return Err(SwapxError::Storage(format!(
                "queue slot occupied for {} {} #{}",
                item.deal_id, item.phase, item.seq
            )));
        }
        Ok(())
    }

    /// Atomically move a `Pending` item to `Submitted` with its txid. Aborts
    /// if the item changed status underneath (the submitter and observer are
    /// serialized by the deal lease, so a conflict here is a real bug).
    pub fn mark_submitted(
        &self,
        item: &QueueItem,
        txid: TxId,
        submitted_at: Timestamp,
    ) -> Result<QueueItem, SwapxError> {
        let key = queue_key(&item.deal_id, item.phase, item.seq);
        let mut updated = item.clone();
        updated.status = QueueStatus::Submitted;
        updated.submitted_tx = Some(SubmittedTx { txid, submitted_at });
        let new_bytes = bincode::serialize(&updated).map_err(ser_err)?;
        let id_hex = updated.id.to_hex();

        self.queue_items
            .transaction(|tx| {
                let current = tx.get(key.clone())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(SwapxError::UnknownQueueItem(
                        id_hex.clone(),
                    ))
                })?;
                let current: QueueItem = bincode::deserialize(&current)
                    .map_err(|e| ConflictableTransactionError::Abort(ser_err(e)))?;
                if current.status != QueueStatus::Pending {
                    return Err(ConflictableTransactionError::Abort(
                        SwapxError::QueueStatusConflict {
                            id: current.id.to_hex(),
                            status: current.status.to_string(),
                            expected: QueueStatus::Pending.to_string(),
                        },
                    ));
                }
                tx.insert(key.clone(), new_bytes.clone())?;
                Ok(())
            })
            .map_err(unwrap_tx_err)?;
        Ok(updated)
    }

    /// True iff every queue item of the deal is terminal and at least one
    /// exists. Gate for `Swap → Closed`.
    pub fn all_items_terminal(&self, deal_id: &DealId) -> Result<bool, SwapxError> {
        let items = self.items_for_deal(deal_id)?;
        Ok(!items.is_empty() && items.iter().all(|i| i.status.is_terminal()))
    }

    /// True iff any SWAP-phase item has ever been submitted. Gate for the
    /// reorg rollback `Swap → Collection`.
    pub fn swap_submission_started(&self, deal_id: &DealId) -> Result<bool, SwapxError> {
        Ok(self.items_for_deal(deal_id)?.iter().any(|i| {
            i.phase >= Phase::Swap
                && (i.submitted_tx.is_some() || i.status != QueueStatus::Pending)
        }))
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Append a human-readable audit line for a deal.
    pub fn append_event(&self, deal_id: &DealId, at_ms: TimestampMs, message: impl Into<String>) -> Result<(), SwapxError> {
        let event = Event { deal_id: *deal_id, at_ms, message: message.into() };
        let mut key = Vec::with_capacity(28);
        key.extend_from_slice(deal_id.as_bytes());
        key.extend_from_slice(&(at_ms as u64).to_be_bytes());
        key.extend_from_slice(&rand::random::<u32>().to_be_bytes());
        let bytes = bincode::serialize(&event).map_err(ser_err)?;
        self.events.insert(key, bytes).map_err(storage_err)?;
        Ok(())
    }

    /// All events for a deal, oldest first.
    pub fn events_for_deal(&self, deal_id: &DealId) -> Result<Vec<Event>, SwapxError> {
        let mut out = Vec::new();
        for row in self.events.scan_prefix(deal_id.as_bytes()) {
            let (_, bytes) = row.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    // ── Recovery log ─────────────────────────────────────────────────────────

    /// Append one recovery audit row, allocating its monotonic id.
    pub fn append_recovery_log(&self, mut entry: RecoveryLogEntry) -> Result<u64, SwapxError> {
        let id = self.next_counter("recovery_log_id")?;
        entry.id = id;
        let bytes = bincode::serialize(&entry).map_err(ser_err)?;
        self.recovery_log
            .insert(id.to_be_bytes().to_vec(), bytes)
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Most recent `limit` recovery rows, newest first.
    pub fn recent_recovery_log(&self, limit: usize) -> Result<Vec<RecoveryLogEntry>, SwapxError> {
        let mut out = Vec::new();
        for row in self.recovery_log.iter().rev().take(limit) {
            let (_, bytes) = row.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    /// Recovery rows for one deal, oldest first.
    pub fn recovery_log_for_deal(&self, deal_id: &DealId) -> Result<Vec<RecoveryLogEntry>, SwapxError> {
        let mut out = Vec::new();
        for row in self.recovery_log.iter() {
            let (_, bytes) = row.map_err(storage_err)?;
            let entry: RecoveryLogEntry = bincode::deserialize(&bytes).map_err(ser_err)?;
            if entry.deal_id.as_ref() == Some(deal_id) {
                out.push(entry);
            }
        }
        Ok(out)
    }

    // ── Escrow index counters ────────────────────────────────────────────────

    /// Allocate the next escrow derivation index for a chain family.
    /// Strictly monotonic; an index is never reused across deals.
    pub fn next_escrow_index(&self, family: ChainFamily) -> Result<u64, SwapxError> {
        self.next_counter(&format!("escrow_index:{}", family.as_str()))
    }

    fn next_counter(&self, key: &str) -> Result<u64, SwapxError> {
        let result = self
            .meta
            .transaction(|tx| {
                let current = tx
                    .get(key.as_bytes())?
                    .map(|b| {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&b[..8]);
                        u64::from_be_bytes(arr)
                    })
                    .unwrap_or(0);
                tx.insert(key.as_bytes(), (current + 1).to_be_bytes().to_vec())?;
                Ok(current)
            })
            .map_err(unwrap_tx_err)?;
        Ok(result)
    }

    // ── Schema migration ─────────────────────────────────────────────────────

    const SCHEMA_VERSION: u64 = 1;

    /// Additive migration: record the schema version; future versions add
    /// trees or meta keys without rewriting existing rows.
    fn migrate(&self) -> Result<(), SwapxError> {
        let key = "schema_version";
        let current = self
            .meta
            .get(key)
            .map_err(storage_err)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(0);
        if current > Self::SCHEMA_VERSION {
            return Err(SwapxError::Storage(format!(
                "database schema {current} is newer than this binary ({})",
                Self::SCHEMA_VERSION
            )));
        }
        if current < Self::SCHEMA_VERSION {
            self.meta
                .insert(key, Self::SCHEMA_VERSION.to_be_bytes().to_vec())
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Quick liveness probe for the health endpoint.
    pub fn healthy(&self) -> bool {
        self.meta.get("schema_version").is_ok()
    }
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

fn unwrap_tx_err(e: TransactionError<SwapxError>) -> SwapxError {
    match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => storage_err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use swapx_core::{Asset, ChainId, EscrowRef, Purpose, Side, Stage};
    use tempfile::TempDir;

    fn open() -> (TempDir, BrokerDb) {
        let dir = TempDir::new().unwrap();
        let db = BrokerDb::open(dir.path()).unwrap();
        (dir, db)
    }

    fn side(chain: &str) -> Side {
        Side {
            chain_id: ChainId::new(chain),
            asset: Asset::Native { chain: ChainId::new(chain) },
            amount: U256::from(100u64),
            decimals: 8,
            recipient_addr: None,
            payback_addr: None,
            contact: None,
            token: "tok".into(),
        }
    }

    fn deal(id_byte: u8) -> Deal {
        Deal {
            id: DealId::from_bytes([id_byte; 16]),
            alice: side("ETH"),
            bob: side("DGB"),
            stage: Stage::Created,
            created_at: 1_000,
            updated_at: 1_000,
            timeout_secs: 3_600,
            collect_deadline: None,
            escrow_alice: EscrowRef {
                chain_id: ChainId::new("ETH"),
                index: 0,
                address: "0xaa".into(),
            },
            escrow_bob: EscrowRef {
                chain_id: ChainId::new("DGB"),
                index: 0,
                address: "Daa".into(),
            },
        }
    }

    fn item(deal_id: DealId, phase: Phase, seq: u32) -> QueueItem {
        QueueItem {
            id: QueueItemId::random(),
            deal_id,
            chain_id: ChainId::new("ETH"),
            purpose: Purpose::DirectTransfer,
            from_addr: "0xaa".into(),
            to_addr: "0xbb".into(),
            asset: Asset::Native { chain: ChainId::new("ETH") },
            amount: U256::from(1u64),
            fee: U256::ZERO,
            phase,
            seq,
            status: QueueStatus::Pending,
            submitted_tx: None,
            recovery_attempts: 0,
            last_recovery_at: None,
            recovery_error: None,
            created_at: 1_000,
        }
    }

    #[test]
    fn create_deal_rejects_duplicates() {
        let (_dir, db) = open();
        let d = deal(1);
        db.create_deal(&d).unwrap();
        assert!(db.create_deal(&d).is_err());
    }

    #[test]
    fn open_deals_exclude_terminal() {
        let (_dir, db) = open();
        let mut a = deal(1);
        db.create_deal(&a).unwrap();
        let mut b = deal(2);
        b.stage = Stage::Closed;
        db.create_deal(&b).unwrap();
        assert_eq!(db.iter_open_deals().unwrap().len(), 1);
        a.stage = Stage::Reverted;
        db.put_deal(&a).unwrap();
        assert!(db.iter_open_deals().unwrap().is_empty());
    }

    #[test]
    fn items_come_back_in_phase_seq_order() {
        let (_dir, db) = open();
        let d = deal(3);
        db.create_deal(&d).unwrap();
        // Insert deliberately out of order.
        let items = vec![
            item(d.id, Phase::PostSwap, 0),
            item(d.id, Phase::PreSwap, 1),
            item(d.id, Phase::Swap, 0),
            item(d.id, Phase::PreSwap, 0),
        ];
        db.apply_transition(&d, &items).unwrap();
        let got = db.items_for_deal(&d.id).unwrap();
        let keys: Vec<_> = got.iter().map(|i| i.order_key()).collect();
        assert_eq!(
            keys,
            vec![
                (Phase::PreSwap, 0),
                (Phase::PreSwap, 1),
                (Phase::Swap, 0),
                (Phase::PostSwap, 0)
            ]
        );
    }

    #[test]
    fn next_seq_counts_contiguously() {
        let (_dir, db) = open();
        let d = deal(4);
        db.create_deal(&d).unwrap();
        assert_eq!(db.next_seq(&d.id, Phase::PreSwap).unwrap(), 0);
        db.append_item(&item(d.id, Phase::PreSwap, 0)).unwrap();
        db.append_item(&item(d.id, Phase::PreSwap, 1)).unwrap();
        assert_eq!(db.next_seq(&d.id, Phase::PreSwap).unwrap(), 2);
        assert_eq!(db.next_seq(&d.id, Phase::Swap).unwrap(), 0);
    }

    #[test]
    fn append_item_rejects_occupied_slot() {
        let (_dir, db) = open();
        let d = deal(5);
        db.create_deal(&d).unwrap();
        db.append_item(&item(d.id, Phase::Swap, 0)).unwrap();
        assert!(db.append_item(&item(d.id, Phase::Swap, 0)).is_err());
    }

    #[test]
    fn mark_submitted_requires_pending() {
        let (_dir, db) = open();
        let d = deal(6);
        db.create_deal(&d).unwrap();
        let i = item(d.id, Phase::Swap, 0);
        db.append_item(&i).unwrap();

        let submitted = db.mark_submitted(&i, TxId::new("0xfeed"), 2_000).unwrap();
        assert_eq!(submitted.status, QueueStatus::Submitted);
        assert_eq!(submitted.submitted_tx.as_ref().unwrap().txid.as_str(), "0xfeed");

        // Second submission attempt must conflict.
        assert!(db.mark_submitted(&i, TxId::new("0xdead"), 2_001).is_err());
    }

    #[test]
    fn all_items_terminal_gate() {
        let (_dir, db) = open();
        let d = deal(7);
        db.create_deal(&d).unwrap();
        assert!(!db.all_items_terminal(&d.id).unwrap(), "no items yet");
        let mut a = item(d.id, Phase::Swap, 0);
        db.append_item(&a).unwrap();
        assert!(!db.all_items_terminal(&d.id).unwrap());
        a.status = QueueStatus::Confirmed;
        db.put_item(&a).unwrap();
        assert!(db.all_items_terminal(&d.id).unwrap());
    }

    #[test]
    fn swap_submission_gate_ignores_preswap() {
        let (_dir, db) = open();
        let d = deal(8);
        db.create_deal(&d).unwrap();
        let mut gas = item(d.id, Phase::PreSwap, 0);
        gas.status = QueueStatus::Submitted;
        db.append_item(&gas).unwrap();
        assert!(!db.swap_submission_started(&d.id).unwrap());

        let mut swap = item(d.id, Phase::Swap, 0);
        db.append_item(&swap).unwrap();
        assert!(!db.swap_submission_started(&d.id).unwrap());
        swap.status = QueueStatus::Submitted;
        db.put_item(&swap).unwrap();
        assert!(db.swap_submission_started(&d.id).unwrap());
    }

    #[test]
    fn escrow_indices_are_monotonic_per_family() {
        let (_dir, db) = open();
        assert_eq!(db.next_escrow_index(ChainFamily::Evm).unwrap(), 0);
        assert_eq!(db.next_escrow_index(ChainFamily::Evm).unwrap(), 1);
        assert_eq!(db.next_escrow_index(ChainFamily::Utxo).unwrap(), 0);
        assert_eq!(db.next_escrow_index(ChainFamily::Evm).unwrap(), 2);
    }

    #[test]
    fn counters_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let db = BrokerDb::open(dir.path()).unwrap();
            assert_eq!(db.next_escrow_index(ChainFamily::Evm).unwrap(), 0);
            db.flush().unwrap();
        }
        let db = BrokerDb::open(dir.path()).unwrap();
        assert_eq!(db.next_escrow_index(ChainFamily::Evm).unwrap(), 1);
    }

    #[test]
    fn events_ordered_oldest_first() {
        let (_dir, db) = open();
        let d = deal(9);
        db.create_deal(&d).unwrap();
        db.append_event(&d.id, 10, "first").unwrap();
        db.append_event(&d.id, 20, "second").unwrap();
        let events = db.events_for_deal(&d.id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[1].message, "second");
    }

    #[test]
    fn recovery_log_ids_allocate_and_filter() {
        use swapx_core::{RecoveryLogEntry, RecoveryType};
        let (_dir, db) = open();
        let d = deal(10);
        let entry = |deal_id| RecoveryLogEntry {
            id: 0,
            deal_id,
            recovery_type: RecoveryType::StuckPending,
            chain_id: ChainId::new("ETH"),
            action: "nudge".into(),
            success: true,
            error: None,
            metadata: serde_json::json!({}),
            created_at: 1_000,
        };
        let first = db.append_recovery_log(entry(Some(d.id))).unwrap();
        let second = db.append_recovery_log(entry(None)).unwrap();
        assert!(second > first);
        assert_eq!(db.recovery_log_for_deal(&d.id).unwrap().len(), 1);
        assert_eq!(db.recent_recovery_log(10).unwrap().len(), 2);
    }
}
