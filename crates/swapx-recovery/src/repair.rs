//! The four repair passes plus the tank balance scan.

use alloy_primitives::U256;
use tracing::{info, warn};

use swapx_core::{
    amount::parse_units, now_millis, Deal, Phase, Purpose, QueueItem, QueueItemId, QueueStatus,
    RecoveryLogEntry, RecoveryType, Stage, SwapxError, Timestamp,
};

use crate::manager::RecoveryManager;

impl RecoveryManager {
    fn log_row(
        &self,
        recovery_type: RecoveryType,
        deal: Option<&Deal>,
        chain_id: swapx_core::ChainId,
        action: &str,
        success: bool,
        error: Option<String>,
        metadata: serde_json::Value,
        now: Timestamp,
    ) -> Result<(), SwapxError> {
        self.db.append_recovery_log(RecoveryLogEntry {
            id: 0,
            deal_id: deal.map(|d| d.id),
            recovery_type,
            chain_id,
            action: action.to_string(),
            success,
            error,
            metadata,
            created_at: now,
        })?;
        Ok(())
    }

    // ── 1. Missing approval repair ───────────────────────────────────────────

    /// A broker settlement whose escrow shows zero allowance will revert
    /// forever; re-enqueue the approval (and gas first if the escrow ran
    /// dry) so the engine can make progress.
    pub(crate) async fn repair_missing_approvals(&self, now: Timestamp) -> Result<(), SwapxError> {
        for deal in self.db.iter_deals()? {
            if deal.stage != Stage::Swap {
                continue;
            }
            let items = self.db.items_for_deal(&deal.id)?;

            for item in &items {
                if item.purpose != Purpose::BrokerSwap || item.status != QueueStatus::Pending {
                    continue;
                }
                let Some(token) = item.asset.token_address() else { continue };
                let plugin = self.registry.get(&item.chain_id)?;
                if !plugin.supports_broker() {
                    continue;
                }

                let allowance = match plugin.allowance(token, &item.from_addr).await {
                    Ok(a) => a,
                    Err(e) if e.is_transient() => continue,
                    Err(e) => return Err(e),
                };
                if allowance >= item.amount + item.fee {
                    continue;
                }
                // An approval already in flight will set the allowance.
                let open_approval = items.iter().any(|i| {
                    i.purpose == Purpose::Approval
                        && i.chain_id == item.chain_id
                        && !i.status.is_terminal()
                });
                if open_approval {
                    continue;
                }

                let mut appended = Vec::new();
                let escrow_native = plugin.native_balance(&item.from_addr).await?;
                let est = plugin
                    .estimate_transfer_cost(&item.asset, &item.from_addr, &item.to_addr, item.amount)
                    .await?;
                if escrow_native < est {
                    let chain_config = plugin.config();
                    let funding = parse_units(
                        &chain_config.gas_funding_amount,
                        chain_config.native_decimals,
                    )?;
                    let gas = QueueItem {
                        id: QueueItemId::random(),
                        deal_id: deal.id,
                        chain_id: item.chain_id.clone(),
                        purpose: Purpose::GasFunding,
                        from_addr: plugin.tank_address().to_string(),
                        to_addr: item.from_addr.clone(),
                        asset: item.asset.native_of_same_chain(),
                        amount: funding,
                        fee: U256::ZERO,
                        phase: Phase::PreSwap,
                        seq: self.db.next_seq(&deal.id, Phase::PreSwap)?,
                        status: QueueStatus::Pending,
                        submitted_tx: None,
                        recovery_attempts: 0,
                        last_recovery_at: None,
                        recovery_error: None,
                        created_at: now,
                    };
                    self.db.append_item(&gas)?;
                    appended.push("gas funding");
                }

                let approval = QueueItem {
                    id: QueueItemId::random(),
                    deal_id: deal.id,
                    chain_id: item.chain_id.clone(),
                    purpose: Purpose::Approval,
                    from_addr: item.from_addr.clone(),
                    to_addr: item.from_addr.clone(),
                    asset: item.asset.clone(),
                    amount: item.amount + item.fee,
                    fee: U256::ZERO,
                    phase: Phase::PreSwap,
                    seq: self.db.next_seq(&deal.id, Phase::PreSwap)?,
                    status: QueueStatus::Pending,
                    submitted_tx: None,
                    recovery_attempts: 0,
                    last_recovery_at: None,
                    recovery_error: None,
                    created_at: now,
                };
                self.db.append_item(&approval)?;
                appended.push("approval");

                self.db.append_event(
                    &deal.id,
                    now_millis(),
                    format!("recovery re-enqueued {}", appended.join(" + ")),
                )?;
                self.log_row(
                    RecoveryType::MissingApproval,
                    Some(&deal),
                    item.chain_id.clone(),
                    "re-enqueued broker approval",
                    true,
                    None,
                    serde_json::json!({ "allowance": allowance.to_string(), "appended": appended }),
                    now,
                )?;
                info!(deal = %deal.id, chain = %item.chain_id, "approval re-enqueued");
            }
        }
        Ok(())
    }

    // ── 2. Stuck pending repair ──────────────────────────────────────────────

    /// A `Pending` item that has not been submitted for a long while burns
    /// one unit of retry budget and gets its transient error cleared, making
    /// it eligible again and visible in the audit trail.
    pub(crate) fn repair_stuck_pending(&self, now: Timestamp) -> Result<(), SwapxError> {
        for item in self.db.iter_queue_items()? {
            if item.status != QueueStatus::Pending || item.submitted_tx.is_some() {
                continue;
            }
            if item.recovery_attempts >= self.config.max_recovery_attempts {
                continue;
            }
            let last_touched = item.last_recovery_at.unwrap_or(item.created_at);
            if now - last_touched <= self.config.stuck_pending_secs {
                continue;
            }

            let mut updated = item.clone();
            updated.recovery_attempts += 1;
            updated.last_recovery_at = Some(now);
            updated.recovery_error = None;
            self.db.put_item(&updated)?;
            self.log_row(
                RecoveryType::StuckPending,
                None,
                item.chain_id.clone(),
                "stuck pending item nudged",
                true,
                None,
                serde_json::json!({
                    "item": item.id.to_hex(),
                    "deal": item.deal_id.to_hex(),
                    "attempts": updated.recovery_attempts,
                }),
                now,
            )?;
            warn!(deal = %item.deal_id, purpose = %item.purpose,
                  attempts = updated.recovery_attempts, "stuck pending item nudged");
        }
        Ok(())
    }

    // ── 3. Stuck submitted repair ────────────────────────────────────────────

    /// Ask the chain what became of long-submitted transactions: confirmed
    /// ones are promoted, dropped or reorged ones go back to `Pending`.
    pub(crate) async fn repair_stuck_submitted(&self, now: Timestamp) -> Result<(), SwapxError> {
        for item in self.db.iter_queue_items()? {
            if item.status != QueueStatus::Submitted {
                continue;
            }
            let Some(submitted) = &item.submitted_tx else { continue };
            if now - submitted.submitted_at <= self.config.stuck_submitted_secs {
                continue;
            }

            let plugin = self.registry.get(&item.chain_id)?;
            let confirmations = match plugin.tx_confirmations(&submitted.txid).await {
                Ok(c) => c,
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e),
            };
            let threshold = plugin.config().confirmations as i64;

            if confirmations >= threshold {
                let mut updated = item.clone();
                updated.status = QueueStatus::Confirmed;
                self.db.put_item(&updated)?;
                self.log_row(
                    RecoveryType::StuckSubmitted,
                    None,
                    item.chain_id.clone(),
                    "stale submission found confirmed",
                    true,
                    None,
                    serde_json::json!({ "item": item.id.to_hex(), "txid": submitted.txid.as_str() }),
                    now,
                )?;
            } else if confirmations < 0 {
                let mut updated = item.clone();
                updated.recovery_attempts += 1;
                updated.last_recovery_at = Some(now);
                updated.submitted_tx = None;
                updated.recovery_error =
                    Some(format!("transaction {} dropped or reorged", submitted.txid));
                updated.status = if updated.recovery_attempts >= self.config.max_recovery_attempts {
                    QueueStatus::Failed
                } else {
                    QueueStatus::Pending
                };
                self.db.put_item(&updated)?;
                self.db.append_event(
                    &item.deal_id,
                    now_millis(),
                    format!("{} dropped on chain; reset for resubmission", item.purpose),
                )?;
                self.log_row(
                    RecoveryType::StuckSubmitted,
                    None,
                    item.chain_id.clone(),
                    "dropped submission reset",
                    true,
                    None,
                    serde_json::json!({
                        "item": item.id.to_hex(),
                        "txid": submitted.txid.as_str(),
                        "attempts": updated.recovery_attempts,
                    }),
                    now,
                )?;
                warn!(deal = %item.deal_id, txid = %submitted.txid, "dropped submission reset");
            }
        }
        Ok(())
    }

    // ── 4. Malformed cross-chain triage ──────────────────────────────────────

    /// An item whose endpoints are not address-shaped for its chain can
    /// never succeed; fail it with a self-describing error instead of
    /// letting it spin through retries.
    pub(crate) fn fail_malformed_items(&self, now: Timestamp) -> Result<(), SwapxError> {
        for item in self.db.iter_queue_items()? {
            if item.status != QueueStatus::Pending {
                continue;
            }
            let Ok(plugin) = self.registry.get(&item.chain_id) else {
                continue;
            };
            let bad = [&item.from_addr, &item.to_addr]
                .into_iter()
                .find(|a| !plugin.is_address_shaped(a));
            let Some(bad_addr) = bad else { continue };

            let error = format!(
                "cross-chain address mismatch: {bad_addr} is not shaped for chain {}",
                item.chain_id
            );
            let mut updated = item.clone();
            updated.status = QueueStatus::Failed;
            updated.recovery_error = Some(error.clone());
            updated.last_recovery_at = Some(now);
            self.db.put_item(&updated)?;
            self.db.append_event(
                &item.deal_id,
                now_millis(),
                format!("{} FAILED: {error}", item.purpose),
            )?;
            self.log_row(
                RecoveryType::MalformedItem,
                None,
                item.chain_id.clone(),
                "malformed item failed out",
                true,
                Some(error),
                serde_json::json!({ "item": item.id.to_hex(), "deal": item.deal_id.to_hex() }),
                now,
            )?;
        }
        Ok(())
    }

    // ── 5. Tank balance scan ─────────────────────────────────────────────────

    /// Record a LOW_TANK_BALANCE row when a chain's hot wallet drops under
    /// its configured threshold. Observation only; no automatic top-up.
    pub(crate) async fn scan_tank_balances(&self, now: Timestamp) -> Result<(), SwapxError> {
        for plugin in self.registry.all() {
            let chain_config = plugin.config();
            let threshold = parse_units(
                &chain_config.low_tank_threshold,
                chain_config.native_decimals,
            )?;
            let balance = match plugin.native_balance(plugin.tank_address()).await {
                Ok(b) => b,
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e),
            };
            if balance < threshold {
                self.log_row(
                    RecoveryType::LowTankBalance,
                    None,
                    plugin.chain_id().clone(),
                    "tank balance below threshold",
                    true,
                    None,
                    serde_json::json!({
                        "balance": balance.to_string(),
                        "threshold": threshold.to_string(),
                    }),
                    now,
                )?;
                warn!(chain = %plugin.chain_id(), %balance, "tank balance low");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use swapx_chain::{ChainPlugin, ChainRegistry, FeeStrategy, Submission, TransferRecord, Utxo};
    use swapx_core::{
        Asset, BrokerConfig, ChainConfig, ChainFamily, ChainId, DealId, EscrowRef, Side,
        SubmittedTx, TxId,
    };
    use swapx_store::BrokerDb;

    struct TestChain {
        config: ChainConfig,
        broker: bool,
        allowances: Mutex<HashMap<(String, String), U256>>,
        confirmations: Mutex<HashMap<String, i64>>,
        balances: Mutex<HashMap<String, U256>>,
    }

    impl TestChain {
        fn new(broker: bool) -> Self {
            Self {
                config: ChainConfig {
                    chain_id: ChainId::new("SEPOLIA"),
                    family: ChainFamily::Evm,
                    rpc_url: "mock".into(),
                    evm_chain_ref: Some(1337),
                    utxo_address_version: None,
                    confirmations: 3,
                    collect_confirmations: 3,
                    operator_address: "0xoperator".into(),
                    broker_address: broker.then(|| "0xbroker".to_string()),
                    explorer_api_key: None,
                    gas_funding_amount: "0.00000000000001".into(),
                    low_tank_threshold: "0.00000000000001".into(),
                    native_decimals: 18,
                    native_usd_rate_cents: 250_000,
                },
                broker,
                allowances: Mutex::new(HashMap::new()),
                confirmations: Mutex::new(HashMap::new()),
                balances: Mutex::new(HashMap::new()),
            }
        }

        fn set_balance(&self, addr: &str, value: u64) {
            self.balances.lock().unwrap().insert(addr.to_string(), U256::from(value));
        }

        fn set_confirmations(&self, txid: &str, confs: i64) {
            self.confirmations.lock().unwrap().insert(txid.to_string(), confs);
        }
    }

    #[async_trait]
    impl ChainPlugin for TestChain {
        fn chain_id(&self) -> &ChainId {
            &self.config.chain_id
        }
        fn family(&self) -> ChainFamily {
            ChainFamily::Evm
        }
        fn config(&self) -> &ChainConfig {
            &self.config
        }
        fn supports_broker(&self) -> bool {
            self.broker
        }
        fn supports_tokens(&self) -> bool {
            true
        }
        fn derive_escrow(&self, index: u64) -> Result<String, SwapxError> {
            Ok(format!("0xesc{index}"))
        }
        fn tank_address(&self) -> &str {
            "0xtank"
        }
        fn is_address_shaped(&self, addr: &str) -> bool {
            addr.starts_with("0x") && addr.len() > 2
        }
        async fn native_balance(&self, addr: &str) -> Result<U256, SwapxError> {
            Ok(self.balances.lock().unwrap().get(addr).copied().unwrap_or_default())
        }
        async fn confirmed_balance(
            &self,
            _asset: &Asset,
            addr: &str,
            _confirmations: u32,
        ) -> Result<U256, SwapxError> {
            self.native_balance(addr).await
        }
        async fn tip_height(&self) -> Result<u64, SwapxError> {
            Ok(100)
        }
        async fn send_from_escrow(
            &self,
            _index: u64,
            _asset: &Asset,
            _to: &str,
            _value: U256,
            _fee: FeeStrategy,
        ) -> Result<Submission, SwapxError> {
            Err(SwapxError::Other("recovery must not submit".into()))
        }
        async fn send_from_tank(&self, _to: &str, _value: U256) -> Result<Submission, SwapxError> {
            Err(SwapxError::Other("recovery must not submit".into()))
        }
        async fn sweep_escrow_native(&self, _index: u64, _to: &str) -> Result<Submission, SwapxError> {
            Err(SwapxError::Other("recovery must not submit".into()))
        }
        async fn estimate_transfer_cost(
            &self,
            _asset: &Asset,
            _from: &str,
            _to: &str,
            _value: U256,
        ) -> Result<U256, SwapxError> {
            Ok(U256::from(100u64))
        }
        async fn allowance(&self, token: &str, owner: &str) -> Result<U256, SwapxError> {
            Ok(self
                .allowances
                .lock()
                .unwrap()
                .get(&(token.to_string(), owner.to_string()))
                .copied()
                .unwrap_or_default())
        }
        async fn tx_confirmations(&self, txid: &TxId) -> Result<i64, SwapxError> {
            Ok(self
                .confirmations
                .lock()
                .unwrap()
                .get(txid.as_str())
                .copied()
                .unwrap_or(0))
        }
        async fn receipt_transfers(&self, _txid: &TxId) -> Result<Vec<TransferRecord>, SwapxError> {
            Ok(vec![])
        }
    }

    struct Fixture {
        mgr: RecoveryManager,
        db: Arc<BrokerDb>,
        chain: Arc<TestChain>,
        _dir: tempfile::TempDir,
    }

    fn fixture(broker: bool) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Arc::new(BrokerDb::open(dir.path()).unwrap());
        let chain = Arc::new(TestChain::new(broker));
        let mut registry = ChainRegistry::new();
        registry.register(chain.clone());
        let registry = Arc::new(registry);
        let config = Arc::new(BrokerConfig {
            master_seed: "11".repeat(32),
            operator_signing_key: "22".repeat(32),
            chains: vec![chain.config.clone()],
            engine_tick_secs: 30,
            recovery_tick_secs: 300,
            lease_ttl_secs: 90,
            stuck_pending_secs: 300,
            stuck_submitted_secs: 600,
            max_recovery_attempts: 3,
            commission_bps: 30,
            unknown_token_commission_usd_cents: 1_000,
            engine_workers: 4,
            rpc_timeout_secs: 15,
            rpc_listen_addr: "127.0.0.1:0".into(),
        });
        let mgr = RecoveryManager::new(db.clone(), registry, config);
        Fixture { mgr, db, chain, _dir: dir }
    }

    fn store_deal(db: &BrokerDb, stage: Stage) -> Deal {
        let chain = ChainId::new("SEPOLIA");
        let side = |token: &str| Side {
            chain_id: chain.clone(),
            asset: Asset::UnknownToken { chain: chain.clone(), address: "0xf00".into() },
            amount: U256::from(1_000u64),
            decimals: 6,
            recipient_addr: Some("0xrecv".into()),
            payback_addr: Some("0xpayback".into()),
            contact: None,
            token: token.into(),
        };
        let deal = Deal {
            id: DealId::random(),
            alice: side("a"),
            bob: side("b"),
            stage,
            created_at: 1_000,
            updated_at: 1_000,
            timeout_secs: 3_600,
            collect_deadline: Some(10_000),
            escrow_alice: EscrowRef { chain_id: chain.clone(), index: 0, address: "0xesc0".into() },
            escrow_bob: EscrowRef { chain_id: chain, index: 1, address: "0xesc1".into() },
        };
        db.create_deal(&deal).unwrap();
        deal
    }

    fn pending_item(deal: &Deal, purpose: Purpose, created_at: Timestamp) -> QueueItem {
        QueueItem {
            id: QueueItemId::random(),
            deal_id: deal.id,
            chain_id: deal.alice.chain_id.clone(),
            purpose,
            from_addr: "0xesc0".into(),
            to_addr: "0xrecv".into(),
            asset: deal.alice.asset.clone(),
            amount: U256::from(1_000u64),
            fee: U256::ZERO,
            phase: Phase::Swap,
            seq: 0,
            status: QueueStatus::Pending,
            submitted_tx: None,
            recovery_attempts: 0,
            last_recovery_at: None,
            recovery_error: Some("transient rpc noise".into()),
            created_at,
        }
    }

    #[test]
    fn stuck_pending_gets_nudged_once() {
        let fx = fixture(false);
        let deal = store_deal(&fx.db, Stage::Swap);
        let item = pending_item(&deal, Purpose::DirectTransfer, 1_000);
        fx.db.append_item(&item).unwrap();

        fx.mgr.repair_stuck_pending(1_000 + 301).unwrap();
        let got = fx.db.get_item(&deal.id, &item.id).unwrap().unwrap();
        assert_eq!(got.recovery_attempts, 1);
        assert_eq!(got.recovery_error, None, "transient error cleared");
        assert_eq!(got.status, QueueStatus::Pending);

        // Within the window of the nudge nothing further happens.
        fx.mgr.repair_stuck_pending(1_000 + 400).unwrap();
        let got = fx.db.get_item(&deal.id, &item.id).unwrap().unwrap();
        assert_eq!(got.recovery_attempts, 1);

        let log = fx.db.recent_recovery_log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].recovery_type, RecoveryType::StuckPending);
    }

    #[test]
    fn fresh_pending_is_left_alone() {
        let fx = fixture(false);
        let deal = store_deal(&fx.db, Stage::Swap);
        let item = pending_item(&deal, Purpose::DirectTransfer, 1_000);
        fx.db.append_item(&item).unwrap();

        fx.mgr.repair_stuck_pending(1_000 + 60).unwrap();
        let got = fx.db.get_item(&deal.id, &item.id).unwrap().unwrap();
        assert_eq!(got.recovery_attempts, 0);
    }

    #[tokio::test]
    async fn stuck_submitted_confirmed_is_promoted() {
        let fx = fixture(false);
        let deal = store_deal(&fx.db, Stage::Swap);
        let mut item = pending_item(&deal, Purpose::DirectTransfer, 1_000);
        item.status = QueueStatus::Submitted;
        item.submitted_tx = Some(SubmittedTx { txid: TxId::new("0xaaa"), submitted_at: 1_000 });
        fx.db.append_item(&item).unwrap();
        fx.chain.set_confirmations("0xaaa", 5);

        fx.mgr.repair_stuck_submitted(1_000 + 601).await.unwrap();
        let got = fx.db.get_item(&deal.id, &item.id).unwrap().unwrap();
        assert_eq!(got.status, QueueStatus::Confirmed);
    }

    #[tokio::test]
    async fn stuck_submitted_dropped_resets_to_pending() {
        let fx = fixture(false);
        let deal = store_deal(&fx.db, Stage::Swap);
        let mut item = pending_item(&deal, Purpose::DirectTransfer, 1_000);
        item.status = QueueStatus::Submitted;
        item.submitted_tx = Some(SubmittedTx { txid: TxId::new("0xbbb"), submitted_at: 1_000 });
        fx.db.append_item(&item).unwrap();
        fx.chain.set_confirmations("0xbbb", -1);

        fx.mgr.repair_stuck_submitted(1_000 + 601).await.unwrap();
        let got = fx.db.get_item(&deal.id, &item.id).unwrap().unwrap();
        assert_eq!(got.status, QueueStatus::Pending);
        assert_eq!(got.recovery_attempts, 1);
        assert!(got.submitted_tx.is_none());
    }

    #[tokio::test]
    async fn recent_submitted_is_not_probed() {
        let fx = fixture(false);
        let deal = store_deal(&fx.db, Stage::Swap);
        let mut item = pending_item(&deal, Purpose::DirectTransfer, 1_000);
        item.status = QueueStatus::Submitted;
        item.submitted_tx = Some(SubmittedTx { txid: TxId::new("0xccc"), submitted_at: 1_000 });
        fx.db.append_item(&item).unwrap();
        fx.chain.set_confirmations("0xccc", -1);

        fx.mgr.repair_stuck_submitted(1_000 + 60).await.unwrap();
        let got = fx.db.get_item(&deal.id, &item.id).unwrap().unwrap();
        assert_eq!(got.status, QueueStatus::Submitted);
    }

    #[test]
    fn malformed_cross_chain_item_fails_out() {
        let fx = fixture(false);
        let deal = store_deal(&fx.db, Stage::Swap);
        let mut item = pending_item(&deal, Purpose::GasRefundToTank, 1_000);
        // UTXO-shaped destination on an EVM chain item.
        item.to_addr = "DGbTankAddressLooksLikeBase58".into();
        fx.db.append_item(&item).unwrap();

        fx.mgr.fail_malformed_items(2_000).unwrap();
        let got = fx.db.get_item(&deal.id, &item.id).unwrap().unwrap();
        assert_eq!(got.status, QueueStatus::Failed);
        assert!(got.recovery_error.unwrap().contains("cross-chain address mismatch"));

        let log = fx.db.recent_recovery_log(10).unwrap();
        assert_eq!(log[0].recovery_type, RecoveryType::MalformedItem);
        assert_eq!(fx.db.events_for_deal(&deal.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_approval_is_re_enqueued_once() {
        let fx = fixture(true);
        let deal = store_deal(&fx.db, Stage::Swap);
        let item = pending_item(&deal, Purpose::BrokerSwap, 1_000);
        fx.db.append_item(&item).unwrap();
        // Escrow has gas but the broker allowance is zero.
        fx.chain.set_balance("0xesc0", 1_000_000);

        fx.mgr.repair_missing_approvals(2_000).await.unwrap();
        let items = fx.db.items_for_deal(&deal.id).unwrap();
        let approvals: Vec<_> =
            items.iter().filter(|i| i.purpose == Purpose::Approval).collect();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].phase, Phase::PreSwap);
        assert_eq!(approvals[0].amount, U256::from(1_000u64));

        // Second pass sees the open approval and does not duplicate it.
        fx.mgr.repair_missing_approvals(2_100).await.unwrap();
        let items = fx.db.items_for_deal(&deal.id).unwrap();
        assert_eq!(items.iter().filter(|i| i.purpose == Purpose::Approval).count(), 1);
    }

    #[tokio::test]
    async fn missing_approval_funds_gas_first_when_escrow_is_dry() {
        let fx = fixture(true);
        let deal = store_deal(&fx.db, Stage::Swap);
        let item = pending_item(&deal, Purpose::BrokerSwap, 1_000);
        fx.db.append_item(&item).unwrap();
        // No native balance at all: gas must come before the approval.

        fx.mgr.repair_missing_approvals(2_000).await.unwrap();
        let items = fx.db.items_for_deal(&deal.id).unwrap();
        let pre: Vec<_> = items
            .iter()
            .filter(|i| i.phase == Phase::PreSwap)
            .map(|i| i.purpose)
            .collect();
        assert_eq!(pre, vec![Purpose::GasFunding, Purpose::Approval]);
    }

    #[tokio::test]
    async fn low_tank_balance_writes_audit_row() {
        let fx = fixture(false);
        // Tank balance of zero is below any threshold.
        fx.mgr.scan_tank_balances(2_000).await.unwrap();
        let log = fx.db.recent_recovery_log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].recovery_type, RecoveryType::LowTankBalance);
    }

    #[tokio::test]
    async fn recovery_never_advances_stage() {
        let fx = fixture(true);
        let deal = store_deal(&fx.db, Stage::Swap);
        let item = pending_item(&deal, Purpose::BrokerSwap, 1_000);
        fx.db.append_item(&item).unwrap();
        fx.chain.set_balance("0xesc0", 1_000_000);
        fx.chain.set_balance("0xtank", 1_000_000_000);

        fx.mgr.repair_missing_approvals(2_000).await.unwrap();
        fx.mgr.repair_stuck_pending(2_000).unwrap();
        fx.mgr.repair_stuck_submitted(2_000).await.unwrap();
        fx.mgr.fail_malformed_items(2_000).unwrap();
        fx.mgr.scan_tank_balances(2_000).await.unwrap();

        assert_eq!(fx.db.get_deal(&deal.id).unwrap().unwrap().stage, Stage::Swap);
    }
}
