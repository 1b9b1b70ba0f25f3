//! Queue item submission.
//!
//! Pulls `Pending` items whose predecessors on the same (deal, chain) are
//! all `Confirmed`, constructs the transaction through the chain plugin,
//! and atomically records the submission. Failures are contained per item
//! and classified by the error taxonomy: transient errors wait for the next
//! tick, chain failures burn a recovery attempt, deterministic misuse fails
//! the item immediately.

use std::collections::BTreeSet;
use std::sync::Arc;

use alloy_primitives::U256;
use tracing::{debug, info, warn};

use swapx_chain::{broker_call_preimage, BrokerRequest, ChainPlugin, FeeStrategy, Submission};
use swapx_core::{
    now_millis, now_secs, Deal, Party, Purpose, QueueItem, QueueStatus, RecoveryLogEntry,
    RecoveryType, SwapxError,
};

use crate::engine::Engine;

impl Engine {
    /// Observe in-flight submissions, then push the next ready item on each
    /// chain. Called for every deal with open queue work.
    pub(crate) async fn drive_queue(&self, deal: &Deal) -> Result<(), SwapxError> {
        self.observe_submitted(deal).await?;
        self.submit_ready(deal).await
    }

    async fn submit_ready(&self, deal: &Deal) -> Result<(), SwapxError> {
        let items = self.db.items_for_deal(&deal.id)?;
        let chains: BTreeSet<_> = items.iter().map(|i| i.chain_id.clone()).collect();

        for chain in chains {
            // items_for_deal is (phase, seq)-ordered; the per-chain
            // subsequence preserves that order.
            for item in items.iter().filter(|i| i.chain_id == chain) {
                match item.status {
                    QueueStatus::Confirmed => continue,
                    // A failed or in-flight item blocks everything behind it
                    // on the same chain.
                    QueueStatus::Failed | QueueStatus::Submitted => break,
                    QueueStatus::Pending => {
                        self.submit_item(deal, item).await?;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Submit one item. Storage errors propagate; chain errors are absorbed
    /// into the item's status per the failure taxonomy.
    async fn submit_item(&self, deal: &Deal, item: &QueueItem) -> Result<(), SwapxError> {
        let plugin = self.registry.get(&item.chain_id)?;

        // Cross-chain sanity: both endpoints must be address-shaped for the
        // item's chain. Malformed items fail out instead of retrying.
        for addr in [&item.from_addr, &item.to_addr] {
            if !plugin.is_address_shaped(addr) {
                self.fail_item(
                    deal,
                    item,
                    &format!("cross-chain address mismatch: {addr} on {}", item.chain_id),
                )?;
                return Ok(());
            }
        }

        match self.dispatch(deal, item, plugin.clone()).await {
            Ok(Some(submission)) => {
                let updated = self.db.mark_submitted(item, submission.txid.clone(), now_secs())?;
                self.db.append_event(
                    &deal.id,
                    now_millis(),
                    format!("{} submitted: {}", updated.purpose, submission.txid),
                )?;
                info!(deal = %deal.id, purpose = %item.purpose, txid = %submission.txid, "item submitted");
            }
            Ok(None) => {
                // Deliberately parked (e.g. tank exhausted). Stays Pending
                // without burning an attempt.
            }
            Err(e) => self.absorb_submit_error(deal, item, e)?,
        }
        Ok(())
    }

    /// Map an item to its chain call. `Ok(None)` parks the item.
    async fn dispatch(
        &self,
        deal: &Deal,
        item: &QueueItem,
        plugin: Arc<dyn ChainPlugin>,
    ) -> Result<Option<Submission>, SwapxError> {
        let fee_strategy = if item.recovery_attempts > 0 {
            FeeStrategy::Priority
        } else {
            FeeStrategy::Normal
        };

        match item.purpose {
            Purpose::GasFunding => {
                let tank_balance = plugin.native_balance(plugin.tank_address()).await?;
                if tank_balance < item.amount {
                    self.note_low_tank(deal, item, tank_balance)?;
                    return Ok(None);
                }
                plugin.send_from_tank(&item.to_addr, item.amount).await.map(Some)
            }

            Purpose::Approval => {
                let token = item
                    .asset
                    .token_address()
                    .ok_or_else(|| SwapxError::UnsupportedAsset(item.asset.canonical()))?;
                let escrow = self.escrow_for_address(deal, &item.from_addr)?;
                plugin.approve_broker(escrow.index, token, item.amount).await.map(Some)
            }

            Purpose::BrokerSwap | Purpose::BrokerRevert | Purpose::BrokerRefund => {
                self.dispatch_broker(deal, item, plugin).await.map(Some)
            }

            Purpose::DirectTransfer | Purpose::CommissionTransfer => {
                let escrow = self.escrow_for_address(deal, &item.from_addr)?;
                if item.asset.is_native() {
                    let balance = plugin.native_balance(&item.from_addr).await?;
                    if item.amount >= balance {
                        // Whole-balance native transfer: the fee comes out
                        // of the transferred value.
                        return plugin
                            .sweep_escrow_native(escrow.index, &item.to_addr)
                            .await
                            .map(Some);
                    }
                }
                plugin
                    .send_from_escrow(
                        escrow.index,
                        &item.asset,
                        &item.to_addr,
                        item.amount,
                        fee_strategy,
                    )
                    .await
                    .map(Some)
            }

            Purpose::GasRefundToTank => {
                let escrow = self.escrow_for_address(deal, &item.from_addr)?;
                plugin.sweep_escrow_native(escrow.index, &item.to_addr).await.map(Some)
            }
        }
    }

    async fn dispatch_broker(
        &self,
        deal: &Deal,
        item: &QueueItem,
        plugin: Arc<dyn ChainPlugin>,
    ) -> Result<Submission, SwapxError> {
        let broker = plugin
            .config()
            .broker_address
            .clone()
            .ok_or_else(|| SwapxError::BrokerNotConfigured(item.chain_id.to_string()))?;
        let escrow = self.escrow_for_address(deal, &item.from_addr)?;
        let party = self.party_for_escrow(deal, &item.from_addr)?;
        let side = deal.side(party);

        let req = BrokerRequest {
            deal_id: deal.id,
            escrow_index: escrow.index,
            token: item.asset.token_address().map(str::to_string),
            payback: side.payback_addr.clone().unwrap_or_default(),
            recipient: item.to_addr.clone(),
            fee_recipient: plugin.config().operator_address.clone(),
            amount: item.amount,
            fee: item.fee,
        };
        let preimage = broker_call_preimage(&broker, &escrow.address, &req)?;
        let signature = self.operator.sign_personal(&preimage)?;

        match item.purpose {
            Purpose::BrokerSwap => plugin.swap_via_broker(&req, &signature).await,
            Purpose::BrokerRevert => plugin.revert_via_broker(&req, &signature).await,
            Purpose::BrokerRefund => plugin.refund_via_broker(&req, &signature).await,
            _ => unreachable!("dispatch_broker called for non-broker purpose"),
        }
    }

    // ── Failure classification ───────────────────────────────────────────────

    fn absorb_submit_error(
        &self,
        deal: &Deal,
        item: &QueueItem,
        error: SwapxError,
    ) -> Result<(), SwapxError> {
        if error.is_transient() {
            debug!(deal = %deal.id, purpose = %item.purpose, error = %error,
                   "transient submit failure; retrying next tick");
            return Ok(());
        }

        if error.is_deterministic() {
            return self.fail_item(deal, item, &error.to_string());
        }

        match &error {
            // Invariant violations fail loudly: never downgrade a deal that
            // was planned for broker settlement.
            SwapxError::BrokerNotConfigured(_) | SwapxError::UnknownChain(_) => {
                self.fail_item(deal, item, &error.to_string())
            }
            // A dusty sweep has nothing worth returning; close it out.
            SwapxError::InsufficientFunds { .. }
                if item.purpose == Purpose::GasRefundToTank =>
            {
                self.fail_item(deal, item, &format!("residual below sweep fee: {error}"))
            }
            // Escrow cannot pay after funding: park without burning attempts.
            SwapxError::InsufficientFunds { .. } => {
                let mut updated = item.clone();
                updated.recovery_error = Some(error.to_string());
                self.db.put_item(&updated)?;
                self.db.append_event(
                    &deal.id,
                    now_millis(),
                    format!("{} parked: {error}", item.purpose),
                )?;
                Ok(())
            }
            _ => self.bump_attempts(deal, item, &error.to_string()),
        }
    }

    /// Count a failed attempt; at the ceiling the item needs a human.
    pub(crate) fn bump_attempts(
        &self,
        deal: &Deal,
        item: &QueueItem,
        error: &str,
    ) -> Result<(), SwapxError> {
        let mut updated = item.clone();
        updated.recovery_attempts += 1;
        updated.last_recovery_at = Some(now_secs());
        updated.recovery_error = Some(error.to_string());
        updated.submitted_tx = None;
        if updated.recovery_attempts >= self.config.max_recovery_attempts {
            updated.status = QueueStatus::Failed;
        } else {
            updated.status = QueueStatus::Pending;
        }
        self.db.put_item(&updated)?;
        self.db.append_event(
            &deal.id,
            now_millis(),
            format!(
                "{} attempt {} failed: {error}{}",
                item.purpose,
                updated.recovery_attempts,
                if updated.status == QueueStatus::Failed { "; item FAILED" } else { "" }
            ),
        )?;
        warn!(deal = %deal.id, purpose = %item.purpose, attempts = updated.recovery_attempts,
              %error, "item attempt failed");
        Ok(())
    }

    pub(crate) fn fail_item(
        &self,
        deal: &Deal,
        item: &QueueItem,
        error: &str,
    ) -> Result<(), SwapxError> {
        let mut updated = item.clone();
        updated.status = QueueStatus::Failed;
        updated.recovery_error = Some(error.to_string());
        updated.last_recovery_at = Some(now_secs());
        self.db.put_item(&updated)?;
        self.db
            .append_event(&deal.id, now_millis(), format!("{} FAILED: {error}", item.purpose))?;
        warn!(deal = %deal.id, purpose = %item.purpose, %error, "item failed");
        Ok(())
    }

    fn note_low_tank(
        &self,
        deal: &Deal,
        item: &QueueItem,
        tank_balance: U256,
    ) -> Result<(), SwapxError> {
        self.db.append_recovery_log(RecoveryLogEntry {
            id: 0,
            deal_id: Some(deal.id),
            recovery_type: RecoveryType::LowTankBalance,
            chain_id: item.chain_id.clone(),
            action: "gas funding deferred".into(),
            success: false,
            error: Some(format!(
                "tank balance {tank_balance} below funding amount {}",
                item.amount
            )),
            metadata: serde_json::json!({ "item": item.id.to_hex() }),
            created_at: now_secs(),
        })?;
        self.db.append_event(
            &deal.id,
            now_millis(),
            format!("gas funding deferred: tank balance {tank_balance} too low"),
        )?;
        warn!(deal = %deal.id, chain = %item.chain_id, "tank too low for gas funding");
        Ok(())
    }

    // ── Escrow resolution ────────────────────────────────────────────────────

    pub(crate) fn party_for_escrow(&self, deal: &Deal, addr: &str) -> Result<Party, SwapxError> {
        if deal.escrow_alice.address == addr {
            Ok(Party::Alice)
        } else if deal.escrow_bob.address == addr {
            Ok(Party::Bob)
        } else {
            Err(SwapxError::Other(format!(
                "address {addr} is not an escrow of deal {}",
                deal.id
            )))
        }
    }

    fn escrow_for_address<'d>(
        &self,
        deal: &'d Deal,
        addr: &str,
    ) -> Result<&'d swapx_core::EscrowRef, SwapxError> {
        let party = self.party_for_escrow(deal, addr)?;
        Ok(deal.escrow(party))
    }
}
