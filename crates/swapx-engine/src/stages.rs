//! Deal state machine transitions.

use alloy_primitives::U256;
use tracing::info;

use swapx_core::{
    amount::bps_of, now_millis, now_secs, CommissionPolicy, Deal, DealId, Party, Phase,
    QueueStatus, Stage, SwapxError, GAS_HEADROOM_DEN, GAS_HEADROOM_NUM,
};

use crate::engine::Engine;
use crate::oracle::usd_commission_in_native;
use crate::planner::{plan_side_revert, plan_side_settlement, SeqAlloc, SidePlan};

impl Engine {
    pub(crate) async fn advance_deal(&self, deal_id: DealId) -> Result<(), SwapxError> {
        // Rehydrate from the store: nothing authoritative survives a tick.
        let deal = self
            .db
            .get_deal(&deal_id)?
            .ok_or_else(|| SwapxError::UnknownDeal(deal_id.to_hex()))?;

        match deal.stage {
            Stage::Created => self.advance_created(deal).await,
            Stage::Collection => self.advance_collection(deal).await,
            Stage::Swap => self.advance_swap(deal).await,
            // Terminal stages only drive their remaining queue items.
            Stage::Reverted => self.drive_queue(&deal).await,
            Stage::Closed | Stage::ExpiredNoDetails => Ok(()),
        }
    }

    // ── CREATED ──────────────────────────────────────────────────────────────

    async fn advance_created(&self, mut deal: Deal) -> Result<(), SwapxError> {
        let now = now_secs();
        if deal.both_details_filled() {
            // Entering Collection fixes the deadline once, forever.
            deal.stage = Stage::Collection;
            deal.collect_deadline = Some(now + deal.timeout_secs);
            deal.updated_at = now;
            self.db.put_deal(&deal)?;
            self.db.append_event(
                &deal.id,
                now_millis(),
                format!(
                    "collection started; deadline {}",
                    deal.collect_deadline.unwrap_or_default()
                ),
            )?;
            info!(deal = %deal.id, "deal entered COLLECTION");
            return Ok(());
        }

        if deal.deadline_passed(now) {
            // Nobody supplied addresses: nothing was deposited, nothing to
            // refund.
            deal.stage = Stage::ExpiredNoDetails;
            deal.updated_at = now;
            self.db.put_deal(&deal)?;
            self.db
                .append_event(&deal.id, now_millis(), "expired before details were filled")?;
            info!(deal = %deal.id, "deal EXPIRED_NO_DETAILS");
        }
        Ok(())
    }

    // ── COLLECTION ───────────────────────────────────────────────────────────

    async fn advance_collection(&self, mut deal: Deal) -> Result<(), SwapxError> {
        let now = now_secs();
        let alice_observed = self.observe_deposit(&deal, Party::Alice).await?;
        let bob_observed = self.observe_deposit(&deal, Party::Bob).await?;

        let alice_funded = alice_observed >= deal.alice.amount;
        let bob_funded = bob_observed >= deal.bob.amount;

        if alice_funded && bob_funded {
            return self.enter_swap(deal, alice_observed, bob_observed).await;
        }

        if deal.deadline_passed(now) {
            // Timeout with at least one side unfunded: refund whatever was
            // actually collected, confirmed or not yet.
            let alice_balance = self.latest_balance(&deal, Party::Alice).await?;
            let bob_balance = self.latest_balance(&deal, Party::Bob).await?;

            let mut seq = self.seq_alloc_for(&deal.id)?;
            let mut items = Vec::new();
            for (party, balance) in [(Party::Alice, alice_balance), (Party::Bob, bob_balance)] {
                let plan = self.side_plan(&deal, party, balance, U256::ZERO, U256::ZERO).await?;
                items.extend(plan_side_revert(deal.id, &plan, &mut seq, now));
            }

            deal.stage = Stage::Reverted;
            deal.updated_at = now;
            self.db.apply_transition(&deal, &items)?;
            self.db.append_event(
                &deal.id,
                now_millis(),
                format!(
                    "collection deadline passed (alice funded: {alice_funded}, bob funded: {bob_funded}); deal reverted with {} refund item(s)",
                    items.len()
                ),
            )?;
            info!(deal = %deal.id, "deal REVERTED on timeout");
            // Refund submissions happen on subsequent ticks via drive_queue.
        }
        Ok(())
    }

    async fn enter_swap(
        &self,
        mut deal: Deal,
        alice_observed: U256,
        bob_observed: U256,
    ) -> Result<(), SwapxError> {
        let now = now_secs();

        // Re-entry after a reorg rollback: the queue was already planned.
        // Flip the stage back and let the submitter continue.
        let existing = self.db.items_for_deal(&deal.id)?;
        let items = if existing.is_empty() {
            let mut seq = SeqAlloc::default();
            let mut items = Vec::new();
            for (party, observed) in [(Party::Alice, alice_observed), (Party::Bob, bob_observed)] {
                let (commission, native_commission) =
                    self.commission_for(&deal, party, observed).await?;
                let plan = self
                    .side_plan(&deal, party, observed, commission, native_commission)
                    .await?;
                items.extend(plan_side_settlement(deal.id, &plan, &mut seq, now));
            }
            items
        } else {
            Vec::new()
        };

        deal.stage = Stage::Swap;
        deal.updated_at = now;
        self.db.apply_transition(&deal, &items)?;
        self.db.append_event(
            &deal.id,
            now_millis(),
            format!(
                "both deposits confirmed (alice {}, bob {}); settlement planned with {} item(s)",
                alice_observed, bob_observed, items.len()
            ),
        )?;
        info!(deal = %deal.id, "deal entered SWAP");
        Ok(())
    }

    // ── SWAP ─────────────────────────────────────────────────────────────────

    async fn advance_swap(&self, mut deal: Deal) -> Result<(), SwapxError> {
        // Reorg tolerance: confirmations are re-checked every tick. Once any
        // SWAP-phase submission exists the deal is committed and settles by
        // retry; before that, a vanished deposit rolls the stage back.
        if !self.db.swap_submission_started(&deal.id)? {
            let alice_observed = self.observe_deposit(&deal, Party::Alice).await?;
            let bob_observed = self.observe_deposit(&deal, Party::Bob).await?;
            if alice_observed < deal.alice.amount || bob_observed < deal.bob.amount {
                deal.stage = Stage::Collection;
                deal.updated_at = now_secs();
                self.db.put_deal(&deal)?;
                self.db.append_event(
                    &deal.id,
                    now_millis(),
                    "deposit confirmations dropped below threshold (reorg); back to collection",
                )?;
                info!(deal = %deal.id, "reorg rollback SWAP → COLLECTION");
                return Ok(());
            }
        }

        self.drive_queue(&deal).await?;

        // Close once settlement is fully confirmed. A failed gas sweep is
        // residue bookkeeping, not settlement; it never holds a deal open.
        let items = self.db.items_for_deal(&deal.id)?;
        let all_terminal = !items.is_empty() && items.iter().all(|i| i.status.is_terminal());
        let settled = items.iter().all(|i| {
            i.status == QueueStatus::Confirmed
                || (i.status == QueueStatus::Failed
                    && i.purpose == swapx_core::Purpose::GasRefundToTank)
        });
        if all_terminal && settled {
            deal.stage = Stage::Closed;
            deal.updated_at = now_secs();
            self.db.put_deal(&deal)?;
            self.db.append_event(&deal.id, now_millis(), "settlement confirmed; deal closed")?;
            info!(deal = %deal.id, "deal CLOSED");
        }
        Ok(())
    }

    // ── Observation helpers ──────────────────────────────────────────────────

    /// Confirmed balance of the side's traded asset in its escrow.
    pub(crate) async fn observe_deposit(
        &self,
        deal: &Deal,
        party: Party,
    ) -> Result<U256, SwapxError> {
        let side = deal.side(party);
        let escrow = deal.escrow(party);
        let plugin = self.registry.get(&side.chain_id)?;
        plugin
            .confirmed_balance(
                &side.asset,
                &escrow.address,
                plugin.config().collect_confirmations,
            )
            .await
    }

    /// Tip balance (unconfirmed included) used for revert refunds.
    async fn latest_balance(&self, deal: &Deal, party: Party) -> Result<U256, SwapxError> {
        let side = deal.side(party);
        let escrow = deal.escrow(party);
        let plugin = self.registry.get(&side.chain_id)?;
        match side.asset.token_address() {
            None => plugin.native_balance(&escrow.address).await,
            Some(token) => plugin.token_balance(token, &escrow.address).await,
        }
    }

    /// Commission owed by one side given its observed deposit.
    /// In-kind commission comes from surplus only and is clamped to it;
    /// fixed-USD commission is collected in native coin.
    async fn commission_for(
        &self,
        deal: &Deal,
        party: Party,
        observed: U256,
    ) -> Result<(U256, U256), SwapxError> {
        let side = deal.side(party);
        match side.asset.commission_policy() {
            CommissionPolicy::PrincipalBps => {
                let due = bps_of(side.amount, self.config.commission_bps);
                let surplus = observed.saturating_sub(side.amount);
                Ok((due.min(surplus), U256::ZERO))
            }
            CommissionPolicy::FixedUsdNative => {
                let plugin = self.registry.get(&side.chain_id)?;
                let decimals = plugin.config().native_decimals;
                let rate = self
                    .oracle
                    .native_usd_cents(&side.chain_id)
                    .unwrap_or(plugin.config().native_usd_rate_cents);
                let fee = usd_commission_in_native(
                    self.config.unknown_token_commission_usd_cents,
                    rate,
                    decimals,
                );
                Ok((U256::ZERO, fee))
            }
        }
    }

    /// Build the planner input for one side, probing the chain for gas
    /// requirements.
    async fn side_plan(
        &self,
        deal: &Deal,
        party: Party,
        observed: U256,
        commission: U256,
        native_commission: U256,
    ) -> Result<SidePlan, SwapxError> {
        let side = deal.side(party);
        let counterparty = deal.side(party.other());
        let escrow = deal.escrow(party);
        let plugin = self.registry.get(&side.chain_id)?;
        let chain_config = plugin.config();

        let recipient = counterparty
            .recipient_addr
            .clone()
            .unwrap_or_default();
        let payback = side.payback_addr.clone().unwrap_or_default();

        // Native the escrow must be able to spend: the traded value itself
        // (native assets), the fixed-USD commission, plus gas headroom.
        let gas_funding_needed = if plugin.family() == swapx_core::ChainFamily::Evm {
            let native_balance = plugin.native_balance(&escrow.address).await?;
            let est = plugin
                .estimate_transfer_cost(&side.asset, &escrow.address, &recipient, side.amount)
                .await?;
            let headroom = est * U256::from(GAS_HEADROOM_NUM) / U256::from(GAS_HEADROOM_DEN);
            let native_outflow = if side.asset.is_native() { observed } else { U256::ZERO };
            native_balance < native_outflow + native_commission + headroom
        } else {
            false
        };

        Ok(SidePlan {
            chain_id: side.chain_id.clone(),
            family: plugin.family(),
            asset: side.asset.clone(),
            principal: side.amount,
            observed,
            escrow_address: escrow.address.clone(),
            recipient,
            payback,
            operator_address: chain_config.operator_address.clone(),
            tank_address: plugin.tank_address().to_string(),
            broker: plugin.supports_broker(),
            gas_funding_needed,
            gas_funding_amount: swapx_core::amount::parse_units(
                &chain_config.gas_funding_amount,
                chain_config.native_decimals,
            )?,
            commission,
            native_commission,
        })
    }

    /// Seq allocator continuing after any items the deal already has.
    fn seq_alloc_for(&self, deal_id: &DealId) -> Result<SeqAlloc, SwapxError> {
        Ok(SeqAlloc::starting_at(
            self.db.next_seq(deal_id, Phase::PreSwap)?,
            self.db.next_seq(deal_id, Phase::Swap)?,
            self.db.next_seq(deal_id, Phase::PostSwap)?,
        ))
    }
}
