//! Settlement and revert planning.
//!
//! Planning is pure: the stage logic gathers on-chain observations first and
//! hands them in, so the emitted queue shape is a deterministic function of
//! (deal, observations). Ordering within a deal follows the fixed recipe:
//! gas funding and approval in PRE_SWAP, principal and commission in SWAP,
//! surplus refund and gas sweep in POST_SWAP.

use alloy_primitives::U256;
use swapx_core::{
    Asset, ChainFamily, ChainId, DealId, Phase, Purpose, QueueItem, QueueItemId, QueueStatus,
    Timestamp,
};

/// Everything the planner needs to know about one side, observed by the
/// stage logic immediately before the `Collection → Swap` transition.
#[derive(Clone, Debug)]
pub(crate) struct SidePlan {
    pub chain_id: ChainId,
    pub family: ChainFamily,
    pub asset: Asset,
    /// Advertised principal.
    pub principal: U256,
    /// Confirmed escrow balance of the traded asset.
    pub observed: U256,
    pub escrow_address: String,
    /// Counterparty's recipient address (on this side's chain).
    pub recipient: String,
    /// This side's payback address.
    pub payback: String,
    pub operator_address: String,
    pub tank_address: String,
    /// Broker settlement available on this chain.
    pub broker: bool,
    /// Escrow native balance cannot cover its outbound transactions.
    pub gas_funding_needed: bool,
    /// Configured tank top-up per funding item.
    pub gas_funding_amount: U256,
    /// In-kind commission (basis-points policy), already clamped to surplus.
    pub commission: U256,
    /// Native-coin commission (fixed-USD policy for unknown tokens).
    pub native_commission: U256,
}

fn item(
    deal_id: DealId,
    chain_id: &ChainId,
    purpose: Purpose,
    from: &str,
    to: &str,
    asset: Asset,
    amount: U256,
    fee: U256,
    phase: Phase,
    seq: u32,
    now: Timestamp,
) -> QueueItem {
    QueueItem {
        id: QueueItemId::random(),
        deal_id,
        chain_id: chain_id.clone(),
        purpose,
        from_addr: from.to_string(),
        to_addr: to.to_string(),
        asset,
        amount,
        fee,
        phase,
        seq,
        status: QueueStatus::Pending,
        submitted_tx: None,
        recovery_attempts: 0,
        last_recovery_at: None,
        recovery_error: None,
        created_at: now,
    }
}

/// Per-phase seq allocator for one deal's planning pass. The two sides
/// share it so seq stays contiguous per (deal, phase) across both chains.
#[derive(Default)]
pub(crate) struct SeqAlloc {
    pre: u32,
    swap: u32,
    post: u32,
}

impl SeqAlloc {
    pub(crate) fn next(&mut self, phase: Phase) -> u32 {
        let slot = match phase {
            Phase::PreSwap => &mut self.pre,
            Phase::Swap => &mut self.swap,
            Phase::PostSwap => &mut self.post,
        };
        let seq = *slot;
        *slot += 1;
        seq
    }

    /// Start from the existing per-phase counts (recovery appends).
    pub(crate) fn starting_at(pre: u32, swap: u32, post: u32) -> Self {
        Self { pre, swap, post }
    }
}

/// Emit the settlement items for one side.
pub(crate) fn plan_side_settlement(
    deal_id: DealId,
    side: &SidePlan,
    seq: &mut SeqAlloc,
    now: Timestamp,
) -> Vec<QueueItem> {
    let mut items = Vec::new();
    let native = Asset::Native { chain: side.chain_id.clone() };
    let surplus = side.observed.saturating_sub(side.principal);

    // 1. Gas funding (EVM only): the escrow pays for its own outbound
    //    transactions, so it must hold native coin first.
    if side.family == ChainFamily::Evm && side.gas_funding_needed {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::GasFunding,
            &side.tank_address,
            &side.escrow_address,
            native.clone(),
            side.gas_funding_amount,
            U256::ZERO,
            Phase::PreSwap,
            seq.next(Phase::PreSwap),
            now,
        ));
    }

    // 2. Approval (token via broker): approve exactly what the broker will
    //    pull — principal plus the in-kind commission.
    let token_via_broker = side.broker && side.asset.token_address().is_some();
    if token_via_broker {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::Approval,
            &side.escrow_address,
            &side.escrow_address,
            side.asset.clone(),
            side.principal + side.commission,
            U256::ZERO,
            Phase::PreSwap,
            seq.next(Phase::PreSwap),
            now,
        ));
    }

    // 3. Principal.
    if side.broker {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::BrokerSwap,
            &side.escrow_address,
            &side.recipient,
            side.asset.clone(),
            side.principal,
            side.commission,
            Phase::Swap,
            seq.next(Phase::Swap),
            now,
        ));
    } else {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::DirectTransfer,
            &side.escrow_address,
            &side.recipient,
            side.asset.clone(),
            side.principal,
            U256::ZERO,
            Phase::Swap,
            seq.next(Phase::Swap),
            now,
        ));
        // 4a. In-kind commission as its own transfer on the direct path.
        if side.commission > U256::ZERO {
            items.push(item(
                deal_id,
                &side.chain_id,
                Purpose::CommissionTransfer,
                &side.escrow_address,
                &side.operator_address,
                side.asset.clone(),
                side.commission,
                U256::ZERO,
                Phase::Swap,
                seq.next(Phase::Swap),
                now,
            ));
        }
    }

    // 4b. Fixed-USD commission in native coin (unknown-token sides).
    if side.native_commission > U256::ZERO {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::CommissionTransfer,
            &side.escrow_address,
            &side.operator_address,
            native.clone(),
            side.native_commission,
            U256::ZERO,
            Phase::Swap,
            seq.next(Phase::Swap),
            now,
        ));
    }

    // 5. Surplus back to the payback address.
    let refund = surplus.saturating_sub(side.commission);
    if refund > U256::ZERO {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::DirectTransfer,
            &side.escrow_address,
            &side.payback,
            side.asset.clone(),
            refund,
            U256::ZERO,
            Phase::PostSwap,
            seq.next(Phase::PostSwap),
            now,
        ));
    }

    // 6. Return leftover native gas to the tank (EVM only).
    if side.family == ChainFamily::Evm {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::GasRefundToTank,
            &side.escrow_address,
            &side.tank_address,
            native,
            U256::ZERO,
            U256::ZERO,
            Phase::PostSwap,
            seq.next(Phase::PostSwap),
            now,
        ));
    }

    items
}

/// Emit the refund items for one funded side of a timed-out deal. No
/// commission is taken on revert.
pub(crate) fn plan_side_revert(
    deal_id: DealId,
    side: &SidePlan,
    seq: &mut SeqAlloc,
    now: Timestamp,
) -> Vec<QueueItem> {
    if side.observed.is_zero() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let native = Asset::Native { chain: side.chain_id.clone() };

    // Token refunds need gas; native refunds pay the fee from the refund
    // itself (sweep semantics).
    let funded = side.family == ChainFamily::Evm
        && side.asset.token_address().is_some()
        && side.gas_funding_needed;
    if funded {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::GasFunding,
            &side.tank_address,
            &side.escrow_address,
            native.clone(),
            side.gas_funding_amount,
            U256::ZERO,
            Phase::PreSwap,
            seq.next(Phase::PreSwap),
            now,
        ));
    }

    items.push(item(
        deal_id,
        &side.chain_id,
        Purpose::DirectTransfer,
        &side.escrow_address,
        &side.payback,
        side.asset.clone(),
        side.observed,
        U256::ZERO,
        Phase::Swap,
        seq.next(Phase::Swap),
        now,
    ));

    if funded {
        items.push(item(
            deal_id,
            &side.chain_id,
            Purpose::GasRefundToTank,
            &side.escrow_address,
            &side.tank_address,
            native,
            U256::ZERO,
            U256::ZERO,
            Phase::PostSwap,
            seq.next(Phase::PostSwap),
            now,
        ));
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_side(chain: &str, family: ChainFamily) -> SidePlan {
        SidePlan {
            chain_id: ChainId::new(chain),
            family,
            asset: Asset::Native { chain: ChainId::new(chain) },
            principal: U256::from(1_000u64),
            observed: U256::from(1_000u64),
            escrow_address: "escrow".into(),
            recipient: "recipient".into(),
            payback: "payback".into(),
            operator_address: "operator".into(),
            tank_address: "tank".into(),
            broker: false,
            gas_funding_needed: false,
            gas_funding_amount: U256::from(10u64),
            commission: U256::ZERO,
            native_commission: U256::ZERO,
        }
    }

    fn purposes(items: &[QueueItem]) -> Vec<Purpose> {
        items.iter().map(|i| i.purpose).collect()
    }

    #[test]
    fn utxo_exact_deposit_plans_single_transfer() {
        let side = base_side("DGB", ChainFamily::Utxo);
        let mut seq = SeqAlloc::default();
        let items = plan_side_settlement(DealId::from_bytes([1; 16]), &side, &mut seq, 0);
        assert_eq!(purposes(&items), vec![Purpose::DirectTransfer]);
        assert_eq!(items[0].amount, U256::from(1_000u64));
        assert_eq!(items[0].to_addr, "recipient");
    }

    #[test]
    fn surplus_funds_commission_and_refund() {
        let mut side = base_side("DGB", ChainFamily::Utxo);
        side.observed = U256::from(1_100u64);
        side.commission = U256::from(3u64); // clamped upstream
        let mut seq = SeqAlloc::default();
        let items = plan_side_settlement(DealId::from_bytes([1; 16]), &side, &mut seq, 0);
        assert_eq!(
            purposes(&items),
            vec![Purpose::DirectTransfer, Purpose::CommissionTransfer, Purpose::DirectTransfer]
        );
        // Principal untouched, commission 3, refund 97.
        assert_eq!(items[0].amount, U256::from(1_000u64));
        assert_eq!(items[1].amount, U256::from(3u64));
        assert_eq!(items[2].amount, U256::from(97u64));
        assert_eq!(items[2].to_addr, "payback");
        assert_eq!(items[2].phase, Phase::PostSwap);
    }

    #[test]
    fn evm_direct_path_brackets_with_gas_items() {
        let mut side = base_side("SEPOLIA", ChainFamily::Evm);
        side.gas_funding_needed = true;
        let mut seq = SeqAlloc::default();
        let items = plan_side_settlement(DealId::from_bytes([2; 16]), &side, &mut seq, 0);
        assert_eq!(
            purposes(&items),
            vec![Purpose::GasFunding, Purpose::DirectTransfer, Purpose::GasRefundToTank]
        );
        assert_eq!(items[0].phase, Phase::PreSwap);
        assert_eq!(items[0].from_addr, "tank");
        assert_eq!(items[2].phase, Phase::PostSwap);
        assert_eq!(items[2].to_addr, "tank");
    }

    #[test]
    fn broker_token_path_plans_approval_and_fee() {
        let mut side = base_side("SEPOLIA", ChainFamily::Evm);
        side.asset = Asset::UnknownToken {
            chain: ChainId::new("SEPOLIA"),
            address: "0xf00".into(),
        };
        side.broker = true;
        side.gas_funding_needed = true;
        side.native_commission = U256::from(77u64);
        let mut seq = SeqAlloc::default();
        let items = plan_side_settlement(DealId::from_bytes([3; 16]), &side, &mut seq, 0);
        assert_eq!(
            purposes(&items),
            vec![
                Purpose::GasFunding,
                Purpose::Approval,
                Purpose::BrokerSwap,
                Purpose::CommissionTransfer,
                Purpose::GasRefundToTank
            ]
        );
        // Approval covers principal + in-kind commission (zero here).
        assert_eq!(items[1].amount, U256::from(1_000u64));
        // Native commission is its own item in native coin.
        assert_eq!(items[3].amount, U256::from(77u64));
        assert!(items[3].asset.is_native());
        // Seq contiguous per phase.
        assert_eq!(items[0].seq, 0);
        assert_eq!(items[1].seq, 1);
        assert_eq!(items[2].seq, 0);
        assert_eq!(items[3].seq, 1);
        assert_eq!(items[4].seq, 0);
    }

    #[test]
    fn both_sides_share_contiguous_seq() {
        let alice = base_side("DGB", ChainFamily::Utxo);
        let mut bob = base_side("SEPOLIA", ChainFamily::Evm);
        bob.gas_funding_needed = true;
        let mut seq = SeqAlloc::default();
        let deal = DealId::from_bytes([4; 16]);
        let mut items = plan_side_settlement(deal, &alice, &mut seq, 0);
        items.extend(plan_side_settlement(deal, &bob, &mut seq, 0));

        for phase in Phase::ALL {
            let mut seqs: Vec<u32> =
                items.iter().filter(|i| i.phase == phase).map(|i| i.seq).collect();
            seqs.sort_unstable();
            let expected: Vec<u32> = (0..seqs.len() as u32).collect();
            assert_eq!(seqs, expected, "phase {phase}");
        }
    }

    #[test]
    fn revert_refunds_without_commission() {
        let mut side = base_side("DGB", ChainFamily::Utxo);
        side.observed = U256::from(500u64);
        side.commission = U256::from(99u64); // must be ignored on revert
        let mut seq = SeqAlloc::default();
        let items = plan_side_revert(DealId::from_bytes([5; 16]), &side, &mut seq, 0);
        assert_eq!(purposes(&items), vec![Purpose::DirectTransfer]);
        assert_eq!(items[0].amount, U256::from(500u64));
        assert_eq!(items[0].to_addr, "payback");
    }

    #[test]
    fn revert_skips_unfunded_side() {
        let mut side = base_side("SEPOLIA", ChainFamily::Evm);
        side.observed = U256::ZERO;
        let mut seq = SeqAlloc::default();
        assert!(plan_side_revert(DealId::from_bytes([6; 16]), &side, &mut seq, 0).is_empty());
    }

    #[test]
    fn evm_token_revert_brackets_with_gas() {
        let mut side = base_side("SEPOLIA", ChainFamily::Evm);
        side.asset = Asset::Token { chain: ChainId::new("SEPOLIA"), address: "0xaa".into() };
        side.observed = U256::from(42u64);
        side.gas_funding_needed = true;
        let mut seq = SeqAlloc::default();
        let items = plan_side_revert(DealId::from_bytes([7; 16]), &side, &mut seq, 0);
        assert_eq!(
            purposes(&items),
            vec![Purpose::GasFunding, Purpose::DirectTransfer, Purpose::GasRefundToTank]
        );
    }
}
