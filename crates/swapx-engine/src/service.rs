//! Deal creation and party-detail intake.
//!
//! This is the write side of the external API: the RPC server parses JSON
//! and delegates here. Escrows are allocated at creation time from the
//! per-family index counters, so a deal's deposit addresses are known the
//! moment it exists.

use std::sync::Arc;

use alloy_primitives::U256;
use tracing::info;

use swapx_chain::ChainRegistry;
use swapx_core::{
    amount::parse_units, now_millis, now_secs, Asset, BrokerConfig, Deal, DealId, EscrowRef,
    Party, Side, Stage, SwapxError,
};
use swapx_store::BrokerDb;

/// One side of a deal-creation request.
#[derive(Clone, Debug)]
pub struct SideParams {
    pub chain_id: String,
    /// Canonical asset string, e.g. `SEPOLIA:ERC20:0x…`.
    pub asset: String,
    /// Exact decimal amount, e.g. `"0.05"`.
    pub amount: String,
}

#[derive(Clone, Debug)]
pub struct CreateDealParams {
    pub alice: SideParams,
    pub bob: SideParams,
    pub timeout_secs: i64,
}

/// Result of deal creation: the id plus the two bearer tokens.
#[derive(Clone, Debug)]
pub struct CreatedDeal {
    pub deal_id: DealId,
    pub alice_token: String,
    pub bob_token: String,
}

pub struct DealService {
    db: Arc<BrokerDb>,
    registry: Arc<ChainRegistry>,
    config: Arc<BrokerConfig>,
}

fn bearer_token() -> String {
    let mut bytes = [0u8; 24];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    hex::encode(bytes)
}

impl DealService {
    pub fn new(db: Arc<BrokerDb>, registry: Arc<ChainRegistry>, config: Arc<BrokerConfig>) -> Self {
        Self { db, registry, config }
    }

    /// Create a deal: validate both sides, allocate escrow indices, derive
    /// the deposit addresses, and persist in `Created`.
    pub async fn create_deal(&self, params: CreateDealParams) -> Result<CreatedDeal, SwapxError> {
        if params.timeout_secs <= 0 {
            return Err(SwapxError::Config("timeoutSeconds must be positive".into()));
        }
        let (alice, escrow_alice) = self.build_side(&params.alice).await?;
        let (bob, escrow_bob) = self.build_side(&params.bob).await?;

        let now = now_secs();
        let deal = Deal {
            id: DealId::random(),
            alice,
            bob,
            stage: Stage::Created,
            created_at: now,
            updated_at: now,
            timeout_secs: params.timeout_secs,
            collect_deadline: None,
            escrow_alice,
            escrow_bob,
        };
        self.db.create_deal(&deal)?;
        self.db.append_event(
            &deal.id,
            now_millis(),
            format!(
                "deal created: {} {} ↔ {} {}",
                deal.alice.asset.canonical(),
                deal.alice.amount,
                deal.bob.asset.canonical(),
                deal.bob.amount
            ),
        )?;
        info!(deal = %deal.id, "deal created");

        Ok(CreatedDeal {
            deal_id: deal.id,
            alice_token: deal.alice.token,
            bob_token: deal.bob.token,
        })
    }

    async fn build_side(&self, params: &SideParams) -> Result<(Side, EscrowRef), SwapxError> {
        let chain_id = swapx_core::ChainId::new(params.chain_id.clone());
        let plugin = self.registry.get(&chain_id)?;
        let asset = Asset::parse(&params.asset)?;
        if asset.chain() != &chain_id {
            return Err(SwapxError::UnsupportedAsset(format!(
                "asset {} does not live on chain {chain_id}",
                asset.canonical()
            )));
        }
        if asset.token_address().is_some() && !plugin.supports_tokens() {
            return Err(SwapxError::UnsupportedAsset(asset.canonical()));
        }

        let decimals = match asset.token_address() {
            None => plugin.config().native_decimals,
            Some(token) => plugin.token_decimals(token).await?,
        };
        let amount = parse_units(&params.amount, decimals)?;
        if amount == U256::ZERO {
            return Err(SwapxError::ZeroAmount);
        }

        let index = self.db.next_escrow_index(plugin.family())?;
        let address = plugin.derive_escrow(index)?;
        let side = Side {
            chain_id: chain_id.clone(),
            asset,
            amount,
            decimals,
            recipient_addr: None,
            payback_addr: None,
            contact: None,
            token: bearer_token(),
        };
        let escrow = EscrowRef { chain_id, index, address };
        Ok((side, escrow))
    }

    /// Fill in one party's addresses, authorized by its bearer token.
    /// Idempotent for an identical payload; conflicting resubmission is an
    /// error.
    pub fn fill_party_details(
        &self,
        deal_id: &DealId,
        token: &str,
        payback_addr: &str,
        recipient_addr: &str,
        contact: Option<String>,
    ) -> Result<Party, SwapxError> {
        let mut deal = self
            .db
            .get_deal(deal_id)?
            .ok_or_else(|| SwapxError::UnknownDeal(deal_id.to_hex()))?;
        if deal.stage.is_terminal() {
            return Err(SwapxError::DealTerminal);
        }
        let party = deal.party_for_token(token).ok_or(SwapxError::Unauthorized)?;

        // Payback lives on the party's own chain; the recipient address is
        // where the counterparty's asset lands, so it lives on the other
        // side's chain.
        let own_chain = self.registry.get(&deal.side(party).chain_id)?;
        let other_chain = self.registry.get(&deal.side(party.other()).chain_id)?;
        if !own_chain.is_address_shaped(payback_addr) {
            return Err(SwapxError::AddressChainMismatch {
                chain: own_chain.chain_id().to_string(),
                addr: payback_addr.to_string(),
            });
        }
        if !other_chain.is_address_shaped(recipient_addr) {
            return Err(SwapxError::AddressChainMismatch {
                chain: other_chain.chain_id().to_string(),
                addr: recipient_addr.to_string(),
            });
        }

        let side = deal.side_mut(party);
        if side.details_filled() {
            let same = side.payback_addr.as_deref() == Some(payback_addr)
                && side.recipient_addr.as_deref() == Some(recipient_addr);
            return if same { Ok(party) } else { Err(SwapxError::DetailsConflict) };
        }

        side.payback_addr = Some(payback_addr.to_string());
        side.recipient_addr = Some(recipient_addr.to_string());
        side.contact = contact;
        deal.updated_at = now_secs();
        self.db.put_deal(&deal)?;
        self.db.append_event(
            deal_id,
            now_millis(),
            format!("{party} filled in payback and recipient addresses"),
        )?;
        Ok(party)
    }
}
