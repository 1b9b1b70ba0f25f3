use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use swapx_chain::{classify_transfers, ChainRegistry, TransferKind};
use swapx_core::{amount::format_units, Deal, DealId, QueueItem, Side, SwapxError};
use swapx_engine::{CreateDealParams, DealService, SideParams};
use swapx_store::BrokerDb;

use crate::api::SwapxApiServer;
use crate::types::{
    RpcChainHealth, RpcCreateDealParams, RpcCreatedDeal, RpcDealStatus, RpcDealSummary,
    RpcEscrow, RpcEvent, RpcFillDetailsParams, RpcHealth, RpcQueueItem, RpcRecoveryEntry,
    RpcSide, RpcTransfer, RpcVersion,
};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn map_err(e: SwapxError) -> ErrorObject<'static> {
    let code = match &e {
        SwapxError::UnknownDeal(_) => -32001,
        SwapxError::Unauthorized => -32002,
        SwapxError::DetailsConflict => -32003,
        SwapxError::DealTerminal => -32004,
        SwapxError::MalformedAmount(_) | SwapxError::MalformedAsset(_) => -32005,
        SwapxError::AddressChainMismatch { .. } => -32006,
        SwapxError::UnknownChain(_) | SwapxError::UnsupportedAsset(_) => -32007,
        SwapxError::ZeroAmount => -32008,
        _ => -32000,
    };
    rpc_err(code, e.to_string())
}

/// Shared state behind the RPC server.
pub struct RpcServerState {
    pub db: Arc<BrokerDb>,
    pub registry: Arc<ChainRegistry>,
    pub service: Arc<DealService>,
}

pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

// ── DTO conversion helpers ───────────────────────────────────────────────────

fn side_to_rpc(side: &Side) -> RpcSide {
    RpcSide {
        chain_id: side.chain_id.to_string(),
        asset: side.asset.canonical(),
        amount: format_units(side.amount, side.decimals),
        recipient_address: side.recipient_addr.clone(),
        payback_address: side.payback_addr.clone(),
        contact: side.contact.clone(),
    }
}

fn kind_str(kind: TransferKind) -> &'static str {
    match kind {
        TransferKind::Swap => "swap",
        TransferKind::Fee => "fee",
        TransferKind::Refund => "refund",
    }
}

impl RpcServerState {
    fn load_deal(&self, deal_id: &str) -> Result<Deal, SwapxError> {
        let id = DealId::from_hex(deal_id)
            .map_err(|_| SwapxError::UnknownDeal(deal_id.to_string()))?;
        self.db
            .get_deal(&id)?
            .ok_or_else(|| SwapxError::UnknownDeal(deal_id.to_string()))
    }

    /// Convert a queue item, reconstructing classified transfers from the
    /// receipt for broker purposes.
    async fn item_to_rpc(&self, item: &QueueItem) -> RpcQueueItem {
        let mut rpc = RpcQueueItem {
            id: item.id.to_hex(),
            chain_id: item.chain_id.to_string(),
            purpose: item.purpose.as_str().to_string(),
            phase: item.phase.as_str().to_string(),
            seq: item.seq,
            from_addr: item.from_addr.clone(),
            to_addr: item.to_addr.clone(),
            asset: item.asset.canonical(),
            amount: item.amount.to_string(),
            status: item.status.as_str().to_string(),
            txid: item.submitted_tx.as_ref().map(|s| s.txid.to_string()),
            submitted_at: item.submitted_tx.as_ref().map(|s| s.submitted_at),
            recovery_attempts: item.recovery_attempts,
            recovery_error: item.recovery_error.clone(),
            erc20_transfers: None,
            internal_transactions: None,
        };

        if !item.purpose.is_broker() {
            return rpc;
        }
        let Some(submitted) = &item.submitted_tx else {
            return rpc;
        };
        let Ok(plugin) = self.registry.get(&item.chain_id) else {
            return rpc;
        };
        let Ok(records) = plugin.receipt_transfers(&submitted.txid).await else {
            // Receipt lookup failures degrade the response, not the call.
            return rpc;
        };

        let to_rpc = |kind: TransferKind, r: &swapx_chain::TransferRecord| RpcTransfer {
            kind: kind_str(kind).to_string(),
            from: r.from.clone(),
            to: r.to.clone(),
            value: r.value.to_string(),
        };
        rpc.erc20_transfers = Some(
            classify_transfers(&records, item.asset.token_address())
                .iter()
                .filter(|c| c.record.token.is_some())
                .map(|c| to_rpc(c.kind, &c.record))
                .collect(),
        );
        rpc.internal_transactions = Some(
            classify_transfers(&records, None)
                .iter()
                .map(|c| to_rpc(c.kind, &c.record))
                .collect(),
        );
        rpc
    }
}

#[async_trait]
impl SwapxApiServer for RpcServer {
    async fn create_deal(&self, params: RpcCreateDealParams) -> RpcResult<RpcCreatedDeal> {
        let created = self
            .state
            .service
            .create_deal(CreateDealParams {
                alice: SideParams {
                    chain_id: params.alice.chain_id,
                    asset: params.alice.asset,
                    amount: params.alice.amount,
                },
                bob: SideParams {
                    chain_id: params.bob.chain_id,
                    asset: params.bob.asset,
                    amount: params.bob.amount,
                },
                timeout_secs: params.timeout_seconds,
            })
            .await
            .map_err(map_err)?;
        Ok(RpcCreatedDeal {
            deal_id: created.deal_id.to_hex(),
            alice_token: created.alice_token,
            bob_token: created.bob_token,
        })
    }

    async fn fill_party_details(&self, params: RpcFillDetailsParams) -> RpcResult<()> {
        let deal_id = DealId::from_hex(&params.deal_id)
            .map_err(|_| rpc_err(-32001, format!("unknown deal: {}", params.deal_id)))?;
        self.state
            .service
            .fill_party_details(
                &deal_id,
                &params.token,
                &params.payback_address,
                &params.recipient_address,
                params.contact,
            )
            .map_err(map_err)?;
        Ok(())
    }

    async fn status(&self, deal_id: String) -> RpcResult<RpcDealStatus> {
        let deal = self.state.load_deal(&deal_id).map_err(map_err)?;
        let items = self.state.db.items_for_deal(&deal.id).map_err(map_err)?;
        let events = self.state.db.events_for_deal(&deal.id).map_err(map_err)?;

        let mut queue = Vec::with_capacity(items.len());
        for item in &items {
            queue.push(self.state.item_to_rpc(item).await);
        }

        Ok(RpcDealStatus {
            deal_id: deal.id.to_hex(),
            stage: deal.stage.as_str().to_string(),
            alice: side_to_rpc(&deal.alice),
            bob: side_to_rpc(&deal.bob),
            escrows: vec![
                RpcEscrow {
                    chain_id: deal.escrow_alice.chain_id.to_string(),
                    index: deal.escrow_alice.index,
                    address: deal.escrow_alice.address.clone(),
                },
                RpcEscrow {
                    chain_id: deal.escrow_bob.chain_id.to_string(),
                    index: deal.escrow_bob.index,
                    address: deal.escrow_bob.address.clone(),
                },
            ],
            queue,
            events: events
                .into_iter()
                .map(|e| RpcEvent { at_ms: e.at_ms, message: e.message })
                .collect(),
            created_at: deal.created_at,
            collect_deadline: deal.collect_deadline,
        })
    }

    async fn list_deals(&self, offset: u32, limit: u32) -> RpcResult<Vec<RpcDealSummary>> {
        let mut deals = self.state.db.iter_deals().map_err(map_err)?;
        deals.sort_by_key(|d| std::cmp::Reverse(d.created_at));
        Ok(deals
            .into_iter()
            .skip(offset as usize)
            .take(limit.min(200) as usize)
            .map(|d| RpcDealSummary {
                deal_id: d.id.to_hex(),
                stage: d.stage.as_str().to_string(),
                created_at: d.created_at,
                updated_at: d.updated_at,
            })
            .collect())
    }

    async fn get_recovery_log(&self, limit: u32) -> RpcResult<Vec<RpcRecoveryEntry>> {
        Ok(self
            .state
            .db
            .recent_recovery_log(limit.min(500) as usize)
            .map_err(map_err)?
            .into_iter()
            .map(|e| RpcRecoveryEntry {
                id: e.id,
                deal_id: e.deal_id.map(|d| d.to_hex()),
                recovery_type: e.recovery_type.as_str().to_string(),
                chain_id: e.chain_id.to_string(),
                action: e.action,
                success: e.success,
                error: e.error,
                metadata: e.metadata,
                created_at: e.created_at,
            })
            .collect())
    }

    async fn health(&self) -> RpcResult<RpcHealth> {
        let chains = self
            .state
            .registry
            .health_check()
            .await
            .into_iter()
            .map(|(chain_id, result)| match result {
                Ok(tip) => RpcChainHealth {
                    chain_id: chain_id.to_string(),
                    tip_height: Some(tip),
                    error: None,
                },
                Err(e) => RpcChainHealth {
                    chain_id: chain_id.to_string(),
                    tip_height: None,
                    error: Some(e.to_string()),
                },
            })
            .collect::<Vec<_>>();
        let healthy = self.state.db.healthy() && chains.iter().all(|c| c.error.is_none());
        Ok(RpcHealth { healthy, chains })
    }

    async fn version(&self) -> RpcResult<RpcVersion> {
        Ok(RpcVersion { version: env!("CARGO_PKG_VERSION").to_string() })
    }
}
