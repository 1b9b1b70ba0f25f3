use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcCreateDealParams, RpcCreatedDeal, RpcDealStatus, RpcDealSummary, RpcFillDetailsParams,
    RpcHealth, RpcRecoveryEntry, RpcVersion,
};

/// SwapX broker JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "swapx_" via `namespace = "swapx"`.
#[rpc(server, namespace = "swapx")]
pub trait SwapxApi {
    /// Create a deal from two advertised sides. Returns the deal id and one
    /// bearer token per party; each token authorizes that party's
    /// `fillPartyDetails` call and nothing else.
    #[method(name = "createDeal")]
    async fn create_deal(&self, params: RpcCreateDealParams) -> RpcResult<RpcCreatedDeal>;

    /// Fill in a party's payback and recipient addresses. Idempotent for an
    /// identical payload.
    #[method(name = "fillPartyDetails")]
    async fn fill_party_details(&self, params: RpcFillDetailsParams) -> RpcResult<()>;

    /// Full deal status: stage, sides, escrows, queue (with classified
    /// receipt transfers on broker items), and the event trail.
    #[method(name = "status")]
    async fn status(&self, deal_id: String) -> RpcResult<RpcDealStatus>;

    /// Paged deal listing, newest first.
    #[method(name = "listDeals")]
    async fn list_deals(&self, offset: u32, limit: u32) -> RpcResult<Vec<RpcDealSummary>>;

    /// Most recent recovery audit rows, newest first.
    #[method(name = "getRecoveryLog")]
    async fn get_recovery_log(&self, limit: u32) -> RpcResult<Vec<RpcRecoveryEntry>>;

    /// Store and chain liveness.
    #[method(name = "health")]
    async fn health(&self) -> RpcResult<RpcHealth>;

    /// Broker build version.
    #[method(name = "version")]
    async fn version(&self) -> RpcResult<RpcVersion>;
}
