use serde::{Deserialize, Serialize};

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSideParams {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    /// Canonical asset string, e.g. `SEPOLIA:ERC20:0x…`.
    pub asset: String,
    /// Exact decimal amount, e.g. `"0.05"`.
    pub amount: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCreateDealParams {
    pub alice: RpcSideParams,
    pub bob: RpcSideParams,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcFillDetailsParams {
    #[serde(rename = "dealId")]
    pub deal_id: String,
    /// The party's bearer token from deal creation.
    pub token: String,
    #[serde(rename = "paybackAddress")]
    pub payback_address: String,
    #[serde(rename = "recipientAddress")]
    pub recipient_address: String,
    #[serde(default)]
    pub contact: Option<String>,
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCreatedDeal {
    #[serde(rename = "dealId")]
    pub deal_id: String,
    #[serde(rename = "aliceToken")]
    pub alice_token: String,
    #[serde(rename = "bobToken")]
    pub bob_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSide {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub asset: String,
    /// Exact decimal amount.
    pub amount: String,
    #[serde(rename = "recipientAddress")]
    pub recipient_address: Option<String>,
    #[serde(rename = "paybackAddress")]
    pub payback_address: Option<String>,
    pub contact: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcEscrow {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub index: u64,
    pub address: String,
}

/// One classified value movement from a settlement receipt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcTransfer {
    /// "swap", "fee", or "refund" per receipt ordinal.
    pub kind: String,
    pub from: String,
    pub to: String,
    /// Base units as a decimal integer string.
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcQueueItem {
    pub id: String,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub purpose: String,
    pub phase: String,
    pub seq: u32,
    #[serde(rename = "fromAddr")]
    pub from_addr: String,
    #[serde(rename = "toAddr")]
    pub to_addr: String,
    pub asset: String,
    /// Base units as a decimal integer string.
    pub amount: String,
    pub status: String,
    pub txid: Option<String>,
    #[serde(rename = "submittedAt")]
    pub submitted_at: Option<i64>,
    #[serde(rename = "recoveryAttempts")]
    pub recovery_attempts: u32,
    #[serde(rename = "recoveryError")]
    pub recovery_error: Option<String>,
    /// Classified ERC-20 `Transfer` events, broker purposes only.
    #[serde(rename = "erc20Transfers", skip_serializing_if = "Option::is_none")]
    pub erc20_transfers: Option<Vec<RpcTransfer>>,
    /// Classified native internal transfers, broker purposes only.
    #[serde(rename = "internalTransactions", skip_serializing_if = "Option::is_none")]
    pub internal_transactions: Option<Vec<RpcTransfer>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcEvent {
    #[serde(rename = "atMs")]
    pub at_ms: i64,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcDealStatus {
    #[serde(rename = "dealId")]
    pub deal_id: String,
    pub stage: String,
    pub alice: RpcSide,
    pub bob: RpcSide,
    pub escrows: Vec<RpcEscrow>,
    pub queue: Vec<RpcQueueItem>,
    pub events: Vec<RpcEvent>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "collectDeadline")]
    pub collect_deadline: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcDealSummary {
    #[serde(rename = "dealId")]
    pub deal_id: String,
    pub stage: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRecoveryEntry {
    pub id: u64,
    #[serde(rename = "dealId")]
    pub deal_id: Option<String>,
    #[serde(rename = "recoveryType")]
    pub recovery_type: String,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub action: String,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcChainHealth {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "tipHeight")]
    pub tip_height: Option<u64>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcHealth {
    pub healthy: bool,
    pub chains: Vec<RpcChainHealth>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcVersion {
    pub version: String,
}
