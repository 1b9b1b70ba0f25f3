use alloy_primitives::U256;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use swapx_core::SwapxError;

/// JSON-RPC 2.0 client for an EVM node.
///
/// Raw HTTP POST with serde_json rather than a full provider stack: the
/// plugin needs a dozen methods and per-call deadlines, nothing more.
pub struct EvmRpcClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

/// Block parameter for balance/call queries.
#[derive(Clone, Copy, Debug)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    fn as_param(&self) -> String {
        match self {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Number(n) => format!("0x{n:x}"),
        }
    }
}

/// Transaction receipt subset the plugin consumes.
#[derive(Clone, Debug, Deserialize)]
pub struct Receipt {
    /// "0x1" success, "0x0" reverted.
    pub status: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    #[serde(default)]
    pub logs: Vec<ReceiptLog>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReceiptLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// Decode a `0x…` hex quantity into u64.
pub fn parse_quantity(s: &str) -> Result<u64, SwapxError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| SwapxError::Rpc(format!("bad quantity {s}: {e}")))
}

/// Decode a `0x…` hex quantity into U256.
pub fn parse_quantity_u256(s: &str) -> Result<U256, SwapxError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    if stripped.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(stripped, 16)
        .map_err(|e| SwapxError::Rpc(format!("bad quantity {s}: {e}")))
}

pub fn to_quantity(v: U256) -> String {
    format!("0x{v:x}")
}

impl EvmRpcClient {
    pub fn new(url: &str, timeout_secs: u64) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Call a JSON-RPC method and deserialize the `result` field.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, SwapxError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SwapxError::RpcTimeout(self.timeout.as_secs())
                } else {
                    SwapxError::Rpc(format!("{method}: {e}"))
                }
            })?;

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SwapxError::Rpc(format!("{method}: parsing response: {e}")))?;

        if let Some(err) = json.get("error") {
            return Err(SwapxError::Rpc(format!("{method}: {err}")));
        }

        serde_json::from_value(json["result"].clone())
            .map_err(|e| SwapxError::Rpc(format!("{method}: decoding result: {e}")))
    }

    pub async fn block_number(&self) -> Result<u64, SwapxError> {
        let hex: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&hex)
    }

    pub async fn get_balance(&self, addr: &str, block: BlockTag) -> Result<U256, SwapxError> {
        let hex: String = self
            .call("eth_getBalance", serde_json::json!([addr, block.as_param()]))
            .await?;
        parse_quantity_u256(&hex)
    }

    /// `eth_call` of pre-encoded calldata against `to`.
    pub async fn eth_call(
        &self,
        to: &str,
        data: &[u8],
        block: BlockTag,
    ) -> Result<Vec<u8>, SwapxError> {
        let hex: String = self
            .call(
                "eth_call",
                serde_json::json!([
                    { "to": to, "data": format!("0x{}", hex::encode(data)) },
                    block.as_param()
                ]),
            )
            .await?;
        let stripped = hex.strip_prefix("0x").unwrap_or(&hex);
        hex::decode(stripped).map_err(|e| SwapxError::Rpc(format!("eth_call result: {e}")))
    }

    /// Next nonce including mempool transactions.
    pub async fn transaction_count_pending(&self, addr: &str) -> Result<u64, SwapxError> {
        let hex: String = self
            .call("eth_getTransactionCount", serde_json::json!([addr, "pending"]))
            .await?;
        parse_quantity(&hex)
    }

    pub async fn gas_price(&self) -> Result<U256, SwapxError> {
        let hex: String = self.call("eth_gasPrice", serde_json::json!([])).await?;
        parse_quantity_u256(&hex)
    }

    pub async fn estimate_gas(
        &self,
        from: &str,
        to: &str,
        value: U256,
        data: &[u8],
    ) -> Result<u64, SwapxError> {
        let mut obj = serde_json::json!({
            "from": from,
            "to": to,
            "value": to_quantity(value),
        });
        if !data.is_empty() {
            obj["data"] = serde_json::json!(format!("0x{}", hex::encode(data)));
        }
        let hex: String = self.call("eth_estimateGas", serde_json::json!([obj])).await?;
        parse_quantity(&hex)
    }

    /// Submit raw signed bytes; returns the tx hash.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, SwapxError> {
        self.call(
            "eth_sendRawTransaction",
            serde_json::json!([format!("0x{}", hex::encode(raw))]),
        )
        .await
    }

    pub async fn transaction_receipt(&self, txid: &str) -> Result<Option<Receipt>, SwapxError> {
        self.call("eth_getTransactionReceipt", serde_json::json!([txid])).await
    }

    /// The pending/known transaction body, or `None` if the node no longer
    /// knows the hash (dropped from the mempool).
    pub async fn transaction_by_hash(
        &self,
        txid: &str,
    ) -> Result<Option<serde_json::Value>, SwapxError> {
        let v: serde_json::Value = self
            .call("eth_getTransactionByHash", serde_json::json!([txid]))
            .await?;
        Ok(if v.is_null() { None } else { Some(v) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_parse() {
        assert_eq!(parse_quantity("0x10").unwrap(), 16);
        assert_eq!(parse_quantity_u256("0xde0b6b3a7640000").unwrap(), U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(parse_quantity_u256("0x").unwrap(), U256::ZERO);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn quantity_formatting_is_minimal_hex() {
        assert_eq!(to_quantity(U256::from(0u64)), "0x0");
        assert_eq!(to_quantity(U256::from(31u64)), "0x1f");
    }

    #[test]
    fn block_tags() {
        assert_eq!(BlockTag::Latest.as_param(), "latest");
        assert_eq!(BlockTag::Number(255).as_param(), "0xff");
    }
}
