use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use swapx_core::SwapxError;

/// JSON-RPC client for a UTXO-chain node with an address index
/// (`getaddressutxos` et al.), over plain HTTP POST like its EVM sibling.
pub struct UtxoRpcClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

/// One row of `getaddressutxos`.
#[derive(Clone, Debug, Deserialize)]
pub struct AddressUtxo {
    pub txid: String,
    #[serde(rename = "outputIndex")]
    pub output_index: u32,
    /// Exact integer base units.
    pub satoshis: u64,
    /// 0 or absent while unconfirmed.
    #[serde(default)]
    pub height: Option<u64>,
}

impl UtxoRpcClient {
    pub fn new(url: &str, timeout_secs: u64) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, SwapxError> {
        let body = serde_json::json!({
            "jsonrpc": "1.0",
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
            if !err.is_null() {
                return Err(SwapxError::Rpc(format!("{method}: {err}")));
            }
        }

        serde_json::from_value(json["result"].clone())
            .map_err(|e| SwapxError::Rpc(format!("{method}: decoding result: {e}")))
    }

    pub async fn block_count(&self) -> Result<u64, SwapxError> {
        self.call("getblockcount", serde_json::json!([])).await
    }

    pub async fn address_utxos(&self, addr: &str) -> Result<Vec<AddressUtxo>, SwapxError> {
        self.call(
            "getaddressutxos",
            serde_json::json!([{ "addresses": [addr] }]),
        )
        .await
    }

    /// Verbose transaction lookup. `None` when the node no longer knows the
    /// txid (never seen, or evicted after a reorg).
    pub async fn raw_transaction_verbose(
        &self,
        txid: &str,
    ) -> Result<Option<serde_json::Value>, SwapxError> {
        match self
            .call::<serde_json::Value>("getrawtransaction", serde_json::json!([txid, true]))
            .await
        {
            Ok(v) if v.is_null() => Ok(None),
            Ok(v) => Ok(Some(v)),
            // Code -5: no such mempool or chain transaction.
            Err(SwapxError::Rpc(msg)) if msg.contains("-5") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String, SwapxError> {
        self.call("sendrawtransaction", serde_json::json!([raw_hex])).await
    }
}
