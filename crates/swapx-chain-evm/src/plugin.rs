use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use swapx_chain::{
    BrokerRequest, ChainPlugin, FeeStrategy, Submission, TransferRecord, Utxo,
};
use swapx_core::{amount, Asset, ChainConfig, ChainFamily, ChainId, SwapxError, TxId};
use swapx_keys::{is_evm_shaped, EscrowKey, MasterSeed};

use crate::contracts::{
    broker_calldata, decode_uint_return, erc20_allowance_calldata, erc20_approve_calldata,
    erc20_balance_of_calldata, erc20_transfer_calldata, parse_address, transfer_event_topic,
    BrokerOp,
};
use crate::rpc::{parse_quantity, parse_quantity_u256, BlockTag, EvmRpcClient};
use crate::tx::LegacyTransfer;

const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// EVM chain adapter.
///
/// Owns a serialized per-address nonce allocator. Each escrow belongs to
/// exactly one deal, so cross-deal nonce conflicts are structurally
/// impossible; the allocator only bridges the gap between `pending` counts
/// the node reports and transactions this process submitted moments ago.
pub struct EvmPlugin {
    config: ChainConfig,
    chain_ref: u64,
    rpc: EvmRpcClient,
    seed: Arc<MasterSeed>,
    tank_address: String,
    broker: Option<Address>,
    nonces: Mutex<HashMap<String, (u64, std::time::Instant)>>,
}

/// A local nonce floor older than this is stale: either its transaction is
/// on chain (the node's pending count caught up) or it was dropped (the
/// nonce is free again). Both ways the chain's answer is the truth.
const NONCE_FLOOR_TTL: std::time::Duration = std::time::Duration::from_secs(120);

impl EvmPlugin {
    pub fn new(
        config: ChainConfig,
        seed: Arc<MasterSeed>,
        rpc_timeout_secs: u64,
    ) -> Result<Self, SwapxError> {
        if config.family != ChainFamily::Evm {
            return Err(SwapxError::Config(format!(
                "chain {} is not an EVM chain",
                config.chain_id
            )));
        }
        let chain_ref = config.evm_chain_ref.ok_or_else(|| {
            SwapxError::Config(format!("chain {}: missing evm_chain_ref", config.chain_id))
        })?;
        let broker = match &config.broker_address {
            Some(addr) => Some(parse_address(addr)?),
            None => None,
        };
        // Parse the decimal config amounts now so a typo fails startup, not
        // a settlement.
        amount::parse_units(&config.gas_funding_amount, config.native_decimals)?;
        amount::parse_units(&config.low_tank_threshold, config.native_decimals)?;

        let tank_address = EscrowKey::derive_tank(&seed, ChainFamily::Evm, config.chain_id.as_str())?
            .address(0);
        let rpc = EvmRpcClient::new(&config.rpc_url, rpc_timeout_secs);
        info!(chain = %config.chain_id, tank = %tank_address, broker = ?config.broker_address,
              "EVM plugin initialized");
        Ok(Self { config, chain_ref, rpc, seed, tank_address, broker, nonces: Mutex::new(HashMap::new()) })
    }

    fn escrow_key(&self, index: u64) -> Result<EscrowKey, SwapxError> {
        EscrowKey::derive(&self.seed, ChainFamily::Evm, index)
    }

    fn tank_key(&self) -> Result<EscrowKey, SwapxError> {
        EscrowKey::derive_tank(&self.seed, ChainFamily::Evm, self.config.chain_id.as_str())
    }

    fn broker_or_err(&self) -> Result<Address, SwapxError> {
        self.broker
            .ok_or_else(|| SwapxError::BrokerNotConfigured(self.config.chain_id.to_string()))
    }

    /// Allocate the next nonce for `from`, serialized across concurrent
    /// submissions from this process. The local floor bridges the window
    /// between our submission and the node's pending count catching up;
    /// stale floors defer to the chain so a dropped transaction's nonce is
    /// reused rather than skipped.
    async fn next_nonce(&self, from: &str) -> Result<u64, SwapxError> {
        let mut nonces = self.nonces.lock().await;
        let chain_next = self.rpc.transaction_count_pending(from).await?;
        let local_next = match nonces.get(from) {
            Some((n, at)) if at.elapsed() < NONCE_FLOOR_TTL => *n,
            _ => 0,
        };
        let next = chain_next.max(local_next);
        nonces.insert(from.to_string(), (next + 1, std::time::Instant::now()));
        Ok(next)
    }

    async fn gas_price(&self, fee: FeeStrategy) -> Result<U256, SwapxError> {
        let base = self.rpc.gas_price().await?;
        Ok(match fee {
            FeeStrategy::Normal => base,
            // +25% for retried submissions so a replacement is accepted.
            FeeStrategy::Priority => base * U256::from(125u64) / U256::from(100u64),
        })
    }

    /// Sign with `key` and submit. The node's echoed hash is authoritative.
    async fn sign_and_send(
        &self,
        key: &EscrowKey,
        transfer: LegacyTransfer,
    ) -> Result<Submission, SwapxError> {
        let signed = transfer.sign(key.signing_key(), self.chain_ref)?;
        let txid = self.rpc.send_raw_transaction(&signed.raw).await?;
        debug!(chain = %self.config.chain_id, %txid, "submitted transaction");
        Ok(Submission { txid: TxId::new(txid), raw: signed.raw })
    }

    async fn build_transfer(
        &self,
        from: &str,
        asset: &Asset,
        to: &str,
        value: U256,
        fee: FeeStrategy,
    ) -> Result<LegacyTransfer, SwapxError> {
        let gas_price = self.gas_price(fee).await?;
        let nonce = self.next_nonce(from).await?;
        match asset.token_address() {
            None => Ok(LegacyTransfer {
                nonce,
                gas_price,
                gas_limit: NATIVE_TRANSFER_GAS,
                to: parse_address(to)?,
                value,
                data: Bytes::new(),
            }),
            Some(token) => {
                let data = erc20_transfer_calldata(parse_address(to)?, value);
                let gas = self.rpc.estimate_gas(from, token, U256::ZERO, &data).await?;
                Ok(LegacyTransfer {
                    nonce,
                    gas_price,
                    gas_limit: gas * 12 / 10,
                    to: parse_address(token)?,
                    value: U256::ZERO,
                    data: Bytes::from(data),
                })
            }
        }
    }

    async fn call_broker(
        &self,
        op: BrokerOp,
        req: &BrokerRequest,
        operator_sig: &[u8; 65],
        attached_value: U256,
    ) -> Result<Submission, SwapxError> {
        let broker = self.broker_or_err()?;
        let key = self.escrow_key(req.escrow_index)?;
        let escrow = key.address(0);
        let data = broker_calldata(op, req, parse_address(&escrow)?, operator_sig)?;
        let gas = self
            .rpc
            .estimate_gas(&escrow, &broker.to_string(), attached_value, &data)
            .await?;
        let transfer = LegacyTransfer {
            nonce: self.next_nonce(&escrow).await?,
            gas_price: self.gas_price(FeeStrategy::Normal).await?,
            gas_limit: gas * 12 / 10,
            to: broker,
            value: attached_value,
            data: Bytes::from(data),
        };
        self.sign_and_send(&key, transfer).await
    }
}

#[async_trait]
impl ChainPlugin for EvmPlugin {
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
        self.broker.is_some()
    }

    fn supports_tokens(&self) -> bool {
        true
    }

    fn derive_escrow(&self, index: u64) -> Result<String, SwapxError> {
        Ok(self.escrow_key(index)?.address(0))
    }

    fn tank_address(&self) -> &str {
        &self.tank_address
    }

    fn is_address_shaped(&self, addr: &str) -> bool {
        is_evm_shaped(addr)
    }

    async fn native_balance(&self, addr: &str) -> Result<U256, SwapxError> {
        self.rpc.get_balance(addr, BlockTag::Latest).await
    }

    async fn token_balance(&self, token: &str, addr: &str) -> Result<U256, SwapxError> {
        let data = erc20_balance_of_calldata(parse_address(addr)?);
        let out = self.rpc.eth_call(token, &data, BlockTag::Latest).await?;
        decode_uint_return(&out)
    }

    async fn utxos(&self, _addr: &str) -> Result<Vec<Utxo>, SwapxError> {
        Err(SwapxError::CapabilityUnsupported(self.config.chain_id.to_string()))
    }

    async fn token_decimals(&self, token: &str) -> Result<u8, SwapxError> {
        let data = crate::contracts::IERC20::decimalsCall {}.abi_encode();
        let out = self.rpc.eth_call(token, &data, BlockTag::Latest).await?;
        let value = decode_uint_return(&out)?;
        u8::try_from(value)
            .map_err(|_| SwapxError::Rpc(format!("token {token}: absurd decimals {value}")))
    }

    async fn confirmed_balance(
        &self,
        asset: &Asset,
        addr: &str,
        confirmations: u32,
    ) -> Result<U256, SwapxError> {
        // Balance at the highest block already buried under `confirmations`
        // blocks. A reorg that unburies a deposit lowers this number again.
        let tip = self.rpc.block_number().await?;
        let block = BlockTag::Number(tip.saturating_sub(confirmations.saturating_sub(1) as u64));
        match asset.token_address() {
            None => self.rpc.get_balance(addr, block).await,
            Some(token) => {
                let data = erc20_balance_of_calldata(parse_address(addr)?);
                let out = self.rpc.eth_call(token, &data, block).await?;
                decode_uint_return(&out)
            }
        }
    }

    async fn tip_height(&self) -> Result<u64, SwapxError> {
        self.rpc.block_number().await
    }

    async fn send_from_escrow(
        &self,
        index: u64,
        asset: &Asset,
        to: &str,
        value: U256,
        fee: FeeStrategy,
    ) -> Result<Submission, SwapxError> {
        let key = self.escrow_key(index)?;
        let from = key.address(0);
        let transfer = self.build_transfer(&from, asset, to, value, fee).await?;
        self.sign_and_send(&key, transfer).await
    }

    async fn send_from_tank(&self, to: &str, value: U256) -> Result<Submission, SwapxError> {
        let key = self.tank_key()?;
        let from = key.address(0);
        let native = Asset::Native { chain: self.config.chain_id.clone() };
        let transfer = self
            .build_transfer(&from, &native, to, value, FeeStrategy::Normal)
            .await?;
        self.sign_and_send(&key, transfer).await
    }

    async fn sweep_escrow_native(&self, index: u64, to: &str) -> Result<Submission, SwapxError> {
        let key = self.escrow_key(index)?;
        let from = key.address(0);
        let balance = self.rpc.get_balance(&from, BlockTag::Latest).await?;
        let gas_price = self.gas_price(FeeStrategy::Normal).await?;
        let fee = gas_price * U256::from(NATIVE_TRANSFER_GAS);
        if balance <= fee {
            return Err(SwapxError::InsufficientFunds {
                need: fee.to_string(),
                have: balance.to_string(),
            });
        }
        let transfer = LegacyTransfer {
            nonce: self.next_nonce(&from).await?,
            gas_price,
            gas_limit: NATIVE_TRANSFER_GAS,
            to: parse_address(to)?,
            value: balance - fee,
            data: Bytes::new(),
        };
        self.sign_and_send(&key, transfer).await
    }

    async fn estimate_transfer_cost(
        &self,
        asset: &Asset,
        from: &str,
        to: &str,
        value: U256,
    ) -> Result<U256, SwapxError> {
        let gas_price = self.gas_price(FeeStrategy::Normal).await?;
        let gas = match asset.token_address() {
            None => NATIVE_TRANSFER_GAS,
            Some(token) => {
                let data = erc20_transfer_calldata(parse_address(to)?, value);
                self.rpc.estimate_gas(from, token, U256::ZERO, &data).await?
            }
        };
        Ok(gas_price * U256::from(gas))
    }

    async fn swap_via_broker(
        &self,
        req: &BrokerRequest,
        operator_sig: &[u8; 65],
    ) -> Result<Submission, SwapxError> {
        // Token settlements are pulled via allowance; native settlements
        // ride along as attached value.
        let attached = if req.token.is_none() { req.amount + req.fee } else { U256::ZERO };
        self.call_broker(BrokerOp::Swap, req, operator_sig, attached).await
    }

    async fn revert_via_broker(
        &self,
        req: &BrokerRequest,
        operator_sig: &[u8; 65],
    ) -> Result<Submission, SwapxError> {
        let attached = if req.token.is_none() { req.amount } else { U256::ZERO };
        self.call_broker(BrokerOp::Revert, req, operator_sig, attached).await
    }

    async fn refund_via_broker(
        &self,
        req: &BrokerRequest,
        operator_sig: &[u8; 65],
    ) -> Result<Submission, SwapxError> {
        let attached = if req.token.is_none() { req.amount } else { U256::ZERO };
        self.call_broker(BrokerOp::Refund, req, operator_sig, attached).await
    }

    async fn allowance(&self, token: &str, owner: &str) -> Result<U256, SwapxError> {
        let broker = self.broker_or_err()?;
        let data = erc20_allowance_calldata(parse_address(owner)?, broker);
        let out = self.rpc.eth_call(token, &data, BlockTag::Latest).await?;
        decode_uint_return(&out)
    }

    async fn approve_broker(
        &self,
        index: u64,
        token: &str,
        value: U256,
    ) -> Result<Submission, SwapxError> {
        let broker = self.broker_or_err()?;
        let key = self.escrow_key(index)?;
        let from = key.address(0);
        let data = erc20_approve_calldata(broker, value);
        let gas = self.rpc.estimate_gas(&from, token, U256::ZERO, &data).await?;
        let transfer = LegacyTransfer {
            nonce: self.next_nonce(&from).await?,
            gas_price: self.gas_price(FeeStrategy::Normal).await?,
            gas_limit: gas * 12 / 10,
            to: parse_address(token)?,
            value: U256::ZERO,
            data: Bytes::from(data),
        };
        self.sign_and_send(&key, transfer).await
    }

    async fn tx_confirmations(&self, txid: &TxId) -> Result<i64, SwapxError> {
        match self.rpc.transaction_receipt(txid.as_str()).await? {
            Some(receipt) => {
                if receipt.status.as_deref() == Some("0x0") {
                    // Reverted on chain: never going to confirm.
                    return Ok(-1);
                }
                match receipt.block_number.as_deref() {
                    Some(block_hex) => {
                        let block = parse_quantity(block_hex)?;
                        let tip = self.rpc.block_number().await?;
                        Ok(tip.saturating_sub(block) as i64 + 1)
                    }
                    None => Ok(0),
                }
            }
            None => {
                // No receipt: in the mempool it is 0 confirmations, unknown
                // to the node it was dropped or reorged away.
                match self.rpc.transaction_by_hash(txid.as_str()).await? {
                    Some(_) => Ok(0),
                    None => Ok(-1),
                }
            }
        }
    }

    async fn receipt_transfers(&self, txid: &TxId) -> Result<Vec<TransferRecord>, SwapxError> {
        let Some(receipt) = self.rpc.transaction_receipt(txid.as_str()).await? else {
            return Ok(Vec::new());
        };
        let topic = format!("0x{}", hex::encode(transfer_event_topic()));
        let mut records = Vec::new();

        // The tx's own value movement counts as a native internal transfer.
        if let Some(tx) = self.rpc.transaction_by_hash(txid.as_str()).await? {
            let value = tx
                .get("value")
                .and_then(|v| v.as_str())
                .map(parse_quantity_u256)
                .transpose()?
                .unwrap_or(U256::ZERO);
            if value > U256::ZERO {
                records.push(TransferRecord {
                    token: None,
                    from: tx.get("from").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    to: tx.get("to").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    value,
                });
            }
        }

        for log in &receipt.logs {
            if log.topics.first().map(|t| t.eq_ignore_ascii_case(&topic)) != Some(true)
                || log.topics.len() < 3
            {
                continue;
            }
            let from = format!("0x{}", &log.topics[1][log.topics[1].len() - 40..]);
            let to = format!("0x{}", &log.topics[2][log.topics[2].len() - 40..]);
            let value = parse_quantity_u256(&log.data)?;
            records.push(TransferRecord { token: Some(log.address.clone()), from, to, value });
        }
        Ok(records)
    }
}
