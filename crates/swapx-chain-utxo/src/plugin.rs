use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use tracing::{debug, info};

use swapx_chain::{ChainPlugin, FeeStrategy, Submission, TransferRecord, Utxo};
use swapx_core::{amount, Asset, ChainConfig, ChainFamily, ChainId, SwapxError, TxId, UTXO_DUST_LIMIT};
use swapx_keys::{check_utxo_address, decode_utxo_address, EscrowKey, MasterSeed};

use crate::rpc::UtxoRpcClient;
use crate::tx::{estimate_fee, p2pkh_script, txid_to_wire, RawTransaction, TxIn, TxOut};

/// Base units per byte at normal urgency.
const FEE_RATE_NORMAL: u64 = 10;
/// Bumped rate for retried submissions.
const FEE_RATE_PRIORITY: u64 = 25;

/// UTXO chain adapter. No tokens, no broker; everything settles through
/// plain pay-to-pubkey-hash transactions built from the escrow's own
/// unspent outputs.
pub struct UtxoPlugin {
    config: ChainConfig,
    version: u8,
    rpc: UtxoRpcClient,
    seed: Arc<MasterSeed>,
    tank_address: String,
}

impl UtxoPlugin {
    pub fn new(
        config: ChainConfig,
        seed: Arc<MasterSeed>,
        rpc_timeout_secs: u64,
    ) -> Result<Self, SwapxError> {
        if config.family != ChainFamily::Utxo {
            return Err(SwapxError::Config(format!(
                "chain {} is not a UTXO chain",
                config.chain_id
            )));
        }
        let version = config.utxo_address_version.ok_or_else(|| {
            SwapxError::Config(format!(
                "chain {}: missing utxo_address_version",
                config.chain_id
            ))
        })?;
        amount::parse_units(&config.gas_funding_amount, config.native_decimals)?;
        amount::parse_units(&config.low_tank_threshold, config.native_decimals)?;

        let tank_address =
            EscrowKey::derive_tank(&seed, ChainFamily::Utxo, config.chain_id.as_str())?
                .address(version);
        let rpc = UtxoRpcClient::new(&config.rpc_url, rpc_timeout_secs);
        info!(chain = %config.chain_id, tank = %tank_address, "UTXO plugin initialized");
        Ok(Self { config, version, rpc, seed, tank_address })
    }

    fn escrow_key(&self, index: u64) -> Result<EscrowKey, SwapxError> {
        EscrowKey::derive(&self.seed, ChainFamily::Utxo, index)
    }

    fn fee_rate(fee: FeeStrategy) -> u64 {
        match fee {
            FeeStrategy::Normal => FEE_RATE_NORMAL,
            FeeStrategy::Priority => FEE_RATE_PRIORITY,
        }
    }

    fn value_as_u64(value: U256) -> Result<u64, SwapxError> {
        u64::try_from(value)
            .map_err(|_| SwapxError::MalformedAmount(format!("{value} exceeds u64 base units")))
    }

    /// Greedy largest-first coin selection covering `target` plus the fee
    /// for the resulting transaction shape.
    fn select_coins(
        mut utxos: Vec<Utxo>,
        target: u64,
        rate: u64,
    ) -> Result<(Vec<Utxo>, u64, u64), SwapxError> {
        utxos.sort_by(|a, b| b.value.cmp(&a.value));
        let mut selected = Vec::new();
        let mut total: u64 = 0;
        for utxo in utxos {
            let value = Self::value_as_u64(utxo.value)?;
            selected.push(utxo);
            total = total
                .checked_add(value)
                .ok_or_else(|| SwapxError::MalformedAmount("input overflow".into()))?;
            let fee = estimate_fee(selected.len(), 2, rate);
            if total >= target.saturating_add(fee) {
                return Ok((selected, total, fee));
            }
        }
        Err(SwapxError::InsufficientFunds {
            need: target.to_string(),
            have: total.to_string(),
        })
    }

    /// Build, sign, and submit a spend of `key`'s outputs. When `amount`
    /// covers the whole balance the fee comes out of the single output
    /// (sweep); otherwise the output is exact and change returns to the
    /// spending address.
    async fn spend(
        &self,
        key: &EscrowKey,
        to: &str,
        amount: u64,
        fee: FeeStrategy,
    ) -> Result<Submission, SwapxError> {
        let from = key.address(self.version);
        let rate = Self::fee_rate(fee);
        let to_hash = decode_utxo_address(to, self.version).map_err(|_| {
            SwapxError::AddressChainMismatch {
                chain: self.config.chain_id.to_string(),
                addr: to.to_string(),
            }
        })?;
        let utxos = self.utxos(&from).await?;
        let total_available: u64 = {
            let mut sum = 0u64;
            for u in &utxos {
                sum = sum
                    .checked_add(Self::value_as_u64(u.value)?)
                    .ok_or_else(|| SwapxError::MalformedAmount("utxo sum overflow".into()))?;
            }
            sum
        };

        let from_hash = decode_utxo_address(&from, self.version)?;
        let (inputs, outputs) = if amount >= total_available {
            // Sweep: the fee is taken from the transferred value.
            let fee = estimate_fee(utxos.len(), 1, rate);
            if total_available <= fee {
                return Err(SwapxError::InsufficientFunds {
                    need: fee.to_string(),
                    have: total_available.to_string(),
                });
            }
            (utxos, vec![TxOut { value: total_available - fee, script_pubkey: p2pkh_script(&to_hash) }])
        } else {
            let (selected, total, fee) = Self::select_coins(utxos, amount, rate)?;
            let change = total - amount - fee;
            let mut outputs =
                vec![TxOut { value: amount, script_pubkey: p2pkh_script(&to_hash) }];
            if change >= UTXO_DUST_LIMIT {
                outputs.push(TxOut { value: change, script_pubkey: p2pkh_script(&from_hash) });
            }
            (selected, outputs)
        };

        let tx_inputs = inputs
            .iter()
            .map(|u| {
                Ok(TxIn {
                    prev_txid: txid_to_wire(u.txid.as_str())?,
                    vout: u.vout,
                    script_sig: Vec::new(),
                    sequence: 0xffff_ffff,
                })
            })
            .collect::<Result<Vec<_>, SwapxError>>()?;

        let mut tx = RawTransaction::new(tx_inputs, outputs);
        tx.sign_all_inputs(key.signing_key())?;
        let raw = tx.serialize();
        let txid = self.rpc.send_raw_transaction(&hex::encode(&raw)).await?;
        debug!(chain = %self.config.chain_id, %txid, "submitted transaction");
        Ok(Submission { txid: TxId::new(txid), raw })
    }
}

#[async_trait]
impl ChainPlugin for UtxoPlugin {
    fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    fn family(&self) -> ChainFamily {
        ChainFamily::Utxo
    }

    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn derive_escrow(&self, index: u64) -> Result<String, SwapxError> {
        Ok(self.escrow_key(index)?.address(self.version))
    }

    fn tank_address(&self) -> &str {
        &self.tank_address
    }

    fn is_address_shaped(&self, addr: &str) -> bool {
        check_utxo_address(addr, self.version).is_ok()
    }

    async fn native_balance(&self, addr: &str) -> Result<U256, SwapxError> {
        let utxos = self.utxos(addr).await?;
        Ok(utxos.iter().fold(U256::ZERO, |acc, u| acc + u.value))
    }

    async fn utxos(&self, addr: &str) -> Result<Vec<Utxo>, SwapxError> {
        let rows = self.rpc.address_utxos(addr).await?;
        Ok(rows
            .into_iter()
            .map(|r| Utxo {
                txid: TxId::new(r.txid),
                vout: r.output_index,
                value: U256::from(r.satoshis),
                height: r.height.filter(|h| *h > 0),
            })
            .collect())
    }

    async fn confirmed_balance(
        &self,
        asset: &Asset,
        addr: &str,
        confirmations: u32,
    ) -> Result<U256, SwapxError> {
        if !asset.is_native() {
            return Err(SwapxError::UnsupportedAsset(asset.canonical()));
        }
        let tip = self.rpc.block_count().await?;
        let utxos = self.utxos(addr).await?;
        Ok(utxos
            .iter()
            .filter(|u| match u.height {
                Some(h) => tip + 1 >= h && (tip + 1 - h) >= confirmations as u64,
                None => false,
            })
            .fold(U256::ZERO, |acc, u| acc + u.value))
    }

    async fn tip_height(&self) -> Result<u64, SwapxError> {
        self.rpc.block_count().await
    }

    async fn send_from_escrow(
        &self,
        index: u64,
        asset: &Asset,
        to: &str,
        value: U256,
        fee: FeeStrategy,
    ) -> Result<Submission, SwapxError> {
        if !asset.is_native() {
            return Err(SwapxError::UnsupportedAsset(asset.canonical()));
        }
        let key = self.escrow_key(index)?;
        self.spend(&key, to, Self::value_as_u64(value)?, fee).await
    }

    async fn send_from_tank(&self, to: &str, value: U256) -> Result<Submission, SwapxError> {
        let key = EscrowKey::derive_tank(&self.seed, ChainFamily::Utxo, self.config.chain_id.as_str())?;
        self.spend(&key, to, Self::value_as_u64(value)?, FeeStrategy::Normal).await
    }

    async fn sweep_escrow_native(&self, index: u64, to: &str) -> Result<Submission, SwapxError> {
        let key = self.escrow_key(index)?;
        let from = key.address(self.version);
        let balance = self.native_balance(&from).await?;
        self.spend(&key, to, Self::value_as_u64(balance)?, FeeStrategy::Normal).await
    }

    async fn estimate_transfer_cost(
        &self,
        _asset: &Asset,
        from: &str,
        _to: &str,
        _value: U256,
    ) -> Result<U256, SwapxError> {
        // Fees come out of the spent inputs, so the cost of a transfer is
        // the fee for a typical shape over the escrow's current utxo set.
        let inputs = self.utxos(from).await?.len().max(1);
        Ok(U256::from(estimate_fee(inputs, 2, FEE_RATE_NORMAL)))
    }

    async fn tx_confirmations(&self, txid: &TxId) -> Result<i64, SwapxError> {
        match self.rpc.raw_transaction_verbose(txid.as_str()).await? {
            None => Ok(-1),
            Some(tx) => {
                let confirmations = tx
                    .get("confirmations")
                    .and_then(|c| c.as_i64())
                    .unwrap_or(0);
                Ok(confirmations)
            }
        }
    }

    async fn receipt_transfers(&self, txid: &TxId) -> Result<Vec<TransferRecord>, SwapxError> {
        // Inclusion proof: report each output as a native transfer.
        let Some(tx) = self.rpc.raw_transaction_verbose(txid.as_str()).await? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        if let Some(outputs) = tx.get("vout").and_then(|v| v.as_array()) {
            for out in outputs {
                let value_sat = out
                    .get("valueSat")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                let to = out
                    .pointer("/scriptPubKey/addresses/0")
                    .and_then(|a| a.as_str())
                    .unwrap_or_default()
                    .to_string();
                if value_sat > 0 {
                    records.push(TransferRecord {
                        token: None,
                        from: String::new(),
                        to,
                        value: U256::from(value_sat),
                    });
                }
            }
        }
        Ok(records)
    }
}
