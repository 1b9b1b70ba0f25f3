//! Scripted in-memory chain for engine and scenario tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::U256;
use async_trait::async_trait;

use swapx_chain::{
    BrokerRequest, ChainPlugin, ChainRegistry, FeeStrategy, Submission, TransferRecord, Utxo,
};
use swapx_core::{Asset, BrokerConfig, ChainConfig, ChainFamily, ChainId, SwapxError, TxId};

/// Flat fee every mock transfer burns, so conservation is observable.
pub(crate) const MOCK_FEE: u64 = 10;

type BalanceKey = (Option<String>, String);

#[derive(Default)]
pub(crate) struct MockState {
    /// Confirmed balances per (token, address).
    pub confirmed: HashMap<BalanceKey, U256>,
    /// Tip balances per (token, address).
    pub latest: HashMap<BalanceKey, U256>,
    /// txid → confirmations override.
    pub confirmations: HashMap<String, i64>,
    /// (token, owner) → allowance granted to the broker.
    pub allowances: HashMap<(String, String), U256>,
    /// Every submission in order: (txid, description).
    pub submissions: Vec<(String, String)>,
    /// Fail the next N sends with a retryable chain error.
    pub fail_sends: u32,
    next_txid: u64,
}

/// A scriptable chain plugin. Submissions move balances immediately in both
/// views and confirm instantly unless a confirmation override says
/// otherwise.
pub(crate) struct MockChain {
    config: ChainConfig,
    family: ChainFamily,
    shape_prefix: &'static str,
    broker: bool,
    pub state: Arc<Mutex<MockState>>,
}

pub(crate) fn evm_chain_config(chain: &str, broker: bool, rate_cents: u64) -> ChainConfig {
    ChainConfig {
        chain_id: ChainId::new(chain),
        family: ChainFamily::Evm,
        rpc_url: "mock".into(),
        evm_chain_ref: Some(1337),
        utxo_address_version: None,
        confirmations: 3,
        collect_confirmations: 3,
        operator_address: "0xoperator".into(),
        broker_address: broker.then(|| "0xbroker".to_string()),
        explorer_api_key: None,
        gas_funding_amount: "0.00000000000001".into(),
        low_tank_threshold: "0.000000000000001".into(),
        native_decimals: 18,
        native_usd_rate_cents: rate_cents,
    }
}

pub(crate) fn utxo_chain_config(chain: &str) -> ChainConfig {
    ChainConfig {
        chain_id: ChainId::new(chain),
        family: ChainFamily::Utxo,
        rpc_url: "mock".into(),
        evm_chain_ref: None,
        utxo_address_version: Some(30),
        confirmations: 6,
        collect_confirmations: 6,
        operator_address: "Doperator".into(),
        broker_address: None,
        explorer_api_key: None,
        gas_funding_amount: "0.0001".into(),
        low_tank_threshold: "0.00001".into(),
        native_decimals: 8,
        native_usd_rate_cents: 1_000,
    }
}

impl MockChain {
    pub fn evm(chain: &str, broker: bool, rate_cents: u64) -> Self {
        Self {
            config: evm_chain_config(chain, broker, rate_cents),
            family: ChainFamily::Evm,
            shape_prefix: "0x",
            broker,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn utxo(chain: &str) -> Self {
        Self {
            config: utxo_chain_config(chain),
            family: ChainFamily::Utxo,
            shape_prefix: "D",
            broker: false,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn prefix_addr(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.shape_prefix)
    }

    /// Fund an address in both the confirmed and tip views.
    pub fn fund(&self, token: Option<&str>, addr: &str, value: u64) {
        let key = (token.map(str::to_string), addr.to_string());
        let mut state = self.state.lock().unwrap();
        *state.confirmed.entry(key.clone()).or_default() += U256::from(value);
        *state.latest.entry(key).or_default() += U256::from(value);
    }

    /// Drop the confirmed view of an address (simulated reorg).
    pub fn reorg_out(&self, token: Option<&str>, addr: &str) {
        let key = (token.map(str::to_string), addr.to_string());
        self.state.lock().unwrap().confirmed.remove(&key);
    }

    pub fn set_confirmations(&self, txid: &str, confs: i64) {
        self.state.lock().unwrap().confirmations.insert(txid.to_string(), confs);
    }

    pub fn balance_of(&self, token: Option<&str>, addr: &str) -> U256 {
        let key = (token.map(str::to_string), addr.to_string());
        self.state.lock().unwrap().latest.get(&key).copied().unwrap_or_default()
    }

    pub fn submissions(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn transfer_locked(
        state: &mut MockState,
        token: Option<&str>,
        from: &str,
        to: &str,
        value: U256,
        fee: U256,
        what: &str,
    ) -> Result<Submission, SwapxError> {
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(SwapxError::TxFailed("scripted failure".into()));
        }
        let from_key = (token.map(str::to_string), from.to_string());
        let have = state.latest.get(&from_key).copied().unwrap_or_default();
        let native_fee = if token.is_none() { fee } else { U256::ZERO };
        if have < value + native_fee {
            return Err(SwapxError::InsufficientFunds {
                need: (value + native_fee).to_string(),
                have: have.to_string(),
            });
        }
        state.latest.insert(from_key.clone(), have - value - native_fee);
        let to_key = (token.map(str::to_string), to.to_string());
        *state.latest.entry(to_key.clone()).or_default() += value;
        // Mirror into the confirmed view: the mock chain finalizes quickly.
        let conf_from = state.confirmed.get(&from_key).copied().unwrap_or_default();
        state
            .confirmed
            .insert(from_key, conf_from.saturating_sub(value + native_fee));
        *state.confirmed.entry(to_key).or_default() += value;

        state.next_txid += 1;
        let txid = format!("mocktx-{}", state.next_txid);
        state.submissions.push((txid.clone(), what.to_string()));
        Ok(Submission { txid: TxId::new(txid), raw: vec![] })
    }
}

#[async_trait]
impl ChainPlugin for MockChain {
    fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    fn family(&self) -> ChainFamily {
        self.family
    }

    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn supports_broker(&self) -> bool {
        self.broker
    }

    fn supports_tokens(&self) -> bool {
        self.family == ChainFamily::Evm
    }

    fn derive_escrow(&self, index: u64) -> Result<String, SwapxError> {
        Ok(self.prefix_addr(&format!("esc{index}")))
    }

    fn tank_address(&self) -> &str {
        match self.family {
            ChainFamily::Evm => "0xtank",
            ChainFamily::Utxo => "Dtank",
        }
    }

    fn is_address_shaped(&self, addr: &str) -> bool {
        addr.starts_with(self.shape_prefix) && addr.len() > self.shape_prefix.len()
    }

    async fn native_balance(&self, addr: &str) -> Result<U256, SwapxError> {
        Ok(self.balance_of(None, addr))
    }

    async fn token_balance(&self, token: &str, addr: &str) -> Result<U256, SwapxError> {
        Ok(self.balance_of(Some(token), addr))
    }

    async fn token_decimals(&self, _token: &str) -> Result<u8, SwapxError> {
        Ok(6)
    }

    async fn utxos(&self, addr: &str) -> Result<Vec<Utxo>, SwapxError> {
        let balance = self.balance_of(None, addr);
        if balance.is_zero() {
            return Ok(vec![]);
        }
        Ok(vec![Utxo { txid: TxId::new("mockutxo"), vout: 0, value: balance, height: Some(1) }])
    }

    async fn confirmed_balance(
        &self,
        asset: &Asset,
        addr: &str,
        _confirmations: u32,
    ) -> Result<U256, SwapxError> {
        let key = (asset.token_address().map(str::to_string), addr.to_string());
        Ok(self.state.lock().unwrap().confirmed.get(&key).copied().unwrap_or_default())
    }

    async fn tip_height(&self) -> Result<u64, SwapxError> {
        Ok(100)
    }

    async fn send_from_escrow(
        &self,
        index: u64,
        asset: &Asset,
        to: &str,
        value: U256,
        _fee: FeeStrategy,
    ) -> Result<Submission, SwapxError> {
        let from = self.derive_escrow(index)?;
        let mut state = self.state.lock().unwrap();
        Self::transfer_locked(
            &mut state,
            asset.token_address(),
            &from,
            to,
            value,
            U256::from(MOCK_FEE),
            &format!("escrow{index}->{to}"),
        )
    }

    async fn send_from_tank(&self, to: &str, value: U256) -> Result<Submission, SwapxError> {
        let tank = self.tank_address().to_string();
        let mut state = self.state.lock().unwrap();
        Self::transfer_locked(&mut state, None, &tank, to, value, U256::from(MOCK_FEE), "tank-fund")
    }

    async fn sweep_escrow_native(&self, index: u64, to: &str) -> Result<Submission, SwapxError> {
        let from = self.derive_escrow(index)?;
        let mut state = self.state.lock().unwrap();
        let have = state
            .latest
            .get(&(None, from.clone()))
            .copied()
            .unwrap_or_default();
        let fee = U256::from(MOCK_FEE);
        if have <= fee {
            return Err(SwapxError::InsufficientFunds {
                need: fee.to_string(),
                have: have.to_string(),
            });
        }
        Self::transfer_locked(&mut state, None, &from, to, have - fee, fee, "sweep")
    }

    async fn estimate_transfer_cost(
        &self,
        _asset: &Asset,
        _from: &str,
        _to: &str,
        _value: U256,
    ) -> Result<U256, SwapxError> {
        Ok(U256::from(MOCK_FEE))
    }

    async fn swap_via_broker(
        &self,
        req: &BrokerRequest,
        _operator_sig: &[u8; 65],
    ) -> Result<Submission, SwapxError> {
        let escrow = self.derive_escrow(req.escrow_index)?;
        let mut state = self.state.lock().unwrap();
        if let Some(token) = &req.token {
            let allowance = state
                .allowances
                .get(&(token.clone(), escrow.clone()))
                .copied()
                .unwrap_or_default();
            if allowance < req.amount + req.fee {
                return Err(SwapxError::TxFailed("broker allowance too low".into()));
            }
        }
        let sub = Self::transfer_locked(
            &mut state,
            req.token.as_deref(),
            &escrow,
            &req.recipient,
            req.amount,
            U256::ZERO,
            "broker-swap",
        )?;
        if req.fee > U256::ZERO {
            Self::transfer_locked(
                &mut state,
                req.token.as_deref(),
                &escrow,
                &req.fee_recipient,
                req.fee,
                U256::ZERO,
                "broker-fee",
            )?;
        }
        Ok(sub)
    }

    async fn allowance(&self, token: &str, owner: &str) -> Result<U256, SwapxError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .allowances
            .get(&(token.to_string(), owner.to_string()))
            .copied()
            .unwrap_or_default())
    }

    async fn approve_broker(
        &self,
        index: u64,
        token: &str,
        value: U256,
    ) -> Result<Submission, SwapxError> {
        let escrow = self.derive_escrow(index)?;
        let mut state = self.state.lock().unwrap();
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(SwapxError::TxFailed("scripted failure".into()));
        }
        state
            .allowances
            .insert((token.to_string(), escrow), value);
        state.next_txid += 1;
        let txid = format!("mocktx-{}", state.next_txid);
        state.submissions.push((txid.clone(), "approve".into()));
        Ok(Submission { txid: TxId::new(txid), raw: vec![] })
    }

    async fn tx_confirmations(&self, txid: &TxId) -> Result<i64, SwapxError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .confirmations
            .get(txid.as_str())
            .copied()
            .unwrap_or(i64::from(self.config.confirmations)))
    }

    async fn receipt_transfers(&self, _txid: &TxId) -> Result<Vec<TransferRecord>, SwapxError> {
        Ok(vec![])
    }
}

// ── Engine fixture ───────────────────────────────────────────────────────────

use crate::oracle::FixedRateOracle;
use crate::service::DealService;
use crate::Engine;
use swapx_keys::OperatorKey;
use swapx_store::BrokerDb;

pub(crate) struct Fixture {
    pub engine: Engine,
    pub service: DealService,
    pub db: Arc<BrokerDb>,
    pub evm: Arc<MockChain>,
    pub utxo: Arc<MockChain>,
    _dir: tempfile::TempDir,
}

pub(crate) fn fixture(evm_broker: bool) -> Fixture {
    fixture_with_rate(evm_broker, 250_000)
}

/// `rate_cents` tunes the fixed-USD commission so tests can keep native
/// amounts small.
pub(crate) fn fixture_with_rate(evm_broker: bool, rate_cents: u64) -> Fixture {
    let dir = tempfile::TempDir::new().unwrap();
    let db = Arc::new(BrokerDb::open(dir.path()).unwrap());

    let evm = Arc::new(MockChain::evm("SEPOLIA", evm_broker, rate_cents));
    let utxo = Arc::new(MockChain::utxo("DGB"));
    let mut registry = ChainRegistry::new();
    registry.register(evm.clone());
    registry.register(utxo.clone());
    let registry = Arc::new(registry);

    let config = Arc::new(BrokerConfig {
        master_seed: "11".repeat(32),
        operator_signing_key: "22".repeat(32),
        chains: vec![evm_chain_config("SEPOLIA", evm_broker, rate_cents), utxo_chain_config("DGB")],
        engine_tick_secs: 30,
        recovery_tick_secs: 300,
        lease_ttl_secs: 90,
        stuck_pending_secs: 300,
        stuck_submitted_secs: 600,
        max_recovery_attempts: 3,
        commission_bps: 30,
        unknown_token_commission_usd_cents: 1_000,
        engine_workers: 4,
        rpc_timeout_secs: 15,
        rpc_listen_addr: "127.0.0.1:0".into(),
    });
    let operator = Arc::new(OperatorKey::from_hex(&"22".repeat(32)).unwrap());
    let oracle = Arc::new(FixedRateOracle::from_config(&config));

    let engine = Engine::new(db.clone(), registry.clone(), config.clone(), operator, oracle);
    let service = DealService::new(db.clone(), registry, config);
    Fixture { engine, service, db, evm, utxo, _dir: dir }
}
