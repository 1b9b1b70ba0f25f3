//! swapx-broker — the OTC swap broker daemon.
//!
//! Startup sequence:
//!   1. Load and validate the JSON configuration
//!   2. Open (or initialise) the broker database and run migrations
//!   3. Initialise one chain plugin per configured chain
//!   4. Spawn the engine tick (30 s) and recovery tick (5 min)
//!   5. Start the JSON-RPC 2.0 server
//!   6. Run until ctrl-c, then stop ticks and shut plugins down

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use swapx_chain::ChainRegistry;
use swapx_chain_evm::EvmPlugin;
use swapx_chain_utxo::UtxoPlugin;
use swapx_core::{BrokerConfig, ChainFamily};
use swapx_engine::{DealService, Engine, FixedRateOracle};
use swapx_keys::{MasterSeed, OperatorKey};
use swapx_recovery::RecoveryManager;
use swapx_rpc::{RpcServer, RpcServerState};
use swapx_store::BrokerDb;

#[derive(Parser, Debug)]
#[command(
    name = "swapx-broker",
    version,
    about = "SwapX OTC broker — atomic cross-chain asset swaps through deterministic escrows"
)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "swapx.json")]
    config: PathBuf,

    /// Directory for the persistent broker database.
    #[arg(long, default_value = "~/.swapx/data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,swapx=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("SwapX broker starting");

    // ── Configuration ─────────────────────────────────────────────────────────
    let doc = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    let config = Arc::new(BrokerConfig::from_json(&doc).context("parsing config")?);

    let seed = Arc::new(MasterSeed::from_hex(&config.master_seed).context("master seed")?);
    let operator =
        Arc::new(OperatorKey::from_hex(&config.operator_signing_key).context("operator key")?);
    info!(operator = %operator.address(), "operator key loaded");

    // ── Broker database ───────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(BrokerDb::open(&data_dir).context("opening broker database")?);

    // ── Chain plugins ─────────────────────────────────────────────────────────
    let mut registry = ChainRegistry::new();
    for chain in &config.chains {
        match chain.family {
            ChainFamily::Evm => registry.register(Arc::new(
                EvmPlugin::new(chain.clone(), seed.clone(), config.rpc_timeout_secs)
                    .with_context(|| format!("initialising EVM plugin {}", chain.chain_id))?,
            )),
            ChainFamily::Utxo => registry.register(Arc::new(
                UtxoPlugin::new(chain.clone(), seed.clone(), config.rpc_timeout_secs)
                    .with_context(|| format!("initialising UTXO plugin {}", chain.chain_id))?,
            )),
        }
    }
    let registry = Arc::new(registry);

    for (chain, result) in registry.health_check().await {
        match result {
            Ok(tip) => info!(%chain, tip, "chain reachable"),
            Err(e) => tracing::warn!(%chain, error = %e, "chain unreachable at startup"),
        }
    }

    // ── Engine and recovery ticks ─────────────────────────────────────────────
    let oracle = Arc::new(FixedRateOracle::from_config(&config));
    let engine = Arc::new(Engine::new(
        db.clone(),
        registry.clone(),
        config.clone(),
        operator,
        oracle,
    ));
    let recovery = Arc::new(RecoveryManager::new(db.clone(), registry.clone(), config.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = {
        let engine = engine.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { engine.run(rx).await })
    };
    let recovery_task = {
        let recovery = recovery.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { recovery.run(rx).await })
    };

    // ── RPC server ────────────────────────────────────────────────────────────
    let service = Arc::new(DealService::new(db.clone(), registry.clone(), config.clone()));
    let rpc_addr: SocketAddr = config
        .rpc_listen_addr
        .parse()
        .with_context(|| format!("rpc_listen_addr {}", config.rpc_listen_addr))?;
    let rpc_handle = RpcServer::new(Arc::new(RpcServerState {
        db: db.clone(),
        registry: registry.clone(),
        service,
    }))
    .start(rpc_addr)
    .await
    .context("starting RPC server")?;

    info!("broker ready");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");

    // ── Orderly shutdown ──────────────────────────────────────────────────────
    let _ = shutdown_tx.send(true);
    let _ = engine_task.await;
    let _ = recovery_task.await;
    let _ = rpc_handle.stop();
    registry.shutdown().await;
    db.flush().context("final flush")?;
    info!("broker stopped");
    Ok(())
}

fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
