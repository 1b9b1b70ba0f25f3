use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use swapx_core::{now_millis, now_secs, BrokerConfig, Deal, DealId, SwapxError};
use swapx_keys::OperatorKey;
use swapx_store::{deal_lease_name, BrokerDb, ENGINE_TICK_LEASE};

use swapx_chain::ChainRegistry;

use crate::oracle::NativeUsdOracle;

/// The deal-advancement engine.
///
/// A periodic tick enumerates every deal that still needs attention and
/// advances it through the state machine under its per-deal lease. Ticks
/// are idempotent: a deal skipped or failed in one tick is simply picked up
/// by the next.
pub struct Engine {
    pub(crate) db: Arc<BrokerDb>,
    pub(crate) registry: Arc<ChainRegistry>,
    pub(crate) config: Arc<BrokerConfig>,
    pub(crate) operator: Arc<OperatorKey>,
    pub(crate) oracle: Arc<dyn NativeUsdOracle>,
}

impl Engine {
    pub fn new(
        db: Arc<BrokerDb>,
        registry: Arc<ChainRegistry>,
        config: Arc<BrokerConfig>,
        operator: Arc<OperatorKey>,
        oracle: Arc<dyn NativeUsdOracle>,
    ) -> Self {
        Self { db, registry, config, operator, oracle }
    }

    /// Run the periodic tick until `shutdown` flips to true. Cancellation
    /// is honored between deals, never inside a chain submission.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.engine_tick_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.config.engine_tick_secs, "engine loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "engine tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("engine loop stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One engine pass. Guarded by the global tick lease so overlapping
    /// instances (or a slow previous tick) never double-process.
    pub async fn tick(&self) -> Result<(), SwapxError> {
        let now = now_secs();
        if !self.db.acquire_lease(ENGINE_TICK_LEASE, now, self.config.lease_ttl_secs)? {
            debug!("engine tick lease held elsewhere; skipping");
            return Ok(());
        }

        let result = self.tick_inner().await;
        self.db.release_lease(ENGINE_TICK_LEASE)?;
        result
    }

    async fn tick_inner(&self) -> Result<(), SwapxError> {
        let deals = self.deals_needing_attention()?;
        if deals.is_empty() {
            return Ok(());
        }
        debug!(count = deals.len(), "engine tick processing deals");

        futures::stream::iter(deals)
            .for_each_concurrent(self.config.engine_workers, |deal| async move {
                self.process_deal(deal.id).await;
            })
            .await;
        Ok(())
    }

    /// Deals that are non-terminal, plus terminal deals whose queue still
    /// has work in flight (refunds of a reverted deal, late confirmations).
    pub(crate) fn deals_needing_attention(&self) -> Result<Vec<Deal>, SwapxError> {
        let mut out = Vec::new();
        for deal in self.db.iter_deals()? {
            if !deal.stage.is_terminal() {
                out.push(deal);
                continue;
            }
            let items = self.db.items_for_deal(&deal.id)?;
            if items.iter().any(|i| !i.status.is_terminal()) {
                out.push(deal);
            }
        }
        Ok(out)
    }

    /// Advance one deal under its lease. Every error is contained here:
    /// logged, recorded as an event, never propagated out of the tick.
    pub(crate) async fn process_deal(&self, deal_id: DealId) {
        let now = now_secs();
        let lease = deal_lease_name(&deal_id);
        match self.db.acquire_lease(&lease, now, self.config.lease_ttl_secs) {
            Ok(true) => {}
            Ok(false) => {
                debug!(deal = %deal_id, "deal lease held; skipping this tick");
                return;
            }
            Err(e) => {
                error!(deal = %deal_id, error = %e, "lease acquisition failed");
                return;
            }
        }

        if let Err(e) = self.advance_deal(deal_id).await {
            warn!(deal = %deal_id, error = %e, "deal advancement failed");
            let _ = self
                .db
                .append_event(&deal_id, now_millis(), format!("engine error: {e}"));
        }

        if let Err(e) = self.db.release_lease(&lease) {
            error!(deal = %deal_id, error = %e, "lease release failed");
        }
    }
}
