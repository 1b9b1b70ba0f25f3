use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use swapx_core::{now_secs, BrokerConfig, SwapxError};
use swapx_store::{BrokerDb, RECOVERY_TICK_LEASE};

use swapx_chain::ChainRegistry;

/// The recovery tick driver. All repair logic lives in `repair.rs`; this
/// type owns the schedule and the global lease.
pub struct RecoveryManager {
    pub(crate) db: Arc<BrokerDb>,
    pub(crate) registry: Arc<ChainRegistry>,
    pub(crate) config: Arc<BrokerConfig>,
}

impl RecoveryManager {
    pub fn new(db: Arc<BrokerDb>, registry: Arc<ChainRegistry>, config: Arc<BrokerConfig>) -> Self {
        Self { db, registry, config }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.recovery_tick_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.config.recovery_tick_secs, "recovery loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "recovery tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("recovery loop stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One recovery pass under the global lease.
    pub async fn tick(&self) -> Result<(), SwapxError> {
        let now = now_secs();
        if !self.db.acquire_lease(RECOVERY_TICK_LEASE, now, self.config.lease_ttl_secs)? {
            debug!("recovery tick lease held elsewhere; skipping");
            return Ok(());
        }

        let result = self.tick_inner(now).await;
        self.db.release_lease(RECOVERY_TICK_LEASE)?;
        result
    }

    async fn tick_inner(&self, now: swapx_core::Timestamp) -> Result<(), SwapxError> {
        // Each pass is independent; a failure in one must not starve the
        // others.
        if let Err(e) = self.repair_missing_approvals(now).await {
            error!(error = %e, "missing-approval repair failed");
        }
        if let Err(e) = self.repair_stuck_pending(now) {
            error!(error = %e, "stuck-pending repair failed");
        }
        if let Err(e) = self.repair_stuck_submitted(now).await {
            error!(error = %e, "stuck-submitted repair failed");
        }
        if let Err(e) = self.fail_malformed_items(now) {
            error!(error = %e, "malformed-item triage failed");
        }
        if let Err(e) = self.scan_tank_balances(now).await {
            error!(error = %e, "tank balance scan failed");
        }
        Ok(())
    }
}
