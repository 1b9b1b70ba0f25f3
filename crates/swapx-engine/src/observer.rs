//! Confirmation observer.
//!
//! Promotes `Submitted` items to `Confirmed` once the chain reports the
//! per-chain threshold, and reverts dropped or reorged submissions back to
//! `Pending` against the recovery-attempt budget. The submitter and
//! observer for one deal are serialized by the deal lease.

use tracing::{debug, info};

use swapx_core::{now_millis, Deal, QueueStatus, SwapxError};

use crate::engine::Engine;

impl Engine {
    pub(crate) async fn observe_submitted(&self, deal: &Deal) -> Result<(), SwapxError> {
        let items = self.db.items_for_deal(&deal.id)?;
        for item in items.iter().filter(|i| i.status == QueueStatus::Submitted) {
            let Some(submitted) = &item.submitted_tx else {
                // SUBMITTED without a txid violates the queue invariant;
                // surface it instead of guessing.
                self.fail_item(deal, item, "submitted item has no txid")?;
                continue;
            };

            let plugin = self.registry.get(&item.chain_id)?;
            let confirmations = match plugin.tx_confirmations(&submitted.txid).await {
                Ok(c) => c,
                Err(e) if e.is_transient() => {
                    debug!(deal = %deal.id, txid = %submitted.txid, error = %e,
                           "confirmation poll failed; retrying next tick");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if confirmations < 0 {
                // Dropped, reorged out, or reverted on chain.
                self.bump_attempts(
                    deal,
                    item,
                    &format!("transaction {} dropped or failed on chain", submitted.txid),
                )?;
                continue;
            }

            let threshold = plugin.config().confirmations as i64;
            if confirmations >= threshold {
                let mut updated = item.clone();
                updated.status = QueueStatus::Confirmed;
                self.db.put_item(&updated)?;
                self.db.append_event(
                    &deal.id,
                    now_millis(),
                    format!(
                        "{} confirmed ({confirmations} confirmations): {}",
                        item.purpose, submitted.txid
                    ),
                )?;
                info!(deal = %deal.id, purpose = %item.purpose, txid = %submitted.txid,
                      "item confirmed");
            }
        }
        Ok(())
    }
}
